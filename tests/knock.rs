use jtag_knock::cable::sim::{SimBoard, SimTap, Wiring};
use jtag_knock::cable::{Cable, Signal};
use jtag_knock::chain::{Chain, Device};
use jtag_knock::knock::{Candidate, Finding, KnockMode, Knocker};
use jtag_knock::statemachine::JtagSM;
use jtag_knock::Error;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn knocker(pins: u8, wiring: Wiring, taps: Vec<SimTap>) -> Knocker<Box<SimBoard>> {
    init_logging();
    Knocker::new(Chain::new(JtagSM::new(Box::new(SimBoard::new(pins, wiring, taps)))))
}

fn scan(knocker: &mut Knocker<Box<SimBoard>>, mode: KnockMode, pins: u8) -> Vec<Finding> {
    let mut findings = vec![];
    knocker.scan(mode, pins, |finding| findings.push(finding)).unwrap();
    findings
}

const ARM: u32 = 0x4ba00477;

fn three_devices() -> Vec<SimTap> {
    vec![
        SimTap::new(4).with_idcode(ARM),
        SimTap::new(5),
        SimTap::new(6).with_idcode(0x0ba00477),
    ]
}

#[test]
fn reset_scan_single_device() {
    let wiring = Wiring { tck: 0, tms: 1, tdi: 2, tdo: 3 };
    let mut knocker = knocker(4, wiring, vec![SimTap::new(4).with_idcode(ARM)]);
    let findings = scan(&mut knocker, KnockMode::Reset, 4);

    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.candidate, Candidate { tck: 0, tms: 1, tdo: 3, tdi: 2 });
    let info = finding.chain.as_ref().unwrap();
    assert_eq!((info.ir_len, info.count), (4, 1));
    assert_eq!(info.devices, [Device::IdCode(ARM)]);

    // The same wiring, configured by hand, gives the same answer
    let cable = &mut knocker.chain.sm.cable;
    cable.configure(Signal::Tck, Some(0)).unwrap();
    cable.configure(Signal::Tms, Some(1)).unwrap();
    cable.configure(Signal::Tdi, Some(2)).unwrap();
    cable.configure(Signal::Tdo, Some(3)).unwrap();
    assert_eq!(knocker.chain.detect().as_ref(), Ok(info));
}

#[test]
fn bypass_scan_single_device() {
    let wiring = Wiring { tck: 0, tms: 1, tdi: 2, tdo: 3 };
    let mut knocker = knocker(4, wiring, vec![SimTap::new(4).with_idcode(ARM)]);
    let findings = scan(&mut knocker, KnockMode::Bypass, 4);

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].candidate, Candidate { tck: 0, tms: 1, tdo: 3, tdi: 2 });
    assert_eq!(findings[0].chain.as_ref().map(|info| info.devices.clone()), Ok(vec![Device::IdCode(ARM)]));
}

#[test]
fn spare_pins_are_not_candidates() {
    let wiring = Wiring { tck: 0, tms: 1, tdi: 2, tdo: 3 };
    let mut knocker = knocker(6, wiring, vec![SimTap::new(4).with_idcode(ARM)]);
    for mode in [KnockMode::Reset, KnockMode::Bypass] {
        let findings = scan(&mut knocker, mode, 6);
        assert_eq!(findings.len(), 1, "{} mode", mode);
        assert_eq!(findings[0].candidate, Candidate { tck: 0, tms: 1, tdo: 3, tdi: 2 });
    }
}

#[test]
fn reset_scan_three_devices() {
    let wiring = Wiring { tck: 3, tms: 0, tdi: 5, tdo: 1 };
    let mut knocker = knocker(6, wiring, three_devices());
    let findings = scan(&mut knocker, KnockMode::Reset, 6);

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].candidate, Candidate { tck: 3, tms: 0, tdo: 1, tdi: 5 });
    let info = findings[0].chain.as_ref().unwrap();
    assert_eq!(info.ir_len, 15);
    assert_eq!(info.devices, [Device::IdCode(ARM), Device::Bypass, Device::IdCode(0x0ba00477)]);
}

#[test]
fn bypass_scan_three_devices() {
    let wiring = Wiring { tck: 3, tms: 0, tdi: 5, tdo: 1 };
    let mut knocker = knocker(6, wiring, three_devices());
    let findings = scan(&mut knocker, KnockMode::Bypass, 6);

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].candidate, Candidate { tck: 3, tms: 0, tdo: 1, tdi: 5 });
    assert_eq!(findings[0].chain.as_ref().map(|info| info.count), Ok(3));
}

#[test]
fn scan_leaves_pins_released() {
    let wiring = Wiring { tck: 0, tms: 1, tdi: 2, tdo: 3 };
    let mut knocker = knocker(4, wiring, vec![SimTap::new(4).with_idcode(ARM)]);
    scan(&mut knocker, KnockMode::Bypass, 4);

    let cable = &mut knocker.chain.sm.cable;
    assert!(Signal::ALL.iter().all(|signal| !cable.is_bound(*signal)));
    assert_eq!(cable.levels(), 0);
}

#[test]
fn too_few_pins() {
    let wiring = Wiring { tck: 0, tms: 1, tdi: 2, tdo: 3 };
    let mut knocker = knocker(4, wiring, vec![SimTap::new(4).with_idcode(ARM)]);
    let result = knocker.scan(KnockMode::Reset, 3, |_| panic!("nothing to find"));
    assert_eq!(result, Err(Error::PinCount { count: 3, max: 4 }));
}
