//! Interrogation of an unknown scan chain.  Given a cable with TCK, TMS, TDI and TDO bound, `Chain`
//! works out the combined instruction register length, how many devices there are, and the ID
//! code (or lack of one) of each device.
//!
//! TDO is always sampled before the clock pulse that goes with it.
use core::fmt;

use alloc::vec::Vec;
use log::{debug, info, warn};

use crate::cable::{Cable, Signal};
use crate::error::Error;
use crate::statemachine::{JtagSM, JtagState};

/// Longest chain that can be enumerated
pub const MAX_DEVICES: usize = 20;
/// Longest combined instruction register that can be measured
pub const MAX_IR_LEN: usize = MAX_DEVICES * 32;
pub const IDCODE_BITS: usize = 32;

/// What a device presents in its data register straight after a TAP reset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    IdCode(u32),
    Bypass,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::IdCode(idcode) => write!(f, "ID code {:08X}", idcode),
            Device::Bypass => f.write_str("BYPASS"),
        }
    }
}

/// Everything `Chain::detect` learned about the chain.  `devices` is ordered from the device
/// nearest TDO, and may hold fewer than `count` entries if an invalid ID code cut the walk short.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainInfo {
    pub ir_len: usize,
    pub count: usize,
    pub devices: Vec<Device>,
}

pub struct Chain<T> {
    pub sm: JtagSM<T>,
    ir_len: usize,
    count: usize,
}

impl<T, U> Chain<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create an object using an existing `JtagSM` object
    pub fn new(sm: JtagSM<T>) -> Self {
        Self {
            sm,
            ir_len: 0,
            count: 0,
        }
    }

    /// Combined IR length found by the last successful `find_ir_length`
    pub fn ir_len(&self) -> usize {
        self.ir_len
    }

    /// Device count found by the last successful `find_devices`
    pub fn count(&self) -> usize {
        self.count
    }

    fn clock(&mut self, count: usize) {
        for _ in 0..count {
            self.sm.cable.clock();
        }
    }

    /// Measure the combined instruction register length of the chain.  Every IR is flooded with
    /// ones, then a single zero is sent after them and the clocks counted until it reaches TDO.
    /// On success the instruction registers are left holding all ones, i.e. BYPASS.
    pub fn find_ir_length(&mut self) -> Result<usize, Error> {
        self.sm.cable.set(Signal::Tdi, true);
        self.sm.change_mode(JtagState::ShiftIR);
        self.clock(MAX_IR_LEN);

        self.sm.cable.set(Signal::Tdi, false);
        self.sm.cable.clock();
        self.sm.cable.set(Signal::Tdi, true);

        for count in 1..=MAX_IR_LEN {
            let tdo = self.sm.cable.get(Signal::Tdo);
            self.sm.cable.clock();
            if !tdo {
                self.ir_len = count;
                return Ok(count);
            }
        }
        Err(Error::IrLengthNotFound(MAX_IR_LEN))
    }

    /// Count the devices on the chain.  With every device in BYPASS each one contributes a single
    /// bit, captured as zero, so a one shifted in from TDI appears on TDO after one clock per
    /// device.  Needs the IR length from `find_ir_length`.
    pub fn find_devices(&mut self) -> Result<usize, Error> {
        self.sm.change_mode(JtagState::ShiftIR);
        self.sm.cable.set(Signal::Tdi, true);
        self.clock(self.ir_len);

        self.sm.change_mode(JtagState::ShiftDR);
        for count in 0..=MAX_DEVICES {
            if self.sm.cable.get(Signal::Tdo) {
                // High before any clock means TDO is stuck, not an empty chain
                if count == 0 {
                    break;
                }
                self.count = count;
                return Ok(count);
            }
            self.sm.cable.clock();
        }
        Err(Error::DevicesNotFound(MAX_DEVICES))
    }

    /// Read the next device's data register, which must be the one selected by a TAP reset.  A
    /// device with an IDCODE register always shifts out a one first; a device without one is in
    /// BYPASS and shifts out a single zero, which is reported as an ID code of 0.
    pub fn find_id_code(&mut self) -> u32 {
        if !self.sm.cable.get(Signal::Tdo) {
            self.sm.cable.clock();
            return 0;
        }

        let mut idcode = 0u32;
        for _ in 0..IDCODE_BITS {
            idcode >>= 1;
            if self.sm.cable.get(Signal::Tdo) {
                idcode |= 0x8000_0000;
            }
            self.sm.cable.clock();
        }
        idcode
    }

    /// Attempt to detect the devices on the scan chain, reporting each one as it is read.  Fails
    /// only if the IR length or the device count could not be found.
    pub fn detect(&mut self) -> Result<ChainInfo, Error> {
        let ir_len = self.find_ir_length().map_err(|e| {
            warn!("{}", e);
            e
        })?;
        let count = self.find_devices().map_err(|e| {
            warn!("No devices found on chain. Are the signal assignments correct? ({})", e);
            e
        })?;

        // Reset the TAPs so every device that has one selects its IDCODE register
        self.sm.change_mode(JtagState::Reset);
        self.sm.change_mode(JtagState::ShiftDR);
        self.sm.cable.set(Signal::Tdi, true);

        info!("{} device(s) found, with total IR length of {}", count, ir_len);

        let mut devices = Vec::with_capacity(count);
        for n in 1..=count {
            let device = match self.find_id_code() {
                0 => Device::Bypass,
                0xffff_ffff => {
                    debug!("Device {} returned an invalid ID code, stopping", n);
                    break;
                }
                idcode => Device::IdCode(idcode),
            };
            info!("Device {} - {}", n, device);
            devices.push(device);
        }

        Ok(ChainInfo { ir_len, count, devices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::vec;

    use crate::cable::sim::{SimBoard, SimTap, Wiring};
    use crate::cable::PinMap;

    fn wired(taps: Vec<SimTap>) -> Chain<Box<SimBoard>> {
        let wiring = Wiring { tck: 0, tms: 1, tdi: 2, tdo: 3 };
        let mut board = SimBoard::new(4, wiring, taps);
        board.configure(Signal::Tck, Some(0)).unwrap();
        board.configure(Signal::Tms, Some(1)).unwrap();
        board.configure(Signal::Tdi, Some(2)).unwrap();
        board.configure(Signal::Tdo, Some(3)).unwrap();
        Chain::new(JtagSM::new(Box::new(board)))
    }

    /// TDO held at a fixed level, whatever the rest of the pins do
    struct StuckTdo {
        map: PinMap,
        level: bool,
    }

    impl Cable for StuckTdo {
        fn pin_count(&self) -> u8 { self.map.pin_count() }
        fn init(&mut self) { self.map = PinMap::new(self.map.pin_count()); }
        fn configure(&mut self, signal: Signal, pin: Option<u8>) -> Result<(), Error> {
            self.map.bind(signal, pin).map(|_| ())
        }
        fn pin(&self, signal: Signal) -> Option<u8> { self.map.get(signal) }
        fn set(&mut self, _signal: Signal, _level: bool) {}
        fn get(&mut self, signal: Signal) -> bool { signal == Signal::Tdo && self.level }
        fn levels(&mut self) -> u32 { 0 }
        fn clock(&mut self) {}
    }

    fn stuck(level: bool) -> Chain<Box<StuckTdo>> {
        Chain::new(JtagSM::new(Box::new(StuckTdo { map: PinMap::new(4), level })))
    }

    #[test]
    fn ir_length_of_one_device() {
        let mut chain = wired(vec![SimTap::new(47).with_ir_capture(0x5a5a_1234_5678)]);
        assert_eq!(chain.find_ir_length(), Ok(47));
        assert_eq!(chain.ir_len(), 47);

        let ir = chain.sm.cable.taps()[0].ir();
        assert_eq!(ir.len(), 47);
        assert!(ir.iter().all(|b| *b));
    }

    #[test]
    fn ir_length_sums_devices() {
        let mut chain = wired(vec![SimTap::new(4), SimTap::new(5), SimTap::new(38)]);
        assert_eq!(chain.find_ir_length(), Ok(47));
    }

    #[test]
    fn longest_ir_length() {
        let mut chain = wired(vec![SimTap::new(MAX_IR_LEN)]);
        assert_eq!(chain.find_ir_length(), Ok(MAX_IR_LEN));
    }

    #[test]
    fn stuck_high_tdo() {
        let mut chain = stuck(true);
        assert_eq!(chain.find_ir_length(), Err(Error::IrLengthNotFound(MAX_IR_LEN)));
        assert_eq!(chain.find_devices(), Err(Error::DevicesNotFound(MAX_DEVICES)));
        assert_eq!(chain.detect(), Err(Error::IrLengthNotFound(MAX_IR_LEN)));
    }

    #[test]
    fn stuck_low_tdo() {
        let mut chain = stuck(false);
        assert_eq!(chain.find_ir_length(), Ok(1));
        assert_eq!(chain.find_devices(), Err(Error::DevicesNotFound(MAX_DEVICES)));
        assert_eq!(chain.count(), 0);
    }

    #[test]
    fn three_devices() {
        let mut chain = wired(vec![
            SimTap::new(4).with_idcode(0x4ba00477),
            SimTap::new(5),
            SimTap::new(6).with_idcode(0x0ba00477),
        ]);
        assert_eq!(chain.find_ir_length(), Ok(15));
        assert_eq!(chain.find_devices(), Ok(3));
        assert_eq!(chain.count(), 3);
        assert!(chain.sm.cable.taps().iter().all(|tap| tap.in_bypass()));
    }

    #[test]
    fn device_limits() {
        let mut chain = wired((0..MAX_DEVICES).map(|_| SimTap::new(2)).collect());
        chain.find_ir_length().unwrap();
        assert_eq!(chain.find_devices(), Ok(MAX_DEVICES));

        let mut chain = wired((0..=MAX_DEVICES).map(|_| SimTap::new(2)).collect());
        chain.find_ir_length().unwrap();
        assert_eq!(chain.find_devices(), Err(Error::DevicesNotFound(MAX_DEVICES)));
    }

    #[test]
    fn idcode_after_reset() {
        let mut chain = wired(vec![SimTap::new(4).with_idcode(0x4ba00477), SimTap::new(4)]);
        chain.sm.change_mode(JtagState::Reset);
        chain.sm.change_mode(JtagState::ShiftDR);
        chain.sm.cable.set(Signal::Tdi, true);

        let clocks = chain.sm.cable.clocks();
        assert_eq!(chain.find_id_code(), 0x4ba00477);
        assert_eq!(chain.sm.cable.clocks() - clocks, 32);

        // No IDCODE on the second device: one bit, not 32
        let clocks = chain.sm.cable.clocks();
        assert_eq!(chain.find_id_code(), 0);
        assert_eq!(chain.sm.cable.clocks() - clocks, 1);
    }

    #[test]
    fn known_idcodes() {
        for idcode in [0x4ba00477, 0x15946009, 0x020b20dd, 0x028140dd, 0x21c22093] {
            let mut chain = wired(vec![SimTap::new(4).with_idcode(idcode)]);
            chain.sm.change_mode(JtagState::ShiftDR);
            assert_eq!(chain.find_id_code(), idcode);
        }
    }

    #[test]
    fn detect_reports_every_device() {
        let mut chain = wired(vec![
            SimTap::new(4).with_idcode(0x4ba00477),
            SimTap::new(5),
            SimTap::new(6).with_idcode(0x0ba00477),
        ]);
        let info = chain.detect().unwrap();
        assert_eq!(info, ChainInfo {
            ir_len: 15,
            count: 3,
            devices: vec![Device::IdCode(0x4ba00477), Device::Bypass, Device::IdCode(0x0ba00477)],
        });
    }

    #[test]
    fn detect_is_repeatable() {
        let mut chain = wired(vec![SimTap::new(4).with_idcode(0x4ba00477), SimTap::new(7)]);
        let first = chain.detect();
        let second = chain.detect();
        assert!(first.is_ok());
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_idcode_stops_the_walk() {
        let mut chain = wired(vec![SimTap::new(4).with_idcode(0xffff_ffff), SimTap::new(4)]);
        let info = chain.detect().unwrap();
        assert_eq!(info.count, 2);
        assert!(info.devices.is_empty());
    }

    #[test]
    fn disconnected_tdo_fails() {
        let mut chain = wired(vec![SimTap::new(4).with_idcode(0x4ba00477)]);
        chain.sm.cable.configure(Signal::Tdo, None).unwrap();
        assert_eq!(chain.detect(), Err(Error::DevicesNotFound(MAX_DEVICES)));
    }
}
