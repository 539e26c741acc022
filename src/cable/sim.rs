//! A simulated target board, for exercising the knocker and chain logic without hardware.
//!
//! `SimBoard` implements `Cable` by modelling both sides of the wire: the adapter pins, and a
//! scan chain of `SimTap` devices attached to four of those pins.  The devices share one TAP
//! state machine, advanced on every rising edge seen on their TCK pin, whichever adapter signal
//! happens to be producing it.
use alloc::vec;
use alloc::vec::Vec;

use crate::cable::{Cable, Direction, PinMap, Signal, MAX_PINS};
use crate::error::Error;
use crate::statemachine::JtagState;

/// Which board pins the target's JTAG port is attached to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Wiring {
    pub tck: u8,
    pub tms: u8,
    pub tdi: u8,
    pub tdo: u8,
}

/// One device on the simulated scan chain
#[derive(Clone, Debug)]
pub struct SimTap {
    idcode: Option<u32>,
    ir_capture: u64,
    // Shift registers, index 0 is the bit nearest TDO
    ir: Vec<bool>,
    dr: Vec<bool>,
    bypass: bool,
}

impl SimTap {
    /// A device with an `ir_len` bit instruction register and no IDCODE register
    pub fn new(ir_len: usize) -> Self {
        assert!(ir_len > 0);
        let mut tap = Self {
            idcode: None,
            ir_capture: 0,
            ir: vec![false; ir_len],
            dr: vec![false],
            bypass: true,
        };
        tap.capture_ir();
        tap
    }

    /// Give the device an IDCODE register, selected after a reset
    pub fn with_idcode(mut self, idcode: u32) -> Self {
        self.idcode = Some(idcode);
        self.bypass = false;
        self
    }

    /// Bits loaded into the instruction register on Capture-IR.  The two lowest bits are always
    /// captured as 0b01.
    pub fn with_ir_capture(mut self, bits: u64) -> Self {
        self.ir_capture = bits;
        self.capture_ir();
        self
    }

    pub fn ir_len(&self) -> usize {
        self.ir.len()
    }

    /// Instruction shift register contents, first element nearest TDO
    pub fn ir(&self) -> &[bool] {
        &self.ir
    }

    /// Data shift register contents, first element nearest TDO
    pub fn dr(&self) -> &[bool] {
        &self.dr
    }

    pub fn in_bypass(&self) -> bool {
        self.bypass
    }

    fn reset(&mut self) {
        self.bypass = self.idcode.is_none();
    }

    fn capture_ir(&mut self) {
        for (i, bit) in self.ir.iter_mut().enumerate() {
            *bit = match i {
                0 => true,
                1 => false,
                _ => i < 64 && (self.ir_capture >> i) & 1 == 1,
            };
        }
    }

    fn capture_dr(&mut self) {
        self.dr = match (self.bypass, self.idcode) {
            (false, Some(idcode)) => (0..32).map(|i| (idcode >> i) & 1 == 1).collect(),
            _ => vec![false],
        };
    }

    /// All ones selects BYPASS, anything else selects IDCODE where there is one
    fn update_ir(&mut self) {
        self.bypass = self.idcode.is_none() || self.ir.iter().all(|b| *b);
    }

    fn shift(&mut self, ir: bool, tdi: bool) -> bool {
        let reg = if ir { &mut self.ir } else { &mut self.dr };
        let tdo = reg.remove(0);
        reg.push(tdi);
        tdo
    }
}

pub struct SimBoard {
    map: PinMap,
    wiring: Wiring,
    taps: Vec<SimTap>,
    // Level the adapter drives onto each pin, None for inputs
    driven: [Option<bool>; MAX_PINS],
    state: JtagState,
    tck: bool,
    clocks: usize,
}

impl SimBoard {
    /// A board with `pin_count` pins and a chain of `taps` attached as described by `wiring`.
    /// The first tap is the one nearest TDO.  The chain powers up in Test-Logic-Reset.
    pub fn new(pin_count: u8, wiring: Wiring, mut taps: Vec<SimTap>) -> Self {
        for tap in &mut taps {
            tap.reset();
        }
        Self {
            map: PinMap::new(pin_count),
            wiring,
            taps,
            driven: [None; MAX_PINS],
            state: JtagState::Reset,
            tck: false,
            clocks: 0,
        }
    }

    pub fn wiring(&self) -> Wiring {
        self.wiring
    }

    pub fn taps(&self) -> &[SimTap] {
        &self.taps
    }

    /// State of the simulated TAP controller
    pub fn state(&self) -> JtagState {
        self.state
    }

    /// Number of calls to `Cable::clock`
    pub fn clocks(&self) -> usize {
        self.clocks
    }

    fn level(&self, pin: u8) -> bool {
        if let Some(level) = self.driven.get(pin as usize).copied().flatten() {
            return level;
        }
        pin == self.wiring.tdo && self.tdo()
    }

    /// TDO is only driven while shifting, otherwise the pin floats low
    fn tdo(&self) -> bool {
        if !self.state.is_shift() {
            return false;
        }
        let ir = self.state == JtagState::ShiftIR;
        self.taps.first().map_or(false, |tap| {
            if ir { tap.ir[0] } else { tap.dr[0] }
        })
    }

    fn drive(&mut self, pin: u8, level: Option<bool>) {
        self.driven[pin as usize] = level;

        let tck = self.level(self.wiring.tck);
        if tck && !self.tck {
            self.rising_edge();
        }
        self.tck = tck;
    }

    fn rising_edge(&mut self) {
        let tms = self.level(self.wiring.tms);
        let mut tdi = self.level(self.wiring.tdi);

        match self.state {
            JtagState::CaptureDR => self.taps.iter_mut().for_each(SimTap::capture_dr),
            JtagState::CaptureIR => self.taps.iter_mut().for_each(SimTap::capture_ir),
            state if state.is_shift() => {
                let ir = state == JtagState::ShiftIR;
                for tap in self.taps.iter_mut().rev() {
                    tdi = tap.shift(ir, tdi);
                }
            }
            _ => {}
        }

        self.state = self.state.next(tms);
        match self.state {
            JtagState::UpdateIR => self.taps.iter_mut().for_each(SimTap::update_ir),
            JtagState::Reset => self.taps.iter_mut().for_each(SimTap::reset),
            _ => {}
        }
    }

    fn release(&mut self, pin: u8) {
        if self.driven[pin as usize].is_some() {
            self.drive(pin, Some(false));
            self.drive(pin, None);
        }
    }
}

impl Cable for SimBoard {
    fn pin_count(&self) -> u8 {
        self.map.pin_count()
    }

    fn init(&mut self) {
        let count = self.map.pin_count();
        let map = core::mem::replace(&mut self.map, PinMap::new(count));
        for (_, pin) in map.iter() {
            self.release(pin);
        }
    }

    fn configure(&mut self, signal: Signal, pin: Option<u8>) -> Result<(), Error> {
        let old = self.map.bind(signal, pin)?;
        if old == pin {
            return Ok(());
        }
        if let Some(old) = old {
            self.release(old);
        }
        if let Some(pin) = pin {
            if signal.direction() == Direction::Output {
                self.drive(pin, Some(false));
            }
        }
        Ok(())
    }

    fn pin(&self, signal: Signal) -> Option<u8> {
        self.map.get(signal)
    }

    fn set(&mut self, signal: Signal, level: bool) {
        if signal.direction() == Direction::Input {
            return;
        }
        if let Some(pin) = self.map.get(signal) {
            self.drive(pin, Some(level));
        }
    }

    fn get(&mut self, signal: Signal) -> bool {
        self.map.get(signal).map_or(false, |pin| self.level(pin))
    }

    fn levels(&mut self) -> u32 {
        (0..self.map.pin_count())
            .filter(|pin| self.level(*pin))
            .fold(0, |levels, pin| levels | 1 << pin)
    }

    fn clock(&mut self) {
        self.clocks += 1;
        if let Some(pin) = self.map.get(Signal::Tck) {
            self.drive(pin, Some(true));
            self.drive(pin, Some(false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIRING: Wiring = Wiring { tck: 0, tms: 1, tdi: 2, tdo: 3 };

    fn wired(taps: Vec<SimTap>) -> SimBoard {
        let mut board = SimBoard::new(4, WIRING, taps);
        board.configure(Signal::Tck, Some(0)).unwrap();
        board.configure(Signal::Tms, Some(1)).unwrap();
        board.configure(Signal::Tdi, Some(2)).unwrap();
        board.configure(Signal::Tdo, Some(3)).unwrap();
        board
    }

    fn step(board: &mut SimBoard, tms: &[bool]) {
        for level in tms {
            board.set(Signal::Tms, *level);
            board.clock();
        }
    }

    #[test]
    fn idcode_shifts_out_lsb_first() {
        let mut board = wired(vec![SimTap::new(4).with_idcode(0x4ba00477)]);
        // Reset -> Idle -> SelectDR -> CaptureDR -> ShiftDR
        step(&mut board, &[false, true, false, false]);
        assert_eq!(board.state(), JtagState::ShiftDR);

        let mut idcode = 0u32;
        for bit in 0..32 {
            if board.get(Signal::Tdo) {
                idcode |= 1 << bit;
            }
            board.clock();
        }
        assert_eq!(idcode, 0x4ba00477);
    }

    #[test]
    fn tdo_floats_low_outside_shift() {
        let mut board = wired(vec![SimTap::new(4).with_idcode(0xffff_ffff)]);
        step(&mut board, &[false, true, false, false]);
        assert!(board.get(Signal::Tdo));
        step(&mut board, &[true]);
        assert_eq!(board.state(), JtagState::Exit1DR);
        assert!(!board.get(Signal::Tdo));
    }

    #[test]
    fn all_ones_instruction_selects_bypass() {
        let mut board = wired(vec![SimTap::new(3).with_idcode(0x1234_5677)]);
        board.set(Signal::Tdi, true);
        // Reset -> Idle -> SelectDR -> SelectIR -> CaptureIR -> ShiftIR
        step(&mut board, &[false, true, true, false, false]);
        step(&mut board, &[false, false, true, true]);
        assert_eq!(board.state(), JtagState::UpdateIR);
        assert!(board.taps()[0].in_bypass());

        step(&mut board, &[true, true, true]);
        assert_eq!(board.state(), JtagState::Reset);
        assert!(!board.taps()[0].in_bypass());
    }

    #[test]
    fn adapter_pins_drive_target_clock() {
        // TCK is wired to pin 0 but the adapter drives it as TMS
        let mut board = SimBoard::new(4, WIRING, vec![SimTap::new(4)]);
        board.configure(Signal::Tms, Some(0)).unwrap();
        board.configure(Signal::Tck, Some(1)).unwrap();
        assert_eq!(board.state(), JtagState::Reset);

        // TMS (wired pin 1) is low during the edge, so the TAP leaves reset
        board.set(Signal::Tms, true);
        assert_eq!(board.state(), JtagState::Idle);
        board.clock();
        assert_eq!(board.state(), JtagState::Idle);
        assert_eq!(board.clocks(), 1);
    }

    #[test]
    fn levels_snapshot_every_pin() {
        let mut board = wired(vec![SimTap::new(4).with_idcode(0x4ba00477)]);
        board.set(Signal::Tdi, true);
        assert_eq!(board.levels(), 1 << 2);

        board.init();
        assert_eq!(board.levels(), 0);
        assert!(!board.is_bound(Signal::Tdi));
    }
}
