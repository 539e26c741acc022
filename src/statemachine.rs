//! This provides a higher-level interface than the `Cable` trait.  Specifically, it keeps track of
//! the state of the JTAG state machine, and allows setting the state to any desired state.
//! `JtagSM` gets there one TMS bit at a time, choosing each bit from the current state and the
//! target alone.  The states visited on the way are always the same for a given start and target,
//! which matters because several of them act on the shift registers.
use core::fmt;
use core::str::FromStr;

use alloc::string::ToString;
use log::trace;

use crate::cable::{Cable, Signal};
use crate::error::Error;

/// Clocks of TMS high that bring any TAP into Test-Logic-Reset
pub const RESET_CLOCKS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
    /// Nothing is known about the TAP, e.g. because the wiring underneath it changed
    Unknown = 16,
}

impl JtagState {
    /// The sixteen states of the IEEE 1149.1 TAP controller
    pub const ALL: [JtagState; 16] = [
        JtagState::Reset, JtagState::Idle,
        JtagState::SelectDR, JtagState::CaptureDR, JtagState::ShiftDR, JtagState::Exit1DR,
        JtagState::PauseDR, JtagState::Exit2DR, JtagState::UpdateDR,
        JtagState::SelectIR, JtagState::CaptureIR, JtagState::ShiftIR, JtagState::Exit1IR,
        JtagState::PauseIR, JtagState::Exit2IR, JtagState::UpdateIR,
    ];

    /// The state a TAP moves to on a rising TCK edge with the given TMS level.  `Unknown` stays
    /// `Unknown`; only a full reset sequence gets out of it.
    pub fn next(self, tms: bool) -> JtagState {
        use JtagState::*;

        let (low, high) = match self {
            Reset     => (Idle, Reset),
            Idle      => (Idle, SelectDR),
            SelectDR  => (CaptureDR, SelectIR),
            CaptureDR => (ShiftDR, Exit1DR),
            ShiftDR   => (ShiftDR, Exit1DR),
            Exit1DR   => (PauseDR, UpdateDR),
            PauseDR   => (PauseDR, Exit2DR),
            Exit2DR   => (ShiftDR, UpdateDR),
            UpdateDR  => (Idle, SelectDR),
            SelectIR  => (CaptureIR, Reset),
            CaptureIR => (ShiftIR, Exit1IR),
            ShiftIR   => (ShiftIR, Exit1IR),
            Exit1IR   => (PauseIR, UpdateIR),
            PauseIR   => (PauseIR, Exit2IR),
            Exit2IR   => (ShiftIR, UpdateIR),
            UpdateIR  => (Idle, SelectDR),
            Unknown   => (Unknown, Unknown),
        };
        if tms { high } else { low }
    }

    /// The TMS level to apply in this state on the way to `target`.  Looks no further ahead than
    /// the next state, but never picks a branch from which `target` can only be reached through
    /// Test-Logic-Reset.
    pub fn tms_toward(self, target: JtagState) -> bool {
        use JtagState::*;

        match self {
            Reset => false,
            Idle => true,
            SelectDR => !matches!(target, CaptureDR | ShiftDR | Exit1DR | PauseDR | Exit2DR | UpdateDR),
            SelectIR => !matches!(target, CaptureIR | ShiftIR | Exit1IR | PauseIR | Exit2IR | UpdateIR),
            CaptureDR => target != ShiftDR,
            CaptureIR => target != ShiftIR,
            ShiftDR | PauseDR | ShiftIR | PauseIR => true,
            Exit1DR => !matches!(target, PauseDR | Exit2DR | ShiftDR),
            Exit2DR => !matches!(target, PauseDR | Exit1DR | ShiftDR),
            Exit1IR => !matches!(target, PauseIR | Exit2IR | ShiftIR),
            Exit2IR => !matches!(target, PauseIR | Exit1IR | ShiftIR),
            UpdateDR | UpdateIR => target != Idle,
            Unknown => true,
        }
    }

    pub fn is_shift(self) -> bool {
        matches!(self, JtagState::ShiftDR | JtagState::ShiftIR)
    }

    pub fn name(self) -> &'static str {
        use JtagState::*;

        match self {
            Reset => "Reset",
            Idle => "Idle",
            SelectDR => "SelectDR",
            CaptureDR => "CaptureDR",
            ShiftDR => "ShiftDR",
            Exit1DR => "Exit1DR",
            PauseDR => "PauseDR",
            Exit2DR => "Exit2DR",
            UpdateDR => "UpdateDR",
            SelectIR => "SelectIR",
            CaptureIR => "CaptureIR",
            ShiftIR => "ShiftIR",
            Exit1IR => "Exit1IR",
            PauseIR => "PauseIR",
            Exit2IR => "Exit2IR",
            UpdateIR => "UpdateIR",
            Unknown => "Unknown",
        }
    }
}

impl fmt::Display for JtagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JtagState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JtagState::ALL
            .iter()
            .chain(core::iter::once(&JtagState::Unknown))
            .copied()
            .find(|state| state.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Unrecognised { kind: "TAP state", name: s.to_string() })
    }
}

pub struct JtagSM<T> {
    pub cable: T,
    state: JtagState,
}

impl<T, U> JtagSM<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create a JTAG state machine using an existing `Cable`.  Nothing is driven until the first
    /// call to `change_mode`, which will begin with a reset.
    pub fn new(cable: T) -> Self {
        Self {
            cable,
            state: JtagState::Unknown,
        }
    }

    /// Forget the TAP state without touching the pins
    pub fn init(&mut self) {
        self.state = JtagState::Unknown;
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// Reset the scan chain by driving TMS high for 5 clocks
    pub fn mode_reset(&mut self) {
        self.init();
        self.change_mode(JtagState::Reset);
    }

    /// Use TMS to get into `state`.  Asking for `Unknown` only forgets the current state, so the
    /// next change begins with a reset.  Arriving in a shift state shifts nothing further; to
    /// shift bits, clock the cable directly.
    pub fn change_mode(&mut self, state: JtagState) {
        if state == JtagState::Unknown {
            self.init();
            return;
        }

        while self.state != state {
            if self.state == JtagState::Unknown {
                self.cable.set(Signal::Tms, true);
                for _ in 0..RESET_CLOCKS {
                    self.cable.clock();
                }
                self.state = JtagState::Reset;
            } else {
                let tms = self.state.tms_toward(state);
                self.cable.set(Signal::Tms, tms);
                self.cable.clock();
                self.state = self.state.next(tms);
            }
            trace!("TAP -> {}", self.state);
        }
    }
}
