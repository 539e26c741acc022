//! Pin-level JTAG adapters live here.  Unlike a conventional JTAG cable, the signals are not tied
//! to fixed pins: each logical signal can be bound to any physical pin at run time, which is what
//! makes it possible to search for an unknown wiring.  Hardware adapters should implement the
//! `Cable` trait.
use core::fmt;
use core::str::FromStr;

use alloc::string::ToString;

use crate::error::Error;

pub mod gpio;
pub mod sim;
#[cfg(feature = "std")]
pub mod ft232r;

/// Number of physical pins a `Cable` can address.  Snapshots of every pin level are returned as
/// a `u32` with bit n holding pin n.
pub const MAX_PINS: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    Tck = 0,
    Tms = 1,
    Tdi = 2,
    Tdo = 3,
    Trst = 4,
    Srst = 5,
    Rtck = 6,
}

impl Signal {
    pub const COUNT: usize = 7;

    pub const ALL: [Signal; Signal::COUNT] = [
        Signal::Tck, Signal::Tms, Signal::Tdi, Signal::Tdo,
        Signal::Trst, Signal::Srst, Signal::Rtck,
    ];

    /// Direction as seen from the adapter: TDO and RTCK are driven by the target.
    pub fn direction(self) -> Direction {
        match self {
            Signal::Tdo | Signal::Rtck => Direction::Input,
            _ => Direction::Output,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Signal::Tck => "TCK",
            Signal::Tms => "TMS",
            Signal::Tdi => "TDI",
            Signal::Tdo => "TDO",
            Signal::Trst => "TRST",
            Signal::Srst => "SRST",
            Signal::Rtck => "RTCK",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signal::ALL
            .iter()
            .copied()
            .find(|signal| signal.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Unrecognised { kind: "signal", name: s.to_string() })
    }
}

/// Which physical pin, if any, each signal is bound to.  No two signals ever share a pin.
#[derive(Clone, Debug)]
pub struct PinMap {
    pins: [Option<u8>; Signal::COUNT],
    pin_count: u8,
}

impl PinMap {
    pub fn new(pin_count: u8) -> Self {
        Self {
            pins: [None; Signal::COUNT],
            pin_count: pin_count.min(MAX_PINS as u8),
        }
    }

    pub fn pin_count(&self) -> u8 {
        self.pin_count
    }

    pub fn get(&self, signal: Signal) -> Option<u8> {
        self.pins[signal as usize]
    }

    /// The signal currently occupying `pin`
    pub fn owner(&self, pin: u8) -> Option<Signal> {
        Signal::ALL.iter().copied().find(|s| self.pins[*s as usize] == Some(pin))
    }

    /// Bind `signal` to `pin`, or unbind it if `pin` is `None`.  Returns the pin the signal
    /// occupied before the call.  On error the existing binding is left untouched.
    pub fn bind(&mut self, signal: Signal, pin: Option<u8>) -> Result<Option<u8>, Error> {
        if let Some(pin) = pin {
            if pin >= self.pin_count {
                return Err(Error::PinOutOfRange { pin, count: self.pin_count });
            }
            match self.owner(pin) {
                Some(owner) if owner != signal => return Err(Error::PinInUse { pin, owner }),
                _ => {}
            }
        }
        Ok(core::mem::replace(&mut self.pins[signal as usize], pin))
    }

    /// Every bound signal and its pin
    pub fn iter(&self) -> impl Iterator<Item = (Signal, u8)> + '_ {
        Signal::ALL.iter().filter_map(|s| self.get(*s).map(|pin| (*s, pin)))
    }
}

pub trait Cable {
    /// Number of physical pins available for binding, at most `MAX_PINS`.
    fn pin_count(&self) -> u8;
    /// Release every signal.  Outputs are driven low and then returned to inputs.
    fn init(&mut self);
    /// Bind `signal` to `pin`, or release it with `None`.  Fails if the pin is out of range or
    /// is bound to a different signal.  Moving a bound signal releases its previous pin.
    fn configure(&mut self, signal: Signal, pin: Option<u8>) -> Result<(), Error>;
    /// The pin `signal` is bound to
    fn pin(&self, signal: Signal) -> Option<u8>;

    fn is_bound(&self, signal: Signal) -> bool {
        self.pin(signal).is_some()
    }

    /// Drive an output signal.  Does nothing for inputs or unbound signals.
    fn set(&mut self, signal: Signal, level: bool);
    /// Sample a signal.  Unbound signals read low.
    fn get(&mut self, signal: Signal) -> bool;
    /// Sample every pin at once, bit n holding pin n.
    fn levels(&mut self) -> u32;
    /// Issue one complete TCK period, rising edge then falling edge.  Blocks until done.
    fn clock(&mut self);
}
