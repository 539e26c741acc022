//! Errors returned by pin configuration, chain interrogation and knocking.
use alloc::string::String;

use thiserror::Error;

use crate::cable::Signal;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("pin {pin} is out of range, the adapter has {count} pins")]
    PinOutOfRange { pin: u8, count: u8 },

    #[error("pin {pin} is already assigned to {owner}")]
    PinInUse { pin: u8, owner: Signal },

    #[error("no instruction register length found within {0} bits")]
    IrLengthNotFound(usize),

    #[error("no devices found within {0} bypass registers")]
    DevicesNotFound(usize),

    #[error("a scan needs between 4 and {max} pins, {count} requested")]
    PinCount { count: u8, max: u8 },

    #[error("unrecognised {kind} `{name}`")]
    Unrecognised { kind: &'static str, name: String },

    #[cfg(feature = "std")]
    #[error("FTDI adapter error: {0:?}")]
    Ftdi(#[from] libftd2xx::FtStatus),
}
