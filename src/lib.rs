//! This crate finds JTAG ports on boards whose pinout is unknown, and reports what is on the
//! scan chain behind them.  It works at several levels of abstraction.  At the lowest level is
//! the Cable trait: an adapter whose pins can be given any JTAG signal at run time.  Adapters
//! are provided for a bank of embedded-hal GPIOs, for an FT232R in bit-bang mode, and for a
//! simulated board which is handy for trying things out without hardware.
//!
//! The next higher level of abstraction is the JtagSM, which keeps track of the state of the
//! TAPs.  You tell it which state you want (e.g., Reset or ShiftDR) and it gets there one TMS
//! bit at a time, starting with a reset if it doesn't know where the TAPs are.
//!
//! Chain sits on top of JtagSM.  With all four signals assigned, it measures the combined
//! instruction register length, counts the devices, and reads each device's ID code.
//!
//! Finally, Knocker tries every assignment of TCK and TMS, and then of TDO and TDI, looking for
//! a live TAP.  Each assignment that looks right is handed to Chain::detect and reported.
//!
//! # Example
//! ```
//! use jtag_knock::cable::sim::{SimBoard, SimTap, Wiring};
//! use jtag_knock::chain::Chain;
//! use jtag_knock::knock::{Knocker, KnockMode};
//! use jtag_knock::statemachine::JtagSM;
//!
//! let wiring = Wiring { tck: 5, tms: 2, tdi: 0, tdo: 7 };
//! let board = SimBoard::new(8, wiring, vec![SimTap::new(4).with_idcode(0x4ba00477)]);
//! let mut knocker = Knocker::new(Chain::new(JtagSM::new(Box::new(board))));
//!
//! let mut found = vec![];
//! knocker.scan(KnockMode::Reset, 8, |finding| found.push(finding)).unwrap();
//! assert_eq!(found[0].candidate.tck, 5);
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod cable;
pub mod chain;
pub mod error;
pub mod knock;
pub mod statemachine;

pub use error::Error;
