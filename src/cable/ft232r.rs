//! Implement the `Cable` trait for FTDI FT232R-based adapters, using synchronous bit-bang mode on
//! the eight data pins.  Every byte written updates the outputs and reads back the inputs, so a
//! sample is always taken with the previous byte's outputs applied.
use alloc::vec;
use alloc::vec::Vec;

use libftd2xx::{BitMode, Ftdi, FtdiCommon};
use log::error;

use crate::cable::{Cable, Direction, PinMap, Signal};
use crate::error::Error;

/// The D0-D7 data lines
pub const FT232R_PINS: u8 = 8;

pub struct Ft232r {
    ft: Ftdi,
    map: PinMap,
    // Output latch and direction mask, bit n for pin n
    out: u8,
    mask: u8,
}

impl Ft232r {
    /// Open the adapter whose description matches `description`, as passed to
    /// `Ftdi::with_description`.  Every pin starts as an input.
    pub fn new(description: &str, baud: u32) -> Result<Self, Error> {
        let mut ft = Ftdi::with_description(description)?;
        ft.set_baud_rate(baud)?;
        ft.set_bit_mode(0, BitMode::SyncBitbang)?;
        ft.purge_all()?;

        Ok(Self {
            ft,
            map: PinMap::new(FT232R_PINS),
            out: 0,
            mask: 0,
        })
    }

    /// Write `buf` and return what the pins read while it went out
    fn transfer(&mut self, buf: &[u8]) -> Vec<u8> {
        let mut recv = vec![0; buf.len()];
        if let Err(e) = self.ft.write(buf).and_then(|_| self.ft.read(&mut recv)) {
            error!("FT232R transfer failed: {:?}", e);
        }
        recv
    }

    fn update_mask(&mut self, mask: u8) {
        self.mask = mask;
        if let Err(e) = self.ft.set_bit_mode(mask, BitMode::SyncBitbang) {
            error!("FT232R direction change failed: {:?}", e);
        }
    }

    /// Drive low, then let go
    fn float(&mut self, pin: u8) {
        self.out &= !(1 << pin);
        self.transfer(&[self.out]);
        self.update_mask(self.mask & !(1 << pin));
    }

    /// Sample the pins with the current outputs applied
    fn sample(&mut self) -> u8 {
        let out = self.out;
        self.transfer(&[out, out])[1]
    }
}

impl Cable for Ft232r {
    fn pin_count(&self) -> u8 {
        self.map.pin_count()
    }

    fn init(&mut self) {
        self.map = PinMap::new(FT232R_PINS);
        self.out = 0;
        self.transfer(&[0]);
        self.update_mask(0);
    }

    fn configure(&mut self, signal: Signal, pin: Option<u8>) -> Result<(), Error> {
        let old = self.map.bind(signal, pin)?;
        if old == pin {
            return Ok(());
        }
        let output = signal.direction() == Direction::Output;
        if let (Some(old), true) = (old, output) {
            self.float(old);
        }
        if let (Some(pin), true) = (pin, output) {
            self.out &= !(1 << pin);
            self.update_mask(self.mask | 1 << pin);
            self.transfer(&[self.out]);
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
        let Some(pin) = self.map.get(signal) else {
            return;
        };
        if level {
            self.out |= 1 << pin;
        } else {
            self.out &= !(1 << pin);
        }
        self.transfer(&[self.out]);
    }

    fn get(&mut self, signal: Signal) -> bool {
        match self.map.get(signal) {
            Some(pin) => (self.sample() >> pin) & 1 == 1,
            None => false,
        }
    }

    fn levels(&mut self) -> u32 {
        self.sample() as u32
    }

    fn clock(&mut self) {
        let Some(tck) = self.map.get(Signal::Tck) else {
            return;
        };
        let low = self.out & !(1 << tck);
        self.transfer(&[low | 1 << tck, low]);
        self.out = low;
    }
}
