//! Implement the `Cable` trait for a bank of microcontroller GPIOs.  Any pin in the bank can be
//! given any signal, so every pin has to be able to switch between input and output.
use alloc::vec::Vec;
use embedded_hal::{delay::DelayNs, digital::{InputPin, OutputPin, PinState}};
use log::error;

use crate::cable::{Cable, Direction, PinMap, Signal, MAX_PINS};
use crate::error::Error;

/// A GPIO that can change direction at run time
pub trait FlexPin: InputPin + OutputPin {
    fn set_as_input(&mut self) -> Result<(), Self::Error>;
    fn set_as_output(&mut self) -> Result<(), Self::Error>;
}

fn check<E: core::fmt::Debug>(pin: u8, result: Result<(), E>) {
    if let Err(e) = result {
        error!("GPIO {}: {:?}", pin, e);
    }
}

pub struct Gpio<P, Delay> where P: FlexPin, Delay: DelayNs {
    half_period: u32,
    delay: Delay,
    pins: Vec<P>,
    map: PinMap,
}

impl<P, Delay> Gpio<P, Delay> where P: FlexPin, Delay: DelayNs {
    /// Take over `pins`, at most `MAX_PINS` of them, all of which start as inputs.  Pin n of the
    /// cable is `pins[n]`.
    pub fn new(freq_khz: u32, mut pins: Vec<P>, delay: Delay) -> Gpio<P, Delay> {
        let period_ns = 1_000_000 / freq_khz.max(1);
        let half_period = period_ns / 2;

        pins.truncate(MAX_PINS);
        for (n, pin) in pins.iter_mut().enumerate() {
            check(n as u8, pin.set_as_input());
        }
        let map = PinMap::new(pins.len() as u8);
        Gpio { half_period, delay, pins, map }
    }

    /// Give the pins back
    pub fn release(mut self) -> Vec<P> {
        self.init();
        self.pins
    }

    fn drive(&mut self, pin: u8, level: bool) {
        if let Some(p) = self.pins.get_mut(pin as usize) {
            check(pin, p.set_state(PinState::from(level)));
        }
    }

    fn sample(&mut self, pin: u8) -> bool {
        match self.pins.get_mut(pin as usize).map(|p| p.is_high()) {
            Some(Ok(level)) => level,
            Some(Err(e)) => {
                error!("GPIO {}: {:?}", pin, e);
                false
            }
            None => false,
        }
    }

    /// Drive low, then let go
    fn float(&mut self, pin: u8) {
        self.drive(pin, false);
        if let Some(p) = self.pins.get_mut(pin as usize) {
            check(pin, p.set_as_input());
        }
    }
}

impl<P, Delay> Cable for Gpio<P, Delay> where P: FlexPin, Delay: DelayNs {
    fn pin_count(&self) -> u8 {
        self.map.pin_count()
    }

    fn init(&mut self) {
        let count = self.map.pin_count();
        let map = core::mem::replace(&mut self.map, PinMap::new(count));
        for (signal, pin) in map.iter() {
            if signal.direction() == Direction::Output {
                self.float(pin);
            }
        }
    }

    fn configure(&mut self, signal: Signal, pin: Option<u8>) -> Result<(), Error> {
        let old = self.map.bind(signal, pin)?;
        if old == pin {
            return Ok(());
        }
        if let Some(old) = old {
            if signal.direction() == Direction::Output {
                self.float(old);
            }
        }
        if let Some(pin) = pin {
            let p = &mut self.pins[pin as usize];
            match signal.direction() {
                Direction::Output => {
                    check(pin, p.set_low());
                    check(pin, p.set_as_output());
                }
                Direction::Input => check(pin, p.set_as_input()),
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
            self.drive(pin, level);
        }
    }

    fn get(&mut self, signal: Signal) -> bool {
        match self.map.get(signal) {
            Some(pin) => self.sample(pin),
            None => false,
        }
    }

    fn levels(&mut self) -> u32 {
        (0..self.map.pin_count())
            .filter(|pin| self.sample(*pin))
            .fold(0, |levels, pin| levels | 1 << pin)
    }

    fn clock(&mut self) {
        let Some(pin) = self.map.get(Signal::Tck) else {
            return;
        };
        self.drive(pin, true);
        self.delay.delay_ns(self.half_period);
        self.drive(pin, false);
        self.delay.delay_ns(self.half_period);
    }
}
