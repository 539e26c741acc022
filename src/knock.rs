//! Searching for a JTAG port on pins whose purpose is unknown.
//!
//! `Knocker` tries every ordered pair of pins as TCK and TMS.  For each pair it has two ways of
//! recognising a live TAP:
//!
//! * `KnockMode::Reset` resets the TAP, walks to Shift-DR and records every pin while clocking.
//!   A pin that emits something shaped like an ID code is a TDO candidate, and the TDI candidate
//!   is the pin whose inversion shows up on that TDO exactly once.
//! * `KnockMode::Bypass` additionally guesses TDI, fills the instruction registers with ones and
//!   then clocks in zeros.  A pin that was high and falls to low after at least two clocks, never
//!   to rise again, is a TDO candidate.
//!
//! Every candidate is handed to `Chain::detect` and reported, whether or not detection works.
use core::fmt;
use core::str::FromStr;

use alloc::string::ToString;
use log::{debug, info};

use crate::cable::{Cable, Signal, MAX_PINS};
use crate::chain::{Chain, ChainInfo};
use crate::error::Error;
use crate::statemachine::JtagState;

/// Most samples recorded from a reset
pub const KNOCK_RESULTS: usize = 1024;
/// Consecutive unchanged samples that end the recording
pub const KNOCK_UNCHANGED: usize = 48;
/// Clocks used to fill the instruction registers in bypass mode
pub const IR_SHIFT_COUNT: usize = 100;
/// Fewest pins worth scanning: TCK, TMS, TDI and TDO
pub const MIN_PINS: u8 = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KnockMode {
    /// Look for an ID code coming out of a freshly reset TAP
    #[default]
    Reset,
    /// Look for the instruction registers passing a zero through
    Bypass,
}

impl fmt::Display for KnockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnockMode::Reset => f.write_str("reset"),
            KnockMode::Bypass => f.write_str("bypass"),
        }
    }
}

impl FromStr for KnockMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("reset") {
            Ok(KnockMode::Reset)
        } else if s.eq_ignore_ascii_case("bypass") {
            Ok(KnockMode::Bypass)
        } else {
            Err(Error::Unrecognised { kind: "scan mode", name: s.to_string() })
        }
    }
}

/// A pin assignment that looks like a JTAG port
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub tck: u8,
    pub tms: u8,
    pub tdo: u8,
    pub tdi: u8,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TCK: {} TMS: {} TDO: {} TDI: {}", self.tck, self.tms, self.tdo, self.tdi)
    }
}

/// A candidate and what `Chain::detect` made of it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Finding {
    pub candidate: Candidate,
    pub chain: Result<ChainInfo, Error>,
}

/// How a TDO candidate behaved while zeros were clocked through the instruction registers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fall {
    Waiting,
    At(usize),
    Bounced,
}

fn bit(levels: u32, pin: u8) -> bool {
    (levels >> pin) & 1 == 1
}

pub struct Knocker<T> {
    pub chain: Chain<T>,
    samples: [u32; KNOCK_RESULTS],
    recorded: usize,
}

impl<T, U> Knocker<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    pub fn new(chain: Chain<T>) -> Self {
        Self {
            chain,
            samples: [0; KNOCK_RESULTS],
            recorded: 0,
        }
    }

    /// Pin levels recorded by the last reset mode knock, one `u32` per clock
    pub fn samples(&self) -> &[u32] {
        &self.samples[..self.recorded]
    }

    fn cable(&mut self) -> &mut U {
        &mut *self.chain.sm.cable
    }

    fn clock(&mut self, count: usize) {
        for _ in 0..count {
            self.cable().clock();
        }
    }

    /// Start from nothing: every pin released and the TAP state forgotten
    fn release(&mut self) {
        self.cable().init();
        self.chain.sm.init();
    }

    /// Try every TCK and TMS pair among pins `0..pin_count`, passing each potential chain to
    /// `report`.  All pins are released afterwards.
    pub fn scan<F>(&mut self, mode: KnockMode, pin_count: u8, mut report: F) -> Result<(), Error>
        where F: FnMut(Finding)
    {
        let max = self.cable().pin_count().min(MAX_PINS as u8);
        if pin_count < MIN_PINS || pin_count > max {
            return Err(Error::PinCount { count: pin_count, max });
        }

        info!("Knocking on {} pins, {} mode", pin_count, mode);
        for tck in 0..pin_count {
            for tms in 0..pin_count {
                if tck != tms {
                    self.knock(mode, tck, tms, pin_count, &mut report)?;
                }
            }
        }
        self.release();
        info!("Done.");
        Ok(())
    }

    /// Try a single TCK and TMS pair
    pub fn knock<F>(&mut self, mode: KnockMode, tck: u8, tms: u8, pin_count: u8, report: &mut F)
        -> Result<(), Error>
        where F: FnMut(Finding)
    {
        debug!("Trying TCK: {} TMS: {}", tck, tms);
        match mode {
            KnockMode::Reset => self.knock_reset(tck, tms, pin_count, report),
            KnockMode::Bypass => self.knock_bypass(tck, tms, pin_count, report),
        }
    }

    fn detect<F>(&mut self, candidate: Candidate, report: &mut F) -> Result<(), Error>
        where F: FnMut(Finding)
    {
        info!("Potential chain: {}", candidate);
        self.cable().configure(Signal::Tdo, Some(candidate.tdo))?;
        let chain = self.chain.detect();
        report(Finding { candidate, chain });
        Ok(())
    }

    fn knock_reset<F>(&mut self, tck: u8, tms: u8, pin_count: u8, report: &mut F)
        -> Result<(), Error>
        where F: FnMut(Finding)
    {
        self.release();
        self.cable().configure(Signal::Tck, Some(tck))?;
        self.cable().configure(Signal::Tms, Some(tms))?;
        self.chain.sm.change_mode(JtagState::ShiftDR);

        let toggled = self.record() & !(1 << tck | 1 << tms) & pin_mask(pin_count);

        let mut candidates = 0u32;
        for pin in 0..pin_count {
            if bit(toggled, pin) && self.shows_idcode(pin) {
                candidates |= 1 << pin;
            }
        }
        if candidates != 0 {
            self.find_tdi(tck, tms, pin_count, candidates, report)?;
        }
        Ok(())
    }

    /// Clock until the pins go quiet, sampling before every clock.  Returns the pins that changed.
    fn record(&mut self) -> u32 {
        self.recorded = 0;
        let mut toggled = 0;
        let mut unchanged = 0;
        let mut prev = self.cable().levels();

        while self.recorded < KNOCK_RESULTS {
            let levels = self.cable().levels();
            let changed = levels ^ prev;
            toggled |= changed;
            prev = levels;
            self.samples[self.recorded] = levels;
            self.recorded += 1;
            self.cable().clock();

            if changed != 0 {
                unchanged = 0;
            } else if self.recorded > 1 {
                // The first sample always matches
                unchanged += 1;
                if unchanged == KNOCK_UNCHANGED {
                    // The sample that ended the run is not kept
                    self.recorded -= 1;
                    break;
                }
            }
        }
        toggled
    }

    /// Whether `pin` carries 32 recorded bits, starting with a one, that are not all ones
    fn shows_idcode(&self, pin: u8) -> bool {
        let samples = self.samples();
        let mut index = 0;
        while index + 32 <= samples.len() {
            if !bit(samples[index], pin) {
                index += 1;
                continue;
            }
            let idcode = samples[index..index + 32]
                .iter()
                .enumerate()
                .fold(0u32, |code, (n, levels)| code | (bit(*levels, pin) as u32) << n);
            if idcode != 0xffff_ffff {
                debug!("Pin {} shows ID code {:08X}", pin, idcode);
                return true;
            }
            index += 32;
        }
        false
    }

    /// Invert each spare pin in turn and watch the TDO candidates.  Bits entering TDI come out on
    /// TDO after the data registers, so the right TDI flips TDO exactly once in the time the
    /// recording took.
    fn find_tdi<F>(&mut self, tck: u8, tms: u8, pin_count: u8, candidates: u32, report: &mut F)
        -> Result<(), Error>
        where F: FnMut(Finding)
    {
        let cycles = self.recorded;
        let last = self.samples().last().copied().unwrap_or(0);

        for tdo in (0..pin_count).filter(|pin| bit(candidates, *pin)) {
            for tdi in 0..pin_count {
                if tdi == tck || tdi == tms || tdi == tdo {
                    continue;
                }
                let level = bit(last, tdi);
                let mut prev = bit(self.cable().levels(), tdo);
                self.cable().configure(Signal::Tdi, Some(tdi))?;
                self.cable().set(Signal::Tdi, !level);

                let mut changes = 0;
                for _ in 0..cycles {
                    let sample = bit(self.cable().levels(), tdo);
                    self.cable().clock();
                    if sample != prev {
                        changes += 1;
                    }
                    prev = sample;
                }

                if changes == 1 {
                    self.detect(Candidate { tck, tms, tdo, tdi }, report)?;
                }

                // Put back what was there and flush it through
                self.cable().set(Signal::Tdi, level);
                self.clock(cycles);
                self.cable().configure(Signal::Tdi, None)?;
                self.cable().configure(Signal::Tdo, None)?;
            }
        }
        Ok(())
    }

    fn knock_bypass<F>(&mut self, tck: u8, tms: u8, pin_count: u8, report: &mut F)
        -> Result<(), Error>
        where F: FnMut(Finding)
    {
        for tdi in 0..pin_count {
            if tdi == tck || tdi == tms {
                continue;
            }
            self.release();
            self.cable().configure(Signal::Tck, Some(tck))?;
            self.cable().configure(Signal::Tms, Some(tms))?;
            self.cable().configure(Signal::Tdi, Some(tdi))?;
            self.cable().set(Signal::Tdi, true);
            self.chain.sm.change_mode(JtagState::ShiftIR);

            self.clock(IR_SHIFT_COUNT);
            let high = self.cable().levels();
            self.cable().set(Signal::Tdi, false);

            let watched = |pin: u8| pin != tck && pin != tms && pin != tdi && bit(high, pin);
            let mut falls = [Fall::Waiting; MAX_PINS];
            for count in 1..IR_SHIFT_COUNT {
                self.cable().clock();
                let levels = self.cable().levels();
                for pin in (0..pin_count).filter(|pin| watched(*pin)) {
                    let fall = &mut falls[pin as usize];
                    *fall = match (*fall, bit(levels, pin)) {
                        (Fall::Waiting, false) => Fall::At(count),
                        (Fall::At(_), true) => Fall::Bounced,
                        (fall, _) => fall,
                    };
                }
            }

            for tdo in 0..pin_count {
                if matches!(falls[tdo as usize], Fall::At(count) if count >= 2) {
                    self.detect(Candidate { tck, tms, tdo, tdi }, report)?;
                    self.cable().configure(Signal::Tdo, None)?;
                }
            }

            self.cable().set(Signal::Tdi, true);
            self.clock(IR_SHIFT_COUNT);
        }
        Ok(())
    }
}

fn pin_mask(pin_count: u8) -> u32 {
    if pin_count as usize >= MAX_PINS {
        u32::MAX
    } else {
        (1 << pin_count) - 1
    }
}
