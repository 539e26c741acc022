use std::io::{self, BufRead, Write};
use std::num::ParseIntError;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use jtag_knock::cable::sim::{SimBoard, SimTap, Wiring};
use jtag_knock::cable::{self, Cable};
use jtag_knock::chain::Chain;
use jtag_knock::knock::{KnockMode, Knocker};
use jtag_knock::statemachine::{JtagSM, JtagState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
/// Knock on a simulated board from a small console
struct Args {
    #[arg(short, long, default_value_t = 8)]
    /// Number of board pins
    pins: u8,
    #[arg(short, long, default_value = "0,1,2,3")]
    /// Board pins the target's TCK,TMS,TDI,TDO are on
    wiring: String,
    #[arg(long)]
    /// ID code of each device, nearest TDO first, or "none" for a BYPASS-only device
    idcode: Vec<String>,
    #[arg(long, default_value_t = 4)]
    /// Instruction register length of every device
    ir_len: usize,
}

#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect the devices on the configured chain
    Chain,
    /// Knock on pins 0..PINS
    Scan {
        pins: u8,
        mode: Option<KnockMode>,
    },
    /// Show the TAP state, or move to another
    Tap {
        state: Option<JtagState>,
    },
    /// Issue clock pulses
    Clock {
        count: usize,
    },
    /// Control a single signal
    Signal {
        name: cable::Signal,
        #[command(subcommand)]
        action: SignalAction,
    },
    /// List the signal assignments
    Config,
    /// Show or change the message level
    Message {
        level: Option<String>,
    },
    Quit,
}

#[derive(Subcommand, Debug)]
enum SignalAction {
    Pin { pin: u8 },
    Release,
    Get,
    Set { level: u8 },
}

/// ID codes are always hex, with or without the 0x prefix
fn parse_idcode(x: &str) -> Result<u32, ParseIntError> {
    if let Some(hex) = x.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        u32::from_str_radix(x, 16)
    }
}

fn board(args: &Args) -> Result<SimBoard, String> {
    let pins = args.wiring
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("bad wiring: {}", e))?;
    let [tck, tms, tdi, tdo] = pins[..] else {
        return Err("wiring needs four pins".into());
    };
    if let Some(pin) = pins.iter().find(|pin| **pin >= args.pins) {
        return Err(format!("wiring uses pin {} but the board has {}", pin, args.pins));
    }

    if args.ir_len == 0 {
        return Err("IR length must be at least 1".into());
    }

    let mut taps = vec![];
    for idcode in &args.idcode {
        let tap = SimTap::new(args.ir_len);
        if idcode.eq_ignore_ascii_case("none") {
            taps.push(tap);
        } else {
            let idcode = parse_idcode(idcode).map_err(|e| format!("bad ID code {}: {}", idcode, e))?;
            taps.push(tap.with_idcode(idcode));
        }
    }
    if taps.is_empty() {
        taps.push(SimTap::new(args.ir_len).with_idcode(0x4ba00477));
    }
    Ok(SimBoard::new(args.pins, Wiring { tck, tms, tdi, tdo }, taps))
}

fn execute(knocker: &mut Knocker<Box<SimBoard>>, command: Command) -> Result<bool, jtag_knock::Error> {
    match command {
        Command::Chain => {
            knocker.chain.detect()?;
        }
        Command::Scan { pins, mode } => {
            knocker.scan(mode.unwrap_or_default(), pins, |finding| {
                if let Err(e) = finding.chain {
                    println!("{} ({})", finding.candidate, e);
                }
            })?;
        }
        Command::Tap { state } => {
            if let Some(state) = state {
                knocker.chain.sm.change_mode(state);
            }
            println!("TAP state: {}", knocker.chain.sm.state());
        }
        Command::Clock { count } => {
            for _ in 0..count {
                knocker.chain.sm.cable.clock();
            }
        }
        Command::Signal { name, action } => {
            let cable = &mut knocker.chain.sm.cable;
            match action {
                SignalAction::Pin { pin } => {
                    cable.configure(name, Some(pin))?;
                    // The TAP may be a different one now
                    knocker.chain.sm.init();
                }
                SignalAction::Release => {
                    cable.configure(name, None)?;
                    knocker.chain.sm.init();
                }
                SignalAction::Get => println!("{}: {}", name, cable.get(name) as u8),
                SignalAction::Set { level } => cable.set(name, level != 0),
            }
        }
        Command::Config => {
            let cable = &knocker.chain.sm.cable;
            for signal in cable::Signal::ALL {
                match cable.pin(signal) {
                    Some(pin) => println!("{:>5}: {}", signal, pin),
                    None => println!("{:>5}: -", signal),
                }
            }
        }
        Command::Message { level } => {
            if let Some(level) = level {
                match level.parse::<LevelFilter>() {
                    Ok(level) => log::set_max_level(level),
                    Err(_) => eprintln!("unknown level {}", level),
                }
            }
            println!("Message level: {}", log::max_level());
        }
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

fn main() {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Trace).format_timestamp(None).parse_default_env();
    builder.init();
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(LevelFilter::Info);
    }

    let args = Args::parse();
    let board = match board(&args) {
        Ok(board) => board,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    let mut knocker = Knocker::new(Chain::new(JtagSM::new(Box::new(board))));

    println!("JTAG Knocker");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().expect("flush");
        let Some(Ok(line)) = lines.next() else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match Line::try_parse_from(line.split_whitespace()) {
            Ok(line) => line.command,
            Err(e) => {
                let _ = e.print();
                continue;
            }
        };
        match execute(&mut knocker, command) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("Error: {}", e),
        }
    }
}
