// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.


use clap::{Parser, Subcommand, ValueEnum};
use serialport::{DataBits, Parity, StopBits};
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use netconn::program::ConfigError;
use netconn::protocol::{MAX_CONNECTION_RETRIES, MAX_WAIT_LOOPS};
use netconn::{
    driver, Download, DownloadKind, Engine, LinkUp, LinkUpConfig, Outcome, PlayerInfo, Reporter, SerialLink,
};

#[derive(Parser)]
#[command(name = "netconn")]
#[command(about = "NETCONN responder for a serial-attached network adapter", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, default_value = "8", value_name = "BITS", value_parser = parse_data_bits)]
    data_bits: DataBits,

    #[arg(long, value_enum, default_value = "none")]
    parity: ParityArg,

    /// Stop bits (1 or 2)
    #[arg(long, default_value = "1", value_name = "BITS", value_parser = parse_stop_bits)]
    stop_bits: StopBits,

    /// Milliseconds between engine polls
    #[arg(long, default_value = "16", value_name = "MS")]
    tick_ms: u64,

    /// Link checks before a word exchange times out
    #[arg(long, default_value_t = MAX_WAIT_LOOPS, value_name = "LOOPS")]
    wait_loops: u32,

    /// Retries before a run is abandoned
    #[arg(long, default_value_t = MAX_CONNECTION_RETRIES, value_parser = clap::value_parser!(i8).range(0..))]
    retries: i8,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register with the adapter and fetch the server's welcome message
    LinkUp {
        /// Player name, at most 7 bytes
        #[arg(long, default_value = "PLAYER")]
        name: String,

        /// Player gender (0 or 1)
        #[arg(long, default_value = "0")]
        gender: u8,

        #[arg(long, default_value = "0")]
        trainer_id: u32,

        #[arg(long, default_value = "Emerald Net Demo 1.0")]
        game_name: String,

        /// Server address the adapter should connect to
        #[arg(long, default_value = "127.0.0.1:9000")]
        server: String,
    },
    /// Download a trainer party
    Battle {
        #[arg(long, default_value = "1")]
        slot: char,
    },
    /// Download a mart inventory
    Mart {
        #[arg(long, default_value = "1")]
        slot: char,
    },
    /// Download a gift egg
    GiftEgg {
        #[arg(long, default_value = "1")]
        slot: char,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ParityArg {
    None,
    Odd,
    Even,
}

impl From<ParityArg> for Parity {
    fn from(parity: ParityArg) -> Self {
        match parity {
            ParityArg::None => Parity::None,
            ParityArg::Odd => Parity::Odd,
            ParityArg::Even => Parity::Even,
        }
    }
}

fn parse_data_bits(bits: &str) -> Result<DataBits, String> {
    match bits {
        "5" => Ok(DataBits::Five),
        "6" => Ok(DataBits::Six),
        "7" => Ok(DataBits::Seven),
        "8" => Ok(DataBits::Eight),
        _ => Err(format!("invalid data bits: {}. Must be 5, 6, 7, or 8", bits)),
    }
}

fn parse_stop_bits(bits: &str) -> Result<StopBits, String> {
    match bits {
        "1" => Ok(StopBits::One),
        "2" => Ok(StopBits::Two),
        _ => Err(format!("invalid stop bits: {}. Must be 1 or 2", bits)),
    }
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0} was cancelled")]
    Cancelled(&'static str),
}

/// Prints a line when waiting starts and a dot per progress marker.
struct DotReporter;

impl Reporter for DotReporter {
    fn waiting(&mut self, program: &'static str) {
        print!("{}: waiting for server", program);
        let _ = io::stdout().flush();
    }

    fn marker(&mut self, _program: &'static str, _index: u16) {
        print!(".");
        let _ = io::stdout().flush();
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let parity = Parity::from(cli.parity);

    println!("Opening serial port: {}", cli.port);
    println!("Settings: {} baud, {:?}, {:?}, {:?}", cli.baud, cli.data_bits, parity, cli.stop_bits);

    let link = match SerialLink::open(&cli.port, cli.baud, cli.data_bits, parity, cli.stop_bits) {
        Ok(link) => link,
        Err(e) => {
            eprintln!("Failed to open serial port: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    spawn_cancel_on_enter(Arc::clone(&cancel));
    println!("Press Enter to cancel.");

    let mut engine = Engine::with_wait_loops(link, cli.wait_loops);
    let tick = Duration::from_millis(cli.tick_ms);

    let result = match cli.command {
        Commands::LinkUp { name, gender, trainer_id, game_name, server } => {
            PlayerInfo::new(&name, gender, trainer_id)
                .map_err(RunError::from)
                .and_then(|player| {
                    let config = LinkUpConfig {
                        player,
                        game_name: game_name.into_bytes(),
                        server_addr: server.into_bytes(),
                        retries: cli.retries,
                    };
                    link_up(&mut engine, config, &cancel, tick)
                })
        }
        Commands::Battle { slot } => download(&mut engine, DownloadKind::Battle, slot, cli.retries, &cancel, tick),
        Commands::Mart { slot } => download(&mut engine, DownloadKind::Mart, slot, cli.retries, &cancel, tick),
        Commands::GiftEgg { slot } => download(&mut engine, DownloadKind::GiftEgg, slot, cli.retries, &cancel, tick),
    };

    if let Err(e) = result {
        eprintln!("\nError: {}", e);
        std::process::exit(1);
    }
}

/// Request cancellation when a line arrives on stdin. EOF does not cancel.
fn spawn_cancel_on_enter(cancel: Arc<AtomicBool>) {
    thread::spawn(move || {
        let mut line = String::new();
        if let Ok(n) = io::stdin().read_line(&mut line) {
            if n > 0 {
                cancel.store(true, Ordering::Relaxed);
            }
        }
    });
}

fn link_up(
    engine: &mut Engine<SerialLink>,
    config: LinkUpConfig,
    cancel: &AtomicBool,
    tick: Duration,
) -> Result<(), RunError> {
    let mut program = LinkUp::new(config, Box::new(DotReporter))?;
    let outcome = driver::run(engine, &mut program, cancel, tick);
    println!();
    println!("Network status: {:?}", program.status());

    if outcome == Outcome::Cancelled {
        return Err(RunError::Cancelled("link-up"));
    }
    if let Some(message) = program.welcome_message() {
        println!("Welcome message: {}", String::from_utf8_lossy(message));
        println!("Raw: {:02X?}", message);
    }
    Ok(())
}

fn download(
    engine: &mut Engine<SerialLink>,
    kind: DownloadKind,
    slot: char,
    retries: i8,
    cancel: &AtomicBool,
    tick: Duration,
) -> Result<(), RunError> {
    let mut program = Download::new(kind, slot, Box::new(DotReporter))?.with_retries(retries);
    let outcome = driver::run(engine, &mut program, cancel, tick);
    println!();

    match (outcome, program.payload()) {
        (Outcome::Finished, Some(payload)) => {
            println!("{} received {} bytes:", kind, payload.len());
            println!("{:02X?}", payload);
            Ok(())
        }
        _ => Err(RunError::Cancelled(kind.name())),
    }
}
