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
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use xmodem128::config::{
    DEFAULT_ACK_READ_LIMIT, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_RETRY, DEFAULT_PACKET_TIMEOUT,
    DEFAULT_SYNC_ATTEMPTS,
};
use xmodem128::{FileStore, SerialChannel, XmodemConfig, XmodemError};

#[derive(Parser)]
#[command(name = "xmodem128")]
#[command(about = "XMODEM-CRC file transfer with 128-byte packets over RS-232", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "9600")]
    baud: u32,

    #[arg(long, value_enum, default_value_t = DataBitsArg::Eight, value_name = "BITS")]
    data_bits: DataBitsArg,

    #[arg(long, value_enum, default_value_t = ParityArg::None)]
    parity: ParityArg,

    #[arg(long, value_enum, default_value_t = StopBitsArg::One, value_name = "BITS")]
    stop_bits: StopBitsArg,

    /// Delay in milliseconds between bytes written to the port
    #[arg(long, default_value = "0", value_name = "MS")]
    byte_delay: u64,

    /// Per-byte read timeout while packets are flowing
    #[arg(long, default_value_t = DEFAULT_PACKET_TIMEOUT.as_millis() as u64, value_name = "MS")]
    packet_timeout: u64,

    /// Per-byte read timeout during sync and end of transmission
    #[arg(long, default_value_t = DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64, value_name = "MS")]
    handshake_timeout: u64,

    /// Sync attempts (and EOT attempts) before giving up
    #[arg(long, default_value_t = DEFAULT_SYNC_ATTEMPTS, value_name = "N")]
    sync_attempts: u32,

    /// Reads without an ACK before a packet is abandoned
    #[arg(long, default_value_t = DEFAULT_MAX_RETRY, value_name = "N")]
    max_retry: u32,

    /// Hard ceiling on reads while waiting for any single ACK
    #[arg(long, default_value_t = DEFAULT_ACK_READ_LIMIT, value_name = "N")]
    ack_read_limit: u32,

    /// Do not send CAN to the peer when the transfer fails
    #[arg(long)]
    no_cancel: bool,

    /// Print "Ready to ..." and "Finished" on the line around the transfer
    #[arg(long)]
    announce: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file
    Send {
        /// File to send
        file: PathBuf,
    },
    /// Receive into a file (created or truncated)
    Receive {
        /// File to write
        file: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DataBitsArg {
    #[value(name = "5")]
    Five,
    #[value(name = "6")]
    Six,
    #[value(name = "7")]
    Seven,
    #[value(name = "8")]
    Eight,
}

impl From<DataBitsArg> for DataBits {
    fn from(arg: DataBitsArg) -> Self {
        match arg {
            DataBitsArg::Five => DataBits::Five,
            DataBitsArg::Six => DataBits::Six,
            DataBitsArg::Seven => DataBits::Seven,
            DataBitsArg::Eight => DataBits::Eight,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ParityArg {
    None,
    Odd,
    Even,
}

impl From<ParityArg> for Parity {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => Parity::None,
            ParityArg::Odd => Parity::Odd,
            ParityArg::Even => Parity::Even,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StopBitsArg {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

impl From<StopBitsArg> for StopBits {
    fn from(arg: StopBitsArg) -> Self {
        match arg {
            StopBitsArg::One => StopBits::One,
            StopBitsArg::Two => StopBits::Two,
        }
    }
}

impl Cli {
    fn xmodem_config(&self) -> XmodemConfig {
        XmodemConfig {
            handshake_timeout: Duration::from_millis(self.handshake_timeout),
            packet_timeout: Duration::from_millis(self.packet_timeout),
            sync_attempts: self.sync_attempts,
            max_retry: self.max_retry,
            ack_read_limit: self.ack_read_limit,
            cancel_on_abort: !self.no_cancel,
            announce: self.announce,
        }
    }
}

fn init_logging(debug: bool) {
    let level = if debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = cli.xmodem_config();
    let data_bits = DataBits::from(cli.data_bits);
    let parity = Parity::from(cli.parity);
    let stop_bits = StopBits::from(cli.stop_bits);

    println!("Opening serial port: {}", cli.port);
    println!("Settings: {} baud, {:?}, {:?}, {:?}", cli.baud, data_bits, parity, stop_bits);

    let mut channel = match SerialChannel::open(&cli.port, cli.baud, data_bits, parity, stop_bits) {
        Ok(port) => port.with_byte_delay(Duration::from_millis(cli.byte_delay)),
        Err(e) => {
            eprintln!("Failed to open serial port: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Send { file } => {
            println!("\nSending file: {}", file.display());
            if let Err(e) = send_file(&mut channel, &file, &config) {
                eprintln!("Send failed: {}", e);
                std::process::exit(1);
            }
            println!("\nFile sent successfully!");
        }
        Commands::Receive { file } => {
            println!("\nReceiving into: {}", file.display());
            if let Err(e) = receive_file(&mut channel, &file, &config) {
                eprintln!("Receive failed: {}", e);
                std::process::exit(1);
            }
            println!("\nFile received successfully!");
        }
    }
}

fn send_file(channel: &mut SerialChannel, path: &Path, config: &XmodemConfig) -> Result<(), XmodemError> {
    let file = File::open(path)?;
    let mut store = FileStore::new(file);
    xmodem128::send(channel, &mut store, config)
}

fn receive_file(channel: &mut SerialChannel, path: &Path, config: &XmodemConfig) -> Result<(), XmodemError> {
    let file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    let mut store = FileStore::new(file);
    xmodem128::receive(channel, &mut store, config)
}
