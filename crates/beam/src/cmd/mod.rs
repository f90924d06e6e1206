use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod doctor;
pub mod loopback;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy stdin to stdout through a named stream pair over an in-memory store.
    Loopback(LoopbackArgs),
    /// Run streamer self-checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Loopback(args) => loopback::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Stream name used on both sides.
    #[arg(long)]
    pub name: String,
    /// Backing-store key the envelopes travel under.
    #[arg(long, default_value = beam_stream::config::DEFAULT_WRITE_KEY, env = "BEAM_KEY")]
    pub key: String,
    /// Dispatcher poll interval in milliseconds.
    #[arg(long, default_value = "100", value_name = "MS")]
    pub poll_ms: u64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}
