use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod check;
#[cfg(target_os = "linux")]
pub mod drive;
pub mod hub;
pub mod switch;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the VLAN-aware learning switch on stdin/stdout.
    Switch(SwitchArgs),
    /// Run a hub that repeats every frame to every other interface.
    Hub(HubArgs),
    /// Attach network interfaces to a child program through the multiplexer.
    Drive(DriveArgs),
    /// Validate interface specifications and print them.
    Check(CheckArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Switch(args) => switch::run(args),
        Command::Hub(args) => hub::run(args),
        Command::Drive(args) => run_drive(args),
        Command::Check(args) => check::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[cfg(target_os = "linux")]
fn run_drive(args: DriveArgs) -> CliResult<i32> {
    drive::run(args)
}

#[cfg(not(target_os = "linux"))]
fn run_drive(_args: DriveArgs) -> CliResult<i32> {
    Err(crate::exit::CliError::new(
        crate::exit::USAGE,
        "drive needs Linux packet sockets",
    ))
}

#[derive(Args, Debug)]
pub struct SwitchArgs {
    /// Interface specifications in driver order: NAME, NAME[U:v] or NAME[T:v1,v2,...].
    #[arg(required = true, value_name = "SPEC")]
    pub interfaces: Vec<String>,
}

#[derive(Args, Debug)]
pub struct HubArgs {
    /// Interface names in driver order.
    #[arg(required = true, value_name = "NAME")]
    pub interfaces: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DriveArgs {
    /// Network interfaces to attach, numbered from 1 in this order.
    #[arg(required = true, value_name = "IFACE")]
    pub interfaces: Vec<String>,
    /// Do not forward stdin lines to the child as commands.
    #[arg(long)]
    pub no_console: bool,
    /// Child program and its arguments.
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Interface specifications to validate.
    #[arg(required = true, value_name = "SPEC")]
    pub interfaces: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
