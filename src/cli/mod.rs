//! Command-line interface definitions for the `otc-machine` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. The
//! driver flags come from the static table in `flags.rs` and are attached as
//! global arguments, so they may appear before or after the subcommand.

use clap::{Arg, ArgAction, Command, CommandFactory, Parser, value_parser};

use crate::flags::{self, FlagKind, FlagSpec};

/// Identifier of the machine name argument.
pub(crate) const NAME_ARG: &str = "name";

/// Top-level CLI for the `otc-machine` binary.
#[derive(Clone, Copy, Debug, Parser)]
#[command(
    name = "otc-machine",
    about = "Provision and manage a Docker host on Open Telekom Cloud",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision the machine and every resource it needs.
    #[command(name = "create")]
    Create,
    /// Power the instance on.
    #[command(name = "start")]
    Start,
    /// Power the instance off.
    #[command(name = "stop")]
    Stop,
    /// Power the instance off and on again.
    #[command(name = "restart")]
    Restart,
    /// Power the instance off immediately.
    #[command(name = "kill")]
    Kill,
    /// Delete the instance and every resource the driver created.
    #[command(name = "rm")]
    Rm,
    /// Print the machine state.
    #[command(name = "status")]
    Status,
    /// Print the machine address.
    #[command(name = "ip")]
    Ip,
    /// Print the Docker endpoint URL.
    #[command(name = "url")]
    Url,
    /// Print the host name used for SSH.
    #[command(name = "ssh-hostname")]
    SshHostname,
}

fn flag_arg(spec: &'static FlagSpec) -> Arg {
    let mut arg = Arg::new(spec.name)
        .long(spec.name)
        .help(spec.usage)
        .global(true);
    if let Some(env) = spec.env_var {
        arg = arg.env(env);
    }
    match spec.kind {
        FlagKind::Bool => arg.action(ArgAction::SetTrue),
        FlagKind::Int => with_default(arg.action(ArgAction::Set), spec)
            .value_parser(value_parser!(i64)),
        FlagKind::Text => with_default(arg.action(ArgAction::Set), spec),
    }
}

fn with_default(arg: Arg, spec: &'static FlagSpec) -> Arg {
    if spec.default.is_empty() {
        arg
    } else {
        arg.default_value(spec.default)
    }
}

/// Builds the full command: subcommands, machine name and driver flags.
pub(crate) fn command() -> Command {
    let base = Cli::command().arg(
        Arg::new(NAME_ARG)
            .long("name")
            .short('n')
            .value_name("MACHINE")
            .required(true)
            .help("Machine name; also the instance name"),
    );
    flags::CREATE_FLAGS
        .iter()
        .fold(base, |command, spec| command.arg(flag_arg(spec)))
}
