use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command, value_parser};

pub(super) const CONFIG_ARG: &str = "config";
pub(super) const PID_FILE_ARG: &str = "pid-file";
pub(super) const INTERVAL_ARG: &str = "interval-ms";

pub(super) fn root_cli() -> Command {
    Command::new("relay")
        .about("Relays queue messages into a key-value store in rate limited batches")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(add_processor_subcommand())
        .subcommand(add_producer_subcommand())
}

fn config_arg() -> Arg {
    Arg::new(CONFIG_ARG)
        .long(CONFIG_ARG)
        .value_name("PATH")
        .value_parser(value_parser!(PathBuf))
        .help("TOML or JSON settings file, RELAY_ environment variables override it")
}

fn add_processor_subcommand() -> Command {
    Command::new("processor")
        .about("Consumes the topic and writes every window's batch to the sink")
        .arg(config_arg())
        .arg(
            Arg::new(PID_FILE_ARG)
                .long(PID_FILE_ARG)
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Writes the process id to this file while running"),
        )
}

fn add_producer_subcommand() -> Command {
    Command::new("producer")
        .about("Publishes {id, timestamp} messages on the topic")
        .arg(config_arg())
        .arg(
            Arg::new(INTERVAL_ARG)
                .long(INTERVAL_ARG)
                .value_name("N")
                .value_parser(value_parser!(u64).range(1..))
                .default_value("100")
                .help("Milliseconds between two messages"),
        )
}

pub(super) fn path_arg(matches: &ArgMatches, name: &str) -> Option<PathBuf> {
    matches.get_one::<PathBuf>(name).cloned()
}
