use clap::{Arg, ArgAction, Command};

pub(super) const GET_AS_AUTO: &str = "auto";
pub(super) const GET_AS_TEXT: &str = "text";
pub(super) const GET_AS_INT: &str = "int";

pub(super) fn root_cli() -> Command {
    Command::new("recall")
        .about("Instrumented key-value cache backed by Redis")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(store_subcommand())
        .subcommand(get_subcommand())
        .subcommand(replay_subcommand())
        .subcommand(fetch_subcommand())
        .subcommand(log_stats_subcommand())
}

fn store_subcommand() -> Command {
    Command::new("store")
        .about("Store a value under a new random key and print the key")
        .arg(
            Arg::new("data")
                .help("Value to store")
                .required(true)
                .action(ArgAction::Set),
        )
}

fn get_subcommand() -> Command {
    Command::new("get")
        .about("Read the value stored under a key")
        .arg(
            Arg::new("key")
                .help("Key returned by `store`")
                .required(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("as")
                .long("as")
                .help("How to decode the stored bytes")
                .value_parser([GET_AS_AUTO, GET_AS_TEXT, GET_AS_INT])
                .default_value(GET_AS_AUTO),
        )
}

fn replay_subcommand() -> Command {
    Command::new("replay")
        .about("Print the recorded calls of an operation in call order")
        .arg(
            Arg::new("name")
                .long("name")
                .help("Operation name")
                .default_value(recall_core::STORE_OPERATION),
        )
}

fn fetch_subcommand() -> Command {
    Command::new("fetch")
        .about("Fetch a web page through the page cache")
        .arg(
            Arg::new("url")
                .help("URL of the page")
                .required(true)
                .action(ArgAction::Set),
        )
}

fn log_stats_subcommand() -> Command {
    Command::new("log-stats")
        .about("Summarize the nginx access log collection")
        .arg(
            Arg::new("file")
                .long("file")
                .help("Read the logs from a JSON lines file instead of MongoDB")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            Arg::new("top-ips")
                .long("top-ips")
                .help("Also list the most frequent client addresses")
                .value_parser(clap::value_parser!(usize)),
        )
}
