//! Command-line argument parsing.
//!
//! Grounded on the original Go `cli/cli.go`'s flag set: `-c` for the config
//! path, `-v` to print the version and exit, rebuilt on `clap`'s derive API.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "kinesis-log-agent", about = "Tails files and ships them to a streaming ingestion sink.", disable_version_flag = true)]
pub struct Args {
    /// Path to the TOML configuration document. Required unless `-v` is given.
    #[arg(short = 'c', long = "config", value_name = "PATH", required_unless_present = "print_version")]
    pub config: Option<PathBuf>,

    /// Print the version and exit.
    #[arg(short = 'v', long = "version")]
    pub print_version: bool,
}

pub fn parse_args() -> Args {
    Args::parse()
}
