use std::io;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::filter::EnvFilter;

use crate::flags::{Cli, Command};

mod dump;
mod flags;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Dump(args) => dump::command_dump(&args, &mut out),
    }
}
