// SPDX-License-Identifier: GPL-2.0

mod allocator;
mod cli;
mod engine;
mod error;
mod logging;
mod pool;
mod sink;

use std::process::ExitCode;

use clap::Parser;

use cli::Cli;
use engine::Engine;
use sink::SinkTable;

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mode = cli.mode();

    let sinks = SinkTable::open(&cli.sinks)?;

    engine::ignore_sigpipe();
    let stdin = std::io::stdin();
    let engine = Engine::new(stdin, sinks, mode, cli.block_size);
    engine.run()?;
    Ok(())
}

fn main() -> ExitCode {
    logging::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("funnel: {e}");
            ExitCode::FAILURE
        }
    }
}
