use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod audio;
mod cli;
mod config;
mod decoder;
mod encoder;
mod job;
mod mode;
mod packet;
mod pipeline;
mod player;
mod port;
mod recorder;
mod run;
mod serial;
mod stats;
mod vocoder;
mod worker;

#[cfg(test)]
mod testing;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Cli::parse();
    match args.cmd {
        cli::Cmd::Run(opts) => run::run(opts),
        cli::Cmd::Modes => {
            run::modes();
            Ok(())
        }
    }
}
