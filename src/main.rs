use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use lochat::app;
use lochat::cli::Args;

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    app::run(args)
}
