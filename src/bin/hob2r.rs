//! Binary entry point (§6, §10.2): parses the command line, wires up a
//! `tracing-subscriber` writer honoring `-v`/`-q`, and runs the pipeline.
//! The library crate never installs a global subscriber itself, only this
//! binary does, so embedders can wire their own.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

use hob2r::cli::Cli;
use hob2r::diagnostic;
use hob2r::pipeline;

/// Always logs to stderr; at `-v -v` and above, also mirrors spans/events
/// into a rolling `hob2r.log` in the working directory, for runs long
/// enough that scrolling stderr away loses the early scan/lower spans.
/// The returned guard must stay alive for the file writer to keep flushing.
fn configure_logging(cli: &Cli) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_filter()));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    if cli.verbose < 2 {
        let _ = tracing_subscriber::registry().with(filter).with(stderr_layer).try_init();
        return None;
    }

    let appender = tracing_appender::rolling::never(".", "hob2r.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
    let _ = tracing_subscriber::registry().with(filter).with(stderr_layer).with(file_layer).try_init();
    Some(guard)
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _log_guard = configure_logging(&cli);

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("creating output file {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    match pipeline::run(&cli, &mut out) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err((sources, diag)) => {
            diagnostic::write(&diag, &sources, &mut io::stderr())
                .context("writing diagnostic to stderr")?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
