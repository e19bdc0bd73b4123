use clap::Parser;
use tracing_subscriber::prelude::*;

mod cli;
mod commands;
mod domain;
mod remote;
mod services;
mod vcs;

use cli::Cli;
use services::manifest::ManifestError;
use services::orchestrator::FetchFailure;
use services::output::print_err;
use services::storage::LockedError;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "vendr=info".into()),
    );
    // stdout carries command output only
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .init();
}

fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(f) = err.downcast_ref::<FetchFailure>() {
        return f.code();
    }
    if let Some(m) = err.downcast_ref::<ManifestError>() {
        return match m {
            ManifestError::Malformed { .. } => "MANIFEST_INVALID",
            ManifestError::AlreadyVendored(_) | ManifestError::SubpackagesPresent(_) => {
                "MANIFEST_CONFLICT"
            }
            _ => "ERROR",
        };
    }
    if err.downcast_ref::<LockedError>().is_some() {
        return "LOCKED";
    }
    "ERROR"
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = commands::dispatch(&cli) {
        print_err(cli.json, error_code(&e), &format!("{:#}", e));
        std::process::exit(1);
    }
}
