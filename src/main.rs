//! onboard-e2e - repeated end-to-end runs of smart device onboarding
//!
//! Drives the companion app on an Android phone through one onboarding
//! variant N times and reports how many runs reached the final page.

use clap::Parser;
use onboard::commands::RunArgs;
use onboard::common::{logging, Config};
use onboard::{cli, Error};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "onboard-e2e", about = "End-to-end onboarding test runner")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    run: RunArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.run.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };

    let log_dir = cli
        .run
        .log_dir
        .clone()
        .or_else(|| config.logging.dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let session = match logging::init(&log_dir) {
        Ok(session) => session,
        Err(e) => fail(&e),
    };
    tracing::info!(log = %session.path().display(), "Logging to file");

    let result = cli::run(cli.run, config).await;
    let exit_code = match &result {
        Ok(report) => {
            cli::print_report(report);
            0
        }
        Err(e) => {
            log_error(e);
            1
        }
    };

    session.close();
    if let Err(e) = result {
        eprintln!("Error: {e}");
    }
    std::process::exit(exit_code);
}

fn fail(e: &Error) -> ! {
    logging::init_stderr();
    log_error(e);
    eprintln!("Error: {e}");
    std::process::exit(1);
}

fn log_error(e: &Error) {
    if e.is_config() {
        tracing::error!("No test was run: {e}");
    } else {
        tracing::error!("{e}");
    }
}
