mod app;
mod cli;
mod config;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match app::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            audit_logging::audit_error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::from(app::exit_code(&err))
        }
    }
}
