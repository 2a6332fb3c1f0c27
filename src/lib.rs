pub mod commands;
pub mod config;
pub mod context;
pub mod copy;
pub mod dism;
pub mod download;
pub mod drivers;
pub mod error;
pub mod iso;
pub mod logging;
pub mod models;
pub mod mount;
pub mod paths;
pub mod payload;
pub mod pipeline;
pub mod repack;
pub mod sys;
pub mod temp;
pub mod version;

#[cfg(test)]
mod test_support;

use std::process::ExitCode;

use clap::Parser;

pub fn run() -> ExitCode {
    let cli = commands::Cli::parse();
    match commands::execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Already logged unless tracing never came up.
            if !tracing::dispatcher::has_been_set() {
                eprintln!("error: {err}");
            }
            ExitCode::FAILURE
        }
    }
}
