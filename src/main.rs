mod app;
mod color;
mod config;
mod data;
mod error;
mod plot;
mod reduce;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;

use config::VizConfig;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args_os().skip(1);
    let Some(input) = args.next().map(PathBuf::from) else {
        eprintln!("Usage: hypermap <concepts.json>");
        return ExitCode::from(2);
    };
    if args.next().is_some() {
        log::warn!("ignoring extra arguments after {}", input.display());
    }

    match visualize(&input) {
        Ok(output) => {
            println!("Visualization saved to {}", output.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn visualize(input: &std::path::Path) -> anyhow::Result<PathBuf> {
    let config = VizConfig::from_env().context("reading HYPERMAP_* settings")?;
    let output = app::run(input, &config)
        .with_context(|| format!("visualizing {}", input.display()))?;
    Ok(output)
}
