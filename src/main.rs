use anyhow::Result;
use clap::Parser as ClapParser;

use helm2cue::cli::{self, Cli};

fn main() -> Result<()> {
    let filter = std::env::var("HELM2CUE_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let cli = Cli::parse();
    let code = cli::run(cli)?;
    std::process::exit(code);
}
