//! Librarian audit - command line entry point
//!
//! Reads configuration from the environment (and `.env`), applies command
//! line overrides, runs one audit and prints the run summary as JSON.

use std::fs;

use anyhow::{Context, Result};

use librarian_audit::cli::{CliOptions, USAGE};
use librarian_audit::services::logging::init_tracing;
use librarian_audit::{Config, run_audit};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let options = CliOptions::from_args()?;
    if options.help {
        print!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::from_env()?;
    options.apply(&mut config);
    init_tracing(config.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting librarian-audit");

    let report = run_audit(config).await?;

    if let Some(output) = &options.output {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(&report).context("Failed to serialize report")?;
        fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;
        tracing::info!(path = %output.display(), "Report written");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report.summary).context("Failed to serialize summary")?
    );
    Ok(())
}
