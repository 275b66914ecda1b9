use anyhow::{bail, Result};
use clap::Parser;
use config_manager::{AnalysisMode, SystemConfig};
use job_orchestrator::RunOrchestrator;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Correlate Ethereum addresses through their shared counterparties, or
/// check them for direct connections to a fixed target address.
#[derive(Parser, Debug)]
#[command(name = "chain_correlator", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Override the analysis mode: common or direct
    #[arg(short, long)]
    mode: Option<String>,

    /// Override the input CSV path
    #[arg(short, long)]
    input: Option<String>,

    /// Override the target address (direct mode)
    #[arg(short, long)]
    target: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = SystemConfig::load_from_path(&cli.config)?;

    if let Some(mode) = cli.mode.as_deref() {
        config.correlation.mode = match mode {
            "common" => AnalysisMode::Common,
            "direct" => AnalysisMode::Direct,
            other => bail!("Unknown mode '{}', expected 'common' or 'direct'", other),
        };
    }
    if let Some(input) = cli.input {
        config.io.input_csv = input;
    }
    if let Some(target) = cli.target {
        config.correlation.target_address = Some(target);
    }
    config.validate()?;

    let output_dir = config.io.output_dir.clone();
    let orchestrator = RunOrchestrator::from_config(config)?;
    let summary = orchestrator.run().await?;

    info!("==================================================");
    match summary.mode {
        AnalysisMode::Common => {
            info!("COMMON ADDRESS ANALYSIS SUMMARY:");
            info!("- Input addresses analyzed: {}", summary.total_addresses);
            info!(
                "- Common counterparties found: {}",
                summary.common_counterparties
            );
            info!("- Total transactions: {}", summary.records_written);
            info!(
                "- Excluded service addresses: {}",
                summary.excluded_services
            );
        }
        AnalysisMode::Direct => {
            info!("INVESTIGATION SUMMARY:");
            info!("- Addresses analyzed: {}", summary.total_addresses);
            info!("- Direct transactions found: {}", summary.records_written);
            info!("  - Incoming (from target): {}", summary.incoming);
            info!("  - Outgoing (to target): {}", summary.outgoing);
        }
    }
    if summary.failed > 0 {
        warn!(
            "- {} of {} addresses failed and contributed no data",
            summary.failed, summary.total_addresses
        );
    }
    if summary.aborted {
        warn!("- Run was aborted; results reflect completed batches only");
    }
    info!("- Results saved to: {}", output_dir);
    info!("==================================================");

    Ok(())
}
