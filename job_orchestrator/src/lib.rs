use async_trait::async_trait;
use chrono::{DateTime, Utc};
use config_manager::{AnalysisMode, SystemConfig};
use correlation_core::{
    extract_counterparties, find_direct_connections, Address, AddressHistory, CorrelationEngine,
    Direction, DirectConnection, ExclusionSet,
};
use etherscan_client::{HttpProvider, TransactionHistoryFetcher, TransactionProvider};
use persistence_layer::{read_address_list, AddressEntry, CsvReportWriter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub mod scheduler;
pub use scheduler::{AddressProcessor, BatchOutcome, BatchScheduler, SchedulerState};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] persistence_layer::PersistenceError),
    #[error("Client error: {0}")]
    Client(#[from] etherscan_client::EtherscanError),
    #[error("Address error: {0}")]
    Core(#[from] correlation_core::CorrelationError),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Final accounting for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: AnalysisMode,
    pub total_addresses: usize,
    pub processed: usize,
    pub failed: usize,
    pub aborted: bool,
    /// Rows in the per-transaction output file.
    pub records_written: usize,
    /// Common mode: counterparties that cleared the threshold.
    pub common_counterparties: usize,
    /// Common mode: counterparties dropped as known services.
    pub excluded_services: usize,
    /// Direct mode: transactions received from the target.
    pub incoming: usize,
    /// Direct mode: transactions sent to the target.
    pub outgoing: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Wires the fetch, extract, accumulate and persist stages together and
/// runs them under the batch scheduler in the configured mode.
pub struct RunOrchestrator<P: TransactionProvider> {
    config: SystemConfig,
    fetcher: TransactionHistoryFetcher<P>,
    writer: CsvReportWriter,
}

impl RunOrchestrator<HttpProvider> {
    /// Orchestrator backed by the real Etherscan API.
    pub fn from_config(config: SystemConfig) -> Result<Self> {
        let fetcher = TransactionHistoryFetcher::from_config(&config.etherscan)?;
        Self::with_fetcher(config, fetcher)
    }
}

impl<P: TransactionProvider> RunOrchestrator<P> {
    /// Orchestrator over an arbitrary provider implementation.
    pub fn with_provider(config: SystemConfig, provider: P) -> Result<Self> {
        let fetcher = TransactionHistoryFetcher::new(provider, &config.etherscan);
        Self::with_fetcher(config, fetcher)
    }

    fn with_fetcher(config: SystemConfig, fetcher: TransactionHistoryFetcher<P>) -> Result<Self> {
        let writer = CsvReportWriter::new(&config.io.output_dir)?;
        Ok(Self {
            config,
            fetcher,
            writer,
        })
    }

    pub async fn run(&self) -> Result<RunSummary> {
        match self.config.correlation.mode {
            AnalysisMode::Common => self.run_common().await,
            AnalysisMode::Direct => self.run_direct().await,
        }
    }

    fn build_exclusions(&self) -> Result<ExclusionSet> {
        let base = if self.config.correlation.exclude_services {
            ExclusionSet::known_services()
        } else {
            ExclusionSet::empty()
        };

        let extra = self
            .config
            .correlation
            .extra_exclusions
            .iter()
            .map(|s| Address::parse(s))
            .collect::<correlation_core::Result<Vec<_>>>()?;

        Ok(base.with_extra(extra))
    }

    /// Common-counterparty mode: correlate counterparties across the whole
    /// input set and report the shared ones.
    async fn run_common(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!("=== COMMON ADDRESS DETECTION (run {}) ===", run_id);
        info!("Looking for common counterparties across multiple input addresses");

        let entries = read_address_list(&self.config.io.input_csv)?;
        let exclusions = self.build_exclusions()?;
        let min_common = self.config.correlation.min_common_addresses;

        info!("Minimum connections required: {}", min_common);
        info!(
            "Processing in batches of {} with {}ms delay between batches",
            self.config.batch.batch_size, self.config.batch.batch_delay_ms
        );

        let mut scheduler = BatchScheduler::new(&self.config.batch);
        let mut processor = CommonProcessor {
            fetcher: &self.fetcher,
            writer: &self.writer,
            exclusions: &exclusions,
            engine: CorrelationEngine::new(),
            min_common,
            output_file: &self.config.io.common_output_file,
        };

        let outcome = scheduler.run(&entries, &mut processor).await;

        // Complete filtered report, written once more after the last batch.
        let report = processor.engine.finalize(min_common, &exclusions);
        let records_written = self
            .writer
            .write_common_report(&report, &self.config.io.common_output_file)?;
        self.writer
            .write_common_summary(&report, &self.config.io.summary_output_file)?;

        info!(
            "Found {} common counterparties that interact with at least {} addresses",
            report.entries.len(),
            min_common
        );

        Ok(RunSummary {
            run_id,
            mode: AnalysisMode::Common,
            total_addresses: entries.len(),
            processed: outcome.processed,
            failed: outcome.failed,
            aborted: outcome.aborted,
            records_written,
            common_counterparties: report.entries.len(),
            excluded_services: report.excluded_services,
            incoming: 0,
            outgoing: 0,
            started_at,
            completed_at: Utc::now(),
        })
    }

    /// Direct-connection mode: check every input address against one fixed
    /// target, using the target's own history as a second angle.
    async fn run_direct(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let target = Address::parse(
            self.config
                .correlation
                .target_address
                .as_deref()
                .unwrap_or_default(),
        )?;

        info!("=== DIRECT CONNECTION DETECTION (run {}) ===", run_id);
        info!("Target address: {}", target);

        let entries = read_address_list(&self.config.io.input_csv)?;

        // One upfront fetch; every source is matched against these lists too.
        let target_history = self.fetcher.fetch(&target).await;

        let mut scheduler = BatchScheduler::new(&self.config.batch);
        let mut processor = DirectProcessor {
            fetcher: &self.fetcher,
            writer: &self.writer,
            target: &target,
            target_history,
            connections: Vec::new(),
            output_file: &self.config.io.direct_output_file,
        };

        let outcome = scheduler.run(&entries, &mut processor).await;

        let records_written = self
            .writer
            .write_direct_connections(&processor.connections, &self.config.io.direct_output_file)?;

        let incoming = processor
            .connections
            .iter()
            .filter(|c| c.direction == Direction::Incoming)
            .count();
        let outgoing = processor.connections.len() - incoming;

        info!(
            "Found {} direct transactions with target address ({} incoming, {} outgoing)",
            processor.connections.len(),
            incoming,
            outgoing
        );

        Ok(RunSummary {
            run_id,
            mode: AnalysisMode::Direct,
            total_addresses: entries.len(),
            processed: outcome.processed,
            failed: outcome.failed,
            aborted: outcome.aborted,
            records_written,
            common_counterparties: 0,
            excluded_services: 0,
            incoming,
            outgoing,
            started_at,
            completed_at: Utc::now(),
        })
    }
}

struct CommonProcessor<'a, P: TransactionProvider> {
    fetcher: &'a TransactionHistoryFetcher<P>,
    writer: &'a CsvReportWriter,
    exclusions: &'a ExclusionSet,
    engine: CorrelationEngine,
    min_common: usize,
    output_file: &'a str,
}

#[async_trait]
impl<P: TransactionProvider> AddressProcessor for CommonProcessor<'_, P> {
    async fn process(&mut self, entry: &AddressEntry) -> anyhow::Result<()> {
        let history = self.fetcher.fetch(&entry.address).await;
        let counterparties = extract_counterparties(&entry.address, &history);
        info!(
            "Processed {}: {} counterparties",
            entry.address,
            counterparties.len()
        );
        self.engine.accumulate(&entry.address, counterparties);
        Ok(())
    }

    async fn flush(&mut self, batch_number: usize) -> anyhow::Result<()> {
        let report = self.engine.finalize(self.min_common, self.exclusions);
        let written = self.writer.write_common_report(&report, self.output_file)?;
        debug!("Flushed {} records after batch {}", written, batch_number);
        Ok(())
    }
}

struct DirectProcessor<'a, P: TransactionProvider> {
    fetcher: &'a TransactionHistoryFetcher<P>,
    writer: &'a CsvReportWriter,
    target: &'a Address,
    target_history: AddressHistory,
    connections: Vec<DirectConnection>,
    output_file: &'a str,
}

#[async_trait]
impl<P: TransactionProvider> AddressProcessor for DirectProcessor<'_, P> {
    async fn process(&mut self, entry: &AddressEntry) -> anyhow::Result<()> {
        let history = self.fetcher.fetch(&entry.address).await;
        let connections = find_direct_connections(
            &entry.address,
            entry.participant_code.as_deref(),
            &history,
            self.target,
            &self.target_history,
        );
        self.connections.extend(connections);
        Ok(())
    }

    async fn flush(&mut self, batch_number: usize) -> anyhow::Result<()> {
        let written = self
            .writer
            .write_direct_connections(&self.connections, self.output_file)?;
        debug!("Flushed {} records after batch {}", written, batch_number);
        Ok(())
    }
}
