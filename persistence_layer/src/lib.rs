use correlation_core::{
    address::resolve_name, Address, CommonCounterparty, DirectConnection, RunReport,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Input file {0} does not exist")]
    InputSourceMissing(String),
    #[error("No addresses found in the input file")]
    NoAddresses,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// One input list entry: an address plus an optional participant code.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressEntry {
    pub address: Address,
    pub participant_code: Option<String>,
}

/// Raw input row. Both lowercase and uppercase header spellings occur in
/// the wild, so both are accepted.
#[derive(Debug, Deserialize)]
struct InputRow {
    #[serde(default)]
    eth_address: Option<String>,
    #[serde(rename = "ETH_ADDRESS", default)]
    eth_address_upper: Option<String>,
    #[serde(default)]
    participant_code: Option<String>,
    #[serde(rename = "PARTICIPANT_CODE", default)]
    participant_code_upper: Option<String>,
}

/// Read the ordered input address list from a CSV file.
///
/// A missing file or an empty list is fatal: the run cannot start without
/// addresses. Individual bad entries are skipped with a warning.
pub fn read_address_list<P: AsRef<Path>>(path: P) -> Result<Vec<AddressEntry>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PersistenceError::InputSourceMissing(
            path.display().to_string(),
        ));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut entries = Vec::new();

    for row in reader.deserialize::<InputRow>() {
        let row = row?;
        let raw = match row.eth_address.or(row.eth_address_upper) {
            Some(value) if !value.trim().is_empty() => value,
            _ => continue,
        };
        let participant_code = row
            .participant_code
            .or(row.participant_code_upper)
            .filter(|code| !code.trim().is_empty());

        let address = if raw.trim().starts_with("0x") || raw.trim().starts_with("0X") {
            match Address::parse(&raw) {
                Ok(address) => address,
                Err(_) => {
                    warn!("Skipping invalid address: {}", raw.trim());
                    continue;
                }
            }
        } else {
            // Name resolution is a stub lookup only.
            match resolve_name(raw.trim()) {
                Some(address) => {
                    info!("Resolved {} to {}", raw.trim(), address);
                    address
                }
                None => {
                    warn!("Skipping unresolvable entry: {}", raw.trim());
                    continue;
                }
            }
        };

        entries.push(AddressEntry {
            address,
            participant_code,
        });
    }

    if entries.is_empty() {
        return Err(PersistenceError::NoAddresses);
    }

    info!("Loaded {} addresses from {}", entries.len(), path.display());
    Ok(entries)
}

/// Per-transaction row of the common-counterparty report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonConnectionRow {
    #[serde(rename = "WALLET")]
    pub wallet: String,
    #[serde(rename = "COMMON_ADDRESS")]
    pub common_address: String,
    #[serde(rename = "TX_HASH")]
    pub tx_hash: String,
    #[serde(rename = "AMOUNT")]
    pub amount: String,
}

/// Per-counterparty row of the summary report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonSummaryRow {
    #[serde(rename = "COMMON_ADDRESS")]
    pub common_address: String,
    #[serde(rename = "SOURCE_ADDRESS_COUNT")]
    pub source_address_count: usize,
    #[serde(rename = "TRANSACTION_COUNT")]
    pub transaction_count: usize,
}

/// One row of the direct-connection report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectConnectionRow {
    #[serde(rename = "PARTICIPANT_CODE")]
    pub participant_code: String,
    #[serde(rename = "WALLET")]
    pub wallet: String,
    #[serde(rename = "TX_HASH")]
    pub tx_hash: String,
    #[serde(rename = "DIRECTION")]
    pub direction: String,
    #[serde(rename = "AMOUNT")]
    pub amount: String,
    #[serde(rename = "TIMESTAMP")]
    pub timestamp: String,
    #[serde(rename = "TYPE")]
    pub tx_type: String,
}

/// Token transfers render their raw unit value with the symbol; everything
/// else renders the ETH approximation.
fn format_amount(record: &correlation_core::TransactionRecord, eth_value: f64) -> String {
    match record.token_symbol.as_deref() {
        Some(symbol) if record.kind == correlation_core::TxKind::TokenTransfer => {
            format!("{} {}", record.value, symbol)
        }
        _ => format!("{} ETH", eth_value),
    }
}

fn common_rows(entry: &CommonCounterparty) -> Vec<CommonConnectionRow> {
    entry
        .observations
        .iter()
        .map(|obs| CommonConnectionRow {
            wallet: obs.source.to_string(),
            common_address: entry.counterparty.to_string(),
            tx_hash: obs.record.hash.clone(),
            amount: format_amount(&obs.record, obs.eth_value),
        })
        .collect()
}

/// CSV sink for run reports.
///
/// Every write replaces the whole file via a temp-file rename, so a crash
/// or abort mid-run leaves the last flushed state intact rather than a
/// half-written file. Callers flush after each batch and once at the end.
#[derive(Debug, Clone)]
pub struct CsvReportWriter {
    output_dir: PathBuf,
}

impl CsvReportWriter {
    /// Create the writer, making the output directory if needed.
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Write the per-transaction common-counterparty report.
    /// Returns the number of rows written.
    pub fn write_common_report(&self, report: &RunReport, file_name: &str) -> Result<usize> {
        let rows: Vec<CommonConnectionRow> =
            report.entries.iter().flat_map(|e| common_rows(e)).collect();
        self.write_rows(file_name, &rows)?;
        debug!("Saved {} records to {}", rows.len(), file_name);
        Ok(rows.len())
    }

    /// Write the per-counterparty summary report.
    pub fn write_common_summary(&self, report: &RunReport, file_name: &str) -> Result<usize> {
        let rows: Vec<CommonSummaryRow> = report
            .entries
            .iter()
            .map(|entry| CommonSummaryRow {
                common_address: entry.counterparty.to_string(),
                source_address_count: entry.interaction_count,
                transaction_count: entry.observations.len(),
            })
            .collect();
        self.write_rows(file_name, &rows)?;
        Ok(rows.len())
    }

    /// Write the direct-connection report.
    pub fn write_direct_connections(
        &self,
        connections: &[DirectConnection],
        file_name: &str,
    ) -> Result<usize> {
        let rows: Vec<DirectConnectionRow> = connections
            .iter()
            .map(|conn| DirectConnectionRow {
                participant_code: conn.participant_code.clone().unwrap_or_default(),
                wallet: conn.source.to_string(),
                tx_hash: conn.record.hash.clone(),
                direction: conn.direction.to_string(),
                amount: format_amount(&conn.record, conn.eth_value),
                timestamp: conn.record.datetime().to_rfc3339(),
                tx_type: conn.record.kind.to_string(),
            })
            .collect();
        self.write_rows(file_name, &rows)?;
        Ok(rows.len())
    }

    fn write_rows<T: Serialize>(&self, file_name: &str, rows: &[T]) -> Result<()> {
        let final_path = self.path_for(file_name);
        let tmp_path = self.output_dir.join(format!("{}.tmp", file_name));

        {
            let mut writer = csv::Writer::from_path(&tmp_path)?;
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }

        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }
}
