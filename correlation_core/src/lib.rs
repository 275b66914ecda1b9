pub mod address;
pub mod correlation;
pub mod direct;
pub mod exclusions;
pub mod extractor;

pub use address::Address;
pub use correlation::{CommonCounterparty, CorrelationEngine, RunReport};
pub use direct::{find_direct_connections, DirectConnection};
pub use exclusions::ExclusionSet;
pub use extractor::extract_counterparties;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorrelationError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, CorrelationError>;

/// Which query namespace a transaction record came from.
///
/// Hashes are only unique within a namespace: a token transfer carries the
/// hash of the transaction that emitted it, so dedup keys must pair the
/// kind with the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Normal,
    Internal,
    #[serde(rename = "token")]
    TokenTransfer,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Normal => "normal",
            TxKind::Internal => "internal",
            TxKind::TokenTransfer => "token",
        }
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer direction relative to the source address under analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger transaction or transfer event, normalized from a provider row.
///
/// Immutable once built by the history fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction hash. Unique within its kind + query-source context only.
    pub hash: String,

    /// Sender address.
    pub from: Address,

    /// Recipient address. None for contract creation.
    pub to: Option<Address>,

    /// Transferred value in the smallest denomination (wei, or raw token units).
    pub value: u128,

    /// Block the transaction was mined in.
    pub block_number: u64,

    /// Unix timestamp (seconds).
    pub timestamp: i64,

    /// Query namespace this record came from.
    pub kind: TxKind,

    /// Token name, token transfers only.
    pub token_name: Option<String>,

    /// Token symbol, token transfers only.
    pub token_symbol: Option<String>,
}

impl TransactionRecord {
    /// ETH-equivalent value. Integer wei divided by 10^18 as an f64
    /// approximation; the precision loss is accepted, the exact wei value
    /// stays available in `value`.
    pub fn eth_value(&self) -> f64 {
        self.value as f64 / 1e18
    }

    /// Record timestamp as a UTC datetime (ISO-8601 when displayed).
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default()
    }
}

/// Full single-page history for one address, split by query namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressHistory {
    pub normal: Vec<TransactionRecord>,
    pub internal: Vec<TransactionRecord>,
    pub token: Vec<TransactionRecord>,
}

impl AddressHistory {
    pub fn iter_all(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.normal
            .iter()
            .chain(self.internal.iter())
            .chain(self.token.iter())
    }

    pub fn total(&self) -> usize {
        self.normal.len() + self.internal.len() + self.token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// A single sighting of a counterparty from the perspective of one source
/// address. Ephemeral: produced per source, consumed by the correlation
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterpartyObservation {
    /// The input address whose history produced this observation.
    pub source: Address,

    /// The other side of the transaction.
    pub counterparty: Address,

    /// Direction relative to `source`.
    pub direction: Direction,

    /// ETH-equivalent value, see `TransactionRecord::eth_value`.
    pub eth_value: f64,

    /// Record timestamp as a UTC datetime.
    pub observed_at: DateTime<Utc>,

    /// The underlying transaction record.
    pub record: TransactionRecord,
}
