use crate::client::RateLimitedClient;
use crate::error::EtherscanError;
use crate::provider::{HttpProvider, TransactionProvider};
use crate::types::{RawTransaction, TxQuery};
use config_manager::EtherscanConfig;
use correlation_core::{Address, AddressHistory, TransactionRecord, TxKind};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retrieves the normal, internal and token-transfer history for one
/// address, normalizing raw provider rows into `TransactionRecord`s.
///
/// Queries run strictly sequentially with a pacing delay between them to
/// stay under the provider's shared rate limit. Only the first page is
/// fetched; a full page means a very active address was truncated.
#[derive(Debug)]
pub struct TransactionHistoryFetcher<P: TransactionProvider> {
    client: RateLimitedClient<P>,
    page_size: u32,
    request_delay: Duration,
}

impl TransactionHistoryFetcher<HttpProvider> {
    /// Fetcher backed by the real Etherscan HTTP API.
    pub fn from_config(config: &EtherscanConfig) -> Result<Self, EtherscanError> {
        let provider = HttpProvider::new(config)?;
        Ok(Self::new(provider, config))
    }
}

impl<P: TransactionProvider> TransactionHistoryFetcher<P> {
    pub fn new(provider: P, config: &EtherscanConfig) -> Self {
        Self {
            client: RateLimitedClient::new(provider, config),
            page_size: config.page_size,
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// Fetch all three transaction namespaces for one address.
    ///
    /// Never fails: each query degrades to an empty list on its own, so the
    /// caller always gets whatever partial history was retrievable.
    pub async fn fetch(&self, address: &Address) -> AddressHistory {
        info!("Getting transactions for {}", address);

        let normal = self.fetch_kind(address, TxKind::Normal).await;
        sleep(self.request_delay).await;

        let internal = self.fetch_kind(address, TxKind::Internal).await;
        sleep(self.request_delay).await;

        let token = self.fetch_kind(address, TxKind::TokenTransfer).await;

        info!(
            "History for {}: {} normal, {} internal, {} token transfers",
            address,
            normal.len(),
            internal.len(),
            token.len()
        );

        AddressHistory {
            normal,
            internal,
            token,
        }
    }

    async fn fetch_kind(&self, address: &Address, kind: TxKind) -> Vec<TransactionRecord> {
        let query = TxQuery::full_history(kind, address, self.page_size);
        let rows = self.client.request(&query).await;

        if rows.len() as u32 >= self.page_size {
            warn!(
                "{} returned a full page ({} rows) for {}; older history is truncated",
                query.action(),
                rows.len(),
                address
            );
        }

        normalize_rows(rows, kind)
    }
}

/// Convert raw rows into records, dropping malformed ones.
///
/// Rows missing hash, from or to, or with unparseable numeric fields, are
/// dropped silently apart from a count in the logs.
fn normalize_rows(rows: Vec<RawTransaction>, kind: TxKind) -> Vec<TransactionRecord> {
    let total = rows.len();
    let records: Vec<TransactionRecord> = rows
        .into_iter()
        .filter_map(|row| normalize_row(row, kind))
        .collect();

    let dropped = total - records.len();
    if dropped > 0 {
        debug!("Dropped {} malformed {} rows of {}", dropped, kind, total);
    }

    records
}

fn normalize_row(row: RawTransaction, kind: TxKind) -> Option<TransactionRecord> {
    if row.hash.is_empty() || row.from.is_empty() || row.to.is_empty() {
        return None;
    }

    let from = Address::parse(&row.from).ok()?;
    let to = Address::parse(&row.to).ok()?;
    let value = row.value.parse::<u128>().ok()?;
    let block_number = row.block_number.parse::<u64>().ok()?;
    let timestamp = row.time_stamp.parse::<i64>().ok()?;

    Some(TransactionRecord {
        hash: row.hash,
        from,
        to: Some(to),
        value,
        block_number,
        timestamp,
        kind,
        token_name: row.token_name.filter(|s| !s.is_empty()),
        token_symbol: row.token_symbol.filter(|s| !s.is_empty()),
    })
}
