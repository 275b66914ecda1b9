use correlation_core::{Address, TxKind};
use serde::{Deserialize, Serialize};

/// Sentinel upper bound covering the full historical block range.
pub const MAX_BLOCK: u64 = 99_999_999;

/// One account-history query against the provider.
#[derive(Debug, Clone)]
pub struct TxQuery {
    pub kind: TxKind,
    pub address: Address,
    pub start_block: u64,
    pub end_block: u64,
    pub page: u32,
    /// Page size; only the first page is fetched.
    pub offset: u32,
    pub sort_desc: bool,
}

impl TxQuery {
    /// Full-history descending query for one address and namespace.
    pub fn full_history(kind: TxKind, address: &Address, page_size: u32) -> Self {
        Self {
            kind,
            address: address.clone(),
            start_block: 0,
            end_block: MAX_BLOCK,
            page: 1,
            offset: page_size,
            sort_desc: true,
        }
    }

    /// Etherscan `action` parameter for this query's namespace.
    pub fn action(&self) -> &'static str {
        match self.kind {
            TxKind::Normal => "txlist",
            TxKind::Internal => "txlistinternal",
            TxKind::TokenTransfer => "tokentx",
        }
    }
}

/// Raw provider row. All numeric fields arrive as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: String,
    #[serde(rename = "timeStamp", default)]
    pub time_stamp: String,
    #[serde(rename = "tokenName", default)]
    pub token_name: Option<String>,
    #[serde(rename = "tokenSymbol", default)]
    pub token_symbol: Option<String>,
}

/// Etherscan response envelope.
///
/// `status` is "1" on success and "0" otherwise; `result` is a row array on
/// success and free-form text on most errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtherscanEnvelope {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

/// Structured classification of a provider response.
///
/// This is the only place the provider's message-substring heuristics live;
/// everything downstream works off these variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderStatus {
    /// Successful response; rows deserialized from `result`.
    Rows(Vec<RawTransaction>),
    /// "No transactions found" - a successful empty result, not an error.
    NoData,
    /// Provider asked us to back off.
    RateLimited,
    /// Any other non-success status.
    Error(String),
}

/// Classify a provider envelope into a structured status.
pub fn classify_envelope(envelope: &EtherscanEnvelope) -> ProviderStatus {
    if envelope.status == "0" {
        if envelope.message.contains("rate limit") {
            return ProviderStatus::RateLimited;
        }
        if envelope.message.contains("No transactions found") {
            return ProviderStatus::NoData;
        }
        let detail = if envelope.message.is_empty() {
            "Unknown error".to_string()
        } else {
            envelope.message.clone()
        };
        return ProviderStatus::Error(detail);
    }

    match serde_json::from_value::<Vec<RawTransaction>>(envelope.result.clone()) {
        Ok(rows) => ProviderStatus::Rows(rows),
        Err(e) => ProviderStatus::Error(format!("Unexpected result payload: {}", e)),
    }
}
