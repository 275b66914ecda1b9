pub mod client;
pub mod error;
pub mod fetcher;
pub mod provider;
pub mod types;

pub use client::RateLimitedClient;
pub use error::EtherscanError;
pub use fetcher::TransactionHistoryFetcher;
pub use provider::{HttpProvider, TransactionProvider};
pub use types::{classify_envelope, EtherscanEnvelope, ProviderStatus, RawTransaction, TxQuery};
