use crate::error::EtherscanError;
use crate::provider::TransactionProvider;
use crate::types::{classify_envelope, ProviderStatus, RawTransaction, TxQuery};
use config_manager::EtherscanConfig;
use retry_utils::{retry_with_backoff, RetryConfig, RetryableError};
use tracing::{debug, error, warn};

/// Wraps provider calls with bounded retry and backoff.
///
/// Every failure mode degrades to an empty result so callers proceed with
/// partial data: the run never aborts because one query failed. Rate-limit
/// and transport errors are retried with their own delay ramps; anything
/// else is logged and swallowed immediately.
#[derive(Debug)]
pub struct RateLimitedClient<P: TransactionProvider> {
    provider: P,
    retry: RetryConfig,
}

impl<P: TransactionProvider> RateLimitedClient<P> {
    pub fn new(provider: P, config: &EtherscanConfig) -> Self {
        Self {
            provider,
            retry: RetryConfig {
                max_retries: config.max_retries,
                rate_limit_base_delay_ms: config.rate_limit_base_delay_ms,
                transport_base_delay_ms: config.transport_base_delay_ms,
            },
        }
    }

    /// Issue one query, retrying recoverable failures.
    ///
    /// Always returns rows; exhausted retries and non-recoverable API errors
    /// are logged with the address, query kind and attempt count, then
    /// downgraded to an empty result.
    pub async fn request(&self, query: &TxQuery) -> Vec<RawTransaction> {
        let result = retry_with_backoff(
            || self.request_once(query),
            &self.retry,
            |e: &EtherscanError| match e {
                EtherscanError::RateLimited => RetryableError::RateLimit,
                EtherscanError::Http(_) | EtherscanError::Json(_) => RetryableError::Transport,
                _ => RetryableError::Other,
            },
        )
        .await;

        match result {
            Ok(rows) => rows,
            Err(EtherscanError::RateLimited) => {
                error!(
                    "Rate limit persisted through {} attempts for {} ({}); continuing with empty result",
                    self.retry.max_retries + 1,
                    query.address,
                    query.action()
                );
                Vec::new()
            }
            Err(EtherscanError::Api { message }) => {
                warn!(
                    "API error for {} ({}): {}; continuing with empty result",
                    query.address,
                    query.action(),
                    message
                );
                Vec::new()
            }
            Err(e) => {
                error!(
                    "Request failed after {} attempts for {} ({}): {}; continuing with empty result",
                    self.retry.max_retries + 1,
                    query.address,
                    query.action(),
                    e
                );
                Vec::new()
            }
        }
    }

    async fn request_once(&self, query: &TxQuery) -> Result<Vec<RawTransaction>, EtherscanError> {
        let envelope = self.provider.send(query).await?;

        match classify_envelope(&envelope) {
            ProviderStatus::Rows(rows) => Ok(rows),
            ProviderStatus::NoData => {
                debug!("No transactions found for {} ({})", query.address, query.action());
                Ok(Vec::new())
            }
            ProviderStatus::RateLimited => Err(EtherscanError::RateLimited),
            ProviderStatus::Error(message) => Err(EtherscanError::Api { message }),
        }
    }
}
