use crate::error::EtherscanError;
use crate::types::{EtherscanEnvelope, TxQuery};
use async_trait::async_trait;
use config_manager::EtherscanConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Transport seam for the transaction-history provider.
///
/// The rate-limited client and fetcher are generic over this trait so tests
/// can script responses without a network.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    async fn send(&self, query: &TxQuery) -> Result<EtherscanEnvelope, EtherscanError>;
}

/// HTTP implementation against the Etherscan account API.
///
/// The API key is injected here, once, for every request.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    pub fn new(config: &EtherscanConfig) -> Result<Self, EtherscanError> {
        if config.api_key.is_empty() {
            return Err(EtherscanError::Config(
                "Etherscan API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl TransactionProvider for HttpProvider {
    async fn send(&self, query: &TxQuery) -> Result<EtherscanEnvelope, EtherscanError> {
        let sort = if query.sort_desc { "desc" } else { "asc" };

        debug!(
            "Etherscan request: action={} address={} page={} offset={}",
            query.action(),
            query.address,
            query.page,
            query.offset
        );

        let params = [
            ("module", "account".to_string()),
            ("action", query.action().to_string()),
            ("address", query.address.to_string()),
            ("startblock", query.start_block.to_string()),
            ("endblock", query.end_block.to_string()),
            ("page", query.page.to_string()),
            ("offset", query.offset.to_string()),
            ("sort", sort.to_string()),
            ("apikey", self.api_key.clone()),
        ];

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await?;

        let envelope: EtherscanEnvelope = response.json().await?;
        Ok(envelope)
    }
}
