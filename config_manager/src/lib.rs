use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] ConfigError),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// Which analysis the run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Find counterparties shared by multiple input addresses.
    Common,
    /// Check each input address for transactions with one fixed target.
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Etherscan API configuration
    pub etherscan: EtherscanConfig,

    /// Batch processing and pacing
    pub batch: BatchConfig,

    /// Correlation thresholds, mode and exclusions
    pub correlation: CorrelationConfig,

    /// Input/output file locations
    pub io: IoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtherscanConfig {
    /// Etherscan API key, injected into every request
    pub api_key: String,

    /// Etherscan API base URL
    pub api_base_url: String,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Maximum retry attempts per query
    pub max_retries: u32,

    /// Base backoff delay after a rate-limit response; retry n waits base * (n+1)
    pub rate_limit_base_delay_ms: u64,

    /// Base backoff delay after a transport failure; retry n waits base * (n+1)
    pub transport_base_delay_ms: u64,

    /// Rows requested per query (single page; very active addresses truncate)
    pub page_size: u32,

    /// Pacing delay between the three history queries for one address
    pub request_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Addresses per batch
    pub batch_size: usize,

    /// Sleep between batches in milliseconds
    pub batch_delay_ms: u64,

    /// Pacing delay between addresses within a batch
    pub request_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Analysis mode
    pub mode: AnalysisMode,

    /// Minimum distinct input addresses a counterparty must interact with
    /// (common mode only)
    pub min_common_addresses: usize,

    /// Exclude the built-in exchange/service address list from results
    pub exclude_services: bool,

    /// Additional addresses to exclude, from configuration
    pub extra_exclusions: Vec<String>,

    /// Fixed target address (direct mode only)
    pub target_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoConfig {
    /// Input CSV with eth_address and optional participant_code columns
    pub input_csv: String,

    /// Directory for result files, created if missing
    pub output_dir: String,

    /// Common-counterparty transaction output (common mode)
    pub common_output_file: String,

    /// Common-counterparty summary output (common mode)
    pub summary_output_file: String,

    /// Direct-connection output (direct mode)
    pub direct_output_file: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            etherscan: EtherscanConfig {
                api_key: "".to_string(), // Must be set in .env or config file
                api_base_url: "https://api.etherscan.io/api".to_string(),
                request_timeout_seconds: 10,
                max_retries: 3,
                rate_limit_base_delay_ms: 5_000,
                transport_base_delay_ms: 2_000,
                page_size: 10_000,
                request_delay_ms: 500,
            },
            batch: BatchConfig {
                batch_size: 5,
                batch_delay_ms: 2_000,
                request_delay_ms: 500,
            },
            correlation: CorrelationConfig {
                mode: AnalysisMode::Common,
                min_common_addresses: 2,
                exclude_services: true,
                extra_exclusions: Vec::new(),
                target_address: None,
            },
            io: IoConfig {
                input_csv: "addresses.csv".to_string(),
                output_dir: "results".to_string(),
                common_output_file: "common_connections.csv".to_string(),
                summary_output_file: "common_addresses_summary.csv".to_string(),
                direct_output_file: "direct_connections.csv".to_string(),
            },
        }
    }
}

impl EtherscanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "Etherscan API key is required".to_string(),
            ));
        }

        if self.request_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.page_size == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Page size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_common_addresses == 0 {
            return Err(ConfigurationError::InvalidValue(
                "min_common_addresses must be at least 1".to_string(),
            ));
        }

        match self.mode {
            AnalysisMode::Direct => {
                let target = self.target_address.as_deref().unwrap_or("");
                if !looks_like_address(target) {
                    return Err(ConfigurationError::InvalidValue(format!(
                        "Direct mode requires a valid target_address, got '{}'",
                        target
                    )));
                }
            }
            AnalysisMode::Common => {}
        }

        for address in &self.extra_exclusions {
            if !looks_like_address(address) {
                return Err(ConfigurationError::InvalidValue(format!(
                    "Invalid exclusion address: '{}'",
                    address
                )));
            }
        }

        Ok(())
    }
}

/// Shallow shape check; full canonicalization happens in the core crate.
fn looks_like_address(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.len() == 42
        && trimmed[..2].eq_ignore_ascii_case("0x")
        && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit())
}

impl SystemConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config_builder = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&SystemConfig::default())?);

        // Add config file if it exists
        if config_path.as_ref().exists() {
            info!(
                "Loading configuration from: {}",
                config_path.as_ref().display()
            );
            config_builder = config_builder.add_source(File::from(config_path.as_ref()));
        } else {
            debug!("Config file not found, using defaults and environment variables");
        }

        // Add environment variables with prefix
        config_builder = config_builder.add_source(
            Environment::with_prefix("CORRELATOR")
                .try_parsing(true)
                .separator("__")
                .list_separator(","),
        );

        let config = config_builder.build()?;
        let system_config: SystemConfig = config.try_deserialize()?;

        system_config.validate()?;

        Ok(system_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.etherscan.validate()?;
        self.batch.validate()?;
        self.correlation.validate()?;

        if self.io.input_csv.is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "Input CSV path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration manager for loading and managing system configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: SystemConfig,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Result<Self> {
        let config = SystemConfig::load()?;
        info!("Configuration loaded successfully");
        debug!("Configuration: {:#?}", config);

        Ok(Self { config })
    }

    /// Create configuration manager from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = SystemConfig::load_from_path(path)?;
        Ok(Self { config })
    }

    /// Get a reference to the current configuration
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Get a mutable reference to the configuration
    pub fn config_mut(&mut self) -> &mut SystemConfig {
        &mut self.config
    }

    /// Reload configuration from file and environment
    pub fn reload(&mut self) -> Result<()> {
        self.config = SystemConfig::load()?;
        info!("Configuration reloaded");
        Ok(())
    }
}
