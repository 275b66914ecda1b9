use crate::{CorrelationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonicalized Ethereum address: lowercase `0x`-prefixed hex.
///
/// All comparisons and map keys go through the canonical form, so two
/// textual representations differing only in case denote the same entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse and canonicalize an address string.
    ///
    /// Accepts any casing; requires the `0x` prefix and 40 hex digits.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let lowered = trimmed.to_lowercase();

        let hex = lowered
            .strip_prefix("0x")
            .ok_or_else(|| CorrelationError::InvalidAddress(trimmed.to_string()))?;

        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CorrelationError::InvalidAddress(trimmed.to_string()));
        }

        Ok(Self(lowered))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = CorrelationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Placeholder name resolution. Real ENS resolution needs an RPC provider,
/// which is out of scope; names resolve only through this fixed table.
pub fn resolve_name(name: &str) -> Option<Address> {
    match name {
        "quicknode.eth" => Address::parse("0x36eb4b67b246ed82504144642f78e38f39b7c7a9").ok(),
        _ => None,
    }
}
