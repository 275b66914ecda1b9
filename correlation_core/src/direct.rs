use crate::{Address, AddressHistory, Direction, TransactionRecord, TxKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// A transaction directly between one source address and the fixed target.
///
/// Sources are reported independently; there is no cross-source
/// accumulation in this mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectConnection {
    pub source: Address,
    pub participant_code: Option<String>,
    pub direction: Direction,
    /// ETH-equivalent value, see `TransactionRecord::eth_value`.
    pub eth_value: f64,
    pub record: TransactionRecord,
}

/// Find all transactions connecting `source` with `target`.
///
/// Both histories are scanned: the source's own lists and the target's
/// lists, so a transfer only visible from the target's side is still
/// caught. (kind, hash) dedup keeps a transaction seen from both angles
/// counted once. Results are sorted newest block first.
pub fn find_direct_connections(
    source: &Address,
    participant_code: Option<&str>,
    source_history: &AddressHistory,
    target: &Address,
    target_history: &AddressHistory,
) -> Vec<DirectConnection> {
    let mut connections: Vec<DirectConnection> = Vec::new();
    let mut seen: HashSet<(TxKind, String)> = HashSet::new();

    let mut push = |record: &TransactionRecord, direction: Direction| {
        if seen.insert((record.kind, record.hash.clone())) {
            connections.push(DirectConnection {
                source: source.clone(),
                participant_code: participant_code.map(str::to_string),
                direction,
                eth_value: record.eth_value(),
                record: record.clone(),
            });
        }
    };

    for record in source_history.iter_all() {
        if let Some(direction) = classify_pair(record, source, target) {
            push(record, direction);
        }
    }

    // Bidirectional lookup: the same pair seen from the target's history.
    for record in target_history.iter_all() {
        if let Some(direction) = classify_pair(record, source, target) {
            push(record, direction);
        }
    }

    connections.sort_by(|a, b| b.record.block_number.cmp(&a.record.block_number));

    if connections.is_empty() {
        debug!("No direct connection between {} and {}", source, target);
    } else {
        info!(
            "Found {} transactions connecting {} with {}",
            connections.len(),
            source,
            target
        );
    }

    connections
}

/// Direction of a record that links `source` and `target`, if it does.
fn classify_pair(
    record: &TransactionRecord,
    source: &Address,
    target: &Address,
) -> Option<Direction> {
    let to = record.to.as_ref()?;

    if &record.from == source && to == target {
        Some(Direction::Outgoing)
    } else if &record.from == target && to == source {
        Some(Direction::Incoming)
    } else {
        None
    }
}
