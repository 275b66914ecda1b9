use crate::{Address, AddressHistory, CounterpartyObservation, Direction, TransactionRecord};
use std::collections::BTreeMap;
use tracing::debug;

/// Derive the set of distinct counterparties for one source address.
///
/// Walks every record across all three namespaces, classifies direction by
/// comparing the canonical `from`/`to` against the source, and drops
/// records that are unrelated to the source or are self-transfers.
/// The output map is ordered so downstream iteration is deterministic.
pub fn extract_counterparties(
    source: &Address,
    history: &AddressHistory,
) -> BTreeMap<Address, Vec<CounterpartyObservation>> {
    let mut counterparties: BTreeMap<Address, Vec<CounterpartyObservation>> = BTreeMap::new();
    let mut unrelated = 0usize;

    for record in history.iter_all() {
        match classify(source, record) {
            Some((counterparty, direction)) => {
                let counterparty = counterparty.clone();
                let observation = CounterpartyObservation {
                    source: source.clone(),
                    counterparty: counterparty.clone(),
                    direction,
                    eth_value: record.eth_value(),
                    observed_at: record.datetime(),
                    record: record.clone(),
                };
                counterparties.entry(counterparty).or_default().push(observation);
            }
            None => unrelated += 1,
        }
    }

    if unrelated > 0 {
        debug!(
            "Skipped {} unrelated/self records while extracting counterparties for {}",
            unrelated, source
        );
    }

    counterparties
}

/// Work out the counterparty and direction of a record relative to `source`.
///
/// Returns None for contract creations, records that touch the source on
/// neither side, and self-transfers.
fn classify<'a>(
    source: &Address,
    record: &'a TransactionRecord,
) -> Option<(&'a Address, Direction)> {
    let to = record.to.as_ref();

    let (counterparty, direction) = if &record.from == source {
        (to?, Direction::Outgoing)
    } else if to == Some(source) {
        (&record.from, Direction::Incoming)
    } else {
        return None;
    };

    if counterparty == source {
        return None;
    }

    Some((counterparty, direction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TxKind;

    fn addr(last: &str) -> Address {
        Address::parse(&format!("0x{:0>40}", last)).unwrap()
    }

    fn record(from: &Address, to: Option<&Address>, hash: &str, kind: TxKind) -> TransactionRecord {
        TransactionRecord {
            hash: hash.to_string(),
            from: from.clone(),
            to: to.cloned(),
            value: 1_000_000_000_000_000_000,
            block_number: 100,
            timestamp: 1_700_000_000,
            kind,
            token_name: None,
            token_symbol: None,
        }
    }

    #[test]
    fn classifies_direction_both_ways() {
        let source = addr("aa");
        let other = addr("bb");

        let history = AddressHistory {
            normal: vec![
                record(&source, Some(&other), "h1", TxKind::Normal),
                record(&other, Some(&source), "h2", TxKind::Normal),
            ],
            ..Default::default()
        };

        let map = extract_counterparties(&source, &history);
        let observations = map.get(&other).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].direction, Direction::Outgoing);
        assert_eq!(observations[1].direction, Direction::Incoming);
    }

    #[test]
    fn drops_unrelated_and_self_transfers() {
        let source = addr("aa");
        let other = addr("bb");
        let third = addr("cc");

        let history = AddressHistory {
            normal: vec![
                // Neither side is the source.
                record(&other, Some(&third), "h1", TxKind::Normal),
                // Self-transfer.
                record(&source, Some(&source), "h2", TxKind::Normal),
                // Contract creation.
                record(&source, None, "h3", TxKind::Normal),
            ],
            ..Default::default()
        };

        assert!(extract_counterparties(&source, &history).is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let source = addr("aa");
        let b = addr("bb");
        let c = addr("cc");

        let history = AddressHistory {
            normal: vec![record(&c, Some(&source), "h1", TxKind::Normal)],
            internal: vec![record(&source, Some(&b), "h2", TxKind::Internal)],
            token: vec![record(&b, Some(&source), "h3", TxKind::TokenTransfer)],
        };

        let first = extract_counterparties(&source, &history);
        let second = extract_counterparties(&source, &history);

        let keys1: Vec<_> = first.keys().cloned().collect();
        let keys2: Vec<_> = second.keys().cloned().collect();
        assert_eq!(keys1, keys2);
        assert_eq!(first.get(&b).unwrap().len(), second.get(&b).unwrap().len());
    }

    #[test]
    fn annotates_eth_value_and_timestamp() {
        let source = addr("aa");
        let other = addr("bb");

        let history = AddressHistory {
            normal: vec![record(&source, Some(&other), "h1", TxKind::Normal)],
            ..Default::default()
        };

        let map = extract_counterparties(&source, &history);
        let obs = &map.get(&other).unwrap()[0];
        assert!((obs.eth_value - 1.0).abs() < f64::EPSILON);
        assert_eq!(obs.observed_at.timestamp(), 1_700_000_000);
    }
}
