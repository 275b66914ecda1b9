use crate::{Address, CounterpartyObservation, ExclusionSet, TxKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Per-counterparty accumulator state.
///
/// The source set only grows during a run, and observation dedup is keyed
/// on (kind, hash) so a transaction seen from two query angles counts once.
#[derive(Debug, Default, Clone)]
struct CounterpartyEntry {
    sources: BTreeSet<Address>,
    observations: Vec<CounterpartyObservation>,
    seen: HashSet<(TxKind, String)>,
}

/// Aggregates counterparty observations across the whole input address set.
///
/// Single-writer: mutated only by the scheduler's sequential walk. The
/// accumulation step is order-independent (set union + hash dedup), so the
/// finalized report does not depend on processing order.
#[derive(Debug, Default)]
pub struct CorrelationEngine {
    accumulator: BTreeMap<Address, CounterpartyEntry>,
}

/// One counterparty that cleared the minimum-interaction threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonCounterparty {
    pub counterparty: Address,
    /// Number of distinct input addresses that touched this counterparty.
    pub interaction_count: usize,
    pub sources: Vec<Address>,
    pub observations: Vec<CounterpartyObservation>,
}

/// Final filtered, deterministically sorted output of a correlation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub entries: Vec<CommonCounterparty>,
    /// Total counterparties seen before filtering.
    pub total_counterparties: usize,
    /// Counterparties dropped because they are known services.
    pub excluded_services: usize,
}

impl CorrelationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one source address's counterparty map into the accumulator.
    pub fn accumulate(
        &mut self,
        source: &Address,
        counterparties: BTreeMap<Address, Vec<CounterpartyObservation>>,
    ) {
        for (counterparty, observations) in counterparties {
            let entry = self.accumulator.entry(counterparty).or_default();
            entry.sources.insert(source.clone());

            for observation in observations {
                let key = (observation.record.kind, observation.record.hash.clone());
                if entry.seen.insert(key) {
                    entry.observations.push(observation);
                }
            }
        }

        debug!(
            "Accumulated counterparties for {} ({} tracked total)",
            source,
            self.accumulator.len()
        );
    }

    /// Counterparties tracked so far.
    pub fn counterparty_count(&self) -> usize {
        self.accumulator.len()
    }

    /// Snapshot of the current state as a report, for incremental flushes.
    ///
    /// Same filtering and ordering as the final report; callers may invoke
    /// this after every batch and once more at the end.
    pub fn finalize(&self, min_interactions: usize, exclusions: &ExclusionSet) -> RunReport {
        let mut entries = Vec::new();
        let mut excluded_services = 0usize;

        for (counterparty, entry) in &self.accumulator {
            if exclusions.contains(counterparty) {
                warn!("Excluding known service: {}", counterparty);
                excluded_services += 1;
                continue;
            }

            if entry.sources.len() < min_interactions {
                continue;
            }

            let mut observations = entry.observations.clone();
            observations.sort_by(|a, b| {
                b.record
                    .block_number
                    .cmp(&a.record.block_number)
                    .then_with(|| a.record.kind.cmp(&b.record.kind))
                    .then_with(|| a.record.hash.cmp(&b.record.hash))
            });

            entries.push(CommonCounterparty {
                counterparty: counterparty.clone(),
                interaction_count: entry.sources.len(),
                sources: entry.sources.iter().cloned().collect(),
                observations,
            });
        }

        entries.sort_by(|a, b| {
            b.interaction_count
                .cmp(&a.interaction_count)
                .then_with(|| a.counterparty.cmp(&b.counterparty))
        });

        info!(
            "Correlation report: {} of {} counterparties cleared threshold {} ({} services excluded)",
            entries.len(),
            self.accumulator.len(),
            min_interactions,
            excluded_services
        );

        RunReport {
            entries,
            total_counterparties: self.accumulator.len(),
            excluded_services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{extract_counterparties, AddressHistory, Direction, TransactionRecord};

    fn addr(last: &str) -> Address {
        Address::parse(&format!("0x{:0>40}", last)).unwrap()
    }

    fn observation(
        source: &Address,
        counterparty: &Address,
        hash: &str,
        kind: TxKind,
        block: u64,
    ) -> CounterpartyObservation {
        let record = TransactionRecord {
            hash: hash.to_string(),
            from: source.clone(),
            to: Some(counterparty.clone()),
            value: 2_000_000_000_000_000_000,
            block_number: block,
            timestamp: 1_700_000_000,
            kind,
            token_name: None,
            token_symbol: None,
        };
        CounterpartyObservation {
            source: source.clone(),
            counterparty: counterparty.clone(),
            direction: Direction::Outgoing,
            eth_value: record.eth_value(),
            observed_at: record.datetime(),
            record,
        }
    }

    fn single(
        counterparty: &Address,
        obs: Vec<CounterpartyObservation>,
    ) -> BTreeMap<Address, Vec<CounterpartyObservation>> {
        let mut map = BTreeMap::new();
        map.insert(counterparty.clone(), obs);
        map
    }

    #[test]
    fn source_sets_union_across_accumulate_calls() {
        let a = addr("aa");
        let b = addr("bb");
        let shared = addr("cc");

        let mut engine = CorrelationEngine::new();
        engine.accumulate(&a, single(&shared, vec![observation(&a, &shared, "h1", TxKind::Normal, 10)]));
        engine.accumulate(&b, single(&shared, vec![observation(&b, &shared, "h2", TxKind::Normal, 20)]));

        let report = engine.finalize(2, &ExclusionSet::empty());
        assert_eq!(report.entries.len(), 1);
        let entry = &report.entries[0];
        assert_eq!(entry.interaction_count, 2);
        assert_eq!(entry.observations.len(), 2);
    }

    #[test]
    fn duplicate_hash_same_kind_counted_once() {
        let a = addr("aa");
        let shared = addr("cc");

        let mut engine = CorrelationEngine::new();
        // Same transaction observed via two query angles.
        engine.accumulate(&a, single(&shared, vec![observation(&a, &shared, "h1", TxKind::Normal, 10)]));
        engine.accumulate(&a, single(&shared, vec![observation(&a, &shared, "h1", TxKind::Normal, 10)]));

        let report = engine.finalize(1, &ExclusionSet::empty());
        assert_eq!(report.entries[0].observations.len(), 1);
    }

    #[test]
    fn same_hash_different_kind_kept() {
        // A token transfer shares the hash of its parent transaction; both
        // legs must survive.
        let a = addr("aa");
        let shared = addr("cc");

        let mut engine = CorrelationEngine::new();
        engine.accumulate(
            &a,
            single(
                &shared,
                vec![
                    observation(&a, &shared, "h1", TxKind::Normal, 10),
                    observation(&a, &shared, "h1", TxKind::TokenTransfer, 10),
                ],
            ),
        );

        let report = engine.finalize(1, &ExclusionSet::empty());
        assert_eq!(report.entries[0].observations.len(), 2);
    }

    #[test]
    fn excluded_counterparty_never_reported() {
        let a = addr("aa");
        let b = addr("bb");
        let service = Address::parse("0x28c6c06298d514db089934071355e5743bf21d60").unwrap();

        let mut engine = CorrelationEngine::new();
        engine.accumulate(&a, single(&service, vec![observation(&a, &service, "h1", TxKind::Normal, 10)]));
        engine.accumulate(&b, single(&service, vec![observation(&b, &service, "h2", TxKind::Normal, 20)]));

        let report = engine.finalize(1, &ExclusionSet::known_services());
        assert!(report.entries.is_empty());
        assert_eq!(report.excluded_services, 1);
    }

    #[test]
    fn threshold_boundary() {
        let sources: Vec<Address> = (0..3).map(|i| addr(&format!("a{}", i))).collect();
        let shared = addr("cc");

        let mut engine = CorrelationEngine::new();
        for (i, source) in sources.iter().enumerate() {
            engine.accumulate(
                source,
                single(&shared, vec![observation(source, &shared, &format!("h{}", i), TxKind::Normal, 10)]),
            );
        }

        // Touched by exactly 3 sources: included at threshold 3, excluded at 4.
        assert_eq!(engine.finalize(3, &ExclusionSet::empty()).entries.len(), 1);
        assert!(engine.finalize(4, &ExclusionSet::empty()).entries.is_empty());
    }

    #[test]
    fn report_is_order_independent() {
        let a = addr("aa");
        let b = addr("bb");
        let x = addr("d1");
        let y = addr("f1");

        let obs = |s: &Address, c: &Address, h: &str| observation(s, c, h, TxKind::Normal, 10);

        let mut forward = CorrelationEngine::new();
        forward.accumulate(&a, single(&x, vec![obs(&a, &x, "h1")]));
        forward.accumulate(&a, single(&y, vec![obs(&a, &y, "h2")]));
        forward.accumulate(&b, single(&x, vec![obs(&b, &x, "h3")]));
        forward.accumulate(&b, single(&y, vec![obs(&b, &y, "h4")]));

        let mut reverse = CorrelationEngine::new();
        reverse.accumulate(&b, single(&y, vec![obs(&b, &y, "h4")]));
        reverse.accumulate(&b, single(&x, vec![obs(&b, &x, "h3")]));
        reverse.accumulate(&a, single(&y, vec![obs(&a, &y, "h2")]));
        reverse.accumulate(&a, single(&x, vec![obs(&a, &x, "h1")]));

        let rf = forward.finalize(2, &ExclusionSet::empty());
        let rr = reverse.finalize(2, &ExclusionSet::empty());

        let keys_f: Vec<_> = rf.entries.iter().map(|e| e.counterparty.clone()).collect();
        let keys_r: Vec<_> = rr.entries.iter().map(|e| e.counterparty.clone()).collect();
        assert_eq!(keys_f, keys_r);
        for (ef, er) in rf.entries.iter().zip(rr.entries.iter()) {
            assert_eq!(ef.sources, er.sources);
            let hf: Vec<_> = ef.observations.iter().map(|o| o.record.hash.clone()).collect();
            let hr: Vec<_> = er.observations.iter().map(|o| o.record.hash.clone()).collect();
            assert_eq!(hf, hr);
        }
    }

    #[test]
    fn sorted_by_count_desc_then_address_asc() {
        let sources: Vec<Address> = (0..3).map(|i| addr(&format!("a{}", i))).collect();
        let big = addr("b1");
        let small_first = addr("c1");
        let small_second = addr("c2");

        let mut engine = CorrelationEngine::new();
        for (i, source) in sources.iter().enumerate() {
            engine.accumulate(
                source,
                single(&big, vec![observation(source, &big, &format!("b{}", i), TxKind::Normal, 10)]),
            );
        }
        for (i, source) in sources.iter().take(2).enumerate() {
            engine.accumulate(
                source,
                single(&small_second, vec![observation(source, &small_second, &format!("s{}", i), TxKind::Normal, 10)]),
            );
            engine.accumulate(
                source,
                single(&small_first, vec![observation(source, &small_first, &format!("t{}", i), TxKind::Normal, 10)]),
            );
        }

        let report = engine.finalize(2, &ExclusionSet::empty());
        let order: Vec<_> = report.entries.iter().map(|e| e.counterparty.clone()).collect();
        assert_eq!(order, vec![big, small_first, small_second]);
    }

    #[test]
    fn end_to_end_two_sources_one_common_counterparty() {
        let a = Address::parse("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let b = Address::parse("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
        let c = Address::parse("0xcccccccccccccccccccccccccccccccccccccccc").unwrap();

        let tx = |from: &Address, to: &Address, hash: &str| TransactionRecord {
            hash: hash.to_string(),
            from: from.clone(),
            to: Some(to.clone()),
            value: 1_000_000_000_000_000_000,
            block_number: 50,
            timestamp: 1_700_000_000,
            kind: TxKind::Normal,
            token_name: None,
            token_symbol: None,
        };

        let history_a = AddressHistory {
            normal: vec![tx(&a, &c, "h1")],
            ..Default::default()
        };
        let history_b = AddressHistory {
            normal: vec![tx(&b, &c, "h2")],
            ..Default::default()
        };

        let mut engine = CorrelationEngine::new();
        engine.accumulate(&a, extract_counterparties(&a, &history_a));
        engine.accumulate(&b, extract_counterparties(&b, &history_b));

        let report = engine.finalize(2, &ExclusionSet::empty());
        assert_eq!(report.entries.len(), 1);
        let entry = &report.entries[0];
        assert_eq!(entry.counterparty, c);
        assert_eq!(entry.interaction_count, 2);
        let hashes: Vec<_> = entry.observations.iter().map(|o| o.record.hash.as_str()).collect();
        assert_eq!(hashes.len(), 2);
        assert!(hashes.contains(&"h1") && hashes.contains(&"h2"));
    }
}
