use async_trait::async_trait;
use config_manager::BatchConfig;
use persistence_layer::AddressEntry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Per-address work driven by the scheduler.
///
/// `process` handles one address; `flush` persists accumulated results
/// after each batch so partial progress survives a crash.
#[async_trait]
pub trait AddressProcessor: Send {
    async fn process(&mut self, entry: &AddressEntry) -> anyhow::Result<()>;
    async fn flush(&mut self, batch_number: usize) -> anyhow::Result<()>;
}

/// Scheduler loop state. The loop suspends only in `Backoff` (pacing
/// between addresses) and `BetweenBatches`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    FetchingAddress,
    Backoff,
    BetweenBatches,
    Done,
}

/// Counts from one scheduler run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub failed: usize,
    pub aborted: bool,
}

/// Drives the per-address pipeline over the input list in fixed-size
/// batches, preserving input order.
///
/// Addresses within a batch run strictly sequentially so the provider's
/// shared rate limit is never hit by concurrent requests. Per-address
/// failures are contained: they are logged and the walk continues. An
/// abort flag is checked at batch and address boundaries; aborting leaves
/// already-flushed output intact.
#[derive(Debug)]
pub struct BatchScheduler {
    batch_size: usize,
    batch_delay: Duration,
    request_delay: Duration,
    abort: Arc<AtomicBool>,
    state: SchedulerState,
}

impl BatchScheduler {
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            request_delay: Duration::from_millis(config.request_delay_ms),
            abort: Arc::new(AtomicBool::new(false)),
            state: SchedulerState::Idle,
        }
    }

    /// Flag handle for aborting the run from elsewhere. The abort takes
    /// effect at the next address or batch boundary.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Walk all entries through the processor.
    pub async fn run<P: AddressProcessor>(
        &mut self,
        entries: &[AddressEntry],
        processor: &mut P,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let total = entries.len();
        let total_batches = total.div_ceil(self.batch_size);

        info!(
            "Processing {} addresses in batches of {} ({} batches)",
            total, self.batch_size, total_batches
        );

        'batches: for (batch_index, batch) in entries.chunks(self.batch_size).enumerate() {
            let batch_number = batch_index + 1;

            if self.abort_requested() {
                warn!("Abort requested; stopping before batch {}", batch_number);
                outcome.aborted = true;
                break 'batches;
            }

            info!(
                "Processing batch {}/{} ({} addresses)",
                batch_number,
                total_batches,
                batch.len()
            );

            for (position, entry) in batch.iter().enumerate() {
                if self.abort_requested() {
                    warn!("Abort requested; stopping batch {} early", batch_number);
                    outcome.aborted = true;
                    break;
                }

                self.state = SchedulerState::FetchingAddress;
                match processor.process(entry).await {
                    Ok(()) => {
                        outcome.processed += 1;
                        info!(
                            "Progress: {}/{} addresses processed",
                            outcome.processed + outcome.failed,
                            total
                        );
                    }
                    Err(e) => {
                        // One address failing must not take the run down.
                        outcome.failed += 1;
                        error!("Error processing {}: {}", entry.address, e);
                    }
                }

                if position + 1 < batch.len() {
                    self.state = SchedulerState::Backoff;
                    sleep(self.request_delay).await;
                }
            }

            // Persist accumulated results so a crash loses at most one batch.
            if let Err(e) = processor.flush(batch_number).await {
                error!("Failed to flush results after batch {}: {}", batch_number, e);
            }

            if outcome.aborted {
                break 'batches;
            }

            if batch_number < total_batches {
                info!(
                    "Batch {} complete. Pausing for {}ms before next batch...",
                    batch_number,
                    self.batch_delay.as_millis()
                );
                self.state = SchedulerState::BetweenBatches;
                sleep(self.batch_delay).await;
            }
        }

        self.state = SchedulerState::Done;
        info!(
            "Scheduler finished: {} processed, {} failed{}",
            outcome.processed,
            outcome.failed,
            if outcome.aborted { " (aborted)" } else { "" }
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use correlation_core::Address;

    fn entries(n: usize) -> Vec<AddressEntry> {
        (0..n)
            .map(|i| AddressEntry {
                address: Address::parse(&format!("0x{:040x}", i + 1)).unwrap(),
                participant_code: None,
            })
            .collect()
    }

    fn fast_config(batch_size: usize) -> BatchConfig {
        BatchConfig {
            batch_size,
            batch_delay_ms: 1,
            request_delay_ms: 1,
        }
    }

    /// Processor that records every call and fails on scripted indexes.
    struct RecordingProcessor {
        seen: Vec<String>,
        flushes: Vec<usize>,
        fail_on: Vec<usize>,
        abort: Option<(usize, Arc<AtomicBool>)>,
    }

    impl RecordingProcessor {
        fn new() -> Self {
            Self {
                seen: Vec::new(),
                flushes: Vec::new(),
                fail_on: Vec::new(),
                abort: None,
            }
        }
    }

    #[async_trait]
    impl AddressProcessor for RecordingProcessor {
        async fn process(&mut self, entry: &AddressEntry) -> anyhow::Result<()> {
            let index = self.seen.len();
            self.seen.push(entry.address.to_string());

            if let Some((at, flag)) = &self.abort {
                if index == *at {
                    flag.store(true, Ordering::SeqCst);
                }
            }

            if self.fail_on.contains(&index) {
                anyhow::bail!("simulated fetch failure");
            }
            Ok(())
        }

        async fn flush(&mut self, batch_number: usize) -> anyhow::Result<()> {
            self.flushes.push(batch_number);
            Ok(())
        }
    }

    #[tokio::test]
    async fn preserves_input_order_across_batches() {
        let list = entries(7);
        let mut scheduler = BatchScheduler::new(&fast_config(3));
        let mut processor = RecordingProcessor::new();

        let outcome = scheduler.run(&list, &mut processor).await;

        assert_eq!(outcome.processed, 7);
        let expected: Vec<String> = list.iter().map(|e| e.address.to_string()).collect();
        assert_eq!(processor.seen, expected);
        // One flush per batch: 3 + 3 + 1.
        assert_eq!(processor.flushes, vec![1, 2, 3]);
        assert_eq!(scheduler.state(), SchedulerState::Done);
    }

    #[tokio::test]
    async fn one_failing_address_does_not_stop_the_run() {
        let list = entries(10);
        let mut scheduler = BatchScheduler::new(&fast_config(5));
        let mut processor = RecordingProcessor::new();
        processor.fail_on = vec![2]; // Address #3 of 10

        let outcome = scheduler.run(&list, &mut processor).await;

        assert_eq!(outcome.processed, 9);
        assert_eq!(outcome.failed, 1);
        assert!(!outcome.aborted);
        assert_eq!(processor.seen.len(), 10);
    }

    #[tokio::test]
    async fn abort_stops_at_address_boundary_but_flushes() {
        let list = entries(6);
        let mut scheduler = BatchScheduler::new(&fast_config(2));
        let abort = scheduler.abort_handle();
        let mut processor = RecordingProcessor::new();
        processor.abort = Some((2, abort)); // Raised while processing the 3rd address

        let outcome = scheduler.run(&list, &mut processor).await;

        assert!(outcome.aborted);
        // The in-flight address finishes; nothing after it starts.
        assert_eq!(processor.seen.len(), 3);
        // The batch that was interrupted still flushed.
        assert_eq!(processor.flushes, vec![1, 2]);
    }
}
