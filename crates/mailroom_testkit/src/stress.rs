//! Contention stress runs.
//!
//! Many writer tasks push `add` actions at a small set of shared keys while
//! the store injects latency, transient failures, and interfering writes.
//! Afterwards the stored counts must add up to exactly the deltas of the
//! roots that reported success.

use crate::fixtures::{add, fast_options, Tally};
use mailroom_core::codec::{cbor_load, cbor_save};
use mailroom_core::{DataStore, Mailroom, MailroomError, StatsSnapshot, Transaction};
use mailroom_store::InMemoryStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Configuration for a contention run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Concurrent writer tasks.
    pub writers: usize,
    /// Transactions each writer runs.
    pub transactions_per_writer: usize,
    /// Distinct keys shared by all writers.
    pub keys: usize,
    /// Simulated store latency per call.
    pub latency: Option<Duration>,
    /// Writes that fail transiently at the start of the run.
    pub transient_failures: u32,
    /// Writes preceded by an interfering external write.
    pub interference: u32,
    /// Conflict retry bound handed to the Mailroom.
    pub max_conflict_retries: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            writers: 8,
            transactions_per_writer: 50,
            keys: 4,
            latency: None,
            transient_failures: 0,
            interference: 0,
            max_conflict_retries: 64,
        }
    }
}

/// Result of a contention run.
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    /// Transactions run.
    pub transactions: usize,
    /// Roots committed.
    pub committed: usize,
    /// Roots failed.
    pub failed: usize,
    /// Sum of deltas of committed roots.
    pub expected_total: i64,
    /// Sum of the stored counts after the run.
    pub observed_total: i64,
    /// Wall time.
    pub duration: Duration,
    /// Transactions per second.
    pub transactions_per_second: f64,
    /// Engine counters at the end of the run.
    pub stats: StatsSnapshot,
}

impl StressReport {
    /// Returns true if the store reflects exactly the committed deltas.
    pub fn is_consistent(&self) -> bool {
        self.expected_total == self.observed_total
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Transactions: {}", self.transactions);
        println!("Committed: {}", self.committed);
        println!("Failed: {}", self.failed);
        println!("Version conflicts: {}", self.stats.version_conflicts);
        println!("Transient retries: {}", self.stats.transient_retries);
        println!("Expected total: {}", self.expected_total);
        println!("Observed total: {}", self.observed_total);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} txn/sec", self.transactions_per_second);
    }
}

/// Errors that stop a stress run.
#[derive(Debug, Error)]
pub enum StressError {
    /// The engine rejected a transaction outright.
    #[error(transparent)]
    Mailroom(#[from] MailroomError),
    /// A writer task panicked or was cancelled.
    #[error("writer task failed: {0}")]
    Writer(String),
    /// A value could not be encoded before or decoded after the run.
    #[error("value for {key} failed to round-trip: {message}")]
    Codec {
        /// The key.
        key: String,
        /// Decode error.
        message: String,
    },
}

fn key_name(index: usize) -> String {
    format!("tally-{index}")
}

struct WriterOutcome {
    committed: usize,
    failed: usize,
    delta_total: i64,
}

/// Runs writers concurrently against shared keys and checks the totals.
pub async fn run_contention(config: &StressConfig) -> Result<StressReport, StressError> {
    let mut store = InMemoryStore::named("stress");
    if let Some(latency) = config.latency {
        store = store.with_latency(latency);
    }
    let store = Arc::new(store);
    store.fail_next_writes(config.transient_failures);
    store.interfere_next_writes(config.interference);

    let mailroom = Mailroom::new(
        fast_options().with_max_conflict_retries(config.max_conflict_retries),
    );
    let tallies = mailroom.create_collection(
        Arc::clone(&store) as Arc<dyn DataStore>,
        cbor_load::<Tally>,
        cbor_save::<Tally>,
    );
    let keys = config.keys.max(1);

    // Interference on a missing key would store the incoming bytes, so
    // every key starts out present.
    for index in 0..keys {
        let key = key_name(index);
        let raw = cbor_save(&Tally::default()).map_err(|e| StressError::Codec {
            key: key.clone(),
            message: e.to_string(),
        })?;
        store.put_external(&key, raw);
    }

    let start = Instant::now();
    let handles: Vec<_> = (0..config.writers)
        .map(|writer| {
            let mailroom = mailroom.clone();
            let tallies = tallies.clone();
            let rounds = config.transactions_per_writer;
            tokio::spawn(async move {
                let delta = (writer + 1) as i64;
                let mut outcome = WriterOutcome {
                    committed: 0,
                    failed: 0,
                    delta_total: 0,
                };
                for round in 0..rounds {
                    let key = key_name((writer + round) % keys);
                    let doc = tallies.document(&key).await?;
                    let txn = Transaction::new().with(&doc, [add(delta)]);
                    let report = mailroom.run_transaction(txn).await?;
                    if report.is_complete() {
                        outcome.committed += 1;
                        outcome.delta_total += delta;
                    } else {
                        outcome.failed += 1;
                    }
                }
                Ok::<_, MailroomError>(outcome)
            })
        })
        .collect();

    let mut committed = 0;
    let mut failed = 0;
    let mut expected_total = 0;
    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| StressError::Writer(e.to_string()))??;
        committed += outcome.committed;
        failed += outcome.failed;
        expected_total += outcome.delta_total;
    }
    let duration = start.elapsed();

    let mut observed_total = 0;
    for index in 0..keys {
        let key = key_name(index);
        if let Some(stored) = store.peek(&key) {
            let tally: Tally = cbor_load(&stored.raw).map_err(|e| StressError::Codec {
                key: key.clone(),
                message: e.to_string(),
            })?;
            observed_total += tally.count;
        }
    }

    let transactions = config.writers * config.transactions_per_writer;
    let transactions_per_second = if duration.as_secs_f64() > 0.0 {
        transactions as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    debug!(transactions, committed, failed, ?duration, "contention run finished");
    Ok(StressReport {
        transactions,
        committed,
        failed,
        expected_total,
        observed_total,
        duration,
        transactions_per_second,
        stats: mailroom.stats(),
    })
}
