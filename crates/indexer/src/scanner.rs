use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use tfidx_chain_client::{FetchError, FetchErrorKind, RawBlock};
use tfidx_primitives::{BlockEvents, BlockNumber, BlockRef};
use tfidx_storage::{ConsistencyError, Database};

use crate::extract::extract;
use crate::metrics;


/// Source of raw blocks for the scanner.
///
/// `fetch_batch()` must resolve every requested height to either a
/// block or an error and return the results in ascending height order.
pub trait BlockFetcher {
    /// How many heights can be fetched concurrently.
    fn capacity(&self) -> usize;

    fn fetch_batch(
        &mut self,
        heights: &[BlockNumber]
    ) -> impl std::future::Future<
        Output = Vec<(BlockNumber, Result<RawBlock, FetchError>)>
    > + Send;
}


#[derive(Debug, Clone)]
pub struct ScannerSettings {
    /// First height to index when the database is empty.
    pub start_height: BlockNumber,
    /// Keep following the chain head after the backfill completes.
    pub follow: bool,
    /// Sleep between polls once caught up with the chain head.
    pub poll_interval: Duration,
    /// Retry backoff schedule; the last entry repeats.
    pub backoff_ms: Vec<u64>,
    /// Consecutive fetch failures tolerated per height during backfill.
    pub max_fetch_attempts: usize,
    /// Storage failures tolerated per block before giving up.
    pub max_commit_attempts: usize
}


/// Drives the ingestion pipeline: requests waves of blocks from the
/// fetcher, extracts events and commits them strictly in height order.
///
/// During backfill a full wave of `fetcher.capacity()` heights is kept
/// in flight; once caught up with the head the scanner degrades to
/// polling one block at a time.
pub struct Scanner<F> {
    db: Arc<Database>,
    fetcher: F,
    settings: ScannerSettings
}


impl<F: BlockFetcher> Scanner<F> {
    pub fn new(db: Arc<Database>, fetcher: F, settings: ScannerSettings) -> Self {
        Self {
            db,
            fetcher,
            settings
        }
    }

    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut next = match self.db.resume_height() {
            Some(top) => {
                info!(resume_height = top, "resuming after the last committed block");
                top + 1
            },
            None => {
                info!(start_height = self.settings.start_height, "starting from scratch");
                self.settings.start_height
            }
        };

        let mut caught_up = false;
        let mut fetch_attempts: usize = 0;
        let mut stats = ScanStats::new(next);

        loop {
            if *shutdown.borrow() {
                info!(next_height = next, "shutdown requested, stopping the scanner");
                return Ok(())
            }

            let wave_size = if caught_up { 1 } else { self.fetcher.capacity() };
            let heights: Vec<BlockNumber> = (next..next + wave_size as u64).collect();
            let results = self.fetcher.fetch_batch(&heights).await;

            for (height, result) in results {
                match result {
                    Ok(block) => {
                        self.process_block(height, block).await?;
                        fetch_attempts = 0;
                        next = height + 1;
                        stats.committed(next);
                        metrics::BLOCKS_PROCESSED.inc();
                        metrics::BLOCK_NUMBER.set(height as i64);
                    },
                    Err(err) if err.is_not_found_yet() => {
                        if !caught_up {
                            caught_up = true;
                            info!(
                                next_height = height,
                                "backfill complete, caught up with the chain head"
                            );
                        }
                        if !self.settings.follow {
                            info!(next_height = height, "reached the chain head, exiting");
                            return Ok(())
                        }
                        fetch_attempts = 0;
                        self.sleep(self.settings.poll_interval, &shutdown).await;
                        break
                    },
                    Err(err) if err.is_transient() => {
                        fetch_attempts += 1;
                        if !caught_up && fetch_attempts >= self.settings.max_fetch_attempts {
                            bail!(
                                "giving up on block {} after {} failed fetch attempts: {}",
                                height, fetch_attempts, err
                            )
                        }
                        warn!(
                            height,
                            attempt = fetch_attempts,
                            error =% err,
                            "block fetch failed, will retry"
                        );
                        self.sleep_ms(self.backoff(fetch_attempts), &shutdown).await;
                        break
                    },
                    Err(err) => {
                        debug_assert_eq!(err.kind, FetchErrorKind::Fatal);
                        return Err(anyhow!(err))
                            .with_context(|| format!("cannot fetch block {}", height))
                    }
                }
                if *shutdown.borrow() {
                    break
                }
            }

            stats.maybe_report();
        }
    }

    /// Extracts and commits a single block, retrying storage failures.
    ///
    /// A malformed recognized event marks the block as anomalous: an
    /// empty event set is committed so that the progress ledger stays
    /// contiguous and the pipeline moves on.
    async fn process_block(&self, height: BlockNumber, block: RawBlock) -> anyhow::Result<()> {
        let (events, anomalous) = match extract(&block) {
            Ok(events) => (events, false),
            Err(err) => {
                warn!(
                    height,
                    error =% err,
                    "failed to extract events, marking the block as anomalous"
                );
                (BlockEvents::default(), true)
            }
        };

        let timestamp = block.timestamp_secs();
        let hash = block.hash;

        for attempt in 1..=self.settings.max_commit_attempts {
            let db = self.db.clone();
            let result = {
                let events = events.clone();
                let hash = hash.clone();
                tokio::task::spawn_blocking(move || {
                    db.commit_block(height, &hash, timestamp, &events, anomalous)
                }).await.context("commit task panicked")?
            };

            match result {
                Ok(()) => {
                    debug!(
                        block =% BlockRef { number: height, hash: hash.clone() },
                        events = events.len(),
                        anomalous,
                        "committed block"
                    );
                    return Ok(())
                },
                Err(err) if err.is::<ConsistencyError>() => {
                    return Err(err).with_context(|| {
                        format!("refusing to commit block {} out of order", height)
                    })
                },
                Err(err) if attempt < self.settings.max_commit_attempts => {
                    warn!(
                        height,
                        attempt,
                        error =? err,
                        "block commit failed, will retry"
                    );
                    tokio::time::sleep(Duration::from_millis(self.backoff(attempt))).await;
                },
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!(
                            "failed to commit block {} after {} attempts",
                            height, attempt
                        )
                    })
                }
            }
        }
        unreachable!()
    }

    fn backoff(&self, attempt: usize) -> u64 {
        let schedule = &self.settings.backoff_ms;
        schedule[attempt.saturating_sub(1).min(schedule.len() - 1)]
    }

    /// Sleeps for the given duration, waking up early on shutdown.
    async fn sleep(&self, pause: Duration, shutdown: &watch::Receiver<bool>) {
        if pause.is_zero() {
            return
        }
        let mut shutdown = shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(pause) => {},
            _ = shutdown.wait_for(|stop| *stop) => {}
        }
    }

    async fn sleep_ms(&self, millis: u64, shutdown: &watch::Receiver<bool>) {
        self.sleep(Duration::from_millis(millis), shutdown).await
    }
}


/// Periodic progress reporting for long backfills.
struct ScanStats {
    started_at: Instant,
    last_report: Instant,
    next_height: BlockNumber,
    committed: u64
}


const REPORT_INTERVAL: Duration = Duration::from_secs(30);


impl ScanStats {
    fn new(first_height: BlockNumber) -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            last_report: now,
            next_height: first_height,
            committed: 0
        }
    }

    fn committed(&mut self, next_height: BlockNumber) {
        self.next_height = next_height;
        self.committed += 1;
    }

    fn maybe_report(&mut self) {
        if self.last_report.elapsed() < REPORT_INTERVAL || self.committed == 0 {
            return
        }
        let elapsed = self.started_at.elapsed().as_secs_f64();
        info!(
            next_height = self.next_height,
            committed = self.committed,
            blocks_per_sec = format_args!("{:.1}", self.committed as f64 / elapsed),
            "indexing progress"
        );
        self.last_report = Instant::now();
    }
}
