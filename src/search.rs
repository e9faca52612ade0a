use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use rand::{Rng, RngCore};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::hash::MultiplicativeHash;
use crate::sink::{CollisionSink, ProgressObserver};
use crate::table::{encode_suffix_into, PrecomputationTable};

/// Attempts between two rate reports
const TIMED_ITERATIONS: u64 = 100_000_000;

/// Attempts a parallel worker claims from the shared counter at a time
const WORKER_BATCH: u64 = 4096;

/// How often the collecting thread wakes up to look for cancellation
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Sizes and stopping rules of one collision generation session
#[derive(Debug, Clone)]
pub struct SearchConfig {
    prefix_size: usize,
    suffix_size: usize,
    n_collisions: u64,
    target: Option<u32>,
    threads: usize,
    max_attempts: Option<u64>,
}

impl SearchConfig {
    /// Every size must be positive; nothing is computed when one is not.
    pub fn new(prefix_size: usize, suffix_size: usize, n_collisions: u64) -> Result<Self> {
        if prefix_size == 0 || suffix_size == 0 {
            return Err(Error::InvalidArgument(
                "prefix and suffix sizes must be positive integers".into(),
            ));
        }
        if n_collisions == 0 {
            return Err(Error::InvalidArgument("number of collisions must be positive".into()));
        }

        Ok(SearchConfig {
            prefix_size,
            suffix_size,
            n_collisions,
            target: None,
            threads: num_cpus::get(),
            max_attempts: None,
        })
    }

    /// Hash every collision to `target` instead of a randomly drawn digest.
    pub fn with_target(mut self, target: u32) -> Self {
        self.target = Some(target);
        self
    }

    /// Worker count for the parallel search. Zero falls back to one.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Give up after this many random prefixes. By default the search never gives up.
    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn prefix_size(&self) -> usize {
        self.prefix_size
    }

    pub fn suffix_size(&self) -> usize {
        self.suffix_size
    }

    pub fn n_collisions(&self) -> u64 {
        self.n_collisions
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn max_attempts(&self) -> Option<u64> {
        self.max_attempts
    }
}

/// Outcome of a finished search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchReport {
    pub target: u32,
    pub table_size: u32,
    /// Collisions handed to the sink. Below the requested count only when an attempt cap ran out.
    pub found: u64,
    pub attempts: u64,
}

/// Meet-in-the-middle collision generator for one target digest
///
/// Precomputes the backward hashes of every suffix, then draws random prefixes until their forward
/// hash lands on a table key; each hit is a prefix ++ suffix pair hashing to the target.
pub struct Searcher {
    hash: MultiplicativeHash,
    config: SearchConfig,
    target: u32,
    cancel: CancelToken,
}

impl Searcher {
    pub fn new(hash: MultiplicativeHash, config: SearchConfig) -> Self {
        let target = config.target.unwrap_or_else(|| rand::thread_rng().gen());
        debug!("Target hash: {}", target);

        Searcher { hash, config, target, cancel: CancelToken::new() }
    }

    /// Stop at the next check once `cancel` is triggered.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Builds the table and searches on the current thread
    pub fn run(
        &self,
        sink: &mut dyn CollisionSink,
        observer: &mut dyn ProgressObserver,
    ) -> Result<SearchReport> {
        let table = self.precompute(observer, false)?;
        self.search(&table, sink)
    }

    /// Builds the table with rayon and searches with `threads` workers
    pub fn par_run(
        &self,
        sink: &mut dyn CollisionSink,
        observer: &mut dyn ProgressObserver,
    ) -> Result<SearchReport> {
        let table = self.precompute(observer, true)?;
        self.par_search(&table, sink)
    }

    pub fn precompute(
        &self,
        observer: &mut dyn ProgressObserver,
        parallel: bool,
    ) -> Result<PrecomputationTable> {
        observer.target_chosen(self.target);
        if parallel {
            PrecomputationTable::par_build(
                &self.hash,
                self.target,
                self.config.suffix_size,
                observer,
                &self.cancel,
            )
        } else {
            PrecomputationTable::build(
                &self.hash,
                self.target,
                self.config.suffix_size,
                observer,
                &self.cancel,
            )
        }
    }

    /// Draws prefixes on the current thread until enough collisions reached the sink
    pub fn search(
        &self,
        table: &PrecomputationTable,
        sink: &mut dyn CollisionSink,
    ) -> Result<SearchReport> {
        self.check_table(table)?;
        info!("Searching for {} collisions", self.config.n_collisions);

        let mut rng = rand::thread_rng();
        let mut prefix = vec![0u8; self.config.prefix_size];
        let mut found = 0u64;
        let mut attempts = 0u64;

        let start = Instant::now();
        let mut loop_start = Instant::now();
        while found < self.config.n_collisions {
            if self.config.max_attempts.map_or(false, |max| attempts >= max) {
                break;
            }
            self.cancel.check()?;

            if attempts > 0 && attempts % TIMED_ITERATIONS == 0 {
                let iter_rate = TIMED_ITERATIONS as f32 / loop_start.elapsed().as_secs_f32();
                info!("Reached {} attempts, running {:.0} attempts / s", attempts, iter_rate);
                loop_start = Instant::now();
            }

            rng.fill_bytes(&mut prefix);
            attempts += 1;
            if let Some(collision) = self.complete(table, &prefix) {
                sink.accept(&collision)?;
                found += 1;
            }
        }

        Ok(self.finish(table, found, attempts, start))
    }

    /// Draws prefixes on `threads` workers sharing the table, forwarding hits to the sink as they
    /// arrive
    pub fn par_search(
        &self,
        table: &PrecomputationTable,
        sink: &mut dyn CollisionSink,
    ) -> Result<SearchReport> {
        self.check_table(table)?;
        info!(
            "Searching for {} collisions with {} workers",
            self.config.n_collisions, self.config.threads
        );

        let stop = AtomicBool::new(false);
        let attempts = AtomicU64::new(0);
        let start = Instant::now();

        let (found, outcome) = thread::scope(|scope| {
            let (worker_tx, worker_rx) = mpsc::sync_channel(self.config.threads * 4);
            for worker in 0..self.config.threads {
                let tx = worker_tx.clone();
                let stop = &stop;
                let attempts = &attempts;
                scope.spawn(move || self.search_worker(worker, table, tx, stop, attempts));
            }
            // Only the workers hold senders now, so the channel disconnects once they all exit
            drop(worker_tx);

            let mut found = 0u64;
            let mut outcome = Ok(());
            while found < self.config.n_collisions {
                if self.cancel.is_cancelled() {
                    outcome = Err(Error::Interrupted);
                    break;
                }
                match worker_rx.recv_timeout(CANCEL_POLL) {
                    Ok(collision) => {
                        if let Err(e) = sink.accept(&collision) {
                            outcome = Err(e);
                            break;
                        }
                        found += 1;
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => (),
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        if self.cancel.is_cancelled() {
                            outcome = Err(Error::Interrupted);
                        }
                        break;
                    }
                }
            }

            stop.store(true, Ordering::SeqCst);
            if matches!(outcome, Err(Error::Interrupted)) {
                // Hits queued before the workers saw the stop flag still reach the sink
                for collision in worker_rx.iter() {
                    if found >= self.config.n_collisions {
                        break;
                    }
                    if let Err(e) = sink.accept(&collision) {
                        outcome = Err(e);
                        break;
                    }
                    found += 1;
                }
            }
            // Unblocks workers waiting on a full channel
            drop(worker_rx);
            (found, outcome)
        });
        outcome?;

        Ok(self.finish(table, found, attempts.load(Ordering::SeqCst), start))
    }

    fn search_worker(
        &self,
        worker: usize,
        table: &PrecomputationTable,
        tx: mpsc::SyncSender<Vec<u8>>,
        stop: &AtomicBool,
        attempts: &AtomicU64,
    ) {
        let mut rng = rand::thread_rng();
        let mut prefix = vec![0u8; self.config.prefix_size];
        let halted = || stop.load(Ordering::Relaxed) || self.cancel.is_cancelled();

        while !halted() {
            // Claim a batch of attempts; whatever goes unused is handed back
            let reserved = attempts.fetch_add(WORKER_BATCH, Ordering::Relaxed);
            let batch = match self.config.max_attempts {
                Some(max) if reserved >= max => {
                    attempts.fetch_sub(WORKER_BATCH, Ordering::Relaxed);
                    break;
                }
                Some(max) => WORKER_BATCH.min(max - reserved),
                None => WORKER_BATCH,
            };
            attempts.fetch_sub(WORKER_BATCH - batch, Ordering::Relaxed);

            for done in 0..batch {
                if halted() {
                    attempts.fetch_sub(batch - done, Ordering::Relaxed);
                    debug!("worker {} stopping", worker);
                    return;
                }

                rng.fill_bytes(&mut prefix);
                if let Some(collision) = self.complete(table, &prefix) {
                    if tx.send(collision).is_err() {
                        attempts.fetch_sub(batch - done - 1, Ordering::Relaxed);
                        debug!("worker {} found its collector gone", worker);
                        return;
                    }
                }
            }
        }
        debug!("worker {} stopping", worker);
    }

    /// `prefix ++ suffix` if the prefix's forward hash is a table key
    fn complete(&self, table: &PrecomputationTable, prefix: &[u8]) -> Option<Vec<u8>> {
        let index = table.suffix_index(self.hash.forward_hash(prefix))?;
        let mut collision = vec![0u8; prefix.len() + table.suffix_size()];
        let (head, tail) = collision.split_at_mut(prefix.len());
        head.copy_from_slice(prefix);
        encode_suffix_into(index, tail);
        Some(collision)
    }

    fn check_table(&self, table: &PrecomputationTable) -> Result<()> {
        if table.target() != self.target || table.suffix_size() != self.config.suffix_size {
            return Err(Error::InvalidArgument(format!(
                "table was built for target {} with {}-byte suffixes, expected target {} with {}-byte suffixes",
                table.target(),
                table.suffix_size(),
                self.target,
                self.config.suffix_size
            )));
        }
        Ok(())
    }

    fn finish(
        &self,
        table: &PrecomputationTable,
        found: u64,
        attempts: u64,
        start: Instant,
    ) -> SearchReport {
        let seconds = start.elapsed().as_secs_f32();
        info!(
            "Found {} collisions after {} attempts in {:.2} seconds, {:.0} attempts / s",
            found,
            attempts,
            seconds,
            attempts as f32 / seconds
        );

        SearchReport { target: self.target, table_size: table.table_size(), found, attempts }
    }
}
