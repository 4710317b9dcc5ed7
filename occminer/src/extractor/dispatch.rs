use crossbeam_channel::{unbounded, RecvTimeoutError};
use rayon::ThreadPool;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use crate::errors::{ExtractError, ExtractResult};
use crate::miner::{Candidate, Miner};

// Lifecycle of one job. A job only runs if it moves from QUEUED to RUNNING.
const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;
const ABANDONED: u8 = 4;

/// One miner scheduled for the current batch
pub(crate) struct MinerJob {
    pub(crate) symbol: String,
    pub(crate) miner: Arc<dyn Miner>,
}

enum Event {
    Started(usize, Instant),
    Finished(usize, Result<Vec<Candidate>, String>),
}

/// Worker pool that remembers workers still held by miners a batch gave up on
pub(crate) struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
    held: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub(crate) fn new(threads: usize) -> ExtractResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("occminer-worker-{}", index))
            .build()
            .map_err(|e| ExtractError::resource(format!("unable to start worker pool: {}", e)))?;
        Ok(Self {
            pool,
            threads,
            held: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Workers still running a miner from a failed batch
    pub(crate) fn held_workers(&self) -> usize {
        self.held.load(Ordering::Acquire)
    }

    /// Runs every job against `window` and waits for all of them. Results come
    /// back in job order.
    ///
    /// With a timeout, each miner is allowed `timeout` from the moment a worker
    /// picks it up. A miner that overruns fails the whole batch; it keeps its
    /// worker until it returns on its own, and jobs of the batch that have not
    /// started yet are cancelled. While every worker is held that way, dispatch
    /// fails immediately instead of queueing behind them.
    pub(crate) fn dispatch(
        &self,
        jobs: &[MinerJob],
        window: Arc<[u8]>,
        timeout: Option<Duration>,
    ) -> ExtractResult<Vec<Vec<Candidate>>> {
        let held = self.held_workers();
        if held >= self.threads {
            warn!("All {} workers are held by overrunning miners", held);
            return Err(ExtractError::resource(format!(
                "all {} workers are still running miners that exceeded their time limit",
                held
            )));
        }

        let (tx, rx) = unbounded::<Event>();
        let states: Vec<Arc<AtomicU8>> = jobs.iter().map(|_| Arc::new(AtomicU8::new(QUEUED))).collect();

        for (index, job) in jobs.iter().enumerate() {
            let tx = tx.clone();
            let miner = Arc::clone(&job.miner);
            let window = Arc::clone(&window);
            let state = Arc::clone(&states[index]);
            let held = Arc::clone(&self.held);
            self.pool.spawn(move || {
                if state
                    .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return;
                }
                let _ = tx.send(Event::Started(index, Instant::now()));
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| miner.scan(&window)))
                    .map_err(panic_message);
                if state.swap(DONE, Ordering::AcqRel) == ABANDONED {
                    held.fetch_sub(1, Ordering::AcqRel);
                }
                let _ = tx.send(Event::Finished(index, outcome));
            });
        }
        drop(tx);

        let result = collect(&rx, jobs, timeout);
        if result.is_err() {
            self.abandon(&states);
        }
        result
    }

    /// Cancels queued jobs and counts running ones as holding their worker
    fn abandon(&self, states: &[Arc<AtomicU8>]) {
        for state in states {
            if state
                .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                continue;
            }
            // Counted first so the job's own release never runs ahead of it
            self.held.fetch_add(1, Ordering::AcqRel);
            if state
                .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                self.held.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
}

fn collect(
    rx: &crossbeam_channel::Receiver<Event>,
    jobs: &[MinerJob],
    timeout: Option<Duration>,
) -> ExtractResult<Vec<Vec<Candidate>>> {
    let mut started: Vec<Option<Instant>> = vec![None; jobs.len()];
    let mut results: Vec<Option<Vec<Candidate>>> = vec![None; jobs.len()];
    let mut remaining = jobs.len();

    while remaining > 0 {
        let deadline = timeout.and_then(|limit| earliest_deadline(&started, &results, limit));
        let event = match deadline {
            Some((index, deadline)) => match rx.recv_deadline(deadline) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => {
                    let symbol = &jobs[index].symbol;
                    warn!("Miner {} exceeded its time limit", symbol);
                    return Err(ExtractError::miner_timeout(
                        symbol.as_str(),
                        timeout.unwrap_or_default(),
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => return Err(lost_workers(jobs, &results)),
            },
            None => rx.recv().map_err(|_| lost_workers(jobs, &results))?,
        };

        match event {
            Event::Started(index, at) => started[index] = Some(at),
            Event::Finished(index, Ok(candidates)) => {
                trace!(
                    "Miner {} reported {} candidates",
                    jobs[index].symbol,
                    candidates.len()
                );
                results[index] = Some(candidates);
                remaining -= 1;
            }
            Event::Finished(index, Err(message)) => {
                return Err(ExtractError::miner_fault(jobs[index].symbol.as_str(), message));
            }
        }
    }

    Ok(results.into_iter().map(Option::unwrap_or_default).collect())
}

/// Earliest deadline among miners that are running and not yet finished
fn earliest_deadline(
    started: &[Option<Instant>],
    results: &[Option<Vec<Candidate>>],
    limit: Duration,
) -> Option<(usize, Instant)> {
    started
        .iter()
        .zip(results)
        .enumerate()
        .filter(|(_, (_, result))| result.is_none())
        .filter_map(|(index, (start, _))| start.map(|at| (index, at + limit)))
        .min_by_key(|&(_, deadline)| deadline)
}

fn lost_workers(jobs: &[MinerJob], results: &[Option<Vec<Candidate>>]) -> ExtractError {
    let symbol = jobs
        .iter()
        .zip(results)
        .find(|(_, result)| result.is_none())
        .map(|(job, _)| job.symbol.as_str())
        .unwrap_or("unknown");
    ExtractError::miner_fault(symbol, "worker exited without reporting a result")
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
