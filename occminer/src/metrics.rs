use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Tracks extraction throughput and filtering counters
#[derive(Debug, Clone)]
pub struct ExtractionMetrics {
    // Input metrics
    batches: Arc<AtomicU64>,
    bytes_read: Arc<AtomicU64>,
    codepoints_read: Arc<AtomicU64>,

    // Output metrics
    occurrences_emitted: Arc<AtomicU64>,
    occurrences_enclosed: Arc<AtomicU64>,
    candidates_rejected: Arc<AtomicU64>,

    // Miner health
    miner_timeouts: Arc<AtomicU64>,
    miner_faults: Arc<AtomicU64>,
}

impl ExtractionMetrics {
    /// Creates a new ExtractionMetrics instance
    pub fn new() -> Self {
        Self {
            batches: Arc::new(AtomicU64::new(0)),
            bytes_read: Arc::new(AtomicU64::new(0)),
            codepoints_read: Arc::new(AtomicU64::new(0)),
            occurrences_emitted: Arc::new(AtomicU64::new(0)),
            occurrences_enclosed: Arc::new(AtomicU64::new(0)),
            candidates_rejected: Arc::new(AtomicU64::new(0)),
            miner_timeouts: Arc::new(AtomicU64::new(0)),
            miner_faults: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a window read from the stream
    pub fn record_window(&self, bytes: u64, codepoints: u64) {
        let batches = self.batches.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.bytes_read.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.codepoints_read.fetch_add(codepoints, Ordering::Relaxed);
        debug!(
            "Batch {}: {} bytes read, {} bytes total",
            batches, bytes, total
        );
    }

    /// Records the outcome of aggregating one batch
    pub fn record_batch_output(&self, emitted: u64, enclosed: u64) {
        self.occurrences_emitted.fetch_add(emitted, Ordering::Relaxed);
        self.occurrences_enclosed.fetch_add(enclosed, Ordering::Relaxed);
    }

    /// Records a candidate that fell outside its window
    pub fn record_rejected_candidate(&self) {
        self.candidates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miner_timeout(&self) {
        self.miner_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miner_fault(&self) {
        self.miner_faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets a snapshot of the counters
    pub fn get_stats(&self) -> ExtractionStats {
        ExtractionStats {
            batches: self.batches.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            codepoints_read: self.codepoints_read.load(Ordering::Relaxed),
            occurrences_emitted: self.occurrences_emitted.load(Ordering::Relaxed),
            occurrences_enclosed: self.occurrences_enclosed.load(Ordering::Relaxed),
            candidates_rejected: self.candidates_rejected.load(Ordering::Relaxed),
            miner_timeouts: self.miner_timeouts.load(Ordering::Relaxed),
            miner_faults: self.miner_faults.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Extraction stats:\n\
             Batches: {}\n\
             Read: {} bytes / {} codepoints\n\
             Occurrences emitted/enclosed: {}/{}\n\
             Candidates rejected: {}\n\
             Miner timeouts/faults: {}/{}",
            stats.batches,
            stats.bytes_read,
            stats.codepoints_read,
            stats.occurrences_emitted,
            stats.occurrences_enclosed,
            stats.candidates_rejected,
            stats.miner_timeouts,
            stats.miner_faults
        );
    }
}

impl Default for ExtractionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`ExtractionMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub batches: u64,
    pub bytes_read: u64,
    pub codepoints_read: u64,
    pub occurrences_emitted: u64,
    pub occurrences_enclosed: u64,
    pub candidates_rejected: u64,
    pub miner_timeouts: u64,
    pub miner_faults: u64,
}
