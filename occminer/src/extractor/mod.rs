//! The extraction engine.
//!
//! An [`Extractor`] owns a registry of miners and a fixed-size worker pool, and
//! borrows a [`Stream`] it reads from. Each call to [`Extractor::next`] runs one
//! batch cycle:
//!
//! 1. Read up to `batch_size` units (bytes or codepoints) from the stream
//! 2. Hand the window to every registered miner on the worker pool
//! 3. Wait for all miners, then concatenate their candidates in registration order
//! 4. Drop enclosed occurrences unless `E_NO_ENCLOSED_OCCURRENCES` is set
//! 5. Sort by position when `E_SORT_RESULTS` is set
//!
//! ```rust,ignore
//! let stream = Stream::open_file("mail.txt")?;
//! let mut extractor = Extractor::new(-1, -1, E_SORT_RESULTS)?;
//! extractor.add_miner_from_module("miners/regex_entities.so", "match_email", None)?;
//! extractor.set_stream(&stream)?;
//! while !extractor.eof() {
//!     let batch = extractor.next()?;
//!     let mut cursor = batch.cursor();
//!     while !cursor.at_end() {
//!         println!("{} at {}", cursor.text(), cursor.byte_offset());
//!         cursor.advance();
//!     }
//! }
//! stream.close()?;
//! ```
//!
//! # Lifecycle
//!
//! Configuration, registration, attachment and batch reads all take `&mut self`,
//! so none of them can overlap a running batch. [`Extractor::destroy`] releases
//! the pool and the miners; any later call fails, including a second destroy.
//! Dropping the extractor releases whatever is still held.

mod dispatch;
mod filter;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use self::dispatch::{MinerJob, WorkerPool};
use self::filter::{drop_enclosed, sort_by_position};
use crate::config::{resolve_batch_size, resolve_thread_count, ExtractorConfig};
use crate::errors::{ExtractError, ExtractResult};
use crate::flags::ExtractFlags;
use crate::metrics::ExtractionMetrics;
use crate::miner::builtin::default_loader;
use crate::miner::{BuiltinLoader, Candidate, MinerMeta, MinerRegistry, ModuleLoader};
use crate::occurrence::{Occurrence, OccurrenceBatch};
use crate::stream::{count_codepoints, BatchUnit, Stream, StreamHandle, Window};

/// Codepoint prefix counts are sampled every this many bytes
const CODEPOINT_INDEX_STRIDE: usize = 64;

/// Batched, concurrent occurrence extractor
pub struct Extractor {
    batch_size: usize,
    thread_count: usize,
    batch_unit: BatchUnit,
    miner_timeout: Option<Duration>,
    flags: ExtractFlags,
    stream: Option<StreamHandle>,
    registry: MinerRegistry,
    loader: Arc<dyn ModuleLoader>,
    pool: Option<WorkerPool>,
    last_error: Option<String>,
    metrics: ExtractionMetrics,
}

impl Extractor {
    /// Creates an extractor resolving miners from the standard modules in the
    /// default miners directory.
    ///
    /// Non-positive `batch_size` becomes 65536 and non-positive `threads` becomes
    /// the number of CPUs. Unknown bits in `flags` are rejected.
    pub fn new(batch_size: i64, threads: i64, flags: u32) -> ExtractResult<Self> {
        Self::with_loader(batch_size, threads, flags, default_loader())
    }

    /// Creates an extractor resolving miners through `loader`
    pub fn with_loader(
        batch_size: i64,
        threads: i64,
        flags: u32,
        loader: impl ModuleLoader + 'static,
    ) -> ExtractResult<Self> {
        let flags = ExtractFlags::new(flags)?;
        let batch_size = resolve_batch_size(batch_size);
        let thread_count = resolve_thread_count(threads);

        let pool = WorkerPool::new(thread_count)?;

        info!(
            "Created extractor: batch size {}, {} workers, flags {:#x}",
            batch_size,
            thread_count,
            flags.bits()
        );
        Ok(Self {
            batch_size,
            thread_count,
            batch_unit: BatchUnit::default(),
            miner_timeout: None,
            flags,
            stream: None,
            registry: MinerRegistry::new(),
            loader: Arc::new(loader),
            pool: Some(pool),
            last_error: None,
            metrics: ExtractionMetrics::new(),
        })
    }

    /// Creates an extractor from configuration and registers its miners in order
    pub fn from_config(config: &ExtractorConfig) -> ExtractResult<Self> {
        let loader = BuiltinLoader::new(&config.miners_dir);
        let mut extractor =
            Self::with_loader(config.batch_size, config.thread_count, config.flags, loader)?
                .with_batch_unit(config.batch_unit);
        extractor.set_miner_timeout(config.miner_timeout()?);

        for spec in &config.miners {
            let params = spec.params.as_deref().map(str::as_bytes);
            extractor.add_miner_from_module(config.miner_path(spec), &spec.symbol, params)?;
        }
        Ok(extractor)
    }

    /// Counts the batch size in `unit` instead of bytes
    pub fn with_batch_unit(mut self, unit: BatchUnit) -> Self {
        self.batch_unit = unit;
        self
    }

    /// Limits how long one miner may spend on one batch
    pub fn set_miner_timeout(&mut self, timeout: Option<Duration>) {
        self.miner_timeout = timeout;
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn batch_unit(&self) -> BatchUnit {
        self.batch_unit
    }

    pub fn miner_timeout(&self) -> Option<Duration> {
        self.miner_timeout
    }

    pub fn flags(&self) -> u32 {
        self.flags.bits()
    }

    pub fn metrics(&self) -> &ExtractionMetrics {
        &self.metrics
    }

    pub fn miners(&self) -> &MinerRegistry {
        &self.registry
    }

    pub fn is_destroyed(&self) -> bool {
        self.pool.is_none()
    }

    /// Message of the most recent failure, cleared by the next success
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Attaches `stream`, replacing any stream attached before. A stream is read
    /// by one extractor at a time, so a stream set on another extractor is
    /// rejected. On failure the extractor is left without a stream.
    pub fn set_stream(&mut self, stream: &Stream) -> ExtractResult<()> {
        let result = self.attach(stream);
        self.track(result)
    }

    fn attach(&mut self, stream: &Stream) -> ExtractResult<()> {
        self.ensure_active()?;
        self.detach();
        let handle = stream.handle();
        handle.claim()?;
        debug!("Attached stream at offset {}", stream.offset());
        self.stream = Some(handle);
        Ok(())
    }

    fn detach(&mut self) -> bool {
        match self.stream.take() {
            Some(handle) => {
                handle.release();
                true
            }
            None => false,
        }
    }

    /// Detaches the current stream, if any
    pub fn unset_stream(&mut self) -> ExtractResult<()> {
        let result = self.ensure_active().map(|()| {
            if self.detach() {
                debug!("Detached stream");
            }
        });
        self.track(result)
    }

    pub fn set_flags(&mut self, flags: u32) -> ExtractResult<()> {
        let result = self
            .ensure_active()
            .and_then(|()| self.flags.set(flags));
        self.track(result)
    }

    pub fn unset_flags(&mut self, flags: u32) -> ExtractResult<()> {
        let result = self
            .ensure_active()
            .and_then(|()| self.flags.unset(flags));
        self.track(result)
    }

    /// Loads the miner exported as `symbol` by the module at `path`.
    ///
    /// `params` is forwarded to the miner's initialization entry; a trailing zero
    /// byte is optional. Failed registration leaves the registry unchanged, and
    /// the reason is also available from [`last_error`](Self::last_error).
    pub fn add_miner_from_module(
        &mut self,
        path: impl AsRef<Path>,
        symbol: &str,
        params: Option<&[u8]>,
    ) -> ExtractResult<()> {
        let result = self.ensure_active().and_then(|()| {
            self.registry
                .add(self.loader.as_ref(), path.as_ref(), symbol, params)
                .map(|_| ())
        });
        if let Err(e) = &result {
            warn!("Failed to add miner {}: {}", symbol, e);
        }
        self.track(result)
    }

    /// Introspection views of the registered miners, in registration order
    pub fn list_meta(&self) -> Vec<MinerMeta> {
        self.registry.list_meta()
    }

    /// Whether there is nothing left to read: no stream is attached, or the
    /// attached stream is exhausted, closed or failed
    pub fn eof(&self) -> bool {
        match &self.stream {
            None => true,
            Some(stream) => stream.at_end(),
        }
    }

    /// Runs one batch cycle and returns the occurrences found in it. Once the
    /// stream is exhausted every call returns an empty batch.
    pub fn next(&mut self) -> ExtractResult<OccurrenceBatch> {
        let result = self.next_batch();
        self.track(result)
    }

    fn next_batch(&mut self) -> ExtractResult<OccurrenceBatch> {
        self.ensure_active()?;
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| ExtractError::stream_state("stream is not set"))?;
        let window = stream.read_window(self.batch_size, self.batch_unit)?;
        if window.bytes.is_empty() {
            debug!("Stream exhausted");
            return Ok(OccurrenceBatch::default());
        }
        self.metrics
            .record_window(window.bytes.len() as u64, window.codepoints);

        let candidates = self.run_miners(&window)?;
        let index = CodepointIndex::new(&window.bytes);
        let mut occurrences = Vec::with_capacity(candidates.iter().map(Vec::len).sum());
        for candidate in candidates.into_iter().flatten() {
            match to_occurrence(&window, &index, candidate) {
                Some(occurrence) => occurrences.push(occurrence),
                None => self.metrics.record_rejected_candidate(),
            }
        }

        let enclosed = if self.flags.filters_enclosed() {
            drop_enclosed(&mut occurrences)
        } else {
            0
        };
        if self.flags.sorts_results() {
            sort_by_position(&mut occurrences);
        }

        self.metrics
            .record_batch_output(occurrences.len() as u64, enclosed as u64);
        debug!(
            "Batch at byte {}: {} occurrences, {} enclosed dropped",
            window.byte_offset,
            occurrences.len(),
            enclosed
        );
        Ok(OccurrenceBatch::new(occurrences))
    }

    fn run_miners(&self, window: &Window) -> ExtractResult<Vec<Vec<Candidate>>> {
        if self.registry.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| ExtractError::resource("extractor has been destroyed"))?;
        let jobs: Vec<MinerJob> = self
            .registry
            .iter()
            .map(|descriptor| MinerJob {
                symbol: descriptor.symbol().to_string(),
                miner: descriptor.miner(),
            })
            .collect();

        let result = pool.dispatch(&jobs, Arc::from(window.bytes.as_slice()), self.miner_timeout);
        match &result {
            Err(ExtractError::MinerTimeout { .. }) => self.metrics.record_miner_timeout(),
            Err(ExtractError::MinerFault { .. }) => self.metrics.record_miner_fault(),
            _ => {}
        }
        result
    }

    /// Releases the worker pool and the miners. Calling it again is an error.
    /// The attached stream is detached but stays open: it belongs to its owner.
    pub fn destroy(&mut self) -> ExtractResult<()> {
        let result = self.release();
        self.track(result)
    }

    fn release(&mut self) -> ExtractResult<()> {
        let Some(pool) = self.pool.take() else {
            return Err(ExtractError::resource("extractor has been already destroyed"));
        };
        self.detach();
        self.registry.clear();
        drop(pool);
        self.metrics.log_stats();
        info!("Extractor destroyed");
        Ok(())
    }

    fn ensure_active(&self) -> ExtractResult<()> {
        if self.pool.is_none() {
            return Err(ExtractError::resource("extractor has been destroyed"));
        }
        Ok(())
    }

    /// Records the outcome of a public operation in the last-error slot
    fn track<T>(&mut self, result: ExtractResult<T>) -> ExtractResult<T> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => self.last_error = Some(e.to_string()),
        }
        result
    }
}

impl Drop for Extractor {
    fn drop(&mut self) {
        if self.pool.is_some() {
            let _ = self.release();
        }
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("batch_size", &self.batch_size)
            .field("thread_count", &self.thread_count)
            .field("batch_unit", &self.batch_unit)
            .field("flags", &self.flags)
            .field("miners", &self.registry.len())
            .field("attached", &self.stream.is_some())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Sampled codepoint prefix counts for a window
struct CodepointIndex<'a> {
    bytes: &'a [u8],
    samples: Vec<u64>,
}

impl<'a> CodepointIndex<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        let mut samples = Vec::with_capacity(bytes.len() / CODEPOINT_INDEX_STRIDE + 1);
        let mut total = 0;
        samples.push(0);
        for block in bytes.chunks(CODEPOINT_INDEX_STRIDE) {
            total += count_codepoints(block);
            samples.push(total);
        }
        Self { bytes, samples }
    }

    /// Codepoints that start before byte `position`
    fn codepoints_before(&self, position: usize) -> u64 {
        let block = position / CODEPOINT_INDEX_STRIDE;
        let block_start = block * CODEPOINT_INDEX_STRIDE;
        self.samples[block] + count_codepoints(&self.bytes[block_start..position])
    }
}

/// Turns a window-relative candidate into an occurrence with owned text and
/// stream positions. Candidates outside the window are rejected.
fn to_occurrence(window: &Window, index: &CodepointIndex<'_>, candidate: Candidate) -> Option<Occurrence> {
    let end = candidate.start.checked_add(candidate.len)?;
    if end > window.bytes.len() || candidate.probability.is_nan() {
        warn!(
            "Dropping candidate {}..{} labelled {} from a {} byte window",
            candidate.start,
            end,
            candidate.label,
            window.bytes.len()
        );
        return None;
    }
    let span = &window.bytes[candidate.start..end];
    let cp_start = index.codepoints_before(candidate.start);
    let cp_end = index.codepoints_before(end);

    Some(Occurrence {
        text: String::from_utf8_lossy(span).into_owned(),
        byte_offset: window.byte_offset + candidate.start as u64,
        codepoint_offset: window.codepoint_offset + cp_start,
        byte_length: u32::try_from(candidate.len).ok()?,
        codepoint_length: u32::try_from(cp_end - cp_start).ok()?,
        label: candidate.label,
        probability: candidate.probability.clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{E_NO_ENCLOSED_OCCURRENCES, E_SORT_RESULTS};
    use crate::miner::{Miner, MinerModule, MinerSymbol};
    use crate::stream::StreamState;

    /// Reports the same spans in every window
    struct Spans(Vec<(usize, usize)>);

    impl Miner for Spans {
        fn scan(&self, window: &[u8]) -> Vec<Candidate> {
            self.0
                .iter()
                .filter(|&&(start, len)| start + len <= window.len())
                .map(|&(start, len)| Candidate::new(start, len, "Span", 0.5))
                .collect()
        }
    }

    fn spans_loader(spans: Vec<(usize, usize)>) -> BuiltinLoader {
        let spans = Arc::new(spans);
        let module = MinerModule::new("spans").with_symbol(
            "match_spans",
            MinerSymbol::new(["Span"], move |_| {
                Ok(Box::new(Spans(spans.as_ref().clone())) as Box<dyn Miner>)
            }),
        );
        BuiltinLoader::new("miners").with_module("test/spans.so", module)
    }

    fn extractor_with_spans(spans: Vec<(usize, usize)>, flags: u32) -> Extractor {
        let mut extractor = Extractor::with_loader(-1, 2, flags, spans_loader(spans)).unwrap();
        extractor
            .add_miner_from_module("test/spans.so", "match_spans", None)
            .unwrap();
        extractor
    }

    #[test]
    fn test_defaults_substituted() {
        let extractor = Extractor::new(-1, 0, 0).unwrap();
        assert_eq!(extractor.batch_size(), 65536);
        assert_eq!(extractor.thread_count(), num_cpus::get());
        assert_eq!(extractor.flags(), 0);
        assert!(extractor.eof());
    }

    #[test]
    fn test_unknown_initial_flags() {
        let err = Extractor::new(16, 1, 1 << 7).unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
    }

    #[test]
    fn test_sorting() {
        let text = "aaaaaaaaaaaaaaaaaaaa";
        let mut extractor = extractor_with_spans(vec![(10, 1), (2, 1), (7, 1)], E_SORT_RESULTS);
        let stream = Stream::open_buffer(text).unwrap();
        extractor.set_stream(&stream).unwrap();

        let batch = extractor.next().unwrap();
        let offsets: Vec<u64> = batch.iter().map(|o| o.byte_offset).collect();
        assert_eq!(offsets, vec![2, 7, 10]);
    }

    #[test]
    fn test_unsorted_keeps_aggregation_order() {
        let mut extractor = extractor_with_spans(vec![(10, 1), (2, 1), (7, 1)], 0);
        let stream = Stream::open_buffer("aaaaaaaaaaaaaaaaaaaa").unwrap();
        extractor.set_stream(&stream).unwrap();

        let offsets: Vec<u64> = extractor.next().unwrap().iter().map(|o| o.byte_offset).collect();
        assert_eq!(offsets, vec![10, 2, 7]);
    }

    #[test]
    fn test_enclosed_filtering_toggle() {
        let text = "0123456789abcdef";
        let mut extractor = extractor_with_spans(vec![(0, 10), (2, 2)], 0);
        let stream = Stream::open_buffer(text).unwrap();
        extractor.set_stream(&stream).unwrap();
        let batch = extractor.next().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.as_slice()[0].text, "0123456789");
        assert_eq!(extractor.metrics().get_stats().occurrences_enclosed, 1);

        let mut extractor = extractor_with_spans(vec![(0, 10), (2, 2)], 0);
        extractor.set_flags(E_NO_ENCLOSED_OCCURRENCES).unwrap();
        let stream = Stream::open_buffer(text).unwrap();
        extractor.set_stream(&stream).unwrap();
        let batch = extractor.next().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.as_slice()[1].text, "23");
    }

    #[test]
    fn test_positions_across_batches() {
        // 4-byte batches over "abčdef": "abč" then "def"
        let mut extractor = Extractor::with_loader(4, 1, 0, spans_loader(vec![(0, 1)])).unwrap();
        extractor
            .add_miner_from_module("test/spans.so", "match_spans", None)
            .unwrap();
        let stream = Stream::open_buffer("abčdef").unwrap();
        extractor.set_stream(&stream).unwrap();

        let first = extractor.next().unwrap();
        assert_eq!(first.as_slice()[0].text, "a");

        let second = extractor.next().unwrap();
        let occurrence = &second.as_slice()[0];
        assert_eq!(occurrence.text, "d");
        assert_eq!(occurrence.byte_offset, 4);
        assert_eq!(occurrence.codepoint_offset, 3);
        assert!(extractor.eof());
    }

    #[test]
    fn test_codepoint_batches() {
        let mut extractor = Extractor::with_loader(3, 1, 0, spans_loader(vec![(0, 2)]))
            .unwrap()
            .with_batch_unit(BatchUnit::Codepoints);
        extractor
            .add_miner_from_module("test/spans.so", "match_spans", None)
            .unwrap();
        let stream = Stream::open_buffer("žluťoučký").unwrap();
        extractor.set_stream(&stream).unwrap();

        let first = extractor.next().unwrap();
        let occurrence = &first.as_slice()[0];
        assert_eq!(occurrence.text, "ž");
        assert_eq!(occurrence.codepoint_length, 1);
        assert_eq!(occurrence.byte_length, 2);

        let second = extractor.next().unwrap();
        let occurrence = &second.as_slice()[0];
        assert_eq!(occurrence.text, "ť");
        assert_eq!(occurrence.byte_offset, 4);
        assert_eq!(occurrence.codepoint_offset, 3);
    }

    #[test]
    fn test_out_of_window_candidates_rejected() {
        struct Wild;
        impl Miner for Wild {
            fn scan(&self, _window: &[u8]) -> Vec<Candidate> {
                vec![
                    Candidate::new(1, 100, "Wild", 1.0),
                    Candidate::new(usize::MAX, 2, "Wild", 1.0),
                    Candidate::new(0, 1, "Wild", 7.0),
                ]
            }
        }
        let module = MinerModule::new("wild").with_symbol(
            "match_wild",
            MinerSymbol::new(["Wild"], |_| Ok(Box::new(Wild) as Box<dyn Miner>)),
        );
        let loader = BuiltinLoader::empty().with_module("wild.so", module);
        let mut extractor = Extractor::with_loader(-1, 1, 0, loader).unwrap();
        extractor.add_miner_from_module("wild.so", "match_wild", None).unwrap();
        let stream = Stream::open_buffer("abc").unwrap();
        extractor.set_stream(&stream).unwrap();

        let batch = extractor.next().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.as_slice()[0].probability, 1.0);
        assert_eq!(extractor.metrics().get_stats().candidates_rejected, 2);
    }

    #[test]
    fn test_last_error_tracking() {
        let mut extractor = Extractor::new(-1, 1, 0).unwrap();
        assert!(extractor.last_error().is_none());

        assert!(extractor.next().is_err());
        assert_eq!(
            extractor.last_error(),
            Some("Stream state error: stream is not set")
        );

        extractor.set_flags(E_SORT_RESULTS).unwrap();
        assert!(extractor.last_error().is_none());

        assert!(extractor
            .add_miner_from_module("miners/glob_entities.so", "match_glob", Some(b"[".as_slice()))
            .is_err());
        assert!(extractor
            .last_error()
            .unwrap()
            .contains("invalid glob pattern"));
    }

    #[test]
    fn test_attach_closed_stream_leaves_unattached() {
        let mut extractor = Extractor::new(-1, 1, 0).unwrap();
        let good = Stream::open_buffer("abc").unwrap();
        extractor.set_stream(&good).unwrap();

        let closed = Stream::open_buffer("abc").unwrap();
        closed.close().unwrap();
        assert!(matches!(
            extractor.set_stream(&closed),
            Err(ExtractError::StreamState(_))
        ));
        assert!(extractor.eof());
        assert!(matches!(extractor.next(), Err(ExtractError::StreamState(_))));
    }

    #[test]
    fn test_failed_stream() {
        use std::io::{BufReader, Cursor, Read};

        struct Unplugged;
        impl Read for Unplugged {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "cable unplugged"))
            }
        }

        let mut extractor = Extractor::with_loader(4, 1, 0, spans_loader(vec![(0, 1)])).unwrap();
        extractor
            .add_miner_from_module("test/spans.so", "match_spans", None)
            .unwrap();
        let reader = BufReader::new(Cursor::new(b"abcd".to_vec()).chain(Unplugged));
        let stream = Stream::from_reader(reader);
        extractor.set_stream(&stream).unwrap();
        extractor.next().unwrap();

        assert!(matches!(extractor.next(), Err(ExtractError::StreamState(_))));
        assert_eq!(stream.state(), StreamState::Failed);
        assert!(!stream.is_valid());
        assert!(extractor.last_error().unwrap().contains("cable unplugged"));

        // Still failed on the next attempt
        assert!(matches!(extractor.next(), Err(ExtractError::StreamState(_))));
        assert!(extractor.eof());

        assert!(matches!(
            extractor.set_stream(&stream),
            Err(ExtractError::StreamState(_))
        ));
        assert_eq!(
            extractor.last_error(),
            Some("Stream state error: unable to set a failed stream")
        );
        assert!(matches!(extractor.next(), Err(ExtractError::StreamState(_))));
    }

    #[test]
    fn test_stream_read_by_one_extractor() {
        let stream = Stream::open_buffer("aaaabbbbccccdddd").unwrap();
        let mut first = Extractor::new(4, 1, 0).unwrap();
        let mut second = Extractor::new(4, 1, 0).unwrap();

        first.set_stream(&stream).unwrap();
        assert!(matches!(
            second.set_stream(&stream),
            Err(ExtractError::StreamState(_))
        ));
        assert!(second.eof());

        // Setting it again on the same extractor is allowed
        first.set_stream(&stream).unwrap();
        first.next().unwrap();
        assert_eq!(stream.offset(), 4);

        first.unset_stream().unwrap();
        second.set_stream(&stream).unwrap();
        second.next().unwrap();
        assert_eq!(stream.offset(), 8);

        second.destroy().unwrap();
        first.set_stream(&stream).unwrap();

        drop(first);
        let mut third = Extractor::new(4, 1, 0).unwrap();
        third.set_stream(&stream).unwrap();
    }

    #[test]
    fn test_dropped_stream_reads_as_closed() {
        let mut extractor = Extractor::new(4, 1, 0).unwrap();
        let stream = Stream::open_buffer("Hello world byte").unwrap();
        extractor.set_stream(&stream).unwrap();
        extractor.next().unwrap();

        drop(stream);
        assert!(extractor.eof());
        assert!(matches!(extractor.next(), Err(ExtractError::StreamState(_))));
    }

    #[test]
    fn test_operations_fail_after_destroy() {
        let mut extractor = Extractor::new(-1, 1, 0).unwrap();
        let stream = Stream::open_buffer("abc").unwrap();
        extractor.set_stream(&stream).unwrap();

        assert!(extractor.destroy().is_ok());
        assert!(extractor.is_destroyed());
        // The stream belongs to its owner and stays usable
        assert!(stream.is_valid());

        assert!(matches!(extractor.destroy(), Err(ExtractError::Resource(_))));
        assert!(matches!(extractor.next(), Err(ExtractError::Resource(_))));
        assert!(matches!(extractor.set_stream(&stream), Err(ExtractError::Resource(_))));
        assert!(extractor.set_flags(E_SORT_RESULTS).is_err());
        assert!(extractor.unset_stream().is_err());
        assert!(extractor
            .add_miner_from_module("miners/regex_entities.so", "match_url", None)
            .is_err());
        assert!(extractor.eof());
    }

    #[test]
    fn test_codepoint_index() {
        let text = "ž".repeat(100);
        let index = CodepointIndex::new(text.as_bytes());
        assert_eq!(index.codepoints_before(0), 0);
        assert_eq!(index.codepoints_before(64), 32);
        assert_eq!(index.codepoints_before(130), 65);
        assert_eq!(index.codepoints_before(200), 100);
    }
}
