//! Sequential byte sources feeding an [`Extractor`](crate::extractor::Extractor).
//!
//! A [`Stream`] is owned by whoever opened it. Attaching it to an extractor only
//! shares a handle to the same underlying state, so when the owner closes the
//! stream the extractor observes the closed state on its next read.
//!
//! Reads are windowed: the extractor asks for at most `limit` units, either raw
//! bytes or UTF-8 codepoints. Byte windows are trimmed back so that a multi-byte
//! sequence is never split between two batches; the trimmed tail is carried into
//! the next read.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::errors::{ExtractError, ExtractResult};

const FILE_BUFFER_CAPACITY: usize = 65536;

/// Lifecycle state of a stream. `Failed` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Valid,
    Failed,
    Closed,
}

/// Granularity of the units counted against the batch size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchUnit {
    #[default]
    Bytes,
    Codepoints,
}

enum Source {
    File(BufReader<File>),
    Buffer(Cursor<Vec<u8>>),
    #[cfg(test)]
    Reader(Box<dyn BufRead + Send>),
}

impl Source {
    fn reader(&mut self) -> &mut dyn BufRead {
        match self {
            Source::File(reader) => reader,
            Source::Buffer(cursor) => cursor,
            #[cfg(test)]
            Source::Reader(reader) => reader.as_mut(),
        }
    }
}

/// One window of stream content handed to the miners
#[derive(Debug, Default)]
pub(crate) struct Window {
    pub(crate) bytes: Vec<u8>,
    pub(crate) codepoints: u64,
    /// Stream position of the first byte, in bytes
    pub(crate) byte_offset: u64,
    /// Stream position of the first byte, in codepoints
    pub(crate) codepoint_offset: u64,
}

struct StreamCore {
    source: Option<Source>,
    carry: Vec<u8>,
    offset: u64,
    codepoint_offset: u64,
    len: Option<u64>,
    state: StreamState,
    /// Set while an extractor reads from the stream
    attached: bool,
}

impl StreamCore {
    fn release_source(&mut self) {
        self.source = None;
        self.carry.clear();
    }

    fn fail(&mut self, err: &io::Error) -> ExtractError {
        warn!("Stream read failed, marking stream as failed: {}", err);
        self.state = StreamState::Failed;
        self.release_source();
        ExtractError::stream_state(format!("stream read failed: {}", err))
    }

    fn read_window(&mut self, limit: usize, unit: BatchUnit) -> ExtractResult<Window> {
        match self.state {
            StreamState::Valid => {}
            StreamState::Failed => return Err(ExtractError::stream_state("stream has failed")),
            StreamState::Closed => return Err(ExtractError::stream_state("stream is closed")),
        }
        let Some(source) = self.source.as_mut() else {
            return Err(ExtractError::stream_state("stream has no source"));
        };

        let mut window = Window {
            byte_offset: self.offset,
            codepoint_offset: self.codepoint_offset,
            ..Window::default()
        };
        let filled = fill_window(
            &mut self.carry,
            source.reader(),
            limit,
            unit,
            &mut window.bytes,
        );
        if let Err(e) = filled {
            return Err(self.fail(&e));
        }

        if unit == BatchUnit::Bytes && window.bytes.len() == limit {
            let keep = utf8_boundary(&window.bytes);
            if keep > 0 && keep < window.bytes.len() {
                let tail = window.bytes.split_off(keep);
                self.carry.splice(0..0, tail);
            }
        }

        window.codepoints = count_codepoints(&window.bytes);
        self.offset += window.bytes.len() as u64;
        self.codepoint_offset += window.codepoints;
        if let Some(len) = self.len.as_mut() {
            *len = (*len).max(self.offset);
        }
        Ok(window)
    }

    fn at_end(&mut self) -> bool {
        if self.state != StreamState::Valid {
            return true;
        }
        if !self.carry.is_empty() {
            return false;
        }
        let Some(source) = self.source.as_mut() else {
            return true;
        };
        let drained = source.reader().fill_buf().map(|buf| buf.is_empty());
        match drained {
            Ok(drained) => drained,
            Err(e) => {
                self.fail(&e);
                true
            }
        }
    }
}

/// Pulls up to `limit` units into `out`, serving carried-over bytes first
fn fill_window(
    carry: &mut Vec<u8>,
    reader: &mut dyn BufRead,
    limit: usize,
    unit: BatchUnit,
    out: &mut Vec<u8>,
) -> io::Result<()> {
    let mut codepoints = 0usize;
    loop {
        let from_carry = !carry.is_empty();
        let chunk: &[u8] = if from_carry {
            carry.as_slice()
        } else {
            reader.fill_buf()?
        };
        if chunk.is_empty() {
            return Ok(());
        }

        let (take, done) = match unit {
            BatchUnit::Bytes => {
                let take = (limit - out.len()).min(chunk.len());
                (take, out.len() + take == limit)
            }
            BatchUnit::Codepoints => {
                let mut take = 0;
                let mut done = false;
                for &byte in chunk {
                    if is_lead_byte(byte) {
                        if codepoints == limit {
                            done = true;
                            break;
                        }
                        codepoints += 1;
                    }
                    take += 1;
                }
                (take, done)
            }
        };

        out.extend_from_slice(&chunk[..take]);
        if from_carry {
            carry.drain(..take);
        } else {
            reader.consume(take);
        }
        if done {
            return Ok(());
        }
    }
}

/// Any byte that does not continue a multi-byte UTF-8 sequence starts a codepoint
pub(crate) fn is_lead_byte(byte: u8) -> bool {
    byte & 0xC0 != 0x80
}

pub(crate) fn count_codepoints(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|&&b| is_lead_byte(b)).count() as u64
}

/// Length of the longest prefix of `bytes` that does not end inside an
/// incomplete UTF-8 sequence
fn utf8_boundary(bytes: &[u8]) -> usize {
    let len = bytes.len();
    let lookback = len.saturating_sub(4);
    for i in (lookback..len).rev() {
        let byte = bytes[i];
        if !is_lead_byte(byte) {
            continue;
        }
        let width = match byte {
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if i + width > len { i } else { len };
    }
    len
}

/// Shared handle to a stream's state, held by an attached extractor
#[derive(Clone)]
pub(crate) struct StreamHandle {
    core: Arc<Mutex<StreamCore>>,
}

impl StreamHandle {
    fn lock(&self) -> MutexGuard<'_, StreamCore> {
        self.core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks the stream as read by one extractor. Fails if the stream cannot be
    /// read or another extractor already reads it.
    pub(crate) fn claim(&self) -> ExtractResult<()> {
        let mut core = self.lock();
        match core.state {
            StreamState::Valid => {}
            StreamState::Failed => return Err(ExtractError::stream_state("unable to set a failed stream")),
            StreamState::Closed => return Err(ExtractError::stream_state("unable to set a closed stream")),
        }
        if core.attached {
            return Err(ExtractError::stream_state(
                "stream is already set on another extractor",
            ));
        }
        core.attached = true;
        Ok(())
    }

    /// Gives up the claim taken by [`claim`](Self::claim)
    pub(crate) fn release(&self) {
        self.lock().attached = false;
    }

    pub(crate) fn read_window(&self, limit: usize, unit: BatchUnit) -> ExtractResult<Window> {
        self.lock().read_window(limit, unit)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.lock().at_end()
    }

    pub(crate) fn state(&self) -> StreamState {
        self.lock().state
    }

    pub(crate) fn offset(&self) -> u64 {
        self.lock().offset
    }
}

/// A byte source backed by a file or an in-memory buffer
pub struct Stream {
    handle: StreamHandle,
    path: Option<PathBuf>,
}

impl Stream {
    /// Opens a file for sequential reading
    pub fn open_file(path: impl AsRef<Path>) -> ExtractResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                ExtractError::resource(format!("file does not exist: {}", path.display()))
            }
            io::ErrorKind::PermissionDenied => {
                ExtractError::resource(format!("permission denied: {}", path.display()))
            }
            _ => ExtractError::Io(e),
        })?;
        let metadata = file.metadata()?;
        if metadata.is_dir() {
            return Err(ExtractError::resource(format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        debug!(
            "Opened file stream {} ({} bytes)",
            path.display(),
            metadata.len()
        );
        let source = Source::File(BufReader::with_capacity(FILE_BUFFER_CAPACITY, file));
        Ok(Self::from_source(
            source,
            Some(metadata.len()),
            Some(path.to_path_buf()),
        ))
    }

    /// Wraps an in-memory buffer. A single trailing zero terminator is not part
    /// of the content.
    pub fn open_buffer(buffer: impl Into<Vec<u8>>) -> ExtractResult<Self> {
        let mut buffer = buffer.into();
        if buffer.last() == Some(&0) {
            buffer.pop();
        }
        if buffer.is_empty() {
            return Err(ExtractError::resource("empty buffer given"));
        }

        debug!("Opened buffer stream ({} bytes)", buffer.len());
        let len = buffer.len() as u64;
        Ok(Self::from_source(
            Source::Buffer(Cursor::new(buffer)),
            Some(len),
            None,
        ))
    }

    fn from_source(source: Source, len: Option<u64>, path: Option<PathBuf>) -> Self {
        let core = StreamCore {
            source: Some(source),
            carry: Vec::new(),
            offset: 0,
            codepoint_offset: 0,
            len,
            state: StreamState::Valid,
            attached: false,
        };
        Self {
            handle: StreamHandle {
                core: Arc::new(Mutex::new(core)),
            },
            path,
        }
    }

    /// Whether the stream can still be read
    pub fn is_valid(&self) -> bool {
        self.handle.state() == StreamState::Valid
    }

    pub fn state(&self) -> StreamState {
        self.handle.state()
    }

    /// Number of bytes delivered so far
    pub fn offset(&self) -> u64 {
        self.handle.offset()
    }

    /// Total length in bytes, when known
    pub fn len(&self) -> Option<u64> {
        self.handle.lock().len
    }

    /// Whether no content remains to be read
    pub fn is_empty(&self) -> bool {
        self.handle.at_end()
    }

    /// Path of a file-backed stream
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Releases the underlying source. Closing twice is an error.
    pub fn close(&self) -> ExtractResult<()> {
        let mut core = self.handle.lock();
        if core.state == StreamState::Closed {
            return Err(ExtractError::resource("stream has been already closed"));
        }
        core.release_source();
        core.state = StreamState::Closed;
        debug!("Closed stream at offset {}", core.offset);
        Ok(())
    }

    /// Wraps an arbitrary reader of unknown length
    #[cfg(test)]
    pub(crate) fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self::from_source(Source::Reader(Box::new(reader)), None, None)
    }

    pub(crate) fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }
}

/// Dropping the owner's stream closes it for any extractor still holding it
impl Drop for Stream {
    fn drop(&mut self) {
        let mut core = self.handle.lock();
        if core.state == StreamState::Valid {
            core.release_source();
            core.state = StreamState::Closed;
            debug!("Stream dropped at offset {}", core.offset);
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("offset", &self.offset())
            .finish()
    }
}
