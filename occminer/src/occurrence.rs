/// Occurrence types produced by one extraction cycle.
///
/// Every [`Occurrence`] owns a copy of its matched text, so a batch stays usable
/// after the stream advances or is closed. A batch is consumed either through the
/// forward-only [`OccurrenceCursor`] or through ordinary Rust iteration.
use serde::Serialize;

/// A labelled match located in the stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occurrence {
    /// Matched text, decoded lossily as UTF-8
    pub text: String,
    /// Position in bytes from the start of the stream
    pub byte_offset: u64,
    /// Position in codepoints from the start of the stream
    pub codepoint_offset: u64,
    pub byte_length: u32,
    pub codepoint_length: u32,
    /// Label of the entity type, as reported by the miner
    pub label: String,
    /// Confidence in the range 0.0 to 1.0
    pub probability: f64,
}

impl Occurrence {
    /// End of the occurrence in bytes, exclusive
    pub fn byte_end(&self) -> u64 {
        self.byte_offset + u64::from(self.byte_length)
    }

    /// Whether this occurrence's byte range lies within `other`'s
    pub fn is_enclosed_by(&self, other: &Occurrence) -> bool {
        other.byte_offset <= self.byte_offset && self.byte_end() <= other.byte_end()
    }
}

/// All occurrences found in one batch window
#[derive(Debug, Clone, Default, Serialize)]
pub struct OccurrenceBatch {
    occurrences: Vec<Occurrence>,
}

impl OccurrenceBatch {
    pub fn new(occurrences: Vec<Occurrence>) -> Self {
        Self { occurrences }
    }

    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    pub fn as_slice(&self) -> &[Occurrence] {
        &self.occurrences
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Occurrence> {
        self.occurrences.iter()
    }

    /// Forward-only cursor positioned on the first occurrence
    pub fn cursor(&self) -> OccurrenceCursor<'_> {
        OccurrenceCursor {
            batch: self,
            position: 0,
        }
    }

    /// Serializes the batch as a JSON array
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.occurrences)
    }
}

impl IntoIterator for OccurrenceBatch {
    type Item = Occurrence;
    type IntoIter = std::vec::IntoIter<Occurrence>;

    fn into_iter(self) -> Self::IntoIter {
        self.occurrences.into_iter()
    }
}

impl<'a> IntoIterator for &'a OccurrenceBatch {
    type Item = &'a Occurrence;
    type IntoIter = std::slice::Iter<'a, Occurrence>;

    fn into_iter(self) -> Self::IntoIter {
        self.occurrences.iter()
    }
}

/// Index-based cursor over an [`OccurrenceBatch`].
///
/// Accessors may only be called while [`at_end`](Self::at_end) is false;
/// calling one past the end panics.
#[derive(Debug, Clone)]
pub struct OccurrenceCursor<'a> {
    batch: &'a OccurrenceBatch,
    position: usize,
}

impl<'a> OccurrenceCursor<'a> {
    /// Moves to the next occurrence. Does nothing once the end is reached.
    pub fn advance(&mut self) {
        if !self.at_end() {
            self.position += 1;
        }
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.batch.occurrences.len()
    }

    /// The occurrence under the cursor
    pub fn current(&self) -> &'a Occurrence {
        self.expect_current("current")
    }

    pub fn text(&self) -> &'a str {
        &self.expect_current("text").text
    }

    pub fn byte_offset(&self) -> u64 {
        self.expect_current("byte_offset").byte_offset
    }

    pub fn codepoint_offset(&self) -> u64 {
        self.expect_current("codepoint_offset").codepoint_offset
    }

    pub fn byte_length(&self) -> u32 {
        self.expect_current("byte_length").byte_length
    }

    pub fn codepoint_length(&self) -> u32 {
        self.expect_current("codepoint_length").codepoint_length
    }

    pub fn label(&self) -> &'a str {
        &self.expect_current("label").label
    }

    pub fn probability(&self) -> f64 {
        self.expect_current("probability").probability
    }

    fn expect_current(&self, accessor: &str) -> &'a Occurrence {
        match self.batch.occurrences.get(self.position) {
            Some(occurrence) => occurrence,
            None => panic!(
                "occurrence cursor accessed past its end via `{}` (position {}, batch of {})",
                accessor,
                self.position,
                self.batch.occurrences.len()
            ),
        }
    }
}
