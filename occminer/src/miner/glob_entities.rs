use glob::Pattern;
use std::ffi::CStr;
use unicode_categories::UnicodeCategories;

use super::{Candidate, Miner};

pub const GLOB_LABEL: &str = "Glob";

/// Reports every whitespace-separated token that matches a glob pattern in full.
/// Leading and trailing punctuation is not part of a token.
#[derive(Debug)]
pub struct GlobMiner {
    pattern: Pattern,
}

impl GlobMiner {
    pub fn new(pattern: &str) -> Result<Self, String> {
        if pattern.is_empty() {
            return Err("glob pattern must not be empty".to_string());
        }
        let pattern =
            Pattern::new(pattern).map_err(|e| format!("invalid glob pattern {:?}: {}", pattern, e))?;
        Ok(Self { pattern })
    }

    /// Initialization entry exported as `match_glob`
    pub fn from_params(params: Option<&CStr>) -> Result<Box<dyn Miner>, String> {
        let params = params.ok_or_else(|| "match_glob requires a glob pattern".to_string())?;
        let pattern = params
            .to_str()
            .map_err(|e| format!("glob pattern is not valid UTF-8: {}", e))?;
        Ok(Box::new(Self::new(pattern)?))
    }
}

impl Miner for GlobMiner {
    fn scan(&self, window: &[u8]) -> Vec<Candidate> {
        tokens(window)
            .filter(|(_, token)| self.pattern.matches(token))
            .map(|(start, token)| Candidate::new(start, token.len(), GLOB_LABEL, 1.0))
            .collect()
    }
}

/// Splits a window into punctuation-trimmed tokens with their byte offsets.
/// Runs that are not valid UTF-8 are skipped.
fn tokens(window: &[u8]) -> impl Iterator<Item = (usize, &str)> {
    let mut start = 0;
    window
        .split(|b| b.is_ascii_whitespace())
        .filter_map(move |raw| {
            let raw_start = start;
            start += raw.len() + 1;
            let text = std::str::from_utf8(raw).ok()?;
            let trimmed_front = text.trim_start_matches(|c: char| c.is_punctuation());
            let offset = raw_start + (text.len() - trimmed_front.len());
            let token = trimmed_front.trim_end_matches(|c: char| c.is_punctuation());
            if token.is_empty() {
                None
            } else {
                Some((offset, token))
            }
        })
}
