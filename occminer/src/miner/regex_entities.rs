use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::ffi::CStr;
use std::sync::Arc;

use super::{Candidate, Miner};

pub const REGEX_LABEL: &str = "Regex";
pub const EMAIL_LABEL: &str = "Email";
pub const URL_LABEL: &str = "URL";

const SIMPLE_PATTERN_THRESHOLD: usize = 32;

static PATTERN_CACHE: Lazy<DashMap<String, MatchStrategy>> = Lazy::new(DashMap::new);

static EMAIL_REGEX: Lazy<Arc<Regex>> = Lazy::new(|| {
    Arc::new(
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}")
            .expect("email pattern is valid"),
    )
});

static URL_REGEX: Lazy<Arc<Regex>> = Lazy::new(|| {
    Arc::new(
        Regex::new(r#"(?:https?|ftp)://[^\s<>"'()]+[^\s<>"'().,;:!?]"#)
            .expect("url pattern is valid"),
    )
});

/// Strategy for locating a pattern in a window
#[derive(Debug, Clone)]
pub enum MatchStrategy {
    Simple(Vec<u8>),
    Regex(Arc<Regex>),
}

/// Reports every leftmost-first, non-overlapping match of a pattern
#[derive(Debug, Clone)]
pub struct RegexMiner {
    strategy: MatchStrategy,
    label: String,
    probability: f64,
}

impl RegexMiner {
    /// Compiles `pattern`, reusing a previously compiled strategy when possible
    pub fn new(pattern: &str, label: impl Into<String>) -> Result<Self, String> {
        if pattern.is_empty() {
            return Err("regex pattern must not be empty".to_string());
        }
        let strategy = match PATTERN_CACHE.get(pattern) {
            Some(entry) => entry.clone(),
            None => {
                let strategy = if Self::is_simple_pattern(pattern) {
                    MatchStrategy::Simple(pattern.as_bytes().to_vec())
                } else {
                    let regex = Regex::new(pattern)
                        .map_err(|e| format!("invalid regex pattern {:?}: {}", pattern, e))?;
                    MatchStrategy::Regex(Arc::new(regex))
                };
                PATTERN_CACHE.insert(pattern.to_string(), strategy.clone());
                strategy
            }
        };
        Ok(Self {
            strategy,
            label: label.into(),
            probability: 1.0,
        })
    }

    fn fixed(regex: &Arc<Regex>, label: &str, probability: f64) -> Self {
        Self {
            strategy: MatchStrategy::Regex(Arc::clone(regex)),
            label: label.to_string(),
            probability,
        }
    }

    /// Determines if a pattern can use plain substring search
    fn is_simple_pattern(pattern: &str) -> bool {
        pattern.len() < SIMPLE_PATTERN_THRESHOLD
            && !pattern.contains(|c: char| c.is_ascii_punctuation() && c != '_' && c != '-')
    }

    /// Initialization entry exported as `match_regex`
    pub fn from_params(params: Option<&CStr>) -> Result<Box<dyn Miner>, String> {
        let params = params.ok_or_else(|| "match_regex requires a pattern".to_string())?;
        let pattern = params
            .to_str()
            .map_err(|e| format!("regex pattern is not valid UTF-8: {}", e))?;
        Ok(Box::new(Self::new(pattern, REGEX_LABEL)?))
    }

    /// Initialization entry exported as `match_email`
    pub fn email(_params: Option<&CStr>) -> Result<Box<dyn Miner>, String> {
        Ok(Box::new(Self::fixed(&EMAIL_REGEX, EMAIL_LABEL, 0.9)))
    }

    /// Initialization entry exported as `match_url`
    pub fn url(_params: Option<&CStr>) -> Result<Box<dyn Miner>, String> {
        Ok(Box::new(Self::fixed(&URL_REGEX, URL_LABEL, 0.9)))
    }
}

impl Miner for RegexMiner {
    fn scan(&self, window: &[u8]) -> Vec<Candidate> {
        let spans: Vec<(usize, usize)> = match &self.strategy {
            MatchStrategy::Simple(needle) => find_literal(window, needle),
            MatchStrategy::Regex(regex) => regex
                .find_iter(window)
                .filter(|m| !m.is_empty())
                .map(|m| (m.start(), m.len()))
                .collect(),
        };
        spans
            .into_iter()
            .map(|(start, len)| Candidate::new(start, len, self.label.as_str(), self.probability))
            .collect()
    }
}

fn find_literal(haystack: &[u8], needle: &[u8]) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut from = 0;
    while from + needle.len() <= haystack.len() {
        match haystack[from..]
            .windows(needle.len())
            .position(|w| w == needle)
        {
            Some(pos) => {
                found.push((from + pos, needle.len()));
                from += pos + needle.len();
            }
            None => break,
        }
    }
    found
}
