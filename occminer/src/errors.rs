/// Error types for occminer.
///
/// Every fallible operation on a [`Stream`](crate::stream::Stream), the
/// [`MinerRegistry`](crate::miner::MinerRegistry) or the
/// [`Extractor`](crate::extractor::Extractor) returns an [`ExtractResult`].
/// Callers usually only care about the category of failure:
///
/// ```rust,ignore
/// match extractor.add_miner_from_module(path, "match_glob", Some(b"world")) {
///     Ok(()) => {}
///     Err(ExtractError::Load { .. }) => // module missing,
///     Err(ExtractError::Symbol { .. }) => // module present, entry point missing,
///     Err(e) => // anything else
/// }
/// ```
///
/// Reading past the end of an occurrence cursor is not represented here: it is a
/// programming error and panics.
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for extraction operations
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Errors that can occur while configuring or running an extractor
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Resource error: {0}")]
    Resource(String),
    #[error("Unable to load miner module {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("Symbol {symbol} not found in miner module {path}")]
    Symbol { path: PathBuf, symbol: String },
    #[error("Stream state error: {0}")]
    StreamState(String),
    #[error("Miner {symbol} did not finish within {}", format_timeout(.timeout))]
    MinerTimeout { symbol: String, timeout: Duration },
    #[error("Miner {symbol} failed: {message}")]
    MinerFault { symbol: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_timeout(timeout: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*timeout)
}

impl ExtractError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn symbol(path: impl Into<PathBuf>, symbol: impl Into<String>) -> Self {
        Self::Symbol {
            path: path.into(),
            symbol: symbol.into(),
        }
    }

    pub fn stream_state(msg: impl Into<String>) -> Self {
        Self::StreamState(msg.into())
    }

    pub fn miner_timeout(symbol: impl Into<String>, timeout: Duration) -> Self {
        Self::MinerTimeout {
            symbol: symbol.into(),
            timeout,
        }
    }

    pub fn miner_fault(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MinerFault {
            symbol: symbol.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ExtractError::config("bad flags");
        assert!(matches!(err, ExtractError::Config(_)));

        let err = ExtractError::resource("buffer is empty");
        assert!(matches!(err, ExtractError::Resource(_)));

        let err = ExtractError::load("miners/nope.so", "not registered");
        assert!(matches!(err, ExtractError::Load { .. }));

        let err = ExtractError::symbol("miners/glob_entities.so", "match_nothing");
        assert!(matches!(err, ExtractError::Symbol { .. }));

        let err = ExtractError::stream_state("no stream attached");
        assert!(matches!(err, ExtractError::StreamState(_)));

        let err = ExtractError::miner_timeout("match_glob", Duration::from_millis(5));
        assert!(matches!(err, ExtractError::MinerTimeout { .. }));
    }

    #[test]
    fn test_error_messages() {
        let err = ExtractError::symbol("miners/glob_entities.so", "match_glob_hhh");
        assert_eq!(
            err.to_string(),
            "Symbol match_glob_hhh not found in miner module miners/glob_entities.so"
        );

        let err = ExtractError::load("miners/x.so", "no such module");
        assert_eq!(
            err.to_string(),
            "Unable to load miner module miners/x.so: no such module"
        );

        let err = ExtractError::miner_timeout("match_url", Duration::from_millis(250));
        assert_eq!(err.to_string(), "Miner match_url did not finish within 250ms");

        let err = ExtractError::config("unknown flag bits 0x4");
        assert_eq!(err.to_string(), "Configuration error: unknown flag bits 0x4");
    }
}
