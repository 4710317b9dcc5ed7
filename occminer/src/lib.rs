pub mod config;
pub mod errors;
pub mod extractor;
pub mod flags;
pub mod metrics;
pub mod miner;
pub mod occurrence;
pub mod stream;

pub use config::{ExtractorConfig, MinerSpec};
pub use errors::{ExtractError, ExtractResult};
pub use extractor::Extractor;
pub use flags::{E_NO_ENCLOSED_OCCURRENCES, E_SORT_RESULTS};
pub use metrics::{ExtractionMetrics, ExtractionStats};
pub use miner::{BuiltinLoader, Candidate, Miner, MinerMeta, MinerModule, MinerSymbol, ModuleLoader};
pub use occurrence::{Occurrence, OccurrenceBatch, OccurrenceCursor};
pub use stream::{BatchUnit, Stream, StreamState};
