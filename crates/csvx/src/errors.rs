//! 💀 Errors: the five ways a bulk load can die, plus one for bad config.
//!
//! 🎬 *[a row goes missing. a bucket says 403. a cluster says nothing at all.]*
//!
//! Every failure in the pipeline is fatal to the run. Nothing here is retried,
//! nothing is swallowed, and every variant knows which exit code it deserves.
//! The CLI walks the `source()` chain and prints it, so the variants carry the
//! underlying cause instead of flattening it into a string. 🦆

use thiserror::Error;

/// 📦 The boxed cause every variant drags along. Send + Sync so it survives a trip
/// through a worker's `JoinHandle`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 🎯 Shorthand, because typing the whole thing fourteen times per file is how tendinitis starts.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// 💀 Everything that can abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 🔧 The config parsed but makes no sense (two stores, zero stores, an index we can't name).
    #[error("💀 configuration problem: {0}")]
    Config(String),

    /// 📡 Could not reach or authenticate to the search engine.
    #[error("💀 could not establish a connection to the search engine at '{url}'")]
    Connection {
        url: String,
        #[source]
        source: BoxError,
    },

    /// 🪣 Listing the bucket or fetching an object failed.
    #[error("💀 object store access failed for '{location}'")]
    StoreAccess {
        location: String,
        #[source]
        source: BoxError,
    },

    /// 📄 The object is not valid UTF-8 delimited text.
    #[error("💀 could not decode rows of '{key}'")]
    Decode {
        key: String,
        #[source]
        source: BoxError,
    },

    /// 🕳️ A configured column is not present in a row.
    #[error("💀 field '{field}' is missing from row {row} of '{key}'")]
    MissingField { key: String, field: String, row: u64 },

    /// 🚰 The bulk submission failed in transport or was rejected by the engine.
    #[error("💀 bulk submission into index '{index}' failed")]
    Ingest {
        index: String,
        #[source]
        source: BoxError,
    },
}

impl PipelineError {
    /// 🚪 Process exit code for this failure. Zero is reserved for the happy path.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 1,
            PipelineError::Connection { .. } => 2,
            PipelineError::StoreAccess { .. } => 3,
            PipelineError::Decode { .. } => 4,
            PipelineError::MissingField { .. } => 5,
            PipelineError::Ingest { .. } => 6,
        }
    }
}
