//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Object stores pour the bytes, bulk sinks slurp the documents.
//! And in between, we panic! (kidding, we return `PipelineError`)
//!
//! 🎭 This module is the casting agency. Need rows from S3? From a local directory?
//! From a byte vector a test made up five lines ago? We've got a store for that.
//! Need documents in Elasticsearch, or just counted in a dry run? Sink for that too.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → `*Backend` enum that dispatches
//! - `ObjectStore`: `list()` the objects under the prefix, `open()` one as an `AsyncRead`
//! - `BulkIngest`: `connect()` once at startup, `submit()` one batch per round trip
//! - Configs are co-located with the backend that reads them and re-exported here
//!
//! 🦆 The duck is here because every file must have one. This is law.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::app_config::{RuntimeConfig, StoreConfig};
use crate::errors::PipelineResult;
use crate::mapper::Document;

pub(crate) mod elasticsearch;
pub(crate) mod file;
pub(crate) mod in_mem;
pub(crate) mod s3;

pub use elasticsearch::ElasticsearchSinkConfig;
pub use file::FileStoreConfig;
pub use s3::S3StoreConfig;

/// 🧠 Boxed async reader: whatever the store hands back, type-erased so the pipeline
/// doesn't have to care whether it's an S3 body or a file handle.
pub(crate) type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// 🗝️ One object in the store: its key, and its size when the store bothered to tell us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObject {
    pub key: String,
    pub size: Option<u64>,
}

impl SourceObject {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
        }
    }
}

/// ✅ What one bulk round trip achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestResult {
    /// 🎯 Documents the engine accepted.
    pub indexed: usize,
    /// 🗑️ Documents the engine refused but we were told to tolerate.
    pub rejected: usize,
}

/// 📐 Normalize a key prefix so it always ends with `/`. An empty prefix stays empty
/// and means "the whole bucket"; `/` on its own would match nothing in S3.
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

// ===== Object Store Trait and Backend Enum =====

/// 🪣 Something that holds objects and can hand them out as byte streams.
///
/// # Contract
/// - `list` returns every object under the configured prefix, in a stable order,
///   directory markers excluded. Listing failures are `StoreAccess`.
/// - `open` returns a fresh, forward-only reader. Fetch failures are `StoreAccess`.
#[async_trait]
pub(crate) trait ObjectStore: std::fmt::Debug + Send + Sync {
    /// 📋 Every object under the prefix.
    async fn list(&self) -> PipelineResult<Vec<SourceObject>>;
    /// 📖 Stream one object's bytes.
    async fn open(&self, object: &SourceObject) -> PipelineResult<ObjectReader>;
    /// 🏷️ Human-friendly location for logs: `s3://bucket/prefix/` and friends.
    fn location(&self) -> String;
}

/// 🎭 The many faces of an object store.
#[derive(Debug)]
pub(crate) enum StoreBackend {
    S3(s3::S3Store),
    File(file::FileStore),
    #[cfg(test)]
    InMemory(in_mem::InMemoryStore),
}

impl StoreBackend {
    /// 🏗️ Build the store the config asked for.
    pub(crate) async fn from_config(config: StoreConfig) -> PipelineResult<Self> {
        Ok(match config {
            StoreConfig::S3(s3_config) => StoreBackend::S3(s3::S3Store::new(s3_config).await),
            StoreConfig::File(file_config) => StoreBackend::File(file::FileStore::new(file_config)),
        })
    }
}

#[async_trait]
impl ObjectStore for StoreBackend {
    async fn list(&self) -> PipelineResult<Vec<SourceObject>> {
        match self {
            StoreBackend::S3(store) => store.list().await,
            StoreBackend::File(store) => store.list().await,
            #[cfg(test)]
            StoreBackend::InMemory(store) => store.list().await,
        }
    }

    async fn open(&self, object: &SourceObject) -> PipelineResult<ObjectReader> {
        match self {
            StoreBackend::S3(store) => store.open(object).await,
            StoreBackend::File(store) => store.open(object).await,
            #[cfg(test)]
            StoreBackend::InMemory(store) => store.open(object).await,
        }
    }

    fn location(&self) -> String {
        match self {
            StoreBackend::S3(store) => store.location(),
            StoreBackend::File(store) => store.location(),
            #[cfg(test)]
            StoreBackend::InMemory(store) => store.location(),
        }
    }
}

// ===== Bulk Ingest Trait and Backend Enum =====

/// 🕳️ A destination that takes documents a batch at a time.
///
/// # Contract
/// - `connect` is called once before the first `submit`. Failure is `Connection`.
/// - `submit` sends the whole batch in one round trip, no retries. Failure is `Ingest`
///   and ends the run.
#[async_trait]
pub(crate) trait BulkIngest: std::fmt::Debug + Send {
    /// 📡 Say hello to the engine. Fail now rather than 50,000 rows in.
    async fn connect(&mut self) -> PipelineResult<()>;
    /// 📥 Ship one batch.
    async fn submit(&mut self, batch: &[Document]) -> PipelineResult<IngestResult>;
}

/// 🎭 The many faces of a sink. Mirrors `StoreBackend` on the other end of the pipe.
#[derive(Debug)]
pub(crate) enum SinkBackend {
    Elasticsearch(elasticsearch::ElasticsearchSink),
    InMemory(in_mem::InMemorySink),
}

impl SinkBackend {
    /// 🏗️ Elasticsearch for real runs, a counting in-memory sink for dry runs.
    pub(crate) fn from_config(
        config: ElasticsearchSinkConfig,
        runtime: &RuntimeConfig,
    ) -> PipelineResult<Self> {
        if runtime.dry_run {
            Ok(SinkBackend::InMemory(in_mem::InMemorySink::counting()))
        } else {
            Ok(SinkBackend::Elasticsearch(
                elasticsearch::ElasticsearchSink::new(config)?,
            ))
        }
    }
}

#[async_trait]
impl BulkIngest for SinkBackend {
    async fn connect(&mut self) -> PipelineResult<()> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.connect().await,
            SinkBackend::InMemory(sink) => sink.connect().await,
        }
    }

    async fn submit(&mut self, batch: &[Document]) -> PipelineResult<IngestResult> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.submit(batch).await,
            SinkBackend::InMemory(sink) => sink.submit(batch).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_every_prefix_gets_its_trailing_slash() {
        assert_eq!(normalize_prefix("exports"), "exports/");
        assert_eq!(normalize_prefix("exports/"), "exports/");
        assert_eq!(normalize_prefix("a/b"), "a/b/");
        assert_eq!(normalize_prefix(""), "");
    }
}
