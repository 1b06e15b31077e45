//! # Previously, on csvx...
//!
//! 🎬 The data was trapped. Someone had to move it. Someone had to be brave.
//! Someone had to write a backend so simple it lives entirely in RAM, gone the
//! moment you blink. That someone was this module.
//!
//! - [`InMemorySink`] is the sink for dry runs (count, don't send) and for tests
//!   (record every batch, optionally blow up on the Nth one on purpose).
//! - `InMemoryStore` is a key → bytes map that pretends to be a bucket. Tests only.
//!
//! ✅ No network calls. No disk I/O. Just vibes and heap memory. 🦆

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backends::{BulkIngest, IngestResult};
use crate::errors::{PipelineError, PipelineResult};
use crate::mapper::Document;

/// 📦 A sink that never forgets (when asked to remember).
///
/// 🔒 `Arc<Mutex<Vec<...>>>` so tests can keep a clone and peek inside after the
/// pipeline has taken ownership of the original.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemorySink {
    /// 🔒 Every batch received, in order. Stays empty for counting sinks.
    pub(crate) received: Arc<Mutex<Vec<Vec<Document>>>>,
    /// 🔢 Number of `submit` calls seen, failed ones included.
    pub(crate) submissions: Arc<Mutex<usize>>,
    retain: bool,
    // 💣 1-based submission number that fails with an injected transport fault
    fail_on_submission: Option<usize>,
}

impl InMemorySink {
    /// 🧪 Dry-run sink: counts documents, keeps none of them. A million rows, zero regret.
    pub(crate) fn counting() -> Self {
        Self::default()
    }

    /// 🧪 Test sink: keeps every batch for later inspection.
    #[cfg(test)]
    pub(crate) fn recording() -> Self {
        Self {
            retain: true,
            ..Self::default()
        }
    }

    /// 💣 Fail the `n`th submission (1-based) like a network that picked today to have a bad day.
    #[cfg(test)]
    pub(crate) fn failing_on(mut self, n: usize) -> Self {
        self.fail_on_submission = Some(n);
        self
    }

    /// 📏 Sizes of every batch received, in order. Test helper.
    #[cfg(test)]
    pub(crate) async fn batch_sizes(&self) -> Vec<usize> {
        self.received.lock().await.iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl BulkIngest for InMemorySink {
    async fn connect(&mut self) -> PipelineResult<()> {
        // ✅ the most reliable connection in the codebase
        debug!("🧪 in-memory sink connected (it was never not connected)");
        Ok(())
    }

    async fn submit(&mut self, batch: &[Document]) -> PipelineResult<IngestResult> {
        let the_submission = {
            let mut submissions = self.submissions.lock().await;
            *submissions += 1;
            *submissions
        };

        if self.fail_on_submission == Some(the_submission) {
            return Err(PipelineError::Ingest {
                index: batch.first().map(|doc| doc.index.clone()).unwrap_or_default(),
                source: format!("injected transport fault on submission {the_submission}").into(),
            });
        }

        if self.retain {
            self.received.lock().await.push(batch.to_vec());
        }

        Ok(IngestResult {
            indexed: batch.len(),
            rejected: 0,
        })
    }
}

#[cfg(test)]
pub(crate) use store::InMemoryStore;

#[cfg(test)]
mod store {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use crate::backends::{ObjectReader, ObjectStore, SourceObject, normalize_prefix};
    use crate::errors::{PipelineError, PipelineResult};

    /// 🪣 A bucket made of a `BTreeMap`. Lists in key order, like S3.
    #[derive(Debug, Default)]
    pub(crate) struct InMemoryStore {
        prefix: String,
        objects: BTreeMap<String, Vec<u8>>,
    }

    impl InMemoryStore {
        pub(crate) fn new(prefix: &str) -> Self {
            Self {
                prefix: normalize_prefix(prefix),
                objects: BTreeMap::new(),
            }
        }

        pub(crate) fn with_object(mut self, key: &str, contents: impl Into<Vec<u8>>) -> Self {
            self.objects.insert(key.to_string(), contents.into());
            self
        }
    }

    #[async_trait]
    impl ObjectStore for InMemoryStore {
        async fn list(&self) -> PipelineResult<Vec<SourceObject>> {
            Ok(self
                .objects
                .iter()
                .filter(|(key, _)| key.starts_with(&self.prefix) && !key.ends_with('/'))
                .map(|(key, bytes)| SourceObject {
                    key: key.clone(),
                    size: Some(bytes.len() as u64),
                })
                .collect())
        }

        async fn open(&self, object: &SourceObject) -> PipelineResult<ObjectReader> {
            let the_bytes = self
                .objects
                .get(&object.key)
                .cloned()
                .ok_or_else(|| PipelineError::StoreAccess {
                    location: format!("mem://{}", object.key),
                    source: "NoSuchKey".into(),
                })?;
            Ok(Box::new(std::io::Cursor::new(the_bytes)))
        }

        fn location(&self) -> String {
            format!("mem://{}", self.prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{ObjectStore, SourceObject};
    use serde_json::Map;

    fn doc(n: usize) -> Document {
        Document {
            index: "idx".to_string(),
            id: n.to_string(),
            source: Map::new(),
        }
    }

    #[tokio::test]
    async fn the_one_where_the_counting_sink_keeps_nothing_but_counts() -> PipelineResult<()> {
        let mut the_sink = InMemorySink::counting();

        let the_result = the_sink.submit(&[doc(1), doc(2), doc(3)]).await?;

        assert_eq!(the_result.indexed, 3);
        assert!(the_sink.received.lock().await.is_empty());
        assert_eq!(*the_sink.submissions.lock().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_second_submission_trips_the_wire() {
        let mut the_sink = InMemorySink::recording().failing_on(2);

        assert!(the_sink.submit(&[doc(1)]).await.is_ok());
        assert!(matches!(
            the_sink.submit(&[doc(2)]).await,
            Err(PipelineError::Ingest { .. })
        ));
        assert!(the_sink.submit(&[doc(3)]).await.is_ok());
        assert_eq!(the_sink.batch_sizes().await, vec![1, 1]);
    }

    #[tokio::test]
    async fn the_one_where_the_fake_bucket_respects_the_prefix() -> PipelineResult<()> {
        let the_store = InMemoryStore::new("exports")
            .with_object("exports/", "")
            .with_object("exports/b.csv", "id\n")
            .with_object("exports/a.csv", "id\n")
            .with_object("other/c.csv", "id\n");

        let the_keys: Vec<String> = the_store.list().await?.into_iter().map(|o| o.key).collect();

        assert_eq!(the_keys, vec!["exports/a.csv", "exports/b.csv"]);
        assert!(the_store.open(&SourceObject::new("exports/zzz.csv")).await.is_err());
        Ok(())
    }
}
