//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where CSV exports pile up in buckets nobody opens..."
//! 🎬 "One supervisor dared to index them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor drives the run: connect, list, and then for every object in
//! listing order pick the index, open the rows, map, batch, submit. One object is
//! fully drained before the next one is opened. Any error ends the run right there;
//! later objects are never touched and nothing already indexed is rolled back.
//!
//! 🧵 Pipelined mode puts a bounded channel and a single [`SinkWorker`] between the
//! batcher and the sink, so reading the next rows overlaps with the current bulk
//! request. One consumer means the batch order and the stop-at-first-failure rule
//! survive the trip.
//!
//! ⚠️ Workers are the supervisor's private little minions. They stay private.

mod workers;

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app_config::{RuntimeConfig, SchemaConfig};
use crate::backends::{BulkIngest, ObjectStore, SinkBackend, SourceObject, StoreBackend};
use crate::batcher::Batcher;
use crate::errors::{PipelineError, PipelineResult};
use crate::mapper::{Document, DocumentMapper};
use crate::progress::ProgressMetrics;
use crate::records::RecordSource;
use workers::{SinkWorker, Tally, Worker, submit_batch};

/// 📋 What happened to one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReport {
    pub key: String,
    pub index: String,
    /// 📏 Object size as listed, when the store reported one.
    pub bytes: Option<u64>,
    pub rows_read: u64,
    pub documents_indexed: u64,
    pub documents_rejected: u64,
    pub batches: u64,
}

/// 📋 The whole run, object by object, in the order they were processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub objects: Vec<ObjectReport>,
}

impl RunSummary {
    pub fn total_rows(&self) -> u64 {
        self.objects.iter().map(|report| report.rows_read).sum()
    }

    /// 🎯 The number everybody asks about at the end of a run.
    pub fn total_indexed(&self) -> u64 {
        self.objects.iter().map(|report| report.documents_indexed).sum()
    }

    pub fn total_rejected(&self) -> u64 {
        self.objects.iter().map(|report| report.documents_rejected).sum()
    }

    pub fn total_batches(&self) -> u64 {
        self.objects.iter().map(|report| report.batches).sum()
    }
}

/// 🏷️ Index name from an object key: last `/` segment, cut at the first `.`.
///
/// `exports/2024-01-01.csv` → `2024-01-01`. Also `a/b.tar.gz` → `b`, which is what
/// everybody's been getting for years, so here we are.
pub(crate) fn derive_index_name(key: &str) -> PipelineResult<String> {
    let the_file_name = key.rsplit('/').next().unwrap_or(key);
    let the_stem = the_file_name.split('.').next().unwrap_or(the_file_name);
    if the_stem.is_empty() {
        return Err(PipelineError::Config(format!(
            "cannot derive an index name from object key '{key}'"
        )));
    }
    Ok(the_stem.to_string())
}

/// 📦 The Supervisor: owns the store, shares the sink with its worker, and
/// asks "is it done yet?" after every batch.
#[derive(Debug)]
pub(crate) struct Supervisor {
    store: StoreBackend,
    /// 🔒 shared so a pipelined SinkWorker can hold a clone
    sink: Arc<Mutex<SinkBackend>>,
    schema: SchemaConfig,
    mapper: DocumentMapper,
    runtime: RuntimeConfig,
}

// 🚰 Where a full batch goes: straight to the sink, or into the worker's queue.
enum Outlet {
    Inline {
        tally: Tally,
        progress: ProgressMetrics,
    },
    Queued {
        tx: async_channel::Sender<Vec<Document>>,
        worker: JoinHandle<PipelineResult<Tally>>,
    },
}

impl Supervisor {
    pub(crate) fn new(
        store: StoreBackend,
        sink: SinkBackend,
        schema: SchemaConfig,
        runtime: RuntimeConfig,
    ) -> Self {
        Self {
            store,
            sink: Arc::new(Mutex::new(sink)),
            mapper: DocumentMapper::new(&schema),
            schema,
            runtime,
        }
    }

    /// 🚀 Connect, enumerate, drain every object, report.
    pub(crate) async fn run(&self) -> PipelineResult<RunSummary> {
        self.sink.lock().await.connect().await?;

        if self.schema.id_field.is_none() {
            warn!(
                "⚠️ no id_field configured: every row gets a fresh random id, so running this \
                 twice over the same objects indexes every row twice"
            );
        }

        let the_objects = self.store.list().await?;
        info!(
            "📋 {} objects under {}",
            the_objects.len(),
            self.store.location()
        );

        let mut the_summary = RunSummary::default();
        for object in &the_objects {
            let the_index = match &self.schema.index {
                Some(index) => index.clone(),
                None => derive_index_name(&object.key)?,
            };
            match object.size {
                Some(size) => info!(
                    "🪣 '{}' ({} bytes) → index '{}'",
                    object.key, size, the_index
                ),
                None => info!("🪣 '{}' → index '{}'", object.key, the_index),
            }

            let the_report = self.drain_object(object, &the_index).await?;
            info!(
                "✅ '{}': {} rows read, {} documents indexed in {} batches",
                the_report.key,
                the_report.rows_read,
                the_report.documents_indexed,
                the_report.batches
            );
            the_summary.objects.push(the_report);
        }

        info!(
            "🏁 done: {} documents indexed from {} objects",
            the_summary.total_indexed(),
            the_summary.objects.len()
        );
        Ok(the_summary)
    }

    async fn drain_object(
        &self,
        object: &SourceObject,
        index: &str,
    ) -> PipelineResult<ObjectReport> {
        let the_reader = self.store.open(object).await?;
        let mut the_rows = RecordSource::new(the_reader, &object.key).await?;
        let the_mapper = self.mapper.for_object(&object.key, the_rows.headers());
        let mut the_batcher = Batcher::new(self.runtime.batch_size);
        let the_progress = ProgressMetrics::new(object.key.clone(), self.runtime.show_progress);

        let mut the_outlet = if self.runtime.pipelined {
            let (tx, rx) = async_channel::bounded(self.runtime.queue_capacity);
            let the_worker = SinkWorker::new(rx, Arc::clone(&self.sink), the_progress).start();
            Outlet::Queued {
                tx,
                worker: the_worker,
            }
        } else {
            Outlet::Inline {
                tally: Tally::default(),
                progress: the_progress,
            }
        };

        let the_feed = async {
            while let Some(row) = the_rows.next_record().await? {
                let the_document = the_mapper.map(&row, index)?;
                if let Some(batch) = the_batcher.accumulate(the_document) {
                    self.dispatch(&mut the_outlet, batch, index).await?;
                }
            }
            let the_tail = the_batcher.flush();
            if !the_tail.is_empty() {
                self.dispatch(&mut the_outlet, the_tail, index).await?;
            }
            Ok::<(), PipelineError>(())
        }
        .await;

        let the_tally = Self::settle(the_outlet, the_feed, index).await?;

        Ok(ObjectReport {
            key: object.key.clone(),
            index: index.to_string(),
            bytes: object.size,
            rows_read: the_rows.rows_read(),
            documents_indexed: the_tally.documents_indexed,
            documents_rejected: the_tally.documents_rejected,
            batches: the_tally.batches,
        })
    }

    async fn dispatch(
        &self,
        outlet: &mut Outlet,
        batch: Vec<Document>,
        index: &str,
    ) -> PipelineResult<()> {
        match outlet {
            Outlet::Inline { tally, progress } => {
                submit_batch(&self.sink, &batch, tally, progress).await
            }
            Outlet::Queued { tx, .. } => {
                debug!("📬 queueing batch of {} documents", batch.len());
                // 💀 closed channel = the worker already gave up; settle() reports its error
                tx.send(batch).await.map_err(|_| PipelineError::Ingest {
                    index: index.to_string(),
                    source: "sink worker stopped before the batch could be queued".into(),
                })
            }
        }
    }

    /// 🏁 Wrap up one object. For a queued outlet: hang up, wait for the worker to drain,
    /// and if both sides failed, the worker's error wins (it happened to an earlier batch).
    async fn settle(
        outlet: Outlet,
        feed: PipelineResult<()>,
        index: &str,
    ) -> PipelineResult<Tally> {
        match outlet {
            Outlet::Inline { tally, progress } => {
                progress.finish();
                feed.map(|_| tally)
            }
            Outlet::Queued { tx, worker } => {
                drop(tx);
                let the_worker_result = worker.await.map_err(|err| PipelineError::Ingest {
                    index: index.to_string(),
                    source: Box::new(err),
                })?;
                match (feed, the_worker_result) {
                    (_, Err(worker_err)) => Err(worker_err),
                    (Err(feed_err), Ok(_)) => Err(feed_err),
                    (Ok(()), Ok(tally)) => Ok(tally),
                }
            }
        }
    }
}
