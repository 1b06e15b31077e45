//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all
//! the credit in the sprint retro.
//!
//! 🚀 There is exactly one kind right now, the [`SinkWorker`], and it only exists
//! when the run is pipelined. The sequential path calls [`submit_batch`] inline and
//! skips the task entirely. Same helper either way, so a batch is counted, logged and
//! reported the same no matter who shipped it. 🦆

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::backends::{BulkIngest, IngestResult, SinkBackend};
use crate::errors::PipelineResult;
use crate::mapper::Document;
use crate::progress::ProgressMetrics;

mod sink_worker;
pub(super) use sink_worker::SinkWorker;

/// 🏗️ A background worker, that does work. duh.
///
/// `start(self)` consumes the worker and hands back the only thing anyone
/// ever wanted from it: a handle to await.
pub(super) trait Worker {
    type Output;

    /// 🚀 Spawn it. Trust, but `.await` the handle.
    fn start(self) -> JoinHandle<PipelineResult<Self::Output>>;
}

/// 🔢 Running totals for one object's submissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Tally {
    pub(crate) documents_indexed: u64,
    pub(crate) documents_rejected: u64,
    pub(crate) batches: u64,
}

impl Tally {
    fn record(&mut self, result: IngestResult) {
        self.documents_indexed += result.indexed as u64;
        self.documents_rejected += result.rejected as u64;
        self.batches += 1;
    }
}

/// 📥 Ship one batch through the shared sink and book the outcome.
///
/// The lock is held for the whole round trip. One submission at a time, in order,
/// is the whole point.
pub(super) async fn submit_batch(
    sink: &Arc<Mutex<SinkBackend>>,
    batch: &[Document],
    tally: &mut Tally,
    progress: &mut ProgressMetrics,
) -> PipelineResult<()> {
    let the_result = sink.lock().await.submit(batch).await?;
    tally.record(the_result);
    progress.update(the_result.indexed as u64, 1);
    info!(
        "📦 batch {} submitted: {} indexed, {} rejected",
        tally.batches, the_result.indexed, the_result.rejected
    );
    Ok(())
}
