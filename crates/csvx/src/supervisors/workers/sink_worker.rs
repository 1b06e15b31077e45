//! 🎬 *[a channel fills with batches. somewhere, a sink waits.]*
//! *[the clock on the wall reads 2:47am.]*
//!
//! 🗑️ The SinkWorker: patient, tireless, deeply unbothered by the chaos upstream.
//! It receives batches. It submits batches. In the order they arrived, one at a time,
//! and on the first failure it stops and walks off the job. Dropping the receiver on
//! the way out closes the channel, which is how the feeder finds out. 🦆

use std::sync::Arc;

use async_channel::Receiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{Tally, Worker, submit_batch};
use crate::backends::SinkBackend;
use crate::errors::PipelineResult;
use crate::mapper::Document;
use crate::progress::ProgressMetrics;

/// 🗑️ Drains one object's batch channel into the sink.
#[derive(Debug)]
pub(crate) struct SinkWorker {
    rx: Receiver<Vec<Document>>,
    sink: Arc<Mutex<SinkBackend>>,
    progress: ProgressMetrics,
}

impl SinkWorker {
    /// 🏗️ Hand it a receiver (the firehose), a sink (the drain), and a progress bar
    /// to narrate with. It does not judge.
    pub(crate) fn new(
        rx: Receiver<Vec<Document>>,
        sink: Arc<Mutex<SinkBackend>>,
        progress: ProgressMetrics,
    ) -> Self {
        Self { rx, sink, progress }
    }
}

impl Worker for SinkWorker {
    type Output = Tally;

    fn start(mut self) -> JoinHandle<PipelineResult<Tally>> {
        tokio::spawn(async move {
            debug!("📥 SinkWorker started draining channel...");
            let mut the_tally = Tally::default();
            // 🔄 recv() errors only once the channel is empty and closed
            while let Ok(batch) = self.rx.recv().await {
                debug!("🪣 SinkWorker received batch of {} documents", batch.len());
                if let Err(err) =
                    submit_batch(&self.sink, &batch, &mut the_tally, &mut self.progress).await
                {
                    self.rx.close();
                    self.progress.finish();
                    return Err(err);
                }
            }
            debug!("🏁 SinkWorker: channel closed. Shutting down.");
            self.progress.finish();
            Ok(the_tally)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::InMemorySink;
    use crate::errors::PipelineError;
    use serde_json::Map;

    fn batch(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document {
                index: "idx".to_string(),
                id: i.to_string(),
                source: Map::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn the_one_where_batches_come_out_in_the_order_they_went_in() -> PipelineResult<()> {
        let the_recorder = InMemorySink::recording();
        let the_sink = Arc::new(Mutex::new(SinkBackend::InMemory(the_recorder.clone())));
        let (tx, rx) = async_channel::bounded(2);
        let the_handle =
            SinkWorker::new(rx, the_sink, ProgressMetrics::new("idx".to_string(), false)).start();

        for size in [3, 1, 2] {
            tx.send(batch(size)).await.expect("💀 worker hung up early");
        }
        drop(tx);

        let the_tally = the_handle.await.expect("💀 worker panicked")?;
        assert_eq!(the_tally.batches, 3);
        assert_eq!(the_tally.documents_indexed, 6);
        assert_eq!(the_recorder.batch_sizes().await, vec![3, 1, 2]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_worker_quits_and_the_channel_slams_shut() {
        let the_recorder = InMemorySink::recording().failing_on(1);
        let the_sink = Arc::new(Mutex::new(SinkBackend::InMemory(the_recorder.clone())));
        let (tx, rx) = async_channel::bounded(1);
        let the_handle =
            SinkWorker::new(rx, the_sink, ProgressMetrics::new("idx".to_string(), false)).start();

        tx.send(batch(1)).await.expect("💀 first send should land");
        let the_result = the_handle.await.expect("💀 worker panicked");

        assert!(matches!(the_result, Err(PipelineError::Ingest { .. })));
        assert!(tx.send(batch(1)).await.is_err());
        assert!(the_recorder.batch_sizes().await.is_empty());
    }
}
