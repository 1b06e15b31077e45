//! 🚀 csvx: delimited-text objects in a bucket, documents in a search index.
//!
//! 🎬 *[a bucket of CSV exports. a cluster with no data. one run to join them.]*
//!
//! List the objects under a prefix, read each one row by row, keep the configured
//! columns, batch them, and ship every batch to Elasticsearch's `_bulk` endpoint.
//! First failure ends the run. 🦆

pub mod app_config;
pub mod batcher;
pub mod errors;
pub mod mapper;
pub mod records;

pub(crate) mod backends;
pub(crate) mod progress;
pub(crate) mod supervisors;

pub use app_config::{AppConfig, RuntimeConfig, SchemaConfig};
pub use backends::{ElasticsearchSinkConfig, FileStoreConfig, S3StoreConfig};
pub use errors::{PipelineError, PipelineResult};
pub use progress::{format_duration, format_number};
pub use supervisors::{ObjectReport, RunSummary};

use tracing::info;

use crate::backends::{SinkBackend, StoreBackend};
use crate::supervisors::Supervisor;

/// 🚀 Build the store and the sink from config, then drain every object into the index.
pub async fn run(app_config: AppConfig, schema: SchemaConfig) -> PipelineResult<RunSummary> {
    let the_store_config = app_config.store_config()?;
    let the_store = StoreBackend::from_config(the_store_config).await?;
    let the_sink = SinkBackend::from_config(app_config.elasticsearch, &app_config.runtime)?;

    if app_config.runtime.dry_run {
        info!("🧪 dry run: documents are mapped and batched, then counted and dropped");
    }

    Supervisor::new(the_store, the_sink, schema, app_config.runtime)
        .run()
        .await
}
