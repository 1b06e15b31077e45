//! 📡 Elasticsearch Sink: one batch in, one `_bulk` POST out.
//!
//! 🎬 *[the NDJSON is rendered. the auth header is set. the cluster is... probably up.]*
//!
//! 🧠 Knowledge graph:
//! - `connect()`: GET on the cluster root with the configured auth. A handshake. A hello.
//!   An "are you even there?" If not, `Connection` error, and we never list a single object.
//! - `submit()`: renders the batch as bulk NDJSON (action line + source line per doc,
//!   trailing newline), POSTs it, and counts the items that came back 2xx.
//! - Per-item failures fail the batch by default (`fail_on_item_errors`), the same way
//!   the classic bulk helpers raise on the first bad row. Turn it off and they become
//!   a `warn!` and a `rejected` count instead.
//! - No retries. Retries are the caller's problem, and the caller has decided they're nobody's.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::backends::{BulkIngest, IngestResult};
use crate::errors::{PipelineError, PipelineResult};
use crate::mapper::Document;

/// 🔧 Where and how to reach the cluster.
///
/// `url`, `port`, `username`, `password` keep the names the legacy settings file used.
/// A `url` without a scheme gets `scheme://url:port`; a `url` with one is used as-is.
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchSinkConfig {
    /// 📡 Host name, or a full URL if you already know what you want.
    pub url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 🔒 `https` unless you like living dangerously.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// 🔒 Username. The bouncer at the club. Except the club is a database.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. "password123" is not a password. It is a confession.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key. Wins over basic auth when both are set.
    #[serde(default)]
    pub api_key: Option<String>,
    /// 💀 Treat any rejected item in a bulk response as fatal.
    #[serde(default = "default_fail_on_item_errors")]
    pub fail_on_item_errors: bool,
    /// 🔄 Optional `refresh` parameter for `_bulk` (`true`, `false`, `wait_for`).
    #[serde(default)]
    pub refresh: Option<String>,
    /// ⏱️ Per-request timeout. Bulk requests can be meaty; we're not monsters.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_port() -> u16 {
    9200
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_fail_on_item_errors() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl ElasticsearchSinkConfig {
    /// 📡 The cluster's base URL, no trailing slash.
    pub fn base_url(&self) -> String {
        let the_url = self.url.trim_end_matches('/');
        if the_url.contains("://") {
            the_url.to_string()
        } else {
            format!("{}://{}:{}", self.scheme, the_url, self.port)
        }
    }
}

// 📜 Just enough of the `_bulk` response to count winners and name losers.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<std::collections::HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// 📡 The HTTP side of the pipeline. Holds one `reqwest::Client` for the whole run.
#[derive(Debug)]
pub(crate) struct ElasticsearchSink {
    client: reqwest::Client,
    sink_config: ElasticsearchSinkConfig,
    base_url: String,
}

impl ElasticsearchSink {
    /// 🚀 Build the client. No network yet; that's `connect()`'s job.
    pub(crate) fn new(config: ElasticsearchSinkConfig) -> PipelineResult<Self> {
        let base_url = config.base_url();
        // 🔧 10s to handshake, then the configured budget for the whole request
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| PipelineError::Connection {
                url: base_url.clone(),
                source: Box::new(err),
            })?;

        Ok(Self {
            client,
            sink_config: config,
            base_url,
        })
    }

    // 🔒 api_key beats basic auth in this club
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.sink_config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.sink_config.username {
            request.basic_auth(username, self.sink_config.password.as_ref())
        } else {
            request
        }
    }

    fn bulk_url(&self) -> String {
        match &self.sink_config.refresh {
            Some(refresh) => format!("{}/_bulk?refresh={}", self.base_url, refresh),
            None => format!("{}/_bulk", self.base_url),
        }
    }
}

/// 📦 Render a batch as a `_bulk` body: `{"index":{"_index":..,"_id":..}}\n{source}\n` per doc.
pub(crate) fn render_bulk_body(batch: &[Document]) -> PipelineResult<String> {
    let mut the_body = String::with_capacity(batch.len() * 128);
    for doc in batch {
        let the_action = json!({ "index": { "_index": doc.index, "_id": doc.id } });
        the_body.push_str(&the_action.to_string());
        the_body.push('\n');
        let the_source = serde_json::to_string(&doc.source).map_err(|err| PipelineError::Ingest {
            index: doc.index.clone(),
            source: Box::new(err),
        })?;
        the_body.push_str(&the_source);
        // ⚠️ the trailing newline is mandatory, ES rejects the body without it
        the_body.push('\n');
    }
    Ok(the_body)
}

#[async_trait]
impl BulkIngest for ElasticsearchSink {
    async fn connect(&mut self) -> PipelineResult<()> {
        let connection_error = |source: crate::errors::BoxError| PipelineError::Connection {
            url: self.base_url.clone(),
            source,
        };

        let the_response = self
            .authorize(self.client.get(&self.base_url))
            .send()
            .await
            .map_err(|err| connection_error(Box::new(err)))?;

        let the_status = the_response.status();
        if !the_status.is_success() {
            let the_body = the_response.text().await.unwrap_or_default();
            return Err(connection_error(
                format!("cluster answered {}: {}", the_status, the_body).into(),
            ));
        }

        debug!("✅ connected to {}, the cluster is home", self.base_url);
        Ok(())
    }

    async fn submit(&mut self, batch: &[Document]) -> PipelineResult<IngestResult> {
        let the_index = batch.first().map(|doc| doc.index.clone()).unwrap_or_default();
        let ingest_error = |source: crate::errors::BoxError| PipelineError::Ingest {
            index: the_index.clone(),
            source,
        };

        let the_body = render_bulk_body(batch)?;
        trace!("📡 POSTing {} bytes of NDJSON to _bulk", the_body.len());

        let the_response = self
            .authorize(self.client.post(self.bulk_url()))
            // ⚠️ application/x-ndjson, not application/json. ES has opinions.
            .header("Content-Type", "application/x-ndjson")
            .body(the_body)
            .send()
            .await
            .map_err(|err| ingest_error(Box::new(err)))?;

        let the_status = the_response.status();
        let the_text = the_response
            .text()
            .await
            .map_err(|err| ingest_error(Box::new(err)))?;

        if !the_status.is_success() {
            return Err(ingest_error(
                format!("bulk request answered {}: {}", the_status, the_text).into(),
            ));
        }

        let the_bulk: BulkResponse =
            serde_json::from_str(&the_text).map_err(|err| ingest_error(Box::new(err)))?;

        let mut the_result = IngestResult::default();
        let mut the_first_error: Option<String> = None;
        for item in the_bulk.items.iter().flat_map(|item| item.values()) {
            if (200..300).contains(&item.status) {
                the_result.indexed += 1;
            } else {
                the_result.rejected += 1;
                if the_first_error.is_none() {
                    the_first_error = Some(
                        item.error
                            .as_ref()
                            .map(Value::to_string)
                            .unwrap_or_else(|| format!("status {}", item.status)),
                    );
                }
            }
        }

        if the_bulk.errors || the_result.rejected > 0 {
            let the_reason =
                the_first_error.unwrap_or_else(|| "unspecified item error".to_string());
            if self.sink_config.fail_on_item_errors {
                return Err(ingest_error(
                    format!(
                        "{} of {} documents were rejected; first error: {}",
                        the_result.rejected,
                        batch.len(),
                        the_reason
                    )
                    .into(),
                ));
            }
            warn!(
                "⚠️ {} of {} documents rejected by '{}', carrying on; first error: {}",
                the_result.rejected,
                batch.len(),
                the_index,
                the_reason
            );
        }

        if the_result.indexed + the_result.rejected != batch.len() {
            warn!(
                "⚠️ sent {} documents but the bulk response accounted for {}",
                batch.len(),
                the_result.indexed + the_result.rejected
            );
        }

        Ok(the_result)
    }
}
