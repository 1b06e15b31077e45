//! 🔧 App Configuration: the sacred JSON-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! Two documents get loaded at startup:
//! - the connection settings (`config.json`): where the bucket is, where the cluster is,
//!   and a handful of runtime knobs.
//! - the schema (`metadata.json`): which index, which columns, which column is the id.
//!
//! Both are read through Figment. JSON by default, TOML if the file ends in `.toml`,
//! because some of us have opinions about trailing commas.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Json, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{ElasticsearchSinkConfig, FileStoreConfig, S3StoreConfig};
use crate::errors::{PipelineError, PipelineResult};

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
///
/// Exactly one of `s3` or `file` must be present. The `elasticsearch` section is
/// named after the legacy settings file so old configs keep working.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🪣 Read objects from an S3 bucket.
    #[serde(default)]
    pub s3: Option<S3StoreConfig>,
    /// 📁 Read objects from a local directory that pretends to be a bucket.
    #[serde(default)]
    pub file: Option<FileStoreConfig>,
    /// 📡 Where the documents go.
    pub elasticsearch: ElasticsearchSinkConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🎭 The resolved store choice, after we've made sure the user picked exactly one.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    S3(S3StoreConfig),
    File(FileStoreConfig),
}

impl AppConfig {
    /// 🎯 Pick the configured object store. Zero or two is a config error, not a coin toss.
    pub fn store_config(&self) -> PipelineResult<StoreConfig> {
        match (&self.s3, &self.file) {
            (Some(s3), None) => Ok(StoreConfig::S3(s3.clone())),
            (None, Some(file)) => Ok(StoreConfig::File(file.clone())),
            (None, None) => Err(PipelineError::Config(
                "no object store configured; add an `s3` or a `file` section".to_string(),
            )),
            (Some(_), Some(_)) => Err(PipelineError::Config(
                "both `s3` and `file` stores are configured; pick one".to_string(),
            )),
        }
    }
}

/// 🧵 Knobs for how the pipeline runs, as opposed to where it reads and writes.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 📦 Documents per bulk request. The last batch of an object may be smaller.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 🔀 Overlap row reading with bulk submission through a bounded queue.
    /// Still one object at a time, still one submission at a time.
    #[serde(default)]
    pub pipelined: bool,
    /// 📬 How many full batches may wait in the queue when `pipelined` is on.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// 📊 Draw the per-object progress spinner.
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
    /// 🧪 Map and batch everything but send nothing. The sink only counts.
    #[serde(default)]
    pub dry_run: bool,
}

// 📦 1000 docs per bulk request, same as it ever was.
fn default_batch_size() -> usize {
    1000
}

fn default_queue_capacity() -> usize {
    10
}

fn default_show_progress() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            pipelined: false,
            queue_capacity: default_queue_capacity(),
            show_progress: default_show_progress(),
            dry_run: false,
        }
    }
}

/// 📐 The schema: which index, which columns, and where ids come from.
///
/// Loaded once, shared read-only by every object in the run.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaConfig {
    /// 🏷️ Fixed destination index. `None` means "name it after each object's file".
    pub index: Option<String>,
    /// 📋 Columns to copy into each document, in order.
    pub fields: Vec<String>,
    /// 🔑 Column whose value becomes the document id. `None` means "make one up".
    pub id_field: Option<String>,
}

// 📜 The on-disk shape of the schema document. Kept private; the rest of the crate
// only ever sees the flattened `SchemaConfig`.
#[derive(Debug, Deserialize)]
struct SchemaDocument {
    index: IndexSection,
    data: DataSection,
}

#[derive(Debug, Deserialize)]
struct IndexSection {
    #[serde(default)]
    es_index_name: Option<String>,
    #[serde(default)]
    es_index_as_filename: bool,
}

#[derive(Debug, Deserialize)]
struct DataSection {
    headers: Vec<String>,
    #[serde(default)]
    id_field: Option<String>,
}

impl TryFrom<SchemaDocument> for SchemaConfig {
    type Error = anyhow::Error;

    fn try_from(document: SchemaDocument) -> anyhow::Result<Self> {
        let index = if document.index.es_index_as_filename {
            None
        } else {
            match document.index.es_index_name {
                Some(name) if !name.trim().is_empty() => Some(name),
                _ => anyhow::bail!(
                    "💀 The schema says not to derive the index from the filename, but gives no \
                     `index.es_index_name` either. We need one or the other. Pick a lane."
                ),
            }
        };

        // 🔑 An empty id_field is how the old metadata files said "auto-generate".
        let id_field = document
            .data
            .id_field
            .filter(|field| !field.trim().is_empty());

        Ok(Self {
            index,
            fields: document.data.headers,
            id_field,
        })
    }
}

/// 🏗️ Build a Figment file provider from the extension. `.toml` gets TOML, everything else JSON.
fn file_figment(path: &Path) -> Figment {
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        Figment::new().merge(Toml::file(path))
    } else {
        Figment::new().merge(Json::file(path))
    }
}

/// 🚀 Load the connection settings from a file (optional) layered under `CSVX_*` env vars.
///
/// 📐 Env wins on conflicts, and nested keys use a double underscore:
/// `CSVX_ELASTICSEARCH__PASSWORD=hunter2` lands in `elasticsearch.password`.
/// Passwords in env vars, not in git. We've all learned this one the hard way.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = match config_file_name {
        Some(file_name) => file_figment(file_name),
        None => Figment::new(),
    };
    let config = config.merge(Env::prefixed("CSVX_").split("__"));

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (CSVX_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (CSVX_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;

    anyhow::ensure!(
        app_config.runtime.batch_size > 0,
        "💀 runtime.batch_size must be at least 1. A batch of zero is a very expensive no-op."
    );
    anyhow::ensure!(
        app_config.runtime.queue_capacity > 0,
        "💀 runtime.queue_capacity must be at least 1, otherwise the queue is a wall."
    );

    Ok(app_config)
}

/// 📐 Load the schema document.
pub fn load_schema(schema_file_name: &Path) -> anyhow::Result<SchemaConfig> {
    info!("📐 Loading schema: {}", schema_file_name.display());

    let the_document: SchemaDocument = file_figment(schema_file_name)
        .extract()
        .with_context(|| {
            format!(
                "💀 Failed to parse the schema from '{}'. It needs an `index` section and a \
                 `data` section with `headers`.",
                schema_file_name.display()
            )
        })?;

    SchemaConfig::try_from(the_document).with_context(|| {
        format!(
            "💀 The schema in '{}' is inconsistent",
            schema_file_name.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut the_file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("💀 tempfile refused to exist");
        the_file
            .write_all(contents.as_bytes())
            .expect("💀 the disk said 'new phone who dis'");
        the_file
    }

    #[test]
    fn the_one_where_the_legacy_json_settings_still_parse() {
        let the_file = write_temp(
            ".json",
            r#"{
                "s3": { "bucket": "my-bucket", "prefix": "exports" },
                "elasticsearch": {
                    "url": "search.example.com",
                    "port": 9243,
                    "username": "elastic",
                    "password": "changeme"
                }
            }"#,
        );

        let app_config = load_config(Some(the_file.path())).expect("💀 should parse");

        match app_config.store_config().expect("💀 one store configured") {
            StoreConfig::S3(s3) => {
                assert_eq!(s3.bucket, "my-bucket");
                assert_eq!(s3.prefix, "exports");
            }
            honestly_who_knows => panic!("💀 expected S3, got {:?}", honestly_who_knows),
        }
        assert_eq!(app_config.elasticsearch.port, 9243);
        assert_eq!(app_config.elasticsearch.username.as_deref(), Some("elastic"));
        assert_eq!(app_config.runtime.batch_size, 1000);
        assert!(!app_config.runtime.pipelined);
        assert_eq!(app_config.runtime.queue_capacity, 10);
    }

    #[test]
    fn the_one_where_toml_gets_a_seat_at_the_table() {
        let the_file = write_temp(
            ".toml",
            r#"
            [file]
            root = "/data/exports"

            [elasticsearch]
            url = "http://localhost:9200"

            [runtime]
            batch_size = 250
            pipelined = true
            queue_capacity = 3
            "#,
        );

        let app_config = load_config(Some(the_file.path())).expect("💀 should parse");

        assert!(matches!(
            app_config.store_config().expect("💀 one store"),
            StoreConfig::File(_)
        ));
        assert_eq!(app_config.runtime.batch_size, 250);
        assert!(app_config.runtime.pipelined);
        assert_eq!(app_config.runtime.queue_capacity, 3);
    }

    #[test]
    fn the_one_where_a_batch_of_zero_is_turned_away() {
        let the_file = write_temp(
            ".json",
            r#"{
                "file": { "root": "/tmp" },
                "elasticsearch": { "url": "localhost" },
                "runtime": { "batch_size": 0 }
            }"#,
        );

        let the_result = load_config(Some(the_file.path()));
        assert!(the_result.is_err(), "batch_size 0 should not load");
    }

    #[test]
    fn the_one_where_two_stores_is_one_too_many() {
        let the_file = write_temp(
            ".json",
            r#"{
                "s3": { "bucket": "b", "prefix": "p" },
                "file": { "root": "/tmp" },
                "elasticsearch": { "url": "localhost" }
            }"#,
        );

        let app_config = load_config(Some(the_file.path())).expect("💀 parse is fine");
        assert!(matches!(
            app_config.store_config(),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn the_one_where_no_store_at_all_is_also_a_problem() {
        let the_file = write_temp(".json", r#"{ "elasticsearch": { "url": "localhost" } }"#);

        let app_config = load_config(Some(the_file.path())).expect("💀 parse is fine");
        assert!(matches!(
            app_config.store_config(),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn the_one_where_the_schema_names_its_index() {
        let the_file = write_temp(
            ".json",
            r#"{
                "index": { "es_index_name": "people", "es_index_as_filename": false },
                "data": { "headers": ["name", "value"], "id_field": "id" }
            }"#,
        );

        let the_schema = load_schema(the_file.path()).expect("💀 schema should load");

        assert_eq!(
            the_schema,
            SchemaConfig {
                index: Some("people".to_string()),
                fields: vec!["name".to_string(), "value".to_string()],
                id_field: Some("id".to_string()),
            }
        );
    }

    #[test]
    fn the_one_where_the_filename_becomes_the_index_and_ids_are_made_up() {
        let the_file = write_temp(
            ".json",
            r#"{
                "index": { "es_index_name": "ignored", "es_index_as_filename": true },
                "data": { "headers": ["a"], "id_field": "" }
            }"#,
        );

        let the_schema = load_schema(the_file.path()).expect("💀 schema should load");

        assert_eq!(the_schema.index, None);
        assert_eq!(the_schema.id_field, None);
        assert_eq!(the_schema.fields, vec!["a".to_string()]);
    }

    #[test]
    fn the_one_where_the_schema_forgets_to_name_anything() {
        let the_file = write_temp(
            ".json",
            r#"{
                "index": { "es_index_as_filename": false },
                "data": { "headers": ["a"] }
            }"#,
        );

        assert!(load_schema(the_file.path()).is_err());
    }
}
