//! 📁 File Store: a local directory, dressed up as a bucket for the evening.
//!
//! Keys are paths relative to `root`, joined with `/` no matter what the OS thinks,
//! so `exports/2024-01-01.csv` means the same thing here as it does in S3.
//! Handy for local runs, fixtures, and the days when the VPN is down. 🦆

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::backends::{ObjectReader, ObjectStore, SourceObject, normalize_prefix};
use crate::errors::{PipelineError, PipelineResult};

/// 🔧 Which directory to treat as a bucket, and which "prefix" inside it.
#[derive(Debug, Deserialize, Clone)]
pub struct FileStoreConfig {
    /// 📂 The pretend bucket.
    pub root: PathBuf,
    /// 🗂️ Relative key prefix, `/`-separated. Empty means everything under `root`.
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug)]
pub(crate) struct FileStore {
    root: PathBuf,
    prefix: String,
}

impl FileStore {
    pub(crate) fn new(config: FileStoreConfig) -> Self {
        Self {
            root: config.root,
            prefix: normalize_prefix(&config.prefix),
        }
    }

    fn access_error(&self, location: &Path, err: std::io::Error) -> PipelineError {
        PipelineError::StoreAccess {
            location: location.display().to_string(),
            source: Box::new(err),
        }
    }
}

#[async_trait]
impl ObjectStore for FileStore {
    async fn list(&self) -> PipelineResult<Vec<SourceObject>> {
        let mut the_objects = Vec::new();
        // 🔄 iterative walk; the directory stack holds (absolute dir, key prefix of that dir)
        let mut the_pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, dir_key)) = the_pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|err| self.access_error(&dir, err))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|err| self.access_error(&dir, err))?
            {
                let the_name = entry.file_name().to_string_lossy().into_owned();
                let the_key = format!("{dir_key}{the_name}");
                let the_type = entry
                    .file_type()
                    .await
                    .map_err(|err| self.access_error(&entry.path(), err))?;

                if the_type.is_dir() {
                    the_pending.push((entry.path(), format!("{the_key}/")));
                } else if the_key.starts_with(&self.prefix) {
                    let the_size = entry.metadata().await.ok().map(|meta| meta.len());
                    the_objects.push(SourceObject {
                        key: the_key,
                        size: the_size,
                    });
                }
            }
        }

        // 📋 S3 lists in key order; so do we
        the_objects.sort_by(|a, b| a.key.cmp(&b.key));
        debug!("📋 {} listed {} objects", self.location(), the_objects.len());
        Ok(the_objects)
    }

    async fn open(&self, object: &SourceObject) -> PipelineResult<ObjectReader> {
        let the_path = object
            .key
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment));
        let the_file = tokio::fs::File::open(&the_path)
            .await
            .map_err(|err| self.access_error(&the_path, err))?;
        Ok(Box::new(the_file))
    }

    fn location(&self) -> String {
        format!("file://{}/{}", self.root.display(), self.prefix)
    }
}
