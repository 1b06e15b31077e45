//! 📄 Records: turning a byte stream into rows, one header at a time.
//!
//! 🎬 COLD OPEN. INT. S3 BUCKET. The object has been sitting there since Tuesday.
//! First line: `id,name,value`. Every line after that: a promise.
//!
//! [`RecordSource`] wraps a `csv_async` reader over any `tokio::io::AsyncRead`
//! (an S3 body, a local file, a `Cursor` in a test). The first line is the header,
//! and every row after it becomes a [`RowRecord`] that can be looked up by column name.
//!
//! 🧠 Knowledge graph:
//! - Producer: `ObjectStore::open()` hands us the reader
//! - Consumer: `DocumentMapper::map()` borrows each row
//! - Forward-only. Want to read it again? Open it again.
//!
//! The reader is flexible about row length on purpose: a short row is not a decode
//! problem, it's a missing field, and the mapper reports it by name. 🦆

use std::sync::Arc;

use csv_async::{AsyncReader, AsyncReaderBuilder, ErrorKind, StringRecord};
use tokio::io::AsyncRead;
use tracing::{debug, trace};

use crate::errors::{PipelineError, PipelineResult};

/// 📦 One row of one object: the object's header plus this row's values.
///
/// The header is shared (`Arc`) between every row of the same object, so a million
/// rows cost a million value lists and exactly one header.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    headers: Arc<[String]>,
    values: Vec<String>,
    row_number: u64,
}

impl RowRecord {
    /// 🏗️ Build a row by hand. The reader does this for real; tests and benches do it for fun.
    pub fn new(headers: Arc<[String]>, values: Vec<String>, row_number: u64) -> Self {
        Self {
            headers,
            values,
            row_number,
        }
    }

    /// 🔍 Value of column `name`, or `None` if the header lacks it or this row is too short.
    /// A name the header repeats resolves to its last column.
    pub fn get(&self, name: &str) -> Option<&str> {
        let the_position = self.headers.iter().rposition(|header| header == name)?;
        self.value(the_position)
    }

    /// 🔍 Value at a column position resolved ahead of time. `None` past the end of a short row.
    pub fn value(&self, column: usize) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    /// 🔢 1-based data row number (the header is row 0).
    pub fn row_number(&self) -> u64 {
        self.row_number
    }
}

/// 🚰 A lazy, finite, forward-only stream of [`RowRecord`]s from one object.
pub struct RecordSource<R> {
    reader: AsyncReader<R>,
    headers: Arc<[String]>,
    key: String,
    rows_read: u64,
}

impl<R> std::fmt::Debug for RecordSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 🐛 the csv reader doesn't do Debug and nobody wants its buffer dumped anyway
        f.debug_struct("RecordSource")
            .field("key", &self.key)
            .field("headers", &self.headers)
            .field("rows_read", &self.rows_read)
            .finish()
    }
}

impl<R> RecordSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// 🚀 Wrap a reader and consume the header row.
    ///
    /// An empty object is fine: no header, no rows, nothing to do.
    pub async fn new(reader: R, key: &str) -> PipelineResult<Self> {
        let mut the_reader = AsyncReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .create_reader(reader);

        let the_headers: Arc<[String]> = the_reader
            .headers()
            .await
            .map_err(|err| classify(key, err))?
            .iter()
            .map(str::to_owned)
            .collect();

        debug!("📄 '{}' has columns {:?}", key, the_headers);

        Ok(Self {
            reader: the_reader,
            headers: the_headers,
            key: key.to_string(),
            rows_read: 0,
        })
    }

    /// 📋 The header row, as read.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// 📄 Next row, or `None` at end of stream.
    pub async fn next_record(&mut self) -> PipelineResult<Option<RowRecord>> {
        let mut the_record = StringRecord::new();
        let has_more = self
            .reader
            .read_record(&mut the_record)
            .await
            .map_err(|err| classify(&self.key, err))?;

        if !has_more {
            trace!("🏁 '{}' exhausted after {} rows", self.key, self.rows_read);
            return Ok(None);
        }

        self.rows_read += 1;
        Ok(Some(RowRecord {
            headers: Arc::clone(&self.headers),
            values: the_record.iter().map(str::to_owned).collect(),
            row_number: self.rows_read,
        }))
    }

    /// 🔢 Rows handed out so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }
}

// 🕵️ An I/O error mid-stream is the store's fault (the network dropped us); anything
// else is the bytes' fault.
fn classify(key: &str, err: csv_async::Error) -> PipelineError {
    if matches!(err.kind(), ErrorKind::Io(_)) {
        PipelineError::StoreAccess {
            location: key.to_string(),
            source: Box::new(err),
        }
    } else {
        PipelineError::Decode {
            key: key.to_string(),
            source: Box::new(err),
        }
    }
}
