//! 🗺️ Mapper: one row in, one document out.
//!
//! The mapper picks the configured columns out of a [`RowRecord`], decides the
//! document id, and stamps the destination index on it. That's the whole job.
//! No type coercion, no renaming, no clever inference: every value is a string
//! because it was a string in the CSV, and we are not about to start lying now. 🦆
//!
//! 🔑 Id rules:
//! - `id_field` configured: the row's value for it, verbatim. Duplicates overwrite at
//!   the destination; we do not check.
//! - otherwise: a fresh UUID v4 per row. Re-running the load creates new ids and so
//!   new documents. That's the observed behavior and we keep it.

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::app_config::SchemaConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::records::RowRecord;

/// 📦 A document on its way to the search engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// 🏷️ Destination index.
    pub index: String,
    /// 🔑 Document id inside that index.
    pub id: String,
    /// 📋 The projected columns, name → value.
    pub source: Map<String, Value>,
}

/// 🗺️ Row → Document, under one schema. A template: call [`DocumentMapper::for_object`]
/// once an object's header is known to get the mapper that does the work.
#[derive(Debug, Clone)]
pub struct DocumentMapper {
    fields: Vec<String>,
    id_field: Option<String>,
}

impl DocumentMapper {
    pub fn new(schema: &SchemaConfig) -> Self {
        Self {
            fields: schema.fields.clone(),
            id_field: schema.id_field.clone(),
        }
    }

    /// 📐 Resolve every configured column against one object's header, once.
    ///
    /// A header that names the same column twice resolves to the last one, the way
    /// a dict built from the row would. A column the header lacks stays unresolved
    /// and turns into `MissingField` on the first row that needs it.
    pub fn for_object(&self, key: &str, headers: &[String]) -> ObjectMapper {
        let position = |name: &str| headers.iter().rposition(|header| header == name);
        ObjectMapper {
            key: key.to_string(),
            fields: self
                .fields
                .iter()
                .map(|field| (field.clone(), position(field)))
                .collect(),
            id: self
                .id_field
                .as_ref()
                .map(|id_field| (id_field.clone(), position(id_field))),
        }
    }
}

/// 🎯 A [`DocumentMapper`] bound to one object's column layout.
#[derive(Debug, Clone)]
pub struct ObjectMapper {
    // 📛 which object we're mapping, for error messages only
    key: String,
    fields: Vec<(String, Option<usize>)>,
    // 🔑 None means "make one up"
    id: Option<(String, Option<usize>)>,
}

impl ObjectMapper {
    /// 🎯 Map one row into a document bound for `index`.
    ///
    /// 💀 `MissingField` if the id column or any configured column is absent from the row.
    pub fn map(&self, row: &RowRecord, index: &str) -> PipelineResult<Document> {
        let id = match &self.id {
            Some((id_field, column)) => self.lookup(row, id_field, *column)?.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let mut source = Map::with_capacity(self.fields.len());
        for (field, column) in &self.fields {
            let value = self.lookup(row, field, *column)?;
            source.insert(field.clone(), Value::String(value.to_string()));
        }

        Ok(Document {
            index: index.to_string(),
            id,
            source,
        })
    }

    fn lookup<'r>(
        &self,
        row: &'r RowRecord,
        field: &str,
        column: Option<usize>,
    ) -> PipelineResult<&'r str> {
        column
            .and_then(|column| row.value(column))
            .ok_or_else(|| PipelineError::MissingField {
                key: self.key.clone(),
                field: field.to_string(),
                row: row.row_number(),
            })
    }
}
