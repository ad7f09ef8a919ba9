//! Record source — loads an immutable [`Record`] snapshot by name.
//!
//! Records live in PostgreSQL:
//!
//! ```sql
//! CREATE TABLE resume_records (
//!     name        TEXT PRIMARY KEY,
//!     version     INTEGER NOT NULL DEFAULT 1,
//!     sections    JSONB NOT NULL,
//!     layout      JSONB,
//!     updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use thiserror::Error;

use crate::models::record::{Layout, Record, Section};

const MAX_NAME_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid record name '{0}'")]
    InvalidName(String),

    #[error("record '{0}' not found")]
    NotFound(String),

    #[error("record '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Names become object keys and URL segments, so only a conservative
/// character set is allowed.
pub fn validate_name(name: &str) -> Result<(), RecordError> {
    let ok = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(RecordError::InvalidName(name.to_string()))
    }
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Record, RecordError>;
}

#[derive(Debug, FromRow)]
struct RecordRow {
    name: String,
    version: i32,
    sections: Value,
    layout: Option<Value>,
    #[allow(dead_code)]
    updated_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self) -> Result<Record, RecordError> {
        let malformed = |reason: String| RecordError::Malformed {
            name: self.name.clone(),
            reason,
        };
        let sections: Vec<Section> = serde_json::from_value(self.sections.clone())
            .map_err(|e| malformed(format!("sections: {e}")))?;
        let layout: Option<Layout> = match &self.layout {
            Some(Value::Null) | None => None,
            Some(value) => Some(
                serde_json::from_value(value.clone())
                    .map_err(|e| malformed(format!("layout: {e}")))?,
            ),
        };
        Ok(Record {
            name: self.name,
            version: self.version,
            sections,
            layout,
        })
    }
}

#[derive(Clone)]
pub struct PgRecordSource {
    pool: PgPool,
}

impl PgRecordSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSource for PgRecordSource {
    async fn fetch(&self, name: &str) -> Result<Record, RecordError> {
        validate_name(name)?;
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT name, version, sections, layout, updated_at
            FROM resume_records
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| RecordError::NotFound(name.to_string()))?
            .into_record()
    }
}

/// Records held in memory, keyed by name.
#[derive(Debug, Default)]
pub struct MemoryRecordSource {
    records: RwLock<HashMap<String, Record>>,
}

impl MemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let source = Self::new();
        for record in records {
            source.insert(record);
        }
        source
    }

    pub fn insert(&self, record: Record) {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.name.clone(), record);
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn fetch(&self, name: &str) -> Result<Record, RecordError> {
        validate_name(name)?;
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| RecordError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_name_validation() {
        assert!(validate_name("backend-2024").is_ok());
        assert!(validate_name("v1.2_final").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_row_conversion() {
        let row = RecordRow {
            name: "backend".into(),
            version: 4,
            sections: json!([{ "id": "s", "kind": "raw", "content": { "content": "hi" } }]),
            layout: Some(json!({ "order": ["s"] })),
            updated_at: Utc::now(),
        };
        let record = row.into_record().unwrap();
        assert_eq!(record.version, 4);
        assert_eq!(record.section_ids(), vec!["s"]);
        assert_eq!(record.layout.unwrap().order, vec!["s"]);
    }

    #[test]
    fn test_malformed_row_is_reported() {
        let row = RecordRow {
            name: "broken".into(),
            version: 1,
            sections: json!({ "not": "a list" }),
            layout: None,
            updated_at: Utc::now(),
        };
        assert!(matches!(
            row.into_record(),
            Err(RecordError::Malformed { name, .. }) if name == "broken"
        ));
    }

    #[tokio::test]
    async fn test_memory_source_lookup() {
        let source = MemoryRecordSource::with_records([crate::render::tests::sample_record()]);
        assert_eq!(source.fetch("backend").await.unwrap().version, 3);
        assert!(matches!(
            source.fetch("missing").await,
            Err(RecordError::NotFound(_))
        ));
        assert!(matches!(
            source.fetch("../x").await,
            Err(RecordError::InvalidName(_))
        ));
    }
}
