//! Metadata store trait for canonical patent records.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::PatentRecord;
use crate::error::Result;

/// A structured record store keyed by patent id.
///
/// Implementations must call [`PatentRecord::validate`] on `put`, so no
/// store ever holds a record without id, title or version.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch the record for `patent_id`, or `None` if absent.
    async fn get(&self, patent_id: &str) -> Result<Option<PatentRecord>>;

    /// Insert or replace the record keyed by `record.id`.
    async fn put(&self, record: PatentRecord) -> Result<()>;

    /// Remove the record for `patent_id`. Absent ids are ignored.
    async fn delete(&self, patent_id: &str) -> Result<()>;

    /// A short name used in logs and errors.
    fn name(&self) -> &str {
        "custom"
    }
}

/// A [`MetadataStore`] held in a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<String, PatentRecord>>,
}

impl InMemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, patent_id: &str) -> Result<Option<PatentRecord>> {
        Ok(self.records.read().await.get(patent_id).cloned())
    }

    async fn put(&self, record: PatentRecord) -> Result<()> {
        record.validate()?;
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, patent_id: &str) -> Result<()> {
        self.records.write().await.remove(patent_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PatentDocument;
    use crate::error::RagError;

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemoryMetadataStore::new();
        let doc = PatentDocument::new("US1", "Widget", "A widget.");
        store.put(PatentRecord::from_document(&doc, "v1", 1)).await.unwrap();

        let record = store.get("US1").await.unwrap().unwrap();
        assert_eq!(record.title, "Widget");
        assert_eq!(record.version_tag, "v1");

        store.delete("US1").await.unwrap();
        assert!(store.get("US1").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn invalid_records_are_rejected_at_the_boundary() {
        let store = InMemoryMetadataStore::new();
        let doc = PatentDocument::new("US1", "", "A widget.");
        let err = store.put(PatentRecord::from_document(&doc, "v1", 1)).await.unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
        assert_eq!(store.len().await, 0);
    }
}
