use crate::error::{IndexError, Result};
use crate::store::{Store, StoreMap};
use crate::DocId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Per-document metadata, overwritten wholesale on every re-index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub last_modified: OffsetDateTime,
    pub size_bytes: u64,
}

pub struct MetadataStore {
    map: StoreMap<DocId, Metadata>,
}

impl MetadataStore {
    pub fn open(store: &Store) -> Result<MetadataStore> {
        Ok(MetadataStore { map: store.open_map("doc-meta")? })
    }

    pub fn get(&self, doc_id: DocId) -> Result<Option<Metadata>> {
        self.map.get(&doc_id)
    }

    pub fn put(&self, doc_id: DocId, metadata: &Metadata) -> Result<()> {
        if doc_id == 0 {
            return Err(IndexError::InvalidArgument("document id 0".into()));
        }
        self.map.put(&doc_id, metadata)
    }

    /// Freshness oracle: a document needs no re-index iff it has metadata
    /// whose timestamp is not strictly older than `last_modified`.
    pub fn is_fresh(&self, doc_id: DocId, last_modified: OffsetDateTime) -> Result<bool> {
        Ok(self
            .get(doc_id)?
            .map_or(false, |meta| meta.last_modified >= last_modified))
    }

    pub fn all(&self) -> Result<Vec<(DocId, Metadata)>> {
        self.map.iter().collect()
    }
}
