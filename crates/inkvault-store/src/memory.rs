// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory document source

use crate::{DocumentRecord, DocumentSource, DocumentSummary, Folder, Result, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Document source backed by maps; cheap to build in tests
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, DocumentRecord>>,
    folders: RwLock<BTreeMap<String, Folder>>,
    failing: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_document(&self, record: DocumentRecord) {
        self.documents.write().await.insert(record.id.clone(), record);
    }

    pub async fn insert_folder(&self, folder: Folder) {
        self.folders.write().await.insert(folder.id.clone(), folder);
    }

    /// Make `fetch_document` fail for this id
    pub async fn fail_fetch(&self, id: impl Into<String>) {
        self.failing.write().await.insert(id.into());
    }

    /// Make every call fail, as if the backend were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentSource for MemoryStore {
    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentSummary>> {
        self.check_available()?;
        let documents = self.documents.read().await;
        let mut summaries: Vec<_> = documents
            .values()
            .filter(|d| d.owner_id == owner_id)
            .map(DocumentRecord::summary)
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tracing::debug!(owner_id, count = summaries.len(), "listed documents");
        Ok(summaries)
    }

    async fn fetch_document(&self, id: &str) -> Result<DocumentRecord> {
        self.check_available()?;
        if self.failing.read().await.contains(id) {
            return Err(StoreError::Unavailable(format!("fetch of {id} refused")));
        }
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))
    }

    async fn fetch_folder(&self, id: &str) -> Result<Folder> {
        self.check_available()?;
        self.folders
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::FolderNotFound(id.to_string()))
    }
}
