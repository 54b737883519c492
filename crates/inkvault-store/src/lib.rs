// SPDX-License-Identifier: AGPL-3.0-or-later
//! Inkvault Store - Document records and the persistence seam
//!
//! Provides:
//! - Record types for documents, folders and tag associations
//! - The async `DocumentSource` trait exports read through
//! - `MemoryStore`, an in-process implementation for tests and embedding

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inkvault_core::metadata::{RecordInfo, TagRef};
use inkvault_core::migration::declared_version;
use inkvault_core::tree::Node;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("Malformed document {id}: {message}")]
    Malformed { id: String, message: String },

    #[error("Folder cycle at {0}")]
    FolderCycle(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A stored document with its raw editor tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    /// Tree exactly as the editor saved it; may not be well-formed
    pub content: Value,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<TagRef>,
    #[serde(default)]
    pub schema_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        title: impl Into<String>,
        content: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            title: title.into(),
            content,
            folder_id: None,
            tags: Vec::new(),
            schema_version: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn in_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    pub fn with_tag(mut self, tag: TagRef) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = Some(version.into());
        self
    }

    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = self.updated_at.max(at);
        self
    }

    pub fn deleted(mut self, at: DateTime<Utc>) -> Self {
        self.deleted_at = Some(at);
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Decode the stored tree; fails when it is not a `doc`-rooted node tree
    pub fn parse_tree(&self) -> Result<Node> {
        let node: Node =
            serde_json::from_value(self.content.clone()).map_err(|e| StoreError::Malformed {
                id: self.id.clone(),
                message: e.to_string(),
            })?;
        if node.node_type != "doc" {
            return Err(StoreError::Malformed {
                id: self.id.clone(),
                message: format!("root node is '{}', expected 'doc'", node.node_type),
            });
        }
        Ok(node)
    }

    /// Schema version from the record column, else from the tree root
    pub fn effective_schema_version(&self, tree: &Node) -> Option<String> {
        self.schema_version
            .clone()
            .or_else(|| declared_version(tree))
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            folder_id: self.folder_id.clone(),
            tag_ids: self.tags.iter().map(|t| t.id.clone()).collect(),
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        }
    }
}

/// Timestamps rendered once for sidecar composition
#[derive(Debug, Clone)]
pub struct RecordStamps {
    pub created_at: String,
    pub updated_at: String,
}

impl RecordStamps {
    pub fn of(record: &DocumentRecord) -> Self {
        Self {
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }

    /// Borrowed view consumed by the metadata extractor
    pub fn record_info<'a>(
        &'a self,
        record: &'a DocumentRecord,
        schema_version: Option<&'a str>,
    ) -> RecordInfo<'a> {
        RecordInfo {
            content_id: &record.id,
            title: &record.title,
            created_at: &self.created_at,
            updated_at: &self.updated_at,
            schema_version,
            tags: record.tags.clone(),
        }
    }
}

/// Listing entry; enough to filter without fetching the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub folder_id: Option<String>,
    pub tag_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A folder in the owner's hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    /// Path segment used when laying out exports
    pub segment: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl Folder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            segment: inkvault_core::metadata::slugify(&name),
            name,
            parent_id: None,
        }
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Read access to persisted documents
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Every document the owner has, including soft-deleted ones
    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentSummary>>;

    async fn fetch_document(&self, id: &str) -> Result<DocumentRecord>;

    async fn fetch_folder(&self, id: &str) -> Result<Folder>;
}

/// Folders from the root down to `folder_id`, inclusive
pub async fn folder_path(source: &dyn DocumentSource, folder_id: &str) -> Result<Vec<Folder>> {
    let mut path = Vec::new();
    let mut next = Some(folder_id.to_string());
    while let Some(id) = next {
        if path.iter().any(|f: &Folder| f.id == id) {
            return Err(StoreError::FolderCycle(id));
        }
        let folder = source.fetch_folder(&id).await?;
        next = folder.parent_id.clone();
        path.push(folder);
    }
    path.reverse();
    Ok(path)
}
