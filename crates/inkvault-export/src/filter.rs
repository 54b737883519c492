// SPDX-License-Identifier: AGPL-3.0-or-later
//! Document selection for vault exports

use chrono::{DateTime, Utc};
use inkvault_store::{DocumentSummary, Folder};
use serde::{Deserialize, Serialize};

/// Criteria a document must meet to be exported; all set fields must match
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportFilter {
    pub folder_id: Option<String>,
    /// With `folder_id`, also take documents in nested folders
    pub include_descendants: bool,
    pub tag_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub include_deleted: bool,
}

impl ExportFilter {
    pub fn in_folder(folder_id: impl Into<String>, include_descendants: bool) -> Self {
        Self {
            folder_id: Some(folder_id.into()),
            include_descendants,
            ..Self::default()
        }
    }

    pub fn with_tag(tag_id: impl Into<String>) -> Self {
        Self {
            tag_id: Some(tag_id.into()),
            ..Self::default()
        }
    }

    /// Whether the filter needs the folder chain to decide
    pub fn needs_folders(&self) -> bool {
        self.folder_id.is_some() && self.include_descendants
    }

    /// `folder_chain` is the document's folder path, root first
    pub fn matches(&self, summary: &DocumentSummary, folder_chain: &[Folder]) -> bool {
        if summary.deleted_at.is_some() && !self.include_deleted {
            return false;
        }
        if let Some(tag) = &self.tag_id {
            if !summary.tag_ids.iter().any(|t| t == tag) {
                return false;
            }
        }
        if self.created_after.is_some_and(|after| summary.created_at < after) {
            return false;
        }
        if self.created_before.is_some_and(|before| summary.created_at > before) {
            return false;
        }
        match &self.folder_id {
            None => true,
            Some(folder) if self.include_descendants => folder_chain.iter().any(|f| &f.id == folder),
            Some(folder) => summary.folder_id.as_ref() == Some(folder),
        }
    }
}
