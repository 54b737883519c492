// SPDX-License-Identifier: AGPL-3.0-or-later
//! Export and configuration errors

use inkvault_core::tree::ExportFormat;
use inkvault_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid export configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Conversion to {format} failed for {document_id}: {message}")]
    Conversion {
        document_id: String,
        format: ExportFormat,
        message: String,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Archive already holds {0}")]
    DuplicateEntry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ExportError {
    /// Code recorded in the error monitor for a skipped document
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(StoreError::Malformed { .. }) => "MALFORMED_DOCUMENT",
            Self::Store(StoreError::FolderCycle(_)) => "FOLDER_CYCLE",
            Self::Store(_) => "FETCH_FAILED",
            Self::Conversion { .. } => "CONVERSION_FAILED",
            Self::Archive(_) | Self::DuplicateEntry(_) | Self::Io(_) => "ARCHIVE_WRITE_FAILED",
            Self::Serialization(_) => "SIDECAR_SERIALIZATION_FAILED",
            Self::Config(_) => "EXPORT_CONFIG_INVALID",
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
