// SPDX-License-Identifier: AGPL-3.0-or-later
//! Inkvault Export - Vault and single-document export
//!
//! Exports run each document through migration, validation and conversion:
//! - Input: documents read through a `DocumentSource`
//! - Steps: filter, batch, migrate, validate, convert, lay out
//! - Output: a zip archive with an `EXPORT_SUMMARY.md`, or one file

pub mod archive;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod logging;

pub use config::{ExportConfig, Layout, NamingStrategy};
pub use error::{ConfigError, ExportError, Result};
pub use export::{
    ExportReport, ExportedDocument, Exporter, SingleExport, SkippedDocument, VaultExport,
    VaultExportRequest,
};
pub use filter::ExportFilter;
