// SPDX-License-Identifier: AGPL-3.0-or-later
//! Inkvault Core - Document tree, schema evolution and format converters
//!
//! This crate provides:
//! - The canonical document tree and a versioned schema registry
//! - Sidecar metadata extraction and structural validation
//! - Converters for Markdown, HTML, JSON and plain text (PDF and DOCX stubbed)
//! - Schema migrations and an error/discrepancy monitor

pub mod formats;
pub mod metadata;
pub mod migration;
pub mod monitor;
pub mod schema;
pub mod traits;
pub mod tree;
pub mod validation;

pub use metadata::{compose_metadata, DocumentMetadata, RecordInfo};
pub use migration::{Migration, MigrationEngine, MigrationOutcome};
pub use monitor::{DiscrepancyFilter, ErrorFilter, ErrorMonitor, MonitorSummary};
pub use schema::{SchemaRegistry, SchemaSnapshot, CURRENT_SCHEMA_VERSION};
pub use traits::{
    ConversionError, ConversionOptions, ConversionResult, Converter, ConverterRegistry,
    ExportFile, Result,
};
pub use tree::{ExportFormat, Mark, MarkKind, Node, NodeKind};
pub use validation::{Severity, ValidationCode, ValidationResult, Validator};
