// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bulk and single-document export
//!
//! A vault export lists the owner's documents, filters them, and converts
//! them in fixed-size batches: concurrent inside a batch, sequential across
//! batches. A document that fails at any step is logged to the error monitor
//! and left out; only a failed listing aborts the whole export.

use crate::archive::{join_path, ArchiveBuilder};
use crate::config::{ExportConfig, Layout, NamingStrategy};
use crate::error::{ExportError, Result};
use crate::filter::ExportFilter;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use inkvault_core::metadata::{compose_metadata, slugify, DocumentMetadata};
use inkvault_core::migration::MigrationEngine;
use inkvault_core::monitor::{ErrorEvent, ErrorMonitor};
use inkvault_core::traits::{ConversionResult, ConverterRegistry, ExportFile, SIDECAR_SUFFIX};
use inkvault_core::tree::ExportFormat;
use inkvault_core::validation::{Severity, Validator};
use inkvault_store::{
    folder_path, DocumentRecord, DocumentSource, DocumentSummary, Folder, RecordStamps,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// Longest file stem produced by [`NamingStrategy::Title`], in graphemes
const MAX_TITLE_STEM: usize = 100;

/// What to export from a vault
#[derive(Debug, Clone, Default)]
pub struct VaultExportRequest {
    pub owner_id: String,
    pub filter: ExportFilter,
    /// Overrides the configured format
    pub format: Option<ExportFormat>,
}

impl VaultExportRequest {
    pub fn for_owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: ExportFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = Some(format);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedDocument {
    pub document_id: String,
    pub title: String,
    /// Archive paths written for this document
    pub paths: Vec<String>,
    pub warnings: Vec<String>,
    /// Schema version the stored document declared
    pub schema_from: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedDocument {
    pub document_id: String,
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub format: ExportFormat,
    pub selected: usize,
    pub exported: Vec<ExportedDocument>,
    pub skipped: Vec<SkippedDocument>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Finished vault export: the zip bytes and what went into them
#[derive(Debug, Clone)]
pub struct VaultExport {
    pub archive: Vec<u8>,
    pub report: ExportReport,
}

/// Payload for a single-document download
#[derive(Debug, Clone)]
pub struct SingleExport {
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
    pub sidecar: Option<ExportFile>,
    pub warnings: Vec<String>,
}

/// One document taken through migrate, validate and convert
struct Converted {
    result: ConversionResult,
    metadata: DocumentMetadata,
    schema_from: String,
}

pub struct Exporter {
    source: Arc<dyn DocumentSource>,
    monitor: Arc<ErrorMonitor>,
    config: ExportConfig,
    converters: ConverterRegistry,
    validator: Validator,
    migrations: MigrationEngine,
}

impl Exporter {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        monitor: Arc<ErrorMonitor>,
        config: ExportConfig,
    ) -> Self {
        Self {
            source,
            monitor,
            config,
            converters: ConverterRegistry::new(),
            validator: Validator::default(),
            migrations: MigrationEngine::default(),
        }
    }

    /// Exporter with its own monitor sized by `config.monitor_capacity`
    pub fn from_config(source: Arc<dyn DocumentSource>, config: ExportConfig) -> Self {
        let monitor = Arc::new(ErrorMonitor::with_capacity(config.monitor_capacity));
        Self::new(source, monitor, config)
    }

    pub fn with_converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = converters;
        self
    }

    pub fn with_migrations(mut self, migrations: MigrationEngine) -> Self {
        self.migrations = migrations;
        self
    }

    pub fn monitor(&self) -> &ErrorMonitor {
        &self.monitor
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export every matching document into one zip archive
    pub async fn export_vault(&self, request: &VaultExportRequest) -> Result<VaultExport> {
        let started_at = Utc::now();
        let format = request.format.unwrap_or(self.config.format);

        let summaries = self.source.list_documents(&request.owner_id).await?;
        tracing::info!(
            owner_id = %request.owner_id,
            listed = summaries.len(),
            %format,
            "starting vault export"
        );

        let archive = ArchiveBuilder::new();
        archive.claim("", &self.config.summary_file, &[""]);

        let mut skipped = Vec::new();
        let mut folders: HashMap<String, Vec<Folder>> = HashMap::new();
        let mut selected: Vec<(DocumentSummary, Vec<Folder>)> = Vec::new();
        for summary in summaries {
            match self.resolve_folders(&summary, &request.filter, &mut folders).await {
                Ok(chain) => {
                    if request.filter.matches(&summary, &chain) {
                        selected.push((summary, chain));
                    }
                }
                Err(e) => {
                    // Only report documents the caller could have wanted.
                    if request.filter.needs_folders() || request.filter.matches(&summary, &[]) {
                        self.record_skip(&summary.id, &e, &mut skipped);
                    }
                }
            }
        }

        let total = selected.len();
        let batch_size = self.config.batch_size.max(1);
        let mut exported = Vec::with_capacity(total);
        for (index, batch) in selected.chunks(batch_size).enumerate() {
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|(summary, chain)| self.export_into(summary, chain, format, &archive)),
            )
            .await;
            for ((summary, _), outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(document) => exported.push(document),
                    Err(e) => self.record_skip(&summary.id, &e, &mut skipped),
                }
            }
            tracing::debug!(
                batch = index + 1,
                processed = (index * batch_size + batch.len()).min(total),
                total,
                "batch finished"
            );
        }

        let report = ExportReport {
            format,
            selected: total,
            exported,
            skipped,
            started_at,
            finished_at: Utc::now(),
        };
        archive.add_file(
            &self.config.summary_file,
            render_summary(&report, &self.monitor).as_bytes(),
        )?;
        let bytes = archive.finish()?;

        tracing::info!(
            exported = report.exported.len(),
            skipped = report.skipped.len(),
            bytes = bytes.len(),
            "vault export finished"
        );
        Ok(VaultExport {
            archive: bytes,
            report,
        })
    }

    /// Export one document; any failure is logged and returned to the caller
    pub async fn export_single_document(
        &self,
        document_id: &str,
        format: Option<ExportFormat>,
    ) -> Result<SingleExport> {
        let format = format.unwrap_or(self.config.format);
        let outcome = self.single_export(document_id, format).await;
        if let Err(e) = &outcome {
            self.log_failure(document_id, e);
        }
        outcome
    }

    async fn single_export(
        &self,
        document_id: &str,
        format: ExportFormat,
    ) -> Result<SingleExport> {
        let record = self.source.fetch_document(document_id).await?;
        let stem = file_stem(self.config.naming, &record);
        let converted = self.convert_record(&record, format, &stem)?;

        let result = converted.result;
        if !result.success {
            return Err(conversion_error(&record.id, format, &result));
        }
        let primary = result
            .primary_file()
            .cloned()
            .ok_or_else(|| conversion_error(&record.id, format, &result))?;
        Ok(SingleExport {
            file_name: primary.name,
            mime_type: primary.mime_type,
            content: primary.content.into_bytes(),
            sidecar: result.sidecar_file().cloned(),
            warnings: result.warnings().to_vec(),
        })
    }

    async fn resolve_folders(
        &self,
        summary: &DocumentSummary,
        filter: &ExportFilter,
        cache: &mut HashMap<String, Vec<Folder>>,
    ) -> Result<Vec<Folder>> {
        let Some(folder_id) = &summary.folder_id else {
            return Ok(Vec::new());
        };
        if self.config.layout == Layout::Flat && !filter.needs_folders() {
            return Ok(Vec::new());
        }
        if let Some(chain) = cache.get(folder_id) {
            return Ok(chain.clone());
        }
        let chain = folder_path(self.source.as_ref(), folder_id).await?;
        cache.insert(folder_id.clone(), chain.clone());
        Ok(chain)
    }

    async fn export_into(
        &self,
        summary: &DocumentSummary,
        chain: &[Folder],
        format: ExportFormat,
        archive: &ArchiveBuilder,
    ) -> Result<ExportedDocument> {
        let record = self.source.fetch_document(&summary.id).await?;
        let dir = match self.config.layout {
            Layout::Hierarchical => chain
                .iter()
                .map(|f| f.segment.as_str())
                .collect::<Vec<_>>()
                .join("/"),
            Layout::Flat => String::new(),
        };
        let base = file_stem(self.config.naming, &record);
        let converted = self.convert_record(&record, format, &base)?;
        if !converted.result.success {
            // Fallback output is kept but the failure is still recorded.
            self.monitor
                .log_conversion(&converted.result, Some(record.id.as_str()));
        }

        let mut files = converted.result.files.clone();
        if self.config.include_metadata && converted.result.sidecar_file().is_none() {
            files.push(ExportFile::new(
                format!("{base}{SIDECAR_SUFFIX}"),
                serde_json::to_string_pretty(&converted.metadata)?,
                ExportFormat::Json.mime_type(),
            ));
        }

        // Converters name every file `{stem}{suffix}`; all of them move
        // together if the stem is already taken.
        let suffixes: Vec<&str> = files
            .iter()
            .map(|f| f.name.strip_prefix(base.as_str()).unwrap_or(f.name.as_str()))
            .collect();
        let stem = archive.claim(&dir, &base, &suffixes);
        let staged: Vec<(String, Vec<u8>)> = files
            .iter()
            .zip(&suffixes)
            .map(|(file, suffix)| {
                (
                    join_path(&dir, &format!("{stem}{suffix}")),
                    file.content.as_bytes().to_vec(),
                )
            })
            .collect();
        let paths = staged.iter().map(|(path, _)| path.clone()).collect();
        archive.add_files(staged)?;

        Ok(ExportedDocument {
            document_id: record.id.clone(),
            title: record.title.clone(),
            paths,
            warnings: converted.result.warnings().to_vec(),
            schema_from: converted.schema_from,
        })
    }

    /// Parse, migrate, validate and convert one stored document
    fn convert_record(
        &self,
        record: &DocumentRecord,
        format: ExportFormat,
        stem: &str,
    ) -> Result<Converted> {
        let tree = record.parse_tree()?;
        let stamps = RecordStamps::of(record);
        let declared = record.effective_schema_version(&tree);
        let metadata = compose_metadata(&stamps.record_info(record, declared.as_deref()), &tree);

        let migrated = self.migrations.apply_migrations(&tree, &metadata);
        if !migrated.applied.is_empty() {
            tracing::debug!(
                document_id = %record.id,
                from = %migrated.from_version,
                steps = migrated.applied.len(),
                "document migrated"
            );
        }
        if !migrated.complete {
            self.monitor.log_error(
                ErrorEvent::new(
                    "MIGRATION_INCOMPLETE",
                    format!(
                        "no migration path from {} past {}",
                        migrated.from_version, migrated.reached_version
                    ),
                    Severity::Medium,
                )
                .document(&record.id)
                .schema_version(&migrated.from_version),
            );
        }

        let sidecar = serde_json::to_value(&migrated.metadata)?;
        let validation = self.validator.validate_before_export(&migrated.tree, &sidecar);
        if !validation.is_clean() {
            tracing::warn!(
                document_id = %record.id,
                errors = validation.errors.len(),
                warnings = validation.warnings.len(),
                "validation issues, exporting anyway"
            );
            self.monitor.log_validation(
                &validation,
                Some(record.id.as_str()),
                &migrated.metadata.schema_version,
            );
        }

        let options = self
            .config
            .conversion_options(format, stem, Some(migrated.metadata.clone()));
        let result = self.converters.convert(&migrated.tree, &options);
        if result.success {
            let check = self.validator.validate_export_result(&result);
            if !check.is_clean() {
                self.monitor.log_validation(
                    &check,
                    Some(record.id.as_str()),
                    &migrated.metadata.schema_version,
                );
            }
        } else if result.files.is_empty() {
            return Err(conversion_error(&record.id, format, &result));
        }

        Ok(Converted {
            result,
            metadata: migrated.metadata,
            schema_from: migrated.from_version,
        })
    }

    fn log_failure(&self, document_id: &str, error: &ExportError) {
        tracing::warn!(document_id, code = error.code(), error = %error, "document export failed");
        self.monitor.log_error(
            ErrorEvent::new(error.code(), error.to_string(), Severity::High).document(document_id),
        );
    }

    fn record_skip(
        &self,
        document_id: &str,
        error: &ExportError,
        skipped: &mut Vec<SkippedDocument>,
    ) {
        self.log_failure(document_id, error);
        skipped.push(SkippedDocument {
            document_id: document_id.to_string(),
            code: error.code().to_string(),
            reason: error.to_string(),
        });
    }
}

fn conversion_error(
    document_id: &str,
    format: ExportFormat,
    result: &ConversionResult,
) -> ExportError {
    ExportError::Conversion {
        document_id: document_id.to_string(),
        format,
        message: result.warnings().join("; "),
    }
}

/// File stem for a record under the naming strategy
pub fn file_stem(naming: NamingStrategy, record: &DocumentRecord) -> String {
    match naming {
        NamingStrategy::Segment => slugify(&record.title),
        NamingStrategy::Title => sanitize_title(&record.title),
        NamingStrategy::Id => sanitize_title(&record.id),
    }
}

/// Replace characters that are unsafe in archive paths and cap the length
fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.');
    let capped: String = trimmed.graphemes(true).take(MAX_TITLE_STEM).collect();
    let capped = capped.trim_end();
    if capped.is_empty() {
        "untitled".to_string()
    } else {
        capped.to_string()
    }
}

fn render_summary(report: &ExportReport, monitor: &ErrorMonitor) -> String {
    let mut out = String::from("# Export Summary\n\n");
    let elapsed = report.finished_at - report.started_at;
    out.push_str(&format!("- Exported at: {}\n", report.finished_at.to_rfc3339()));
    out.push_str(&format!("- Format: {}\n", report.format.label()));
    out.push_str(&format!("- Documents selected: {}\n", report.selected));
    out.push_str(&format!("- Documents exported: {}\n", report.exported.len()));
    out.push_str(&format!("- Documents skipped: {}\n", report.skipped.len()));
    out.push_str(&format!("- Duration: {} ms\n", elapsed.num_milliseconds()));

    if !report.exported.is_empty() {
        out.push_str("\n## Exported\n\n| Document | Files |\n| --- | --- |\n");
        for doc in &report.exported {
            out.push_str(&format!(
                "| {} | {} |\n",
                doc.title.replace('|', "\\|"),
                doc.paths.join("<br>").replace('|', "\\|")
            ));
        }
    }

    if !report.skipped.is_empty() {
        out.push_str("\n## Skipped\n\n");
        for skip in &report.skipped {
            out.push_str(&format!("- `{}` ({}): {}\n", skip.document_id, skip.code, skip.reason));
        }
    }

    let discrepancies = monitor.discrepancies();
    if !discrepancies.is_empty() {
        out.push_str("\n## Discrepancies\n\n");
        for entry in discrepancies.iter().take(10) {
            out.push_str(&format!(
                "- {} (schema {}): {} occurrence(s). {}\n",
                entry.error_code, entry.schema_version, entry.occurrences, entry.remediation
            ));
        }
    }
    out
}
