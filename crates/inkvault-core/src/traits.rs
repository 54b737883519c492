// SPDX-License-Identifier: AGPL-3.0-or-later
//! Converter trait, conversion options and the format registry

use crate::formats::{
    DocxStub, EditorRenderer, HtmlConverter, JsonConverter, MarkdownConverter, PdfStub,
    PlainTextConverter, TiptapHtmlRenderer,
};
use crate::metadata::DocumentMetadata;
use crate::tree::{ExportFormat, Node};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Error type for rendering inside a converter
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Render error in {format}: {message}")]
    Render { format: ExportFormat, message: String },

    #[error("{0} export is not implemented")]
    NotImplemented(ExportFormat),

    #[error("Unknown export format: {0}")]
    UnknownFormat(String),
}

pub type Result<T> = std::result::Result<T, ConversionError>;

/// One output file produced by a converter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub name: String,
    pub content: String,
    pub mime_type: String,
    pub size: usize,
}

impl ExportFile {
    pub fn new(name: impl Into<String>, content: String, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: content.len(),
            content,
            mime_type: mime_type.into(),
        }
    }

    /// Whether the name marks a metadata sidecar; a primary file may also
    /// match when its stem ends in `.meta`
    pub fn is_sidecar(&self) -> bool {
        self.name.ends_with(SIDECAR_SUFFIX)
    }
}

/// Suffix appended to the file stem for sidecar files
pub const SIDECAR_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionMetadata {
    /// Milliseconds spent converting
    pub conversion_time: u64,
    pub format: ExportFormat,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Outcome of one conversion; `success: false` is an ordinary result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub success: bool,
    pub files: Vec<ExportFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ConversionMetadata>,
}

impl ConversionResult {
    pub fn succeeded(
        format: ExportFormat,
        files: Vec<ExportFile>,
        warnings: Vec<String>,
        started: Instant,
    ) -> Self {
        Self {
            success: true,
            files,
            metadata: Some(ConversionMetadata {
                conversion_time: elapsed_ms(started),
                format,
                warnings,
            }),
        }
    }

    pub fn failed(
        format: ExportFormat,
        fallback: Vec<ExportFile>,
        warning: impl Into<String>,
        started: Instant,
    ) -> Self {
        Self {
            success: false,
            files: fallback,
            metadata: Some(ConversionMetadata {
                conversion_time: elapsed_ms(started),
                format,
                warnings: vec![warning.into()],
            }),
        }
    }

    pub fn format(&self) -> Option<ExportFormat> {
        self.metadata.as_ref().map(|m| m.format)
    }

    pub fn warnings(&self) -> &[String] {
        self.metadata
            .as_ref()
            .map(|m| m.warnings.as_slice())
            .unwrap_or(&[])
    }

    /// Converters always emit the primary file first
    pub fn primary_file(&self) -> Option<&ExportFile> {
        self.files.first()
    }

    /// Sidecar following the primary file, if any
    pub fn sidecar_file(&self) -> Option<&ExportFile> {
        self.files.iter().skip(1).find(|f| f.is_sidecar())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// How cross-document links are written in Markdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WikiLinkStyle {
    /// `[[Target|Display]]`
    #[default]
    Wiki,
    /// `[Display](Target.md)`
    Markdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkdownSettings {
    pub wiki_link_style: WikiLinkStyle,
    /// Wrap links and tags in comments carrying their internal ids
    pub preserve_semantics: bool,
    /// Emit the sidecar as a second file when metadata is supplied
    pub include_metadata_file: bool,
    /// YAML front matter from the supplied metadata
    pub front_matter: bool,
    /// Tag fenced code blocks with their language
    pub code_block_language: bool,
    /// Sort marks into a fixed nesting order before wrapping
    pub canonical_mark_order: bool,
}

impl Default for MarkdownSettings {
    fn default() -> Self {
        Self {
            wiki_link_style: WikiLinkStyle::Wiki,
            preserve_semantics: true,
            include_metadata_file: true,
            front_matter: false,
            code_block_language: true,
            canonical_mark_order: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Auto,
    Light,
    Dark,
}

impl Theme {
    /// Static output has no viewer preference, so `auto` is light
    pub const fn resolve(self) -> Self {
        match self {
            Self::Auto | Self::Light => Self::Light,
            Self::Dark => Self::Dark,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HtmlSettings {
    /// Full document with `<head>` instead of a fragment
    pub standalone: bool,
    pub include_styles: bool,
    pub theme: Theme,
}

impl Default for HtmlSettings {
    fn default() -> Self {
        Self {
            standalone: true,
            include_styles: true,
            theme: Theme::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JsonSettings {
    pub pretty: bool,
    pub include_metadata_file: bool,
}

impl Default for JsonSettings {
    fn default() -> Self {
        Self {
            pretty: true,
            include_metadata_file: false,
        }
    }
}

/// Options for one conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConversionOptions {
    pub format: ExportFormat,
    /// Output file name without extension
    pub file_stem: String,
    pub markdown: MarkdownSettings,
    pub html: HtmlSettings,
    pub json: JsonSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self::new(ExportFormat::Markdown)
    }
}

impl ConversionOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            file_stem: "document".to_string(),
            markdown: MarkdownSettings::default(),
            html: HtmlSettings::default(),
            json: JsonSettings::default(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = stem.into();
        self
    }

    /// File name for the primary output of `format`
    pub fn file_name(&self, format: ExportFormat) -> String {
        format!("{}.{}", self.file_stem, format.extension())
    }

    pub fn sidecar_name(&self) -> String {
        format!("{}{}", self.file_stem, SIDECAR_SUFFIX)
    }
}

/// Files plus non-fatal warnings from a successful render
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub files: Vec<ExportFile>,
    pub warnings: Vec<String>,
}

/// Converter trait: render a document tree to one target format
pub trait Converter: Send + Sync {
    /// The format this converter produces
    fn format(&self) -> ExportFormat;

    /// Fallible rendering; use [`Converter::convert`] from call sites
    fn render(&self, tree: &Node, options: &ConversionOptions) -> Result<Rendered>;

    /// Render and normalize any failure into `success: false`
    fn convert(&self, tree: &Node, options: &ConversionOptions) -> ConversionResult {
        let started = Instant::now();
        let format = self.format();
        match self.render(tree, options) {
            Ok(rendered) => {
                ConversionResult::succeeded(format, rendered.files, rendered.warnings, started)
            }
            Err(e) => {
                tracing::warn!(%format, error = %e, "conversion failed");
                ConversionResult::failed(format, Vec::new(), e.to_string(), started)
            }
        }
    }
}

/// Static registry mapping each [`ExportFormat`] to its converter
#[derive(Clone)]
pub struct ConverterRegistry {
    renderer: Arc<dyn EditorRenderer>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::with_renderer(Arc::new(TiptapHtmlRenderer::new()))
    }

    /// Use a different editor renderer for HTML output
    pub fn with_renderer(renderer: Arc<dyn EditorRenderer>) -> Self {
        Self { renderer }
    }

    pub fn get(&self, format: ExportFormat) -> Box<dyn Converter> {
        match format {
            ExportFormat::Markdown => Box::new(MarkdownConverter::new()),
            ExportFormat::Html => Box::new(HtmlConverter::new(Arc::clone(&self.renderer))),
            ExportFormat::Json => Box::new(JsonConverter::new()),
            ExportFormat::PlainText => Box::new(PlainTextConverter::new()),
            ExportFormat::Pdf => Box::new(PdfStub::new(HtmlConverter::new(Arc::clone(
                &self.renderer,
            )))),
            ExportFormat::Docx => Box::new(DocxStub::new()),
        }
    }

    /// Convert with `options.format`; panics inside a converter become failures
    pub fn convert(&self, tree: &Node, options: &ConversionOptions) -> ConversionResult {
        let started = Instant::now();
        let converter = self.get(options.format);
        match catch_unwind(AssertUnwindSafe(|| converter.convert(tree, options))) {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(format = %options.format, %message, "converter panicked");
                ConversionResult::failed(
                    options.format,
                    Vec::new(),
                    format!("converter panicked: {message}"),
                    started,
                )
            }
        }
    }

    /// Convert by format name; unknown names yield a failed result
    pub fn convert_named(
        &self,
        format: &str,
        tree: &Node,
        options: &ConversionOptions,
    ) -> ConversionResult {
        match format.parse::<ExportFormat>() {
            Ok(format) => {
                let options = ConversionOptions {
                    format,
                    ..options.clone()
                };
                self.convert(tree, &options)
            }
            Err(e) => ConversionResult {
                success: false,
                files: Vec::new(),
                metadata: Some(ConversionMetadata {
                    conversion_time: 0,
                    format: options.format,
                    warnings: vec![ConversionError::UnknownFormat(e.0).to_string()],
                }),
            },
        }
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
