// SPDX-License-Identifier: AGPL-3.0-or-later
//! Export configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! batch_size = 20
//! format = "html"
//! layout = "flat"
//! naming = "title"
//!
//! [html]
//! theme = "dark"
//! ```

use crate::error::ConfigError;
use inkvault_core::metadata::DocumentMetadata;
use inkvault_core::monitor::DEFAULT_CAPACITY;
use inkvault_core::traits::{ConversionOptions, HtmlSettings, JsonSettings, MarkdownSettings};
use inkvault_core::tree::ExportFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const SUMMARY_FILE_NAME: &str = "EXPORT_SUMMARY.md";

/// Where documents land inside the archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Mirror the folder tree from the root
    #[default]
    Hierarchical,
    Flat,
}

/// How each document's file stem is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStrategy {
    /// Slug of the title
    #[default]
    Segment,
    /// Title with path-unsafe characters replaced
    Title,
    /// Document id
    Id,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub batch_size: usize,
    pub format: ExportFormat,
    pub layout: Layout,
    pub naming: NamingStrategy,
    /// Write a sidecar next to every document
    pub include_metadata: bool,
    pub summary_file: String,
    pub monitor_capacity: usize,
    pub markdown: MarkdownSettings,
    pub html: HtmlSettings,
    pub json: JsonSettings,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            format: ExportFormat::Markdown,
            layout: Layout::Hierarchical,
            naming: NamingStrategy::Segment,
            include_metadata: true,
            summary_file: SUMMARY_FILE_NAME.to_string(),
            monitor_capacity: DEFAULT_CAPACITY,
            markdown: MarkdownSettings::default(),
            html: HtmlSettings::default(),
            json: JsonSettings::default(),
        }
    }
}

impl ExportConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "loaded export config");
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.summary_file.trim().is_empty() || self.summary_file.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "summary_file must be a bare file name, got {:?}",
                self.summary_file
            )));
        }
        Ok(())
    }

    /// Per-document conversion options
    pub fn conversion_options(
        &self,
        format: ExportFormat,
        file_stem: &str,
        metadata: Option<DocumentMetadata>,
    ) -> ConversionOptions {
        let mut options = ConversionOptions::new(format).with_file_stem(file_stem);
        options.markdown = self.markdown.clone();
        options.markdown.include_metadata_file = self.include_metadata;
        options.html = self.html.clone();
        options.json = self.json.clone();
        options.json.include_metadata_file = self.include_metadata;
        options.metadata = metadata;
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkvault_core::traits::{Theme, WikiLinkStyle};
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ExportConfig::from_toml_str("").unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.format, ExportFormat::Markdown);
        assert_eq!(config.layout, Layout::Hierarchical);
        assert_eq!(config.summary_file, SUMMARY_FILE_NAME);
    }

    #[test]
    fn test_parse_full_config() {
        let config = ExportConfig::from_toml_str(
            r#"
            batch_size = 3
            format = "html"
            layout = "flat"
            naming = "id"
            include_metadata = false

            [markdown]
            wikiLinkStyle = "markdown"

            [html]
            theme = "dark"
            "#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.format, ExportFormat::Html);
        assert_eq!(config.layout, Layout::Flat);
        assert_eq!(config.naming, NamingStrategy::Id);
        assert_eq!(config.markdown.wiki_link_style, WikiLinkStyle::Markdown);
        assert_eq!(config.html.theme, Theme::Dark);
        assert!(config.html.standalone);

        let options = config.conversion_options(ExportFormat::Markdown, "x", None);
        assert!(!options.markdown.include_metadata_file);
        assert_eq!(options.file_stem, "x");
    }

    #[test]
    fn test_rejects_zero_batch() {
        assert!(matches!(
            ExportConfig::from_toml_str("batch_size = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ExportConfig::from_toml_str("format = \"epub\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "format = \"json\"\nsummary_file = \"README.md\"").unwrap();
        let config = ExportConfig::load(file.path()).unwrap();
        assert_eq!(config.format, ExportFormat::Json);
        assert_eq!(config.summary_file, "README.md");
    }
}
