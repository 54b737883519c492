// SPDX-License-Identifier: AGPL-3.0-or-later
//! Placeholder converters for formats without a renderer yet
//!
//! Both always report `success: false`. PDF hands back the standalone HTML
//! so the user still gets a printable file; DOCX returns nothing.

use crate::traits::{
    ConversionError, ConversionOptions, ConversionResult, Converter, Rendered, Result,
};
use crate::tree::{ExportFormat, Node};
use std::time::Instant;

use super::HtmlConverter;

pub struct PdfStub {
    html: HtmlConverter,
}

impl PdfStub {
    pub fn new(html: HtmlConverter) -> Self {
        Self { html }
    }
}

impl Converter for PdfStub {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn render(&self, _tree: &Node, _options: &ConversionOptions) -> Result<Rendered> {
        Err(ConversionError::NotImplemented(ExportFormat::Pdf))
    }

    fn convert(&self, tree: &Node, options: &ConversionOptions) -> ConversionResult {
        let started = Instant::now();
        let mut html_options = options.clone();
        html_options.format = ExportFormat::Html;
        html_options.html.standalone = true;

        let fallback = match self.html.render(tree, &html_options) {
            Ok(rendered) => rendered.files,
            Err(e) => {
                tracing::debug!(error = %e, "HTML fallback for PDF export failed");
                Vec::new()
            }
        };
        ConversionResult::failed(
            ExportFormat::Pdf,
            fallback,
            format!(
                "{}; standalone HTML provided as fallback",
                ConversionError::NotImplemented(ExportFormat::Pdf)
            ),
            started,
        )
    }
}

pub struct DocxStub;

impl DocxStub {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxStub {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for DocxStub {
    fn format(&self) -> ExportFormat {
        ExportFormat::Docx
    }

    fn render(&self, _tree: &Node, _options: &ConversionOptions) -> Result<Rendered> {
        Err(ConversionError::NotImplemented(ExportFormat::Docx))
    }
}
