// SPDX-License-Identifier: AGPL-3.0-or-later
//! Plain text converter

use crate::traits::{ConversionOptions, Converter, ExportFile, Rendered, Result};
use crate::tree::{ExportFormat, Node, NodeKind};

/// Plain text converter: leaf text only, blocks separated by line breaks
pub struct PlainTextConverter;

impl PlainTextConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for PlainTextConverter {
    fn format(&self) -> ExportFormat {
        ExportFormat::PlainText
    }

    fn render(&self, tree: &Node, options: &ConversionOptions) -> Result<Rendered> {
        let mut output = String::new();
        render_node(&mut output, tree);

        Ok(Rendered {
            files: vec![ExportFile::new(
                options.file_name(ExportFormat::PlainText),
                output,
                ExportFormat::PlainText.mime_type(),
            )],
            warnings: Vec::new(),
        })
    }
}

fn render_node(output: &mut String, node: &Node) {
    let kind = node.kind();
    match kind {
        NodeKind::Text | NodeKind::Other => {
            if let Some(text) = &node.text {
                output.push_str(text);
            }
        }
        NodeKind::HardBreak => output.push('\n'),
        NodeKind::WikiLink => {
            let label = node
                .attr_str("displayText")
                .filter(|d| !d.is_empty())
                .or_else(|| node.attr_str("targetTitle"));
            output.push_str(&label.unwrap_or_default());
        }
        NodeKind::Tag => output.push_str(&node.attr_str("tagName").unwrap_or_default()),
        NodeKind::Image => output.push_str(&node.attr_str("alt").unwrap_or_default()),
        NodeKind::Doc
        | NodeKind::Paragraph
        | NodeKind::Heading
        | NodeKind::BulletList
        | NodeKind::OrderedList
        | NodeKind::ListItem
        | NodeKind::TaskList
        | NodeKind::TaskItem
        | NodeKind::CodeBlock
        | NodeKind::Blockquote
        | NodeKind::HorizontalRule
        | NodeKind::Table
        | NodeKind::TableRow
        | NodeKind::TableHeader
        | NodeKind::TableCell
        | NodeKind::Callout => {}
    }

    for child in node.children() {
        render_node(output, child);
    }

    if is_block(kind) {
        output.push('\n');
    }
    if matches!(kind, NodeKind::Heading | NodeKind::Paragraph) {
        output.push('\n');
    }
}

/// Node kinds followed by a line break
const fn is_block(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Paragraph
            | NodeKind::Heading
            | NodeKind::CodeBlock
            | NodeKind::Blockquote
            | NodeKind::ListItem
            | NodeKind::TaskItem
            | NodeKind::TableRow
            | NodeKind::Callout
            | NodeKind::HorizontalRule
    )
}
