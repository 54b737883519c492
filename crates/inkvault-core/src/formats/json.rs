// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lossless JSON converter
//!
//! Output deserializes back to a tree equal to the input.

use crate::traits::{ConversionOptions, Converter, ExportFile, Rendered, Result};
use crate::tree::{ExportFormat, Node};

pub struct JsonConverter;

impl JsonConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for JsonConverter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }

    fn render(&self, tree: &Node, options: &ConversionOptions) -> Result<Rendered> {
        let content = if options.json.pretty {
            serde_json::to_string_pretty(tree)?
        } else {
            serde_json::to_string(tree)?
        };

        let mut files = vec![ExportFile::new(
            options.file_name(ExportFormat::Json),
            content,
            ExportFormat::Json.mime_type(),
        )];
        if options.json.include_metadata_file {
            if let Some(meta) = &options.metadata {
                files.push(ExportFile::new(
                    options.sidecar_name(),
                    serde_json::to_string_pretty(meta)?,
                    ExportFormat::Json.mime_type(),
                ));
            }
        }

        Ok(Rendered {
            files,
            warnings: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preserves_unknown_types_and_attr_order() {
        let input = json!({
            "type": "doc",
            "content": [
                {"type": "mermaid", "attrs": {"zeta": 1, "alpha": [1, 2]}, "content": [
                    {"type": "text", "text": "graph", "marks": [{"type": "sparkle"}]}
                ]}
            ]
        });
        let tree: Node = serde_json::from_value(input).unwrap();
        let result = JsonConverter::new().convert(&tree, &ConversionOptions::new(ExportFormat::Json));
        assert!(result.success);

        let content = &result.files[0].content;
        assert!(content.find("zeta").unwrap() < content.find("alpha").unwrap());
        let back: Node = serde_json::from_str(content).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_compact_output() {
        let mut options = ConversionOptions::new(ExportFormat::Json);
        options.json.pretty = false;
        let result = JsonConverter::new().convert(&Node::doc(), &options);
        assert_eq!(result.files[0].content, r#"{"type":"doc"}"#);
        assert_eq!(result.files[0].name, "document.json");
    }
}
