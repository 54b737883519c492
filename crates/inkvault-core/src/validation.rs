// SPDX-License-Identifier: AGPL-3.0-or-later
//! Structural and schema-compliance validation
//!
//! Validation never blocks export on its own. Every issue becomes a typed
//! error or warning and callers decide what to do with it; the bundled
//! export pipeline logs and proceeds.

use crate::metadata::compute_schema_snapshot;
use crate::schema::{SchemaRegistry, SchemaSnapshot};
use crate::traits::ConversionResult;
use crate::tree::{ExportFormat, Node};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Serialized size above which a document is flagged as large
pub const LARGE_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// Sidecar fields that must be present
pub const REQUIRED_METADATA_FIELDS: [&str; 6] = [
    "version",
    "schemaVersion",
    "contentId",
    "title",
    "createdAt",
    "updatedAt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    InvalidRoot,
    InvalidStructure,
    UnknownNodeType,
    UnknownMarkType,
    MissingRequiredAttribute,
    CircularReference,
    LargeDocument,
    MissingMetadataField,
    InvalidMetadata,
    SchemaVersionMismatch,
    StaleSchemaSnapshot,
    ExportFailed,
    NoFiles,
    EmptyFile,
    UnbalancedCodeFence,
    InvalidSidecar,
}

impl ValidationCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRoot => "INVALID_ROOT",
            Self::InvalidStructure => "INVALID_STRUCTURE",
            Self::UnknownNodeType => "UNKNOWN_NODE_TYPE",
            Self::UnknownMarkType => "UNKNOWN_MARK_TYPE",
            Self::MissingRequiredAttribute => "MISSING_REQUIRED_ATTRIBUTE",
            Self::CircularReference => "CIRCULAR_REFERENCE",
            Self::LargeDocument => "LARGE_DOCUMENT",
            Self::MissingMetadataField => "MISSING_METADATA_FIELD",
            Self::InvalidMetadata => "INVALID_METADATA",
            Self::SchemaVersionMismatch => "SCHEMA_VERSION_MISMATCH",
            Self::StaleSchemaSnapshot => "STALE_SCHEMA_SNAPSHOT",
            Self::ExportFailed => "EXPORT_FAILED",
            Self::NoFiles => "NO_FILES",
            Self::EmptyFile => "EMPTY_FILE",
            Self::UnbalancedCodeFence => "UNBALANCED_CODE_FENCE",
            Self::InvalidSidecar => "INVALID_SIDECAR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub code: ValidationCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Counts gathered while walking the tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub node_count: usize,
    pub mark_count: usize,
    pub max_depth: usize,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ValidationStats>,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    fn error(
        &mut self,
        code: ValidationCode,
        severity: Severity,
        message: impl Into<String>,
        context: Option<Map<String, Value>>,
    ) {
        self.errors.push(ValidationError {
            code,
            message: message.into(),
            severity,
            context,
        });
        self.valid = false;
    }

    fn warning(
        &mut self,
        code: ValidationCode,
        message: impl Into<String>,
        suggestion: Option<String>,
    ) {
        self.warnings.push(ValidationWarning {
            code,
            message: message.into(),
            suggestion,
        });
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.valid = self.errors.is_empty();
        if self.metadata.is_none() {
            self.metadata = other.metadata;
        }
    }

    pub fn has_code(&self, code: ValidationCode) -> bool {
        self.errors.iter().any(|e| e.code == code) || self.warnings.iter().any(|w| w.code == code)
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

fn context(pairs: &[(&str, Value)]) -> Option<Map<String, Value>> {
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}

/// Validator built on a [`SchemaRegistry`]
#[derive(Debug, Clone, Default)]
pub struct Validator {
    registry: SchemaRegistry,
}

impl Validator {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Validate an untyped tree as received from the editor or the store
    pub fn validate(&self, tree: &Value) -> ValidationResult {
        let mut result = ValidationResult::new();

        let Some(object) = tree.as_object() else {
            result.error(
                ValidationCode::InvalidStructure,
                Severity::Critical,
                "Document must be a JSON object",
                None,
            );
            return result;
        };
        if object.get("type").and_then(Value::as_str) != Some("doc") {
            result.error(
                ValidationCode::InvalidRoot,
                Severity::Critical,
                "Root node type must be 'doc'",
                context(&[("found", object.get("type").cloned().unwrap_or(Value::Null))]),
            );
            return result;
        }

        match serde_json::from_value::<Node>(tree.clone()) {
            Ok(node) => self.validate_tree(&node),
            Err(e) => {
                result.error(
                    ValidationCode::InvalidStructure,
                    Severity::Critical,
                    format!("Document does not match the node shape: {e}"),
                    None,
                );
                result
            }
        }
    }

    /// Validate an already-typed tree
    pub fn validate_tree(&self, tree: &Node) -> ValidationResult {
        let mut result = ValidationResult::new();

        if tree.node_type != "doc" {
            result.error(
                ValidationCode::InvalidRoot,
                Severity::Critical,
                "Root node type must be 'doc'",
                context(&[("found", Value::String(tree.node_type.clone()))]),
            );
            return result;
        }

        let schema = self.registry.current_schema();
        let mut stats = ValidationStats::default();
        let mut path: Vec<usize> = Vec::new();
        self.visit(tree, &schema, &mut path, &mut result, &mut stats);

        match serde_json::to_vec(tree) {
            Ok(bytes) => {
                stats.size_bytes = bytes.len();
                if bytes.len() > LARGE_DOCUMENT_BYTES {
                    result.warning(
                        ValidationCode::LargeDocument,
                        format!(
                            "Document is {} bytes, above the {} byte threshold",
                            bytes.len(),
                            LARGE_DOCUMENT_BYTES
                        ),
                        Some("Split the document or expect slow exports".to_string()),
                    );
                }
            }
            Err(e) => result.error(
                ValidationCode::CircularReference,
                Severity::Critical,
                format!("Document cannot be serialized: {e}"),
                None,
            ),
        }

        result.metadata = Some(stats);
        result
    }

    fn visit(
        &self,
        node: &Node,
        schema: &SchemaSnapshot,
        path: &mut Vec<usize>,
        result: &mut ValidationResult,
        stats: &mut ValidationStats,
    ) {
        stats.node_count += 1;
        stats.max_depth = stats.max_depth.max(path.len());

        if !schema.nodes.contains(&node.node_type) {
            result.warning(
                ValidationCode::UnknownNodeType,
                format!("Unknown node type '{}' at {}", node.node_type, format_path(path)),
                Some("Content will be exported without type-specific formatting".to_string()),
            );
        }

        for mark in node.marks() {
            stats.mark_count += 1;
            if !schema.marks.contains(&mark.mark_type) {
                result.warning(
                    ValidationCode::UnknownMarkType,
                    format!("Unknown mark type '{}' at {}", mark.mark_type, format_path(path)),
                    Some("The mark will be dropped by converters".to_string()),
                );
            }
        }

        for attr in node.kind().required_attrs() {
            if !node.has_attr(attr) {
                result.error(
                    ValidationCode::MissingRequiredAttribute,
                    Severity::High,
                    format!(
                        "Node '{}' at {} is missing required attribute '{attr}'",
                        node.node_type,
                        format_path(path)
                    ),
                    context(&[
                        ("nodeType", Value::String(node.node_type.clone())),
                        ("attribute", Value::String(attr.to_string())),
                        ("path", Value::String(format_path(path))),
                    ]),
                );
            }
        }

        for (i, child) in node.children().iter().enumerate() {
            path.push(i);
            self.visit(child, schema, path, result, stats);
            path.pop();
        }
    }

    /// Check a sidecar against the tree it describes
    pub fn validate_metadata(&self, metadata: &Value, tree: &Node) -> ValidationResult {
        let mut result = ValidationResult::new();

        let Some(object) = metadata.as_object() else {
            result.error(
                ValidationCode::InvalidMetadata,
                Severity::High,
                "Metadata must be a JSON object",
                None,
            );
            return result;
        };

        for field in REQUIRED_METADATA_FIELDS {
            if object.get(field).map_or(true, Value::is_null) {
                result.error(
                    ValidationCode::MissingMetadataField,
                    Severity::High,
                    format!("Metadata is missing required field '{field}'"),
                    context(&[("field", Value::String(field.to_string()))]),
                );
            }
        }

        if let Some(version) = object.get("schemaVersion").and_then(Value::as_str) {
            let current = self.registry.current_version();
            if version != current {
                result.warning(
                    ValidationCode::SchemaVersionMismatch,
                    format!("Metadata schema version {version} differs from current {current}"),
                    Some("Run migrations before exporting".to_string()),
                );
            }
        }

        if let Some(declared) = object.get("schema").filter(|s| !s.is_null()) {
            let declared: SchemaSnapshot =
                match serde_json::from_value(declared.clone()) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        result.error(
                            ValidationCode::InvalidMetadata,
                            Severity::Medium,
                            format!("Metadata schema snapshot is malformed: {e}"),
                            None,
                        );
                        return result;
                    }
                };
            let actual = compute_schema_snapshot(tree);
            for node_type in actual.nodes.difference(&declared.nodes) {
                result.warning(
                    ValidationCode::StaleSchemaSnapshot,
                    format!("Node type '{node_type}' is used but missing from the metadata schema"),
                    Some("Regenerate the sidecar".to_string()),
                );
            }
            for mark_type in actual.marks.difference(&declared.marks) {
                result.warning(
                    ValidationCode::StaleSchemaSnapshot,
                    format!("Mark type '{mark_type}' is used but missing from the metadata schema"),
                    Some("Regenerate the sidecar".to_string()),
                );
            }
        }

        result
    }

    /// Sanity-check converter output
    pub fn validate_export_result(&self, export: &ConversionResult) -> ValidationResult {
        let mut result = ValidationResult::new();

        if !export.success {
            result.error(
                ValidationCode::ExportFailed,
                Severity::High,
                format!("Conversion reported failure: {}", export.warnings().join("; ")),
                None,
            );
        }
        if export.files.is_empty() {
            result.error(
                ValidationCode::NoFiles,
                Severity::High,
                "Conversion produced no files",
                None,
            );
            return result;
        }

        let format = export.format();
        for (index, file) in export.files.iter().enumerate() {
            if file.content.is_empty() {
                result.error(
                    ValidationCode::EmptyFile,
                    Severity::Medium,
                    format!("File '{}' is empty", file.name),
                    context(&[("file", Value::String(file.name.clone()))]),
                );
                continue;
            }

            if index > 0 && file.is_sidecar() {
                match serde_json::from_str::<Value>(&file.content) {
                    Ok(value) if value.get("version").is_some() => {}
                    Ok(_) => result.error(
                        ValidationCode::InvalidSidecar,
                        Severity::Medium,
                        format!("Sidecar '{}' has no version field", file.name),
                        None,
                    ),
                    Err(e) => result.error(
                        ValidationCode::InvalidSidecar,
                        Severity::Medium,
                        format!("Sidecar '{}' is not valid JSON: {e}", file.name),
                        None,
                    ),
                }
            } else if format == Some(ExportFormat::Markdown) {
                if let Some(line) = unclosed_fence(&file.content) {
                    result.error(
                        ValidationCode::UnbalancedCodeFence,
                        Severity::Medium,
                        format!(
                            "File '{}' leaves the code fence opened on line {line} unclosed",
                            file.name
                        ),
                        None,
                    );
                }
            } else if format == Some(ExportFormat::Json)
                && serde_json::from_str::<Value>(&file.content).is_err()
            {
                result.error(
                    ValidationCode::InvalidStructure,
                    Severity::High,
                    format!("File '{}' is not valid JSON", file.name),
                    None,
                );
            }
        }

        result
    }

    /// Tree and metadata checks combined; used as a non-blocking gate
    pub fn validate_before_export(&self, tree: &Node, metadata: &Value) -> ValidationResult {
        let mut result = self.validate_tree(tree);
        result.merge(self.validate_metadata(metadata, tree));
        result
    }
}

fn format_path(path: &[usize]) -> String {
    if path.is_empty() {
        return "root".to_string();
    }
    path.iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Line (1-based) of a code fence still open at the end of `markdown`.
///
/// A fence closes only on a run of the same character at least as long as
/// the opener with nothing after it. Quote markers and indentation are
/// ignored.
fn unclosed_fence(markdown: &str) -> Option<usize> {
    let mut open: Option<(usize, char, usize)> = None;
    for (index, line) in markdown.lines().enumerate() {
        let trimmed = line.trim_start_matches([' ', '\t', '>']);
        let Some(ch) = trimmed.chars().next().filter(|c| *c == '`' || *c == '~') else {
            continue;
        };
        let run = trimmed.chars().take_while(|c| *c == ch).count();
        if run < 3 {
            continue;
        }
        match open {
            None => open = Some((index + 1, ch, run)),
            Some((_, open_ch, open_run))
                if ch == open_ch && run >= open_run && trimmed[run..].trim().is_empty() =>
            {
                open = None
            }
            Some(_) => {}
        }
    }
    open.map(|(line, _, _)| line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{compose_metadata, RecordInfo};
    use crate::traits::{ConversionOptions, ConverterRegistry, ExportFile};
    use crate::tree::{Mark, MarkKind, NodeKind};
    use serde_json::json;

    fn validator() -> Validator {
        Validator::default()
    }

    #[test]
    fn test_non_object_is_invalid_structure() {
        let result = validator().validate(&json!([1, 2]));
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, ValidationCode::InvalidStructure);
        assert_eq!(result.errors[0].severity, Severity::Critical);
    }

    #[test]
    fn test_wrong_root_short_circuits() {
        let result = validator().validate(&json!({
            "type": "paragraph",
            "content": [{"type": "heading"}]
        }));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, ValidationCode::InvalidRoot);
    }

    #[test]
    fn test_heading_without_level() {
        let result = validator().validate(&json!({
            "type": "doc",
            "content": [{"type": "heading", "content": [{"type": "text", "text": "x"}]}]
        }));
        assert!(!result.valid);
        let error = &result.errors[0];
        assert_eq!(error.code, ValidationCode::MissingRequiredAttribute);
        assert_eq!(error.severity, Severity::High);
        assert_eq!(error.context.as_ref().unwrap()["path"], "0");
    }

    #[test]
    fn test_unknown_types_warn_only() {
        let tree = Node::doc().with_child(
            Node::new("mermaid").with_child(Node::text("x").with_mark(Mark::new("sparkle"))),
        );
        let result = validator().validate_tree(&tree);
        assert!(result.valid);
        assert!(result.has_code(ValidationCode::UnknownNodeType));
        assert!(result.has_code(ValidationCode::UnknownMarkType));
        let stats = result.metadata.unwrap();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.mark_count, 1);
        assert_eq!(stats.max_depth, 2);
    }

    fn doc_with_text_len(len: usize) -> Node {
        Node::doc().with_child(Node::new("paragraph").with_child(Node::text("a".repeat(len))))
    }

    #[test]
    fn test_large_document_threshold() {
        let result = validator().validate_tree(&doc_with_text_len(LARGE_DOCUMENT_BYTES));
        assert!(result.valid);
        assert!(result.has_code(ValidationCode::LargeDocument));
        let size = result.metadata.as_ref().unwrap().size_bytes;
        assert!(size > LARGE_DOCUMENT_BYTES);
        assert!(result.errors.is_empty());

        let result = validator().validate_tree(&doc_with_text_len(LARGE_DOCUMENT_BYTES - 1024));
        assert!(result.valid);
        assert!(!result.has_code(ValidationCode::LargeDocument));
        let size = result.metadata.as_ref().unwrap().size_bytes;
        assert!(size > LARGE_DOCUMENT_BYTES - 1024 && size <= LARGE_DOCUMENT_BYTES);
    }

    #[test]
    fn test_registered_types_produce_no_unknown_warnings() {
        let mut children = Vec::new();
        for kind in NodeKind::KNOWN {
            let name = kind.type_name().unwrap();
            let mut node = Node::new(name);
            for attr in kind.required_attrs() {
                node = node.with_attr(*attr, "x");
            }
            children.push(node);
        }
        let mut text = Node::text("t");
        for mark in MarkKind::KNOWN {
            text = text.with_mark(Mark::new(mark.type_name().unwrap()));
        }
        children.push(text);

        let result = validator().validate_tree(&Node::doc().with_children(children));
        assert!(result.valid, "{:?}", result.errors);
        assert!(!result.has_code(ValidationCode::UnknownNodeType));
        assert!(!result.has_code(ValidationCode::UnknownMarkType));
    }

    #[test]
    fn test_metadata_checks() {
        let tree = Node::doc().with_child(
            Node::new("paragraph").with_child(Node::text("x").with_mark(Mark::new("bold"))),
        );
        let record = RecordInfo {
            content_id: "d1",
            title: "T",
            created_at: "c",
            updated_at: "u",
            schema_version: Some("1.0.0"),
            tags: Vec::new(),
        };
        let mut meta = serde_json::to_value(compose_metadata(&record, &Node::doc())).unwrap();
        meta.as_object_mut().unwrap().remove("title");

        let result = validator().validate_metadata(&meta, &tree);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, ValidationCode::MissingMetadataField);
        assert!(result.has_code(ValidationCode::SchemaVersionMismatch));
        let stale: Vec<_> = result
            .warnings
            .iter()
            .filter(|w| w.code == ValidationCode::StaleSchemaSnapshot)
            .collect();
        // paragraph, text and bold were not in the snapshot of an empty doc
        assert_eq!(stale.len(), 3);
    }

    #[test]
    fn test_export_result_checks() {
        let tree = Node::doc().with_child(
            Node::new("codeBlock")
                .with_attr("language", "sh")
                .with_child(Node::text("ls")),
        );
        let registry = ConverterRegistry::new();
        let good = registry.convert(&tree, &ConversionOptions::default());
        assert!(validator().validate_export_result(&good).is_clean());

        let mut broken = good.clone();
        broken.files[0] = ExportFile::new("document.md", "```\nopen".into(), "text/markdown");
        broken.files.push(ExportFile::new("document.meta.json", "{}".into(), "application/json"));
        let result = validator().validate_export_result(&broken);
        assert!(result.has_code(ValidationCode::UnbalancedCodeFence));
        assert!(result.has_code(ValidationCode::InvalidSidecar));

        let nested = Node::doc().with_child(
            Node::new("codeBlock")
                .with_attr("language", "md")
                .with_child(Node::text("```\ninner")),
        );
        let nested = registry.convert(&nested, &ConversionOptions::default());
        assert!(validator().validate_export_result(&nested).is_clean());

        let docx = registry.convert(&tree, &ConversionOptions::new(ExportFormat::Docx));
        let result = validator().validate_export_result(&docx);
        assert!(result.has_code(ValidationCode::ExportFailed));
        assert!(result.has_code(ValidationCode::NoFiles));
    }

    #[test]
    fn test_unclosed_fence_follows_fence_length() {
        assert_eq!(unclosed_fence("```\nopen"), Some(1));
        assert_eq!(unclosed_fence("````md\n```\ninner\n````"), None);
        assert_eq!(unclosed_fence("````\n```\nstill open"), Some(1));
        assert_eq!(unclosed_fence("text\n> ```sh\n> ls\n> ```"), None);
        assert_eq!(unclosed_fence("~~~\n```\n~~~\n```"), Some(4));
    }

    #[test]
    fn test_validate_before_export_merges() {
        let tree = Node::doc().with_child(Node::new("heading"));
        let result = validator().validate_before_export(&tree, &json!({}));
        assert!(!result.valid);
        assert_eq!(
            result.errors.len(),
            1 + REQUIRED_METADATA_FIELDS.len()
        );
    }
}
