// SPDX-License-Identifier: AGPL-3.0-or-later
//! Canonical document tree
//!
//! Documents arrive from the editor as a JSON tree rooted at a `doc` node.
//! The wire shape is kept verbatim in [`Node`] so lossless export can
//! reproduce it, while [`NodeKind`] and [`MarkKind`] give converters a closed
//! set of variants to match on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use unicode_segmentation::UnicodeSegmentation;

/// Attribute map carried by nodes and marks (insertion order preserved)
pub type Attrs = Map<String, Value>;

/// Export target identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Html,
    Json,
    PlainText,
    Pdf,
    Docx,
}

impl ExportFormat {
    /// File extension for this format
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Html => "html",
            Self::Json => "json",
            Self::PlainText => "txt",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    /// Short display name
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Markdown => "MD",
            Self::Html => "HTML",
            Self::Json => "JSON",
            Self::PlainText => "TXT",
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
        }
    }

    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
            Self::Json => "application/json",
            Self::PlainText => "text/plain",
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    /// Whether a real converter exists for this format
    pub const fn is_implemented(&self) -> bool {
        !matches!(self, Self::Pdf | Self::Docx)
    }

    /// All formats in menu order
    pub const ALL: [Self; 6] = [
        Self::Markdown,
        Self::Html,
        Self::Json,
        Self::PlainText,
        Self::Pdf,
        Self::Docx,
    ];
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Returned when a format name does not name any [`ExportFormat`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown export format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for ExportFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "html" | "htm" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            "plaintext" | "plain" | "text" | "txt" => Ok(Self::PlainText),
            "pdf" => Ok(Self::Pdf),
            "docx" | "word" => Ok(Self::Docx),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

/// A node in the document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Attrs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<Vec<Mark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Node {
    /// Create an empty container of the given type
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            attrs: None,
            marks: None,
            content: None,
            text: None,
        }
    }

    /// Create an empty `doc` root
    pub fn doc() -> Self {
        Self::new("doc")
    }

    /// Create a text leaf
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new("text")
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.marks.get_or_insert_with(Vec::new).push(mark);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.content.get_or_insert_with(Vec::new).push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.content.get_or_insert_with(Vec::new).extend(children);
        self
    }

    /// Resolve the wire type name to a [`NodeKind`]
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_type_name(&self.node_type)
    }

    /// Children, or an empty slice for leaves
    pub fn children(&self) -> &[Node] {
        self.content.as_deref().unwrap_or(&[])
    }

    pub fn marks(&self) -> &[Mark] {
        self.marks.as_deref().unwrap_or(&[])
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.as_ref().and_then(|a| a.get(key))
    }

    /// String attribute; numbers and booleans are stringified
    pub fn attr_str(&self, key: &str) -> Option<String> {
        match self.attr(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        match self.attr(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Whether the attribute exists and is not null
    pub fn has_attr(&self, key: &str) -> bool {
        self.attr(key).is_some_and(|v| !v.is_null())
    }

    /// Pre-order traversal with depth (root is depth 0)
    pub fn walk<'a, F>(&'a self, visit: &mut F)
    where
        F: FnMut(&'a Node, usize),
    {
        fn go<'a, F: FnMut(&'a Node, usize)>(node: &'a Node, depth: usize, visit: &mut F) {
            visit(node, depth);
            for child in node.children() {
                go(child, depth + 1, visit);
            }
        }
        go(self, 0, visit);
    }

    /// Concatenated text of all leaves under this node
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.walk(&mut |node, _| {
            if let Some(text) = &node.text {
                out.push_str(text);
            }
        });
        out
    }

    /// Count nodes in the subtree, including self
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_, _| count += 1);
        count
    }

    /// Count words across all text leaves
    pub fn word_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |node, _| {
            if let Some(text) = &node.text {
                count += text.unicode_words().count();
            }
        });
        count
    }
}

/// Inline annotation on a text leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub mark_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Attrs>,
}

impl Mark {
    pub fn new(mark_type: impl Into<String>) -> Self {
        Self {
            mark_type: mark_type.into(),
            attrs: None,
        }
    }

    /// A `link` mark pointing at `href`
    pub fn link(href: impl Into<String>) -> Self {
        let mut attrs = Map::new();
        attrs.insert("href".to_string(), Value::String(href.into()));
        Self {
            mark_type: "link".to_string(),
            attrs: Some(attrs),
        }
    }

    pub fn kind(&self) -> MarkKind {
        MarkKind::from_type_name(&self.mark_type)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.as_ref()?.get(key)?.as_str()
    }
}

/// Closed set of node kinds the converters understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Doc,
    Paragraph,
    Text,
    Heading,
    BulletList,
    OrderedList,
    ListItem,
    TaskList,
    TaskItem,
    CodeBlock,
    Blockquote,
    HorizontalRule,
    HardBreak,
    Image,
    Table,
    TableRow,
    TableHeader,
    TableCell,
    WikiLink,
    Tag,
    Callout,
    /// A type name outside the registered catalog
    Other,
}

impl NodeKind {
    pub const KNOWN: [Self; 21] = [
        Self::Doc,
        Self::Paragraph,
        Self::Text,
        Self::Heading,
        Self::BulletList,
        Self::OrderedList,
        Self::ListItem,
        Self::TaskList,
        Self::TaskItem,
        Self::CodeBlock,
        Self::Blockquote,
        Self::HorizontalRule,
        Self::HardBreak,
        Self::Image,
        Self::Table,
        Self::TableRow,
        Self::TableHeader,
        Self::TableCell,
        Self::WikiLink,
        Self::Tag,
        Self::Callout,
    ];

    pub fn from_type_name(name: &str) -> Self {
        match name {
            "doc" => Self::Doc,
            "paragraph" => Self::Paragraph,
            "text" => Self::Text,
            "heading" => Self::Heading,
            "bulletList" => Self::BulletList,
            "orderedList" => Self::OrderedList,
            "listItem" => Self::ListItem,
            "taskList" => Self::TaskList,
            "taskItem" => Self::TaskItem,
            "codeBlock" => Self::CodeBlock,
            "blockquote" => Self::Blockquote,
            "horizontalRule" => Self::HorizontalRule,
            "hardBreak" => Self::HardBreak,
            "image" => Self::Image,
            "table" => Self::Table,
            "tableRow" => Self::TableRow,
            "tableHeader" => Self::TableHeader,
            "tableCell" => Self::TableCell,
            "wikiLink" => Self::WikiLink,
            "tag" => Self::Tag,
            "callout" => Self::Callout,
            _ => Self::Other,
        }
    }

    /// Wire type name (`None` for [`NodeKind::Other`])
    pub const fn type_name(&self) -> Option<&'static str> {
        Some(match self {
            Self::Doc => "doc",
            Self::Paragraph => "paragraph",
            Self::Text => "text",
            Self::Heading => "heading",
            Self::BulletList => "bulletList",
            Self::OrderedList => "orderedList",
            Self::ListItem => "listItem",
            Self::TaskList => "taskList",
            Self::TaskItem => "taskItem",
            Self::CodeBlock => "codeBlock",
            Self::Blockquote => "blockquote",
            Self::HorizontalRule => "horizontalRule",
            Self::HardBreak => "hardBreak",
            Self::Image => "image",
            Self::Table => "table",
            Self::TableRow => "tableRow",
            Self::TableHeader => "tableHeader",
            Self::TableCell => "tableCell",
            Self::WikiLink => "wikiLink",
            Self::Tag => "tag",
            Self::Callout => "callout",
            Self::Other => return None,
        })
    }

    /// Attributes a node of this kind must carry
    pub const fn required_attrs(&self) -> &'static [&'static str] {
        match self {
            Self::Heading => &["level"],
            Self::CodeBlock => &["language"],
            Self::WikiLink => &["targetTitle"],
            Self::Tag => &["tagId", "tagName"],
            Self::Callout => &["type"],
            _ => &[],
        }
    }

    pub const fn is_list(&self) -> bool {
        matches!(self, Self::BulletList | Self::OrderedList | Self::TaskList)
    }
}

/// Closed set of mark kinds the converters understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarkKind {
    // Declaration order is the canonical nesting order, innermost first.
    Code,
    Bold,
    Italic,
    Strike,
    Underline,
    Highlight,
    Link,
    Other,
}

impl MarkKind {
    pub const KNOWN: [Self; 7] = [
        Self::Code,
        Self::Bold,
        Self::Italic,
        Self::Strike,
        Self::Underline,
        Self::Highlight,
        Self::Link,
    ];

    pub fn from_type_name(name: &str) -> Self {
        match name {
            "bold" => Self::Bold,
            "italic" => Self::Italic,
            "code" => Self::Code,
            "strike" => Self::Strike,
            "underline" => Self::Underline,
            "highlight" => Self::Highlight,
            "link" => Self::Link,
            _ => Self::Other,
        }
    }

    pub const fn type_name(&self) -> Option<&'static str> {
        Some(match self {
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Code => "code",
            Self::Strike => "strike",
            Self::Underline => "underline",
            Self::Highlight => "highlight",
            Self::Link => "link",
            Self::Other => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_from_json() {
        let node: Node = serde_json::from_value(json!({
            "type": "doc",
            "content": [
                {"type": "heading", "attrs": {"level": 2}, "content": [{"type": "text", "text": "Hi"}]}
            ]
        }))
        .unwrap();

        assert_eq!(node.kind(), NodeKind::Doc);
        assert_eq!(node.children()[0].kind(), NodeKind::Heading);
        assert_eq!(node.children()[0].attr_u64("level"), Some(2));
        assert_eq!(node.text_content(), "Hi");
    }

    #[test]
    fn test_unknown_type_is_other() {
        assert_eq!(NodeKind::from_type_name("mermaid"), NodeKind::Other);
        assert_eq!(MarkKind::from_type_name("sparkle"), MarkKind::Other);
        assert_eq!(NodeKind::Other.type_name(), None);
    }

    #[test]
    fn test_known_kinds_round_trip_names() {
        for kind in NodeKind::KNOWN {
            let name = kind.type_name().unwrap();
            assert_eq!(NodeKind::from_type_name(name), kind);
        }
        for kind in MarkKind::KNOWN {
            let name = kind.type_name().unwrap();
            assert_eq!(MarkKind::from_type_name(name), kind);
        }
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("md".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert_eq!(" HTML ".parse::<ExportFormat>(), Ok(ExportFormat::Html));
        assert!("epub".parse::<ExportFormat>().is_err());
        for format in ExportFormat::ALL {
            assert_eq!(format.extension().parse::<ExportFormat>(), Ok(format));
        }
    }

    #[test]
    fn test_word_and_node_count() {
        let doc = Node::doc().with_child(
            Node::new("paragraph")
                .with_child(Node::text("Hello world"))
                .with_child(Node::text(" again")),
        );
        assert_eq!(doc.node_count(), 4);
        assert_eq!(doc.word_count(), 3);
    }

    #[test]
    fn test_attr_order_preserved() {
        let node = Node::new("tag")
            .with_attr("tagName", "work")
            .with_attr("tagId", "t1")
            .with_attr("color", "#ff0000");
        let keys: Vec<_> = node.attrs.as_ref().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["tagName", "tagId", "color"]);
    }
}
