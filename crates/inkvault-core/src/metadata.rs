// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sidecar metadata extraction
//!
//! Pure functions over a document tree that recover the semantic information
//! target formats cannot carry natively: cross-document links, callouts, tag
//! annotations and the document-local schema snapshot.

use crate::schema::{SchemaSnapshot, CURRENT_SCHEMA_VERSION};
use crate::tree::{Node, NodeKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version of the sidecar file layout
pub const SIDECAR_VERSION: &str = "1.0";

/// Key under `custom` holding inline tag annotations
pub const INLINE_TAGS_KEY: &str = "inlineTags";

/// Sidecar written next to exported documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub version: String,
    pub schema_version: String,
    pub content_id: String,
    pub title: String,
    pub slug: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub tags: Vec<TagRef>,
    #[serde(default)]
    pub wiki_links: Vec<WikiLinkRef>,
    #[serde(default)]
    pub callouts: Vec<CalloutRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaSnapshot>,
    #[serde(default)]
    pub custom: Map<String, Value>,
}

/// A tag, either attached to the record or annotated inline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRef {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiLinkRef {
    pub target_title: String,
    pub display_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalloutRef {
    #[serde(rename = "type")]
    pub callout_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Pre-order index over every node, not only callouts
    pub position: usize,
}

/// Record-level fields supplied by the persistence layer
#[derive(Debug, Clone, Default)]
pub struct RecordInfo<'a> {
    pub content_id: &'a str,
    pub title: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
    pub schema_version: Option<&'a str>,
    /// Tags associated with the record, distinct from inline annotations
    pub tags: Vec<TagRef>,
}

/// Cross-document links in document order
pub fn extract_wiki_links(tree: &Node) -> Vec<WikiLinkRef> {
    let mut links = Vec::new();
    tree.walk(&mut |node, _| {
        if node.kind() != NodeKind::WikiLink {
            return;
        }
        let Some(target_title) = node.attr_str("targetTitle") else {
            return;
        };
        let display_text = node
            .attr_str("displayText")
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| target_title.clone());
        links.push(WikiLinkRef {
            target_title,
            display_text,
            target_id: node.attr_str("targetId"),
        });
    });
    links
}

/// Callouts with their pre-order position
pub fn extract_callouts(tree: &Node) -> Vec<CalloutRef> {
    let mut callouts = Vec::new();
    let mut position = 0usize;
    tree.walk(&mut |node, _| {
        if node.kind() == NodeKind::Callout {
            callouts.push(CalloutRef {
                callout_type: node.attr_str("type").unwrap_or_else(|| "note".to_string()),
                title: node.attr_str("title").filter(|t| !t.is_empty()),
                position,
            });
        }
        position += 1;
    });
    callouts
}

/// Inline tag annotations, deduplicated by id in first-seen order
pub fn extract_tags(tree: &Node) -> Vec<TagRef> {
    let mut tags: Vec<TagRef> = Vec::new();
    tree.walk(&mut |node, _| {
        if node.kind() != NodeKind::Tag {
            return;
        }
        let (Some(id), Some(name)) = (node.attr_str("tagId"), node.attr_str("tagName")) else {
            return;
        };
        if tags.iter().any(|t| t.id == id) {
            return;
        }
        tags.push(TagRef {
            id,
            name,
            color: node.attr_str("color"),
        });
    });
    tags
}

/// Node/mark types actually present, plus inferred capabilities
pub fn compute_schema_snapshot(tree: &Node) -> SchemaSnapshot {
    let mut snapshot = SchemaSnapshot::default();
    tree.walk(&mut |node, _| {
        snapshot.nodes.insert(node.node_type.clone());
        for mark in node.marks() {
            snapshot.marks.insert(mark.mark_type.clone());
        }
    });

    let capabilities = [
        ("wikiLink", "wikiLinks"),
        ("tag", "tags"),
        ("callout", "callouts"),
        ("table", "tables"),
        ("taskList", "taskLists"),
        ("codeBlock", "codeBlocks"),
        ("image", "images"),
    ];
    snapshot.extensions = capabilities
        .iter()
        .filter(|(marker, _)| snapshot.nodes.contains(*marker))
        .map(|(_, capability)| capability.to_string())
        .collect();
    snapshot
}

/// URL-safe lowercase slug; empty titles yield "untitled"
pub fn slugify(title: &str) -> String {
    let slug = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Build the full sidecar for one record and its tree
pub fn compose_metadata(record: &RecordInfo<'_>, tree: &Node) -> DocumentMetadata {
    let mut custom = Map::new();
    let inline_tags: Vec<Value> = extract_tags(tree)
        .iter()
        .filter_map(|tag| serde_json::to_value(tag).ok())
        .collect();
    if !inline_tags.is_empty() {
        custom.insert(INLINE_TAGS_KEY.to_string(), Value::Array(inline_tags));
    }

    DocumentMetadata {
        version: SIDECAR_VERSION.to_string(),
        schema_version: record
            .schema_version
            .unwrap_or(CURRENT_SCHEMA_VERSION)
            .to_string(),
        content_id: record.content_id.to_string(),
        title: record.title.to_string(),
        slug: slugify(record.title),
        created_at: record.created_at.to_string(),
        updated_at: record.updated_at.to_string(),
        tags: record.tags.clone(),
        wiki_links: extract_wiki_links(tree),
        callouts: extract_callouts(tree),
        schema: Some(compute_schema_snapshot(tree)),
        custom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Mark;

    fn sample_tree() -> Node {
        Node::doc()
            .with_child(
                Node::new("heading")
                    .with_attr("level", 1)
                    .with_child(Node::text("Plan")),
            )
            .with_child(
                Node::new("paragraph")
                    .with_child(Node::text("See ").with_mark(Mark::new("bold")))
                    .with_child(
                        Node::new("wikiLink")
                            .with_attr("targetTitle", "Roadmap")
                            .with_attr("targetId", "doc-7"),
                    )
                    .with_child(
                        Node::new("tag")
                            .with_attr("tagId", "t1")
                            .with_attr("tagName", "work")
                            .with_attr("color", "#ff0000"),
                    )
                    .with_child(
                        Node::new("tag")
                            .with_attr("tagId", "t1")
                            .with_attr("tagName", "work"),
                    ),
            )
            .with_child(
                Node::new("callout")
                    .with_attr("type", "warning")
                    .with_attr("title", "Careful")
                    .with_child(Node::new("paragraph").with_child(Node::text("Hot"))),
            )
    }

    #[test]
    fn test_extract_wiki_links() {
        let links = extract_wiki_links(&sample_tree());
        assert_eq!(
            links,
            vec![WikiLinkRef {
                target_title: "Roadmap".into(),
                display_text: "Roadmap".into(),
                target_id: Some("doc-7".into()),
            }]
        );
    }

    #[test]
    fn test_callout_position_counts_every_node() {
        let callouts = extract_callouts(&sample_tree());
        assert_eq!(callouts.len(), 1);
        // doc, heading, text, paragraph, text, wikiLink, tag, tag, callout
        assert_eq!(callouts[0].position, 8);
        assert_eq!(callouts[0].callout_type, "warning");
        assert_eq!(callouts[0].title.as_deref(), Some("Careful"));
    }

    #[test]
    fn test_extract_tags_dedupes() {
        let tags = extract_tags(&sample_tree());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].color.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn test_schema_snapshot() {
        let snapshot = compute_schema_snapshot(&sample_tree());
        assert!(snapshot.nodes.contains("wikiLink"));
        assert!(snapshot.marks.contains("bold"));
        assert_eq!(snapshot.extensions, vec!["wikiLinks", "tags", "callouts"]);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!  2024"), "hello-world-2024");
        assert_eq!(slugify("  ***  "), "untitled");
    }

    #[test]
    fn test_compose_metadata() {
        let record = RecordInfo {
            content_id: "doc-1",
            title: "My Plan",
            created_at: "2024-01-01T00:00:00Z",
            updated_at: "2024-01-02T00:00:00Z",
            schema_version: None,
            tags: vec![TagRef {
                id: "a".into(),
                name: "alpha".into(),
                color: None,
            }],
        };
        let meta = compose_metadata(&record, &sample_tree());
        assert_eq!(meta.slug, "my-plan");
        assert_eq!(meta.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(meta.tags[0].name, "alpha");
        assert_eq!(meta.wiki_links.len(), 1);

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["contentId"], "doc-1");
        assert_eq!(json["callouts"][0]["type"], "warning");
        // record tags and inline annotations stay separate
        assert_eq!(json["tags"].as_array().unwrap().len(), 1);
        assert_eq!(
            json["custom"]["inlineTags"],
            serde_json::json!([{"id": "t1", "name": "work", "color": "#ff0000"}])
        );

        let plain = compose_metadata(&record, &Node::doc());
        assert!(plain.custom.is_empty());
    }
}
