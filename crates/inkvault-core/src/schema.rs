// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schema registry: the node/mark catalog the installed converters understand
//!
//! The registry is versioned. Each version records which node and mark types
//! it introduced or retired so that a change-log between any two versions can
//! be produced for migration reports.

use crate::tree::{MarkKind, NodeKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Schema version the running converters were built against
pub const CURRENT_SCHEMA_VERSION: &str = "1.2.0";

/// Set of node/mark types, either the registry catalog or one document's usage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub nodes: BTreeSet<String>,
    pub marks: BTreeSet<String>,
    pub extensions: Vec<String>,
}

/// One named change in the schema history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaChange {
    pub version: String,
    pub name: String,
    pub description: String,
    pub breaking: bool,
}

struct VersionEntry {
    version: &'static str,
    added_nodes: &'static [&'static str],
    removed_nodes: &'static [&'static str],
    added_marks: &'static [&'static str],
    extensions: &'static [&'static str],
    changes: &'static [(&'static str, &'static str, bool)],
}

const HISTORY: &[VersionEntry] = &[
    VersionEntry {
        version: "1.0.0",
        added_nodes: &[
            "doc",
            "paragraph",
            "text",
            "heading",
            "bulletList",
            "orderedList",
            "listItem",
            "codeBlock",
            "blockquote",
            "horizontalRule",
            "hardBreak",
            "image",
            "table",
            "tableRow",
            "tableHeader",
            "tableCell",
            "internalLink",
        ],
        removed_nodes: &[],
        added_marks: &["bold", "italic", "code", "strike", "link"],
        extensions: &["starterKit", "table", "image", "link"],
        changes: &[("base-schema", "Initial node and mark catalog", false)],
    },
    VersionEntry {
        version: "1.1.0",
        added_nodes: &["wikiLink", "tag"],
        removed_nodes: &["internalLink"],
        added_marks: &["underline"],
        extensions: &["wikiLink", "tag", "underline"],
        changes: &[
            (
                "wiki-link-node",
                "internalLink{title,id} replaced by wikiLink{targetTitle,targetId}",
                false,
            ),
            ("tag-node", "Inline tag annotations with id, name and color", false),
            ("underline-mark", "Underline mark", false),
        ],
    },
    VersionEntry {
        version: "1.2.0",
        added_nodes: &["callout", "taskList", "taskItem"],
        removed_nodes: &[],
        added_marks: &["highlight"],
        extensions: &["callout", "taskList", "highlight"],
        changes: &[
            (
                "callout-node",
                "Blockquotes carrying calloutType become callout nodes",
                false,
            ),
            ("task-list", "Task lists with checked items", false),
            ("highlight-mark", "Highlight mark", false),
        ],
    },
];

/// Parse `major.minor.patch` (missing segments default to 0)
fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let mut parts = version.trim().trim_start_matches('v').split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// Order two version labels; unparseable labels compare as strings
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

fn major_segment(version: &str) -> &str {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .next()
        .unwrap_or("")
}

/// The node/mark catalog, versioned
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    version: String,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::at_version(CURRENT_SCHEMA_VERSION)
    }

    /// A registry pinned to a historical version (used by tests and reports)
    pub fn at_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn current_version(&self) -> &str {
        &self.version
    }

    /// Catalog of node/mark types at this registry's version
    pub fn current_schema(&self) -> SchemaSnapshot {
        Self::schema_at(&self.version)
    }

    /// Catalog as it stood at `version`, folding the history forward
    pub fn schema_at(version: &str) -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot::default();
        for entry in HISTORY
            .iter()
            .filter(|e| compare_versions(e.version, version) != Ordering::Greater)
        {
            snapshot
                .nodes
                .extend(entry.added_nodes.iter().map(|n| n.to_string()));
            for removed in entry.removed_nodes {
                snapshot.nodes.remove(*removed);
            }
            snapshot
                .marks
                .extend(entry.added_marks.iter().map(|m| m.to_string()));
            snapshot
                .extensions
                .extend(entry.extensions.iter().map(|e| e.to_string()));
        }
        snapshot
    }

    pub fn is_supported_node(&self, node_type: &str) -> bool {
        NodeKind::from_type_name(node_type) != NodeKind::Other
            && self.current_schema().nodes.contains(node_type)
    }

    pub fn is_supported_mark(&self, mark_type: &str) -> bool {
        MarkKind::from_type_name(mark_type) != MarkKind::Other
            && self.current_schema().marks.contains(mark_type)
    }

    /// Versions sharing a major segment are compatible
    pub fn is_compatible(&self, from: &str, to: &str) -> bool {
        let (a, b) = (major_segment(from), major_segment(to));
        !a.is_empty() && a == b
    }

    /// Named changes in `(from, to]`, oldest first
    pub fn changes_between(&self, from: &str, to: &str) -> Vec<SchemaChange> {
        HISTORY
            .iter()
            .filter(|e| {
                compare_versions(e.version, from) == Ordering::Greater
                    && compare_versions(e.version, to) != Ordering::Greater
            })
            .flat_map(|e| {
                e.changes
                    .iter()
                    .map(move |(name, description, breaking)| SchemaChange {
                        version: e.version.to_string(),
                        name: name.to_string(),
                        description: description.to_string(),
                        breaking: *breaking,
                    })
            })
            .collect()
    }

    /// Every version label the history knows, oldest first
    pub fn known_versions() -> Vec<&'static str> {
        HISTORY.iter().map(|e| e.version).collect()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_schema_covers_every_known_kind() {
        let registry = SchemaRegistry::new();
        for kind in NodeKind::KNOWN {
            assert!(
                registry.is_supported_node(kind.type_name().unwrap()),
                "{kind:?} missing from catalog"
            );
        }
        for kind in MarkKind::KNOWN {
            assert!(registry.is_supported_mark(kind.type_name().unwrap()));
        }
        assert!(!registry.is_supported_node("internalLink"));
    }

    #[test]
    fn test_historical_schema() {
        let old = SchemaRegistry::schema_at("1.0.0");
        assert!(old.nodes.contains("internalLink"));
        assert!(!old.nodes.contains("wikiLink"));
        assert!(!old.marks.contains("highlight"));
    }

    #[test]
    fn test_compatibility_by_major() {
        let registry = SchemaRegistry::new();
        assert!(registry.is_compatible("1.0.0", "1.2.0"));
        assert!(!registry.is_compatible("1.2.0", "2.0.0"));
        assert!(!registry.is_compatible("", "1.0.0"));
    }

    #[test]
    fn test_changes_between() {
        let registry = SchemaRegistry::new();
        let changes = registry.changes_between("1.0.0", "1.2.0");
        assert_eq!(changes.len(), 6);
        assert_eq!(changes[0].version, "1.1.0");
        assert!(changes.iter().all(|c| !c.breaking));
        assert!(registry.changes_between("1.2.0", "1.2.0").is_empty());
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("v2", "1.9.9"), Ordering::Greater);
    }
}
