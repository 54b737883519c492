// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schema migrations
//!
//! Documents are stamped with the schema version they were written under.
//! Before export, the engine walks an ordered chain of version-to-version
//! transforms starting at the document's version, then stamps the registry's
//! current version on the result.

use crate::metadata::{
    compute_schema_snapshot, extract_callouts, extract_wiki_links, DocumentMetadata,
};
use crate::schema::SchemaRegistry;
use crate::tree::{Attrs, Node};
use serde_json::Value;
use std::fmt;

/// Pure tree transform from one version to the next
pub type TreeTransform = fn(&Node) -> Node;

/// Metadata transform; receives the already-migrated tree
pub type MetadataTransform = fn(&DocumentMetadata, &Node) -> DocumentMetadata;

/// One step in the migration chain
#[derive(Clone)]
pub struct Migration {
    pub from_version: String,
    pub to_version: String,
    pub description: String,
    pub breaking: bool,
    pub migrate_tree: TreeTransform,
    pub migrate_metadata: MetadataTransform,
}

impl Migration {
    pub fn new(
        from_version: impl Into<String>,
        to_version: impl Into<String>,
        description: impl Into<String>,
        migrate_tree: TreeTransform,
        migrate_metadata: MetadataTransform,
    ) -> Self {
        Self {
            from_version: from_version.into(),
            to_version: to_version.into(),
            description: description.into(),
            breaking: false,
            migrate_tree,
            migrate_metadata,
        }
    }

    pub fn breaking(mut self) -> Self {
        self.breaking = true;
        self
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("from_version", &self.from_version)
            .field("to_version", &self.to_version)
            .field("description", &self.description)
            .field("breaking", &self.breaking)
            .finish_non_exhaustive()
    }
}

/// Result of running the chain over one document
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub tree: Node,
    pub metadata: DocumentMetadata,
    /// Version the document declared before migrating
    pub from_version: String,
    /// Last version the chain actually reached
    pub reached_version: String,
    /// Descriptions of the applied steps, in order
    pub applied: Vec<String>,
    /// Whether `reached_version` is the registry's current version
    pub complete: bool,
}

impl MigrationOutcome {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.complete
    }
}

pub struct MigrationEngine {
    registry: SchemaRegistry,
    migrations: Vec<Migration>,
}

impl MigrationEngine {
    /// Engine with the built-in migration chain
    pub fn new(registry: SchemaRegistry) -> Self {
        let mut engine = Self::empty(registry);
        for migration in builtin_migrations() {
            engine.register(migration);
        }
        engine
    }

    pub fn empty(registry: SchemaRegistry) -> Self {
        Self {
            registry,
            migrations: Vec::new(),
        }
    }

    /// Append a step; steps are tried in registration order
    pub fn register(&mut self, migration: Migration) {
        self.migrations.push(migration);
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Migrate a document to the current schema version.
    ///
    /// The current version is stamped on the metadata even when the chain
    /// stops short; `complete` tells the caller whether that stamp is earned.
    pub fn apply_migrations(&self, tree: &Node, metadata: &DocumentMetadata) -> MigrationOutcome {
        let current = self.registry.current_version();
        let from_version = metadata.schema_version.clone();

        if from_version == current {
            return MigrationOutcome {
                tree: tree.clone(),
                metadata: metadata.clone(),
                reached_version: from_version.clone(),
                from_version,
                applied: Vec::new(),
                complete: true,
            };
        }

        let mut tree = tree.clone();
        let mut metadata = metadata.clone();
        let mut pointer = from_version.clone();
        let mut applied = Vec::new();

        // Each step may run at most once, which also breaks cycles.
        for _ in 0..self.migrations.len() {
            let Some(step) = self.migrations.iter().find(|m| m.from_version == pointer) else {
                break;
            };
            tracing::debug!(
                from = %step.from_version,
                to = %step.to_version,
                content_id = %metadata.content_id,
                "applying migration"
            );
            tree = (step.migrate_tree)(&tree);
            metadata = (step.migrate_metadata)(&metadata, &tree);
            metadata.schema_version = step.to_version.clone();
            pointer = step.to_version.clone();
            applied.push(step.description.clone());
        }

        let complete = pointer == current;
        if !complete {
            tracing::warn!(
                content_id = %metadata.content_id,
                from = %from_version,
                reached = %pointer,
                current = %current,
                "migration chain stopped short of the current schema version"
            );
        }
        metadata.schema_version = current.to_string();

        MigrationOutcome {
            tree,
            metadata,
            from_version,
            reached_version: pointer,
            applied,
            complete,
        }
    }

    /// Steps leading from `from` to `to`; empty when no chain exists
    pub fn get_migration_path(&self, from: &str, to: &str) -> Vec<&Migration> {
        let mut path = Vec::new();
        let mut pointer = from;
        while pointer != to && path.len() < self.migrations.len() {
            let Some(step) = self.migrations.iter().find(|m| m.from_version == pointer) else {
                return Vec::new();
            };
            path.push(step);
            pointer = &step.to_version;
        }
        if pointer == to {
            path
        } else {
            Vec::new()
        }
    }

    /// A chain exists, or the versions share a major segment
    pub fn has_migration_path(&self, from: &str, to: &str) -> bool {
        from == to
            || !self.get_migration_path(from, to).is_empty()
            || self.registry.is_compatible(from, to)
    }
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self::new(SchemaRegistry::new())
    }
}

/// Rebuild a tree bottom-up, passing every node through `f`
fn map_nodes(node: &Node, f: &impl Fn(Node) -> Node) -> Node {
    f(Node {
        node_type: node.node_type.clone(),
        attrs: node.attrs.clone(),
        marks: node.marks.clone(),
        content: node
            .content
            .as_ref()
            .map(|children| children.iter().map(|c| map_nodes(c, f)).collect()),
        text: node.text.clone(),
    })
}

fn rename_attrs(attrs: Option<Attrs>, renames: &[(&str, &str)]) -> Option<Attrs> {
    let attrs = attrs?;
    Some(
        attrs
            .into_iter()
            .map(|(key, value)| {
                let key = renames
                    .iter()
                    .find(|(old, _)| *old == key)
                    .map_or(key, |(_, new)| new.to_string());
                (key, value)
            })
            .collect(),
    )
}

fn internal_link_to_wiki_link(tree: &Node) -> Node {
    map_nodes(tree, &|mut node| {
        if node.node_type == "internalLink" {
            node.node_type = "wikiLink".to_string();
            node.attrs = rename_attrs(
                node.attrs.take(),
                &[("title", "targetTitle"), ("id", "targetId")],
            );
        }
        node
    })
}

fn refresh_links(metadata: &DocumentMetadata, tree: &Node) -> DocumentMetadata {
    DocumentMetadata {
        wiki_links: extract_wiki_links(tree),
        schema: Some(compute_schema_snapshot(tree)),
        ..metadata.clone()
    }
}

fn blockquote_to_callout(tree: &Node) -> Node {
    map_nodes(tree, &|mut node| {
        let callout_type = (node.node_type == "blockquote")
            .then(|| node.attr("calloutType"))
            .flatten()
            .filter(|v| !v.is_null())
            .cloned();
        let Some(callout_type) = callout_type else {
            return node;
        };

        let mut attrs = Attrs::new();
        attrs.insert("type".to_string(), callout_type);
        if let Some(title) = node.attr("calloutTitle").filter(|v| !v.is_null()) {
            attrs.insert("title".to_string(), title.clone());
        }
        node.node_type = "callout".to_string();
        node.attrs = Some(attrs);
        node
    })
}

fn refresh_callouts(metadata: &DocumentMetadata, tree: &Node) -> DocumentMetadata {
    DocumentMetadata {
        callouts: extract_callouts(tree),
        schema: Some(compute_schema_snapshot(tree)),
        ..metadata.clone()
    }
}

/// The chain shipped with the current schema
pub fn builtin_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            "1.0.0",
            "1.1.0",
            "Convert internalLink nodes to wikiLink",
            internal_link_to_wiki_link,
            refresh_links,
        ),
        Migration::new(
            "1.1.0",
            "1.2.0",
            "Convert blockquotes with calloutType to callout nodes",
            blockquote_to_callout,
            refresh_callouts,
        ),
    ]
}

/// Legacy trees sometimes carry the version on the root node
pub fn declared_version(tree: &Node) -> Option<String> {
    match tree.attr("schemaVersion")? {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
