// SPDX-License-Identifier: AGPL-3.0-or-later
//! Markdown converter
//!
//! Wiki links and tags have no Markdown equivalent. With semantic
//! preservation on they are wrapped in HTML comments carrying their internal
//! ids, so an importer can recover them after a lossy round trip.

use crate::metadata::DocumentMetadata;
use crate::traits::{
    ConversionError, ConversionOptions, Converter, ExportFile, MarkdownSettings, Rendered,
    Result, WikiLinkStyle,
};
use crate::tree::{ExportFormat, Mark, MarkKind, Node, NodeKind};
use std::collections::BTreeSet;

/// Markdown converter (GFM flavoured, with callouts as `> [!TYPE]`)
pub struct MarkdownConverter;

impl MarkdownConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for MarkdownConverter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Markdown
    }

    fn render(&self, tree: &Node, options: &ConversionOptions) -> Result<Rendered> {
        if tree.kind() != NodeKind::Doc {
            return Err(ConversionError::Render {
                format: ExportFormat::Markdown,
                message: format!("root node must be 'doc', found '{}'", tree.node_type),
            });
        }

        let settings = &options.markdown;
        let mut writer = MarkdownWriter::new(settings);
        let body = writer.block(tree);

        let mut output = String::new();
        if settings.front_matter {
            if let Some(meta) = &options.metadata {
                output.push_str(&front_matter(meta)?);
            }
        }
        output.push_str(&body);

        let mut files = vec![ExportFile::new(
            options.file_name(ExportFormat::Markdown),
            output,
            ExportFormat::Markdown.mime_type(),
        )];
        if settings.include_metadata_file {
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
            warnings: writer.into_warnings(),
        })
    }
}

/// YAML front matter; values are JSON-quoted, which YAML accepts
fn front_matter(meta: &DocumentMetadata) -> Result<String> {
    let mut out = String::from("---\n");
    out.push_str(&format!("title: {}\n", serde_json::to_string(&meta.title)?));
    out.push_str(&format!("slug: {}\n", serde_json::to_string(&meta.slug)?));
    out.push_str(&format!("created: {}\n", serde_json::to_string(&meta.created_at)?));
    out.push_str(&format!("updated: {}\n", serde_json::to_string(&meta.updated_at)?));
    if meta.tags.is_empty() {
        out.push_str("tags: []\n");
    } else {
        out.push_str("tags:\n");
        for tag in &meta.tags {
            out.push_str(&format!("  - {}\n", serde_json::to_string(&tag.name)?));
        }
    }
    out.push_str(&format!(
        "schemaVersion: {}\n",
        serde_json::to_string(&meta.schema_version)?
    ));
    out.push_str("---\n\n");
    Ok(out)
}

struct MarkdownWriter<'a> {
    settings: &'a MarkdownSettings,
    unknown_nodes: BTreeSet<String>,
    unknown_marks: BTreeSet<String>,
}

impl<'a> MarkdownWriter<'a> {
    fn new(settings: &'a MarkdownSettings) -> Self {
        Self {
            settings,
            unknown_nodes: BTreeSet::new(),
            unknown_marks: BTreeSet::new(),
        }
    }

    fn into_warnings(self) -> Vec<String> {
        let nodes = self
            .unknown_nodes
            .into_iter()
            .map(|t| format!("Unsupported node type '{t}' exported without formatting"));
        let marks = self
            .unknown_marks
            .into_iter()
            .map(|t| format!("Unsupported mark type '{t}' dropped"));
        nodes.chain(marks).collect()
    }

    fn blocks(&mut self, nodes: &[Node]) -> String {
        nodes
            .iter()
            .map(|n| self.block(n))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn block(&mut self, node: &Node) -> String {
        match node.kind() {
            NodeKind::Doc => self.blocks(node.children()),

            NodeKind::Paragraph => self.inlines(node.children()),

            NodeKind::Heading => {
                let level = node.attr_u64("level").unwrap_or(1).clamp(1, 6) as usize;
                format!("{} {}", "#".repeat(level), self.inlines(node.children()))
            }

            NodeKind::CodeBlock => {
                let code = node.text_content();
                let code = code.strip_suffix('\n').unwrap_or(&code);
                let language = if self.settings.code_block_language {
                    node.attr_str("language").unwrap_or_default()
                } else {
                    String::new()
                };
                let fence = fence_for(code);
                format!("{fence}{language}\n{code}\n{fence}")
            }

            NodeKind::Blockquote => quote(&self.blocks(node.children())),

            NodeKind::Callout => {
                let callout_type = node
                    .attr_str("type")
                    .unwrap_or_else(|| "note".to_string())
                    .to_uppercase();
                let mut header = format!("> [!{callout_type}]");
                if let Some(title) = node.attr_str("title").filter(|t| !t.is_empty()) {
                    header.push(' ');
                    header.push_str(&title);
                }
                let body = self.blocks(node.children());
                if body.is_empty() {
                    header
                } else {
                    format!("{header}\n{}", quote(&body))
                }
            }

            NodeKind::BulletList | NodeKind::OrderedList | NodeKind::TaskList => {
                self.list(node, "")
            }

            // Stray item outside a list
            NodeKind::ListItem | NodeKind::TaskItem => {
                self.list(&Node::new("bulletList").with_child(node.clone()), "")
            }

            NodeKind::HorizontalRule => "---".to_string(),

            NodeKind::Table => self.table(node),

            NodeKind::TableRow | NodeKind::TableHeader | NodeKind::TableCell => {
                self.inlines(node.children())
            }

            NodeKind::Text
            | NodeKind::HardBreak
            | NodeKind::Image
            | NodeKind::WikiLink
            | NodeKind::Tag => self.inline(node),

            NodeKind::Other => {
                self.unknown_nodes.insert(node.node_type.clone());
                let mut out = node.text.clone().unwrap_or_default();
                for child in node.children() {
                    out.push_str(&self.block(child));
                }
                out
            }
        }
    }

    fn inlines(&mut self, nodes: &[Node]) -> String {
        nodes.iter().map(|n| self.inline(n)).collect()
    }

    fn inline(&mut self, node: &Node) -> String {
        match node.kind() {
            NodeKind::Text => {
                let text = node.text.as_deref().unwrap_or_default();
                self.apply_marks(text, node.marks())
            }

            NodeKind::HardBreak => "  \n".to_string(),

            NodeKind::Image => {
                let src = node.attr_str("src").unwrap_or_default();
                let alt = node.attr_str("alt").unwrap_or_default();
                match node.attr_str("title").filter(|t| !t.is_empty()) {
                    Some(title) => format!("![{alt}]({src} \"{title}\")"),
                    None => format!("![{alt}]({src})"),
                }
            }

            NodeKind::WikiLink => self.wiki_link(node),

            NodeKind::Tag => self.tag(node),

            // Containers nested where inline content was expected
            NodeKind::Paragraph
            | NodeKind::TableCell
            | NodeKind::TableHeader
            | NodeKind::ListItem
            | NodeKind::TaskItem => self.inlines(node.children()),

            NodeKind::Doc
            | NodeKind::Heading
            | NodeKind::BulletList
            | NodeKind::OrderedList
            | NodeKind::TaskList
            | NodeKind::CodeBlock
            | NodeKind::Blockquote
            | NodeKind::HorizontalRule
            | NodeKind::Table
            | NodeKind::TableRow
            | NodeKind::Callout
            | NodeKind::Other => self.block(node),
        }
    }

    fn apply_marks(&mut self, text: &str, marks: &[Mark]) -> String {
        let mut ordered: Vec<&Mark> = marks.iter().collect();
        if self.settings.canonical_mark_order {
            ordered.sort_by_key(|m| m.kind());
        }

        let mut out = text.to_string();
        for mark in ordered {
            out = match mark.kind() {
                MarkKind::Bold => format!("**{out}**"),
                MarkKind::Italic => format!("*{out}*"),
                MarkKind::Code => format!("`{out}`"),
                MarkKind::Strike => format!("~~{out}~~"),
                MarkKind::Underline => format!("<u>{out}</u>"),
                MarkKind::Highlight => format!("=={out}=="),
                MarkKind::Link => {
                    let href = mark.attr_str("href").unwrap_or_default();
                    format!("[{out}]({href})")
                }
                MarkKind::Other => {
                    self.unknown_marks.insert(mark.mark_type.clone());
                    out
                }
            };
        }
        out
    }

    fn wiki_link(&self, node: &Node) -> String {
        let target = node.attr_str("targetTitle").unwrap_or_default();
        let display = node
            .attr_str("displayText")
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| target.clone());

        let link = match self.settings.wiki_link_style {
            WikiLinkStyle::Wiki if display == target => format!("[[{target}]]"),
            WikiLinkStyle::Wiki => format!("[[{target}|{display}]]"),
            WikiLinkStyle::Markdown => {
                format!("[{display}]({}.md)", urlencoding::encode(&target))
            }
        };

        match node.attr_str("targetId") {
            Some(id) if self.settings.preserve_semantics => {
                format!("<!-- wikilink:{id} -->{link}<!-- /wikilink -->")
            }
            _ => link,
        }
    }

    fn tag(&self, node: &Node) -> String {
        let name = node.attr_str("tagName").unwrap_or_default();
        let token = format!("#{}", name.split_whitespace().collect::<Vec<_>>().join("-"));
        if !self.settings.preserve_semantics {
            return token;
        }
        let id = node.attr_str("tagId").unwrap_or_default();
        match node.attr_str("color") {
            Some(color) => format!("<!-- tag:{id}:{color} -->{token}<!-- /tag -->"),
            None => format!("<!-- tag:{id} -->{token}<!-- /tag -->"),
        }
    }

    /// Render a list; nested lists are indented by the parent marker width
    fn list(&mut self, list: &Node, indent: &str) -> String {
        let kind = list.kind();
        let start = if kind == NodeKind::OrderedList {
            list.attr_u64("start").unwrap_or(1)
        } else {
            1
        };

        let mut lines = Vec::new();
        for (i, item) in list.children().iter().enumerate() {
            let marker = if item.kind() == NodeKind::TaskItem || kind == NodeKind::TaskList {
                let checked = matches!(item.attr("checked"), Some(serde_json::Value::Bool(true)));
                let marker = if checked { "- [x] " } else { "- [ ] " };
                marker.to_string()
            } else if kind == NodeKind::OrderedList {
                format!("{}. ", start.saturating_add(i as u64))
            } else {
                "- ".to_string()
            };
            let child_indent = format!("{indent}{}", " ".repeat(marker.len()));

            let (nested, inline): (Vec<&Node>, Vec<&Node>) =
                item.children().iter().partition(|c| c.kind().is_list());
            let text = inline
                .iter()
                .map(|c| self.block(c))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
                .replace('\n', &format!("\n{child_indent}"));

            let mut entry = format!("{indent}{marker}{text}");
            for sublist in nested {
                entry.push('\n');
                entry.push_str(&self.list(sublist, &child_indent));
            }
            lines.push(entry);
        }
        lines.join("\n")
    }

    fn table(&mut self, table: &Node) -> String {
        let rows: Vec<Vec<String>> = table
            .children()
            .iter()
            .map(|row| {
                row.children()
                    .iter()
                    .map(|cell| {
                        self.inlines(cell.children())
                            .replace('|', "\\|")
                            .replace('\n', " ")
                    })
                    .collect()
            })
            .collect();

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return String::new();
        }

        let format_row = |cells: &[String]| {
            let mut line = String::from("|");
            for i in 0..width {
                line.push(' ');
                line.push_str(cells.get(i).map(String::as_str).unwrap_or(""));
                line.push_str(" |");
            }
            line
        };

        let mut lines = Vec::with_capacity(rows.len() + 1);
        for (i, row) in rows.iter().enumerate() {
            lines.push(format_row(row));
            if i == 0 {
                lines.push(format!("|{}", " --- |".repeat(width)));
            }
        }
        lines.join("\n")
    }
}

/// Backtick fence longer than any backtick run inside `code`
fn fence_for(code: &str) -> String {
    let longest = code
        .split(|c: char| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat((longest + 1).max(3))
}

/// Prefix every line with a quote marker
fn quote(content: &str) -> String {
    if content.is_empty() {
        return ">".to_string();
    }
    content
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{compose_metadata, RecordInfo, TagRef};
    use comrak::nodes::NodeValue;
    use comrak::{parse_document, Arena, Options};
    use pretty_assertions::assert_eq;

    fn para(children: Vec<Node>) -> Node {
        Node::new("paragraph").with_children(children)
    }

    fn render(tree: &Node, options: &ConversionOptions) -> String {
        let result = MarkdownConverter::new().convert(tree, options);
        assert!(result.success, "{:?}", result.warnings());
        result.primary_file().unwrap().content.clone()
    }

    fn hello_world() -> Node {
        Node::doc()
            .with_child(
                Node::new("heading")
                    .with_attr("level", 1)
                    .with_child(Node::text("Hello")),
            )
            .with_child(para(vec![Node::text("World").with_mark(Mark::new("bold"))]))
    }

    #[test]
    fn test_heading_and_bold_paragraph() {
        let out = render(&hello_world(), &ConversionOptions::default());
        assert_eq!(out, "# Hello\n\n**World**");
    }

    #[test]
    fn test_output_is_idempotent() {
        let options = ConversionOptions::default();
        assert_eq!(render(&hello_world(), &options), render(&hello_world(), &options));
    }

    #[test]
    fn test_mark_array_order_drives_nesting() {
        let text = Node::text("x")
            .with_mark(Mark::new("code"))
            .with_mark(Mark::link("https://a.test"));
        let doc = Node::doc().with_child(para(vec![text]));
        assert_eq!(render(&doc, &ConversionOptions::default()), "[`x`](https://a.test)");

        let reversed = Node::text("x")
            .with_mark(Mark::link("https://a.test"))
            .with_mark(Mark::new("code"));
        let doc = Node::doc().with_child(para(vec![reversed]));
        assert_eq!(render(&doc, &ConversionOptions::default()), "`[x](https://a.test)`");

        let mut options = ConversionOptions::default();
        options.markdown.canonical_mark_order = true;
        assert_eq!(render(&doc, &options), "[`x`](https://a.test)");
    }

    #[test]
    fn test_code_block_language_setting() {
        let doc = Node::doc().with_child(
            Node::new("codeBlock")
                .with_attr("language", "rust")
                .with_child(Node::text("fn main() {}\n")),
        );
        assert_eq!(
            render(&doc, &ConversionOptions::default()),
            "```rust\nfn main() {}\n```"
        );

        let mut options = ConversionOptions::default();
        options.markdown.code_block_language = false;
        assert_eq!(render(&doc, &options), "```\nfn main() {}\n```");
    }

    #[test]
    fn test_code_containing_fences_gets_longer_fence() {
        let doc = Node::doc().with_child(
            Node::new("codeBlock")
                .with_attr("language", "md")
                .with_child(Node::text("```\ninner\n```")),
        );
        let out = render(&doc, &ConversionOptions::default());
        assert_eq!(out, "````md\n```\ninner\n```\n````");

        let arena = Arena::new();
        let root = parse_document(&arena, &out, &Options::default());
        let blocks: Vec<_> = root.children().collect();
        assert_eq!(blocks.len(), 1);
        match &blocks[0].data.borrow().value {
            NodeValue::CodeBlock(code) => {
                assert_eq!(code.info, "md");
                assert_eq!(code.literal, "```\ninner\n```\n");
            }
            other => panic!("expected a code block, got {other:?}"),
        };
    }

    #[test]
    fn test_ordered_list_start_near_overflow() {
        let item = |text: &str| Node::new("listItem").with_child(para(vec![Node::text(text)]));
        let doc = Node::doc().with_child(
            Node::new("orderedList")
                .with_attr("start", u64::MAX)
                .with_child(item("a"))
                .with_child(item("b")),
        );
        let max = u64::MAX;
        assert_eq!(
            render(&doc, &ConversionOptions::default()),
            format!("{max}. a\n{max}. b")
        );
    }

    #[test]
    fn test_nested_lists() {
        let item = |text: &str| Node::new("listItem").with_child(para(vec![Node::text(text)]));
        let doc = Node::doc().with_child(
            Node::new("orderedList")
                .with_child(
                    item("one").with_child(
                        Node::new("bulletList")
                            .with_child(item("a"))
                            .with_child(item("b")),
                    ),
                )
                .with_child(item("two")),
        );
        assert_eq!(
            render(&doc, &ConversionOptions::default()),
            "1. one\n   - a\n   - b\n2. two"
        );
    }

    #[test]
    fn test_ordered_list_start_and_tasks() {
        let doc = Node::doc()
            .with_child(
                Node::new("orderedList")
                    .with_attr("start", 3)
                    .with_child(Node::new("listItem").with_child(para(vec![Node::text("c")]))),
            )
            .with_child(
                Node::new("taskList")
                    .with_child(
                        Node::new("taskItem")
                            .with_attr("checked", true)
                            .with_child(para(vec![Node::text("done")])),
                    )
                    .with_child(
                        Node::new("taskItem")
                            .with_attr("checked", false)
                            .with_child(para(vec![Node::text("todo")])),
                    ),
            );
        assert_eq!(
            render(&doc, &ConversionOptions::default()),
            "3. c\n\n- [x] done\n- [ ] todo"
        );
    }

    #[test]
    fn test_nested_blockquotes_stack_markers() {
        let doc = Node::doc().with_child(
            Node::new("blockquote")
                .with_child(para(vec![Node::text("outer")]))
                .with_child(
                    Node::new("blockquote").with_child(para(vec![Node::text("inner")])),
                ),
        );
        assert_eq!(
            render(&doc, &ConversionOptions::default()),
            "> outer\n>\n> > inner"
        );
    }

    #[test]
    fn test_callout() {
        let doc = Node::doc().with_child(
            Node::new("callout")
                .with_attr("type", "warning")
                .with_attr("title", "Heads up")
                .with_child(para(vec![Node::text("Mind the gap")])),
        );
        assert_eq!(
            render(&doc, &ConversionOptions::default()),
            "> [!WARNING] Heads up\n> Mind the gap"
        );
    }

    #[test]
    fn test_table_header_separator() {
        let cell = |t: &str| Node::new("tableCell").with_child(para(vec![Node::text(t)]));
        let header = |t: &str| Node::new("tableHeader").with_child(para(vec![Node::text(t)]));
        let doc = Node::doc().with_child(
            Node::new("table")
                .with_child(
                    Node::new("tableRow")
                        .with_child(header("Name"))
                        .with_child(header("Notes")),
                )
                .with_child(
                    Node::new("tableRow")
                        .with_child(cell("Ada"))
                        .with_child(cell("a|b")),
                ),
        );
        assert_eq!(
            render(&doc, &ConversionOptions::default()),
            "| Name | Notes |\n| --- | --- |\n| Ada | a\\|b |"
        );
    }

    #[test]
    fn test_wiki_link_styles() {
        let link = Node::new("wikiLink")
            .with_attr("targetTitle", "Project Plan")
            .with_attr("displayText", "the plan")
            .with_attr("targetId", "doc-42");
        let doc = Node::doc().with_child(para(vec![link]));

        assert_eq!(
            render(&doc, &ConversionOptions::default()),
            "<!-- wikilink:doc-42 -->[[Project Plan|the plan]]<!-- /wikilink -->"
        );

        let mut options = ConversionOptions::default();
        options.markdown.wiki_link_style = WikiLinkStyle::Markdown;
        options.markdown.preserve_semantics = false;
        assert_eq!(render(&doc, &options), "[the plan](Project%20Plan.md)");
    }

    #[test]
    fn test_tag_semantic_wrapper() {
        let tag = Node::new("tag")
            .with_attr("tagId", "t1")
            .with_attr("tagName", "work")
            .with_attr("color", "#ff0000");
        let doc = Node::doc().with_child(para(vec![tag]));
        assert_eq!(
            render(&doc, &ConversionOptions::default()),
            "<!-- tag:t1:#ff0000 -->#work<!-- /tag -->"
        );

        let mut options = ConversionOptions::default();
        options.markdown.preserve_semantics = false;
        assert_eq!(render(&doc, &options), "#work");
    }

    #[test]
    fn test_unknown_node_falls_back_to_children() {
        let doc = Node::doc().with_child(
            Node::new("mermaid").with_child(para(vec![Node::text("graph TD")])),
        );
        let result = MarkdownConverter::new().convert(&doc, &ConversionOptions::default());
        assert!(result.success);
        assert_eq!(result.files[0].content, "graph TD");
        assert!(result.warnings()[0].contains("mermaid"));
    }

    #[test]
    fn test_non_doc_root_fails() {
        let result =
            MarkdownConverter::new().convert(&Node::new("paragraph"), &ConversionOptions::default());
        assert!(!result.success);
        assert!(result.files.is_empty());
    }

    #[test]
    fn test_sidecar_and_front_matter() {
        let record = RecordInfo {
            content_id: "doc-1",
            title: "Hello",
            created_at: "2024-01-01",
            updated_at: "2024-01-02",
            schema_version: None,
            tags: vec![TagRef {
                id: "t".into(),
                name: "notes".into(),
                color: None,
            }],
        };
        let meta = compose_metadata(&record, &hello_world());
        let mut options = ConversionOptions::default()
            .with_metadata(meta)
            .with_file_stem("hello");
        options.markdown.front_matter = true;

        let result = MarkdownConverter::new().convert(&hello_world(), &options);
        assert_eq!(result.files.len(), 2);
        assert_eq!(result.files[0].name, "hello.md");
        assert!(result.files[0]
            .content
            .starts_with("---\ntitle: \"Hello\"\nslug: \"hello\"\n"));
        assert!(result.files[0].content.ends_with("---\n\n# Hello\n\n**World**"));

        let sidecar = result.sidecar_file().unwrap();
        assert_eq!(sidecar.name, "hello.meta.json");
        let parsed: serde_json::Value = serde_json::from_str(&sidecar.content).unwrap();
        assert_eq!(parsed["contentId"], "doc-1");
    }

    #[test]
    fn test_output_parses_as_intended_structure() {
        let out = render(&hello_world(), &ConversionOptions::default());
        let arena = Arena::new();
        let root = parse_document(&arena, &out, &Options::default());

        let kinds: Vec<&'static str> = root
            .descendants()
            .map(|n| match n.data.borrow().value {
                NodeValue::Heading(_) => "heading",
                NodeValue::Paragraph => "paragraph",
                NodeValue::Strong => "strong",
                _ => "",
            })
            .filter(|k| !k.is_empty())
            .collect();
        assert_eq!(kinds, vec!["heading", "paragraph", "strong"]);
    }
}
