// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTML converter
//!
//! Node and mark rendering is delegated to an [`EditorRenderer`], the same
//! renderer the editor uses on screen, so exported HTML matches what the user
//! saw. The converter only adds the standalone document shell and styles.

use crate::traits::{ConversionOptions, Converter, ExportFile, Rendered, Result, Theme};
use crate::tree::{ExportFormat, MarkKind, Node, NodeKind};
use std::sync::Arc;

/// Renders a tree to an HTML fragment the way the editor does
pub trait EditorRenderer: Send + Sync {
    fn render_fragment(&self, tree: &Node) -> Result<String>;
}

/// Renderer reproducing the editor's DOM output for each node kind
#[derive(Debug, Default)]
pub struct TiptapHtmlRenderer;

impl TiptapHtmlRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl EditorRenderer for TiptapHtmlRenderer {
    fn render_fragment(&self, tree: &Node) -> Result<String> {
        let mut out = String::new();
        render_node(&mut out, tree);
        Ok(out)
    }
}

fn render_children(out: &mut String, node: &Node) {
    for child in node.children() {
        render_node(out, child);
    }
}

fn wrap(out: &mut String, open: &str, close: &str, node: &Node) {
    out.push_str(open);
    render_children(out, node);
    out.push_str(close);
}

fn render_node(out: &mut String, node: &Node) {
    match node.kind() {
        NodeKind::Doc => render_children(out, node),
        NodeKind::Paragraph => wrap(out, "<p>", "</p>", node),
        NodeKind::Heading => {
            let level = node.attr_u64("level").unwrap_or(1).clamp(1, 6);
            wrap(out, &format!("<h{level}>"), &format!("</h{level}>"), node);
        }
        NodeKind::Text => render_text(out, node),
        NodeKind::BulletList => wrap(out, "<ul>", "</ul>", node),
        NodeKind::OrderedList => match node.attr_u64("start") {
            Some(start) if start != 1 => {
                wrap(out, &format!("<ol start=\"{start}\">"), "</ol>", node)
            }
            _ => wrap(out, "<ol>", "</ol>", node),
        },
        NodeKind::ListItem => wrap(out, "<li>", "</li>", node),
        NodeKind::TaskList => wrap(out, "<ul data-type=\"taskList\">", "</ul>", node),
        NodeKind::TaskItem => {
            let checked = node.attr("checked").and_then(|v| v.as_bool()).unwrap_or(false);
            out.push_str(&format!(
                "<li data-type=\"taskItem\" data-checked=\"{checked}\"><label><input type=\"checkbox\"{} disabled></label><div>",
                if checked { " checked" } else { "" }
            ));
            render_children(out, node);
            out.push_str("</div></li>");
        }
        NodeKind::CodeBlock => {
            match node.attr_str("language").filter(|l| !l.is_empty()) {
                Some(lang) => out.push_str(&format!(
                    "<pre><code class=\"language-{}\">",
                    escape_attr(&lang)
                )),
                None => out.push_str("<pre><code>"),
            }
            out.push_str(&escape_html(&node.text_content()));
            out.push_str("</code></pre>");
        }
        NodeKind::Blockquote => wrap(out, "<blockquote>", "</blockquote>", node),
        NodeKind::HorizontalRule => out.push_str("<hr>"),
        NodeKind::HardBreak => out.push_str("<br>"),
        NodeKind::Image => {
            out.push_str(&format!(
                "<img src=\"{}\" alt=\"{}\"",
                escape_attr(&node.attr_str("src").unwrap_or_default()),
                escape_attr(&node.attr_str("alt").unwrap_or_default())
            ));
            if let Some(title) = node.attr_str("title") {
                out.push_str(&format!(" title=\"{}\"", escape_attr(&title)));
            }
            out.push('>');
        }
        NodeKind::Table => wrap(out, "<table><tbody>", "</tbody></table>", node),
        NodeKind::TableRow => wrap(out, "<tr>", "</tr>", node),
        NodeKind::TableHeader => wrap(out, &cell_open("th", node), "</th>", node),
        NodeKind::TableCell => wrap(out, &cell_open("td", node), "</td>", node),
        NodeKind::WikiLink => {
            let target = node.attr_str("targetTitle").unwrap_or_default();
            let display = node
                .attr_str("displayText")
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| target.clone());
            out.push_str(&format!(
                "<a class=\"wiki-link\" href=\"{}.html\" data-target-title=\"{}\"",
                urlencoding::encode(&target),
                escape_attr(&target)
            ));
            if let Some(id) = node.attr_str("targetId") {
                out.push_str(&format!(" data-target-id=\"{}\"", escape_attr(&id)));
            }
            out.push('>');
            out.push_str(&escape_html(&display));
            out.push_str("</a>");
        }
        NodeKind::Tag => {
            let id = node.attr_str("tagId").unwrap_or_default();
            let name = node.attr_str("tagName").unwrap_or_default();
            out.push_str(&format!("<span class=\"tag\" data-tag-id=\"{}\"", escape_attr(&id)));
            if let Some(color) = node.attr_str("color") {
                out.push_str(&format!(
                    " data-color=\"{0}\" style=\"--tag-color: {0}\"",
                    escape_attr(&color)
                ));
            }
            out.push_str(&format!(">#{}</span>", escape_html(&name)));
        }
        NodeKind::Callout => {
            let callout_type = node.attr_str("type").unwrap_or_else(|| "note".to_string());
            let title = node
                .attr_str("title")
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| capitalize(&callout_type));
            out.push_str(&format!(
                "<div class=\"callout callout-{0}\" data-callout-type=\"{0}\"><div class=\"callout-title\">{1}</div><div class=\"callout-body\">",
                escape_attr(&callout_type),
                escape_html(&title)
            ));
            render_children(out, node);
            out.push_str("</div></div>");
        }
        NodeKind::Other => {
            if let Some(text) = &node.text {
                out.push_str(&escape_html(text));
            }
            render_children(out, node);
        }
    }
}

fn cell_open(tag: &str, node: &Node) -> String {
    let mut open = format!("<{tag}");
    for key in ["colspan", "rowspan"] {
        if let Some(span) = node.attr_u64(key).filter(|s| *s > 1) {
            open.push_str(&format!(" {key}=\"{span}\""));
        }
    }
    open.push('>');
    open
}

/// Text with marks applied in array order (first mark innermost)
fn render_text(out: &mut String, node: &Node) {
    let mut html = escape_html(node.text.as_deref().unwrap_or_default());
    for mark in node.marks() {
        html = match mark.kind() {
            MarkKind::Bold => format!("<strong>{html}</strong>"),
            MarkKind::Italic => format!("<em>{html}</em>"),
            MarkKind::Code => format!("<code>{html}</code>"),
            MarkKind::Strike => format!("<s>{html}</s>"),
            MarkKind::Underline => format!("<u>{html}</u>"),
            MarkKind::Highlight => format!("<mark>{html}</mark>"),
            MarkKind::Link => format!(
                "<a href=\"{}\">{html}</a>",
                escape_attr(mark.attr_str("href").unwrap_or_default())
            ),
            MarkKind::Other => format!(
                "<span data-mark=\"{}\">{html}</span>",
                escape_attr(&mark.mark_type)
            ),
        };
    }
    out.push_str(&html);
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(text: &str) -> String {
    escape_html(text).replace('"', "&quot;")
}

/// HTML converter wrapping the editor renderer's fragment
pub struct HtmlConverter {
    renderer: Arc<dyn EditorRenderer>,
}

impl HtmlConverter {
    pub fn new(renderer: Arc<dyn EditorRenderer>) -> Self {
        Self { renderer }
    }
}

impl Default for HtmlConverter {
    fn default() -> Self {
        Self::new(Arc::new(TiptapHtmlRenderer::new()))
    }
}

impl Converter for HtmlConverter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Html
    }

    fn render(&self, tree: &Node, options: &ConversionOptions) -> Result<Rendered> {
        let fragment = self.renderer.render_fragment(tree)?;
        let settings = &options.html;

        let content = if settings.standalone {
            let title = options
                .metadata
                .as_ref()
                .map(|m| m.title.as_str())
                .filter(|t| !t.is_empty())
                .unwrap_or("Document");
            let style = if settings.include_styles {
                format!("<style>\n{}</style>\n", stylesheet(settings.theme.resolve()))
            } else {
                String::new()
            };
            format!(
                "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n<title>{}</title>\n{style}</head>\n<body>\n<article class=\"document\">\n{fragment}\n</article>\n</body>\n</html>\n",
                escape_html(title)
            )
        } else {
            fragment
        };

        Ok(Rendered {
            files: vec![ExportFile::new(
                options.file_name(ExportFormat::Html),
                content,
                ExportFormat::Html.mime_type(),
            )],
            warnings: Vec::new(),
        })
    }
}

struct Palette {
    background: &'static str,
    text: &'static str,
    muted: &'static str,
    border: &'static str,
    code_background: &'static str,
    accent: &'static str,
}

const LIGHT: Palette = Palette {
    background: "#ffffff",
    text: "#1f2328",
    muted: "#656d76",
    border: "#d0d7de",
    code_background: "#f6f8fa",
    accent: "#0969da",
};

const DARK: Palette = Palette {
    background: "#0d1117",
    text: "#e6edf3",
    muted: "#8d96a0",
    border: "#30363d",
    code_background: "#161b22",
    accent: "#4493f8",
};

fn stylesheet(theme: Theme) -> String {
    let p = match theme {
        Theme::Dark => &DARK,
        Theme::Light | Theme::Auto => &LIGHT,
    };
    format!(
        r#"body {{ margin: 0; background: {bg}; color: {text}; }}
.document {{ max-width: 46rem; margin: 2rem auto; padding: 0 1rem; font: 16px/1.6 -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; }}
h1, h2, h3, h4, h5, h6 {{ line-height: 1.25; margin: 1.5em 0 0.5em; }}
a {{ color: {accent}; }}
code {{ font-family: ui-monospace, SFMono-Regular, Menlo, monospace; background: {code_bg}; padding: 0.1em 0.3em; border-radius: 4px; }}
pre {{ background: {code_bg}; padding: 1em; overflow-x: auto; border-radius: 6px; }}
pre code {{ padding: 0; background: none; }}
blockquote {{ margin: 0; padding: 0 1em; color: {muted}; border-left: 4px solid {border}; }}
table {{ border-collapse: collapse; }}
th, td {{ border: 1px solid {border}; padding: 0.4em 0.8em; }}
th {{ background: {code_bg}; }}
hr {{ border: 0; border-top: 1px solid {border}; }}
ul[data-type="taskList"] {{ list-style: none; padding-left: 0.5em; }}
ul[data-type="taskList"] li {{ display: flex; gap: 0.5em; }}
.callout {{ border-left: 4px solid {accent}; background: {code_bg}; padding: 0.5em 1em; margin: 1em 0; border-radius: 4px; }}
.callout-title {{ font-weight: 600; }}
.callout-tip {{ border-left-color: #1a7f37; }}
.callout-warning {{ border-left-color: #9a6700; }}
.callout-danger {{ border-left-color: #cf222e; }}
.tag {{ color: var(--tag-color, {accent}); font-weight: 500; }}
.wiki-link {{ text-decoration: underline dotted; }}
"#,
        bg = p.background,
        text = p.text,
        muted = p.muted,
        border = p.border,
        code_bg = p.code_background,
        accent = p.accent,
    )
}
