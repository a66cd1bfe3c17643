//! Rich text blocks and their text/HTML renderings

use serde::{Deserialize, Serialize};

use crate::helpers::html_escape;

/// A structured text block as delivered by the CMS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichTextBlock {
    #[serde(rename = "type", default = "default_block_type")]
    pub block_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub spans: Vec<Span>,
    /// Image source, for `image` blocks
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

fn default_block_type() -> String {
    "paragraph".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    Preformatted,
    ListItem,
    OrderedListItem,
    Image,
    Unknown,
}

impl RichTextBlock {
    pub fn paragraph(text: &str) -> Self {
        Self {
            block_type: default_block_type(),
            text: text.to_string(),
            spans: Vec::new(),
            url: None,
            alt: None,
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self.block_type.as_str() {
            "paragraph" => BlockKind::Paragraph,
            "preformatted" => BlockKind::Preformatted,
            "list-item" => BlockKind::ListItem,
            "o-list-item" => BlockKind::OrderedListItem,
            "image" => BlockKind::Image,
            t => match t.strip_prefix("heading").and_then(|n| n.parse::<u8>().ok()) {
                Some(level @ 1..=6) => BlockKind::Heading(level),
                _ => BlockKind::Unknown,
            },
        }
    }
}

/// Inline formatting over a character range of a block's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub span_type: String,
    #[serde(default)]
    pub data: Option<SpanData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanData {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

impl Span {
    fn open_tag(&self) -> String {
        match self.span_type.as_str() {
            "strong" => "<strong>".to_string(),
            "em" => "<em>".to_string(),
            "hyperlink" => {
                let url = self
                    .data
                    .as_ref()
                    .and_then(|d| d.url.as_deref())
                    .unwrap_or("#");
                let target = self
                    .data
                    .as_ref()
                    .and_then(|d| d.target.as_deref())
                    .map(|t| format!(r#" target="{}" rel="noopener""#, html_escape(t)))
                    .unwrap_or_default();
                format!(r#"<a href="{}"{}>"#, html_escape(url), target)
            }
            other => format!(r#"<span class="{}">"#, html_escape(other)),
        }
    }

    fn close_tag(&self) -> &'static str {
        match self.span_type.as_str() {
            "strong" => "</strong>",
            "em" => "</em>",
            "hyperlink" => "</a>",
            _ => "</span>",
        }
    }
}

/// Plain text of the blocks, joined by a single space
pub fn as_text<'a, I>(blocks: I) -> String
where
    I: IntoIterator<Item = &'a RichTextBlock>,
{
    blocks
        .into_iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the blocks as HTML, grouping consecutive list items
pub fn as_html(blocks: &[RichTextBlock]) -> String {
    let mut html = String::new();
    let mut open_list: Option<BlockKind> = None;

    for block in blocks {
        let kind = block.kind();
        let is_list = matches!(kind, BlockKind::ListItem | BlockKind::OrderedListItem);

        if open_list.is_some() && open_list != Some(kind) {
            html.push_str(list_close(open_list));
            open_list = None;
        }
        if is_list && open_list.is_none() {
            html.push_str(if kind == BlockKind::ListItem {
                "<ul>"
            } else {
                "<ol>"
            });
            open_list = Some(kind);
        }

        let inner = render_spans(&block.text, &block.spans);
        match kind {
            BlockKind::Paragraph | BlockKind::Unknown => {
                html.push_str(&format!("<p>{}</p>", inner));
            }
            BlockKind::Heading(level) => {
                let id = slug::slugify(&block.text);
                html.push_str(&format!(
                    r#"<h{level} id="{}">{}</h{level}>"#,
                    id,
                    inner,
                    level = level
                ));
            }
            BlockKind::Preformatted => {
                html.push_str(&format!("<pre>{}</pre>", inner));
            }
            BlockKind::ListItem | BlockKind::OrderedListItem => {
                html.push_str(&format!("<li>{}</li>", inner));
            }
            BlockKind::Image => {
                if let Some(ref url) = block.url {
                    html.push_str(&format!(
                        r#"<p class="block-img"><img src="{}" alt="{}"></p>"#,
                        html_escape(url),
                        html_escape(block.alt.as_deref().unwrap_or(""))
                    ));
                }
            }
        }
    }

    html.push_str(list_close(open_list));
    html
}

fn list_close(kind: Option<BlockKind>) -> &'static str {
    match kind {
        Some(BlockKind::ListItem) => "</ul>",
        Some(BlockKind::OrderedListItem) => "</ol>",
        _ => "",
    }
}

/// Escape `text` and wrap the span ranges (character offsets) in tags.
/// Spans out of range are ignored; overlapping spans are split so the
/// tags stay nested without changing which characters each one covers.
fn render_spans(text: &str, spans: &[Span]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut spans: Vec<&Span> = spans
        .iter()
        .filter(|s| s.start < s.end && s.end <= chars.len())
        .collect();
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut out = String::with_capacity(text.len());
    let mut open: Vec<&Span> = Vec::new();
    for i in 0..=chars.len() {
        // Spans crossing an ending one are closed with it and reopened after
        let mut reopen: Vec<&Span> = Vec::new();
        while open.iter().any(|s| s.end <= i) {
            let Some(top) = open.pop() else { break };
            out.push_str(top.close_tag());
            if top.end > i {
                reopen.push(top);
            }
        }
        for span in reopen.into_iter().rev() {
            out.push_str(&span.open_tag());
            open.push(span);
        }
        for span in spans.iter().filter(|s| s.start == i) {
            out.push_str(&span.open_tag());
            open.push(*span);
        }
        if let Some(&c) = chars.get(i) {
            match c {
                '\n' => out.push_str("<br />"),
                c => out.push_str(&html_escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
    }
    while let Some(span) = open.pop() {
        out.push_str(span.close_tag());
    }
    out
}
