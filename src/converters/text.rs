//! Text-family converters: plain text, Markdown, HTML.
//!
//! Inputs are expected to be UTF-8; the engine normalizes text-like sources
//! before any of these run. Markdown rendering covers the block constructs
//! that appear in ordinary uploads (headings, lists, fenced code,
//! paragraphs) plus inline code, emphasis, and links.

use crate::registry::ConverterReport;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;

pub fn txt_to_html(input: &Path, output: &Path) -> ConverterReport {
    convert_text(input, output, |text| {
        let body = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("<p>{}</p>\n", escape_html(p).replace('\n', "<br>\n")))
            .collect::<String>();
        html_document(&title_for(input), &body)
    })
    .into()
}

pub fn txt_to_md(input: &Path, output: &Path) -> ConverterReport {
    convert_text(input, output, |text| {
        let mut out = text.replace("\r\n", "\n");
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    })
    .into()
}

pub fn md_to_html(input: &Path, output: &Path) -> ConverterReport {
    convert_text(input, output, |text| {
        html_document(&title_for(input), &render_markdown(text))
    })
    .into()
}

pub fn md_to_txt(input: &Path, output: &Path) -> ConverterReport {
    convert_text(input, output, strip_markdown).into()
}

pub fn html_to_txt(input: &Path, output: &Path) -> ConverterReport {
    convert_text(input, output, strip_html).into()
}

/// Read UTF-8, transform, write. The message reports the output size.
fn convert_text(
    input: &Path,
    output: &Path,
    transform: impl FnOnce(&str) -> String,
) -> io::Result<String> {
    let text = fs::read_to_string(input)?;
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(&text);
    let rendered = transform(text);
    fs::write(output, &rendered)?;
    Ok(format!("Wrote {} bytes", rendered.len()))
}

fn title_for(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub(crate) fn html_document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        body
    )
}

// ── Markdown → HTML ──────────────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*#*$").unwrap());
static RE_LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*+]\s+(.*)$").unwrap());
static RE_INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static RE_EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").unwrap());

fn render_markdown(md: &str) -> String {
    let mut html = String::with_capacity(md.len() * 2);
    let mut paragraph: Vec<&str> = Vec::new();
    let mut in_list = false;
    let mut in_code = false;

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            flush_paragraph(&mut html, &mut paragraph);
            close_list(&mut html, &mut in_list);
            html.push_str(if in_code { "</code></pre>\n" } else { "<pre><code>" });
            in_code = !in_code;
            continue;
        }
        if in_code {
            html.push_str(&escape_html(line));
            html.push('\n');
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush_paragraph(&mut html, &mut paragraph);
            close_list(&mut html, &mut in_list);
        } else if let Some(caps) = RE_HEADING.captures(trimmed) {
            flush_paragraph(&mut html, &mut paragraph);
            close_list(&mut html, &mut in_list);
            let level = caps[1].len();
            html.push_str(&format!("<h{level}>{}</h{level}>\n", render_inline(&caps[2])));
        } else if let Some(caps) = RE_LIST_ITEM.captures(trimmed) {
            flush_paragraph(&mut html, &mut paragraph);
            if !in_list {
                html.push_str("<ul>\n");
                in_list = true;
            }
            html.push_str(&format!("<li>{}</li>\n", render_inline(&caps[1])));
        } else {
            close_list(&mut html, &mut in_list);
            paragraph.push(trimmed);
        }
    }

    if in_code {
        html.push_str("</code></pre>\n");
    }
    flush_paragraph(&mut html, &mut paragraph);
    close_list(&mut html, &mut in_list);
    html
}

fn flush_paragraph(html: &mut String, paragraph: &mut Vec<&str>) {
    if paragraph.is_empty() {
        return;
    }
    html.push_str(&format!("<p>{}</p>\n", render_inline(&paragraph.join(" "))));
    paragraph.clear();
}

fn close_list(html: &mut String, in_list: &mut bool) {
    if *in_list {
        html.push_str("</ul>\n");
        *in_list = false;
    }
}

fn render_inline(text: &str) -> String {
    let s = escape_html(text);
    let s = RE_INLINE_CODE.replace_all(&s, "<code>$1</code>");
    let s = RE_BOLD.replace_all(&s, "<strong>$1</strong>");
    let s = RE_EMPHASIS.replace_all(&s, "<em>$1</em>");
    RE_LINK
        .replace_all(&s, "<a href=\"$2\">$1</a>")
        .into_owned()
}

// ── Markdown → text ──────────────────────────────────────────────────────────

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static RE_HEADING_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static RE_LIST_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(\s*)[-*+]\s+").unwrap());
static RE_FENCE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*```.*\n?").unwrap());

fn strip_markdown(md: &str) -> String {
    let s = RE_FENCE_LINE.replace_all(md, "");
    let s = RE_IMAGE.replace_all(&s, "$1");
    let s = RE_LINK.replace_all(&s, "$1 ($2)");
    let s = RE_HEADING_MARK.replace_all(&s, "");
    let s = RE_LIST_MARK.replace_all(&s, "$1- ");
    let s = RE_BOLD.replace_all(&s, "$1");
    let s = RE_EMPHASIS.replace_all(&s, "$1");
    let s = RE_INLINE_CODE.replace_all(&s, "$1");
    let mut out = s.trim_end().to_string();
    out.push('\n');
    out
}

// ── HTML → text ──────────────────────────────────────────────────────────────

static RE_SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
static RE_BLOCK_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|title)>").unwrap());
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*){2,}").unwrap());

fn strip_html(html: &str) -> String {
    let s = RE_SCRIPT_STYLE.replace_all(html, "");
    let s = RE_BLOCK_END.replace_all(&s, "\n");
    let s = RE_TAG.replace_all(&s, "");
    let s = decode_entities(&s);
    let s = RE_BLANK_RUN.replace_all(&s, "\n\n");
    let mut out = s.trim().to_string();
    out.push('\n');
    out
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_blocks() {
        let html = render_markdown("# Title\n\nSome *soft* and **hard** text.\n\n- one\n- two\n\n```\nlet x = 1 < 2;\n```\n");
        assert!(html.contains("<h1>Title</h1>"), "{html}");
        assert!(html.contains("<em>soft</em>"), "{html}");
        assert!(html.contains("<strong>hard</strong>"), "{html}");
        assert!(html.contains("<ul>\n<li>one</li>\n<li>two</li>\n</ul>"), "{html}");
        assert!(html.contains("<pre><code>let x = 1 &lt; 2;\n</code></pre>"), "{html}");
    }

    #[test]
    fn markdown_links_and_code() {
        let html = render_inline("see [docs](https://example.com) and `a<b`");
        assert_eq!(
            html,
            "see <a href=\"https://example.com\">docs</a> and <code>a&lt;b</code>"
        );
    }

    #[test]
    fn markdown_to_text_drops_markup() {
        let txt = strip_markdown("## Intro\n\n**Bold** [link](http://x.y)\n* item\n");
        assert_eq!(txt, "Intro\n\nBold link (http://x.y)\n- item\n");
    }

    #[test]
    fn html_to_text() {
        let txt = strip_html(
            "<html><head><style>p{}</style><title>T</title></head><body><p>Fish &amp; chips</p><p>caf\u{e9}</p></body></html>",
        );
        assert_eq!(txt, "T\nFish & chips\ncaf\u{e9}\n");
    }

    #[test]
    fn escapes_html_specials() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
