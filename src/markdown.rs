//! Markdown model and XHTML rendering.
//!
//! The transcription model emits Markdown with TeX math (`\(..\)`,
//! `\[..\]`, `$..$`, `$$..$$`). This module keeps that text page-tagged
//! for figure matching, splits it into sections at top-level headings,
//! and renders the subset of Markdown the model produces into XHTML
//! suitable for EPUB content documents. Rendering is pure; the EPUB
//! layer handles packaging.

use once_cell::sync::Lazy;
use regex::Regex;

/// Transcribed markdown for one page of the source PDF.
///
/// Pages that fail transcription are absent from the sequence, so
/// `page_index` is not necessarily contiguous.
#[derive(Debug, Clone)]
pub struct PageText {
    /// Zero-based index of the originating PDF page.
    pub page_index: usize,
    pub markdown: String,
}

impl PageText {
    pub fn new(page_index: usize, markdown: impl Into<String>) -> Self {
        Self {
            page_index,
            markdown: markdown.into(),
        }
    }
}

/// A content section split out of the document at a top-level heading.
#[derive(Debug, Clone)]
pub struct Section {
    pub title: String,
    /// GitHub-style anchor slug, unique within the document.
    pub slug: String,
    pub markdown: String,
}

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*$").unwrap());
static DISPLAY_MATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\\[((?s).+?)\\\]|\$\$((?s).+?)\$\$").unwrap());
static INLINE_MATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\\(((?s).+?)\\\)|\$([^$\n]+)\$").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static CODE_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^!\[([^\]]*)\]\(([^)]+)\)\s*$").unwrap());

/// Generate a GitHub-style slug from heading text.
///
/// # Examples
///
/// ```
/// use paper2epub::markdown::slugify;
///
/// assert_eq!(slugify("3. Results and Discussion"), "3-results-and-discussion");
/// assert_eq!(slugify("  Multiple   Spaces  "), "multiple-spaces");
/// ```
pub fn slugify(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else if c.is_whitespace() || c == '-' || c == '_' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Parse a heading line, returning its level and text.
pub fn parse_heading(line: &str) -> Option<(usize, &str)> {
    HEADING
        .captures(line)
        .map(|caps| (caps.get(1).unwrap().len(), caps.get(2).unwrap().as_str()))
}

/// Join page markdown in page order into one document.
pub fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|p| p.markdown.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split document markdown into sections at level-1 and level-2 headings.
///
/// Content before the first such heading becomes a front section titled
/// `fallback_title`. Deeper headings stay inside their section. Slugs are
/// deduplicated with a numeric suffix so anchors stay unique.
pub fn split_sections(markdown: &str, fallback_title: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut title = fallback_title.to_string();
    let mut body = String::new();
    let mut in_code = false;

    let flush = |title: &str, body: &mut String, sections: &mut Vec<Section>| {
        if !body.trim().is_empty() || !sections.is_empty() {
            sections.push(Section {
                title: title.to_string(),
                slug: String::new(),
                markdown: std::mem::take(body),
            });
        } else {
            body.clear();
        }
    };

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
        }
        match parse_heading(line) {
            Some((level, text)) if !in_code && level <= 2 => {
                flush(&title, &mut body, &mut sections);
                title = text.to_string();
                body.push_str(line);
                body.push('\n');
            }
            _ => {
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    if !body.trim().is_empty() || sections.is_empty() {
        sections.push(Section {
            title,
            slug: String::new(),
            markdown: body,
        });
    }

    // Assign unique slugs after the split so duplicates get stable suffixes.
    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for section in &mut sections {
        let base = {
            let s = slugify(&section.title);
            if s.is_empty() { "section".to_string() } else { s }
        };
        let count = seen.entry(base.clone()).or_insert(0);
        *count += 1;
        section.slug = if *count == 1 {
            base
        } else {
            format!("{base}-{count}")
        };
    }

    sections
}

/// Escape text for inclusion in XML/XHTML content.
pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Render section markdown to an XHTML body fragment.
///
/// Covers the constructs the transcription model emits: ATX headings,
/// paragraphs, images, pipe tables, fenced code, block quotes, unordered
/// lists, and TeX math. Math is preserved as its source wrapped in
/// `class="math"` elements so a math renderer in the reading system can
/// typeset it.
pub fn render_xhtml_body(markdown: &str) -> String {
    let mut out = String::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut lines = markdown.lines().peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            flush_paragraph(&mut out, &mut paragraph);
            continue;
        }

        if let Some((level, text)) = parse_heading(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            let id = slugify(text);
            out.push_str(&format!(
                "<h{level} id=\"{id}\">{}</h{level}>\n",
                render_inline(text)
            ));
            continue;
        }

        if let Some(caps) = IMAGE.captures(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            let alt = escape_xml(&caps[1]);
            let src = escape_xml(&caps[2]);
            out.push_str(&format!(
                "<p class=\"figure\"><img src=\"{src}\" alt=\"{alt}\"/></p>\n"
            ));
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("```") {
            flush_paragraph(&mut out, &mut paragraph);
            let _lang = rest.trim();
            let mut code = String::new();
            for code_line in lines.by_ref() {
                if code_line.trim_start().starts_with("```") {
                    break;
                }
                code.push_str(code_line);
                code.push('\n');
            }
            out.push_str(&format!("<pre><code>{}</code></pre>\n", escape_xml(&code)));
            continue;
        }

        if is_display_math_open(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            let mut math = trimmed.to_string();
            while !display_math_closed(&math) {
                match lines.next() {
                    Some(next) => {
                        math.push('\n');
                        math.push_str(next);
                    }
                    None => break,
                }
            }
            out.push_str(&format!(
                "<div class=\"math\">{}</div>\n",
                escape_xml(&math)
            ));
            continue;
        }

        if trimmed.starts_with('|') {
            flush_paragraph(&mut out, &mut paragraph);
            let mut rows = vec![trimmed.to_string()];
            while let Some(next) = lines.peek() {
                if next.trim().starts_with('|') {
                    rows.push(lines.next().unwrap().trim().to_string());
                } else {
                    break;
                }
            }
            out.push_str(&render_table(&rows));
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("> ") {
            flush_paragraph(&mut out, &mut paragraph);
            let mut quote = vec![rest.to_string()];
            while let Some(next) = lines.peek() {
                if let Some(more) = next.trim().strip_prefix("> ") {
                    quote.push(more.to_string());
                    lines.next();
                } else {
                    break;
                }
            }
            out.push_str(&format!(
                "<blockquote><p>{}</p></blockquote>\n",
                render_inline(&quote.join(" "))
            ));
            continue;
        }

        if let Some(item) = list_item(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            let mut items = vec![item.to_string()];
            while let Some(next) = lines.peek() {
                if let Some(more) = list_item(next.trim()) {
                    items.push(more.to_string());
                    lines.next();
                } else {
                    break;
                }
            }
            out.push_str("<ul>\n");
            for item in &items {
                out.push_str(&format!("<li>{}</li>\n", render_inline(item)));
            }
            out.push_str("</ul>\n");
            continue;
        }

        paragraph.push(trimmed.to_string());
    }

    flush_paragraph(&mut out, &mut paragraph);
    out
}

fn flush_paragraph(out: &mut String, paragraph: &mut Vec<String>) {
    if paragraph.is_empty() {
        return;
    }
    let text = paragraph.join(" ");
    paragraph.clear();
    out.push_str(&format!("<p>{}</p>\n", render_inline(&text)));
}

fn list_item(line: &str) -> Option<&str> {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
}

fn is_display_math_open(line: &str) -> bool {
    line.starts_with("\\[") || line.starts_with("$$")
}

fn display_math_closed(text: &str) -> bool {
    if let Some(rest) = text.strip_prefix("$$") {
        rest.contains("$$")
    } else {
        text.len() > 2 && text.contains("\\]")
    }
}

fn render_table(rows: &[String]) -> String {
    let mut out = String::from("<table>\n");
    let mut body_started = false;
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<&str> = row
            .trim_matches('|')
            .split('|')
            .map(str::trim)
            .collect();
        // Alignment separator row (|---|:--:|) carries no content.
        let is_separator = cells
            .iter()
            .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')));
        if is_separator {
            body_started = true;
            continue;
        }
        let tag = if i == 0 && !body_started { "th" } else { "td" };
        out.push_str("<tr>");
        for cell in cells {
            out.push_str(&format!("<{tag}>{}</{tag}>", render_inline(cell)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
    out
}

/// Render inline markdown: escapes XML, then wraps math, bold, italic,
/// and code spans. Math is matched before emphasis so asterisks and
/// underscores inside TeX survive untouched.
fn render_inline(text: &str) -> String {
    let escaped = escape_xml(text);

    let with_display = DISPLAY_MATH.replace_all(&escaped, |caps: &regex::Captures| {
        let tex = caps.get(0).unwrap().as_str();
        format!("<span class=\"math display\">{tex}</span>")
    });
    let with_math = INLINE_MATH.replace_all(&with_display, |caps: &regex::Captures| {
        let tex = caps.get(0).unwrap().as_str();
        format!("<span class=\"math\">{tex}</span>")
    });

    let segments = split_outside_math(&with_math);
    let mut result = String::new();
    for (is_math, segment) in segments {
        if is_math {
            result.push_str(&segment);
        } else {
            let s = CODE_SPAN.replace_all(&segment, "<code>$1</code>");
            let s = BOLD.replace_all(&s, "<strong>$1</strong>");
            let s = ITALIC.replace_all(&s, "<em>$1</em>");
            result.push_str(&s);
        }
    }
    result
}

/// Split rendered text into math and non-math segments so emphasis
/// rewriting never reaches inside a math span.
fn split_outside_math(text: &str) -> Vec<(bool, String)> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("<span class=\"math") {
        let end = rest[start..]
            .find("</span>")
            .map(|e| start + e + "</span>".len())
            .unwrap_or(rest.len());
        if start > 0 {
            segments.push((false, rest[..start].to_string()));
        }
        segments.push((true, rest[start..end].to_string()));
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        segments.push((false, rest.to_string()));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Chapter One"), "chapter-one");
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("3.1 Results"), "31-results");
    }

    #[test]
    fn test_parse_heading() {
        assert_eq!(parse_heading("# Title"), Some((1, "Title")));
        assert_eq!(parse_heading("### Sub  "), Some((3, "Sub")));
        assert_eq!(parse_heading("Plain text"), None);
        assert_eq!(parse_heading("#NoSpace"), None);
    }

    #[test]
    fn test_split_sections_front_matter() {
        let md = "Abstract text.\n\n# Introduction\n\nBody.\n\n## Method\n\nMore.";
        let sections = split_sections(md, "My Paper");
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].title, "My Paper");
        assert_eq!(sections[1].title, "Introduction");
        assert_eq!(sections[1].slug, "introduction");
        assert_eq!(sections[2].title, "Method");
    }

    #[test]
    fn test_split_sections_duplicate_slugs() {
        let md = "# Results\n\na\n\n# Results\n\nb";
        let sections = split_sections(md, "Paper");
        assert_eq!(sections[0].slug, "results");
        assert_eq!(sections[1].slug, "results-2");
    }

    #[test]
    fn test_split_sections_deterministic() {
        let md = "# A\n\nx\n\n## B\n\ny";
        let first = split_sections(md, "t");
        let second = split_sections(md, "t");
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.slug, b.slug);
            assert_eq!(a.markdown, b.markdown);
        }
    }

    #[test]
    fn test_render_heading_and_paragraph() {
        let xhtml = render_xhtml_body("# Intro\n\nHello *world*.");
        assert!(xhtml.contains("<h1 id=\"intro\">Intro</h1>"));
        assert!(xhtml.contains("<p>Hello <em>world</em>.</p>"));
    }

    #[test]
    fn test_render_image() {
        let xhtml = render_xhtml_body("![Figure 1](images/figure_001.png)");
        assert!(xhtml.contains("<img src=\"images/figure_001.png\" alt=\"Figure 1\"/>"));
    }

    #[test]
    fn test_render_inline_math_preserved() {
        let xhtml = render_xhtml_body("Energy is \\(E = mc^2\\) here.");
        assert!(xhtml.contains("<span class=\"math\">\\(E = mc^2\\)</span>"));
    }

    #[test]
    fn test_render_math_protects_asterisks() {
        let xhtml = render_xhtml_body("Let $a * b * c$ hold.");
        assert!(xhtml.contains("$a * b * c$"));
        assert!(!xhtml.contains("<em>"));
    }

    #[test]
    fn test_render_display_math_block() {
        let xhtml = render_xhtml_body("\\[\nx = y\n\\]");
        assert!(xhtml.contains("<div class=\"math\">"));
        assert!(xhtml.contains("x = y"));
    }

    #[test]
    fn test_render_table() {
        let md = "| a | b |\n|---|---|\n| 1 | 2 |";
        let xhtml = render_xhtml_body(md);
        assert!(xhtml.contains("<th>a</th>"));
        assert!(xhtml.contains("<td>2</td>"));
    }

    #[test]
    fn test_render_escapes_xml() {
        let xhtml = render_xhtml_body("a < b & c > d");
        assert!(xhtml.contains("a &lt; b &amp; c &gt; d"));
    }

    #[test]
    fn test_join_pages_skips_empty() {
        let pages = vec![
            PageText::new(0, "First."),
            PageText::new(1, "   "),
            PageText::new(2, "Third."),
        ];
        assert_eq!(join_pages(&pages), "First.\n\nThird.");
    }
}
