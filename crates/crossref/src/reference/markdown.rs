//
// reference/markdown.rs
//
// Minimal markdown scanning for the file-system document source: structured
// links, cleaned text and front matter. Offsets are byte offsets into the
// original text; cleaning blanks regions instead of removing them so offsets
// found in the cleaned text are valid in the original.
//

use std::ops::Range;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

/// A link parsed out of document text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLink {
    /// Target as written, without anchor
    pub target: String,
    pub subpath: Option<String>,
    /// Alias or link text, if any
    pub display: Option<String>,
    /// Byte range of the whole link syntax
    pub range: Range<usize>,
}

fn wikilink_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"!?\[\[([^\[\]\|#]*)(?:#([^\[\]\|]*))?(?:\|([^\[\]]*))?\]\]")
            .expect("wikilink regex is valid")
    })
}

fn markdown_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"!?\[([^\[\]]*)\]\(([^()\s]+)\)").expect("markdown link regex is valid")
    })
}

fn inline_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`[^`\n]+`").expect("inline code regex is valid"))
}

/// Byte range of a leading `---` front matter block, including its fences
pub fn frontmatter_range(text: &str) -> Option<Range<usize>> {
    let rest = text.strip_prefix("---\n").or_else(|| text.strip_prefix("---\r\n"))?;
    let body_start = text.len() - rest.len();
    let mut offset = body_start;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        offset += line.len();
        if trimmed == "---" || trimmed == "..." {
            return Some(0..offset);
        }
    }
    None
}

/// Byte ranges of fenced code blocks (``` or ~~~), fences included.
/// An unterminated fence runs to the end of the text.
fn fenced_code_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut open: Option<(usize, &str)> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let fence = if trimmed.starts_with("```") {
            Some("```")
        } else if trimmed.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };

        match (open, fence) {
            (None, Some(f)) => open = Some((offset, f)),
            (Some((start, f)), Some(g)) if f == g => {
                ranges.push(start..offset + line.len());
                open = None;
            }
            _ => {}
        }
        offset += line.len();
    }

    if let Some((start, _)) = open {
        ranges.push(start..text.len());
    }
    ranges
}

/// Replace every byte in `ranges` with a space, keeping newlines.
fn blank_ranges(text: &str, ranges: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut sorted: Vec<&Range<usize>> = ranges.iter().collect();
    sorted.sort_by_key(|r| r.start);

    for range in sorted {
        let start = range.start.max(cursor);
        if start >= range.end {
            continue;
        }
        out.push_str(&text[cursor..start]);
        for c in text[start..range.end].chars() {
            if c == '\n' {
                out.push('\n');
            } else {
                out.extend(std::iter::repeat(' ').take(c.len_utf8()));
            }
        }
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Text with front matter and code (fenced and inline) blanked out
fn mask_code(text: &str) -> String {
    let mut ranges = fenced_code_ranges(text);
    if let Some(fm) = frontmatter_range(text) {
        ranges.push(fm);
    }
    let masked = blank_ranges(text, &ranges);
    let inline: Vec<Range<usize>> = inline_code_regex()
        .find_iter(&masked)
        .map(|m| m.range())
        .collect();
    blank_ranges(&masked, &inline)
}

fn is_external(target: &str) -> bool {
    target.contains("://") || target.starts_with("mailto:") || target.starts_with('#')
}

fn decode_spaces(target: &str) -> String {
    target.replace("%20", " ")
}

/// Parse wikilinks and markdown links, ignoring anything inside code.
/// Links are returned in document order.
pub fn parse_links(text: &str) -> Vec<ParsedLink> {
    let masked = mask_code(text);
    let mut links = Vec::new();

    for caps in wikilink_regex().captures_iter(&masked) {
        let Some(whole) = caps.get(0) else { continue };
        let target = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if target.is_empty() {
            continue;
        }
        links.push(ParsedLink {
            target: target.to_string(),
            subpath: caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty()),
            display: caps
                .get(3)
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty()),
            range: whole.range(),
        });
    }

    for caps in markdown_link_regex().captures_iter(&masked) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(href) = caps.get(2).map(|m| m.as_str()) else { continue };
        if is_external(href) {
            continue;
        }
        let (target, subpath) = match href.split_once('#') {
            Some((t, s)) => (t, Some(decode_spaces(s)).filter(|s| !s.is_empty())),
            None => (href, None),
        };
        if target.is_empty() {
            continue;
        }
        links.push(ParsedLink {
            target: decode_spaces(target),
            subpath,
            display: caps
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty()),
            range: whole.range(),
        });
    }

    links.sort_by_key(|l| l.range.start);
    links
}

/// Text handed to pattern detectors: code, front matter and structured links
/// are blanked so detectors neither match inside them nor shift offsets.
pub fn clean_text(text: &str) -> String {
    let masked = mask_code(text);
    let link_ranges: Vec<Range<usize>> = parse_links(text).into_iter().map(|l| l.range).collect();
    blank_ranges(&masked, &link_ranges)
}

fn strip_value(value: &str) -> String {
    let value = value.trim().trim_matches('"').trim_matches('\'').trim();
    let value = value
        .strip_prefix("[[")
        .and_then(|v| v.strip_suffix("]]"))
        .unwrap_or(value);
    value.trim().to_string()
}

/// Parse a simple YAML-like front matter block.
///
/// Supports `key: value`, inline lists `key: [a, b]` and block lists
/// (`key:` followed by `- item` lines). Anything else is ignored.
pub fn parse_frontmatter(text: &str) -> IndexMap<String, Vec<String>> {
    let mut fields: IndexMap<String, Vec<String>> = IndexMap::new();
    let Some(range) = frontmatter_range(text) else {
        return fields;
    };

    let mut current: Option<String> = None;
    for line in text[range].lines().skip(1) {
        let trimmed = line.trim();
        if trimmed == "---" || trimmed == "..." || trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            if let Some(key) = &current {
                let value = strip_value(item);
                if !value.is_empty() {
                    fields.entry(key.clone()).or_default().push(value);
                }
            }
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            current = None;
            continue;
        };
        let key = key.trim().to_string();
        let value = value.trim();
        let entry = fields.entry(key.clone()).or_default();

        if let Some(list) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            if !list.starts_with('[') {
                entry.extend(list.split(',').map(strip_value).filter(|v| !v.is_empty()));
                current = None;
                continue;
            }
        }
        if value.is_empty() {
            current = Some(key);
        } else {
            entry.push(strip_value(value));
            current = None;
        }
    }
    fields
}
