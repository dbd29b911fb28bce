use std::sync::LazyLock;

use regex::Regex;

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

static PAGE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*-{3,}\s*page(?:\s+\d+)?\s*-{3,}\s*$")
        .expect("valid regex")
});

/// Section labels that carry no information and are omitted from
/// embedding text.
const GENERIC_SECTIONS: &[&str] = &["general", "default", "undefined"];

/// Normalize page text before it is sent to the extractor: collapse runs
/// of three or more newlines and trim surrounding whitespace.
pub fn clean_page_text(text: &str) -> String {
    EXCESS_BLANK_LINES
        .replace_all(text, "\n\n")
        .trim()
        .to_string()
}

/// Split a parsed document into per-page texts.
///
/// Pages are separated by form-feed characters (as emitted by most text
/// converters) or by `--- page N ---` marker lines. Blank pages are
/// dropped; page order is preserved.
pub fn split_pages(content: &str) -> Vec<String> {
    let raw: Vec<&str> = if content.contains('\u{0c}') {
        content.split('\u{0c}').collect()
    } else {
        PAGE_BREAK.split(content).collect()
    };

    raw.iter()
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the embedding text for a line item.
///
/// Shape: `Context: {sender} ({section}) | Item: {description} ({code})`,
/// omitting the sender when unknown, the section when it is a generic
/// label, and the code when absent.
pub fn build_search_text(
    sender_name: Option<&str>,
    section: &str,
    description: &str,
    item_code: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(sender) = sender_name {
        parts.push(format!("Context: {sender}"));
    }
    if !section.is_empty()
        && !GENERIC_SECTIONS.contains(&section.to_lowercase().as_str())
    {
        parts.push(format!("({section})"));
    }

    let prefix = parts.join(" ");
    let mut text = format!("{prefix} | Item: {description}");
    if let Some(code) = item_code {
        text.push_str(&format!(" ({code})"));
    }
    text
}

/// Parse a raw money amount as printed on a document ("1.234,56 EUR",
/// "$1,234.56") into a number. Returns `None` when no amount can be read.
///
/// The rightmost separator is treated as the decimal point when one or two
/// digits follow it; everything else is a thousands separator.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let decimal_sep = cleaned
        .rfind([',', '.'])
        .filter(|&idx| {
            let fraction = &cleaned[idx + 1..];
            (1..=2).contains(&fraction.len())
                && fraction.chars().all(|c| c.is_ascii_digit())
        })
        .map(|idx| cleaned.as_bytes()[idx] as char);

    let mut normalized = String::with_capacity(cleaned.len());
    for c in cleaned.chars() {
        match c {
            ',' | '.' if Some(c) == decimal_sep => normalized.push('.'),
            ',' | '.' => {}
            c => normalized.push(c),
        }
    }

    normalized.parse().ok()
}

/// Strip a Markdown code fence from model output, if present.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Drop the fence line (which may carry a language tag) and the
    // closing fence.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}
