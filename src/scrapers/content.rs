//! Job description normalization: platforms hand back HTML, markdown or
//! plain text, usually without saying which. Everything is reduced to
//! markdown or plain before persistence.

use std::collections::HashSet;

use ammonia::Builder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescriptionFormat {
    Markdown,
    #[default]
    Plain,
}

impl DescriptionFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptionFormat::Markdown => "markdown",
            DescriptionFormat::Plain => "plain",
        }
    }
}

/// Tags that survive sanitization. Script/style/iframe and friends are
/// stripped along with all event-handler attributes.
const ALLOWED_TAGS: &[&str] = &[
    "a", "b", "strong", "i", "em", "u", "p", "br", "div", "span", "ul", "ol", "li", "h1", "h2",
    "h3", "h4", "h5", "h6", "table", "thead", "tbody", "tr", "td", "th", "blockquote", "pre",
    "code", "hr",
];

/// Normalize a raw description payload to (text, format).
pub fn normalize_description(raw: &str) -> (String, DescriptionFormat) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (String::new(), DescriptionFormat::Plain);
    }

    if looks_like_html(trimmed) {
        let sanitized = sanitize_html(trimmed);
        let markdown = htmd::convert(&sanitized).unwrap_or(sanitized);
        return (markdown.trim().to_string(), DescriptionFormat::Markdown);
    }

    let format = if looks_like_markdown(trimmed) {
        DescriptionFormat::Markdown
    } else {
        DescriptionFormat::Plain
    };
    (trimmed.to_string(), format)
}

fn sanitize_html(html: &str) -> String {
    let tags: HashSet<&str> = ALLOWED_TAGS.iter().copied().collect();
    Builder::default()
        .tags(tags)
        .link_rel(None)
        .clean(html)
        .to_string()
}

fn looks_like_html(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["<p", "<div", "<ul", "<ol", "<br", "<h1", "<h2", "<h3", "<li", "<strong", "<em", "<span"]
        .iter()
        .any(|tag| lower.contains(tag))
}

/// Heuristic markdown detection for payloads that are not HTML: headings,
/// list bullets, emphasis, links. One hit on a line start (or an inline
/// pair) is enough.
fn looks_like_markdown(text: &str) -> bool {
    let mut hits = 0;
    for line in text.lines() {
        let line = line.trim_start();
        if line.starts_with('#')
            || line.starts_with("- ")
            || line.starts_with("* ")
            || line.starts_with("> ")
            || starts_with_ordered_marker(line)
        {
            hits += 1;
        }
    }
    if hits >= 2 {
        return true;
    }
    text.contains("**") || text.contains("](") || text.contains("```")
}

fn starts_with_ordered_marker(line: &str) -> bool {
    let digits: String = line.chars().take_while(|c| c.is_ascii_digit()).collect();
    !digits.is_empty() && line[digits.len()..].starts_with(". ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_sanitized_and_converted() {
        let raw = "<p>We are hiring.</p><script>alert(1)</script><ul><li>Rust</li></ul>";
        let (text, format) = normalize_description(raw);
        assert_eq!(format, DescriptionFormat::Markdown);
        assert!(text.contains("We are hiring."));
        assert!(text.contains("Rust"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("<script"));
    }

    #[test]
    fn markdown_text_is_classified_markdown() {
        let raw = "## About the role\n- Build services\n- Review code";
        let (text, format) = normalize_description(raw);
        assert_eq!(format, DescriptionFormat::Markdown);
        assert_eq!(text, raw);
    }

    #[test]
    fn ordered_lists_count_as_markdown() {
        let raw = "Responsibilities:\n1. Ship features\n2. Fix bugs";
        let (_, format) = normalize_description(raw);
        assert_eq!(format, DescriptionFormat::Markdown);
    }

    #[test]
    fn plain_text_stays_plain() {
        let raw = "We are a small team looking for a backend engineer. Apply by email.";
        let (text, format) = normalize_description(raw);
        assert_eq!(format, DescriptionFormat::Plain);
        assert_eq!(text, raw);
    }

    #[test]
    fn empty_input_is_plain_empty() {
        let (text, format) = normalize_description("   ");
        assert_eq!(format, DescriptionFormat::Plain);
        assert!(text.is_empty());
    }
}
