// ABOUTME: HTML helpers for step content
// ABOUTME: Allow-list sanitizing, plain-text extraction, escaping and <img> reference scanning

use quick_xml::escape::{escape as xml_escape, unescape};
use regex::Regex;
use std::borrow::Cow;
use std::ops::Range;
use std::sync::OnceLock;

/// Tags kept by [`sanitize_html`]. Everything else is stripped, keeping its text.
pub const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "strong", "em", "u", "s", "span", "div", "img", "a", "ul", "ol", "li", "h1", "h2",
    "h3", "h4", "h5", "h6", "blockquote", "code", "pre",
];

const GLOBAL_ATTRS: &[&str] = &["style", "class"];
const IMG_ATTRS: &[&str] = &["src", "alt", "width", "height"];
const LINK_ATTRS: &[&str] = &["href", "target", "rel"];
const URL_PROTOCOLS: &[&str] = &["http", "https", "mailto"];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"<[^<]+?>")
}

fn entity_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"&#?[a-zA-Z0-9]+;")
}

fn element_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"<(/?)([a-zA-Z][a-zA-Z0-9]*)([^>]*)>")
}

fn attribute_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#,
    )
}

fn dropped_block_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<!--.*?-->",
    )
}

fn img_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r#"<img([^>]*?)src=["']([^"']+)["']([^>]*?)>"#)
}

/// Escape text for use in element content or a quoted attribute value.
pub fn escape(text: &str) -> Cow<'_, str> {
    xml_escape(text)
}

/// Remove all markup and return the concatenated text with entities decoded.
pub fn strip_tags(html: &str) -> String {
    unescape_text(&tag_pattern().replace_all(html, ""))
}

/// Decode HTML entities in text or an attribute value.
///
/// Each entity is decoded on its own: named HTML5 entities and numeric
/// references are replaced, while unknown names and bare `&` stay literal.
pub fn unescape_text(text: &str) -> String {
    entity_pattern()
        .replace_all(text, |cap: &regex::Captures| match unescape(&cap[0]) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => cap[0].to_string(),
        })
        .into_owned()
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Plain-text excerpt of step content: markup stripped, trimmed, capped.
pub fn excerpt(html: &str, max_chars: usize) -> String {
    truncate_chars(strip_tags(html).trim(), max_chars)
}

fn attribute_allowed(tag: &str, name: &str) -> bool {
    GLOBAL_ATTRS.contains(&name)
        || (tag == "img" && IMG_ATTRS.contains(&name))
        || (tag == "a" && LINK_ATTRS.contains(&name))
}

fn url_allowed(value: &str) -> bool {
    let value = value.trim();
    match value.find(':') {
        // A colon after the first slash, query or fragment is not a scheme
        Some(idx) if !value[..idx].contains(['/', '?', '#']) => {
            let scheme = value[..idx].to_ascii_lowercase();
            URL_PROTOCOLS.contains(&scheme.as_str())
        }
        _ => true,
    }
}

fn sanitize_element(closing: bool, tag: &str, attrs: &str) -> String {
    if closing {
        return format!("</{}>", tag);
    }

    let mut out = format!("<{}", tag);
    for cap in attribute_pattern().captures_iter(attrs) {
        let name = cap[1].to_ascii_lowercase();
        if !attribute_allowed(tag, &name) {
            continue;
        }
        // Stored values are already escaped; decode first so saving again is a no-op
        let value = unescape_text(
            cap.get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map(|m| m.as_str())
                .unwrap_or(""),
        );
        if (name == "href" || name == "src") && !url_allowed(&value) {
            continue;
        }
        out.push_str(&format!(" {}=\"{}\"", name, escape(&value)));
    }
    out.push('>');
    out
}

/// Reduce step markup to the allowed tags and attributes.
///
/// Script and style blocks and comments are dropped with their content. Other
/// disallowed tags are removed but their text is kept. Link and image URLs are
/// limited to http, https, mailto and relative references.
pub fn sanitize_html(html: &str) -> String {
    let without_blocks = dropped_block_pattern().replace_all(html, "");

    element_pattern()
        .replace_all(&without_blocks, |cap: &regex::Captures| {
            let tag = cap[2].to_ascii_lowercase();
            if ALLOWED_TAGS.contains(&tag.as_str()) {
                sanitize_element(!cap[1].is_empty(), &tag, &cap[3])
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// An `<img>` element located in a piece of markup.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    /// Byte range of the whole tag
    pub span: Range<usize>,
    pub before_src: String,
    pub src: String,
    pub after_src: String,
}

impl ImageRef {
    /// The same tag with its `src` replaced.
    pub fn with_src(&self, src: &str) -> String {
        format!("<img{}src=\"{}\"{}>", self.before_src, src, self.after_src)
    }
}

pub fn image_refs(html: &str) -> Vec<ImageRef> {
    img_pattern()
        .captures_iter(html)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            Some(ImageRef {
                span: whole.range(),
                before_src: cap[1].to_string(),
                src: cap[2].to_string(),
                after_src: cap[3].to_string(),
            })
        })
        .collect()
}

/// Splice replacements into `html`. `replacements` pairs with `refs`; `None`
/// keeps the original tag.
pub fn replace_image_refs(html: &str, refs: &[ImageRef], replacements: &[Option<String>]) -> String {
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    for (image, replacement) in refs.iter().zip(replacements) {
        if let Some(replacement) = replacement {
            out.push_str(&html[cursor..image.span.start]);
            out.push_str(replacement);
            cursor = image.span.end;
        }
    }
    out.push_str(&html[cursor..]);
    out
}
