//! Body markup rewriting.
//!
//! Three passes over decoded record text:
//!
//! * numbered style markers (`` `3` ``) expand to the header's markup,
//! * `<link>` and `<meta>` tags are dropped,
//! * cross-references (`@@@LINK=word`, `href="entry://word"`) become
//!   `x-dictionary:r:` links keyed by the target's normalized key.

use std::borrow::Cow;
use std::sync::OnceLock;

use quick_xml::escape::{escape, unescape};
use regex::{Captures, Regex};

use super::keys::normalize_key;
use crate::mdict::StyleSheet;

/// Scheme prefix of in-bundle links. The rest of the href is a normalized key.
pub const LINK_SCHEME: &str = "x-dictionary:r:";

static STYLE_PATTERN: OnceLock<Regex> = OnceLock::new();
static SOURCE_TAG_PATTERN: OnceLock<Regex> = OnceLock::new();
static REDIRECT_PATTERN: OnceLock<Regex> = OnceLock::new();
static ENTRY_HREF_PATTERN: OnceLock<Regex> = OnceLock::new();

fn style_regex() -> &'static Regex {
    STYLE_PATTERN.get_or_init(|| Regex::new(r"`(\d+)`").expect("Invalid style marker regex"))
}

fn source_tag_regex() -> &'static Regex {
    SOURCE_TAG_PATTERN
        .get_or_init(|| Regex::new(r"(?i)<(?:link|meta)\b[^>]*>").expect("Invalid tag regex"))
}

fn redirect_regex() -> &'static Regex {
    REDIRECT_PATTERN
        .get_or_init(|| Regex::new(r"@@@LINK=([^<\r\n]+)").expect("Invalid redirect regex"))
}

fn entry_href_regex() -> &'static Regex {
    ENTRY_HREF_PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)href\s*=\s*(?:"entry://([^"]*)"|'entry://([^']*)')"#)
            .expect("Invalid entry href regex")
    })
}

/// Expands backtick style markers. Each marker closes the previously opened
/// style; the last one is closed at the end of the text. Unknown ids only
/// close the current style.
pub fn apply_styles(text: &str, styles: &StyleSheet) -> String {
    if styles.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut closing = "";
    for caps in style_regex().captures_iter(text) {
        let Some(marker) = caps.get(0) else { continue };
        out.push_str(&text[last..marker.start()]);
        out.push_str(closing);
        closing = "";
        if let Ok(id) = caps[1].parse::<u32>()
            && let Some((open, close)) = styles.get(id)
        {
            out.push_str(open);
            closing = close;
        }
        last = marker.end();
    }
    out.push_str(&text[last..]);
    out.push_str(closing);
    out
}

/// Removes `<link …>` and `<meta …>` tags.
pub fn strip_source_tags(text: &str) -> Cow<'_, str> {
    source_tag_regex().replace_all(text, "")
}

/// Href for a link to `normalized_key`.
pub fn link_href(normalized_key: &str) -> String {
    format!("{}{}", LINK_SCHEME, normalized_key)
}

/// Rewrites every cross-reference and returns the rewritten text with the
/// normalized target of each link, in order of appearance.
pub fn rewrite_links(text: &str) -> (String, Vec<String>) {
    let mut targets = Vec::new();

    let text = redirect_regex().replace_all(text, |caps: &Captures<'_>| {
        let target = caps[1].trim();
        let key = normalize_key(target);
        if key.is_empty() {
            return caps[0].to_string();
        }
        let anchor = format!(
            r#"<a href="{}">{}</a>"#,
            escape(link_href(&key).as_str()),
            escape(target)
        );
        targets.push(key);
        anchor
    });

    let text = entry_href_regex().replace_all(&text, |caps: &Captures<'_>| {
        let raw = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        // Fragments address a section inside the target entry.
        let raw = raw.split('#').next().unwrap_or_default();
        let target = unescape(raw).unwrap_or(Cow::Borrowed(raw));
        let key = normalize_key(&target);
        if key.is_empty() {
            return caps[0].to_string();
        }
        let attr = format!(r#"href="{}""#, escape(link_href(&key).as_str()));
        targets.push(key);
        attr
    });

    (text.into_owned(), targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_becomes_anchor_to_normalized_key() {
        let (text, links) = rewrite_links("@@@LINK=Foo Bar\r\n");
        assert_eq!(
            text,
            "<a href=\"x-dictionary:r:foo bar\">Foo Bar</a>\r\n"
        );
        assert_eq!(links, ["foo bar"]);
    }

    #[test]
    fn redirect_stops_at_markup() {
        let (text, links) = rewrite_links("see @@@LINK=Dog<br>");
        assert_eq!(text, "see <a href=\"x-dictionary:r:dog\">Dog</a><br>");
        assert_eq!(links, ["dog"]);
    }

    #[test]
    fn entry_hrefs_are_rewritten_in_place() {
        let body = r#"<a href="entry://Café#sense2">x</a> <a HREF='entry://A&amp;B'>y</a>"#;
        let (text, links) = rewrite_links(body);
        assert_eq!(
            text,
            r#"<a href="x-dictionary:r:café">x</a> <a href="x-dictionary:r:a&amp;b">y</a>"#
        );
        assert_eq!(links, ["café", "a&b"]);
    }

    #[test]
    fn other_links_are_untouched() {
        let body = r#"<a href="https://example.org">web</a> <img src="sound://a.mp3">"#;
        let (text, links) = rewrite_links(body);
        assert_eq!(text, body);
        assert!(links.is_empty());
    }

    #[test]
    fn blank_redirect_is_left_alone() {
        let (text, links) = rewrite_links("@@@LINK=   \n");
        assert_eq!(text, "@@@LINK=   \n");
        assert!(links.is_empty());
    }

    #[test]
    fn link_and_meta_tags_are_stripped() {
        let body = r#"<LINK rel="stylesheet" href="a.css"/><meta charset="utf-8"><b>ok</b>"#;
        assert_eq!(strip_source_tags(body), "<b>ok</b>");
        assert_eq!(strip_source_tags("<linkage>"), "<linkage>");
    }

    #[test]
    fn styles_close_before_opening_next() {
        let styles = StyleSheet::parse("1\n<b>\n</b>\n2\n<i>\n</i>");
        assert_eq!(apply_styles("`1`a`2`b", &styles), "<b>a</b><i>b</i>");
        assert_eq!(apply_styles("`1`a`7`b", &styles), "<b>a</b>b");
        assert_eq!(apply_styles("plain", &styles), "plain");
    }

    #[test]
    fn empty_stylesheet_keeps_markers() {
        assert_eq!(apply_styles("`1`a", &StyleSheet::default()), "`1`a");
    }
}
