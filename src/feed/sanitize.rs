use std::collections::{HashMap, HashSet};

use ammonia::{Builder, UrlRelative};
use url::Url;

/// Tags structural enough to be worth keeping from feed content: lists,
/// quotes, tables, inline formatting, links, and images. Everything else is
/// stripped but its text content is preserved.
fn allowed_tags() -> HashSet<&'static str> {
    [
        "p", "div", "br", "hr", "b", "i", "em", "strong", "u", "s", "sub", "sup", "ul", "ol", "li",
        "blockquote", "q", "cite", "table", "thead", "tbody", "tfoot", "tr", "td", "th", "a",
        "img", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "code", "span",
    ]
    .into_iter()
    .collect()
}

/// Tags whose content (not just the tag) is dropped entirely: active or
/// non-renderable surfaces, plus document-structure tags that have no
/// business appearing inside a feed entry.
fn clean_content_tags() -> HashSet<&'static str> {
    ["script", "style", "object", "embed", "iframe", "base", "link", "meta", "form"]
        .into_iter()
        .collect()
}

fn tag_attributes() -> HashMap<&'static str, HashSet<&'static str>> {
    let mut map = HashMap::new();
    map.insert("a", ["href"].into_iter().collect());
    map.insert("img", ["src", "alt", "title"].into_iter().collect());
    map
}

fn build(base: Option<&Url>) -> Builder<'static> {
    let mut builder = Builder::default();
    builder
        .tags(allowed_tags())
        .clean_content_tags(clean_content_tags())
        .tag_attributes(tag_attributes())
        .generic_attributes(HashSet::new())
        .link_rel(None)
        .url_schemes(["http", "https", "mailto"].into_iter().collect());

    match base {
        Some(base) => {
            builder.url_relative(UrlRelative::RewriteWithBase(base.clone()));
        }
        None => {
            builder.url_relative(UrlRelative::Deny);
        }
    }

    builder
}

/// Sanitizes an entry's markup field (title/summary/content when it carries
/// HTML). This is the security-critical step (spec §4.4): drops `<script>`,
/// `<style>`, `<object>`, `<embed>`, `<iframe>`, `<base>`, `<link>`, `<meta>`,
/// `<form>` and their contents; strips every `on*`/`style`/`id` attribute by
/// omission from the allow-list; permits only `http`/`https`/`mailto` on
/// `href`/`src`; rewrites relative URLs against `base` when one is known.
/// Must be called on the output of the XML parser, never on raw bytes, so
/// entity-smuggled markup can't slip past as plain text.
pub fn sanitize_html(input: &str, base: Option<&Url>) -> String {
    build(base).clean(input).to_string()
}

/// Escapes a metadata field (title, author name, feed name) so any markup
/// it contains displays as literal text rather than being interpreted —
/// these fields are never tag-sanitized, only entity-escaped.
pub fn escape_text(input: &str) -> String {
    ammonia::clean_text(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_its_contents() {
        let out = sanitize_html("<p>hi<script>alert(1)</script></p>", None);
        assert!(out.contains("hi"));
        assert!(!out.contains("script"));
        assert!(!out.contains("alert"));
    }

    #[test]
    fn strips_event_handlers_and_style_and_id() {
        let out = sanitize_html(r#"<p id="x" style="color:red" onclick="evil()">hi</p>"#, None);
        assert!(!out.contains("onclick"));
        assert!(!out.contains("style"));
        assert!(!out.contains("id="));
        assert!(out.contains("hi"));
    }

    #[test]
    fn rejects_javascript_scheme_on_img_src() {
        let out = sanitize_html(r#"<img src="javascript:alert(1)" onerror="alert(2)">"#, None);
        assert!(!out.contains("javascript:"));
        assert!(!out.contains("onerror"));
    }

    #[test]
    fn full_xss_scenario_from_spec_scrubs_clean() {
        let input = r#"<p>hi<img src="javascript:alert(1)" onerror=alert(2)><script>x</script></p>"#;
        let out = sanitize_html(input, None);
        assert!(out.contains("<p>hi"));
        assert!(!out.contains("<img"));
        assert!(!out.contains("onerror"));
        assert!(!out.contains("<script>"));
    }

    #[test]
    fn allows_mailto_and_https_links() {
        let out = sanitize_html(r#"<a href="mailto:a@example.com">mail</a>"#, None);
        assert!(out.contains("mailto:a@example.com"));
    }

    #[test]
    fn rewrites_relative_urls_against_base() {
        let base = Url::parse("https://example.com/blog/").unwrap();
        let out = sanitize_html(r#"<img src="images/pic.png" alt="x">"#, Some(&base));
        assert!(out.contains("https://example.com/blog/images/pic.png"));
    }

    #[test]
    fn drops_unknown_tags_but_keeps_text() {
        let out = sanitize_html("<dialog>hello</dialog>", None);
        assert!(out.contains("hello"));
        assert!(!out.contains("<dialog>"));
    }

    #[test]
    fn escape_text_neutralizes_markup_in_metadata() {
        let escaped = escape_text("<dialog>Title</dialog>");
        assert!(!escaped.contains("<dialog>"));
        assert!(escaped.contains("Title"));
    }
}
