use url::Url;

/// Resolves a possibly-relative `href`/`link` value against `base`
/// (the entry's `xml:base`, or the feed URL if none was present),
/// generalizing the teacher's single-purpose image-URL resolver to any
/// link-shaped field.
pub fn resolve(base: &Url, value: &str) -> Option<Url> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(absolute) = Url::parse(trimmed) {
        return Some(absolute);
    }
    base.join(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_already_absolute_urls() {
        let base = Url::parse("https://example.com/feed.xml").unwrap();
        let resolved = resolve(&base, "https://other.example/post").unwrap();
        assert_eq!(resolved.as_str(), "https://other.example/post");
    }

    #[test]
    fn resolves_relative_path_against_base() {
        let base = Url::parse("https://example.com/blog/feed.xml").unwrap();
        let resolved = resolve(&base, "../posts/1").unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/posts/1");
    }

    #[test]
    fn returns_none_for_blank_value() {
        let base = Url::parse("https://example.com/feed.xml").unwrap();
        assert!(resolve(&base, "   ").is_none());
    }
}
