use sha2::{Digest, Sha256};

/// Synthesizes a stable per-feed entry identifier, in order of preference
/// (spec §4.4): the feed-provided GUID/Atom id, else SHA-256 of the
/// permalink, else SHA-256 of title concatenated with normalized content.
/// The publish date is never part of the id — it's neither unique nor
/// immutable, and including it would break the `first_seen` invariant on
/// any re-parse that recomputes a slightly different timestamp.
pub fn synthesize(guid: Option<&str>, permalink: Option<&str>, title: &str, content: &str) -> String {
    if let Some(guid) = guid.filter(|g| !g.trim().is_empty()) {
        return guid.trim().to_string();
    }

    if let Some(link) = permalink.filter(|l| !l.trim().is_empty()) {
        return hex_sha256(link.trim());
    }

    let normalized = format!("{}\u{1}{}", title.trim(), content.trim());
    hex_sha256(&normalized)
}

fn hex_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_guid_when_present() {
        let id = synthesize(Some("guid-123"), Some("https://example.com/post"), "title", "content");
        assert_eq!(id, "guid-123");
    }

    #[test]
    fn falls_back_to_permalink_hash() {
        let id = synthesize(None, Some("https://example.com/post"), "title", "content");
        assert_eq!(id.len(), 64);
        let again = synthesize(None, Some("https://example.com/post"), "different title", "different content");
        assert_eq!(id, again);
    }

    #[test]
    fn falls_back_to_title_and_content_hash() {
        let id = synthesize(None, None, "title", "content");
        assert_eq!(id.len(), 64);
        let different = synthesize(None, None, "other title", "content");
        assert_ne!(id, different);
    }

    #[test]
    fn is_stable_across_reparses_of_unchanged_entry() {
        let first = synthesize(Some("  guid-1  "), None, "t", "c");
        let second = synthesize(Some("guid-1"), None, "t", "c");
        assert_eq!(first, second);
    }

    #[test]
    fn blank_guid_is_treated_as_absent() {
        let id = synthesize(Some("   "), Some("https://example.com/post"), "t", "c");
        assert_eq!(id.len(), 64);
    }
}
