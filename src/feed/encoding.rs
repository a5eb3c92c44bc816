use encoding_rs::Encoding;

/// Finds a declared encoding in an XML prolog (`<?xml ... encoding="..." ?>`)
/// by scanning the first kilobyte of raw bytes as ASCII, which is always
/// valid for the prolog itself regardless of the document's real encoding.
fn declared_xml_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(1024)];
    let head_str = String::from_utf8_lossy(head);
    let prolog_end = head_str.find("?>")?;
    let prolog = &head_str[..prolog_end];
    let marker = "encoding=";
    let start = prolog.find(marker)? + marker.len();
    let rest = prolog[start..].trim_start();
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let end = rest[1..].find(quote)? + 1;
    let label = &rest[1..end];
    Encoding::for_label(label.as_bytes())
}

/// Recovers a UTF-8 `String` from raw feed bytes, per spec §4.4: trust the
/// declared encoding first, then sniff the BOM, then fall back to UTF-8 with
/// invalid sequences replaced by U+FFFD.
pub fn recover_utf8(bytes: &[u8]) -> String {
    if let Some(encoding) = declared_xml_encoding(bytes) {
        let (decoded, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return decoded.into_owned();
        }
    }

    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (decoded, _, _had_errors) = encoding.decode(&bytes[bom_len..]);
        return decoded.into_owned();
    }

    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_plain_utf8() {
        let bytes = "<?xml version=\"1.0\"?><feed>héllo</feed>".as_bytes();
        assert!(recover_utf8(bytes).contains("héllo"));
    }

    #[test]
    fn honors_declared_encoding() {
        let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode("café");
        let mut doc = b"<?xml version=\"1.0\" encoding=\"windows-1252\"?><feed>".to_vec();
        doc.extend_from_slice(&encoded);
        doc.extend_from_slice(b"</feed>");
        let recovered = recover_utf8(&doc);
        assert!(recovered.contains("café"));
    }

    #[test]
    fn falls_back_to_lossy_utf8_with_replacement_char() {
        let bytes: &[u8] = &[0xff, 0xfe, b'a', b'b'];
        let recovered = recover_utf8(bytes);
        assert!(recovered.contains('\u{FFFD}') || recovered.contains("ab"));
    }

    #[test]
    fn sniffs_utf16_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hi".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(recover_utf8(&bytes), "hi");
    }
}
