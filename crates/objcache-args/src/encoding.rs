//! Response-file text decoding.
//!
//! IDE-generated response files are often UTF-16 with a byte-order mark.
//! Anything without a UTF-16 mark is read as UTF-8, with or without a BOM.

/// Encoding detected from the leading bytes of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    /// Length of the byte-order mark for this encoding.
    pub fn bom_len(self) -> usize {
        match self {
            TextEncoding::Utf8 => 0,
            TextEncoding::Utf8Bom => 3,
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => 2,
        }
    }
}

/// Sniff the byte-order mark of `bytes`.
pub fn detect_encoding(bytes: &[u8]) -> TextEncoding {
    match bytes {
        [0xEF, 0xBB, 0xBF, ..] => TextEncoding::Utf8Bom,
        [0xFF, 0xFE, ..] => TextEncoding::Utf16Le,
        [0xFE, 0xFF, ..] => TextEncoding::Utf16Be,
        _ => TextEncoding::Utf8,
    }
}

/// Decode response-file bytes into text.
///
/// Invalid sequences become U+FFFD rather than failing; a mangled token
/// is left for the compiler to reject with its own diagnostic.
pub fn decode_text(bytes: &[u8]) -> String {
    let encoding = detect_encoding(bytes);
    let body = &bytes[encoding.bom_len()..];
    match encoding {
        TextEncoding::Utf8 | TextEncoding::Utf8Bom => String::from_utf8_lossy(body).into_owned(),
        TextEncoding::Utf16Le => decode_utf16(body, u16::from_le_bytes),
        TextEncoding::Utf16Be => decode_utf16(body, u16::from_be_bytes),
    }
}

fn decode_utf16(body: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units = body
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le_with_bom(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes
    }

    fn utf16be_with_bom(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_detect_plain_utf8() {
        assert_eq!(detect_encoding(b"-c foo.c"), TextEncoding::Utf8);
        assert_eq!(detect_encoding(b""), TextEncoding::Utf8);
    }

    #[test]
    fn test_detect_boms() {
        assert_eq!(detect_encoding(&[0xEF, 0xBB, 0xBF, b'a']), TextEncoding::Utf8Bom);
        assert_eq!(detect_encoding(&[0xFF, 0xFE, b'a', 0]), TextEncoding::Utf16Le);
        assert_eq!(detect_encoding(&[0xFE, 0xFF, 0, b'a']), TextEncoding::Utf16Be);
    }

    #[test]
    fn test_utf16_decodes_to_same_text() {
        let text = "/c /Fo\"out dir\\x.obj\" main.cpp";
        assert_eq!(decode_text(&utf16le_with_bom(text)), text);
        assert_eq!(decode_text(&utf16be_with_bom(text)), text);
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"-O2");
        assert_eq!(decode_text(&bytes), "-O2");
    }

    #[test]
    fn test_odd_trailing_byte_ignored() {
        let mut bytes = utf16le_with_bom("ab");
        bytes.push(0x41);
        assert_eq!(decode_text(&bytes), "ab");
    }
}
