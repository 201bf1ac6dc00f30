//! MIME encoding and decoding utilities.
//!
//! Base64 and RFC 2047 encoded words for header values.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Longest encoded word RFC 2047 allows.
const MAX_ENCODED_WORD: usize = 75;

/// Charsets whose label matches the bytes Rust strings hold.
const SUPPORTED_CHARSETS: &[&str] = &["utf-8", "utf8", "us-ascii"];

/// Returns true if text in `charset` can be written and read back as is.
///
/// Strings are UTF-8, so only UTF-8 and its US-ASCII subset qualify.
#[must_use]
pub fn is_supported_charset(charset: &str) -> bool {
    SUPPORTED_CHARSETS
        .iter()
        .any(|known| charset.eq_ignore_ascii_case(known))
}

/// Returns true if `charset` is US-ASCII.
#[must_use]
pub fn is_ascii_charset(charset: &str) -> bool {
    charset.eq_ignore_ascii_case("us-ascii")
}

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<String> {
    let mut result = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();

    while let Some(byte) = bytes.next() {
        if byte != b'=' {
            result.push(byte);
            continue;
        }

        // Soft line break
        if bytes.peek() == Some(&b'\r') {
            bytes.next();
        }
        if bytes.peek() == Some(&b'\n') {
            bytes.next();
            continue;
        }

        let hex: Vec<u8> = bytes.by_ref().take(2).collect();
        let hex = std::str::from_utf8(&hex)
            .ok()
            .filter(|h| h.len() == 2)
            .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".to_string()))?;
        let byte = u8::from_str_radix(hex, 16)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        result.push(byte);
    }

    String::from_utf8(result).map_err(Into::into)
}

/// Returns true if `text` cannot go into a header verbatim.
#[must_use]
pub fn needs_encoding(text: &str) -> bool {
    text.contains("=?") || text.chars().any(|c| !c.is_ascii() || c.is_ascii_control())
}

/// Encodes a header value using RFC 2047 encoding.
///
/// Format: `=?charset?B?encoded-text?=`. Printable ASCII is returned as is.
/// Longer values become several encoded words, each within the 75 character
/// limit, split on character boundaries and folded with `CRLF SP`.
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    if !needs_encoding(text) {
        return text.to_string();
    }

    let overhead = "=??B??=".len() + charset.len();
    // Four base64 characters carry three bytes; a char is at most four bytes
    let max_bytes = (MAX_ENCODED_WORD.saturating_sub(overhead) / 4 * 3).max(4);

    let mut words = Vec::new();
    let mut chunk_start = 0;
    let mut chunk_end = 0;
    for (idx, ch) in text.char_indices() {
        let end = idx + ch.len_utf8();
        if end - chunk_start > max_bytes {
            words.push(&text[chunk_start..chunk_end]);
            chunk_start = chunk_end;
        }
        chunk_end = end;
    }
    words.push(&text[chunk_start..chunk_end]);

    words
        .into_iter()
        .map(|chunk| format!("=?{charset}?B?{}?=", encode_base64(chunk.as_bytes())))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Decodes RFC 2047 encoded words in a header value.
///
/// Text outside encoded words passes through unchanged; whitespace between
/// two adjacent encoded words is dropped.
///
/// # Errors
///
/// Returns an error for an unknown encoding, an unsupported charset, or
/// undecodable payload.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = decode_word(candidate)? {
            if !(after_word && before.chars().all(char::is_whitespace)) {
                out.push_str(before);
            }
            out.push_str(&decoded);
            rest = &candidate[consumed..];
            after_word = true;
        } else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// Decodes one encoded word at the start of `s` (which begins with `=?`).
///
/// Returns the text and the number of bytes consumed, or `None` when `s` does
/// not start with a well-formed word.
fn decode_word(s: &str) -> Result<Option<(String, usize)>> {
    let inner = &s[2..];
    let Some((charset, after_charset)) = inner.split_once('?') else {
        return Ok(None);
    };
    let Some((encoding, after_encoding)) = after_charset.split_once('?') else {
        return Ok(None);
    };
    let Some(end) = after_encoding.find("?=") else {
        return Ok(None);
    };
    let payload = &after_encoding[..end];

    if charset.is_empty() || encoding.len() != 1 || payload.contains(char::is_whitespace) {
        return Ok(None);
    }

    // RFC 2231 language suffix: =?utf-8*he?B?...?=
    let charset = charset.split('*').next().unwrap_or(charset);
    if !is_supported_charset(charset) {
        return Err(Error::InvalidEncoding(format!(
            "Unsupported charset: {charset}"
        )));
    }

    let decoded = match encoding {
        "B" | "b" => String::from_utf8(decode_base64(payload)?)?,
        "Q" | "q" => decode_quoted_printable(&payload.replace('_', " "))?,
        _ => {
            return Err(Error::InvalidEncoding(format!(
                "Unknown encoding: {encoding}"
            )));
        }
    };

    let consumed = 2 + inner.len() - after_encoding.len() + end + 2;
    Ok(Some((decoded, consumed)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode_decode() {
        let encoded = encode_base64(b"Hello, World!");
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");
        assert_eq!(decode_base64(&encoded).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable("H=C3=A9llo").unwrap(), "Héllo");
        assert_eq!(decode_quoted_printable("Hello=\r\nWorld").unwrap(), "HelloWorld");
        assert!(decode_quoted_printable("bad=4").is_err());
        assert!(decode_quoted_printable("bad=ZZ").is_err());
    }

    #[test]
    fn test_ascii_is_left_alone() {
        assert_eq!(encode_rfc2047("Order #1024 shipped?", "UTF-8"), "Order #1024 shipped?");
    }

    #[test]
    fn test_hebrew_subject_is_encoded() {
        let encoded = encode_rfc2047("הזמנה חדשה", "UTF-8");
        assert_eq!(encoded, "=?UTF-8?B?15TXltee16DXlCDXl9eT16nXlA==?=");
        assert_eq!(decode_rfc2047(&encoded).unwrap(), "הזמנה חדשה");
    }

    #[test]
    fn test_supported_charsets() {
        assert!(is_supported_charset("UTF-8"));
        assert!(is_supported_charset("utf8"));
        assert!(is_supported_charset("US-ASCII"));
        assert!(!is_supported_charset("ISO-8859-8"));
        assert!(!is_supported_charset("windows-1255"));
        assert!(is_ascii_charset("us-ascii"));
        assert!(!is_ascii_charset("UTF-8"));
    }

    #[test]
    fn test_marker_text_is_encoded() {
        let encoded = encode_rfc2047("literal =?x?= text", "UTF-8");
        assert!(encoded.starts_with("=?UTF-8?B?"));
        assert_eq!(decode_rfc2047(&encoded).unwrap(), "literal =?x?= text");
    }

    #[test]
    fn test_long_value_is_split_into_short_words() {
        let subject = "ספר תורה, סידור ומחזור לימים נוראים - אישור הזמנה מספר 4411";
        let encoded = encode_rfc2047(subject, "UTF-8");

        let words: Vec<&str> = encoded.split("\r\n ").collect();
        assert!(words.len() > 1);
        for word in &words {
            assert!(word.len() <= 75, "{word} is {} chars", word.len());
            assert!(word.starts_with("=?UTF-8?B?") && word.ends_with("?="));
        }
        assert_eq!(decode_rfc2047(&encoded).unwrap(), subject);
    }

    #[test]
    fn test_rfc2047_decode_mixed() {
        assert_eq!(decode_rfc2047("Hello").unwrap(), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?=").unwrap(), "Héllo");
        assert_eq!(decode_rfc2047("=?utf-8?Q?H=C3=A9llo_there?=").unwrap(), "Héllo there");
        assert_eq!(
            decode_rfc2047("Re: =?utf-8?B?SMOpbGxv?= =?utf-8?B?IHdvcmxk?= !").unwrap(),
            "Re: Héllo world !"
        );
        assert_eq!(decode_rfc2047("a =? b").unwrap(), "a =? b");
    }

    #[test]
    fn test_rfc2047_decode_errors() {
        assert!(decode_rfc2047("=?utf-8?X?abc?=").is_err());
        assert!(decode_rfc2047("=?koi8-r?B?abc?=").is_err());
        assert!(decode_rfc2047("=?utf-8?B?@@@@?=").is_err());
    }

    proptest! {
        #[test]
        fn encoded_words_decode_to_the_original(text in "[\\p{Hebrew}a-zA-Z0-9 ,.!?=-]{0,120}") {
            let encoded = encode_rfc2047(&text, "UTF-8");
            prop_assert_eq!(decode_rfc2047(&encoded).unwrap(), text);
        }
    }
}
