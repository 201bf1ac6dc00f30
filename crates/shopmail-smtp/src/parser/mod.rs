//! SMTP response parser and reply framing.

use bytes::{Buf, BytesMut};

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Longest partial line tolerated before the server is considered broken.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// The code is taken from the final line; every line must carry the same one.
///
/// # Errors
///
/// Returns an error if the reply is malformed.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(last) = lines.last() else {
        return Err(Error::Protocol("Empty reply".into()));
    };

    let code_str = last
        .get(0..3)
        .ok_or_else(|| Error::Protocol(format!("Reply too short: {last}")))?;
    if !code_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Protocol(format!("Invalid reply code: {code_str}")));
    }
    let code = code_str
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("Invalid reply code: {code_str}")))?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        if line.get(0..3) != Some(code_str) {
            return Err(Error::Protocol(format!(
                "Reply line code differs from {code_str}: {line}"
            )));
        }
        match (line.len(), line.get(4..)) {
            (3, _) => message.push(String::new()),
            (_, Some(text)) if line.len() > 3 => message.push(text.to_string()),
            _ => return Err(Error::Protocol(format!("Malformed reply line: {line}"))),
        }
    }

    Ok(Reply::new(ReplyCode::new(code), message))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` separator for continuation and ` ` for the last line.
/// A bare three-character code also ends the reply.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() == 3 || (line.len() >= 4 && line.as_bytes()[3] == b' ')
}

/// Accumulates server bytes until a complete reply is available.
///
/// TCP gives no guarantee that a reply arrives in one read, so every chunk is
/// appended here and the buffer is rescanned for a terminal `NNN ` line.
#[derive(Debug, Default)]
pub struct ReplyBuffer {
    buf: BytesMut,
}

impl ReplyBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes read from the socket.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet consumed by a reply.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Takes the next complete reply out of the buffer.
    ///
    /// Returns `Ok(None)` while the terminal line has not arrived yet. Bytes
    /// following the terminal line stay buffered.
    ///
    /// # Errors
    ///
    /// Returns an error if the reply is malformed or a line grows past
    /// [`MAX_LINE_LENGTH`].
    pub fn next_reply(&mut self) -> Result<Option<Reply>> {
        let mut lines = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let raw = &self.buf[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw).into_owned();
            start = end + 1;

            if line.is_empty() {
                continue;
            }

            let is_last = is_last_reply_line(&line);
            lines.push(line);

            if is_last {
                self.buf.advance(start);
                return parse_reply(&lines).map(Some);
            }
        }

        if self.buf.len() - start > MAX_LINE_LENGTH {
            return Err(Error::Protocol("Reply line too long".into()));
        }

        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_single_line_reply() {
        let reply = parse_reply(&lines(&["250 OK"])).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["OK"]);
        assert!(reply.is_success());
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let reply = parse_reply(&lines(&["250-A", "250-B", "250 C"])).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_parse_bare_code() {
        let reply = parse_reply(&lines(&["354"])).unwrap();
        assert_eq!(reply.code, ReplyCode::START_DATA);
        assert_eq!(reply.message, vec![String::new()]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&lines(&["25"])).is_err());
        assert!(parse_reply(&lines(&["ABC OK"])).is_err());
        assert!(parse_reply(&lines(&["+25 OK"])).is_err());
    }

    #[test]
    fn test_mixed_codes_are_rejected() {
        let err = parse_reply(&lines(&["250-mail.example.com", "354 go ahead"])).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "{err:?}");
        assert!(parse_reply(&lines(&["250-A", "25x-B", "250 C"])).is_err());
    }

    #[test]
    fn test_is_last_reply_line() {
        assert!(is_last_reply_line("250 OK"));
        assert!(is_last_reply_line("250"));
        assert!(!is_last_reply_line("250-Continuing"));
        assert!(!is_last_reply_line("25"));
    }

    #[test]
    fn buffer_waits_for_terminal_line() {
        let mut buf = ReplyBuffer::new();
        buf.extend(b"250-mail.example.com\r\n250-PIPELINING\r\n");
        assert!(buf.next_reply().unwrap().is_none());

        buf.extend(b"250 STARTTLS\r\n");
        let reply = buf.next_reply().unwrap().unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(
            reply.message,
            vec!["mail.example.com", "PIPELINING", "STARTTLS"]
        );
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn buffer_keeps_bytes_after_reply() {
        let mut buf = ReplyBuffer::new();
        buf.extend(b"220 ready\r\n250 next");
        let first = buf.next_reply().unwrap().unwrap();
        assert_eq!(first.code, ReplyCode::SERVICE_READY);
        assert!(buf.next_reply().unwrap().is_none());

        buf.extend(b"\r\n");
        let second = buf.next_reply().unwrap().unwrap();
        assert_eq!(second.code, ReplyCode::OK);
        assert_eq!(second.message, vec!["next"]);
    }

    #[test]
    fn buffer_accepts_bare_lf() {
        let mut buf = ReplyBuffer::new();
        buf.extend(b"250-A\n250 B\n");
        let reply = buf.next_reply().unwrap().unwrap();
        assert_eq!(reply.message, vec!["A", "B"]);
    }

    #[test]
    fn buffer_rejects_endless_line() {
        let mut buf = ReplyBuffer::new();
        buf.extend(&vec![b'2'; MAX_LINE_LENGTH + 1]);
        assert!(matches!(buf.next_reply(), Err(Error::Protocol(_))));
    }

    fn frame_in_chunks(data: &[u8], mut cuts: Vec<usize>) -> Reply {
        cuts.sort_unstable();
        cuts.dedup();
        let mut buf = ReplyBuffer::new();
        let mut prev = 0;
        for cut in cuts.into_iter().chain(std::iter::once(data.len())) {
            let cut = cut.min(data.len());
            buf.extend(&data[prev..cut]);
            prev = cut;
            if let Some(reply) = buf.next_reply().unwrap() {
                assert_eq!(prev, data.len(), "reply completed before its last byte");
                return reply;
            }
        }
        panic!("reply never completed");
    }

    proptest! {
        #[test]
        fn framing_ignores_chunk_boundaries(
            texts in proptest::collection::vec("[a-zA-Z0-9 .=-]{0,20}", 1..6),
            cuts in proptest::collection::vec(0usize..200, 0..12),
        ) {
            let mut wire = String::new();
            for (i, text) in texts.iter().enumerate() {
                let sep = if i + 1 == texts.len() { ' ' } else { '-' };
                wire.push_str(&format!("250{sep}{text}\r\n"));
            }

            let whole = frame_in_chunks(wire.as_bytes(), Vec::new());
            let chunked = frame_in_chunks(wire.as_bytes(), cuts);
            prop_assert_eq!(&whole, &chunked);
            prop_assert_eq!(chunked.code, ReplyCode::OK);
            prop_assert_eq!(chunked.message.len(), texts.len());
        }
    }
}
