//! Line framing for network transport
//!
//! Wire format: one canonical JSON message per line, `\n` terminated.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::error::NetworkError;
use birdman_types::Message;

/// Default maximum line length (1 MiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Prefix of a proxy-protocol preamble line.
const PROXY_PREFIX: &str = "PROXY";

/// Codec splitting the byte stream into raw lines and writing messages.
///
/// Decoding yields the line text rather than a [`Message`] so that the
/// protocol layer can answer unparseable input with an `error` message.
/// Blank lines and proxy-protocol preambles are skipped.
#[derive(Debug)]
pub struct MessageCodec {
    lines: LinesCodec,
}

impl MessageCodec {
    /// Creates a codec with the default line limit.
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Creates a codec rejecting lines longer than `max_length` bytes.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    /// Encodes a message as one wire line, newline included.
    pub fn encode_message(msg: &Message) -> Result<String, NetworkError> {
        let mut line = msg
            .encode()
            .map_err(|e| NetworkError::Codec(format!("serialize error: {}", e)))?;
        line.push('\n');
        Ok(line)
    }

    fn skip(line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with(PROXY_PREFIX)
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl From<LinesCodecError> for NetworkError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => {
                NetworkError::Codec("maximum line length exceeded".into())
            }
            LinesCodecError::Io(e) => NetworkError::Io(e),
        }
    }
}

impl Decoder for MessageCodec {
    type Item = String;
    type Error = NetworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.lines.decode(src)? {
                Some(line) if Self::skip(&line) => continue,
                other => return Ok(other),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.lines.decode_eof(src)? {
                Some(line) if Self::skip(&line) => continue,
                other => return Ok(other),
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = NetworkError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = Self::encode_message(&item)?;
        dst.reserve(line.len());
        dst.put_slice(line.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut MessageCodec, input: &str) -> Vec<String> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(line) = codec.decode(&mut buf).unwrap() {
            out.push(line);
        }
        out
    }

    // ==================== Decoding ====================

    #[test]
    fn test_decode_lines() {
        let mut codec = MessageCodec::new();
        let lines = decode_all(&mut codec, "{\"type\":\"getpeers\"}\nnot json\n");
        assert_eq!(lines, vec!["{\"type\":\"getpeers\"}", "not json"]);
    }

    #[test]
    fn test_decode_partial_line_waits() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from("{\"type\":");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\"getpeers\"}\r\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some("{\"type\":\"getpeers\"}".to_string())
        );
    }

    #[test]
    fn test_decode_skips_blank_and_proxy_lines() {
        let mut codec = MessageCodec::new();
        let input = "PROXY TCP4 1.2.3.4 5.6.7.8 1000 18018\n\n   \n{\"type\":\"getpeers\"}\n";
        assert_eq!(decode_all(&mut codec, input), vec!["{\"type\":\"getpeers\"}"]);
    }

    #[test]
    fn test_decode_eof_without_newline() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from("{\"type\":\"getpeers\"}");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some("{\"type\":\"getpeers\"}".to_string())
        );
    }

    #[test]
    fn test_decode_line_too_long() {
        let mut codec = MessageCodec::with_max_length(8);
        let mut buf = BytesMut::from("0123456789abcdef\n");
        assert!(matches!(codec.decode(&mut buf), Err(NetworkError::Codec(_))));
    }

    // ==================== Encoding ====================

    #[test]
    fn test_encode_canonical_line() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Message::error("boom"), &mut buf).unwrap();
        assert_eq!(&buf[..], b"{\"error\":\"boom\",\"type\":\"error\"}\n");
    }

    #[test]
    fn test_encode_message_standalone() {
        let line = MessageCodec::encode_message(&Message::GetPeers).unwrap();
        assert_eq!(line, "{\"type\":\"getpeers\"}\n");
    }
}
