//! Line framer
//!
//! Turns the raw TCP byte stream into newline-terminated text lines and
//! encodes `ServerMessage`s back into lines. Plugs into tokio-util's
//! `FramedRead`/`FramedWrite`.

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::message::ServerMessage;

/// Longest accepted line, excluding the terminator
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Framing errors
///
/// Any of these ends the session's read loop.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line is not valid UTF-8")]
    InvalidUtf8,

    #[error("Line exceeds maximum length")]
    LineTooLong,
}

/// Newline-delimited text codec
///
/// Partial lines stay in the read buffer until their `\n` arrives.
/// `next_index` remembers how far the buffer has already been scanned so a
/// slowly trickling line is not rescanned from the start on every read.
#[derive(Debug, Clone)]
pub struct LineCodec {
    next_index: usize,
    max_length: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
        let newline = buf[self.next_index..].iter().position(|b| *b == b'\n');

        let Some(offset) = newline else {
            if buf.len() > self.max_length {
                return Err(CodecError::LineTooLong);
            }
            self.next_index = buf.len();
            return Ok(None);
        };

        let end = self.next_index + offset;
        self.next_index = 0;

        if end > self.max_length {
            return Err(CodecError::LineTooLong);
        }

        let line = buf.split_to(end + 1);
        let line = std::str::from_utf8(&line[..end]).map_err(|_| CodecError::InvalidUtf8)?;

        Ok(Some(line.to_string()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None => {
                // Unterminated tail at EOF is dropped, not reported.
                buf.clear();
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<ServerMessage> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, msg: ServerMessage, buf: &mut BytesMut) -> Result<(), CodecError> {
        let line = msg.to_string();
        buf.reserve(line.len() + 1);
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("LOGIN Naman\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("LOGIN Naman".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_fragmented_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("MSG he");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"llo\nPI");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("MSG hello".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"NG\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING".to_string()));
    }

    #[test]
    fn test_decode_multiple_lines_in_one_read() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("WHO\nPING\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("WHO".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_eof_drops_unterminated_tail() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING\nhalf");
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("PING".to_string()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"MSG \xff\xfe\n"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(CodecError::InvalidUtf8)));
    }

    #[test]
    fn test_decode_line_too_long() {
        let mut codec = LineCodec::with_max_length(4);
        let mut buf = BytesMut::from("abcdef");
        assert!(matches!(codec.decode(&mut buf), Err(CodecError::LineTooLong)));
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(ServerMessage::Pong, &mut buf).unwrap();
        codec.encode(ServerMessage::Ok, &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG\nOK\n");
    }
}
