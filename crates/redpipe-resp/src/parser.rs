//! Incremental RESP2 parser tolerant of arbitrary read fragmentation.

use bytes::Buf;
use bytes::Bytes;
use bytes::BytesMut;

use crate::error::ParseError;
use crate::utils::*;
use crate::value::Value;

/// Result of a parsing attempt.
#[derive(Debug)]
pub enum ParseOutcome {
    /// A complete top-level value was parsed and consumed from the buffer.
    Complete(Value),
    /// The buffer does not contain enough data to parse a complete value.
    /// Nothing that would need re-scanning has been consumed.
    Incomplete,
    /// The byte stream is malformed and cannot be resynchronized.
    Error(ParseError),
}

/// Upper bounds on declared lengths, guarding against hostile headers.
#[derive(Debug, Clone, Copy)]
pub struct ParserLimits {
    /// Maximum declared bulk string payload in bytes
    pub max_bulk_len: usize,
    /// Maximum declared array element count
    pub max_array_len: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        // Matches the upstream server's 512MB proto-max-bulk-len default.
        Self {
            max_bulk_len: 512 * 1024 * 1024,
            max_array_len: 1024 * 1024,
        }
    }
}

/// Transient parse state for one in-progress array.
///
/// Frames form a stack: the stack is empty exactly when no partially-parsed
/// top-level value is pending.
#[derive(Debug)]
struct Frame {
    expected: usize,
    elements: Vec<Value>,
}

/// A stateful RESP2 parser that supports streaming.
///
/// Feed it a `BytesMut` that accumulates inbound bytes and call
/// [`Parser::parse`] in a loop: each call consumes at most one complete
/// top-level value. The sequence of values produced for a given logical
/// byte stream is identical no matter how that stream is split across
/// reads.
#[derive(Debug)]
pub struct Parser {
    frames: Vec<Frame>,
    limits: ParserLimits,
}

// Helper enum for parse_step
enum ParsedItem {
    Value(Value),
    FramePushed,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::with_limits(ParserLimits::default())
    }

    pub fn with_limits(limits: ParserLimits) -> Self {
        Self {
            frames: Vec::new(),
            limits,
        }
    }

    /// Parse one RESP value from a mutable buffer.
    ///
    /// If successful, consumes the parsed bytes and returns
    /// `ParseOutcome::Complete(value)`. If the buffer ends mid-value,
    /// returns `ParseOutcome::Incomplete` and retains the partial frame
    /// stack so the next call resumes exactly where this one stopped.
    pub fn parse(&mut self, buf: &mut BytesMut) -> ParseOutcome {
        loop {
            match self.parse_step(buf) {
                Ok(Some(ParsedItem::FramePushed)) => continue,
                Ok(Some(ParsedItem::Value(value))) => {
                    if let Some(top_level) = self.absorb(value) {
                        return ParseOutcome::Complete(top_level);
                    }
                }
                Ok(None) => return ParseOutcome::Incomplete,
                Err(e) => return ParseOutcome::Error(e),
            }
        }
    }

    /// Inject a completed value into the top frame.
    ///
    /// Whenever a frame's remaining count reaches zero it is popped and
    /// becomes a value for the frame below it, iteratively, so nesting
    /// depth never touches the call stack. Returns the value if the frame
    /// stack is empty, i.e. a top-level value has completed.
    fn absorb(&mut self, value: Value) -> Option<Value> {
        let mut value = value;
        loop {
            let Some(mut frame) = self.frames.pop() else {
                return Some(value);
            };
            frame.elements.push(value);
            if frame.elements.len() < frame.expected {
                self.frames.push(frame);
                return None;
            }
            value = Value::Array(frame.elements);
        }
    }

    /// Tries to parse the next token.
    /// If it's a primitive, returns `Ok(Some(ParsedItem::Value(v)))`.
    /// If it's an array header, pushes a frame and returns
    /// `Ok(Some(ParsedItem::FramePushed))`. If incomplete, returns `Ok(None)`.
    fn parse_step(&mut self, buf: &mut BytesMut) -> Result<Option<ParsedItem>, ParseError> {
        if buf.is_empty() {
            return Ok(None);
        }

        // Peek type marker
        let type_marker = buf[0];

        match type_marker {
            SIMPLE_STRING => Self::parse_simple_line(buf, Value::SimpleString),
            ERROR => Self::parse_simple_line(buf, Value::Error),
            INTEGER => Self::parse_integer(buf),
            BULK_STRING => self.parse_bulk_string(buf),
            ARRAY => self.start_array(buf),
            other => Err(ParseError::InvalidTypeMarker(other as char)),
        }
    }

    fn parse_simple_line(
        buf: &mut BytesMut,
        make: fn(Bytes) -> Value,
    ) -> Result<Option<ParsedItem>, ParseError> {
        // buf[0] is '+' or '-'
        if let Some((line, total_len)) = peek_line(&buf[1..]) {
            let value = Bytes::copy_from_slice(line);
            buf.advance(1 + total_len);
            Ok(Some(ParsedItem::Value(make(value))))
        } else {
            Ok(None)
        }
    }

    fn parse_integer(buf: &mut BytesMut) -> Result<Option<ParsedItem>, ParseError> {
        if let Some((line, total_len)) = peek_line(&buf[1..]) {
            let num = parse_decimal(line)?;
            buf.advance(1 + total_len);
            Ok(Some(ParsedItem::Value(Value::Integer(num))))
        } else {
            Ok(None)
        }
    }

    fn parse_bulk_string(&mut self, buf: &mut BytesMut) -> Result<Option<ParsedItem>, ParseError> {
        // $6\r\nfoobar\r\n
        if let Some((line, len_consumed)) = peek_line(&buf[1..]) {
            let length = parse_decimal(line)?;

            if length == -1 {
                buf.advance(1 + len_consumed);
                return Ok(Some(ParsedItem::Value(Value::Nil)));
            }
            if length < -1 {
                return Err(ParseError::InvalidBulkStringLength(length));
            }
            if length as u64 > self.limits.max_bulk_len as u64 {
                return Err(ParseError::BulkStringTooLarge(
                    length,
                    self.limits.max_bulk_len,
                ));
            }

            let length = length as usize;
            let total_needed = 1 + len_consumed + length + 2; // +2 for CRLF

            if buf.len() < total_needed {
                return Ok(None);
            }

            // All good, consume
            buf.advance(1 + len_consumed);
            let data = buf.split_to(length).freeze();
            if &buf[0..2] != CRLF {
                return Err(ParseError::InvalidFormat(
                    "Missing CRLF after bulk string".to_string(),
                ));
            }
            buf.advance(2);

            Ok(Some(ParsedItem::Value(Value::BulkString(data))))
        } else {
            Ok(None)
        }
    }

    fn start_array(&mut self, buf: &mut BytesMut) -> Result<Option<ParsedItem>, ParseError> {
        if let Some((line, total_len)) = peek_line(&buf[1..]) {
            let length = parse_decimal(line)?;

            if length == -1 {
                buf.advance(1 + total_len);
                return Ok(Some(ParsedItem::Value(Value::NilArray)));
            }
            if length < -1 {
                return Err(ParseError::InvalidArrayLength(length));
            }
            if length as u64 > self.limits.max_array_len as u64 {
                return Err(ParseError::ArrayTooLarge(length, self.limits.max_array_len));
            }

            buf.advance(1 + total_len);

            let length = length as usize;
            if length == 0 {
                return Ok(Some(ParsedItem::Value(Value::Array(Vec::new()))));
            }

            self.frames.push(Frame {
                expected: length,
                elements: Vec::with_capacity(length),
            });
            Ok(Some(ParsedItem::FramePushed))
        } else {
            Ok(None)
        }
    }
}

/// Convenience function for one-off parsing.
/// This will create a temporary parser and try to parse one value.
/// If streaming is needed, use `Parser` directly.
pub fn parse(buf: &mut BytesMut) -> Result<Value, ParseError> {
    let mut parser = Parser::new();
    match parser.parse(buf) {
        ParseOutcome::Complete(value) => Ok(value),
        ParseOutcome::Incomplete => Err(ParseError::UnexpectedEof),
        ParseOutcome::Error(e) => Err(e),
    }
}
