//! Path-aware event stream over a byte source.
//!
//! [`EventStream`] drives the streaming parser from any [`Read`]
//! implementation and yields [`TokenEvent`]s: the parser's events rendered
//! with dotted-string paths. Every event names its `base_prefix` (the
//! top-level key it belongs to, empty at the root) and its full `prefix`
//! (for example `items.1.k`), with decimal indices for array elements.
//!
//! Input is read in 64 KiB chunks and decoded incrementally; a UTF-8
//! sequence split across chunk boundaries is carried into the next read.

use std::io::{ErrorKind, Read};
use std::mem;

use crate::error::{ParseError, ParseErrorKind};
use crate::event::{ParseEvent, join_dotted};
use crate::parser::{Poll, StreamingParser};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// The kind of a [`TokenEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MapKey,
    StartMap,
    EndMap,
    StartArray,
    EndArray,
    String,
    Number,
    Boolean,
    Null,
}

/// One parser event with rendered dotted paths.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEvent {
    /// First path segment, or empty for events at the root.
    pub base_prefix: String,
    /// Full dotted path, or empty at the root.
    pub prefix: String,
    pub kind: EventKind,
    /// The scalar value, the key for [`EventKind::MapKey`], absent
    /// otherwise. Booleans render as `true`/`false`; numbers keep their
    /// input lexeme.
    pub value: Option<String>,
}

impl TokenEvent {
    /// True for scalar events that carry a cell value. `null` is excluded:
    /// it participates in path bookkeeping but never populates a column.
    #[must_use]
    pub fn is_value_scalar(&self) -> bool {
        matches!(
            self.kind,
            EventKind::String | EventKind::Number | EventKind::Boolean
        )
    }

    /// True at the boundary between top-level objects.
    #[must_use]
    pub fn is_record_end(&self) -> bool {
        self.kind == EventKind::EndMap && self.prefix.is_empty()
    }

    fn from_parse_event(event: ParseEvent) -> Self {
        let (kind, value) = match &event {
            ParseEvent::MapKey { key, .. } => (EventKind::MapKey, Some(key.clone())),
            ParseEvent::StartMap { .. } => (EventKind::StartMap, None),
            ParseEvent::EndMap { .. } => (EventKind::EndMap, None),
            ParseEvent::StartArray { .. } => (EventKind::StartArray, None),
            ParseEvent::EndArray { .. } => (EventKind::EndArray, None),
            ParseEvent::String { value, .. } => (EventKind::String, Some(value.clone())),
            ParseEvent::Number { value, .. } => (EventKind::Number, Some(value.clone())),
            ParseEvent::Boolean { value, .. } => {
                (EventKind::Boolean, Some(value.to_string()))
            }
            ParseEvent::Null { .. } => (EventKind::Null, None),
        };
        let path = event.path();
        let prefix = join_dotted(path);
        let base_prefix = if prefix.is_empty() {
            String::new()
        } else {
            path.first().map(ToString::to_string).unwrap_or_default()
        };
        Self {
            base_prefix,
            prefix,
            kind,
            value,
        }
    }
}

/// Streaming iterator of [`TokenEvent`]s over a byte source.
///
/// Yields `Err` once on the first parse or read failure and ends the
/// stream; events produced before the failure have already been yielded.
pub struct EventStream<R> {
    reader: R,
    parser: StreamingParser,
    /// Undecoded tail of the previous chunk, at most three bytes.
    carry: Vec<u8>,
    /// Set when the current chunk ended in invalid UTF-8; reported once the
    /// parser has drained the events before the bad bytes.
    utf8_failed: bool,
    done: bool,
}

impl<R: Read> EventStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: StreamingParser::new(),
            carry: Vec::new(),
            utf8_failed: false,
            done: false,
        }
    }

    /// Read and decode one chunk into the parser.
    fn fill(&mut self) -> Result<(), ParseError> {
        if self.utf8_failed {
            return Err(self.utf8_error());
        }

        let mut chunk = vec![0_u8; READ_CHUNK_SIZE];
        let read = loop {
            match self.reader.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    return Err(ParseError {
                        kind: ParseErrorKind::Io(err),
                        line: 0,
                        column: 0,
                    });
                }
            }
        };

        if read == 0 {
            if self.carry.is_empty() {
                self.parser.end_input();
                return Ok(());
            }
            // The stream ended inside a UTF-8 sequence.
            return Err(self.utf8_error());
        }

        let mut bytes = mem::take(&mut self.carry);
        bytes.extend_from_slice(&chunk[..read]);

        match std::str::from_utf8(&bytes) {
            Ok(text) => self.parser.feed(text),
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                // A bare valid prefix with an incomplete tail is fine; the
                // tail carries over to the next read. A definite error is
                // reported after the preceding events drain.
                if let Ok(text) = std::str::from_utf8(&bytes[..valid_up_to]) {
                    self.parser.feed(text);
                }
                if err.error_len().is_some() {
                    self.utf8_failed = true;
                } else {
                    self.carry = bytes[valid_up_to..].to_vec();
                }
            }
        }
        Ok(())
    }

    fn utf8_error(&self) -> ParseError {
        ParseError {
            kind: ParseErrorKind::InvalidUtf8,
            line: 0,
            column: 0,
        }
    }
}

impl<R: Read> Iterator for EventStream<R> {
    type Item = Result<TokenEvent, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.parser.poll() {
                Ok(Poll::Event(event)) => {
                    return Some(Ok(TokenEvent::from_parse_event(event)));
                }
                Ok(Poll::Pending) => {
                    if let Err(err) = self.fill() {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
                Ok(Poll::End) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
