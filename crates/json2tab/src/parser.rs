//! The streaming JSON parser.
//!
//! [`StreamingParser`] consumes input in chunks and produces [`ParseEvent`]s
//! through [`StreamingParser::poll`]. It always accepts multiple
//! whitespace-separated top-level values in one stream, resetting its state
//! after each root so a concatenation of objects parses end to end.
//!
//! The lexer tracks line and column for error reporting and accumulates one
//! token at a time; an exhausted input buffer surfaces as [`Poll::Pending`]
//! so the caller can feed the next chunk. Paths are tracked with a stack of
//! container frames: object frames remember the key awaiting its value,
//! array frames count elements so indices start at 0 and advance exactly
//! once per element separator.

use std::mem;

use crate::buffer::Buffer;
use crate::error::{ParseError, ParseErrorKind};
use crate::escape::{EscapeDecoder, EscapeStep};
use crate::event::{ParseEvent, PathComponent};

/// The three JSON keyword literals, matched incrementally against the
/// lexer's scratch buffer.
const LITERALS: [&str; 3] = ["null", "true", "false"];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Eof,
    PropertyName(String),
    String(String),
    Boolean(bool),
    Null,
    /// The raw number lexeme, kept verbatim for textual output.
    Number(String),
    /// One of `{` `}` `[` `]` `:` `,`
    Punctuator(u8),
}

/// A peeked character from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeekedChar {
    /// The buffer is empty but more input may arrive.
    Empty,
    Char(char),
    /// The input stream is closed.
    EndOfInput,
}

use PeekedChar::{Char, Empty, EndOfInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Start,
    BeforePropertyName,
    AfterPropertyName,
    BeforePropertyValue,
    BeforeArrayValue,
    AfterPropertyValue,
    AfterArrayValue,
    End,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Default,
    Value,
    ValueLiteral,
    Sign,
    Zero,
    DecimalInteger,
    DecimalPoint,
    DecimalFraction,
    DecimalExponent,
    DecimalExponentSign,
    DecimalExponentInteger,
    String,
    StringEscape,
    StringEscapeUnicode,
    Start,
    BeforePropertyName,
    AfterPropertyName,
    BeforePropertyValue,
    BeforeArrayValue,
    AfterPropertyValue,
    AfterArrayValue,
    End,
    Error,
}

impl From<ParseState> for LexState {
    fn from(state: ParseState) -> Self {
        match state {
            ParseState::Start => LexState::Start,
            ParseState::BeforePropertyName => LexState::BeforePropertyName,
            ParseState::AfterPropertyName => LexState::AfterPropertyName,
            ParseState::BeforePropertyValue => LexState::BeforePropertyValue,
            ParseState::BeforeArrayValue => LexState::BeforeArrayValue,
            ParseState::AfterPropertyValue => LexState::AfterPropertyValue,
            ParseState::AfterArrayValue => LexState::AfterArrayValue,
            ParseState::End => LexState::End,
            ParseState::Error => LexState::Error,
        }
    }
}

/// One entry per open container.
#[derive(Debug, Clone)]
enum Frame {
    Array {
        /// Slot for the next element.
        next_index: usize,
    },
    Object {
        /// Key waiting for its value.
        pending_key: Option<String>,
    },
}

impl Frame {
    fn to_path_component(&self) -> PathComponent {
        match self {
            Frame::Array { next_index } => PathComponent::Index(*next_index),
            Frame::Object { pending_key } => {
                PathComponent::Key(pending_key.clone().unwrap_or_default())
            }
        }
    }
}

/// Stack of open containers. The root container has no location component;
/// every nested frame is stored together with the component naming where it
/// lives in its parent.
#[derive(Debug, Default)]
struct FrameStack {
    root: Option<Frame>,
    stack: Vec<(PathComponent, Frame)>,
}

impl FrameStack {
    fn new() -> Self {
        Self {
            root: None,
            stack: Vec::with_capacity(16),
        }
    }

    fn last(&self) -> Option<&Frame> {
        if let Some((_, frame)) = self.stack.last() {
            return Some(frame);
        }
        self.root.as_ref()
    }

    fn last_mut(&mut self) -> Option<&mut Frame> {
        if let Some((_, frame)) = self.stack.last_mut() {
            Some(frame)
        } else {
            self.root.as_mut()
        }
    }

    fn push(&mut self, frame: Frame) {
        match self.last() {
            Some(parent) => {
                let component = parent.to_path_component();
                self.stack.push((component, frame));
            }
            None => self.root = Some(frame),
        }
    }

    fn pop(&mut self) -> Option<Frame> {
        match self.stack.pop() {
            Some((_, frame)) => Some(frame),
            None => self.root.take(),
        }
    }

    fn to_path_components(&self) -> Vec<PathComponent> {
        self.stack.iter().map(|(pc, _)| pc.clone()).collect()
    }

    fn clear(&mut self) {
        self.root = None;
        self.stack.clear();
    }
}

/// Result of driving the parser one step.
#[derive(Debug)]
pub enum Poll {
    /// One event is ready.
    Event(ParseEvent),
    /// The input buffer is exhausted; feed more or close the input.
    Pending,
    /// The stream ended cleanly after a complete top-level value.
    End,
}

#[derive(Debug)]
pub struct StreamingParser {
    source: Buffer,
    end_of_input: bool,

    pos: usize,
    line: usize,
    column: usize,

    parse_state: ParseState,
    lex_state: LexState,

    /// Reused scratch for number lexemes, string contents and keyword
    /// literals.
    buffer: String,
    escape: EscapeDecoder,
    /// True when the lexer stopped mid-token waiting for more input.
    partial_lex: bool,

    frames: FrameStack,
    pending_event: Option<ParseEvent>,
}

impl Default for StreamingParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: Buffer::new(),
            end_of_input: false,

            pos: 0,
            line: 1,
            column: 1,

            parse_state: ParseState::Start,
            lex_state: LexState::Default,

            buffer: String::new(),
            escape: EscapeDecoder::new(),
            partial_lex: false,

            frames: FrameStack::new(),
            pending_event: None,
        }
    }

    /// Feed a chunk of JSON text into the parser.
    pub fn feed(&mut self, text: &str) {
        self.source.push(text);
    }

    /// Mark the end of input. Subsequent polls drain remaining events and
    /// then report [`Poll::End`] or an unexpected-end-of-input error.
    pub fn end_input(&mut self) {
        self.end_of_input = true;
    }

    /// Drive the parser until it produces one event, runs out of buffered
    /// input, or reaches the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] on malformed input or on input that ends in
    /// the middle of a value or container. After an error the parser stays
    /// in an error state and reports [`Poll::End`].
    pub fn poll(&mut self) -> Result<Poll, ParseError> {
        if matches!(self.parse_state, ParseState::Error) {
            return Ok(Poll::End);
        }

        loop {
            if let Some(event) = self.pending_event.take() {
                return Ok(Poll::Event(event));
            }

            // Between concatenated top-level values: reset for the next root.
            if matches!(self.parse_state, ParseState::End) {
                self.parse_state = ParseState::Start;
                self.lex_state = LexState::Default;
                self.frames.clear();
            }

            let token = match self.lex() {
                Ok(Some(token)) => token,
                Ok(None) => return Ok(Poll::Pending),
                Err(err) => {
                    self.enter_error_state();
                    return Err(err);
                }
            };

            if matches!(token, Token::Eof) {
                return match self.parse_state {
                    ParseState::Start | ParseState::End => Ok(Poll::End),
                    _ => {
                        let err = self.unexpected_eof();
                        self.enter_error_state();
                        Err(err)
                    }
                };
            }

            if let Err(err) = self.dispatch(token) {
                self.enter_error_state();
                return Err(err);
            }
        }
    }

    fn enter_error_state(&mut self) {
        self.parse_state = ParseState::Error;
        self.lex_state = LexState::Error;
    }

    // --------------------------------------------------------------------
    // Lexer
    // --------------------------------------------------------------------

    /// Produce the next token, or `None` when more input is needed.
    fn lex(&mut self) -> Result<Option<Token>, ParseError> {
        if !self.partial_lex {
            self.lex_state = LexState::Default;
        }
        self.partial_lex = false;

        loop {
            let next_char = self.peek_char();
            if matches!(next_char, Empty) {
                self.partial_lex = true;
                return Ok(None);
            }
            if let Some(token) = self.lex_state_step(self.lex_state, next_char)? {
                return Ok(Some(token));
            }
        }
    }

    #[inline]
    fn peek_char(&self) -> PeekedChar {
        if let Some(ch) = self.source.peek() {
            return Char(ch);
        }
        if self.end_of_input {
            return EndOfInput;
        }
        Empty
    }

    #[inline]
    fn advance_char(&mut self) {
        if let Some(ch) = self.source.next() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn produce_string(&mut self) -> Token {
        let value = mem::take(&mut self.buffer);
        if matches!(self.parse_state, ParseState::BeforePropertyName) {
            Token::PropertyName(value)
        } else {
            Token::String(value)
        }
    }

    fn produce_number(&mut self) -> Token {
        Token::Number(mem::take(&mut self.buffer))
    }

    #[allow(clippy::too_many_lines)]
    fn lex_state_step(
        &mut self,
        lex_state: LexState,
        next_char: PeekedChar,
    ) -> Result<Option<Token>, ParseError> {
        use LexState::{
            AfterArrayValue, AfterPropertyName, AfterPropertyValue, BeforeArrayValue,
            BeforePropertyName, BeforePropertyValue, DecimalExponent, DecimalExponentInteger,
            DecimalExponentSign, DecimalFraction, DecimalInteger, DecimalPoint, Default, End,
            Error, Sign, Start, Value, ValueLiteral, Zero,
        };

        match lex_state {
            Default => match next_char {
                Char(' ' | '\t' | '\n' | '\r') => {
                    self.advance_char();
                    Ok(None)
                }
                EndOfInput => Ok(Some(Token::Eof)),
                Char(_) | Empty => self.lex_state_step(self.parse_state.into(), next_char),
            },

            // -------------------------- value entry -------------------------
            Value => match next_char {
                Char(c) if matches!(c, '{' | '[') => {
                    self.advance_char();
                    Ok(Some(Token::Punctuator(c as u8)))
                }
                Char(c) if matches!(c, 'n' | 't' | 'f') => {
                    self.buffer.clear();
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = ValueLiteral;
                    Ok(None)
                }
                Char(c @ '-') => {
                    self.buffer.clear();
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = Sign;
                    Ok(None)
                }
                Char(c @ '0') => {
                    self.buffer.clear();
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = Zero;
                    Ok(None)
                }
                Char(c) if c.is_ascii_digit() => {
                    self.buffer.clear();
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = DecimalInteger;
                    Ok(None)
                }
                Char('"') => {
                    self.advance_char();
                    self.buffer.clear();
                    self.lex_state = LexState::String;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            // -------------------------- literals ----------------------------
            // The scratch buffer grows one character at a time and must stay
            // a prefix of `null`, `true` or `false`; on a full match the
            // token is produced, anything else is rejected where it stands.
            ValueLiteral => match next_char {
                Char(c) if c.is_ascii_lowercase() => {
                    self.advance_char();
                    self.buffer.push(c);
                    let token = match self.buffer.as_str() {
                        "null" => Some(Token::Null),
                        "true" => Some(Token::Boolean(true)),
                        "false" => Some(Token::Boolean(false)),
                        word => {
                            if !LITERALS.iter().any(|lit| lit.starts_with(word)) {
                                return Err(self.invalid_char(Char(c)));
                            }
                            None
                        }
                    };
                    if token.is_some() {
                        self.buffer.clear();
                    }
                    Ok(token)
                }
                c => Err(self.invalid_char(c)),
            },

            // -------------------------- numbers -----------------------------
            Sign => match next_char {
                Char(c @ '0') => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = Zero;
                    Ok(None)
                }
                Char(c) if c.is_ascii_digit() => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = DecimalInteger;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            Zero => match next_char {
                Char(c @ '.') => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = DecimalPoint;
                    Ok(None)
                }
                Char(c) if matches!(c, 'e' | 'E') => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = DecimalExponent;
                    Ok(None)
                }
                _ => Ok(Some(self.produce_number())),
            },

            DecimalInteger => match next_char {
                Char(c @ '.') => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = DecimalPoint;
                    Ok(None)
                }
                Char(c) if matches!(c, 'e' | 'E') => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = DecimalExponent;
                    Ok(None)
                }
                Char(c) if c.is_ascii_digit() => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.copy_digits();
                    Ok(None)
                }
                _ => Ok(Some(self.produce_number())),
            },

            DecimalPoint => match next_char {
                Char(c) if c.is_ascii_digit() => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = DecimalFraction;
                    self.copy_digits();
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            DecimalFraction => match next_char {
                Char(c) if matches!(c, 'e' | 'E') => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = DecimalExponent;
                    Ok(None)
                }
                Char(c) if c.is_ascii_digit() => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.copy_digits();
                    Ok(None)
                }
                _ => Ok(Some(self.produce_number())),
            },

            DecimalExponent => match next_char {
                Char(c) if matches!(c, '+' | '-') => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = DecimalExponentSign;
                    Ok(None)
                }
                Char(c) if c.is_ascii_digit() => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = DecimalExponentInteger;
                    self.copy_digits();
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            DecimalExponentSign => match next_char {
                Char(c) if c.is_ascii_digit() => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = DecimalExponentInteger;
                    self.copy_digits();
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            DecimalExponentInteger => match next_char {
                Char(c) if c.is_ascii_digit() => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.copy_digits();
                    Ok(None)
                }
                _ => Ok(Some(self.produce_number())),
            },

            // -------------------------- strings -----------------------------
            LexState::String => match next_char {
                _ if self.escape.awaiting_low_surrogate() && !matches!(next_char, Char('\\')) => {
                    Err(self.syntax_error("unpaired surrogate in string"))
                }
                Char('\\') => {
                    self.advance_char();
                    self.lex_state = LexState::StringEscape;
                    Ok(None)
                }
                Char('"') => {
                    self.advance_char();
                    Ok(Some(self.produce_string()))
                }
                Char(c @ '\0'..='\x1F') => Err(self.invalid_char(Char(c))),
                Char(_) => {
                    // Fast path: bulk-copy plain string content. The copied
                    // characters cannot contain a newline, so only the
                    // column and position counters move.
                    let copied = self
                        .source
                        .copy_while(&mut self.buffer, |ch| {
                            ch != '\\' && ch != '"' && ch >= '\u{20}'
                        });
                    self.column += copied;
                    self.pos += copied;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            LexState::StringEscape => match next_char {
                _ if self.escape.awaiting_low_surrogate() && !matches!(next_char, Char('u')) => {
                    Err(self.syntax_error("unpaired surrogate in string"))
                }
                Char(c) if matches!(c, '"' | '\\' | '/') => {
                    self.advance_char();
                    self.buffer.push(c);
                    self.lex_state = LexState::String;
                    Ok(None)
                }
                Char('b') => {
                    self.advance_char();
                    self.buffer.push('\u{0008}');
                    self.lex_state = LexState::String;
                    Ok(None)
                }
                Char('f') => {
                    self.advance_char();
                    self.buffer.push('\u{000C}');
                    self.lex_state = LexState::String;
                    Ok(None)
                }
                Char('n') => {
                    self.advance_char();
                    self.buffer.push('\n');
                    self.lex_state = LexState::String;
                    Ok(None)
                }
                Char('r') => {
                    self.advance_char();
                    self.buffer.push('\r');
                    self.lex_state = LexState::String;
                    Ok(None)
                }
                Char('t') => {
                    self.advance_char();
                    self.buffer.push('\t');
                    self.lex_state = LexState::String;
                    Ok(None)
                }
                Char('u') => {
                    self.advance_char();
                    self.escape.reset_digits();
                    self.lex_state = LexState::StringEscapeUnicode;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            LexState::StringEscapeUnicode => match next_char {
                Char(c) if c.is_ascii_hexdigit() => {
                    self.advance_char();
                    match self.escape.feed(c) {
                        Ok(EscapeStep::NeedMore) => Ok(None),
                        Ok(EscapeStep::Char(decoded)) => {
                            self.buffer.push(decoded);
                            self.lex_state = LexState::String;
                            Ok(None)
                        }
                        Ok(EscapeStep::HighSurrogate) => {
                            self.lex_state = LexState::String;
                            Ok(None)
                        }
                        Err(msg) => Err(self.syntax_error(msg)),
                    }
                }
                c => Err(self.invalid_char(c)),
            },

            // ---------------------- structural states -----------------------
            Start => match next_char {
                Char(c) if matches!(c, '{' | '[') => {
                    self.advance_char();
                    Ok(Some(Token::Punctuator(c as u8)))
                }
                _ => {
                    self.lex_state = Value;
                    Ok(None)
                }
            },

            BeforePropertyName => match next_char {
                Char('}') => {
                    self.advance_char();
                    Ok(Some(Token::Punctuator(b'}')))
                }
                Char('"') => {
                    self.advance_char();
                    self.buffer.clear();
                    self.lex_state = LexState::String;
                    Ok(None)
                }
                c => Err(self.invalid_char(c)),
            },

            AfterPropertyName => match next_char {
                Char(c @ ':') => {
                    self.advance_char();
                    Ok(Some(Token::Punctuator(c as u8)))
                }
                c => Err(self.invalid_char(c)),
            },

            BeforePropertyValue => {
                self.lex_state = Value;
                Ok(None)
            }

            AfterPropertyValue => match next_char {
                Char(c) if matches!(c, ',' | '}') => {
                    self.advance_char();
                    Ok(Some(Token::Punctuator(c as u8)))
                }
                c => Err(self.invalid_char(c)),
            },

            BeforeArrayValue => match next_char {
                Char(']') => {
                    self.advance_char();
                    Ok(Some(Token::Punctuator(b']')))
                }
                _ => {
                    self.lex_state = Value;
                    Ok(None)
                }
            },

            AfterArrayValue => match next_char {
                Char(c) if matches!(c, ',' | ']') => {
                    self.advance_char();
                    Ok(Some(Token::Punctuator(c as u8)))
                }
                c => Err(self.invalid_char(c)),
            },

            End | Error => {
                let c = self.peek_char();
                Err(self.invalid_char(c))
            }
        }
    }

    #[inline]
    fn copy_digits(&mut self) {
        let copied = self
            .source
            .copy_while(&mut self.buffer, |d| d.is_ascii_digit());
        self.column += copied;
        self.pos += copied;
    }

    // --------------------------------------------------------------------
    // Parse-state dispatcher
    // --------------------------------------------------------------------

    fn dispatch(&mut self, token: Token) -> Result<(), ParseError> {
        use ParseState::{
            AfterArrayValue, AfterPropertyName, AfterPropertyValue, BeforeArrayValue,
            BeforePropertyName, BeforePropertyValue, End, Error, Start,
        };

        match self.parse_state {
            Start | BeforePropertyValue => self.push_value(token),

            BeforePropertyName => match token {
                Token::PropertyName(key) => {
                    let path = self.frames.to_path_components();
                    self.emit(ParseEvent::MapKey {
                        path,
                        key: key.clone(),
                    });
                    match self.frames.last_mut() {
                        Some(Frame::Object { pending_key }) => *pending_key = Some(key),
                        _ => {
                            return Err(
                                self.syntax_error("expected an open object for a property name")
                            );
                        }
                    }
                    self.parse_state = AfterPropertyName;
                    Ok(())
                }
                Token::Punctuator(b'}') => self.pop_container(),
                _ => Err(self.syntax_error("expected a property name or '}'")),
            },

            // The lexer only yields ':' here.
            AfterPropertyName => {
                self.parse_state = BeforePropertyValue;
                Ok(())
            }

            BeforeArrayValue => match token {
                Token::Punctuator(b']') => self.pop_container(),
                _ => self.push_value(token),
            },

            AfterPropertyValue => match token {
                Token::Punctuator(b',') => {
                    if let Some(Frame::Object { pending_key }) = self.frames.last_mut() {
                        *pending_key = None;
                    }
                    self.parse_state = BeforePropertyName;
                    Ok(())
                }
                Token::Punctuator(b'}') => self.pop_container(),
                _ => Ok(()),
            },

            AfterArrayValue => match token {
                Token::Punctuator(b',') => match self.frames.last_mut() {
                    Some(Frame::Array { next_index }) => {
                        *next_index += 1;
                        self.parse_state = BeforeArrayValue;
                        Ok(())
                    }
                    _ => Err(self.syntax_error("expected an open array after an array value")),
                },
                Token::Punctuator(b']') => self.pop_container(),
                _ => Ok(()),
            },

            End | Error => Ok(()),
        }
    }

    fn push_value(&mut self, token: Token) -> Result<(), ParseError> {
        match token {
            Token::Punctuator(b'{') => {
                self.frames.push(Frame::Object { pending_key: None });
                let path = self.frames.to_path_components();
                self.emit(ParseEvent::StartMap { path });
                self.parse_state = ParseState::BeforePropertyName;
                return Ok(());
            }
            Token::Punctuator(b'[') => {
                self.frames.push(Frame::Array { next_index: 0 });
                let path = self.frames.to_path_components();
                self.emit(ParseEvent::StartArray { path });
                self.parse_state = ParseState::BeforeArrayValue;
                return Ok(());
            }
            _ => {}
        }

        let mut path = self.frames.to_path_components();
        if let Some(frame) = self.frames.last() {
            path.push(frame.to_path_component());
        }

        match token {
            Token::Null => self.emit(ParseEvent::Null { path }),
            Token::Boolean(value) => self.emit(ParseEvent::Boolean { path, value }),
            Token::Number(value) => self.emit(ParseEvent::Number { path, value }),
            Token::String(value) => self.emit(ParseEvent::String { path, value }),
            Token::PropertyName(_) => {
                return Err(self.syntax_error("unexpected property name outside an object"));
            }
            Token::Punctuator(c) => {
                return Err(self.syntax_error(format!("unexpected {:?}", c as char)));
            }
            Token::Eof => return Ok(()),
        }

        if let Some(Frame::Object { pending_key }) = self.frames.last_mut() {
            *pending_key = None;
        }
        self.parse_state = match self.frames.last() {
            None => ParseState::End,
            Some(Frame::Array { .. }) => ParseState::AfterArrayValue,
            Some(Frame::Object { .. }) => ParseState::AfterPropertyValue,
        };
        Ok(())
    }

    fn pop_container(&mut self) -> Result<(), ParseError> {
        let path = self.frames.to_path_components();
        match self.frames.pop() {
            Some(Frame::Array { .. }) => self.emit(ParseEvent::EndArray { path }),
            Some(Frame::Object { .. }) => self.emit(ParseEvent::EndMap { path }),
            None => return Err(self.syntax_error("unbalanced closing delimiter")),
        }

        self.parse_state = match self.frames.last() {
            None => ParseState::End,
            Some(Frame::Array { .. }) => ParseState::AfterArrayValue,
            Some(Frame::Object { .. }) => ParseState::AfterPropertyValue,
        };
        Ok(())
    }

    #[inline]
    fn emit(&mut self, event: ParseEvent) {
        debug_assert!(self.pending_event.is_none());
        self.pending_event = Some(event);
    }

    // --------------------------------------------------------------------
    // Errors
    // --------------------------------------------------------------------

    fn invalid_char(&self, c: PeekedChar) -> ParseError {
        match c {
            Char(c) => ParseError {
                kind: ParseErrorKind::InvalidChar(c),
                line: self.line,
                column: self.column,
            },
            Empty | EndOfInput => self.unexpected_eof(),
        }
    }

    fn unexpected_eof(&self) -> ParseError {
        ParseError {
            kind: ParseErrorKind::UnexpectedEof,
            line: self.line,
            column: self.column,
        }
    }

    fn syntax_error(&self, msg: impl Into<String>) -> ParseError {
        ParseError {
            kind: ParseErrorKind::Syntax(msg.into()),
            line: self.line,
            column: self.column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Poll, StreamingParser};
    use crate::error::ParseErrorKind;
    use crate::event::{ParseEvent, PathComponent, join_dotted};

    fn parse_all(input: &str) -> Vec<ParseEvent> {
        let mut parser = StreamingParser::new();
        parser.feed(input);
        parser.end_input();
        let mut events = Vec::new();
        loop {
            match parser.poll().expect("input should parse") {
                Poll::Event(event) => events.push(event),
                Poll::End => return events,
                Poll::Pending => panic!("pending after end of input"),
            }
        }
    }

    fn scalar_prefixes(input: &str) -> Vec<String> {
        parse_all(input)
            .iter()
            .filter(|ev| {
                matches!(
                    ev,
                    ParseEvent::String { .. }
                        | ParseEvent::Number { .. }
                        | ParseEvent::Boolean { .. }
                        | ParseEvent::Null { .. }
                )
            })
            .map(|ev| join_dotted(ev.path()))
            .collect()
    }

    #[test]
    fn object_with_array_paths() {
        let events = parse_all(r#"{"a":[1]}"#);
        let paths: Vec<_> = events.iter().map(|ev| ev.path().to_vec()).collect();
        assert_eq!(
            events[0],
            ParseEvent::StartMap { path: Vec::new() },
        );
        assert_eq!(paths[1], vec![]); // map_key "a" at the root object
        assert_eq!(paths[2], vec![PathComponent::from("a")]);
        assert_eq!(
            paths[3],
            vec![PathComponent::from("a"), PathComponent::from(0)]
        );
        assert_eq!(paths[4], vec![PathComponent::from("a")]);
        assert_eq!(paths[5], vec![]);
    }

    #[test]
    fn scalar_array_indices_are_contiguous() {
        assert_eq!(
            scalar_prefixes(r#"{"a":["x","y","z"]}"#),
            vec!["a.0", "a.1", "a.2"]
        );
    }

    #[test]
    fn array_of_objects_indices() {
        assert_eq!(
            scalar_prefixes(r#"{"items":[{"k":"a"},{"k":"b"},{"k":"c"}]}"#),
            vec!["items.0.k", "items.1.k", "items.2.k"]
        );
    }

    #[test]
    fn multi_key_objects_inside_array() {
        assert_eq!(
            scalar_prefixes(r#"{"items":[{"k":"a"},{"j":"b","l":"c"}]}"#),
            vec!["items.0.k", "items.1.j", "items.1.l"]
        );
    }

    #[test]
    fn nested_arrays() {
        assert_eq!(
            scalar_prefixes(r#"{"m":[["a"],["b","c"]]}"#),
            vec!["m.0.0", "m.1.0", "m.1.1"]
        );
    }

    #[test]
    fn mixed_array_elements() {
        assert_eq!(
            scalar_prefixes(r#"{"x":["s",{"k":"v"},"t",["u"],"end"]}"#),
            vec!["x.0", "x.1.k", "x.2", "x.3.0", "x.4"]
        );
    }

    #[test]
    fn concatenated_top_level_objects() {
        let events = parse_all("{\"a\":1} {\"a\":2}\n{\"a\":3}");
        let roots = events
            .iter()
            .filter(|ev| matches!(ev, ParseEvent::EndMap { path } if path.is_empty()))
            .count();
        assert_eq!(roots, 3);
    }

    #[test]
    fn number_lexemes_survive_verbatim() {
        let events = parse_all(r#"{"n":1.50e3,"m":-0.25}"#);
        let numbers: Vec<_> = events
            .iter()
            .filter_map(|ev| match ev {
                ParseEvent::Number { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec!["1.50e3", "-0.25"]);
    }

    #[test]
    fn string_escapes_decode() {
        let events = parse_all(r#"{"s":"a\nb\tA😀"}"#);
        let strings: Vec<_> = events
            .iter()
            .filter_map(|ev| match ev {
                ParseEvent::String { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(strings, vec!["a\nb\tA\u{1F600}"]);
    }

    #[test]
    fn keyword_literals_parse() {
        let events = parse_all(r#"{"t":true,"f":false,"n":null}"#);
        assert!(events.contains(&ParseEvent::Boolean {
            path: vec![PathComponent::from("t")],
            value: true,
        }));
        assert!(events.contains(&ParseEvent::Boolean {
            path: vec![PathComponent::from("f")],
            value: false,
        }));
        assert!(events.contains(&ParseEvent::Null {
            path: vec![PathComponent::from("n")],
        }));
    }

    #[test]
    fn misspelled_literal_is_rejected() {
        for input in [r#"{"a":nul}"#, r#"{"a":tru}"#, r#"{"a":falsey}"#] {
            let mut parser = StreamingParser::new();
            parser.feed(input);
            parser.end_input();
            let err = loop {
                match parser.poll() {
                    Ok(Poll::Event(_)) => {}
                    Ok(Poll::End | Poll::Pending) => panic!("expected an error for {input}"),
                    Err(err) => break err,
                }
            };
            assert!(err.is_recoverable());
        }
    }

    #[test]
    fn literal_split_across_chunks() {
        let mut parser = StreamingParser::new();
        parser.feed(r#"{"a":fal"#);
        assert!(matches!(parser.poll().expect("no error"), Poll::Event(_))); // start_map
        assert!(matches!(parser.poll().expect("no error"), Poll::Event(_))); // map_key
        assert!(matches!(parser.poll().expect("no error"), Poll::Pending));
        parser.feed("se}");
        parser.end_input();
        let mut events = Vec::new();
        loop {
            match parser.poll().expect("no error") {
                Poll::Event(event) => events.push(event),
                Poll::End => break,
                Poll::Pending => panic!("pending after end of input"),
            }
        }
        assert!(events.contains(&ParseEvent::Boolean {
            path: vec![PathComponent::from("a")],
            value: false,
        }));
    }

    #[test]
    fn map_keys_surface_at_the_root() {
        let events = parse_all(r#"{"site":{"name":"S"},"id":"7"}"#);
        let root_keys: Vec<_> = events
            .iter()
            .filter_map(|ev| match ev {
                ParseEvent::MapKey { path, key } if path.is_empty() => Some(key.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(root_keys, vec!["site", "id"]);
    }

    #[test]
    fn truncated_object_reports_unexpected_eof() {
        let mut parser = StreamingParser::new();
        parser.feed(r#"{"a":{"b":"#);
        parser.end_input();
        loop {
            match parser.poll() {
                Ok(Poll::Event(_)) => {}
                Ok(Poll::End | Poll::Pending) => panic!("expected an error"),
                Err(err) => {
                    assert!(err.is_truncation());
                    assert!(err.is_recoverable());
                    return;
                }
            }
        }
    }

    #[test]
    fn truncated_string_reports_unexpected_eof() {
        let mut parser = StreamingParser::new();
        parser.feed(r#"{"a":"unterminated"#);
        parser.end_input();
        loop {
            match parser.poll() {
                Ok(Poll::Event(_)) => {}
                Ok(Poll::End | Poll::Pending) => panic!("expected an error"),
                Err(err) => {
                    assert!(err.is_truncation());
                    return;
                }
            }
        }
    }

    #[test]
    fn malformed_input_reports_position() {
        let mut parser = StreamingParser::new();
        parser.feed("{\"a\": oops}");
        parser.end_input();
        loop {
            match parser.poll() {
                Ok(Poll::Event(_)) => {}
                Ok(Poll::End | Poll::Pending) => panic!("expected an error"),
                Err(err) => {
                    assert!(matches!(err.kind, ParseErrorKind::InvalidChar(_)));
                    assert_eq!(err.line, 1);
                    return;
                }
            }
        }
    }

    #[test]
    fn pending_until_input_arrives() {
        let mut parser = StreamingParser::new();
        parser.feed(r#"{"a":"#);
        assert!(matches!(parser.poll().expect("no error"), Poll::Event(_))); // start_map
        assert!(matches!(parser.poll().expect("no error"), Poll::Event(_))); // map_key
        assert!(matches!(parser.poll().expect("no error"), Poll::Pending));
        parser.feed("1}");
        parser.end_input();
        let mut rest = Vec::new();
        loop {
            match parser.poll().expect("no error") {
                Poll::Event(event) => rest.push(event),
                Poll::End => break,
                Poll::Pending => panic!("pending after end of input"),
            }
        }
        assert_eq!(rest.len(), 2); // number, end_map
    }

    #[test]
    fn chunked_feeding_matches_whole_input() {
        let input = r#"{"site":{"name":"S","tags":["a","b"]},"id":"7"} {"site":{"name":"T"},"id":"8"}"#;
        let whole = parse_all(input);

        let mut parser = StreamingParser::new();
        let mut chunked = Vec::new();
        for ch in input.chars() {
            parser.feed(ch.to_string().as_str());
            loop {
                match parser.poll().expect("no error") {
                    Poll::Event(event) => chunked.push(event),
                    Poll::Pending => break,
                    Poll::End => break,
                }
            }
        }
        parser.end_input();
        loop {
            match parser.poll().expect("no error") {
                Poll::Event(event) => chunked.push(event),
                Poll::Pending => panic!("pending after end of input"),
                Poll::End => break,
            }
        }
        assert_eq!(whole, chunked);
    }
}
