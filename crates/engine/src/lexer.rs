//! Lexer (component B): source text → a flat token stream with positions.
//!
//! Hand-rolled rather than generated: the grammar (spec.md §4.2) is small
//! enough that a direct byte-at-a-time scanner is both more debuggable and
//! sufficient, matching the teacher's posture of hand-rolled parsing over a
//! grammar-generator crate.

use std::rc::Rc;

use crate::{
    error::EngineError,
    pos::SourcePos,
};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    /// Single-, double-quoted, or backtick-delimited string. Backtick
    /// strings are raw (no escape processing, may span lines).
    Str(Rc<str>),
    /// One of `( ) { } [ ] ,`.
    Punct(char),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: SourcePos,
}

pub struct Lexer<'a> {
    file: Rc<str>,
    bytes: &'a [u8],
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(file: impl Into<Rc<str>>, source: &'a str) -> Self {
        Self { file: file.into(), bytes: source.as_bytes(), offset: 0, line: 1, column: 1 }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, EngineError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.offset).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.offset + ahead).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.offset += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn pos(&self) -> SourcePos {
        SourcePos::new(self.file.clone(), self.line, self.column)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_byte() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek_byte() {
                        if b == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, EngineError> {
        self.skip_whitespace_and_comments();
        let pos = self.pos();
        let Some(b) = self.peek_byte() else {
            return Ok(Token { kind: TokenKind::Eof, pos });
        };

        match b {
            b'(' | b')' | b'{' | b'}' | b'[' | b']' | b',' => {
                self.advance();
                Ok(Token { kind: TokenKind::Punct(b as char), pos })
            }
            b'"' | b'\'' => self.read_quoted_string(b, pos),
            b'`' => self.read_raw_string(pos),
            b'0'..=b'9' => self.read_number(pos),
            b'-' if matches!(self.peek_at(1), Some(b'0'..=b'9')) => self.read_number(pos),
            // Open question (spec.md §4.2, §9): a bare `-` is consumed as
            // part of a negative literal only when immediately followed by
            // a digit. Otherwise it is silently dropped -- it is never
            // treated as a binary subtraction operator. Preserved verbatim.
            b'-' => {
                self.advance();
                self.next_token()
            }
            b if is_ident_start(b) => self.read_ident(pos),
            other => Err(EngineError::parse(format!("unexpected byte 0x{other:02x}"), pos)),
        }
    }

    fn read_ident(&mut self, pos: SourcePos) -> Result<Token, EngineError> {
        let start = self.offset;
        while let Some(b) = self.peek_byte() {
            if is_ident_continue(b) {
                self.advance();
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.offset]).unwrap().to_string();
        Ok(Token { kind: TokenKind::Ident(text), pos })
    }

    fn read_number(&mut self, pos: SourcePos) -> Result<Token, EngineError> {
        let start = self.offset;
        if self.peek_byte() == Some(b'-') {
            self.advance();
        }
        while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
            self.advance();
        }
        if self.peek_byte() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.advance();
            while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
                self.advance();
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.offset]).unwrap();
        let value: f64 = text.parse().map_err(|_| EngineError::parse(format!("invalid number literal '{text}'"), pos.clone()))?;
        Ok(Token { kind: TokenKind::Number(value), pos })
    }

    fn read_quoted_string(&mut self, quote: u8, pos: SourcePos) -> Result<Token, EngineError> {
        self.advance(); // opening quote
        let mut out = String::new();
        loop {
            match self.advance() {
                None => return Err(EngineError::parse("unterminated string literal", pos)),
                Some(b) if b == quote => break,
                Some(b'\\') => {
                    let escaped = self.advance().ok_or_else(|| EngineError::parse("unterminated escape sequence", pos.clone()))?;
                    out.push(match escaped {
                        b'n' => '\n',
                        b't' => '\t',
                        b'r' => '\r',
                        b'b' => '\u{8}',
                        b'f' => '\u{c}',
                        b'0' => '\0',
                        b'\\' => '\\',
                        b'\'' => '\'',
                        b'"' => '"',
                        other => other as char,
                    });
                }
                Some(b) => out.push(b as char),
            }
        }
        Ok(Token { kind: TokenKind::Str(Rc::from(out.as_str())), pos })
    }

    fn read_raw_string(&mut self, pos: SourcePos) -> Result<Token, EngineError> {
        self.advance(); // opening backtick
        let mut out = String::new();
        loop {
            match self.advance() {
                None => return Err(EngineError::parse("unterminated raw string literal", pos)),
                Some(b'`') => break,
                Some(b) => out.push(b as char),
            }
        }
        Ok(Token { kind: TokenKind::Str(Rc::from(out.as_str())), pos })
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new("test", src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn negative_number_consumed_when_digit_follows() {
        assert_eq!(kinds("-5"), vec![TokenKind::Number(-5.0), TokenKind::Eof]);
    }

    #[test]
    fn bare_minus_without_digit_is_silently_dropped() {
        assert_eq!(kinds("- x"), vec![TokenKind::Ident("x".to_string()), TokenKind::Eof]);
    }

    #[test]
    fn line_comment_consumed_silently() {
        assert_eq!(kinds("x // trailing comment\ny"), vec![
            TokenKind::Ident("x".to_string()),
            TokenKind::Ident("y".to_string()),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn escape_sequences_decoded() {
        let toks = kinds(r#""a\nb\tc""#);
        assert_eq!(toks[0], TokenKind::Str(Rc::from("a\nb\tc")));
    }

    #[test]
    fn backtick_string_is_raw() {
        let toks = kinds("`a\\nb`");
        assert_eq!(toks[0], TokenKind::Str(Rc::from("a\\nb")));
    }

    #[test]
    fn positions_track_line_and_column() {
        let tokens = Lexer::new("f.ch", "x\ny").tokenize().unwrap();
        assert_eq!(tokens[0].pos.line, 1);
        assert_eq!(tokens[1].pos.line, 2);
    }
}
