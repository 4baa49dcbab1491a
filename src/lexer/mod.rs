//! The scanner (component B, §4.1).
//!
//! The original tokenizes in place: it NUL-terminates each lexeme-bearing
//! token directly in the scan buffer so the lexeme pointer doubles as a
//! C string, while keeping a one-byte lookahead cache (`cur`) that is
//! filled *before* the terminator write and is what every dispatch decision
//! actually reads. That separation is what lets the boundary byte be
//! clobbered for the adjacent-lexeme check without corrupting whatever
//! ordinary punctuation happens to sit there. Reimplemented here as byte
//! offsets `(start, end)` into [`crate::source::SourceFile::working`] plus
//! the same cache-then-clobber trick, rather than a borrowed substring,
//! since the parser still needs a stable address for later re-lexing of
//! literals.

use crate::error::{Diagnostic, Error};
use crate::source::{FileId, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    /// A single ASCII punctuation byte, identity-mapped (`(`, `)`, `[`, …).
    Punct(u8),
    Ident,
    Int,
    Float,
    String,
    LineComment,
    BlockComment,
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub start: u32,
    pub end: u32,
}

impl Token {
    pub fn location(&self, file_id: FileId) -> Location {
        Location::new(file_id, self.start)
    }
}

/// Scans `buf` (a `SourceFile::working` buffer, 0-terminated) in place.
/// Comments are produced but filtered out by [`Lexer::next_significant`];
/// the parser never sees them.
pub struct Lexer<'a> {
    buf: &'a mut [u8],
    pos: u32,
    /// The byte conceptually at `pos`, cached at the moment we last moved
    /// onto this position. Dispatch always reads `cur`, never the buffer
    /// directly, so a terminator write at `pos` (from the *previous*
    /// token) never hides what's really here.
    cur: u8,
    file_id: FileId,
    sticky_error: bool,
    last_error: Option<Diagnostic>,
}

impl<'a> Lexer<'a> {
    pub fn new(buf: &'a mut [u8], file_id: FileId) -> Self {
        assert_eq!(buf.last(), Some(&0), "working buffer must be 0-terminated");
        let cur = buf[0];
        Lexer {
            buf,
            pos: 0,
            cur,
            file_id,
            sticky_error: false,
            last_error: None,
        }
    }

    /// Takes the diagnostic produced by the most recent `Error` token, if any.
    pub fn take_error(&mut self) -> Option<Diagnostic> {
        self.last_error.take()
    }

    fn true_end(&self) -> u32 {
        (self.buf.len() - 1) as u32
    }

    fn byte_at(&self, i: u32) -> u8 {
        self.buf[i as usize]
    }

    /// Moves one byte forward and refreshes `cur` from the buffer. A no-op
    /// once `pos` reaches the trailing NUL, matching the "do not push
    /// further" rule at end of input.
    fn advance(&mut self) {
        if self.pos >= self.true_end() {
            self.cur = 0;
            return;
        }
        self.pos += 1;
        self.cur = self.byte_at(self.pos);
    }

    /// A genuine one-ahead peek (not the `cur` cache): only ever used to
    /// distinguish `/` from `//` and `/*`, positions that are never the
    /// clobbered boundary byte at function entry.
    fn peek_next(&self) -> u8 {
        let n = self.pos + 1;
        if n > self.true_end() {
            0
        } else {
            self.byte_at(n)
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.cur, b' ' | b'\t' | b'\r' | b'\n') {
            self.advance();
        }
    }

    fn error(&mut self, message: impl Into<String>) -> Token {
        self.sticky_error = true;
        let start = self.pos;
        Token {
            kind: TokenKind::Error,
            start,
            end: start,
        }
        .tap_err(self, message.into())
    }

    /// Writes the lexeme-ending NUL at `end`. This clobbers whatever real
    /// byte sits there (punctuation, a quote, the next lexeme's first
    /// char); that's fine for punctuation and strings, since every other
    /// dispatch decision reads the cached `cur`, not this buffer slot.
    /// Only `scan_number`/`scan_ident` ever re-derive meaning from the raw
    /// buffer at their own entry point, specifically to detect this write.
    fn terminate_lexeme(&mut self, start: u32, end: u32, kind: TokenKind) -> Option<Token> {
        self.buf[end as usize] = 0;
        Some(Token { kind, start, end })
    }

    /// Returns `None` once a sticky error has been produced; further calls
    /// are a no-op per §4.1's "failure is sticky" rule.
    pub fn next_token(&mut self) -> Option<Token> {
        if self.sticky_error {
            return None;
        }
        self.skip_ws();

        if self.pos >= self.true_end() {
            return Some(Token {
                kind: TokenKind::Eof,
                start: self.pos,
                end: self.pos,
            });
        }

        match self.cur {
            b'0'..=b'9' | b'+' | b'-' | b'.' => self.scan_number(),
            b'$' | b'_' | b'a'..=b'z' | b'A'..=b'Z' => self.scan_ident(),
            b'"' => self.scan_string(),
            b'/' if self.peek_next() == b'/' => self.scan_line_comment(),
            b'/' if self.peek_next() == b'*' => self.scan_block_comment(),
            b if b <= 127 => {
                let start = self.pos;
                self.advance();
                Some(Token {
                    kind: TokenKind::Punct(b),
                    start,
                    end: start + 1,
                })
            }
            _ => Some(self.error("Unexpected byte outside 7-bit ASCII.")),
        }
    }

    /// `next_token` filtered to drop comments, which are never visible past
    /// the scanner (§4.1).
    pub fn next_significant(&mut self) -> Option<Token> {
        loop {
            let tok = self.next_token()?;
            if !matches!(tok.kind, TokenKind::LineComment | TokenKind::BlockComment) {
                return Some(tok);
            }
        }
    }

    fn scan_number(&mut self) -> Option<Token> {
        // The previous token's terminator wrote its NUL exactly here: a
        // second number-like lexeme with zero separation from the first.
        if self.byte_at(self.pos) == 0 {
            return Some(self.error("Expected no number here."));
        }

        let start = self.pos;
        let start_byte = self.cur;
        let mut lexeme_start = start;
        let mut is_float = false;

        if start_byte == b'+' {
            self.advance();
            lexeme_start = self.pos; // leading '+' is dropped from the lexeme
        } else if start_byte == b'-' {
            self.advance();
        }

        let digits_before = self.pos;
        while self.cur.is_ascii_digit() {
            self.advance();
        }

        if self.cur == b'.' {
            is_float = true;
            self.advance();
            while self.cur.is_ascii_digit() {
                self.advance();
            }
        }

        if self.pos == digits_before && !is_float {
            // Lone '+'/'-'/'.' with no digits: treat as punctuation instead.
            self.pos = start;
            self.cur = start_byte;
            let b = start_byte;
            self.advance();
            return Some(Token {
                kind: TokenKind::Punct(b),
                start,
                end: start + 1,
            });
        }

        if matches!(self.cur, b'e' | b'E') {
            let save_pos = self.pos;
            let save_cur = self.cur;
            self.advance();
            if matches!(self.cur, b'+' | b'-') {
                self.advance();
            }
            let exp_digits = self.pos;
            while self.cur.is_ascii_digit() {
                self.advance();
            }
            if self.pos == exp_digits {
                // No exponent digits; back off, not part of the number.
                self.pos = save_pos;
                self.cur = save_cur;
            } else {
                is_float = true;
            }
        }

        let kind = if is_float { TokenKind::Float } else { TokenKind::Int };
        self.terminate_lexeme(lexeme_start, self.pos, kind)
    }

    fn scan_ident(&mut self) -> Option<Token> {
        // Same adjacency check as `scan_number`, scoped to identifier starts.
        if self.byte_at(self.pos) == 0 {
            return Some(self.error("Expected no identifier here."));
        }

        let start = self.pos;
        self.advance(); // '$', '_', or a letter
        while matches!(self.cur, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
            self.advance();
        }
        self.terminate_lexeme(start, self.pos, TokenKind::Ident)
    }

    fn scan_string(&mut self) -> Option<Token> {
        // No adjacency check here: a string directly following another
        // lexeme-bearing token is unambiguous (the opening quote can't be
        // confused with a continuation of the previous token).
        let start = self.pos;
        self.advance(); // opening quote
        loop {
            if self.pos >= self.true_end() {
                return Some(self.error("Unterminated string."));
            }
            match self.cur {
                b'"' => {
                    self.advance();
                    break;
                }
                b'\\' => {
                    self.advance();
                    if self.pos >= self.true_end() {
                        return Some(self.error("Unterminated string."));
                    }
                    self.advance();
                }
                _ => self.advance(),
            }
        }
        self.terminate_lexeme(start, self.pos, TokenKind::String)
    }

    fn scan_line_comment(&mut self) -> Option<Token> {
        let start = self.pos;
        self.advance();
        self.advance();
        while self.pos < self.true_end() && self.cur != b'\n' {
            self.advance();
        }
        Some(Token {
            kind: TokenKind::LineComment,
            start,
            end: self.pos,
        })
    }

    fn scan_block_comment(&mut self) -> Option<Token> {
        let start = self.pos;
        self.advance();
        self.advance();
        loop {
            if self.pos >= self.true_end() {
                return Some(self.error("Unterminated block comment."));
            }
            if self.cur == b'*' && self.peek_next() == b'/' {
                self.advance();
                self.advance();
                break;
            }
            self.advance();
        }
        Some(Token {
            kind: TokenKind::BlockComment,
            start,
            end: self.pos,
        })
    }

    pub fn lexeme<'b>(&'b self, tok: &Token) -> &'b [u8] {
        &self.buf[tok.start as usize..tok.end as usize]
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }
}

/// Stashes the last scanner error for the caller to retrieve, mirroring the
/// single-slot `err` field the teacher's char cursor carries.
trait TapErr {
    fn tap_err(self, lexer: &mut Lexer<'_>, message: String) -> Self;
}

impl TapErr for Token {
    fn tap_err(self, lexer: &mut Lexer<'_>, message: String) -> Self {
        lexer.last_error = Some(Diagnostic::new(
            Error::Lex(message),
            Some(Location::new(lexer.file_id, self.start)),
        ));
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::SourceFile;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut file = SourceFile::new("t.scad", src);
        let mut lexer = Lexer::new(&mut file.working, FileId(0));
        let mut out = Vec::new();
        while let Some(tok) = lexer.next_significant() {
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn an_ident_immediately_followed_by_punctuation_still_lexes_the_punctuation() {
        // The regression case: "cube(" must not mistake the clobbered
        // terminator byte for an adjacent-lexeme error.
        let ks = kinds("cube(10);");
        assert_eq!(
            ks,
            vec![
                TokenKind::Ident,
                TokenKind::Punct(b'('),
                TokenKind::Int,
                TokenKind::Punct(b')'),
                TokenKind::Punct(b';'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn a_string_immediately_after_a_number_lexes_both() {
        let ks = kinds("1.5\"hi\";");
        assert_eq!(
            ks,
            vec![TokenKind::Float, TokenKind::String, TokenKind::Punct(b';'), TokenKind::Eof]
        );
    }

    #[test]
    fn two_numbers_with_no_separator_is_an_adjacency_error() {
        let mut file = SourceFile::new("t.scad", "1.5.5;");
        let mut lexer = Lexer::new(&mut file.working, FileId(0));
        while let Some(tok) = lexer.next_token() {
            if tok.kind == TokenKind::Error {
                let diag = lexer.take_error().unwrap();
                assert!(matches!(diag.error, Error::Lex(msg) if msg.contains("Expected no number")));
                return;
            }
        }
        panic!("expected a lex error");
    }

    #[test]
    fn a_number_immediately_followed_by_an_identifier_is_an_adjacency_error() {
        let mut file = SourceFile::new("t.scad", "5x;");
        let mut lexer = Lexer::new(&mut file.working, FileId(0));
        while let Some(tok) = lexer.next_token() {
            if tok.kind == TokenKind::Error {
                let diag = lexer.take_error().unwrap();
                assert!(matches!(diag.error, Error::Lex(msg) if msg.contains("Expected no identifier")));
                return;
            }
        }
        panic!("expected a lex error");
    }
}
