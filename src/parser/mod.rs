//! The recursive-descent parser (component C, §4.2).
//!
//! One token of lookahead, matching the grammar in §4.2. On the first
//! expectation failure the parser records a [`crate::error::Diagnostic`]
//! and stops; it does not attempt recovery (§4.2, §7).

pub mod ast;

pub use ast::{Arg, SurfaceForm, Value};

use crate::bowstring::BowString;
use crate::error::{Diagnostic, Error};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::limit::LimitTracker;
use crate::source::{FileId, Location};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    file_id: FileId,
    peeked: Option<Token>,
    error: Option<Diagnostic>,
    recursion: LimitTracker,
}

type PResult<T> = Result<T, ()>;

impl<'a> Parser<'a> {
    pub fn new(working: &'a mut [u8], file_id: FileId) -> Self {
        Parser {
            lexer: Lexer::new(working, file_id),
            file_id,
            peeked: None,
            error: None,
            recursion: LimitTracker::default(),
        }
    }

    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion = LimitTracker::new(limit);
        self
    }

    /// Parses a full file's top-level `body`. On failure, returns as many
    /// forms as were parsed before the error and the caller should consult
    /// [`Parser::take_error`].
    pub fn parse(mut self) -> (Vec<SurfaceForm>, Option<Diagnostic>) {
        let forms = self.parse_body(&[TokenKind::Eof]).unwrap_or_default();
        (forms, self.error)
    }

    pub fn take_error(&mut self) -> Option<Diagnostic> {
        self.error.take()
    }

    fn peek(&mut self) -> Token {
        if self.peeked.is_none() {
            self.peeked = Some(self.fetch_one());
        }
        self.peeked.unwrap()
    }

    fn fetch_one(&mut self) -> Token {
        match self.lexer.next_significant() {
            Some(tok) => {
                if tok.kind == TokenKind::Error {
                    if let Some(diag) = self.lexer.take_error() {
                        self.record(diag);
                    }
                }
                tok
            }
            None => {
                if self.error.is_none() {
                    if let Some(diag) = self.lexer.take_error() {
                        self.record(diag);
                    }
                }
                Token {
                    kind: TokenKind::Eof,
                    start: 0,
                    end: 0,
                }
            }
        }
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek();
        self.peeked = None;
        tok
    }

    fn record(&mut self, diag: Diagnostic) {
        if self.error.is_none() {
            self.error = Some(diag);
        }
    }

    fn fail(&mut self, message: impl Into<String>) {
        let loc = self.peek().location(self.file_id);
        self.record(Diagnostic::new(Error::Parse(message.into()), Some(loc)));
    }

    fn lexeme_str(&self, tok: &Token) -> BowString {
        let bytes = self.lexer.lexeme(tok);
        BowString::new(&String::from_utf8_lossy(bytes))
    }

    fn loc(&self, tok: &Token) -> Location {
        tok.location(self.file_id)
    }

    fn eat_punct(&mut self, c: u8) -> bool {
        if self.peek().kind == TokenKind::Punct(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: u8) -> PResult<()> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            self.fail(format!("Expected '{}'.", c as char));
            Err(())
        }
    }

    fn parse_body(&mut self, stop: &[TokenKind]) -> PResult<Vec<SurfaceForm>> {
        let mut forms = Vec::new();
        while !stop.contains(&self.peek().kind) {
            if self.error.is_some() {
                break;
            }
            forms.push(self.parse_form()?);
        }
        Ok(forms)
    }

    fn parse_modifiers(&mut self) -> crate::csg3::Modifiers {
        use crate::csg3::Modifiers;
        let mut m = Modifiers::empty();
        loop {
            let bit = match self.peek().kind {
                TokenKind::Punct(b'!') => Modifiers::SHOW_ONLY,
                TokenKind::Punct(b'*') => Modifiers::DISABLE,
                TokenKind::Punct(b'%') => Modifiers::BACKGROUND,
                TokenKind::Punct(b'#') => Modifiers::HIGHLIGHT,
                _ => break,
            };
            self.bump();
            m |= bit;
        }
        m
    }

    fn parse_form(&mut self) -> PResult<SurfaceForm> {
        self.recursion.consume();
        if self.recursion.limited() {
            self.fail("Recursion limit exceeded.");
            return Err(());
        }
        let modifiers = self.parse_modifiers();
        let loc = self.loc(&self.peek());

        if self.eat_punct(b'{') {
            let body = self.parse_body(&[TokenKind::Punct(b'}')])?;
            self.expect_punct(b'}')?;
            self.recursion.reset();
            return Ok(SurfaceForm {
                functor: BowString::new("{"),
                modifiers,
                args: Vec::new(),
                body,
                loc,
            });
        }

        let name_tok = self.peek();
        if name_tok.kind != TokenKind::Ident {
            self.fail("Expected a group or a functor call.");
            return Err(());
        }
        let functor = self.lexeme_str(&name_tok);
        self.bump();
        self.expect_punct(b'(')?;
        let args = if self.peek().kind == TokenKind::Punct(b')') {
            Vec::new()
        } else {
            self.parse_args()?
        };
        self.expect_punct(b')')?;
        let body = self.parse_tail()?;
        self.recursion.reset();
        Ok(SurfaceForm {
            functor,
            modifiers,
            args,
            body,
            loc,
        })
    }

    fn parse_tail(&mut self) -> PResult<Vec<SurfaceForm>> {
        if self.eat_punct(b';') {
            return Ok(Vec::new());
        }
        if self.eat_punct(b'{') {
            let body = self.parse_body(&[TokenKind::Punct(b'}')])?;
            self.expect_punct(b'}')?;
            return Ok(body);
        }
        Ok(vec![self.parse_form()?])
    }

    fn parse_args(&mut self) -> PResult<Vec<Arg>> {
        let mut args = vec![self.parse_arg()?];
        while self.eat_punct(b',') {
            if self.peek().kind == TokenKind::Punct(b')') {
                break; // trailing comma
            }
            args.push(self.parse_arg()?);
        }
        Ok(args)
    }

    fn parse_arg(&mut self) -> PResult<Arg> {
        if self.peek().kind == TokenKind::Ident {
            // Could be `id = value` or a bare identifier value; only the
            // former consumes the '=' sign, so peek two tokens ahead by
            // tentatively bumping and checking.
            let ident_tok = self.bump();
            if self.eat_punct(b'=') {
                let key = self.lexeme_str(&ident_tok);
                let value = self.parse_value()?;
                return Ok(Arg { key: Some(key), value });
            }
            let loc = self.loc(&ident_tok);
            let value = Value::Ident(self.lexeme_str(&ident_tok), loc);
            return Ok(Arg { key: None, value });
        }
        let value = self.parse_value()?;
        Ok(Arg { key: None, value })
    }

    fn parse_value(&mut self) -> PResult<Value> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Int => {
                self.bump();
                let loc = self.loc(&tok);
                let text = String::from_utf8_lossy(self.lexer.lexeme(&tok)).into_owned();
                let n: i64 = text.parse().map_err(|_| {
                    self.record(Diagnostic::new(
                        Error::Parse(format!("Malformed integer literal '{text}'.")),
                        Some(loc),
                    ));
                })?;
                Ok(Value::Int(n, loc))
            }
            TokenKind::Float => {
                self.bump();
                let loc = self.loc(&tok);
                let text = String::from_utf8_lossy(self.lexer.lexeme(&tok)).into_owned();
                let n: f64 = text.parse().map_err(|_| {
                    self.record(Diagnostic::new(
                        Error::Parse(format!("Malformed float literal '{text}'.")),
                        Some(loc),
                    ));
                })?;
                Ok(Value::Float(n, loc))
            }
            TokenKind::String => {
                self.bump();
                let loc = self.loc(&tok);
                Ok(Value::Str(decode_string(self.lexer.lexeme(&tok)), loc))
            }
            TokenKind::Ident => {
                self.bump();
                let loc = self.loc(&tok);
                Ok(Value::Ident(self.lexeme_str(&tok), loc))
            }
            TokenKind::Punct(b'[') => {
                self.bump();
                self.parse_value_tail(self.loc(&tok))
            }
            _ => {
                self.fail("Expected a value.");
                Err(())
            }
        }
    }

    fn parse_value_tail(&mut self, loc: Location) -> PResult<Value> {
        if self.eat_punct(b']') {
            return Ok(Value::Array(Vec::new(), loc));
        }
        let first = self.parse_value()?;
        if self.eat_punct(b':') {
            let second = self.parse_value()?;
            let (step, end) = if self.eat_punct(b':') {
                let third = self.parse_value()?;
                (Some(Box::new(second)), third)
            } else {
                (None, second)
            };
            self.expect_punct(b']')?;
            Ok(Value::Range {
                start: Box::new(first),
                step,
                end: Box::new(end),
                loc,
            })
        } else {
            let mut items = vec![first];
            while self.eat_punct(b',') {
                if self.peek().kind == TokenKind::Punct(b']') {
                    break;
                }
                items.push(self.parse_value()?);
            }
            self.expect_punct(b']')?;
            Ok(Value::Array(items, loc))
        }
    }
}

/// Decodes the scanner's raw, still-quoted-and-escaped string lexeme
/// (`"..."`, backslash escapes one following byte) into its text.
fn decode_string(raw: &[u8]) -> BowString {
    let inner = &raw[1..raw.len() - 1];
    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        if inner[i] == b'\\' && i + 1 < inner.len() {
            out.push(inner[i + 1]);
            i += 2;
        } else {
            out.push(inner[i]);
            i += 1;
        }
    }
    BowString::new(&String::from_utf8_lossy(&out))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::SourceFile;

    fn parse(src: &str) -> (Vec<SurfaceForm>, Option<Diagnostic>) {
        let mut file = SourceFile::new("t.scad", src);
        let parser = Parser::new(&mut file.working, FileId(0));
        parser.parse()
    }

    #[test]
    fn empty_body_parses() {
        let (forms, err) = parse("");
        assert!(forms.is_empty());
        assert!(err.is_none());
    }

    #[test]
    fn single_call_form() {
        let (forms, err) = parse("cube([10,10,10]);");
        assert!(err.is_none());
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].functor.as_str(), "cube");
    }

    #[test]
    fn range_vs_array() {
        let (forms, err) = parse("f(x=[1:2:10]);");
        assert!(err.is_none());
        let arg = &forms[0].args[0];
        assert!(matches!(arg.value, Value::Range { .. }));

        let (forms, err) = parse("f(x=[1,2,10]);");
        assert!(err.is_none());
        let arg = &forms[0].args[0];
        match &arg.value {
            Value::Array(items, _) => assert_eq!(items.len(), 3),
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn nested_group_and_modifiers() {
        let (forms, err) = parse("difference(){ cube(10); !cube(5); }");
        assert!(err.is_none());
        assert_eq!(forms[0].functor.as_str(), "difference");
        assert_eq!(forms[0].body.len(), 2);
        assert!(forms[0].body[1].modifiers.contains(crate::csg3::Modifiers::SHOW_ONLY));
    }
}
