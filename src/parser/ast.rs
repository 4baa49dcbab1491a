//! The surface syntax tree (§3): untyped values and function-call forms
//! produced by the parser, consumed by [`crate::lower`].

use crate::bowstring::BowString;
use crate::csg3::Modifiers;
use crate::source::Location;

/// A surface value, tagged by variant rather than a runtime type byte.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64, Location),
    Float(f64, Location),
    Str(BowString, Location),
    Ident(BowString, Location),
    /// `[start:end]` or `[start:step:end]`. Per the resolved range grammar
    /// (see `SPEC_FULL.md` §9), the middle value of a three-value range is
    /// the step, not a second endpoint.
    Range {
        start: Box<Value>,
        step: Option<Box<Value>>,
        end: Box<Value>,
        loc: Location,
    },
    Array(Vec<Value>, Location),
}

impl Value {
    pub fn location(&self) -> Location {
        match self {
            Value::Int(_, loc)
            | Value::Float(_, loc)
            | Value::Str(_, loc)
            | Value::Ident(_, loc)
            | Value::Range { loc, .. }
            | Value::Array(_, loc) => *loc,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i, _) => Some(*i as f64),
            Value::Float(f, _) => Some(*f),
            _ => None,
        }
    }
}

/// `[key =] value`; a positional argument has no key.
#[derive(Debug, Clone)]
pub struct Arg {
    pub key: Option<BowString>,
    pub value: Value,
}

/// A function-call form, or the anonymous group `"{" body "}"`, whose
/// functor is the literal string `"{"`.
#[derive(Debug, Clone)]
pub struct SurfaceForm {
    pub functor: BowString,
    pub modifiers: Modifiers,
    pub args: Vec<Arg>,
    pub body: Vec<SurfaceForm>,
    pub loc: Location,
}

impl SurfaceForm {
    pub fn is_group(&self) -> bool {
        self.functor.as_str() == "{"
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.iter().find(|a| a.key.as_deref() == Some(name)).map(|a| &a.value)
    }

    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.args.iter().filter(|a| a.key.is_none()).nth(index).map(|a| &a.value)
    }
}
