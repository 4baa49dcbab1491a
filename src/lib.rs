#![doc = include_str!("../README.md")]

pub mod arena;
pub mod boolean;
mod bowstring;
pub mod cli;
pub mod csg2;
pub mod csg3;
pub mod diagnostic;
pub mod driver;
pub mod emit;
pub mod error;
mod lexer;
pub mod limit;
pub mod lower;
pub mod parser;
pub mod pipeline;
pub mod slicer;
pub mod source;

pub use crate::bowstring::BowString;
pub use crate::error::{Diagnostic, Error, ErrorRecord};
pub use crate::lexer::{Lexer, Token, TokenKind};
pub use crate::limit::LimitTracker;
pub use crate::parser::{Parser, SurfaceForm};
pub use crate::source::{FileId, Location, SourceFile, SourceMap};
