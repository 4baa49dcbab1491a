//! Error taxonomy (§7) and the "first writer wins" error record.
//!
//! The original keeps a single `cp_err_t { msg, loc, loc2 }` per parse and
//! guards every write with `have_err_msg()`. We replace the boolean-returning
//! functions with [`Result`] and keep the same "first error observed in
//! source order survives" behavior in [`ErrorRecord`], used by the slicer and
//! the layer driver where multiple workers can each observe a failure.

use crate::source::Location;
use std::sync::Mutex;

/// The kind of pipeline stage that raised an error (§7 taxonomy).
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Lex(String),
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Lower(String),
    #[error("{0}")]
    Slice(String),
    #[error("boolean operation failed: {0}")]
    BoolOp(String),
    #[error("triangulation failed: {0}")]
    Triangulate(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("{0}")]
    Cli(String),
}

/// A located error: the taxonomy kind plus a primary, and optional
/// secondary, source location (e.g. the opening brace of an unterminated
/// block).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub error: Error,
    pub primary: Option<Location>,
    pub secondary: Option<Location>,
}

impl Diagnostic {
    pub fn new(error: Error, primary: Option<Location>) -> Self {
        Self {
            error,
            primary,
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Location) -> Self {
        self.secondary = Some(secondary);
        self
    }
}

/// Single-writer error slot: the first [`Diagnostic`] recorded wins, every
/// later `set` is a no-op. Safe to share across layer-driver worker threads.
#[derive(Default)]
pub struct ErrorRecord {
    slot: Mutex<Option<Diagnostic>>,
}

impl ErrorRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call actually recorded the error (i.e. it was
    /// the first one seen).
    pub fn set(&self, diagnostic: Diagnostic) -> bool {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_some() {
            return false;
        }
        *slot = Some(diagnostic);
        true
    }

    pub fn has_error(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }

    pub fn take(&self) -> Option<Diagnostic> {
        self.slot.lock().unwrap().take()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::FileId;

    #[test]
    fn first_writer_wins() {
        let rec = ErrorRecord::new();
        let loc = Location::new(FileId(0), 3);
        assert!(rec.set(Diagnostic::new(Error::Lex("first".into()), Some(loc))));
        assert!(!rec.set(Diagnostic::new(Error::Lex("second".into()), Some(loc))));
        let got = rec.take().unwrap();
        assert!(matches!(got.error, Error::Lex(m) if m == "first"));
    }
}
