//! Source file registry and location mapping.
//!
//! The original implementation keys every diagnostic on a raw `char *`
//! pointer into a mutable scan buffer and recovers the owning file by a
//! linear scan over open files. Here a [`Location`] is `{file_id, byte
//! offset}`; the registry owns the buffers, and mapping to line/column is a
//! binary search over a line-start table (see [`SourceFile::line_col`]).

use std::fmt;
use std::sync::Arc;

/// Identifies a source file within a [`SourceMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) u32);

/// A byte-offset location within a specific file's working buffer.
///
/// Locations are carried on every token and tree node so that any stage can
/// report a diagnostic without re-threading source text through its API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub file_id: FileId,
    pub offset: u32,
}

impl Location {
    pub fn new(file_id: FileId, offset: u32) -> Self {
        Self { file_id, offset }
    }
}

/// Zero-based line, one-based column (counted in UTF-8 bytes, like the
/// original; callers that need character columns can re-decode the slice).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
}

/// A parsed source file: a mutable working buffer the scanner tokenizes
/// in-place (see [`crate::lexer`]), an untouched original copy for error
/// excerpts, and a line-start index for location mapping.
///
/// Invariant: `line_starts` is strictly increasing and its last element
/// equals `working.len()`.
pub struct SourceFile {
    pub name: String,
    pub working: Vec<u8>,
    pub original: Vec<u8>,
    line_starts: Vec<u32>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: &str) -> Self {
        let original = content.as_bytes().to_vec();
        let mut working = original.clone();
        working.push(0); // 0-terminated working copy, per the scanner contract

        let mut line_starts = vec![0u32];
        for (i, b) in original.iter().enumerate() {
            if *b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        if *line_starts.last().unwrap() != original.len() as u32 {
            line_starts.push(original.len() as u32);
        }

        Self {
            name: name.into(),
            working,
            original,
            line_starts,
        }
    }

    /// Text of the working buffer still available to the scanner, starting
    /// at `offset` (excludes the trailing NUL sentinel).
    pub fn working_tail(&self, offset: u32) -> &[u8] {
        &self.working[offset as usize..self.working.len() - 1]
    }

    /// Map a byte offset to a zero-based line index via binary search over
    /// the line-start table. `line[i] <= offset < line[i+1]` except for the
    /// final (empty, sentinel) line.
    pub fn line_of(&self, offset: u32) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(i) => i.min(self.line_starts.len() - 2),
            Err(i) => i.saturating_sub(1).min(self.line_starts.len() - 2),
        }
    }

    pub fn line_col(&self, offset: u32) -> LineCol {
        let line = self.line_of(offset);
        let column = (offset - self.line_starts[line]) as usize + 1;
        LineCol { line, column }
    }

    /// `(start, end)` byte range of the given line, taken from the original
    /// (untouched) buffer, so error excerpts never show scanner-inserted
    /// NULs.
    pub fn original_line_range(&self, line: usize) -> (u32, u32) {
        (self.line_starts[line], self.line_starts[line + 1])
    }

    pub fn original_line_text(&self, line: usize) -> &str {
        let (start, end) = self.original_line_range(line);
        let end = end.min(self.original.len() as u32);
        let text = &self.original[start as usize..end as usize];
        std::str::from_utf8(text)
            .unwrap_or("")
            .trim_end_matches(['\n', '\r'])
    }
}

/// A collection of source files, indexed by [`FileId`]. Shared (via `Arc`)
/// between the driver and the diagnostics subsystem so a failing worker
/// thread can still render a full source excerpt.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<Arc<SourceFile>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, file: SourceFile) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(Arc::new(file));
        id
    }

    pub fn get(&self, id: FileId) -> &Arc<SourceFile> {
        &self.files[id.0 as usize]
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn line_starts_monotonic_and_terminated() {
        let file = SourceFile::new("t.scad", "cube(1);\ntranslate([1,0,0])\ncube(2);\n");
        assert_eq!(file.line_of(0), 0);
        assert_eq!(file.line_of(9), 1);
        let lc = file.line_col(9);
        assert_eq!(lc.line, 1);
        assert_eq!(lc.column, 1);
    }

    #[test]
    fn empty_file_has_one_line() {
        let file = SourceFile::new("t.scad", "");
        assert_eq!(file.line_of(0), 0);
        assert_eq!(file.original_line_text(0), "");
    }
}
