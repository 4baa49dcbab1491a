//! Diagnostics rendering (component H, §4's diagnostics subsystem, §6).
//!
//! Maps a [`crate::error::Diagnostic`]'s byte-offset [`Location`]s back to a
//! file/line/column and prints a source excerpt with a caret, using
//! `ariadne` the way a report is built against a source cache keyed by file
//! id. Unlike a full interactive diagnostics engine, there is exactly one
//! primary and at most one secondary label per report (§7).

use std::collections::HashMap;
use std::fmt;

use ariadne::{ColorGenerator, Label, Report, ReportKind};

use crate::error::Diagnostic;
use crate::source::{FileId, SourceMap};

struct Cache<'a> {
    sources: &'a SourceMap,
    built: HashMap<FileId, ariadne::Source>,
}

impl<'a> Cache<'a> {
    fn new(sources: &'a SourceMap) -> Self {
        Cache {
            sources,
            built: HashMap::new(),
        }
    }
}

impl ariadne::Cache<FileId> for Cache<'_> {
    type Storage = String;

    fn fetch(&mut self, id: &FileId) -> Result<&ariadne::Source, Box<dyn fmt::Debug + '_>> {
        if !self.built.contains_key(id) {
            let file = self.sources.get(*id);
            let text = String::from_utf8_lossy(&file.original).into_owned();
            self.built.insert(*id, ariadne::Source::from(text));
        }
        Ok(self.built.get(id).unwrap())
    }

    fn display<'b>(&self, id: &'b FileId) -> Option<Box<dyn fmt::Display + 'b>> {
        let file = self.sources.get(*id);
        Some(Box::new(file.name.clone()))
    }
}

/// Renders `diagnostic` as a colored, multi-line report with a source
/// excerpt and a caret at the primary location, falling back to a bare
/// message when no location is attached.
pub fn render(diagnostic: &Diagnostic, sources: &SourceMap) -> String {
    let Some(primary) = diagnostic.primary else {
        return format!("error: {}", diagnostic.error);
    };

    let offset = primary.offset as usize;
    let mut colors = ColorGenerator::new();
    let mut builder = Report::build(ReportKind::Error, primary.file_id, offset)
        .with_message(diagnostic.error.to_string())
        .with_label(
            Label::new((primary.file_id, offset..offset + 1))
                .with_message("here")
                .with_color(colors.next()),
        );

    if let Some(secondary) = diagnostic.secondary {
        let soff = secondary.offset as usize;
        builder = builder.with_label(
            Label::new((secondary.file_id, soff..soff + 1))
                .with_message("related location")
                .with_color(colors.next()),
        );
    }

    let report = builder.finish();
    let mut buf = Vec::new();
    report
        .write(Cache::new(sources), &mut buf)
        .expect("writing a report to an in-memory buffer cannot fail");
    String::from_utf8_lossy(&buf).into_owned()
}

/// Writes the rendered report directly to `w` (the CLI's stderr sink).
pub fn write(diagnostic: &Diagnostic, sources: &SourceMap, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    w.write_all(render(diagnostic, sources).as_bytes())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use crate::source::{Location, SourceFile};

    #[test]
    fn renders_a_caret_at_the_primary_location() {
        let mut sources = SourceMap::new();
        let id = sources.add(SourceFile::new("t.scad", "cube(1.5\"hi\");"));
        let diag = Diagnostic::new(Error::Lex("Expected no number here.".into()), Some(Location::new(id, 8)));
        let rendered = render(&diag, &sources);
        assert!(rendered.contains("Expected no number here."));
    }

    #[test]
    fn falls_back_to_a_bare_message_without_a_location() {
        let sources = SourceMap::new();
        let diag = Diagnostic::new(Error::Cli("bad flag".into()), None);
        assert_eq!(render(&diag, &sources), "error: bad flag");
    }
}
