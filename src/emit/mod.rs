//! Emitters dispatch (component G, §6).
//!
//! Each emitter reads the finished layer stack off the 2D tree's root
//! [`crate::csg2::LayerSlots`] (populated by [`crate::driver::LayerDriver`])
//! and the [`crate::lower::Range`] that indexed it. Selection is either
//! explicit (`--dump-stl`/`--dump-js`/`--dump-ps`) or inferred from the `-o`
//! file extension (§6).

mod js;
mod ps;
mod scad;
mod stl;

use std::io::Write;

use crate::csg2::Tree;
use crate::error::Error;
use crate::lower::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Stl,
    Js,
    Scad,
    Ps,
}

impl Format {
    /// Infers a format from an output path's extension (§6). `None` for an
    /// unrecognized extension, which the caller must turn into a `Cli` error.
    pub fn from_extension(path: &std::path::Path) -> Option<Format> {
        match path.extension().and_then(|e| e.to_str())?.to_ascii_lowercase().as_str() {
            "stl" => Some(Format::Stl),
            "js" => Some(Format::Js),
            "scad" | "csg" => Some(Format::Scad),
            "ps" => Some(Format::Ps),
            _ => None,
        }
    }
}

/// PostScript palette/scale knobs (§6's `--ps-scale` and color flags).
#[derive(Debug, Clone)]
pub struct PsOptions {
    pub scale: u8,
    pub palette: Vec<(f32, f32, f32)>,
}

impl Default for PsOptions {
    fn default() -> Self {
        PsOptions {
            scale: 0,
            palette: vec![(0.0, 0.0, 0.0), (1.0, 0.0, 0.0), (0.0, 0.6, 1.0)],
        }
    }
}

pub struct EmitOptions {
    pub ps: PsOptions,
    /// Whether the inter-layer diff pass (§4.4 pass 2) has been run and its
    /// cells should be consulted; only meaningful for [`Format::Js`].
    pub include_diff: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            ps: PsOptions::default(),
            include_diff: false,
        }
    }
}

pub fn emit(format: Format, tree: &Tree, range: &Range, opts: &EmitOptions, w: &mut dyn Write) -> Result<(), Error> {
    match format {
        Format::Stl => stl::write(tree, range, w),
        Format::Js => js::write(tree, range, opts, w),
        Format::Scad => scad::write(tree, range, w),
        Format::Ps => ps::write(tree, range, &opts.ps, w),
    }
    .map_err(|e| Error::Io(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;

    #[test]
    fn infers_format_from_extension() {
        assert_eq!(Format::from_extension(Path::new("a.stl")), Some(Format::Stl));
        assert_eq!(Format::from_extension(Path::new("a.JS")), Some(Format::Js));
        assert_eq!(Format::from_extension(Path::new("a.csg")), Some(Format::Scad));
        assert_eq!(Format::from_extension(Path::new("a.ps")), Some(Format::Ps));
        assert_eq!(Format::from_extension(Path::new("a.xyz")), None);
    }
}
