//! Command-line surface (§6, §10.3).
//!
//! A `clap`-derived [`Cli`] covers the full flag surface: Z-range overrides,
//! dump-stage selection, explicit emitter selection, the boolean/triangulate/
//! diff toggles, output path, verbosity, PostScript scale/palette, and a
//! worker-count override for the layer driver. Defaults mirror the original
//! option block's initialization (`z_step = 0.2`, `verbose = 1`).

use std::path::PathBuf;

use clap::Parser as ClapParser;

#[derive(Debug, ClapParser)]
#[command(name = "hob2r", version, about = "A layered 3D-to-2D solid modeling pipeline.")]
pub struct Cli {
    /// Input file in the SCAD-like surface syntax.
    pub input: PathBuf,

    #[arg(long)]
    pub z_min: Option<f64>,

    #[arg(long)]
    pub z_max: Option<f64>,

    #[arg(long, default_value_t = 0.2)]
    pub z_step: f64,

    /// Stop after parsing and echo the surface syntax tree.
    #[arg(long)]
    pub dump_syn: bool,

    /// Stop after parsing and echo the surface tree as SCAD text.
    #[arg(long)]
    pub dump_scad: bool,

    /// Stop after lowering and echo the typed 3D CSG tree.
    #[arg(long)]
    pub dump_csg3: bool,

    /// Stop after slicing and echo the typed 2D CSG tree.
    #[arg(long)]
    pub dump_csg2: bool,

    /// Force STL output regardless of `-o`'s extension.
    #[arg(long)]
    pub dump_stl: bool,

    /// Force JS viewer bundle output regardless of `-o`'s extension.
    #[arg(long)]
    pub dump_js: bool,

    /// Force PostScript output regardless of `-o`'s extension.
    #[arg(long)]
    pub dump_ps: bool,

    #[arg(long)]
    pub no_tri: bool,

    #[arg(long)]
    pub no_csg: bool,

    #[arg(long)]
    pub no_diff: bool,

    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Repeatable; `-v -v` and above also mirrors logs to a rolling
    /// `hob2r.log` file alongside stderr.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long, action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// `0` = no-op, `1` = fit to each page's own bounding box, `2` = fit to
    /// one bounding box shared by the whole layer stack.
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub ps_scale: u8,

    /// Repeatable `#RRGGBB` palette entries for the PostScript emitter.
    #[arg(long = "ps-color", value_name = "RRGGBB")]
    pub ps_colors: Vec<String>,

    /// Worker count for the layer driver; defaults to the available
    /// parallelism at startup.
    #[arg(long)]
    pub workers: Option<usize>,
}

impl Cli {
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }

    /// Verbosity as a `tracing` filter directive string (§10.1): `-v` raises
    /// past the `info` default, `-q` lowers it, matching the source's
    /// `verbose = 1` default (one step above silent).
    pub fn log_filter(&self) -> &'static str {
        let level = 1 + self.verbose as i16 - self.quiet as i16;
        match level {
            i16::MIN..=0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        }
    }
}
