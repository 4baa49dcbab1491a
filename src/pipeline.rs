//! End-to-end pipeline orchestration (§1, §4): wires the scanner, parser,
//! lowering, slicer, layer driver, and emitters together for one input
//! file, honoring the dump-stage early-exits of §6.

use std::io::Write;

use crate::boolean::TrapezoidEngine;
use crate::cli::Cli;
use crate::csg2;
use crate::driver::{DriverOptions, LayerDriver};
use crate::emit::{self, EmitOptions, Format, PsOptions};
use crate::error::{Diagnostic, Error};
use crate::lower;
use crate::parser::{Parser, SurfaceForm};
use crate::source::{SourceFile, SourceMap};

/// Runs the full pipeline for `cli`, writing to `out`. Returns the source
/// map alongside any error so the caller can render a located diagnostic.
pub fn run(cli: &Cli, out: &mut dyn Write) -> Result<(), (SourceMap, Diagnostic)> {
    let mut sources = SourceMap::new();

    let text = match std::fs::read_to_string(&cli.input) {
        Ok(t) => t,
        Err(e) => {
            let diag = Diagnostic::new(Error::Io(format!("{}: {e}", cli.input.display())), None);
            return Err((sources, diag));
        }
    };

    let name = cli.input.display().to_string();
    // The parser needs a mutable borrow of the working buffer, so the
    // registry keeps a second, untouched copy for diagnostics (§3: "the
    // scanner exclusively owns the working buffer during parsing").
    let file_id = sources.add(SourceFile::new(name.clone(), &text));
    let mut file = SourceFile::new(name, &text);

    tracing::info!(file = %cli.input.display(), "scanning and parsing");
    let parser = Parser::new(&mut file.working, file_id);
    let (forms, parse_err) = parser.parse();
    if let Some(diag) = parse_err {
        return Err((sources, diag));
    }

    if cli.dump_syn {
        let _ = writeln!(out, "{}", dump_surface_forms(&forms));
        return Ok(());
    }
    if cli.dump_scad {
        let _ = writeln!(out, "{}", format_surface_as_scad(&forms));
        return Ok(());
    }

    tracing::info!("lowering to 3D CSG");
    let tree3 = lower::lower(&forms).map_err(|d| (sources, d))?;

    if cli.dump_csg3 {
        let _ = writeln!(out, "{:#?}", tree3.root);
        return Ok(());
    }

    let bbox = tree3.bounding_box(false);
    let range = lower::select_z_range(&bbox, cli.z_min, cli.z_max, cli.z_step);
    tracing::info!(z_min = range.min, z_step = range.step, layer_cnt = range.count, z_max = bbox.max.z, "Z range resolved");

    let tree2 = csg2::Tree::new(tree3.root.as_ref(), range.count);

    if cli.dump_csg2 {
        let _ = writeln!(out, "(csg2 tree with {} layers)", tree2.layer_count);
        return Ok(());
    }

    let format = select_format(cli).map_err(|d| (sources, d))?;
    let run_diff_pass = format == Format::Js && !cli.no_diff;

    let driver = LayerDriver::new(Box::new(TrapezoidEngine), Box::new(TrapezoidEngine));
    let opts = DriverOptions {
        workers: cli.resolved_workers(),
        no_csg: cli.no_csg,
        no_tri: cli.no_tri,
        no_diff: cli.no_diff,
        run_diff_pass,
    };
    tracing::debug!(workers = opts.workers, "running layer driver");
    driver.run(&tree2, &range, file_id, &opts).map_err(|d| (sources, d))?;

    let emit_opts = EmitOptions {
        ps: ps_options_from_cli(cli),
        include_diff: run_diff_pass,
    };
    emit::emit(format, &tree2, &range, &emit_opts, out).map_err(|e| (sources, Diagnostic::new(e, None)))?;

    Ok(())
}

fn select_format(cli: &Cli) -> Result<Format, Diagnostic> {
    if cli.dump_stl {
        return Ok(Format::Stl);
    }
    if cli.dump_js {
        return Ok(Format::Js);
    }
    if cli.dump_ps {
        return Ok(Format::Ps);
    }
    match &cli.output {
        Some(path) => Format::from_extension(path)
            .ok_or_else(|| Diagnostic::new(Error::Cli(format!("Unrecognized output extension: {}", path.display())), None)),
        None => Ok(Format::Stl),
    }
}

fn ps_options_from_cli(cli: &Cli) -> PsOptions {
    let mut opts = PsOptions { scale: cli.ps_scale, palette: Vec::new() };
    for hex in &cli.ps_colors {
        if let Some(rgb) = parse_hex_rgb(hex) {
            opts.palette.push(rgb);
        }
    }
    if opts.palette.is_empty() {
        opts.palette = PsOptions::default().palette;
    }
    opts
}

fn parse_hex_rgb(s: &str) -> Option<(f32, f32, f32)> {
    let s = s.trim_start_matches('#');
    if s.len() != 6 {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).ok();
    Some((byte(0)? as f32 / 255.0, byte(2)? as f32 / 255.0, byte(4)? as f32 / 255.0))
}

/// A structural, indentation-based dump of the surface tree (`--dump-syn`).
fn dump_surface_forms(forms: &[SurfaceForm]) -> String {
    let mut out = String::new();
    for f in forms {
        dump_form(f, 0, &mut out);
    }
    out
}

fn dump_form(f: &SurfaceForm, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    out.push_str(&format!("{indent}{} {:?}\n", f.functor.as_str(), f.modifiers));
    for arg in &f.args {
        out.push_str(&format!("{indent}  arg {:?} = {:?}\n", arg.key, arg.value));
    }
    for child in &f.body {
        dump_form(child, depth + 1, out);
    }
}

/// Re-serializes the surface tree as SCAD text (`--dump-scad`), used to
/// check the parser round-trip property (§8).
fn format_surface_as_scad(forms: &[SurfaceForm]) -> String {
    let mut out = String::new();
    for f in forms {
        format_form(f, &mut out);
        out.push('\n');
    }
    out
}

fn format_form(f: &SurfaceForm, out: &mut String) {
    use crate::csg3::Modifiers;
    for (bit, ch) in [
        (Modifiers::SHOW_ONLY, '!'),
        (Modifiers::DISABLE, '*'),
        (Modifiers::BACKGROUND, '%'),
        (Modifiers::HIGHLIGHT, '#'),
    ] {
        if f.modifiers.contains(bit) {
            out.push(ch);
        }
    }
    if f.is_group() {
        out.push('{');
        for child in &f.body {
            format_form(child, out);
        }
        out.push('}');
        return;
    }
    out.push_str(f.functor.as_str());
    out.push('(');
    for (i, arg) in f.args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if let Some(key) = &arg.key {
            out.push_str(key.as_str());
            out.push('=');
        }
        format_value(&arg.value, out);
    }
    out.push(')');
    match f.body.len() {
        0 => out.push(';'),
        1 if !f.body[0].is_group() => format_form(&f.body[0], out),
        _ => {
            out.push('{');
            for child in &f.body {
                format_form(child, out);
            }
            out.push('}');
        }
    }
}

fn format_value(v: &crate::parser::Value, out: &mut String) {
    use crate::parser::Value;
    match v {
        Value::Int(n, _) => out.push_str(&n.to_string()),
        Value::Float(n, _) => out.push_str(&n.to_string()),
        Value::Str(s, _) => out.push_str(&format!("{:?}", s.as_str())),
        Value::Ident(s, _) => out.push_str(s.as_str()),
        Value::Range { start, step, end, .. } => {
            out.push('[');
            format_value(start, out);
            out.push(':');
            if let Some(step) = step {
                format_value(step, out);
                out.push(':');
            }
            format_value(end, out);
            out.push(']');
        }
        Value::Array(items, _) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                format_value(item, out);
            }
            out.push(']');
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::{FileId, SourceFile as SF};

    fn parse(src: &str) -> Vec<SurfaceForm> {
        let mut file = SF::new("t.scad", src);
        let parser = Parser::new(&mut file.working, FileId(0));
        let (forms, err) = parser.parse();
        assert!(err.is_none());
        forms
    }

    #[test]
    fn scad_round_trip_reparses_to_the_same_shape() {
        let forms = parse("difference(){ cube(10); translate([2,2,-1]) cube([6,6,12]); }");
        let text = format_surface_as_scad(&forms);
        let reparsed = parse(&text);
        assert_eq!(forms.len(), reparsed.len());
        assert_eq!(forms[0].functor.as_str(), reparsed[0].functor.as_str());
        assert_eq!(forms[0].body.len(), reparsed[0].body.len());
    }

    #[test]
    fn select_format_errors_on_unknown_extension() {
        let cli = Cli {
            input: "x.scad".into(),
            z_min: None,
            z_max: None,
            z_step: 0.2,
            dump_syn: false,
            dump_scad: false,
            dump_csg3: false,
            dump_csg2: false,
            dump_stl: false,
            dump_js: false,
            dump_ps: false,
            no_tri: false,
            no_csg: false,
            no_diff: false,
            output: Some("out.xyz".into()),
            verbose: 0,
            quiet: 0,
            ps_scale: 0,
            ps_colors: Vec::new(),
            workers: None,
        };
        assert!(select_format(&cli).is_err());
    }
}
