//! Layered PostScript emitter (§6): one page per layer, filled polygon
//! outlines cycling through a small palette, with optional bounding-box
//! fitting per `--ps-scale` (`0` no-op, `1` per-page bbox, `2` a single
//! bbox shared by every page so scale is consistent across the stack).

use std::io::{self, Write};

use crate::csg2::{PolygonSet, Tree};
use crate::emit::PsOptions;
use crate::lower::Range;

const PAGE_PT: f64 = 500.0;

struct Bbox {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Bbox {
    fn empty() -> Self {
        Bbox {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    fn extend(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn is_empty(&self) -> bool {
        self.min_x > self.max_x
    }

    /// `(scale, tx, ty)` mapping this bbox into a `PAGE_PT`-square page.
    fn fit(&self) -> (f64, f64, f64) {
        if self.is_empty() {
            return (1.0, 0.0, 0.0);
        }
        let w = (self.max_x - self.min_x).max(1e-9);
        let h = (self.max_y - self.min_y).max(1e-9);
        let scale = (PAGE_PT / w).min(PAGE_PT / h);
        (scale, -self.min_x, -self.min_y)
    }
}

fn bbox_of_layer(set: &PolygonSet) -> Bbox {
    let mut bb = Bbox::empty();
    for poly in &set.polygons {
        for ring in &poly.rings {
            for (p, _) in &ring.points {
                bb.extend(p.x, p.y);
            }
        }
    }
    bb
}

fn bbox_of_all(tree: &Tree, range: &Range) -> Bbox {
    let mut bb = Bbox::empty();
    if let Some(root) = &tree.root {
        for i in 0..range.count {
            let cell = root.layers().get(i);
            let layer_bb = bbox_of_layer(&cell.polygons);
            if !layer_bb.is_empty() {
                bb.extend(layer_bb.min_x, layer_bb.min_y);
                bb.extend(layer_bb.max_x, layer_bb.max_y);
            }
        }
    }
    bb
}

pub fn write(tree: &Tree, range: &Range, opts: &PsOptions, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "%!PS-Adobe-3.0")?;
    writeln!(w, "%%Pages: {}", range.count)?;

    let global_fit = if opts.scale == 2 { Some(bbox_of_all(tree, range).fit()) } else { None };

    if let Some(root) = &tree.root {
        for i in 0..range.count {
            writeln!(w, "%%Page: {} {}", i + 1, i + 1)?;
            let cell = root.layers().get(i);

            let (scale, tx, ty) = match opts.scale {
                0 => (1.0, 0.0, 0.0),
                1 => bbox_of_layer(&cell.polygons).fit(),
                _ => global_fit.unwrap_or((1.0, 0.0, 0.0)),
            };
            writeln!(w, "gsave {scale} {scale} scale {tx} {ty} translate")?;

            for (pi, poly) in cell.polygons.polygons.iter().enumerate() {
                let color = opts.palette.get(pi % opts.palette.len().max(1)).copied().unwrap_or((0.0, 0.0, 0.0));
                writeln!(w, "{} {} {} setrgbcolor", color.0, color.1, color.2)?;
                for ring in &poly.rings {
                    let Some((first, _)) = ring.points.first() else { continue };
                    writeln!(w, "newpath {} {} moveto", first.x, first.y)?;
                    for (p, _) in ring.points.iter().skip(1) {
                        writeln!(w, "{} {} lineto", p.x, p.y)?;
                    }
                    writeln!(w, "closepath fill")?;
                }
            }
            writeln!(w, "grestore showpage")?;
        }
    }

    writeln!(w, "%%EOF")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_tree_still_emits_a_valid_header_and_trailer() {
        let tree = Tree { root: None, layer_count: 1 };
        let range = Range { min: 0.0, step: 0.2, count: 1 };
        let mut buf = Vec::new();
        write(&tree, &range, &PsOptions::default(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("%!PS-Adobe-3.0"));
        assert!(text.trim_end().ends_with("%%EOF"));
    }
}
