//! JS viewer bundle emitter (§6).
//!
//! Emits a JS source assigning one top-level array, `hob2rLayers`: one entry
//! per layer holding that layer's polygon rings and (if triangulated) its
//! flat triangle index array. When the inter-layer diff pass has run (§4.4
//! pass 2), the 2D tree's layer cells already hold the XOR'd cross-section
//! in place of the plain CSG reduction — there is one array either way, not
//! a second "diff" array, since both passes write through the same
//! per-layer slot.

use std::io::{self, Write};

use crate::csg2::{PolygonSet, Tree, Triangulation};
use crate::lower::Range;

fn write_polygon_set(w: &mut dyn Write, polygons: &PolygonSet) -> io::Result<()> {
    write!(w, "[")?;
    for (pi, poly) in polygons.polygons.iter().enumerate() {
        if pi > 0 {
            write!(w, ",")?;
        }
        write!(w, "[")?;
        for (ri, ring) in poly.rings.iter().enumerate() {
            if ri > 0 {
                write!(w, ",")?;
            }
            write!(w, "[")?;
            for (i, (p, _)) in ring.points.iter().enumerate() {
                if i > 0 {
                    write!(w, ",")?;
                }
                write!(w, "[{},{}]", p.x, p.y)?;
            }
            write!(w, "]")?;
        }
        write!(w, "]")?;
    }
    write!(w, "]")
}

fn write_triangulation(w: &mut dyn Write, tri: Option<&Triangulation>) -> io::Result<()> {
    match tri {
        None => write!(w, "null"),
        Some(t) => {
            write!(w, "{{\"points\":[")?;
            for (i, p) in t.points.iter().enumerate() {
                if i > 0 {
                    write!(w, ",")?;
                }
                write!(w, "[{},{}]", p.x, p.y)?;
            }
            write!(w, "],\"triangles\":[")?;
            for (i, t) in t.triangles.iter().enumerate() {
                if i > 0 {
                    write!(w, ",")?;
                }
                write!(w, "[{},{},{}]", t[0], t[1], t[2])?;
            }
            write!(w, "]}}")
        }
    }
}

pub fn write(tree: &Tree, range: &Range, _opts: &crate::emit::EmitOptions, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "var hob2rLayers = [")?;
    if let Some(root) = &tree.root {
        for i in 0..range.count {
            let cell = root.layers().get(i);
            write!(w, "  {{\"z\":{},\"polygons\":", range.z_at(i))?;
            write_polygon_set(w, &cell.polygons)?;
            write!(w, ",\"triangulation\":")?;
            write_triangulation(w, cell.triangulation.as_ref())?;
            writeln!(w, "}},")?;
        }
    }
    writeln!(w, "];")
}
