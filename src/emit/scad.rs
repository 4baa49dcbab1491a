//! SCAD echo emitter (§6): re-serializes the finished 2D tree as one
//! `polygon()` call per layer, each preceded by a comment giving its Z
//! plane, so the output is both human-readable and a valid surface-syntax
//! input in its own right.

use std::io::{self, Write};

use crate::csg2::Tree;
use crate::lower::Range;

pub fn write(tree: &Tree, range: &Range, w: &mut dyn Write) -> io::Result<()> {
    let Some(root) = &tree.root else {
        return writeln!(w, "// empty model");
    };
    for i in 0..range.count {
        let cell = root.layers().get(i);
        writeln!(w, "// z = {}", range.z_at(i))?;
        for poly in &cell.polygons.polygons {
            for ring in &poly.rings {
                write!(w, "polygon(points=[")?;
                for (idx, (p, _)) in ring.points.iter().enumerate() {
                    if idx > 0 {
                        write!(w, ", ")?;
                    }
                    write!(w, "[{}, {}]", p.x, p.y)?;
                }
                writeln!(w, "]);")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_tree_echoes_a_comment_only() {
        let tree = Tree { root: None, layer_count: 1 };
        let range = Range { min: 0.0, step: 0.2, count: 1 };
        let mut buf = Vec::new();
        write(&tree, &range, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "// empty model\n");
    }
}
