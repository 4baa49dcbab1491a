//! ASCII STL emitter (§6, §8 scenario 2).
//!
//! Each layer's triangulation is extruded into a slab spanning
//! `[z_at(i) - step/2, z_at(i) + step/2]`, which reassembles the original
//! (pre-halved) Z-extent given the half-step sampling offset of §4.3. Top
//! and bottom faces come straight from the triangulation; side walls are
//! built by walking each polygon ring's edges.

use std::io::{self, Write};

use crate::csg2::{Point2, PolygonSet, Tree, Triangulation};
use crate::lower::Range;

type V3 = (f64, f64, f64);

fn cross(a: V3, b: V3) -> V3 {
    (a.1 * b.2 - a.2 * b.1, a.2 * b.0 - a.0 * b.2, a.0 * b.1 - a.1 * b.0)
}

fn sub(a: V3, b: V3) -> V3 {
    (a.0 - b.0, a.1 - b.1, a.2 - b.2)
}

fn normalize(v: V3) -> V3 {
    let len = (v.0 * v.0 + v.1 * v.1 + v.2 * v.2).sqrt();
    if len < 1e-12 {
        (0.0, 0.0, 0.0)
    } else {
        (v.0 / len, v.1 / len, v.2 / len)
    }
}

fn write_facet(w: &mut dyn Write, a: V3, b: V3, c: V3) -> io::Result<()> {
    let n = normalize(cross(sub(b, a), sub(c, a)));
    writeln!(w, "facet normal {} {} {}", n.0, n.1, n.2)?;
    writeln!(w, "outer loop")?;
    for v in [a, b, c] {
        writeln!(w, "vertex {} {} {}", v.0, v.1, v.2)?;
    }
    writeln!(w, "endloop")?;
    writeln!(w, "endfacet")
}

fn write_slab(w: &mut dyn Write, polygons: &PolygonSet, tri: &Triangulation, z0: f64, z1: f64) -> io::Result<()> {
    let at = |p: Point2, z: f64| (p.x, p.y, z);

    for t in &tri.triangles {
        let [a, b, c] = *t;
        let (pa, pb, pc) = (tri.points[a as usize], tri.points[b as usize], tri.points[c as usize]);
        write_facet(w, at(pa, z0), at(pc, z0), at(pb, z0))?; // bottom, reversed winding
        write_facet(w, at(pa, z1), at(pb, z1), at(pc, z1))?; // top
    }

    for poly in &polygons.polygons {
        for ring in &poly.rings {
            let n = ring.points.len();
            if n < 2 {
                continue;
            }
            for i in 0..n {
                let (p0, _) = ring.points[i];
                let (p1, _) = ring.points[(i + 1) % n];
                write_facet(w, at(p0, z0), at(p1, z0), at(p1, z1))?;
                write_facet(w, at(p0, z0), at(p1, z1), at(p0, z1))?;
            }
        }
    }

    Ok(())
}

pub fn write(tree: &Tree, range: &Range, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "solid hob2r")?;
    if let Some(root) = &tree.root {
        for i in 0..range.count {
            let cell = root.layers().get(i);
            let Some(tri) = &cell.triangulation else { continue };
            if tri.triangles.is_empty() {
                continue;
            }
            let half = range.step / 2.0;
            let z = range.z_at(i);
            write_slab(w, &cell.polygons, tri, z - half, z + half)?;
        }
    }
    writeln!(w, "endsolid hob2r")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::csg3;
    use crate::source::{FileId, Location};
    use std::sync::Arc;

    fn cube_tree(size: f64) -> (Tree, Range) {
        let loc = Location::new(FileId(0), 0);
        let pts = [
            csg3::Point3::new(0.0, 0.0, 0.0),
            csg3::Point3::new(size, 0.0, 0.0),
            csg3::Point3::new(size, size, 0.0),
            csg3::Point3::new(0.0, size, 0.0),
            csg3::Point3::new(0.0, 0.0, size),
            csg3::Point3::new(size, 0.0, size),
            csg3::Point3::new(size, size, size),
            csg3::Point3::new(0.0, size, size),
        ];
        let node = Arc::new(csg3::Node::Polyhedron(csg3::Polyhedron {
            points: pts.to_vec(),
            faces: vec![
                vec![0, 3, 2, 1],
                vec![4, 5, 6, 7],
                vec![0, 1, 5, 4],
                vec![1, 2, 6, 5],
                vec![2, 3, 7, 6],
                vec![3, 0, 4, 7],
            ],
            gc: csg3::GraphicsContext::default(),
            loc,
        }));
        let tree = crate::csg2::Tree::new(Some(&node), 2);
        let range = Range { min: 2.5, step: 5.0, count: 2 };
        (tree, range)
    }

    #[test]
    fn empty_tree_emits_a_valid_empty_solid() {
        let tree = Tree { root: None, layer_count: 1 };
        let range = Range { min: 0.0, step: 0.2, count: 1 };
        let mut buf = Vec::new();
        write(&tree, &range, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "solid hob2r\nendsolid hob2r\n");
    }

    #[test]
    fn single_cube_emits_two_slabs_worth_of_facets() {
        let (tree, range) = cube_tree(10.0);
        let driver = crate::driver::LayerDriver::new(
            Box::new(crate::boolean::TrapezoidEngine),
            Box::new(crate::boolean::TrapezoidEngine),
        );
        driver.run(&tree, &range, FileId(0), &crate::driver::DriverOptions::default()).unwrap();

        let mut buf = Vec::new();
        write(&tree, &range, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("solid hob2r\n"));
        assert!(text.trim_end().ends_with("endsolid hob2r"));
        assert!(text.matches("facet normal").count() > 0);
    }
}
