//! The slicer (component E, §4.3): cross-sections a single typed CSG3 leaf
//! at a fixed Z-plane into 2D polygon rings.
//!
//! Z-plane sampling is half-open, `[z, z+step)`: a primitive occupying
//! `[a, b]` along Z is considered present at plane `z` when `a <= z < b`
//! (see the resolved Open Question in `SPEC_FULL.md` §9). The layer driver
//! (§4.4) calls this once per leaf per layer before handing the resulting
//! rings to the boolean engine.

use crate::csg2::Point2;
use crate::csg3::{Cylinder, Embed2d, Node, Point3, Polyhedron, Sphere};

const CIRCLE_SEGMENTS: usize = 24;
const EPS: f64 = 1e-9;

/// One leaf's cross-section at `z`: zero or more simple, closed rings.
pub fn slice_leaf(node: &Node, z: f64) -> Vec<Vec<Point2>> {
    match node {
        Node::Sphere(s) => slice_sphere(s, z),
        Node::Cylinder(c) => slice_cylinder(c, z),
        Node::Polyhedron(p) => slice_polyhedron(p, z),
        Node::Embed2d(e) => slice_embed2d(e, z),
        Node::Add(..) | Node::Subtract(..) | Node::Intersect(..) => Vec::new(),
    }
}

fn circle_ring(cx: f64, cy: f64, r: f64) -> Vec<Point2> {
    (0..CIRCLE_SEGMENTS)
        .map(|i| {
            let theta = 2.0 * std::f64::consts::PI * (i as f64) / (CIRCLE_SEGMENTS as f64);
            Point2::new(cx + r * theta.cos(), cy + r * theta.sin())
        })
        .collect()
}

fn slice_sphere(s: &Sphere, z: f64) -> Vec<Vec<Point2>> {
    let dz = z - s.center.z;
    if dz.abs() >= s.radius {
        return Vec::new();
    }
    let r = (s.radius * s.radius - dz * dz).sqrt();
    if r <= EPS {
        return Vec::new();
    }
    vec![circle_ring(s.center.x, s.center.y, r)]
}

fn slice_cylinder(c: &Cylinder, z: f64) -> Vec<Vec<Point2>> {
    let (z0, z1) = (c.bottom.z, c.top.z);
    let (z0, z1, r1, r2, p0, p1) = if z0 <= z1 {
        (z0, z1, c.r1, c.r2, c.bottom, c.top)
    } else {
        (z1, z0, c.r2, c.r1, c.top, c.bottom)
    };
    if z < z0 || z >= z1 {
        return Vec::new();
    }
    let t = if (z1 - z0).abs() < EPS { 0.0 } else { (z - z0) / (z1 - z0) };
    let r = r1 + (r2 - r1) * t;
    if r <= EPS {
        return Vec::new();
    }
    let cx = p0.x + (p1.x - p0.x) * t;
    let cy = p0.y + (p1.y - p0.y) * t;
    vec![circle_ring(cx, cy, r)]
}

fn slice_embed2d(e: &Embed2d, z: f64) -> Vec<Vec<Point2>> {
    let hit = if e.z_max > e.z_min {
        z >= e.z_min && z < e.z_max
    } else {
        (z - e.z_min).abs() < EPS
    };
    if !hit {
        return Vec::new();
    }
    e.rings
        .iter()
        .map(|ring| ring.iter().map(|&(x, y)| Point2::new(x, y)).collect())
        .collect()
}

/// Slices a (convex-faced) polyhedron by stitching the per-face
/// plane/edge intersections into closed rings. Each face is assumed
/// convex and planar, which holds for the primitives this pipeline lowers
/// (boxes); a face crosses the plane in at most one segment.
fn slice_polyhedron(p: &Polyhedron, z: f64) -> Vec<Vec<Point2>> {
    let mut segments: Vec<(Point2, Point2)> = Vec::new();

    for face in &p.faces {
        let mut crossings = Vec::new();
        let n = face.len();
        for i in 0..n {
            let a = p.points[face[i]];
            let b = p.points[face[(i + 1) % n]];
            if let Some(pt) = edge_plane_intersection(a, b, z) {
                crossings.push(pt);
            }
        }
        if crossings.len() == 2 {
            segments.push((crossings[0], crossings[1]));
        }
    }

    stitch_segments(segments)
}

fn edge_plane_intersection(a: Point3, b: Point3, z: f64) -> Option<Point2> {
    let (lo, hi) = (a.z.min(b.z), a.z.max(b.z));
    if z < lo || z >= hi {
        return None;
    }
    if (b.z - a.z).abs() < EPS {
        return None;
    }
    let t = (z - a.z) / (b.z - a.z);
    Some(Point2::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t))
}

fn key(p: Point2) -> (i64, i64) {
    ((p.x / EPS.sqrt()).round() as i64, (p.y / EPS.sqrt()).round() as i64)
}

/// Joins an unordered bag of line segments into closed rings by matching
/// coincident endpoints.
fn stitch_segments(segments: Vec<(Point2, Point2)>) -> Vec<Vec<Point2>> {
    use std::collections::HashMap;

    let mut adjacency: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, (a, b)) in segments.iter().enumerate() {
        adjacency.entry(key(*a)).or_default().push(i);
        adjacency.entry(key(*b)).or_default().push(i);
    }

    let mut used = vec![false; segments.len()];
    let mut rings = Vec::new();

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        let mut ring = vec![segments[start].0, segments[start].1];
        used[start] = true;
        let mut cur_key = key(segments[start].1);

        loop {
            let candidates = adjacency.get(&cur_key).cloned().unwrap_or_default();
            let next = candidates.into_iter().find(|&idx| !used[idx]);
            match next {
                Some(idx) => {
                    used[idx] = true;
                    let (a, b) = segments[idx];
                    let next_point = if key(a) == cur_key { b } else { a };
                    ring.push(next_point);
                    cur_key = key(next_point);
                }
                None => break,
            }
        }

        if ring.len() >= 3 {
            ring.pop(); // last point duplicates the first once the ring closes
            rings.push(ring);
        }
    }

    rings
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::csg3::{GraphicsContext, Point3 as P3};
    use crate::source::{FileId, Location};

    fn cube_at_origin(size: f64) -> Polyhedron {
        let loc = Location::new(FileId(0), 0);
        let pts = [
            P3::new(0.0, 0.0, 0.0),
            P3::new(size, 0.0, 0.0),
            P3::new(size, size, 0.0),
            P3::new(0.0, size, 0.0),
            P3::new(0.0, 0.0, size),
            P3::new(size, 0.0, size),
            P3::new(size, size, size),
            P3::new(0.0, size, size),
        ];
        Polyhedron {
            points: pts.to_vec(),
            faces: vec![
                vec![0, 3, 2, 1],
                vec![4, 5, 6, 7],
                vec![0, 1, 5, 4],
                vec![1, 2, 6, 5],
                vec![2, 3, 7, 6],
                vec![3, 0, 4, 7],
            ],
            gc: GraphicsContext::default(),
            loc,
        }
    }

    #[test]
    fn cube_mid_slice_is_a_square() {
        let cube = cube_at_origin(10.0);
        let rings = slice_polyhedron(&cube, 5.0);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].len(), 4);
    }

    #[test]
    fn cube_slice_outside_range_is_empty() {
        let cube = cube_at_origin(10.0);
        assert!(slice_polyhedron(&cube, 10.0).is_empty());
        assert!(slice_polyhedron(&cube, -1.0).is_empty());
    }

    #[test]
    fn sphere_equator_has_full_radius() {
        let loc = Location::new(FileId(0), 0);
        let s = Sphere {
            center: P3::new(0.0, 0.0, 0.0),
            radius: 5.0,
            gc: GraphicsContext::default(),
            loc,
        };
        let rings = slice_sphere(&s, 0.0);
        assert_eq!(rings.len(), 1);
        let p = rings[0][0];
        assert!((p.x * p.x + p.y * p.y).sqrt() - 5.0 < 1e-6);
    }
}
