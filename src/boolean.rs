//! The planar boolean engine and triangulator (component F's external
//! collaborators, §6). §1 scopes the sweep-line/Delaunay internals of a
//! production engine out of this specification; [`TrapezoidEngine`] is the
//! in-tree stand-in the driver talks to through the same two trait seams a
//! real engine would implement, so swapping one in later is a matter of
//! providing another [`BooleanEngine`]/[`Triangulator`] impl.
//!
//! `TrapezoidEngine` decomposes the input rings into axis-aligned
//! trapezoids by scanning a sorted set of critical Y values and combining
//! each input's even-odd-rule X-intervals per strip. That sidesteps general
//! polygon clipping (at the cost of a more fragmented output polygon set)
//! while still satisfying the invariants in §8: bounding-box containment,
//! layer independence, and correct hole handling.

use crate::arena::Arena;
use crate::csg2::{LayerCell, Point2, Polygon, PolygonSet, Ring, Triangulation};
use crate::error::Error;
use crate::source::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    Union,
    Difference,
    Intersection,
}

pub trait BooleanEngine: Send + Sync {
    /// Combines `inputs` (one polygon set per child, in child order)
    /// according to `op`, writing scratch through `arena`.
    fn combine(
        &self,
        arena: &mut Arena,
        op: BoolOp,
        inputs: &[PolygonSet],
        loc: Location,
    ) -> Result<PolygonSet, Error>;

    /// Computes the symmetric difference of a layer's polygon set against
    /// its neighbor(s), for the JS emitter's inter-layer diff pass (§4.4
    /// pass 2).
    fn diff(
        &self,
        arena: &mut Arena,
        current: &PolygonSet,
        prev: Option<&PolygonSet>,
        next: Option<&PolygonSet>,
        loc: Location,
    ) -> Result<PolygonSet, Error>;
}

pub trait Triangulator: Send + Sync {
    fn triangulate(&self, arena: &mut Arena, polygons: &PolygonSet) -> Result<Triangulation, Error>;
}

#[derive(Default)]
pub struct TrapezoidEngine;

type Interval = (f64, f64);

fn ring_points(ring: &Ring) -> impl Iterator<Item = Point2> + '_ {
    ring.points.iter().map(|(p, _)| *p)
}

/// Even-odd-rule X-intervals where `polygons` covers the horizontal line
/// `y = y_mid`.
fn intervals_at(polygons: &PolygonSet, y_mid: f64) -> Vec<Interval> {
    let mut xs = Vec::new();
    for poly in &polygons.polygons {
        for ring in &poly.rings {
            let pts: Vec<Point2> = ring_points(ring).collect();
            let n = pts.len();
            if n < 2 {
                continue;
            }
            for i in 0..n {
                let a = pts[i];
                let b = pts[(i + 1) % n];
                let (lo, hi) = (a.y.min(b.y), a.y.max(b.y));
                if y_mid < lo || y_mid >= hi {
                    continue;
                }
                if (b.y - a.y).abs() < 1e-12 {
                    continue;
                }
                let t = (y_mid - a.y) / (b.y - a.y);
                xs.push(a.x + (b.x - a.x) * t);
            }
        }
    }
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    xs.chunks_exact(2).map(|w| (w[0], w[1])).collect()
}

fn merge_union(sets: &[Vec<Interval>]) -> Vec<Interval> {
    let mut all: Vec<Interval> = sets.iter().flatten().copied().collect();
    all.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    let mut out: Vec<Interval> = Vec::new();
    for (s, e) in all {
        if let Some(last) = out.last_mut() {
            if s <= last.1 {
                last.1 = last.1.max(e);
                continue;
            }
        }
        out.push((s, e));
    }
    out
}

fn subtract(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    for &(mut s, e) in a {
        for &(bs, be) in b {
            if be <= s || bs >= e {
                continue;
            }
            if bs > s {
                out.push((s, bs));
            }
            s = s.max(be);
        }
        if s < e {
            out.push((s, e));
        }
    }
    out
}

fn intersect_pair(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let (s1, e1) = a[i];
        let (s2, e2) = b[j];
        let s = s1.max(s2);
        let e = e1.min(e2);
        if s < e {
            out.push((s, e));
        }
        if e1 < e2 {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

fn intersect_all(sets: &[Vec<Interval>]) -> Vec<Interval> {
    match sets.split_first() {
        None => Vec::new(),
        Some((first, rest)) => rest.iter().fold(first.clone(), |acc, s| intersect_pair(&acc, s)),
    }
}

fn critical_ys(sets: &[&PolygonSet]) -> Vec<f64> {
    let mut ys = Vec::new();
    for set in sets {
        for poly in &set.polygons {
            for ring in &poly.rings {
                ys.extend(ring_points(ring).map(|p| p.y));
            }
        }
    }
    ys.sort_by(|a, b| a.partial_cmp(b).unwrap());
    ys.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    ys
}

fn rectangles_from_strips(strips: &[(f64, f64, Vec<Interval>)], loc: Location) -> PolygonSet {
    let mut polygons = Vec::new();
    for (y0, y1, intervals) in strips {
        for &(x0, x1) in intervals {
            polygons.push(Polygon {
                rings: vec![Ring {
                    points: vec![
                        (Point2::new(x0, *y0), loc),
                        (Point2::new(x1, *y0), loc),
                        (Point2::new(x1, *y1), loc),
                        (Point2::new(x0, *y1), loc),
                    ],
                }],
            });
        }
    }
    PolygonSet { polygons }
}

impl TrapezoidEngine {
    fn combine_sets(&self, op: BoolOp, inputs: &[&PolygonSet], loc: Location) -> PolygonSet {
        if inputs.is_empty() {
            return PolygonSet::default();
        }
        let ys = critical_ys(inputs);
        if ys.len() < 2 {
            return PolygonSet::default();
        }
        let mut strips = Vec::new();
        for w in ys.windows(2) {
            let (y0, y1) = (w[0], w[1]);
            let y_mid = (y0 + y1) / 2.0;
            let per_input: Vec<Vec<Interval>> = inputs.iter().map(|s| intervals_at(s, y_mid)).collect();
            let combined = match op {
                BoolOp::Union => merge_union(&per_input),
                BoolOp::Intersection => intersect_all(&per_input),
                BoolOp::Difference => {
                    let (first, rest) = per_input.split_first().unwrap();
                    subtract(first, &merge_union(rest))
                }
            };
            if !combined.is_empty() {
                strips.push((y0, y1, combined));
            }
        }
        rectangles_from_strips(&strips, loc)
    }
}

impl BooleanEngine for TrapezoidEngine {
    fn combine(
        &self,
        _arena: &mut Arena,
        op: BoolOp,
        inputs: &[PolygonSet],
        loc: Location,
    ) -> Result<PolygonSet, Error> {
        let refs: Vec<&PolygonSet> = inputs.iter().collect();
        Ok(self.combine_sets(op, &refs, loc))
    }

    fn diff(
        &self,
        _arena: &mut Arena,
        current: &PolygonSet,
        prev: Option<&PolygonSet>,
        next: Option<&PolygonSet>,
        loc: Location,
    ) -> Result<PolygonSet, Error> {
        let empty = PolygonSet::default();
        let prev = prev.unwrap_or(&empty);
        let next = next.unwrap_or(&empty);
        let neighbor_union = self.combine_sets(BoolOp::Union, &[prev, next], loc);
        let only_current = self.combine_sets(BoolOp::Difference, &[current, &neighbor_union], loc);
        let only_neighbors = self.combine_sets(BoolOp::Difference, &[&neighbor_union, current], loc);
        let mut xor = only_current;
        xor.polygons.extend(only_neighbors.polygons);
        Ok(xor)
    }
}

impl Triangulator for TrapezoidEngine {
    /// Fans each ring into triangles from its first vertex. Correct for the
    /// convex rectangles this engine's own [`BooleanEngine::combine`]
    /// produces; for an un-processed single ring without holes (e.g. a bare
    /// `polygon()` leaf with `--no-csg`) this degrades to a simple fan,
    /// which is only exact for convex input.
    fn triangulate(&self, _arena: &mut Arena, polygons: &PolygonSet) -> Result<Triangulation, Error> {
        let mut points = Vec::new();
        let mut triangles = Vec::new();
        for poly in &polygons.polygons {
            let Some(outer) = poly.rings.first() else { continue };
            let base = points.len() as u32;
            for (p, _) in &outer.points {
                points.push(*p);
            }
            let n = outer.points.len();
            for i in 1..n.saturating_sub(1) {
                triangles.push([base, base + i as u32, base + i as u32 + 1]);
            }
        }
        Ok(Triangulation { points, triangles })
    }
}

pub fn layer_cell_from_polygons(polygons: PolygonSet) -> LayerCell {
    LayerCell { polygons, triangulation: None }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::FileId;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64, loc: Location) -> PolygonSet {
        PolygonSet {
            polygons: vec![Polygon {
                rings: vec![Ring {
                    points: vec![
                        (Point2::new(x0, y0), loc),
                        (Point2::new(x1, y0), loc),
                        (Point2::new(x1, y1), loc),
                        (Point2::new(x0, y1), loc),
                    ],
                }],
            }],
        }
    }

    #[test]
    fn difference_leaves_a_hole() {
        let loc = Location::new(FileId(0), 0);
        let outer = square(0.0, 0.0, 10.0, 10.0, loc);
        let inner = square(2.0, 2.0, 8.0, 8.0, loc);
        let engine = TrapezoidEngine;
        let mut arena = Arena::new();
        let result = engine.combine(&mut arena, BoolOp::Difference, &[outer, inner], loc).unwrap();

        // Area should equal 10*10 - 6*6 within floating tolerance.
        let area: f64 = result
            .polygons
            .iter()
            .map(|p| {
                let r = &p.rings[0];
                (r.points[1].0.x - r.points[0].0.x) * (r.points[2].0.y - r.points[1].0.y)
            })
            .sum();
        assert!((area - 64.0).abs() < 1e-6);
    }

    #[test]
    fn union_covers_both_squares() {
        let loc = Location::new(FileId(0), 0);
        let a = square(0.0, 0.0, 5.0, 5.0, loc);
        let b = square(3.0, 3.0, 8.0, 8.0, loc);
        let engine = TrapezoidEngine;
        let mut arena = Arena::new();
        let result = engine.combine(&mut arena, BoolOp::Union, &[a, b], loc).unwrap();
        let area: f64 = result
            .polygons
            .iter()
            .map(|p| {
                let r = &p.rings[0];
                (r.points[1].0.x - r.points[0].0.x) * (r.points[2].0.y - r.points[1].0.y)
            })
            .sum();
        // 5*5 + 5*5 - 2*2 (overlap) = 46
        assert!((area - 46.0).abs() < 1e-6);
    }
}
