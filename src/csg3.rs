//! The typed 3D CSG tree (component D's output, §3).
//!
//! The original models CSG3 nodes as a tagged union with a dynamic-check
//! cast macro (`cp_csg3_cast`) reading a runtime type tag. Here the tag
//! *is* the enum discriminant: consumers match on [`Node`] instead of
//! casting, per the redesign note on dynamic casts.

use std::sync::Arc;

use crate::source::Location;

bitflags::bitflags! {
    /// The four SCAD subtree modifiers, aggregated by OR across repeated
    /// prefixes (e.g. `*!#foo();`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        /// `!` - show only this subtree, overriding siblings.
        const SHOW_ONLY  = 0b0001;
        /// `*` - disable this subtree (acts as if absent).
        const DISABLE    = 0b0010;
        /// `%` - render as background (kept for traversal, excluded from output).
        const BACKGROUND = 0b0100;
        /// `#` - highlight.
        const HIGHLIGHT  = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Color {
            r: 1.0,
            g: 1.0,
            b: 1.0,
            a: 1.0,
        }
    }
}

/// Inherited appearance attributes: color and modifier flags, threaded down
/// the surface tree during lowering with ordinary SCAD semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphicsContext {
    pub color: Option<Color>,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Point3 { x, y, z }
    }
}

/// An affine transform: `p' = linear * p + translate`, accumulated down the
/// surface tree by `translate`/`rotate`/`scale` forms and baked into each
/// leaf's coordinates at construction time (there is no separate transform
/// node kind; see §3's node kind list).
#[derive(Debug, Clone, Copy)]
pub struct Affine {
    pub linear: [[f64; 3]; 3],
    pub translate: Point3,
}

impl Affine {
    pub fn identity() -> Self {
        Affine {
            linear: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translate: Point3::new(0.0, 0.0, 0.0),
        }
    }

    pub fn translation(d: Point3) -> Self {
        Affine {
            linear: Self::identity().linear,
            translate: d,
        }
    }

    pub fn scaling(s: Point3) -> Self {
        Affine {
            linear: [[s.x, 0.0, 0.0], [0.0, s.y, 0.0], [0.0, 0.0, s.z]],
            translate: Point3::new(0.0, 0.0, 0.0),
        }
    }

    /// `self` applied after `other`, i.e. `self.then(other)(p) == self(other(p))`.
    pub fn then(&self, inner: &Affine) -> Affine {
        let mut linear = [[0.0; 3]; 3];
        for row in 0..3 {
            for col in 0..3 {
                linear[row][col] = (0..3).map(|k| self.linear[row][k] * inner.linear[k][col]).sum();
            }
        }
        Affine {
            linear,
            translate: self.apply(inner.translate),
        }
    }

    pub fn apply(&self, p: Point3) -> Point3 {
        let v = [p.x, p.y, p.z];
        let row = |r: usize| self.linear[r][0] * v[0] + self.linear[r][1] * v[1] + self.linear[r][2] * v[2];
        Point3::new(
            row(0) + self.translate.x,
            row(1) + self.translate.y,
            row(2) + self.translate.z,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vec3MinMax {
    pub min: Point3,
    pub max: Point3,
}

impl Vec3MinMax {
    pub fn empty() -> Self {
        Vec3MinMax {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    pub fn extend(&mut self, p: Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn union(&mut self, other: &Vec3MinMax) {
        if other.is_empty() {
            return;
        }
        self.extend(other.min);
        self.extend(other.max);
    }
}

#[derive(Debug, Clone)]
pub struct Sphere {
    pub center: Point3,
    pub radius: f64,
    pub gc: GraphicsContext,
    pub loc: Location,
}

#[derive(Debug, Clone)]
pub struct Cylinder {
    /// Endpoints of the cylinder's axis; radius interpolates linearly
    /// between `r1` (at `bottom`) and `r2` (at `top`).
    pub bottom: Point3,
    pub top: Point3,
    pub r1: f64,
    pub r2: f64,
    pub gc: GraphicsContext,
    pub loc: Location,
}

#[derive(Debug, Clone)]
pub struct Polyhedron {
    pub points: Vec<Point3>,
    /// Each face is an ordered, planar loop of indices into `points`.
    pub faces: Vec<Vec<usize>>,
    pub gc: GraphicsContext,
    pub loc: Location,
}

/// A flat 2D polygon embedded at a fixed Z (OpenSCAD's `linear_extrude`
/// reduced to a single slab for this pipeline's purposes).
#[derive(Debug, Clone)]
pub struct Embed2d {
    pub rings: Vec<Vec<(f64, f64)>>,
    pub z_min: f64,
    pub z_max: f64,
    pub gc: GraphicsContext,
    pub loc: Location,
}

#[derive(Debug, Clone)]
pub enum Node {
    Sphere(Sphere),
    Cylinder(Cylinder),
    Polyhedron(Polyhedron),
    Embed2d(Embed2d),
    Add(Vec<Arc<Node>>, Location),
    Subtract(Vec<Arc<Node>>, Location),
    Intersect(Vec<Arc<Node>>, Location),
}

impl Node {
    pub fn location(&self) -> Location {
        match self {
            Node::Sphere(s) => s.loc,
            Node::Cylinder(c) => c.loc,
            Node::Polyhedron(p) => p.loc,
            Node::Embed2d(e) => e.loc,
            Node::Add(_, loc) | Node::Subtract(_, loc) | Node::Intersect(_, loc) => *loc,
        }
    }

    fn bb(&self, bb: &mut Vec3MinMax, max: bool) {
        match self {
            Node::Sphere(s) => {
                let r = Point3::new(s.radius, s.radius, s.radius);
                bb.extend(Point3::new(s.center.x - r.x, s.center.y - r.y, s.center.z - r.z));
                bb.extend(Point3::new(s.center.x + r.x, s.center.y + r.y, s.center.z + r.z));
            }
            Node::Cylinder(c) => {
                let r = c.r1.max(c.r2);
                for p in [c.bottom, c.top] {
                    bb.extend(Point3::new(p.x - r, p.y - r, p.z));
                    bb.extend(Point3::new(p.x + r, p.y + r, p.z));
                }
            }
            Node::Polyhedron(p) => {
                for &v in &p.points {
                    bb.extend(v);
                }
            }
            Node::Embed2d(e) => {
                for ring in &e.rings {
                    for &(x, y) in ring {
                        bb.extend(Point3::new(x, y, e.z_min));
                        bb.extend(Point3::new(x, y, e.z_max));
                    }
                }
            }
            Node::Add(children, _) | Node::Intersect(children, _) => {
                for c in children {
                    c.bb(bb, max);
                }
            }
            Node::Subtract(children, _) => {
                if let Some(first) = children.first() {
                    first.bb(bb, max);
                }
                if max {
                    for c in &children[1..] {
                        c.bb(bb, max);
                    }
                }
            }
        }
    }
}

/// The root of a parsed-and-lowered 3D model.
pub struct Tree {
    pub root: Option<Arc<Node>>,
}

impl Tree {
    /// Bounding box of the tree. `max == false` ("normal" mode) ignores
    /// geometry subtracted away at `Subtract` nodes; `max == true` includes
    /// it (§4.3).
    pub fn bounding_box(&self, max: bool) -> Vec3MinMax {
        let mut bb = Vec3MinMax::empty();
        if let Some(root) = &self.root {
            root.bb(&mut bb, max);
        }
        bb
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_tree_bb_is_empty() {
        let tree = Tree { root: None };
        assert!(tree.bounding_box(false).is_empty());
    }

    #[test]
    fn subtract_normal_mode_ignores_second_child() {
        let loc = Location::new(crate::source::FileId(0), 0);
        let base = Arc::new(Node::Sphere(Sphere {
            center: Point3::new(0.0, 0.0, 0.0),
            radius: 1.0,
            gc: GraphicsContext::default(),
            loc,
        }));
        let cutter = Arc::new(Node::Sphere(Sphere {
            center: Point3::new(100.0, 0.0, 0.0),
            radius: 1.0,
            gc: GraphicsContext::default(),
            loc,
        }));
        let tree = Tree {
            root: Some(Arc::new(Node::Subtract(vec![base, cutter.clone()], loc))),
        };
        let bb = tree.bounding_box(false);
        assert!(bb.max.x < 50.0);
        let bb_max = tree.bounding_box(true);
        assert!(bb_max.max.x > 50.0);
    }
}
