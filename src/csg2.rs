//! The typed 2D CSG tree (component E/F's working structure, §3).
//!
//! A skeleton mirrors the 3D tree's boolean structure; at each 2D-relevant
//! subtree root (currently: every leaf) a [`LayerSlots`] holds one
//! [`LayerCell`] per layer index. Slots are `Mutex`-guarded so that the
//! layer driver (§4.4, §5) can write distinct indices from distinct worker
//! threads without `unsafe`; contention is impossible because each index is
//! written by exactly one worker.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::csg3;
use crate::source::Location;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Point2 { x, y }
    }
}

/// A single ring (outer boundary or hole) of a polygon.
#[derive(Debug, Clone, Default)]
pub struct Ring {
    pub points: Vec<(Point2, Location)>,
}

/// A polygon: first ring is the outer boundary, the rest are holes.
#[derive(Debug, Clone, Default)]
pub struct Polygon {
    pub rings: Vec<Ring>,
}

#[derive(Debug, Clone, Default)]
pub struct PolygonSet {
    pub polygons: Vec<Polygon>,
}

/// A triangulation over a flat point array, produced independently of the
/// polygon rings that generated it (the emitters read whichever is present).
#[derive(Debug, Clone, Default)]
pub struct Triangulation {
    pub points: Vec<Point2>,
    pub triangles: Vec<[u32; 3]>,
}

#[derive(Debug, Clone, Default)]
pub struct LayerCell {
    pub polygons: PolygonSet,
    pub triangulation: Option<Triangulation>,
}

/// Per-layer storage for one 2D-relevant subtree root, indexed by layer.
pub struct LayerSlots {
    cells: Vec<Mutex<LayerCell>>,
}

impl LayerSlots {
    pub fn new(layer_count: usize) -> Self {
        LayerSlots {
            cells: (0..layer_count).map(|_| Mutex::new(LayerCell::default())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn lock(&self, i: usize) -> MutexGuard<'_, LayerCell> {
        self.cells[i].lock().unwrap()
    }

    pub fn get(&self, i: usize) -> LayerCell {
        self.cells[i].lock().unwrap().clone()
    }
}

/// Every boolean node is itself a "2D-relevant subtree root" (§3): it owns
/// its own [`LayerSlots`] alongside its children, so the driver can write
/// each node's reduced result at the node that produced it rather than
/// threading a separate "designated output tree" through the recursion.
pub enum Node {
    Add(Vec<Arc<Node>>, LayerSlots),
    Subtract(Vec<Arc<Node>>, LayerSlots),
    Intersect(Vec<Arc<Node>>, LayerSlots),
    Leaf {
        source: Arc<csg3::Node>,
        layers: LayerSlots,
    },
}

impl Node {
    /// Build a 2D tree skeleton mirroring the shape of a 3D tree, with one
    /// empty [`LayerSlots`] per node.
    pub fn from_csg3(node: &Arc<csg3::Node>, layer_count: usize) -> Arc<Node> {
        match node.as_ref() {
            csg3::Node::Add(children, _) => Arc::new(Node::Add(
                children.iter().map(|c| Node::from_csg3(c, layer_count)).collect(),
                LayerSlots::new(layer_count),
            )),
            csg3::Node::Subtract(children, _) => Arc::new(Node::Subtract(
                children.iter().map(|c| Node::from_csg3(c, layer_count)).collect(),
                LayerSlots::new(layer_count),
            )),
            csg3::Node::Intersect(children, _) => Arc::new(Node::Intersect(
                children.iter().map(|c| Node::from_csg3(c, layer_count)).collect(),
                LayerSlots::new(layer_count),
            )),
            _ => Arc::new(Node::Leaf {
                source: node.clone(),
                layers: LayerSlots::new(layer_count),
            }),
        }
    }

    pub fn children(&self) -> &[Arc<Node>] {
        match self {
            Node::Add(c, _) | Node::Subtract(c, _) | Node::Intersect(c, _) => c,
            Node::Leaf { .. } => &[],
        }
    }

    pub fn layers(&self) -> &LayerSlots {
        match self {
            Node::Add(_, l) | Node::Subtract(_, l) | Node::Intersect(_, l) => l,
            Node::Leaf { layers, .. } => layers,
        }
    }

    /// Every leaf in traversal order, depth-first.
    pub fn leaves(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Node>) {
        if let Node::Leaf { .. } = self {
            out.push(self);
            return;
        }
        for c in self.children() {
            c.collect_leaves(out);
        }
    }
}

/// A 2D tree: the boolean skeleton plus the layer count it was built for.
pub struct Tree {
    pub root: Option<Arc<Node>>,
    pub layer_count: usize,
}

impl Tree {
    pub fn new(csg3_root: Option<&Arc<csg3::Node>>, layer_count: usize) -> Self {
        Tree {
            root: csg3_root.map(|r| Node::from_csg3(r, layer_count)),
            layer_count,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::FileId;

    #[test]
    fn from_csg3_mirrors_shape() {
        let loc = Location::new(FileId(0), 0);
        let leaf = Arc::new(csg3::Node::Sphere(csg3::Sphere {
            center: csg3::Point3::new(0.0, 0.0, 0.0),
            radius: 1.0,
            gc: csg3::GraphicsContext::default(),
            loc,
        }));
        let root = Arc::new(csg3::Node::Add(vec![leaf.clone(), leaf], loc));
        let two = Node::from_csg3(&root, 4);
        assert_eq!(two.leaves().len(), 2);
    }
}
