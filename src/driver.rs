//! The layer driver (component F, §4.4, §5).
//!
//! Two passes over `0 <= i < count`, each parallelized over a shared
//! fetch-and-increment index (`next_i`, mirroring the original's atomic
//! counter) with one [`Arena`] per worker thread. Pass 1 must finish for
//! every layer before pass 2 starts — a `thread::scope` join is the barrier
//! — because the inter-layer diff at layer `i` reads layers `i-1`/`i+1`.
//!
//! Failure is cooperative: a worker that errors sets a flag the others poll
//! before taking the next index (§5), and the driver reports the
//! lowest-index error on ties via [`ErrorRecord`]'s first-writer-wins slot.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::arena::Arena;
use crate::boolean::{BoolOp, BooleanEngine, Triangulator};
use crate::csg2;
use crate::error::{Diagnostic, ErrorRecord};
use crate::lower::Range;
use crate::slicer;
use crate::source::{FileId, Location};

pub struct DriverOptions {
    pub workers: usize,
    pub no_csg: bool,
    pub no_tri: bool,
    pub no_diff: bool,
    pub run_diff_pass: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions {
            workers: 1,
            no_csg: false,
            no_tri: false,
            no_diff: false,
            run_diff_pass: false,
        }
    }
}

struct NextIndex {
    next: AtomicUsize,
    count: usize,
    failed: AtomicBool,
}

impl NextIndex {
    fn new(count: usize) -> Self {
        NextIndex {
            next: AtomicUsize::new(0),
            count,
            failed: AtomicBool::new(false),
        }
    }

    /// Returns the next layer index to process, or `None` once exhausted or
    /// after any worker has recorded an error.
    fn take(&self) -> Option<usize> {
        if self.failed.load(Ordering::Acquire) {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::AcqRel);
        if i < self.count {
            Some(i)
        } else {
            None
        }
    }

    fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }
}

enum Pass {
    Csg,
    Diff,
}

pub struct LayerDriver {
    pub boolean: Box<dyn BooleanEngine>,
    pub triangulator: Box<dyn Triangulator>,
}

impl LayerDriver {
    pub fn new(boolean: Box<dyn BooleanEngine>, triangulator: Box<dyn Triangulator>) -> Self {
        LayerDriver { boolean, triangulator }
    }

    /// Runs pass 1 (and, if requested, pass 2) over `tree`, in place.
    /// Returns the first error observed, by lowest layer index.
    pub fn run(&self, tree: &csg2::Tree, range: &Range, file_id: FileId, opts: &DriverOptions) -> Result<(), Diagnostic> {
        let Some(root) = &tree.root else { return Ok(()) };

        let errors = ErrorRecord::new();
        let workers = opts.workers.max(1);

        self.run_pass(root, range, file_id, opts, &errors, workers, Pass::Csg);

        if opts.run_diff_pass && !opts.no_diff && !errors.has_error() {
            self.run_pass(root, range, file_id, opts, &errors, workers, Pass::Diff);
        }

        match errors.take() {
            Some(d) => Err(d),
            None => Ok(()),
        }
    }

    fn run_pass(
        &self,
        root: &Arc<csg2::Node>,
        range: &Range,
        file_id: FileId,
        opts: &DriverOptions,
        errors: &ErrorRecord,
        workers: usize,
        pass: Pass,
    ) {
        let index = NextIndex::new(range.count);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    let mut arena = Arena::new();
                    while let Some(i) = index.take() {
                        arena.reset();
                        let loc = Location::new(file_id, 0);
                        let result = match pass {
                            Pass::Csg => self.process_layer_csg(root, range, loc, opts, &mut arena, i),
                            Pass::Diff => self.process_layer_diff(root, range, loc, opts, &mut arena, i),
                        };
                        if let Err(diag) = result {
                            errors.set(diag);
                            index.mark_failed();
                            return;
                        }
                    }
                });
            }
        });
    }

    /// Pass 1, step 2-4 of §4.4: slice every leaf at layer `i`'s Z-plane,
    /// reduce bottom-up, triangulate. Every node along the way stores its
    /// own reduced result in its own [`csg2::LayerSlots`] (§3).
    fn process_layer_csg(
        &self,
        root: &Arc<csg2::Node>,
        range: &Range,
        loc: Location,
        opts: &DriverOptions,
        arena: &mut Arena,
        i: usize,
    ) -> Result<(), Diagnostic> {
        let z = range.z_at(i);
        let polygons = self.reduce_node(root, z, loc, opts.no_csg, arena, i)?;
        self.store(root, i, polygons, opts.no_tri, arena)
    }

    fn reduce_node(
        &self,
        node: &Arc<csg2::Node>,
        z: f64,
        loc: Location,
        no_csg: bool,
        arena: &mut Arena,
        i: usize,
    ) -> Result<csg2::PolygonSet, Diagnostic> {
        let polygons = match node.as_ref() {
            csg2::Node::Leaf { source, .. } => {
                let rings = slicer::slice_leaf(source, z);
                rings_to_polygon_set(rings, loc)
            }
            csg2::Node::Add(children, _) => {
                let sets = self.reduce_children(children, z, loc, no_csg, arena, i)?;
                if no_csg {
                    flatten(sets)
                } else {
                    self.boolean
                        .combine(arena, BoolOp::Union, &sets, loc)
                        .map_err(|e| Diagnostic::new(e, Some(loc)))?
                }
            }
            csg2::Node::Subtract(children, _) => {
                let sets = self.reduce_children(children, z, loc, no_csg, arena, i)?;
                if no_csg {
                    sets.into_iter().next().unwrap_or_default()
                } else {
                    self.boolean
                        .combine(arena, BoolOp::Difference, &sets, loc)
                        .map_err(|e| Diagnostic::new(e, Some(loc)))?
                }
            }
            csg2::Node::Intersect(children, _) => {
                let sets = self.reduce_children(children, z, loc, no_csg, arena, i)?;
                if no_csg {
                    flatten(sets)
                } else {
                    self.boolean
                        .combine(arena, BoolOp::Intersection, &sets, loc)
                        .map_err(|e| Diagnostic::new(e, Some(loc)))?
                }
            }
        };
        node.layers().lock(i).polygons = polygons.clone();
        Ok(polygons)
    }

    fn reduce_children(
        &self,
        children: &[Arc<csg2::Node>],
        z: f64,
        loc: Location,
        no_csg: bool,
        arena: &mut Arena,
        i: usize,
    ) -> Result<Vec<csg2::PolygonSet>, Diagnostic> {
        children.iter().map(|c| self.reduce_node(c, z, loc, no_csg, arena, i)).collect()
    }

    /// Pass 2 of §4.4: the inter-layer XOR, only run for the JS emitter.
    fn process_layer_diff(
        &self,
        root: &Arc<csg2::Node>,
        range: &Range,
        loc: Location,
        opts: &DriverOptions,
        arena: &mut Arena,
        i: usize,
    ) -> Result<(), Diagnostic> {
        let current = root.layers().get(i).polygons;
        let prev = if i > 0 { Some(root.layers().get(i - 1).polygons) } else { None };
        let next = if i + 1 < range.count { Some(root.layers().get(i + 1).polygons) } else { None };

        let diffed = self
            .boolean
            .diff(arena, &current, prev.as_ref(), next.as_ref(), loc)
            .map_err(|e| Diagnostic::new(e, Some(loc)))?;

        self.store(root, i, diffed, opts.no_tri, arena)
    }

    fn store(
        &self,
        root: &Arc<csg2::Node>,
        i: usize,
        polygons: csg2::PolygonSet,
        no_tri: bool,
        arena: &mut Arena,
    ) -> Result<(), Diagnostic> {
        let tri = if no_tri {
            None
        } else {
            let loc = Location::new(FileId(0), 0);
            Some(
                self.triangulator
                    .triangulate(arena, &polygons)
                    .map_err(|e| Diagnostic::new(e, Some(loc)))?,
            )
        };
        let mut cell = root.layers().lock(i);
        cell.polygons = polygons;
        cell.triangulation = tri;
        Ok(())
    }
}

fn flatten(sets: Vec<csg2::PolygonSet>) -> csg2::PolygonSet {
    let mut out = csg2::PolygonSet::default();
    for s in sets {
        out.polygons.extend(s.polygons);
    }
    out
}

fn rings_to_polygon_set(rings: Vec<Vec<csg2::Point2>>, loc: Location) -> csg2::PolygonSet {
    csg2::PolygonSet {
        polygons: rings
            .into_iter()
            .map(|ring| csg2::Polygon {
                rings: vec![csg2::Ring {
                    points: ring.into_iter().map(|p| (p, loc)).collect(),
                }],
            })
            .collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::boolean::TrapezoidEngine;
    use crate::csg3;
    use crate::source::FileId;

    fn cube_tree(size: f64) -> csg2::Tree {
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
        csg2::Tree::new(Some(&node), 2)
    }

    #[test]
    fn single_cube_produces_two_square_layers() {
        let tree = cube_tree(10.0);
        let range = Range { min: 2.5, step: 5.0, count: 2 };
        let driver = LayerDriver::new(Box::new(TrapezoidEngine), Box::new(TrapezoidEngine));
        let opts = DriverOptions { workers: 2, ..DriverOptions::default() };
        driver.run(&tree, &range, FileId(0), &opts).unwrap();

        let root = tree.root.as_ref().unwrap();
        for i in 0..2 {
            let cell = root.layers().get(i);
            assert_eq!(cell.polygons.polygons.len(), 1);
            assert!(cell.triangulation.is_some());
        }
    }

    #[test]
    fn worker_count_does_not_change_output() {
        let range = Range { min: 1.0, step: 2.0, count: 10 };
        let mut reference: Option<Vec<csg2::LayerCell>> = None;
        for workers in [1, 2, 8] {
            let tree = cube_tree(10.0);
            let driver = LayerDriver::new(Box::new(TrapezoidEngine), Box::new(TrapezoidEngine));
            let opts = DriverOptions { workers, ..DriverOptions::default() };
            driver.run(&tree, &range, FileId(0), &opts).unwrap();
            let root = tree.root.as_ref().unwrap();
            let cells: Vec<csg2::LayerCell> = (0..10).map(|i| root.layers().get(i)).collect();
            if let Some(prev) = &reference {
                for (a, b) in prev.iter().zip(&cells) {
                    assert_eq!(a.polygons.polygons.len(), b.polygons.polygons.len());
                }
            }
            reference = Some(cells);
        }
    }
}
