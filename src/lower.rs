//! Surface-to-CSG3 lowering, bounding box, and Z-range selection
//! (component D, §4.3).
//!
//! Each recognized functor name maps to a typed-node constructor that
//! validates argument names, counts, and types; unrecognized functors or
//! malformed arguments yield a localized [`Diagnostic`]. The graphics
//! context (color, modifier flags) is threaded down the tree and baked into
//! leaves, along with the accumulated affine transform (there is no
//! separate transform node kind — see §3's node kind list and
//! `csg3::Affine`).

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::csg3::{
    Affine, Color, Cylinder, Embed2d, GraphicsContext, Modifiers, Node, Point3, Polyhedron,
    Sphere, Tree,
};
use crate::error::{Diagnostic, Error};
use crate::parser::ast::{SurfaceForm, Value};
use crate::source::Location;

const DEFAULT_CIRCLE_SEGMENTS: usize = 24;

struct Ctx {
    xform: Affine,
    gc: GraphicsContext,
    /// Every node lowered from a form carrying its own (not inherited) `!`
    /// bit is also pushed here, so `lower` can restrict the root to their
    /// union once the whole tree has been walked (§3 "show-only root
    /// override").
    show_only: Rc<RefCell<Vec<Arc<Node>>>>,
}

impl Ctx {
    fn root() -> Self {
        Ctx {
            xform: Affine::identity(),
            gc: GraphicsContext::default(),
            show_only: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn child(&self, xform: Affine, gc: GraphicsContext) -> Self {
        Ctx {
            xform: self.xform.then(&xform),
            gc,
            show_only: self.show_only.clone(),
        }
    }
}

/// Lowers a parsed top-level body into a 3D CSG tree. On the first
/// malformed form, returns the diagnostic and the tree built so far is
/// discarded (§7: errors are surfaced, not recovered).
pub fn lower(forms: &[SurfaceForm]) -> Result<Tree, Diagnostic> {
    let ctx = Ctx::root();
    let children = lower_body(forms, &ctx)?;

    let show_only = ctx.show_only.borrow();
    if !show_only.is_empty() {
        let loc = show_only[0].location();
        return Ok(Tree { root: wrap_add(show_only.clone(), loc) });
    }
    drop(show_only);

    let root = match children.len() {
        0 => None,
        1 => Some(children.into_iter().next().unwrap()),
        _ => {
            let loc = forms[0].loc;
            Some(Arc::new(Node::Add(children, loc)))
        }
    };
    Ok(Tree { root })
}

fn lower_body(forms: &[SurfaceForm], ctx: &Ctx) -> Result<Vec<Arc<Node>>, Diagnostic> {
    let mut out = Vec::with_capacity(forms.len());
    for f in forms {
        if let Some(node) = lower_form(f, ctx)? {
            out.push(node);
        }
    }
    Ok(out)
}

fn lower_form(f: &SurfaceForm, ctx: &Ctx) -> Result<Option<Arc<Node>>, Diagnostic> {
    let node = lower_form_inner(f, ctx)?;
    if let Some(node) = &node {
        if f.modifiers.contains(Modifiers::SHOW_ONLY) {
            ctx.show_only.borrow_mut().push(node.clone());
        }
    }
    Ok(node)
}

fn lower_form_inner(f: &SurfaceForm, ctx: &Ctx) -> Result<Option<Arc<Node>>, Diagnostic> {
    let mut gc = ctx.gc;
    gc.modifiers |= f.modifiers;
    if gc.modifiers.contains(Modifiers::DISABLE) {
        return Ok(None);
    }

    if f.is_group() {
        let child_ctx = ctx.child(Affine::identity(), gc);
        let children = lower_body(&f.body, &child_ctx)?;
        return Ok(wrap_add(children, f.loc));
    }

    match f.functor.as_str() {
        "union" => {
            let child_ctx = ctx.child(Affine::identity(), gc);
            let children = lower_body(&f.body, &child_ctx)?;
            Ok(wrap_add(children, f.loc))
        }
        "difference" => {
            let child_ctx = ctx.child(Affine::identity(), gc);
            let children = lower_body(&f.body, &child_ctx)?;
            if children.is_empty() {
                return Ok(None);
            }
            Ok(Some(Arc::new(Node::Subtract(children, f.loc))))
        }
        "intersection" => {
            let child_ctx = ctx.child(Affine::identity(), gc);
            let children = lower_body(&f.body, &child_ctx)?;
            if children.is_empty() {
                return Ok(None);
            }
            Ok(Some(Arc::new(Node::Intersect(children, f.loc))))
        }
        "translate" => {
            let v = vec3_arg(f, 0, "v")?;
            let child_ctx = ctx.child(Affine::translation(v), gc);
            let children = lower_body(&f.body, &child_ctx)?;
            Ok(wrap_add(children, f.loc))
        }
        "scale" => {
            let v = vec3_arg(f, 0, "v")?;
            let child_ctx = ctx.child(Affine::scaling(v), gc);
            let children = lower_body(&f.body, &child_ctx)?;
            Ok(wrap_add(children, f.loc))
        }
        "color" => {
            if let Some(v) = f.positional(0).or_else(|| f.arg("c")) {
                gc.color = Some(color_from_value(v, f.loc)?);
            }
            let child_ctx = ctx.child(Affine::identity(), gc);
            let children = lower_body(&f.body, &child_ctx)?;
            Ok(wrap_add(children, f.loc))
        }
        "cube" => Ok(Some(Arc::new(lower_cube(f, ctx, gc)?))),
        "sphere" => Ok(Some(Arc::new(lower_sphere(f, ctx, gc)?))),
        "cylinder" => Ok(Some(Arc::new(lower_cylinder(f, ctx, gc)?))),
        "polygon" => Ok(Some(Arc::new(lower_polygon(f, ctx, gc)?))),
        other => Err(Diagnostic::new(
            Error::Lower(format!("Unknown functor '{other}'.")),
            Some(f.loc),
        )),
    }
}

fn wrap_add(children: Vec<Arc<Node>>, loc: Location) -> Option<Arc<Node>> {
    match children.len() {
        0 => None,
        1 => children.into_iter().next(),
        _ => Some(Arc::new(Node::Add(children, loc))),
    }
}

fn number(v: &Value) -> Option<f64> {
    v.as_f64()
}

fn vec3_from_array(v: &Value, loc: Location) -> Result<Point3, Diagnostic> {
    match v {
        Value::Array(items, _) if items.len() == 3 => {
            let x = number(&items[0]).ok_or_else(|| bad_arg(loc))?;
            let y = number(&items[1]).ok_or_else(|| bad_arg(loc))?;
            let z = number(&items[2]).ok_or_else(|| bad_arg(loc))?;
            Ok(Point3::new(x, y, z))
        }
        Value::Int(_, _) | Value::Float(_, _) => {
            let s = number(v).ok_or_else(|| bad_arg(loc))?;
            Ok(Point3::new(s, s, s))
        }
        _ => Err(bad_arg(loc)),
    }
}

fn bad_arg(loc: Location) -> Diagnostic {
    Diagnostic::new(Error::Lower("Malformed argument.".into()), Some(loc))
}

fn vec3_arg(f: &SurfaceForm, pos: usize, name: &str) -> Result<Point3, Diagnostic> {
    let v = f
        .positional(pos)
        .or_else(|| f.arg(name))
        .ok_or_else(|| Diagnostic::new(Error::Lower(format!("Missing argument '{name}'.")), Some(f.loc)))?;
    vec3_from_array(v, f.loc)
}

fn color_from_value(v: &Value, loc: Location) -> Result<Color, Diagnostic> {
    match v {
        Value::Str(s, _) => parse_hex_color(s.as_str(), loc),
        Value::Array(items, _) if items.len() >= 3 => {
            let r = number(&items[0]).ok_or_else(|| bad_arg(loc))? as f32;
            let g = number(&items[1]).ok_or_else(|| bad_arg(loc))? as f32;
            let b = number(&items[2]).ok_or_else(|| bad_arg(loc))? as f32;
            let a = items.get(3).and_then(number).unwrap_or(1.0) as f32;
            Ok(Color { r, g, b, a })
        }
        _ => Err(bad_arg(loc)),
    }
}

fn parse_hex_color(s: &str, loc: Location) -> Result<Color, Diagnostic> {
    let s = s.trim_start_matches('#');
    if s.len() != 6 && s.len() != 8 {
        return Err(bad_arg(loc));
    }
    let byte = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| bad_arg(loc));
    let r = byte(0)? as f32 / 255.0;
    let g = byte(2)? as f32 / 255.0;
    let b = byte(4)? as f32 / 255.0;
    let a = if s.len() == 8 { byte(6)? as f32 / 255.0 } else { 1.0 };
    Ok(Color { r, g, b, a })
}

fn bool_arg(f: &SurfaceForm, name: &str, default: bool) -> bool {
    match f.arg(name) {
        Some(Value::Ident(id, _)) => id.as_str() == "true",
        _ => default,
    }
}

fn lower_cube(f: &SurfaceForm, ctx: &Ctx, gc: GraphicsContext) -> Result<Node, Diagnostic> {
    let size = match f.positional(0).or_else(|| f.arg("size")) {
        Some(v) => vec3_from_array(v, f.loc)?,
        None => Point3::new(1.0, 1.0, 1.0),
    };
    let centered = bool_arg(f, "center", false);
    let (lo, hi) = if centered {
        (
            Point3::new(-size.x / 2.0, -size.y / 2.0, -size.z / 2.0),
            Point3::new(size.x / 2.0, size.y / 2.0, size.z / 2.0),
        )
    } else {
        (Point3::new(0.0, 0.0, 0.0), size)
    };
    let local = [
        Point3::new(lo.x, lo.y, lo.z),
        Point3::new(hi.x, lo.y, lo.z),
        Point3::new(hi.x, hi.y, lo.z),
        Point3::new(lo.x, hi.y, lo.z),
        Point3::new(lo.x, lo.y, hi.z),
        Point3::new(hi.x, lo.y, hi.z),
        Point3::new(hi.x, hi.y, hi.z),
        Point3::new(lo.x, hi.y, hi.z),
    ];
    let points = local.iter().map(|&p| ctx.xform.apply(p)).collect();
    let faces = vec![
        vec![0, 3, 2, 1], // bottom
        vec![4, 5, 6, 7], // top
        vec![0, 1, 5, 4],
        vec![1, 2, 6, 5],
        vec![2, 3, 7, 6],
        vec![3, 0, 4, 7],
    ];
    Ok(Node::Polyhedron(Polyhedron { points, faces, gc, loc: f.loc }))
}

fn lower_sphere(f: &SurfaceForm, ctx: &Ctx, gc: GraphicsContext) -> Result<Node, Diagnostic> {
    let r = radius_arg(f)?;
    let center = ctx.xform.apply(Point3::new(0.0, 0.0, 0.0));
    // A non-uniform transform would turn the sphere into an ellipsoid; this
    // pipeline only tracks a scalar radius, so we approximate by the mean
    // axis scale (exact for the translate/uniform-scale cases §8 exercises).
    let scale = mean_axis_scale(ctx);
    Ok(Node::Sphere(Sphere { center, radius: r * scale, gc, loc: f.loc }))
}

fn mean_axis_scale(ctx: &Ctx) -> f64 {
    let m = ctx.xform.linear;
    let len = |v: [f64; 3]| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    (len([m[0][0], m[1][0], m[2][0]]) + len([m[0][1], m[1][1], m[2][1]]) + len([m[0][2], m[1][2], m[2][2]])) / 3.0
}

fn radius_arg(f: &SurfaceForm) -> Result<f64, Diagnostic> {
    if let Some(v) = f.arg("r").or_else(|| f.positional(0)) {
        return number(v).ok_or_else(|| bad_arg(f.loc));
    }
    if let Some(v) = f.arg("d") {
        return number(v).map(|d| d / 2.0).ok_or_else(|| bad_arg(f.loc));
    }
    Err(Diagnostic::new(Error::Lower("sphere: missing radius.".into()), Some(f.loc)))
}

fn lower_cylinder(f: &SurfaceForm, ctx: &Ctx, gc: GraphicsContext) -> Result<Node, Diagnostic> {
    let h = f
        .arg("h")
        .or_else(|| f.positional(0))
        .and_then(number)
        .ok_or_else(|| Diagnostic::new(Error::Lower("cylinder: missing height.".into()), Some(f.loc)))?;
    let r1 = f.arg("r1").or_else(|| f.arg("r")).and_then(number);
    let r2 = f.arg("r2").or_else(|| f.arg("r")).and_then(number);
    let (r1, r2) = match (r1, r2) {
        (Some(a), Some(b)) => (a, b),
        (Some(a), None) => (a, a),
        _ => {
            let r = f
                .arg("r")
                .and_then(number)
                .ok_or_else(|| Diagnostic::new(Error::Lower("cylinder: missing radius.".into()), Some(f.loc)))?;
            (r, r)
        }
    };
    let centered = bool_arg(f, "center", false);
    let (z0, z1) = if centered { (-h / 2.0, h / 2.0) } else { (0.0, h) };
    let scale = mean_axis_scale(ctx);
    Ok(Node::Cylinder(Cylinder {
        bottom: ctx.xform.apply(Point3::new(0.0, 0.0, z0)),
        top: ctx.xform.apply(Point3::new(0.0, 0.0, z1)),
        r1: r1 * scale,
        r2: r2 * scale,
        gc,
        loc: f.loc,
    }))
}

fn lower_polygon(f: &SurfaceForm, ctx: &Ctx, gc: GraphicsContext) -> Result<Node, Diagnostic> {
    let points_arg = f
        .arg("points")
        .or_else(|| f.positional(0))
        .ok_or_else(|| Diagnostic::new(Error::Lower("polygon: missing points.".into()), Some(f.loc)))?;
    let items = match points_arg {
        Value::Array(items, _) => items,
        _ => return Err(bad_arg(f.loc)),
    };
    let mut ring = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(xy, _) if xy.len() == 2 => {
                let x = number(&xy[0]).ok_or_else(|| bad_arg(f.loc))?;
                let y = number(&xy[1]).ok_or_else(|| bad_arg(f.loc))?;
                let p = ctx.xform.apply(Point3::new(x, y, 0.0));
                ring.push((p.x, p.y));
            }
            _ => return Err(bad_arg(f.loc)),
        }
    }
    let z = ctx.xform.apply(Point3::new(0.0, 0.0, 0.0)).z;
    Ok(Node::Embed2d(Embed2d {
        rings: vec![ring],
        z_min: z,
        z_max: z,
        gc,
        loc: f.loc,
    }))
}

/// A uniformly-spaced layer index range: layer `i` samples `min + i*step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub step: f64,
    pub count: usize,
}

impl Range {
    pub fn z_at(&self, i: usize) -> f64 {
        self.min + (i as f64) * self.step
    }
}

/// Selects the Z-range per §4.3: defaults center slices inside layers by a
/// half-step offset to avoid sampling exactly on a horizontal face.
pub fn select_z_range(
    bbox: &crate::csg3::Vec3MinMax,
    z_min_opt: Option<f64>,
    z_max_opt: Option<f64>,
    z_step: f64,
) -> Range {
    let (default_min, default_max) = if bbox.is_empty() {
        (0.0, 0.0)
    } else {
        (bbox.min.z + z_step / 2.0, bbox.max.z)
    };
    let min = z_min_opt.unwrap_or(default_min);
    let max = z_max_opt.unwrap_or(default_max);
    let count = (((max - min) / z_step).floor() as i64 + 1).max(1) as usize;
    Range { min, step: z_step, count }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::{FileId, SourceFile};

    fn lower_src(src: &str) -> (Option<Arc<Node>>, Option<Diagnostic>) {
        let mut file = SourceFile::new("t.scad", src);
        let parser = crate::parser::Parser::new(&mut file.working, FileId(0));
        let (forms, perr) = parser.parse();
        if let Some(e) = perr {
            return (None, Some(e));
        }
        match lower(&forms) {
            Ok(tree) => (tree.root, None),
            Err(e) => (None, Some(e)),
        }
    }

    #[test]
    fn empty_body_lowers_to_no_root() {
        let (root, err) = lower_src("");
        assert!(root.is_none());
        assert!(err.is_none());
    }

    #[test]
    fn cube_lowers_to_polyhedron() {
        let (root, err) = lower_src("cube([10,10,10]);");
        assert!(err.is_none());
        assert!(matches!(root.unwrap().as_ref(), Node::Polyhedron(_)));
    }

    #[test]
    fn show_only_modifier_restricts_the_root_to_marked_siblings() {
        let (root, err) = lower_src("union() { cube(1); !sphere(2); cylinder(h=1, r=1); }");
        assert!(err.is_none());
        assert!(matches!(root.unwrap().as_ref(), Node::Sphere(_)));
    }

    #[test]
    fn without_a_show_only_modifier_all_siblings_survive() {
        let (root, err) = lower_src("union() { cube(1); sphere(2); }");
        assert!(err.is_none());
        assert!(matches!(root.unwrap().as_ref(), Node::Add(children, _) if children.len() == 2));
    }

    #[test]
    fn z_range_defaults_half_step_offset() {
        let bbox = crate::csg3::Vec3MinMax {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(10.0, 10.0, 10.0),
        };
        let range = select_z_range(&bbox, None, None, 5.0);
        assert_eq!(range.min, 2.5);
        assert_eq!(range.count, 2);
        assert_eq!(range.z_at(1), 7.5);
    }

    #[test]
    fn z_step_monotonicity() {
        let bbox = crate::csg3::Vec3MinMax {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(0.0, 0.0, 100.0),
        };
        let coarse = select_z_range(&bbox, Some(0.0), Some(100.0), 10.0);
        let fine = select_z_range(&bbox, Some(0.0), Some(100.0), 1.0);
        assert!(fine.count >= coarse.count);
    }
}
