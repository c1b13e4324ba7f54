//! Geometry utilities: point rotation, arc bounding box, sweep angle, convex
//! hull, and the SVG emission helpers shared by the graphic-primitives
//! module.

use crate::units::Unit;

pub type Point = (f64, f64);
pub type Bounds = ((f64, f64), (f64, f64));

/// Interpolation mode shared between the Gerber and Excellon parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpMode {
    Linear,
    CircularCw,
    CircularCcw,
}

/// Rotate `(x, y)` around `(cx, cy)` by `angle` clockwise radians.
///
/// Note the `-angle` in the underlying trig call: the crate's rotation
/// convention is clockwise, while `f64::sin`/`cos` assume counter-clockwise.
pub fn rotate_point(x: f64, y: f64, angle: f64, cx: f64, cy: f64) -> Point {
    let (s, c) = (-angle).sin_cos();
    (
        cx + (x - cx) * c - (y - cy) * s,
        cy + (x - cx) * s + (y - cy) * c,
    )
}

fn min_none(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => Some(a.min(b)),
    }
}

fn max_none(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => Some(a.max(b)),
    }
}

/// Union two axis-aligned bounding boxes.
pub fn add_bounds(b1: Bounds, b2: Bounds) -> Bounds {
    let ((min_x1, min_y1), (max_x1, max_y1)) = b1;
    let ((min_x2, min_y2), (max_x2, max_y2)) = b2;
    (
        (
            min_none(Some(min_x1), Some(min_x2)).unwrap(),
            min_none(Some(min_y1), Some(min_y2)).unwrap(),
        ),
        (
            max_none(Some(max_x1), Some(max_x2)).unwrap(),
            max_none(Some(max_y1), Some(max_y2)).unwrap(),
        ),
    )
}

/// Union an arbitrary number of bounding boxes.
pub fn sum_bounds<I: IntoIterator<Item = Bounds>>(bounds: I) -> Option<Bounds> {
    let mut iter = bounds.into_iter();
    let mut acc = iter.next()?;
    for b in iter {
        acc = add_bounds(acc, b);
    }
    Some(acc)
}

/// Calculate the bounding box of a circular arc given in Gerber notation
/// (center `(cx, cy)` relative to the first point `(x1, y1)`), without any
/// trigonometric functions.
pub fn arc_bounds(x1: f64, y1: f64, x2: f64, y2: f64, cx: f64, cy: f64, clockwise: bool) -> Bounds {
    // Center arc on (cx, cy).
    let cx = cx + x1;
    let cy = cy + y1;
    let x1 = x1 - cx;
    let x2 = x2 - cx;
    let y1 = y1 - cy;
    let y2 = y2 - cy;

    let r = (x1 * x1 + y1 * y1).sqrt();

    let p1_west = x1 < 0.0;
    let p1_north = y1 > 0.0;
    let p2_west = x2 < 0.0;
    let p2_north = y2 > 0.0;

    let mut min_x = x1.min(x2);
    let mut min_y = y1.min(y2);
    let mut max_x = x1.max(x2);
    let mut max_y = y1.max(y2);

    if p1_west != p2_west {
        if p1_west == clockwise {
            max_y = r;
        } else {
            min_y = -r;
        }
    } else {
        let small_arc_is_north_to_south = y1 > y2;
        let small_arc_is_clockwise = small_arc_is_north_to_south != p1_west;
        if small_arc_is_clockwise != clockwise {
            min_y = -r;
            max_y = r;
        }
    }

    if p1_north != p2_north {
        if p1_north == clockwise {
            max_x = r;
        } else {
            min_x = -r;
        }
    } else {
        let small_arc_is_west_to_east = x1 < x2;
        let small_arc_is_clockwise = small_arc_is_west_to_east == p1_north;
        if small_arc_is_clockwise != clockwise {
            min_x = -r;
            max_x = r;
        }
    }

    ((min_x + cx, min_y + cy), (max_x + cx, max_y + cy))
}

/// Signed distance from `p` to the infinite line through `l1` and `l2`.
pub fn point_line_distance(l1: Point, l2: Point, p: Point) -> f64 {
    let (x1, y1) = l1;
    let (x2, y2) = l2;
    let (x0, y0) = p;
    let length = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt();
    if length.abs() < 1e-12 {
        return ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
    }
    ((x2 - x1) * (y1 - y0) - (x1 - x0) * (y2 - y1)) / length
}

/// Absolute clockwise sweep angle (`0..=2*pi`) of an arc given its center
/// (absolute coordinates) and endpoints (absolute coordinates).
pub fn sweep_angle(cx: f64, cy: f64, x1: f64, y1: f64, x2: f64, y2: f64, clockwise: bool) -> f64 {
    let a1 = (y1 - cy).atan2(x1 - cx);
    let a2 = (y2 - cy).atan2(x2 - cx);
    // Our angle convention is clockwise; atan2 is counter-clockwise, so negate.
    let (a1, a2) = (-a1, -a2);
    let mut sweep = if clockwise { a2 - a1 } else { a1 - a2 };
    sweep = sweep.rem_euclid(std::f64::consts::TAU);
    if sweep.abs() < 1e-9 {
        return std::f64::consts::TAU;
    }
    sweep
}

/// Format an SVG `A` path-data entry for an arc given in Gerber notation
/// (center relative to the first point).
pub fn svg_arc(old: Point, new: Point, center: Point, clockwise: bool) -> String {
    let r = (center.0 * center.0 + center.1 * center.1).sqrt();
    let sweep_flag = if clockwise { 0 } else { 1 };
    let dist = ((new.0 - old.0).powi(2) + (new.1 - old.1).powi(2)).sqrt();
    if dist.abs() < 1e-9 {
        let intermediate = (old.0 + 2.0 * center.0, old.1 + 2.0 * center.1);
        format!(
            "A {r:.6} {r:.6} 0 1 {sweep_flag} {ix:.6} {iy:.6} A {r:.6} {r:.6} 0 1 {sweep_flag} {nx:.6} {ny:.6}",
            ix = intermediate.0,
            iy = intermediate.1,
            nx = new.0,
            ny = new.1,
        )
    } else {
        let d = point_line_distance(old, new, (old.0 + center.0, old.1 + center.1));
        let large_arc = i32::from((d < 0.0) == clockwise);
        format!("A {r:.6} {r:.6} 0 {large_arc} {sweep_flag} {:.6} {:.6}", new.0, new.1)
    }
}

/// Format an SVG `transform="rotate(...)"` attribute value.
pub fn svg_rotation(angle_rad: f64, cx: f64, cy: f64) -> String {
    format!("rotate({:.4} {:.6} {:.6})", angle_rad.to_degrees(), cx, cy)
}

/// Compute the viewBox origin and width/height for an SVG document given a
/// bounding box, margin and units: `(min_x, min_y, width, height)`.
pub fn svg_viewport(bounds: Bounds, margin: f64, arg_unit: Unit, svg_unit: Unit) -> (f64, f64, f64, f64) {
    let ((mut min_x, mut min_y), (mut max_x, mut max_y)) = bounds;
    if margin != 0.0 {
        let margin = arg_unit.convert_to(svg_unit, margin);
        min_x -= margin;
        min_y -= margin;
        max_x += margin;
        max_y += margin;
    }
    let mut w = max_x - min_x;
    let mut h = max_y - min_y;
    if w.abs() < 1e-12 {
        w = 1.0;
    }
    if h.abs() < 1e-12 {
        h = 1.0;
    }
    (min_x, min_y, w, h)
}

/// Convex hull of a point set (monotone chain, Andrew's algorithm), returned
/// in counter-clockwise order starting from the lowest-leftmost point.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points.to_vec();
    pts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    fn cross(o: Point, a: Point, b: Point) -> f64 {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    }

    let mut lower = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rotate_point_quarter_turn_clockwise() {
        let (x, y) = rotate_point(1.0, 0.0, std::f64::consts::FRAC_PI_2, 0.0, 0.0);
        assert!((x - 0.0).abs() < 1e-9);
        assert!((y - -1.0).abs() < 1e-9);
    }

    #[test]
    fn arc_bounds_quarter_circle() {
        // Arc from (1,0) to (0,1) around (0,0), counter-clockwise: quarter circle
        // in the north-east quadrant, so bounds are ((0,0),(1,1)).
        let bounds = arc_bounds(1.0, 0.0, 0.0, 1.0, -1.0, 0.0, false);
        let ((min_x, min_y), (max_x, max_y)) = bounds;
        assert!((min_x - 0.0).abs() < 1e-9);
        assert!((min_y - 0.0).abs() < 1e-9);
        assert!((max_x - 1.0).abs() < 1e-9);
        assert!((max_y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn convex_hull_of_square_is_its_corners() {
        let pts = vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.5, 0.5)];
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
    }

    #[test]
    fn sweep_angle_quarter_turn() {
        let a = sweep_angle(0.0, 0.0, 1.0, 0.0, 0.0, 1.0, false);
        assert!((a - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }
}
