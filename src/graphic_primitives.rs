//! Flattened rendering primitives that graphic objects and apertures
//! expand into.

use crate::geometry::{self, add_bounds, arc_bounds, svg_arc, svg_rotation, Bounds, Point};

fn prec(x: f64) -> String {
    format!("{x:.6}")
}

/// One flattened shape ready for SVG emission.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphicPrimitive {
    Circle { x: f64, y: f64, r: f64, polarity_dark: bool },
    /// Polygon whose sides may be straight lines or circular arcs.
    /// `arc_centers[i]`, if present, is `(clockwise, center)` for the
    /// segment from `outline[i]` to `outline[(i+1) % n]`.
    ArcPoly { outline: Vec<Point>, arc_centers: Option<Vec<Option<(bool, Point)>>>, polarity_dark: bool },
    /// Straight line with round end caps.
    Line { x1: f64, y1: f64, x2: f64, y2: f64, width: f64, polarity_dark: bool },
    /// Circular arc with line width, absolute endpoints, center relative to
    /// the start point.
    Arc { x1: f64, y1: f64, x2: f64, y2: f64, cx: f64, cy: f64, clockwise: bool, width: f64, polarity_dark: bool },
    /// Axis-aligned-before-rotation rectangle, centered at `(x, y)`.
    Rectangle { x: f64, y: f64, w: f64, h: f64, rotation: f64, polarity_dark: bool },
}

impl GraphicPrimitive {
    pub fn polarity_dark(&self) -> bool {
        match self {
            GraphicPrimitive::Circle { polarity_dark, .. }
            | GraphicPrimitive::ArcPoly { polarity_dark, .. }
            | GraphicPrimitive::Line { polarity_dark, .. }
            | GraphicPrimitive::Arc { polarity_dark, .. }
            | GraphicPrimitive::Rectangle { polarity_dark, .. } => *polarity_dark,
        }
    }

    pub fn bounding_box(&self) -> Bounds {
        match self {
            GraphicPrimitive::Circle { x, y, r, .. } => ((x - r, y - r), (x + r, y + r)),
            GraphicPrimitive::ArcPoly { outline, arc_centers, .. } => arc_poly_bounds(outline, arc_centers.as_deref()),
            GraphicPrimitive::Line { x1, y1, x2, y2, width, .. } => {
                let r = width / 2.0;
                add_bounds(
                    ((x1 - r, y1 - r), (x1 + r, y1 + r)),
                    ((x2 - r, y2 - r), (x2 + r, y2 + r)),
                )
            }
            GraphicPrimitive::Arc { x1, y1, x2, y2, cx, cy, clockwise, width, .. } => {
                let r = width / 2.0;
                let endpoints = add_bounds(
                    ((x1 - r, y1 - r), (x1 + r, y1 + r)),
                    ((x2 - r, y2 - r), (x2 + r, y2 + r)),
                );
                let arc_r = ((cx.powi(2)) + (cy.powi(2))).sqrt();
                // Extend the C->P1 / C->P2 lines by width/2 along the radius.
                let (abs_cx, abs_cy) = (x1 + cx, y1 + cy);
                let (d1x, d1y) = (x1 - abs_cx, y1 - abs_cy);
                let (nx1, ny1) = (x1 + d1x / arc_r * r, y1 + d1y / arc_r * r);
                let (d2x, d2y) = (x2 - abs_cx, y2 - abs_cy);
                let (nx2, ny2) = (x2 + d2x / arc_r * r, y2 + d2y / arc_r * r);
                let arc = arc_bounds(nx1, ny1, nx2, ny2, abs_cx - nx1, abs_cy - ny1, *clockwise);
                add_bounds(endpoints, arc)
            }
            GraphicPrimitive::Rectangle { .. } => self.to_arc_poly().bounding_box(),
        }
    }

    /// Convert a gerber obround to a `Line` primitive.
    pub fn line_from_obround(x: f64, y: f64, w: f64, h: f64, rotation: f64, polarity_dark: bool) -> GraphicPrimitive {
        let (width, a, b) = if w > h { (h, w - h, 0.0) } else { (w, 0.0, h - w) };
        let (x1, y1) = geometry::rotate_point(x - a / 2.0, y - b / 2.0, rotation, x, y);
        let (x2, y2) = geometry::rotate_point(x + a / 2.0, y + b / 2.0, rotation, x, y);
        GraphicPrimitive::Line { x1, y1, x2, y2, width, polarity_dark }
    }

    pub fn from_regular_polygon(x: f64, y: f64, r: f64, n: u32, rotation: f64, polarity_dark: bool) -> GraphicPrimitive {
        let delta = std::f64::consts::TAU / n as f64;
        let outline = (0..n)
            .map(|i| {
                let a = rotation + i as f64 * delta;
                (x + a.cos() * r, y + a.sin() * r)
            })
            .collect();
        GraphicPrimitive::ArcPoly { outline, arc_centers: None, polarity_dark }
    }

    fn to_arc_poly(&self) -> GraphicPrimitive {
        match self {
            GraphicPrimitive::Rectangle { x, y, w, h, rotation, polarity_dark } => {
                let (s, c) = rotation.sin_cos();
                let (sw, cw) = (s * w / 2.0, c * w / 2.0);
                let (sh, ch) = (s * h / 2.0, c * h / 2.0);
                let outline = vec![
                    (x - (cw + sh), y - (ch + sw)),
                    (x - (cw + sh), y + (ch + sw)),
                    (x + (cw + sh), y + (ch + sw)),
                    (x + (cw + sh), y - (ch + sw)),
                ];
                GraphicPrimitive::ArcPoly { outline, arc_centers: None, polarity_dark: *polarity_dark }
            }
            other => other.clone(),
        }
    }

    pub fn to_svg(&self, fg: &str, bg: &str) -> String {
        let color = |dark: bool| if dark { fg } else { bg };
        match self {
            GraphicPrimitive::Circle { x, y, r, polarity_dark } => format!(
                "<circle cx=\"{}\" cy=\"{}\" r=\"{}\" style=\"fill: {}\"/>",
                prec(*x), prec(*y), prec(*r), color(*polarity_dark)
            ),
            GraphicPrimitive::ArcPoly { outline, arc_centers, polarity_dark } => {
                let d = arc_poly_path(outline, arc_centers.as_deref());
                format!("<path d=\"{d}\" style=\"fill: {}\"/>", color(*polarity_dark))
            }
            GraphicPrimitive::Line { x1, y1, x2, y2, width, polarity_dark } => {
                let width_str = if width.abs() < 1e-12 { "0.01mm".to_string() } else { prec(*width) };
                format!(
                    "<path d=\"M {} {} L {} {}\" style=\"fill: none; stroke: {}; stroke-width: {}; stroke-linecap: round\"/>",
                    prec(*x1), prec(*y1), prec(*x2), prec(*y2), color(*polarity_dark), width_str
                )
            }
            GraphicPrimitive::Arc { x1, y1, x2, y2, cx, cy, clockwise, width, polarity_dark } => {
                let arc = svg_arc((*x1, *y1), (*x2, *y2), (*cx, *cy), *clockwise);
                let width_str = if width.abs() < 1e-12 { "0.01mm".to_string() } else { prec(*width) };
                format!(
                    "<path d=\"M {} {} {}\" style=\"fill: none; stroke: {}; stroke-width: {}; stroke-linecap: round; fill: none\"/>",
                    prec(*x1), prec(*y1), arc, color(*polarity_dark), width_str
                )
            }
            GraphicPrimitive::Rectangle { x, y, w, h, rotation, polarity_dark } => {
                let (rx, ry) = (x - w / 2.0, y - h / 2.0);
                format!(
                    "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" transform=\"{}\" style=\"fill: {}\"/>",
                    prec(rx), prec(ry), prec(*w), prec(*h), svg_rotation(*rotation, *x, *y), color(*polarity_dark)
                )
            }
        }
    }
}

fn arc_poly_segments(outline: &[Point], arc_centers: Option<&[Option<(bool, Point)>]>) -> Vec<(Point, Point, Option<(bool, Point)>)> {
    let n = outline.len();
    (0..n)
        .map(|i| {
            let p1 = outline[i];
            let p2 = outline[(i + 1) % n];
            let arc = arc_centers.and_then(|a| a.get(i).copied().flatten());
            (p1, p2, arc)
        })
        .collect()
}

fn arc_poly_bounds(outline: &[Point], arc_centers: Option<&[Option<(bool, Point)>]>) -> Bounds {
    let mut bbox: Option<Bounds> = None;
    for (p1, p2, arc) in arc_poly_segments(outline, arc_centers) {
        let seg_bounds = match arc {
            Some((clockwise, (cx, cy))) => arc_bounds(p1.0, p1.1, p2.0, p2.1, cx, cy, clockwise),
            None => ((p1.0.min(p2.0), p1.1.min(p2.1)), (p1.0.max(p2.0), p1.1.max(p2.1))),
        };
        bbox = Some(match bbox {
            None => seg_bounds,
            Some(b) => add_bounds(b, seg_bounds),
        });
    }
    bbox.unwrap_or(((0.0, 0.0), (0.0, 0.0)))
}

fn arc_poly_path(outline: &[Point], arc_centers: Option<&[Option<(bool, Point)>]>) -> String {
    if outline.is_empty() {
        return String::new();
    }
    let mut parts = vec![format!("M {:.6} {:.6}", outline[0].0, outline[0].1)];
    for (p1, p2, arc) in arc_poly_segments(outline, arc_centers) {
        match arc {
            None => parts.push(format!("L {:.6} {:.6}", p2.0, p2.1)),
            Some((clockwise, center)) => parts.push(svg_arc(p1, p2, center, clockwise)),
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn circle_bounding_box() {
        let c = GraphicPrimitive::Circle { x: 1.0, y: 1.0, r: 2.0, polarity_dark: true };
        assert_eq!(c.bounding_box(), ((-1.0, -1.0), (3.0, 3.0)));
    }

    #[test]
    fn line_to_svg_contains_stroke() {
        let l = GraphicPrimitive::Line { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0, width: 0.2, polarity_dark: true };
        assert!(l.to_svg("black", "white").contains("stroke-linecap: round"));
    }

    #[test]
    fn regular_polygon_has_n_points() {
        let p = GraphicPrimitive::from_regular_polygon(0.0, 0.0, 1.0, 6, 0.0, true);
        if let GraphicPrimitive::ArcPoly { outline, .. } = p {
            assert_eq!(outline.len(), 6);
        } else {
            panic!("expected ArcPoly");
        }
    }
}
