//! High-level graphic objects: flashes, lines, arcs and regions, as they
//! appear inside a [`crate::gerber::GerberFile`] or
//! [`crate::excellon::ExcellonFile`].

use crate::apertures::Aperture;
use crate::attribute::AttributeDict;
use crate::geometry::{self, add_bounds, sum_bounds, Bounds, InterpMode, Point};
use crate::graphic_primitives::GraphicPrimitive;
use crate::units::{FileSettings, Unit};

/// Minimal interface a Gerber serializer must provide so graphic objects can
/// emit their own statements without owning the rest of the file's state.
/// Implemented by `crate::gerber::GraphicsState`.
pub trait GerberSink {
    fn file_settings(&self) -> FileSettings;
    fn set_polarity(&mut self, dark: bool) -> Vec<String>;
    fn set_aperture(&mut self, aperture: &Aperture) -> Vec<String>;
    fn set_interpolation_mode(&mut self, mode: InterpMode) -> Vec<String>;
    fn interpolation_mode_statement(&self) -> String;
    fn set_current_point(&mut self, point: Point, unit: Unit) -> Vec<String>;
    fn update_point(&mut self, x: f64, y: f64, unit: Unit);
    /// Emit `%TO...%` statements for `attrs`, one per attribute, ahead of
    /// the object's operation statement.
    fn set_object_attrs(&mut self, attrs: &AttributeDict) -> Vec<String>;
}

/// Minimal interface an Excellon serializer must provide. Implemented by
/// `crate::excellon::ExcellonContext`.
pub trait ExcellonSink {
    fn settings(&self) -> FileSettings;
    fn select_tool(&mut self, tool: &Aperture) -> Vec<String>;
    fn drill_mode(&mut self) -> Vec<String>;
    fn route_mode(&mut self, unit: Unit, x: f64, y: f64) -> Vec<String>;
    fn set_current_point(&mut self, unit: Unit, x: f64, y: f64);
}

/// One drawable element of a layer: a stamped aperture, a straight or
/// circular stroke, or a filled region.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphicObject {
    Flash { x: f64, y: f64, aperture: Aperture, unit: Unit, polarity_dark: bool, attrs: AttributeDict },
    Line { x1: f64, y1: f64, x2: f64, y2: f64, aperture: Option<Aperture>, unit: Unit, polarity_dark: bool, attrs: AttributeDict },
    Arc {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        /// Center relative to `(x1, y1)`.
        cx: f64,
        cy: f64,
        clockwise: bool,
        aperture: Option<Aperture>,
        unit: Unit,
        polarity_dark: bool,
        attrs: AttributeDict,
    },
    Region { outline: Vec<Point>, arc_centers: Vec<Option<(bool, Point)>>, unit: Unit, polarity_dark: bool, attrs: AttributeDict },
}

impl GraphicObject {
    pub fn unit(&self) -> Unit {
        match self {
            GraphicObject::Flash { unit, .. }
            | GraphicObject::Line { unit, .. }
            | GraphicObject::Arc { unit, .. }
            | GraphicObject::Region { unit, .. } => *unit,
        }
    }

    pub fn polarity_dark(&self) -> bool {
        match self {
            GraphicObject::Flash { polarity_dark, .. }
            | GraphicObject::Line { polarity_dark, .. }
            | GraphicObject::Arc { polarity_dark, .. }
            | GraphicObject::Region { polarity_dark, .. } => *polarity_dark,
        }
    }

    /// `%TO%` object attributes active when this object was created.
    pub fn attrs(&self) -> &AttributeDict {
        match self {
            GraphicObject::Flash { attrs, .. }
            | GraphicObject::Line { attrs, .. }
            | GraphicObject::Arc { attrs, .. }
            | GraphicObject::Region { attrs, .. } => attrs,
        }
    }

    pub fn attrs_mut(&mut self) -> &mut AttributeDict {
        match self {
            GraphicObject::Flash { attrs, .. }
            | GraphicObject::Line { attrs, .. }
            | GraphicObject::Arc { attrs, .. }
            | GraphicObject::Region { attrs, .. } => attrs,
        }
    }

    pub fn converted(&self, unit: Unit) -> GraphicObject {
        let from = self.unit();
        if from == unit {
            return self.clone();
        }
        let conv = |v: f64| from.convert_to(unit, v);
        match self.clone() {
            GraphicObject::Flash { x, y, aperture, polarity_dark, attrs, .. } => {
                GraphicObject::Flash { x: conv(x), y: conv(y), aperture, unit, polarity_dark, attrs }
            }
            GraphicObject::Line { x1, y1, x2, y2, aperture, polarity_dark, attrs, .. } => GraphicObject::Line {
                x1: conv(x1),
                y1: conv(y1),
                x2: conv(x2),
                y2: conv(y2),
                aperture,
                unit,
                polarity_dark,
                attrs,
            },
            GraphicObject::Arc { x1, y1, x2, y2, cx, cy, clockwise, aperture, polarity_dark, attrs, .. } => GraphicObject::Arc {
                x1: conv(x1),
                y1: conv(y1),
                x2: conv(x2),
                y2: conv(y2),
                cx: conv(cx),
                cy: conv(cy),
                clockwise,
                aperture,
                unit,
                polarity_dark,
                attrs,
            },
            GraphicObject::Region { outline, arc_centers, polarity_dark, attrs, .. } => GraphicObject::Region {
                outline: outline.iter().map(|&(x, y)| (conv(x), conv(y))).collect(),
                arc_centers: arc_centers
                    .iter()
                    .map(|a| a.map(|(cw, (cx, cy))| (cw, (conv(cx), conv(cy)))))
                    .collect(),
                unit,
                polarity_dark,
                attrs,
            },
        }
    }

    pub fn offset(&mut self, dx: f64, dy: f64, unit: Unit) {
        let (dx, dy) = (unit.convert_to(self.unit(), dx), unit.convert_to(self.unit(), dy));
        match self {
            GraphicObject::Flash { x, y, .. } => {
                *x += dx;
                *y += dy;
            }
            GraphicObject::Line { x1, y1, x2, y2, .. } => {
                *x1 += dx;
                *y1 += dy;
                *x2 += dx;
                *y2 += dy;
            }
            GraphicObject::Arc { x1, y1, x2, y2, .. } => {
                *x1 += dx;
                *y1 += dy;
                *x2 += dx;
                *y2 += dy;
            }
            GraphicObject::Region { outline, .. } => {
                for p in outline.iter_mut() {
                    p.0 += dx;
                    p.1 += dy;
                }
            }
        }
    }

    pub fn scale(&mut self, factor: f64) {
        match self {
            GraphicObject::Flash { x, y, .. } => {
                *x *= factor;
                *y *= factor;
            }
            GraphicObject::Line { x1, y1, x2, y2, .. } => {
                *x1 *= factor;
                *y1 *= factor;
                *x2 *= factor;
                *y2 *= factor;
            }
            GraphicObject::Arc { x1, y1, x2, y2, cx, cy, .. } => {
                *x1 *= factor;
                *y1 *= factor;
                *x2 *= factor;
                *y2 *= factor;
                *cx *= factor;
                *cy *= factor;
            }
            GraphicObject::Region { outline, arc_centers, .. } => {
                for p in outline.iter_mut() {
                    p.0 *= factor;
                    p.1 *= factor;
                }
                for a in arc_centers.iter_mut() {
                    if let Some((_, center)) = a {
                        center.0 *= factor;
                        center.1 *= factor;
                    }
                }
            }
        }
    }

    /// Rotate clockwise by `rotation` radians around `(cx, cy)` (in this
    /// object's unit).
    pub fn rotate(&mut self, rotation: f64, cx: f64, cy: f64) {
        match self {
            GraphicObject::Flash { x, y, .. } => {
                let p = geometry::rotate_point(*x, *y, rotation, cx, cy);
                (*x, *y) = p;
            }
            GraphicObject::Line { x1, y1, x2, y2, .. } => {
                (*x1, *y1) = geometry::rotate_point(*x1, *y1, rotation, cx, cy);
                (*x2, *y2) = geometry::rotate_point(*x2, *y2, rotation, cx, cy);
            }
            GraphicObject::Arc { x1, y1, x2, y2, cx: acx, cy: acy, .. } => {
                let center = (*acx + *x1, *acy + *y1);
                let new_center = geometry::rotate_point(center.0, center.1, rotation, cx, cy);
                (*x1, *y1) = geometry::rotate_point(*x1, *y1, rotation, cx, cy);
                (*x2, *y2) = geometry::rotate_point(*x2, *y2, rotation, cx, cy);
                *acx = new_center.0 - *x1;
                *acy = new_center.1 - *y1;
            }
            GraphicObject::Region { outline, arc_centers, .. } => {
                for p in outline.iter_mut() {
                    *p = geometry::rotate_point(p.0, p.1, rotation, cx, cy);
                }
                for a in arc_centers.iter_mut() {
                    if let Some((_, center)) = a {
                        *center = geometry::rotate_point(center.0, center.1, rotation, cx, cy);
                    }
                }
            }
        }
    }

    pub fn to_primitives(&self, unit: Unit) -> Vec<GraphicPrimitive> {
        let conv = self.converted(unit);
        match conv {
            GraphicObject::Flash { x, y, aperture, polarity_dark, .. } => {
                aperture.flash(x, y, unit, polarity_dark).unwrap_or_default()
            }
            GraphicObject::Line { x1, y1, x2, y2, aperture, polarity_dark, .. } => {
                let width = aperture.as_ref().map(|a| a.equivalent_width(unit).unwrap_or(0.1)).unwrap_or(0.1);
                vec![GraphicPrimitive::Line { x1, y1, x2, y2, width, polarity_dark }]
            }
            GraphicObject::Arc { x1, y1, x2, y2, cx, cy, clockwise, aperture, polarity_dark, .. } => {
                let width = aperture.as_ref().map(|a| a.equivalent_width(unit).unwrap_or(0.0)).unwrap_or(0.0);
                vec![GraphicPrimitive::Arc { x1, y1, x2, y2, cx: cx + x1, cy: cy + y1, clockwise, width, polarity_dark }]
            }
            GraphicObject::Region { outline, arc_centers, polarity_dark, .. } => {
                vec![GraphicPrimitive::ArcPoly { outline, arc_centers: Some(arc_centers), polarity_dark }]
            }
        }
    }

    pub fn bounding_box(&self, unit: Unit) -> Bounds {
        sum_bounds(self.to_primitives(unit).iter().map(|p| p.bounding_box())).unwrap_or(((0.0, 0.0), (0.0, 0.0)))
    }

    pub fn to_statements(&self, gs: &mut dyn GerberSink) -> Vec<String> {
        let mut out = Vec::new();
        let settings = gs.file_settings();
        match self {
            GraphicObject::Flash { x, y, aperture, unit, polarity_dark, attrs } => {
                out.extend(gs.set_polarity(*polarity_dark));
                out.extend(gs.set_aperture(aperture));
                out.extend(gs.set_object_attrs(attrs));
                out.push(format!(
                    "X{}Y{}D03*",
                    settings.write_gerber_value(*x).unwrap_or_default(),
                    settings.write_gerber_value(*y).unwrap_or_default()
                ));
                gs.update_point(*x, *y, *unit);
            }
            GraphicObject::Line { x1, y1, x2, y2, aperture, unit, polarity_dark, attrs } => {
                out.extend(gs.set_polarity(*polarity_dark));
                if let Some(ap) = aperture {
                    out.extend(gs.set_aperture(ap));
                }
                out.extend(gs.set_object_attrs(attrs));
                out.extend(gs.set_interpolation_mode(InterpMode::Linear));
                out.extend(gs.set_current_point((*x1, *y1), *unit));
                out.push(format!(
                    "X{}Y{}D01*",
                    settings.write_gerber_value(*x2).unwrap_or_default(),
                    settings.write_gerber_value(*y2).unwrap_or_default()
                ));
                gs.update_point(*x2, *y2, *unit);
            }
            GraphicObject::Arc { x1, y1, x2, y2, cx, cy, clockwise, aperture, unit, polarity_dark, attrs } => {
                out.extend(gs.set_polarity(*polarity_dark));
                if let Some(ap) = aperture {
                    out.extend(gs.set_aperture(ap));
                }
                out.extend(gs.set_object_attrs(attrs));
                out.extend(gs.set_interpolation_mode(if *clockwise { InterpMode::CircularCw } else { InterpMode::CircularCcw }));
                out.extend(gs.set_current_point((*x1, *y1), *unit));
                out.push(format!(
                    "X{}Y{}I{}J{}D01*",
                    settings.write_gerber_value(*x2).unwrap_or_default(),
                    settings.write_gerber_value(*y2).unwrap_or_default(),
                    settings.write_gerber_value(*cx).unwrap_or_default(),
                    settings.write_gerber_value(*cy).unwrap_or_default()
                ));
                gs.update_point(*x2, *y2, *unit);
            }
            GraphicObject::Region { outline, arc_centers, unit, polarity_dark, attrs } => {
                if outline.len() < 3 {
                    return out;
                }
                out.extend(gs.set_polarity(*polarity_dark));
                out.extend(gs.set_object_attrs(attrs));
                out.push("G36*".to_string());
                out.push(format!("{}*", gs.interpolation_mode_statement()));
                out.extend(gs.set_current_point(outline[0], *unit));

                let mut prev = outline[0];
                for (i, &point) in outline.iter().enumerate().skip(1) {
                    let arc = arc_centers.get(i - 1).copied().flatten();
                    let x = settings.write_gerber_value(point.0).unwrap_or_default();
                    let y = settings.write_gerber_value(point.1).unwrap_or_default();
                    match arc {
                        None => {
                            out.extend(gs.set_interpolation_mode(InterpMode::Linear));
                            out.push(format!("X{x}Y{y}D01*"));
                        }
                        Some((clockwise, center)) => {
                            out.extend(gs.set_interpolation_mode(if clockwise { InterpMode::CircularCw } else { InterpMode::CircularCcw }));
                            let i_off = settings.write_gerber_value(center.0 - prev.0).unwrap_or_default();
                            let j_off = settings.write_gerber_value(center.1 - prev.1).unwrap_or_default();
                            out.push(format!("X{x}Y{y}I{i_off}J{j_off}D01*"));
                        }
                    }
                    gs.update_point(point.0, point.1, *unit);
                    prev = point;
                }
                out.push("G37*".to_string());
            }
        }
        out
    }

    pub fn to_xnc(&self, ctx: &mut dyn ExcellonSink) -> Vec<String> {
        let mut out = Vec::new();
        let settings = ctx.settings();
        match self {
            GraphicObject::Flash { x, y, aperture, unit, .. } => {
                out.extend(ctx.select_tool(aperture));
                out.extend(ctx.drill_mode());
                out.push(format!(
                    "X{}Y{}",
                    settings.write_excellon_value(*x),
                    settings.write_excellon_value(*y)
                ));
                ctx.set_current_point(*unit, *x, *y);
            }
            GraphicObject::Line { x1, y1, x2, y2, aperture, unit, .. } => {
                if let Some(ap) = aperture {
                    out.extend(ctx.select_tool(ap));
                }
                out.extend(ctx.route_mode(*unit, *x1, *y1));
                out.push(format!(
                    "G01X{}Y{}",
                    settings.write_excellon_value(*x2),
                    settings.write_excellon_value(*y2)
                ));
                ctx.set_current_point(*unit, *x2, *y2);
            }
            GraphicObject::Arc { x1, y1, x2, y2, cx, cy, clockwise, aperture, unit, .. } => {
                if let Some(ap) = aperture {
                    out.extend(ctx.select_tool(ap));
                }
                out.extend(ctx.route_mode(*unit, *x1, *y1));
                let code = if *clockwise { "G02" } else { "G03" };
                out.push(format!(
                    "{code}X{}Y{}I{}J{}",
                    settings.write_excellon_value(*x2),
                    settings.write_excellon_value(*y2),
                    settings.write_excellon_value(*cx),
                    settings.write_excellon_value(*cy)
                ));
                ctx.set_current_point(*unit, *x2, *y2);
            }
            GraphicObject::Region { .. } => {}
        }
        out
    }

    /// Path length contribution for Excellon route statistics. Flashes
    /// contribute zero.
    pub fn curve_length(&self, unit: Unit) -> f64 {
        let from = self.unit();
        match self {
            GraphicObject::Flash { .. } | GraphicObject::Region { .. } => 0.0,
            GraphicObject::Line { x1, y1, x2, y2, .. } => {
                from.convert_to(unit, ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt())
            }
            GraphicObject::Arc { x1, y1, x2, y2, cx, cy, clockwise, .. } => {
                let sweep = geometry::sweep_angle(cx + x1, cy + y1, *x1, *y1, *x2, *y2, *clockwise);
                from.convert_to(unit, (cx.powi(2) + cy.powi(2)).sqrt() * sweep)
            }
        }
    }

    /// `Arc`-only: deviation (in `unit`) between the radius to the start
    /// point and to the end point — an "impossible" arc has a nonzero value.
    pub fn numeric_error(&self, unit: Unit) -> Option<f64> {
        match self.converted(unit) {
            GraphicObject::Arc { x1, y1, x2, y2, cx, cy, .. } => {
                let (ccx, ccy) = (cx + x1, cy + y1);
                let r1 = ((ccx - x1).powi(2) + (ccy - y1).powi(2)).sqrt();
                let r2 = ((ccx - x2).powi(2) + (ccy - y2).powi(2)).sqrt();
                Some((r1 - r2).abs())
            }
            _ => None,
        }
    }

    /// `Arc`-only: absolute clockwise sweep angle in `0..=2*pi`.
    pub fn sweep_angle(&self) -> Option<f64> {
        match self {
            GraphicObject::Arc { x1, y1, x2, y2, cx, cy, clockwise, .. } => {
                Some(geometry::sweep_angle(cx + x1, cy + y1, *x1, *y1, *x2, *y2, *clockwise))
            }
            _ => None,
        }
    }

    /// `Arc`-only: flatten to a polyline of `Line`s within `max_error` (in
    /// `unit`) using a fixed-step subdivision by sweep angle.
    pub fn approximate(&self, max_error: f64, unit: Unit) -> Vec<GraphicObject> {
        let GraphicObject::Arc { x1, y1, x2, y2, cx, cy, clockwise, aperture, unit: self_unit, polarity_dark, attrs } = self.clone() else {
            return vec![self.clone()];
        };
        let max_error = unit.convert_to(self_unit, max_error).max(1e-9);
        let r = (cx * cx + cy * cy).sqrt();
        let sweep = geometry::sweep_angle(cx + x1, cy + y1, x1, y1, x2, y2, clockwise);
        if r < 1e-9 || sweep.abs() < 1e-9 {
            return vec![GraphicObject::Line { x1, y1, x2, y2, aperture, unit: self_unit, polarity_dark, attrs }];
        }
        // Chord error for a segment spanning angle `theta` on radius `r` is r*(1-cos(theta/2)).
        let max_step = 2.0 * (1.0 - (max_error / r).min(1.0)).acos().max(1e-3);
        let steps = ((sweep / max_step).ceil() as usize).max(1);
        let (abs_cx, abs_cy) = (cx + x1, cy + y1);
        let start_angle = (y1 - abs_cy).atan2(x1 - abs_cx);
        let mut points = Vec::with_capacity(steps + 1);
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let delta = if clockwise { -sweep * t } else { sweep * t };
            let a = start_angle + delta;
            points.push((abs_cx + a.cos() * r, abs_cy + a.sin() * r));
        }
        points
            .windows(2)
            .map(|w| GraphicObject::Line {
                x1: w[0].0,
                y1: w[0].1,
                x2: w[1].0,
                y2: w[1].1,
                aperture: aperture.clone(),
                unit: self_unit,
                polarity_dark,
                attrs: attrs.clone(),
            })
            .collect()
    }

    /// `Arc`-only: closed single-segment region containing just this arc.
    pub fn to_region(&self) -> Option<GraphicObject> {
        match self {
            GraphicObject::Arc { x1, y1, x2, y2, cx, cy, clockwise, unit, polarity_dark, attrs, .. } => {
                let mut outline = vec![(*x1, *y1), (*x2, *y2)];
                let mut arc_centers = vec![Some((*clockwise, (cx + x1, cy + y1)))];
                if outline[0] != *outline.last().unwrap() {
                    outline.push(outline[0]);
                    arc_centers.push(None);
                }
                Some(GraphicObject::Region { outline, arc_centers, unit: *unit, polarity_dark: *polarity_dark, attrs: attrs.clone() })
            }
            _ => None,
        }
    }
}

/// Region-building helpers split out of the enum since they mutate
/// `Region`'s fields in ways the other variants don't need.
impl GraphicObject {
    pub fn new_region(unit: Unit, polarity_dark: bool) -> GraphicObject {
        GraphicObject::Region { outline: Vec::new(), arc_centers: Vec::new(), unit, polarity_dark, attrs: AttributeDict::new() }
    }

    /// Close the outline by duplicating the first point if necessary.
    pub fn close_region(&mut self) {
        if let GraphicObject::Region { outline, arc_centers, .. } = self {
            if let (Some(&first), Some(&last)) = (outline.first(), outline.last()) {
                if first != last {
                    outline.push(last);
                    if !arc_centers.is_empty() {
                        arc_centers.push(None);
                    }
                }
            }
        }
    }

    /// Append a `Line` or `Arc` segment onto this region's outline.
    pub fn append_segment(&mut self, segment: &GraphicObject) {
        let GraphicObject::Region { outline, arc_centers, unit, .. } = self else { return };
        let seg = segment.converted(*unit);
        match seg {
            GraphicObject::Line { x1, y1, x2, y2, .. } => {
                if outline.is_empty() {
                    outline.push((x1, y1));
                }
                outline.push((x2, y2));
                arc_centers.push(None);
            }
            GraphicObject::Arc { x1, y1, x2, y2, cx, cy, clockwise, .. } => {
                if outline.is_empty() {
                    outline.push((x1, y1));
                }
                outline.push((x2, y2));
                arc_centers.push(Some((clockwise, (cx + x1, cy + y1))));
            }
            _ => {}
        }
    }

    /// Iterate `(p1, p2, arc)` segments, closing the outline implicitly if
    /// the last point doesn't already equal the first.
    pub fn region_segments(&self) -> Vec<(Point, Point, Option<(bool, Point)>)> {
        let GraphicObject::Region { outline, arc_centers, .. } = self else { return Vec::new() };
        if outline.len() < 2 {
            return Vec::new();
        }
        let mut segs: Vec<(Point, Point, Option<(bool, Point)>)> = outline
            .windows(2)
            .enumerate()
            .map(|(i, w)| (w[0], w[1], arc_centers.get(i).copied().flatten()))
            .collect();
        let (first, last) = (outline[0], *outline.last().unwrap());
        if ((first.0 - last.0).powi(2) + (first.1 - last.1).powi(2)).sqrt() > 1e-6 {
            segs.push((last, first, None));
        }
        segs
    }

    pub fn region_bounds(&self, unit: Unit) -> Option<Bounds> {
        if let GraphicObject::Region { .. } = self {
            let prims = self.to_primitives(unit);
            sum_bounds(prims.iter().map(|p| p.bounding_box()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn line_curve_length_is_euclidean_distance() {
        let line = GraphicObject::Line {
            x1: 0.0,
            y1: 0.0,
            x2: 3.0,
            y2: 4.0,
            aperture: None,
            unit: Unit::Millimeter,
            polarity_dark: true,
            attrs: AttributeDict::new(),
        };
        assert!((line.curve_length(Unit::Millimeter) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn quarter_circle_sweep_angle() {
        let arc = GraphicObject::Arc {
            x1: 1.0,
            y1: 0.0,
            x2: 0.0,
            y2: 1.0,
            cx: -1.0,
            cy: 0.0,
            clockwise: false,
            aperture: None,
            unit: Unit::Millimeter,
            polarity_dark: true,
            attrs: AttributeDict::new(),
        };
        let sweep = arc.sweep_angle().unwrap();
        assert!((sweep - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn region_closes_open_outline() {
        let mut region = GraphicObject::new_region(Unit::Millimeter, true);
        if let GraphicObject::Region { outline, .. } = &mut region {
            outline.push((0.0, 0.0));
            outline.push((1.0, 0.0));
            outline.push((1.0, 1.0));
        }
        region.close_region();
        if let GraphicObject::Region { outline, .. } = &region {
            assert_eq!(outline.first(), outline.last());
        } else {
            panic!("expected region");
        }
    }

    #[test]
    fn arc_approximate_produces_connected_polyline() {
        let arc = GraphicObject::Arc {
            x1: 1.0,
            y1: 0.0,
            x2: -1.0,
            y2: 0.0,
            cx: -1.0,
            cy: 0.0,
            clockwise: false,
            aperture: None,
            unit: Unit::Millimeter,
            polarity_dark: true,
            attrs: AttributeDict::new(),
        };
        let lines = arc.approximate(0.01, Unit::Millimeter);
        assert!(lines.len() > 1);
    }
}
