//! Aperture-macro primitive shapes.

use std::collections::HashMap;

use crate::expression::{Expression, UnitExpression};
use crate::graphic_primitives::GraphicPrimitive;
use crate::units::Unit;
use crate::GerberError;

fn deg_to_rad(a: f64) -> f64 {
    a.to_radians()
}

/// One aperture-macro primitive block. The integer in each variant's Gerber
/// `to_gerber()` output is its declaration code (1 circle, 20/2 vector line,
/// 21 centered rectangle, 4 outline, 5 polygon, 6 moiré, 7 thermal, 0
/// comment).
#[derive(Debug, Clone, PartialEq)]
pub enum MacroPrimitive {
    Comment(String),
    Circle {
        exposure: Expression,
        diameter: UnitExpression,
        x: UnitExpression,
        y: UnitExpression,
        rotation: Expression,
    },
    VectorLine {
        exposure: Expression,
        width: UnitExpression,
        start: (UnitExpression, UnitExpression),
        end: (UnitExpression, UnitExpression),
        rotation: Expression,
    },
    CenterLine {
        exposure: Expression,
        width: UnitExpression,
        height: UnitExpression,
        x: UnitExpression,
        y: UnitExpression,
        rotation: Expression,
    },
    Polygon {
        exposure: Expression,
        n_vertices: Expression,
        x: UnitExpression,
        y: UnitExpression,
        diameter: UnitExpression,
        rotation: Expression,
    },
    Moire {
        x: UnitExpression,
        y: UnitExpression,
        d_outer: UnitExpression,
        line_thickness: UnitExpression,
        gap_w: UnitExpression,
        num_circles: Expression,
        crosshair_thickness: UnitExpression,
        crosshair_length: UnitExpression,
        rotation: Expression,
    },
    Thermal {
        x: UnitExpression,
        y: UnitExpression,
        d_outer: UnitExpression,
        d_inner: UnitExpression,
        gap_w: UnitExpression,
        rotation: Expression,
    },
    Outline {
        exposure: Expression,
        /// (x, y) pairs; first and last point are equal (closed outline).
        coords: Vec<(UnitExpression, UnitExpression)>,
        rotation: Expression,
    },
}

fn calc(expr: &Expression, binding: &HashMap<u32, f64>) -> Result<f64, GerberError> {
    expr.calculate(binding)
}

fn calc_u(expr: &UnitExpression, binding: &HashMap<u32, f64>, unit: Unit) -> Result<f64, GerberError> {
    expr.converted(Some(unit)).calculate(binding)
}

impl MacroPrimitive {
    pub fn code(&self) -> u32 {
        match self {
            MacroPrimitive::Comment(_) => 0,
            MacroPrimitive::Circle { .. } => 1,
            MacroPrimitive::VectorLine { .. } => 20,
            MacroPrimitive::CenterLine { .. } => 21,
            MacroPrimitive::Outline { .. } => 4,
            MacroPrimitive::Polygon { .. } => 5,
            MacroPrimitive::Moire { .. } => 6,
            MacroPrimitive::Thermal { .. } => 7,
        }
    }

    /// `"{code},{field1},{field2},..."`, each field optimized before emission.
    pub fn to_gerber(&self, unit: Unit) -> String {
        let u = Some(unit);
        match self {
            MacroPrimitive::Comment(text) => format!("0 {text}"),
            MacroPrimitive::Circle { exposure, diameter, x, y, rotation } => format!(
                "1,{},{},{},{},{}",
                exposure.to_gerber(None),
                diameter.to_gerber(u),
                x.to_gerber(u),
                y.to_gerber(u),
                rotation.to_gerber(None)
            ),
            MacroPrimitive::VectorLine { exposure, width, start, end, rotation } => format!(
                "20,{},{},{},{},{},{},{}",
                exposure.to_gerber(None),
                width.to_gerber(u),
                start.0.to_gerber(u),
                start.1.to_gerber(u),
                end.0.to_gerber(u),
                end.1.to_gerber(u),
                rotation.to_gerber(None)
            ),
            MacroPrimitive::CenterLine { exposure, width, height, x, y, rotation } => format!(
                "21,{},{},{},{},{},{}",
                exposure.to_gerber(None),
                width.to_gerber(u),
                height.to_gerber(u),
                x.to_gerber(u),
                y.to_gerber(u),
                rotation.to_gerber(None)
            ),
            MacroPrimitive::Polygon { exposure, n_vertices, x, y, diameter, rotation } => format!(
                "5,{},{},{},{},{},{}",
                exposure.to_gerber(None),
                n_vertices.to_gerber(None),
                x.to_gerber(u),
                y.to_gerber(u),
                diameter.to_gerber(u),
                rotation.to_gerber(None)
            ),
            MacroPrimitive::Moire { x, y, d_outer, line_thickness, gap_w, num_circles, crosshair_thickness, crosshair_length, rotation } => format!(
                "6,{},{},{},{},{},{},{},{},{}",
                x.to_gerber(u),
                y.to_gerber(u),
                d_outer.to_gerber(u),
                line_thickness.to_gerber(u),
                gap_w.to_gerber(u),
                num_circles.to_gerber(None),
                crosshair_thickness.to_gerber(u),
                crosshair_length.to_gerber(u),
                rotation.to_gerber(None)
            ),
            MacroPrimitive::Thermal { x, y, d_outer, d_inner, gap_w, rotation } => format!(
                "7,{},{},{},{},{}",
                x.to_gerber(u),
                y.to_gerber(u),
                d_outer.to_gerber(u),
                d_inner.to_gerber(u),
                gap_w.to_gerber(u)
            ) + &format!(",{}", rotation.to_gerber(None)),
            MacroPrimitive::Outline { exposure, coords, rotation } => {
                let coord_str: Vec<String> = coords
                    .iter()
                    .flat_map(|(x, y)| vec![x.to_gerber(u), y.to_gerber(u)])
                    .collect();
                format!(
                    "4,{},{},{},{}",
                    exposure.to_gerber(None),
                    coords.len() as i64 - 1,
                    coord_str.join(","),
                    rotation.to_gerber(None)
                )
            }
        }
    }

    /// Expand into flattened `GraphicPrimitive`s for rendering. `rotation`
    /// is an ambient clockwise-radian rotation inherited from the aperture;
    /// the macro source's own per-primitive rotation is degree
    /// counter-clockwise and is converted here.
    pub fn to_graphic_primitives(
        &self,
        offset: (f64, f64),
        rotation: f64,
        binding: &HashMap<u32, f64>,
        unit: Unit,
        polarity_dark: bool,
    ) -> Result<Vec<GraphicPrimitive>, GerberError> {
        use crate::geometry::rotate_point;

        match self {
            MacroPrimitive::Comment(_) => Ok(vec![]),
            MacroPrimitive::Circle { exposure, diameter, x, y, rotation: rot } => {
                let (cx, cy) = (calc_u(x, binding, unit)?, calc_u(y, binding, unit)?);
                let ambient = -(deg_to_rad(calc(rot, binding)?) + rotation);
                let (px, py) = rotate_point(cx, cy, ambient, 0.0, 0.0);
                let dark = (calc(exposure, binding)? != 0.0) == polarity_dark;
                Ok(vec![GraphicPrimitive::Circle {
                    x: px + offset.0,
                    y: py + offset.1,
                    r: calc_u(diameter, binding, unit)? / 2.0,
                    polarity_dark: dark,
                }])
            }
            MacroPrimitive::VectorLine { exposure, width, start, end, rotation: rot } => {
                let (sx, sy) = (calc_u(&start.0, binding, unit)?, calc_u(&start.1, binding, unit)?);
                let (ex, ey) = (calc_u(&end.0, binding, unit)?, calc_u(&end.1, binding, unit)?);
                let center = ((sx + ex) / 2.0, (sy + ey) / 2.0);
                let (dx, dy) = (ex - sx, ey - sy);
                let length = (dx * dx + dy * dy).sqrt();
                let rot_deg = calc(rot, binding)?;
                let (ccx, ccy) = rotate_point(center.0, center.1, -(deg_to_rad(rot_deg) + rotation), 0.0, 0.0);
                let final_rotation = rotation + deg_to_rad(rot_deg) + dy.atan2(dx);
                let dark = (calc(exposure, binding)? != 0.0) == polarity_dark;
                Ok(vec![GraphicPrimitive::Rectangle {
                    x: ccx + offset.0,
                    y: ccy + offset.1,
                    w: length,
                    h: calc_u(width, binding, unit)?,
                    rotation: final_rotation,
                    polarity_dark: dark,
                }])
            }
            MacroPrimitive::CenterLine { exposure, width, height, x, y, rotation: rot } => {
                let rot = rotation + deg_to_rad(calc(rot, binding)?);
                let (cx, cy) = (calc_u(x, binding, unit)?, calc_u(y, binding, unit)?);
                let (px, py) = rotate_point(cx, cy, -rot, 0.0, 0.0);
                let dark = (calc(exposure, binding)? != 0.0) == polarity_dark;
                Ok(vec![GraphicPrimitive::Rectangle {
                    x: px + offset.0,
                    y: py + offset.1,
                    w: calc_u(width, binding, unit)?,
                    h: calc_u(height, binding, unit)?,
                    rotation: rot,
                    polarity_dark: dark,
                }])
            }
            MacroPrimitive::Polygon { exposure, n_vertices, x, y, diameter, rotation: rot } => {
                let rot = rotation + deg_to_rad(calc(rot, binding)?);
                let (cx, cy) = (calc_u(x, binding, unit)?, calc_u(y, binding, unit)?);
                let (px, py) = rotate_point(cx, cy, -rot, 0.0, 0.0);
                let n = calc(n_vertices, binding)?.round() as u32;
                let dark = (calc(exposure, binding)? != 0.0) == polarity_dark;
                Ok(vec![GraphicPrimitive::from_regular_polygon(
                    px + offset.0,
                    py + offset.1,
                    calc_u(diameter, binding, unit)? / 2.0,
                    n,
                    rot,
                    dark,
                )])
            }
            MacroPrimitive::Moire { x, y, d_outer, line_thickness, gap_w, num_circles, crosshair_thickness, crosshair_length, rotation: rot } => {
                let rot = rotation + deg_to_rad(calc(rot, binding)?);
                let (cx, cy) = (calc_u(x, binding, unit)?, calc_u(y, binding, unit)?);
                let (px, py) = rotate_point(cx, cy, -rot, 0.0, 0.0);
                let (px, py) = (px + offset.0, py + offset.1);
                let d_outer = calc_u(d_outer, binding, unit)?;
                let thickness = calc_u(line_thickness, binding, unit)?;
                let gap = calc_u(gap_w, binding, unit)?;
                let n = calc(num_circles, binding)?.round() as i64;
                let pitch = thickness + gap;
                let mut out = Vec::new();
                for i in 0..n.max(0) {
                    out.push(GraphicPrimitive::Circle { x: px, y: py, r: d_outer / 2.0 - (i as f64) * pitch, polarity_dark: true });
                    out.push(GraphicPrimitive::Circle { x: px, y: py, r: d_outer / 2.0 - (i as f64) * pitch - thickness, polarity_dark: false });
                }
                let ch_thickness = calc_u(crosshair_thickness, binding, unit)?;
                let ch_length = calc_u(crosshair_length, binding, unit)?;
                if ch_thickness.abs() > 1e-6 && ch_length.abs() > 1e-6 {
                    out.push(GraphicPrimitive::Rectangle { x: px, y: py, w: ch_length, h: ch_thickness, rotation: rot, polarity_dark: true });
                    out.push(GraphicPrimitive::Rectangle { x: px, y: py, w: ch_thickness, h: ch_length, rotation: rot, polarity_dark: true });
                }
                Ok(out)
            }
            MacroPrimitive::Thermal { x, y, d_outer, d_inner, gap_w, rotation: rot } => {
                let rot = rotation + deg_to_rad(calc(rot, binding)?);
                let (cx, cy) = (calc_u(x, binding, unit)?, calc_u(y, binding, unit)?);
                let (px, py) = rotate_point(cx, cy, -rot, 0.0, 0.0);
                let (px, py) = (px + offset.0, py + offset.1);
                let d_outer_v = calc_u(d_outer, binding, unit)?;
                let d_inner_v = calc_u(d_inner, binding, unit)?;
                let gap = calc_u(gap_w, binding, unit)?;
                let dark = polarity_dark;
                Ok(vec![
                    GraphicPrimitive::Circle { x: px, y: py, r: d_outer_v / 2.0, polarity_dark: dark },
                    GraphicPrimitive::Circle { x: px, y: py, r: d_inner_v / 2.0, polarity_dark: !dark },
                    GraphicPrimitive::Rectangle { x: px, y: py, w: d_outer_v, h: gap, rotation: rot, polarity_dark: !dark },
                    GraphicPrimitive::Rectangle { x: px, y: py, w: gap, h: d_outer_v, rotation: rot, polarity_dark: !dark },
                ])
            }
            MacroPrimitive::Outline { exposure, coords, rotation: rot } => {
                let rot = rotation + deg_to_rad(calc(rot, binding)?);
                let mut outline = Vec::with_capacity(coords.len());
                for (x, y) in coords {
                    let (cx, cy) = (calc_u(x, binding, unit)?, calc_u(y, binding, unit)?);
                    let (px, py) = rotate_point(cx, cy, -rot, 0.0, 0.0);
                    outline.push((px + offset.0, py + offset.1));
                }
                let dark = (calc(exposure, binding)? != 0.0) == polarity_dark;
                Ok(vec![GraphicPrimitive::ArcPoly { outline, arc_centers: None, polarity_dark: dark }])
            }
        }
    }

    /// Grow/shrink by `offset` (in `unit`). Thermal, moiré and outline
    /// dilation are unsupported and warn-and-pass-through.
    pub fn dilated(&self, offset: f64, unit: Unit) -> MacroPrimitive {
        let off = UnitExpression::new(Expression::Constant(offset), Some(unit));
        match self.clone() {
            MacroPrimitive::Circle { exposure, diameter, x, y, rotation } => MacroPrimitive::Circle {
                exposure,
                diameter: diameter.add(&off).unwrap_or(diameter),
                x,
                y,
                rotation,
            },
            MacroPrimitive::VectorLine { exposure, width, start, end, rotation } => {
                let off2 = UnitExpression::new(Expression::Constant(2.0 * offset), Some(unit));
                MacroPrimitive::VectorLine { exposure, width: width.add(&off2).unwrap_or(width), start, end, rotation }
            }
            MacroPrimitive::CenterLine { exposure, width, height, x, y, rotation } => {
                let off2 = UnitExpression::new(Expression::Constant(2.0 * offset), Some(unit));
                MacroPrimitive::CenterLine { exposure, width: width.add(&off2).unwrap_or(width), height, x, y, rotation }
            }
            MacroPrimitive::Polygon { exposure, n_vertices, x, y, diameter, rotation } => {
                let off2 = UnitExpression::new(Expression::Constant(2.0 * offset), Some(unit));
                MacroPrimitive::Polygon { exposure, n_vertices, x, y, diameter: diameter.add(&off2).unwrap_or(diameter), rotation }
            }
            other @ (MacroPrimitive::Moire { .. } | MacroPrimitive::Thermal { .. } | MacroPrimitive::Outline { .. }) => {
                log::warn!("attempted dilation of macro aperture {} primitive, which is not supported", other.kind_name());
                other
            }
            other @ MacroPrimitive::Comment(_) => other,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            MacroPrimitive::Moire { .. } => "moiré",
            MacroPrimitive::Thermal { .. } => "thermal",
            MacroPrimitive::Outline { .. } => "outline",
            _ => "unknown",
        }
    }

    /// Multiply every length-bearing field by `scale`.
    pub fn scaled(&self, scale: f64) -> MacroPrimitive {
        let s = UnitExpression::new(Expression::Constant(scale), None);
        let mul = |e: &UnitExpression| UnitExpression::new(Expression::op(crate::expression::Op::Mul, e.expr.clone(), s.expr.clone()), e.unit);
        match self.clone() {
            MacroPrimitive::Circle { exposure, diameter, x, y, rotation } => {
                MacroPrimitive::Circle { exposure, diameter: mul(&diameter), x: mul(&x), y: mul(&y), rotation }
            }
            MacroPrimitive::VectorLine { exposure, width, start, end, rotation } => MacroPrimitive::VectorLine {
                exposure,
                width,
                start: (mul(&start.0), mul(&start.1)),
                end: (mul(&end.0), mul(&end.1)),
                rotation,
            },
            MacroPrimitive::CenterLine { exposure, width, height, x, y, rotation } => {
                MacroPrimitive::CenterLine { exposure, width: mul(&width), height: mul(&height), x: mul(&x), y: mul(&y), rotation }
            }
            MacroPrimitive::Polygon { exposure, n_vertices, x, y, diameter, rotation } => {
                MacroPrimitive::Polygon { exposure, n_vertices, x: mul(&x), y: mul(&y), diameter: mul(&diameter), rotation }
            }
            MacroPrimitive::Moire { x, y, d_outer, line_thickness, gap_w, num_circles, crosshair_thickness, crosshair_length, rotation } => MacroPrimitive::Moire {
                x: mul(&x),
                y: mul(&y),
                d_outer: mul(&d_outer),
                line_thickness: mul(&line_thickness),
                gap_w: mul(&gap_w),
                num_circles,
                crosshair_thickness,
                crosshair_length,
                rotation,
            },
            MacroPrimitive::Thermal { x, y, d_outer, d_inner, gap_w, rotation } => {
                MacroPrimitive::Thermal { x: mul(&x), y: mul(&y), d_outer: mul(&d_outer), d_inner: mul(&d_inner), gap_w: mul(&gap_w), rotation }
            }
            MacroPrimitive::Outline { exposure, coords, rotation } => MacroPrimitive::Outline {
                exposure,
                coords: coords.iter().map(|(x, y)| (mul(x), mul(y))).collect(),
                rotation,
            },
            other @ MacroPrimitive::Comment(_) => other,
        }
    }
}
