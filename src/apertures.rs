//! Aperture definitions (`%ADxx%`) and Excellon tools.

use crate::attribute::AttributeDict;
use crate::geometry::{sum_bounds, Bounds};
use crate::graphic_primitives::GraphicPrimitive;
use crate::macros::{ApertureMacro, GenericMacros};
use crate::units::Unit;
use crate::GerberError;

/// A bound `ApertureMacro` plus the parameters supplied by its `%AD%`
/// statement (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct MacroInstance {
    pub macro_: ApertureMacro,
    pub parameters: Vec<f64>,
}

/// One aperture, as defined by a Gerber `%ADxx%` statement or synthesized
/// for an Excellon tool definition. Modeled as an enum (rather than the
/// original's class hierarchy) since Rust apertures don't need open
/// extension — every shape this format defines is known up front.
#[derive(Debug, Clone, PartialEq)]
pub enum Aperture {
    Circle { diameter: f64, hole_dia: Option<f64>, unit: Unit, attrs: AttributeDict },
    Rectangle { w: f64, h: f64, hole_dia: Option<f64>, unit: Unit, attrs: AttributeDict },
    Obround { w: f64, h: f64, hole_dia: Option<f64>, unit: Unit, attrs: AttributeDict },
    Polygon { diameter: f64, n_vertices: u32, rotation: f64, hole_dia: Option<f64>, unit: Unit, attrs: AttributeDict },
    Macro { instance: MacroInstance, unit: Unit, attrs: AttributeDict },
    /// Excellon tool. Like `Circle` but tracks plating state instead of a
    /// hole diameter.
    ExcellonTool { diameter: f64, plated: Option<bool>, unit: Unit, attrs: AttributeDict },
}

impl Aperture {
    pub fn unit(&self) -> Unit {
        match self {
            Aperture::Circle { unit, .. }
            | Aperture::Rectangle { unit, .. }
            | Aperture::Obround { unit, .. }
            | Aperture::Polygon { unit, .. }
            | Aperture::Macro { unit, .. }
            | Aperture::ExcellonTool { unit, .. } => *unit,
        }
    }

    /// `%TA%` aperture attributes active when this aperture was defined.
    pub fn attrs(&self) -> &AttributeDict {
        match self {
            Aperture::Circle { attrs, .. }
            | Aperture::Rectangle { attrs, .. }
            | Aperture::Obround { attrs, .. }
            | Aperture::Polygon { attrs, .. }
            | Aperture::Macro { attrs, .. }
            | Aperture::ExcellonTool { attrs, .. } => attrs,
        }
    }

    pub fn attrs_mut(&mut self) -> &mut AttributeDict {
        match self {
            Aperture::Circle { attrs, .. }
            | Aperture::Rectangle { attrs, .. }
            | Aperture::Obround { attrs, .. }
            | Aperture::Polygon { attrs, .. }
            | Aperture::Macro { attrs, .. }
            | Aperture::ExcellonTool { attrs, .. } => attrs,
        }
    }

    fn hole_primitive(&self, x: f64, y: f64, unit: Unit, polarity_dark: bool) -> Vec<GraphicPrimitive> {
        let mut out = self.primitives(x, y, unit, polarity_dark);
        let hole_dia = match self {
            Aperture::Circle { hole_dia, .. }
            | Aperture::Rectangle { hole_dia, .. }
            | Aperture::Obround { hole_dia, .. }
            | Aperture::Polygon { hole_dia, .. } => *hole_dia,
            _ => None,
        };
        if let Some(d) = hole_dia {
            out.push(GraphicPrimitive::Circle {
                x,
                y,
                r: self.unit().convert_to(unit, d / 2.0),
                polarity_dark: !polarity_dark,
            });
        }
        out
    }

    fn primitives(&self, x: f64, y: f64, unit: Unit, polarity_dark: bool) -> Vec<GraphicPrimitive> {
        let from = self.unit();
        match self {
            Aperture::Circle { diameter, .. } => vec![GraphicPrimitive::Circle {
                x,
                y,
                r: from.convert_to(unit, *diameter / 2.0),
                polarity_dark,
            }],
            Aperture::ExcellonTool { diameter, .. } => vec![GraphicPrimitive::Circle {
                x,
                y,
                r: from.convert_to(unit, *diameter / 2.0),
                polarity_dark,
            }],
            Aperture::Rectangle { w, h, .. } => vec![GraphicPrimitive::Rectangle {
                x,
                y,
                w: from.convert_to(unit, *w),
                h: from.convert_to(unit, *h),
                rotation: 0.0,
                polarity_dark,
            }],
            Aperture::Obround { w, h, .. } => vec![GraphicPrimitive::line_from_obround(
                x,
                y,
                from.convert_to(unit, *w),
                from.convert_to(unit, *h),
                0.0,
                polarity_dark,
            )],
            Aperture::Polygon { diameter, n_vertices, rotation, .. } => {
                vec![GraphicPrimitive::from_regular_polygon(
                    x,
                    y,
                    from.convert_to(unit, *diameter / 2.0),
                    *n_vertices,
                    *rotation,
                    polarity_dark,
                )]
            }
            Aperture::Macro { .. } => Vec::new(),
        }
    }

    /// Render this aperture flashed at `(x, y)` into the given unit.
    pub fn flash(&self, x: f64, y: f64, unit: Unit, polarity_dark: bool) -> Result<Vec<GraphicPrimitive>, GerberError> {
        match self {
            Aperture::Macro { instance, .. } => instance.macro_.to_graphic_primitives(
                (x, y),
                0.0,
                &instance.parameters,
                unit,
                polarity_dark,
            ),
            _ => Ok(self.hole_primitive(x, y, unit, polarity_dark)),
        }
    }

    pub fn bounding_box(&self, unit: Unit) -> Result<Bounds, GerberError> {
        let flashed = self.flash(0.0, 0.0, unit, true)?;
        Ok(sum_bounds(flashed.iter().map(|p| p.bounding_box())).unwrap_or(((0.0, 0.0), (0.0, 0.0))))
    }

    /// Width of a line interpolated using this aperture. Only circular
    /// apertures (and Excellon tools) have a well-defined width.
    pub fn equivalent_width(&self, unit: Unit) -> Result<f64, GerberError> {
        match self {
            Aperture::Circle { diameter, .. } | Aperture::ExcellonTool { diameter, .. } => {
                Ok(self.unit().convert_to(unit, *diameter))
            }
            _ => Err(GerberError::Syntax(
                "non-circular aperture used in interpolation statement, line width is not properly defined".into(),
            )),
        }
    }

    fn strip_right(vals: Vec<Option<f64>>) -> Vec<f64> {
        let mut vals = vals;
        while matches!(vals.last(), Some(None)) {
            vals.pop();
        }
        vals.into_iter().map(|v| v.unwrap_or(0.0)).collect()
    }

    fn format_param(v: f64) -> String {
        format!("{v:.4}")
    }

    /// Gerber `%ADxx{code},params%` parameter string, in `settings`'s unit.
    pub fn to_gerber(&self, unit: Unit) -> String {
        let from = self.unit();
        match self {
            Aperture::Circle { diameter, hole_dia, .. } => {
                let params = Self::strip_right(vec![Some(from.convert_to(unit, *diameter)), hole_dia.map(|d| from.convert_to(unit, d))]);
                format!("C,{}", params.iter().map(|v| Self::format_param(*v)).collect::<Vec<_>>().join("X"))
            }
            Aperture::Rectangle { w, h, hole_dia, .. } => {
                let params = Self::strip_right(vec![
                    Some(from.convert_to(unit, *w)),
                    Some(from.convert_to(unit, *h)),
                    hole_dia.map(|d| from.convert_to(unit, d)),
                ]);
                format!("R,{}", params.iter().map(|v| Self::format_param(*v)).collect::<Vec<_>>().join("X"))
            }
            Aperture::Obround { w, h, hole_dia, .. } => {
                let params = Self::strip_right(vec![
                    Some(from.convert_to(unit, *w)),
                    Some(from.convert_to(unit, *h)),
                    hole_dia.map(|d| from.convert_to(unit, d)),
                ]);
                format!("O,{}", params.iter().map(|v| Self::format_param(*v)).collect::<Vec<_>>().join("X"))
            }
            Aperture::Polygon { diameter, n_vertices, rotation, hole_dia, .. } => {
                let two_pi_over_n = std::f64::consts::TAU / *n_vertices as f64;
                let norm_rotation = rotation.rem_euclid(two_pi_over_n);
                let rotation_field = if norm_rotation.abs() < 1e-6 { None } else { Some(norm_rotation.to_degrees()) };
                let mut fields = vec![Self::format_param(from.convert_to(unit, *diameter)), n_vertices.to_string()];
                if let Some(r) = rotation_field {
                    fields.push(Self::format_param(r));
                } else if hole_dia.is_some() {
                    fields.push("0".to_string());
                }
                if let Some(d) = hole_dia {
                    fields.push(Self::format_param(from.convert_to(unit, *d)));
                }
                format!("P,{}", fields.join("X"))
            }
            Aperture::Macro { instance, .. } => {
                let params = instance.parameters.iter().map(|v| Self::format_param(*v)).collect::<Vec<_>>().join("X");
                if params.is_empty() {
                    instance.macro_.name()
                } else {
                    format!("{},{}", instance.macro_.name(), params)
                }
            }
            Aperture::ExcellonTool { diameter, .. } => format!("C,{}", Self::format_param(from.convert_to(unit, *diameter))),
        }
    }

    /// Excellon tool definition token (`Cdd.dddd`).
    pub fn to_xnc(&self, settings: &crate::units::FileSettings) -> String {
        match self {
            Aperture::ExcellonTool { diameter, unit, .. } => {
                format!("C{}", settings.write_excellon_value(unit.convert_to(settings.unit, *diameter)))
            }
            _ => unreachable!("to_xnc is only defined for Excellon tools"),
        }
    }

    /// Equivalent aperture macro, for rotated/non-standard shapes and for
    /// uniform macro-based serialization.
    pub fn to_macro(&self, rotation: f64) -> Aperture {
        let mm = Unit::Millimeter;
        let from = self.unit();
        match self {
            Aperture::Circle { diameter, .. } | Aperture::ExcellonTool { diameter, .. } => Aperture::Macro {
                instance: MacroInstance { macro_: GenericMacros::circle(), parameters: vec![from.convert_to(mm, *diameter)] },
                unit: mm,
                attrs: self.attrs().clone(),
            },
            Aperture::Rectangle { w, h, hole_dia, .. } => Aperture::Macro {
                instance: MacroInstance {
                    macro_: GenericMacros::rect(),
                    parameters: vec![from.convert_to(mm, *w), from.convert_to(mm, *h), hole_dia.map(|d| from.convert_to(mm, d)).unwrap_or(0.0), 0.0, rotation],
                },
                unit: mm,
                attrs: self.attrs().clone(),
            },
            Aperture::Obround { w, h, hole_dia, .. } => {
                let (w_mm, h_mm, rotation) = if w > h {
                    (from.convert_to(mm, *w), from.convert_to(mm, *h), rotation)
                } else {
                    (from.convert_to(mm, *h), from.convert_to(mm, *w), rotation + std::f64::consts::FRAC_PI_2)
                };
                Aperture::Macro {
                    instance: MacroInstance {
                        macro_: GenericMacros::obround(),
                        parameters: vec![w_mm, h_mm, hole_dia.map(|d| from.convert_to(mm, d)).unwrap_or(0.0), 0.0, rotation],
                    },
                    unit: mm,
                    attrs: self.attrs().clone(),
                }
            }
            Aperture::Polygon { diameter, n_vertices, hole_dia, .. } => Aperture::Macro {
                instance: MacroInstance {
                    macro_: GenericMacros::polygon(),
                    parameters: vec![from.convert_to(mm, *diameter), *n_vertices as f64, rotation, hole_dia.map(|d| from.convert_to(mm, d)).unwrap_or(0.0)],
                },
                unit: mm,
                attrs: self.attrs().clone(),
            },
            Aperture::Macro { instance, unit, attrs } => Aperture::Macro {
                instance: MacroInstance { macro_: instance.macro_.rotated(rotation), parameters: instance.parameters.clone() },
                unit: *unit,
                attrs: attrs.clone(),
            },
        }
    }

    /// Grow/shrink by `offset` (measured in `unit`). A near-zero offset is a
    /// no-op. Polygon/rectangle/obround dilation drops any hole, matching
    /// the original (a dilated aperture with a hole has ambiguous meaning).
    pub fn dilated(&self, offset: f64, unit: Unit) -> Aperture {
        let offset_self = unit.convert_to(self.unit(), offset);
        if offset_self.abs() < 1e-6 {
            return self.clone();
        }
        match self.clone() {
            Aperture::Circle { diameter, unit: u, attrs, .. } => {
                Aperture::Circle { diameter: diameter + 2.0 * offset_self, hole_dia: None, unit: u, attrs }
            }
            Aperture::ExcellonTool { diameter, plated, unit: u, attrs } => {
                Aperture::ExcellonTool { diameter: diameter + 2.0 * offset_self, plated, unit: u, attrs }
            }
            Aperture::Rectangle { w, h, unit: u, attrs, .. } => {
                Aperture::Rectangle { w: w + 2.0 * offset_self, h: h + 2.0 * offset_self, hole_dia: None, unit: u, attrs }
            }
            Aperture::Obround { w, h, unit: u, attrs, .. } => {
                Aperture::Obround { w: w + 2.0 * offset_self, h: h + 2.0 * offset_self, hole_dia: None, unit: u, attrs }
            }
            Aperture::Polygon { diameter, n_vertices, rotation, unit: u, attrs, .. } => {
                Aperture::Polygon { diameter: diameter + 2.0 * offset_self, n_vertices, rotation, hole_dia: None, unit: u, attrs }
            }
            Aperture::Macro { instance, unit: u, attrs } => Aperture::Macro {
                instance: MacroInstance { macro_: instance.macro_.dilated(offset_self, u), parameters: instance.parameters },
                unit: u,
                attrs,
            },
        }
    }

    /// Rotate a shape aperture. Circles are rotation-invariant. Rectangles
    /// and obrounds snap to themselves (swapping w/h) on a quarter turn;
    /// any other angle falls back to an equivalent macro.
    pub fn rotated(&self, angle: f64) -> Aperture {
        let pi = std::f64::consts::PI;
        let close = |a: f64, b: f64| (a - b).abs() < 1e-6;
        match self.clone() {
            Aperture::Circle { .. } | Aperture::ExcellonTool { .. } => self.clone(),
            Aperture::Rectangle { w, h, hole_dia, unit, attrs } => {
                if close(angle.rem_euclid(pi), 0.0) {
                    self.clone()
                } else if close(angle.rem_euclid(pi), pi / 2.0) {
                    Aperture::Rectangle { w: h, h: w, hole_dia, unit, attrs }
                } else {
                    self.to_macro(angle)
                }
            }
            Aperture::Obround { w, h, hole_dia, unit, attrs } => {
                if close(angle.rem_euclid(pi), 0.0) {
                    self.clone()
                } else if close(angle.rem_euclid(pi), pi / 2.0) {
                    Aperture::Obround { w: h, h: w, hole_dia, unit, attrs }
                } else {
                    self.to_macro(angle)
                }
            }
            Aperture::Polygon { diameter, n_vertices, rotation, hole_dia, unit, attrs } => {
                if angle == 0.0 {
                    self.clone()
                } else {
                    Aperture::Polygon { diameter, n_vertices, rotation: rotation + angle, hole_dia, unit, attrs }
                }
            }
            Aperture::Macro { instance, unit, attrs } => {
                if close(angle.rem_euclid(std::f64::consts::TAU), 0.0) {
                    self.clone()
                } else {
                    Aperture::Macro {
                        instance: MacroInstance { macro_: instance.macro_.rotated(angle), parameters: instance.parameters },
                        unit,
                        attrs,
                    }
                }
            }
        }
    }

    pub fn scaled(&self, scale: f64) -> Aperture {
        match self.clone() {
            Aperture::Circle { diameter, hole_dia, unit, attrs } => {
                Aperture::Circle { diameter: diameter * scale, hole_dia: hole_dia.map(|d| d * scale), unit, attrs }
            }
            Aperture::ExcellonTool { diameter, plated, unit, attrs } => {
                Aperture::ExcellonTool { diameter: diameter * scale, plated, unit, attrs }
            }
            Aperture::Rectangle { w, h, hole_dia, unit, attrs } => {
                Aperture::Rectangle { w: w * scale, h: h * scale, hole_dia: hole_dia.map(|d| d * scale), unit, attrs }
            }
            Aperture::Obround { w, h, hole_dia, unit, attrs } => {
                Aperture::Obround { w: w * scale, h: h * scale, hole_dia: hole_dia.map(|d| d * scale), unit, attrs }
            }
            Aperture::Polygon { diameter, n_vertices, rotation, hole_dia, unit, attrs } => {
                Aperture::Polygon { diameter: diameter * scale, n_vertices, rotation, hole_dia: hole_dia.map(|d| d * scale), unit, attrs }
            }
            Aperture::Macro { instance, unit, attrs } => Aperture::Macro {
                instance: MacroInstance { macro_: instance.macro_.scaled(scale), parameters: instance.parameters },
                unit,
                attrs,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn circle_equivalent_width_passthrough() {
        let a = Aperture::Circle { diameter: 0.5, hole_dia: None, unit: Unit::Millimeter, attrs: AttributeDict::new() };
        assert!((a.equivalent_width(Unit::Millimeter).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rectangle_equivalent_width_errors() {
        let a = Aperture::Rectangle { w: 1.0, h: 2.0, hole_dia: None, unit: Unit::Millimeter, attrs: AttributeDict::new() };
        assert!(a.equivalent_width(Unit::Millimeter).is_err());
    }

    #[test]
    fn circle_dilation_grows_diameter() {
        let a = Aperture::Circle { diameter: 1.0, hole_dia: Some(0.2), unit: Unit::Millimeter, attrs: AttributeDict::new() };
        let d = a.dilated(0.1, Unit::Millimeter);
        assert!(matches!(d, Aperture::Circle { diameter, hole_dia: None, .. } if (diameter - 1.2).abs() < 1e-9));
    }

    #[test]
    fn rectangle_quarter_turn_swaps_dimensions() {
        let a = Aperture::Rectangle { w: 1.0, h: 2.0, hole_dia: None, unit: Unit::Millimeter, attrs: AttributeDict::new() };
        let r = a.rotated(std::f64::consts::FRAC_PI_2);
        assert!(matches!(r, Aperture::Rectangle { w, h, .. } if w == 2.0 && h == 1.0));
    }

    #[test]
    fn gerber_serialization_strips_trailing_none() {
        let a = Aperture::Circle { diameter: 0.5, hole_dia: None, unit: Unit::Millimeter, attrs: AttributeDict::new() };
        assert_eq!(a.to_gerber(Unit::Millimeter), "C,0.5000");
    }

    #[test]
    fn scenario_s6_rotated_rectangle_falls_back_to_macro() {
        let a = Aperture::Rectangle { w: 2.0, h: 1.0, hole_dia: None, unit: Unit::Millimeter, attrs: AttributeDict::new() };
        let r = a.rotated(std::f64::consts::FRAC_PI_4);
        assert!(matches!(r, Aperture::Macro { .. }));

        let ((min_x, min_y), (max_x, max_y)) = r.bounding_box(Unit::Millimeter).unwrap();
        let expected = 2.0 * std::f64::consts::FRAC_1_SQRT_2 + 1.0 * std::f64::consts::FRAC_1_SQRT_2;
        assert!((max_x - min_x - expected).abs() < 1e-6, "width was {}", max_x - min_x);
        assert!((max_y - min_y - expected).abs() < 1e-6, "height was {}", max_y - min_y);
        assert!((min_x + max_x).abs() < 1e-6);
        assert!((min_y + max_y).abs() < 1e-6);
    }
}
