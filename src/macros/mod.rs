//! Aperture macros: named, parametric shape definitions built from a
//! sequence of [`primitive::MacroPrimitive`] blocks.

pub mod primitive;

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::expression::{parse_expression, Expression, UnitExpression};
use crate::graphic_primitives::GraphicPrimitive;
use crate::units::Unit;
use crate::GerberError;

pub use primitive::MacroPrimitive;

/// A parsed `%AM%` aperture macro definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ApertureMacro {
    name: Option<String>,
    pub comments: Vec<String>,
    pub variables: HashMap<u32, Expression>,
    pub primitives: Vec<MacroPrimitive>,
}

impl ApertureMacro {
    pub fn new(name: Option<String>) -> Self {
        ApertureMacro { name, comments: Vec::new(), variables: HashMap::new(), primitives: Vec::new() }
    }

    /// Parse a macro body (the text between `%AMname*` and the closing `%`,
    /// statements separated by `*`).
    pub fn parse_macro(name: &str, body: &str, unit: Unit) -> Result<ApertureMacro, GerberError> {
        let mut macro_ = ApertureMacro::new(Some(name.to_string()));

        for raw_block in body.split('*') {
            let block = raw_block.trim();
            if block.is_empty() {
                continue;
            }

            if let Some(comment) = block.strip_prefix("0 ") {
                macro_.comments.push(comment.to_string());
                continue;
            }
            if block == "0" {
                macro_.comments.push(String::new());
                continue;
            }

            let compact: String = block.chars().filter(|c| !c.is_whitespace()).collect();

            if let Some(rest) = compact.strip_prefix('$') {
                let (var_name, expr_src) = rest
                    .split_once('=')
                    .ok_or_else(|| GerberError::Syntax(format!("malformed macro variable definition {block:?}")))?;
                let number: u32 = var_name
                    .parse()
                    .map_err(|_| GerberError::Syntax(format!("invalid macro variable name {var_name:?}")))?;
                if macro_.variables.contains_key(&number) {
                    return Err(GerberError::Syntax(format!(
                        "re-definition of aperture macro variable {number} inside macro"
                    )));
                }
                let expr = parse_expression(expr_src)?;
                macro_.variables.insert(number, expr);
            } else {
                let mut fields = compact.split(',');
                let code: u32 = fields
                    .next()
                    .ok_or_else(|| GerberError::Syntax("empty aperture macro primitive block".into()))?
                    .parse()
                    .map_err(|_| GerberError::Syntax(format!("invalid aperture macro primitive code in {block:?}")))?;
                let args: Vec<Expression> = fields.map(parse_expression).collect::<Result<_, _>>()?;
                macro_.primitives.push(primitive_from_code(code, &args, unit)?);
            }
        }

        Ok(macro_)
    }

    /// Explicit name, or a deterministic `gn_{hash}` fallback derived from
    /// this macro's Gerber serialization. The Python original hashes on
    /// `id(self)` (object identity); content hashing is the idiomatic Rust
    /// substitute since two macros with identical content should compare
    /// and print identically.
    pub fn name(&self) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => {
                let mut hasher = DefaultHasher::new();
                self.to_gerber(None).hash(&mut hasher);
                format!("gn_{:x}", hasher.finish())
            }
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Shrink or grow every primitive by `offset` (in `unit`). Primitives
    /// whose exposure cannot be statically resolved are dropped with a
    /// warning, matching the original's `IndexError` catch.
    pub fn dilated(&self, offset: f64, unit: Unit) -> ApertureMacro {
        let mut dup = self.clone();
        let empty = HashMap::new();
        dup.primitives = self
            .primitives
            .iter()
            .filter_map(|p| match p {
                MacroPrimitive::Comment(_) => Some(p.clone()),
                _ => match exposure_of(p).map(|e| e.calculate(&empty)) {
                    Some(Ok(v)) if v != 0.0 => Some(p.dilated(offset, unit)),
                    Some(Ok(_)) => None,
                    Some(Err(_)) => {
                        log::warn!("cannot dilate aperture macro primitive with exposure value computed from macro variable");
                        None
                    }
                    None => Some(p.dilated(offset, unit)),
                },
            })
            .collect();
        dup
    }

    pub fn to_gerber(&self, unit: Option<Unit>) -> String {
        let mut blocks: Vec<String> = self.comments.iter().map(|c| format!("0 {c}")).collect();
        let mut vars: Vec<(&u32, &Expression)> = self.variables.iter().collect();
        vars.sort_by_key(|(n, _)| **n);
        blocks.extend(vars.iter().map(|(n, expr)| format!("${n}={}", expr.to_gerber(unit))));
        blocks.extend(self.primitives.iter().map(|p| p.to_gerber(unit.unwrap_or(Unit::Millimeter))));
        blocks.join("*\n")
    }

    /// Expand with `parameters` bound to `$1`, `$2`, ... in order, on top of
    /// this macro's own variable definitions.
    pub fn to_graphic_primitives(
        &self,
        offset: (f64, f64),
        rotation: f64,
        parameters: &[f64],
        unit: Unit,
        polarity_dark: bool,
    ) -> Result<Vec<GraphicPrimitive>, GerberError> {
        let mut binding: HashMap<u32, f64> = HashMap::new();
        let mut sorted_vars: Vec<(&u32, &Expression)> = self.variables.iter().collect();
        sorted_vars.sort_by_key(|(n, _)| **n);
        for (number, expr) in sorted_vars {
            binding.insert(*number, expr.calculate(&binding.clone())?);
        }
        for (i, value) in parameters.iter().enumerate() {
            let number = i as u32 + 1;
            if self.variables.contains_key(&number) {
                return Err(GerberError::Syntax(format!(
                    "re-definition of aperture macro variable {number} through parameter {value}"
                )));
            }
            binding.insert(number, *value);
        }

        let mut out = Vec::new();
        for p in &self.primitives {
            out.extend(p.to_graphic_primitives(offset, rotation, &binding, unit, polarity_dark)?);
        }
        Ok(out)
    }

    /// Apply an additional clockwise rotation (radians) to every primitive.
    /// Macro primitive rotation fields are degrees counter-clockwise, hence
    /// the sign flip and unit conversion.
    pub fn rotated(&self, angle: f64) -> ApertureMacro {
        let mut dup = self.clone();
        let delta = Expression::Constant(-angle.to_degrees());
        for p in &mut dup.primitives {
            *p = add_rotation(p, delta.clone());
        }
        dup
    }

    pub fn scaled(&self, scale: f64) -> ApertureMacro {
        let mut dup = self.clone();
        dup.primitives = dup.primitives.iter().map(|p| p.scaled(scale)).collect();
        dup
    }
}

fn exposure_of(p: &MacroPrimitive) -> Option<&Expression> {
    match p {
        MacroPrimitive::Circle { exposure, .. }
        | MacroPrimitive::VectorLine { exposure, .. }
        | MacroPrimitive::CenterLine { exposure, .. }
        | MacroPrimitive::Polygon { exposure, .. }
        | MacroPrimitive::Outline { exposure, .. } => Some(exposure),
        MacroPrimitive::Moire { .. } | MacroPrimitive::Thermal { .. } | MacroPrimitive::Comment(_) => None,
    }
}

fn add_rotation(p: &MacroPrimitive, delta: Expression) -> MacroPrimitive {
    let plus = |r: &Expression| Expression::op(crate::expression::Op::Add, r.clone(), delta.clone());
    match p.clone() {
        MacroPrimitive::Comment(c) => MacroPrimitive::Comment(c),
        MacroPrimitive::Circle { exposure, diameter, x, y, rotation } => {
            MacroPrimitive::Circle { exposure, diameter, x, y, rotation: plus(&rotation) }
        }
        MacroPrimitive::VectorLine { exposure, width, start, end, rotation } => {
            MacroPrimitive::VectorLine { exposure, width, start, end, rotation: plus(&rotation) }
        }
        MacroPrimitive::CenterLine { exposure, width, height, x, y, rotation } => {
            MacroPrimitive::CenterLine { exposure, width, height, x, y, rotation: plus(&rotation) }
        }
        MacroPrimitive::Polygon { exposure, n_vertices, x, y, diameter, rotation } => {
            MacroPrimitive::Polygon { exposure, n_vertices, x, y, diameter, rotation: plus(&rotation) }
        }
        MacroPrimitive::Moire { x, y, d_outer, line_thickness, gap_w, num_circles, crosshair_thickness, crosshair_length, rotation } => {
            MacroPrimitive::Moire { x, y, d_outer, line_thickness, gap_w, num_circles, crosshair_thickness, crosshair_length, rotation: plus(&rotation) }
        }
        MacroPrimitive::Thermal { x, y, d_outer, d_inner, gap_w, rotation } => {
            MacroPrimitive::Thermal { x, y, d_outer, d_inner, gap_w, rotation: plus(&rotation) }
        }
        MacroPrimitive::Outline { exposure, coords, rotation } => {
            MacroPrimitive::Outline { exposure, coords, rotation: plus(&rotation) }
        }
    }
}

fn arg(args: &[Expression], i: usize) -> Expression {
    args.get(i).cloned().unwrap_or(Expression::Constant(0.0))
}

fn uarg(args: &[Expression], i: usize, unit: Unit) -> UnitExpression {
    UnitExpression::new(arg(args, i), Some(unit))
}

/// Build a `MacroPrimitive` from its declaration code and argument list.
/// Field order per code is fixed by the Gerber spec; grounded on
/// `aperture_macros/primitive.py`'s per-class `from_gerber`/`args` handling.
fn primitive_from_code(code: u32, args: &[Expression], unit: Unit) -> Result<MacroPrimitive, GerberError> {
    match code {
        1 => Ok(MacroPrimitive::Circle {
            exposure: arg(args, 0),
            diameter: uarg(args, 1, unit),
            x: uarg(args, 2, unit),
            y: uarg(args, 3, unit),
            rotation: args.get(4).cloned().unwrap_or(Expression::Constant(0.0)),
        }),
        20 | 2 => Ok(MacroPrimitive::VectorLine {
            exposure: arg(args, 0),
            width: uarg(args, 1, unit),
            start: (uarg(args, 2, unit), uarg(args, 3, unit)),
            end: (uarg(args, 4, unit), uarg(args, 5, unit)),
            rotation: arg(args, 6),
        }),
        21 => Ok(MacroPrimitive::CenterLine {
            exposure: arg(args, 0),
            width: uarg(args, 1, unit),
            height: uarg(args, 2, unit),
            x: uarg(args, 3, unit),
            y: uarg(args, 4, unit),
            rotation: arg(args, 5),
        }),
        5 => Ok(MacroPrimitive::Polygon {
            exposure: arg(args, 0),
            n_vertices: arg(args, 1),
            x: uarg(args, 2, unit),
            y: uarg(args, 3, unit),
            diameter: uarg(args, 4, unit),
            rotation: arg(args, 5),
        }),
        6 => Ok(MacroPrimitive::Moire {
            x: uarg(args, 0, unit),
            y: uarg(args, 1, unit),
            d_outer: uarg(args, 2, unit),
            line_thickness: uarg(args, 3, unit),
            gap_w: uarg(args, 4, unit),
            num_circles: arg(args, 5),
            crosshair_thickness: uarg(args, 6, unit),
            crosshair_length: uarg(args, 7, unit),
            rotation: arg(args, 8),
        }),
        7 => Ok(MacroPrimitive::Thermal {
            x: uarg(args, 0, unit),
            y: uarg(args, 1, unit),
            d_outer: uarg(args, 2, unit),
            d_inner: uarg(args, 3, unit),
            gap_w: uarg(args, 4, unit),
            rotation: arg(args, 5),
        }),
        4 => {
            let n_vertices = arg(args, 0).calculate(&HashMap::new()).unwrap_or(0.0).round() as usize;
            let mut coords = Vec::with_capacity(n_vertices + 1);
            for i in 0..=n_vertices {
                let xi = 1 + 2 * i;
                let yi = 2 + 2 * i;
                coords.push((uarg(args, xi, unit), uarg(args, yi, unit)));
            }
            let rotation = args.get(2 + 2 * n_vertices).cloned().unwrap_or(Expression::Constant(0.0));
            Ok(MacroPrimitive::Outline { exposure: arg(args, 0), coords, rotation })
        }
        other => Err(GerberError::Syntax(format!("unknown aperture macro primitive code {other}"))),
    }
}

/// Built-in macros used to realize standard apertures (circle/rect/obround
/// with a hole, rounded rect, regular polygon) as aperture macros when a
/// consumer needs a uniform macro-based representation.
pub struct GenericMacros;

impl GenericMacros {
    fn hole(n: u32) -> Vec<MacroPrimitive> {
        vec![
            MacroPrimitive::Circle {
                exposure: Expression::Constant(0.0),
                diameter: UnitExpression::new(Expression::Variable(n), Some(Unit::Millimeter)),
                x: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
                y: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
                rotation: Expression::Constant(0.0),
            },
            MacroPrimitive::CenterLine {
                exposure: Expression::Constant(0.0),
                width: UnitExpression::new(Expression::Variable(n), Some(Unit::Millimeter)),
                height: UnitExpression::new(Expression::Variable(n + 1), Some(Unit::Millimeter)),
                x: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
                y: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
                rotation: Expression::op(crate::expression::Op::Mul, Expression::Variable(n + 2), Expression::Constant(-180.0 / std::f64::consts::PI)),
            },
        ]
    }

    pub fn circle() -> ApertureMacro {
        let mut m = ApertureMacro::new(Some("GNC".into()));
        m.primitives.push(MacroPrimitive::Circle {
            exposure: Expression::Constant(1.0),
            diameter: UnitExpression::new(Expression::Variable(1), Some(Unit::Millimeter)),
            x: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
            y: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
            rotation: Expression::op(crate::expression::Op::Mul, Expression::Variable(4), Expression::Constant(-180.0 / std::f64::consts::PI)),
        });
        m.primitives.extend(Self::hole(2));
        m
    }

    pub fn rect() -> ApertureMacro {
        let mut m = ApertureMacro::new(Some("GNR".into()));
        m.primitives.push(MacroPrimitive::CenterLine {
            exposure: Expression::Constant(1.0),
            width: UnitExpression::new(Expression::Variable(1), Some(Unit::Millimeter)),
            height: UnitExpression::new(Expression::Variable(2), Some(Unit::Millimeter)),
            x: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
            y: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
            rotation: Expression::op(crate::expression::Op::Mul, Expression::Variable(5), Expression::Constant(-180.0 / std::f64::consts::PI)),
        });
        m.primitives.extend(Self::hole(3));
        m
    }

    pub fn obround() -> ApertureMacro {
        let mut m = ApertureMacro::new(Some("GNO".into()));
        let rot = Expression::op(crate::expression::Op::Mul, Expression::Variable(5), Expression::Constant(-180.0 / std::f64::consts::PI));
        m.primitives.push(MacroPrimitive::CenterLine {
            exposure: Expression::Constant(1.0),
            width: UnitExpression::new(Expression::Variable(1), Some(Unit::Millimeter)),
            height: UnitExpression::new(Expression::Variable(2), Some(Unit::Millimeter)),
            x: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
            y: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
            rotation: rot.clone(),
        });
        for sign in [1.0, -1.0] {
            m.primitives.push(MacroPrimitive::Circle {
                exposure: Expression::Constant(1.0),
                diameter: UnitExpression::new(Expression::Variable(2), Some(Unit::Millimeter)),
                x: UnitExpression::new(
                    Expression::op(crate::expression::Op::Mul, Expression::Constant(sign), Expression::op(crate::expression::Op::Div, Expression::Variable(1), Expression::Constant(2.0))),
                    Some(Unit::Millimeter),
                ),
                y: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
                rotation: rot.clone(),
            });
        }
        m.primitives.extend(Self::hole(3));
        m
    }

    pub fn polygon() -> ApertureMacro {
        let mut m = ApertureMacro::new(Some("GNP".into()));
        m.primitives.push(MacroPrimitive::Polygon {
            exposure: Expression::Constant(1.0),
            n_vertices: Expression::Variable(2),
            x: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
            y: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
            diameter: UnitExpression::new(Expression::Variable(1), Some(Unit::Millimeter)),
            rotation: Expression::op(crate::expression::Op::Mul, Expression::Variable(3), Expression::Constant(-180.0 / std::f64::consts::PI)),
        });
        m.primitives.push(MacroPrimitive::Circle {
            exposure: Expression::Constant(0.0),
            diameter: UnitExpression::new(Expression::Variable(4), Some(Unit::Millimeter)),
            x: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
            y: UnitExpression::new(Expression::Constant(0.0), Some(Unit::Millimeter)),
            rotation: Expression::Constant(0.0),
        });
        m
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_simple_circle_macro() {
        let m = ApertureMacro::parse_macro("TEST", "1,1,0.5,0,0*", Unit::Millimeter).unwrap();
        assert_eq!(m.primitives.len(), 1);
        assert!(matches!(m.primitives[0], MacroPrimitive::Circle { .. }));
    }

    #[test]
    fn parse_rejects_duplicate_variable() {
        let err = ApertureMacro::parse_macro("TEST", "$1=1*$1=2*", Unit::Millimeter);
        assert!(err.is_err());
    }

    #[test]
    fn name_falls_back_to_content_hash() {
        let m = ApertureMacro::parse_macro("", "1,1,0.5,0,0*", Unit::Millimeter).unwrap();
        let mut m = m;
        m.set_name_none_for_test();
        assert!(m.name().starts_with("gn_"));
    }

    #[test]
    fn generic_circle_has_hole_primitives() {
        let m = GenericMacros::circle();
        assert_eq!(m.primitives.len(), 3);
    }
}

#[cfg(test)]
impl ApertureMacro {
    fn set_name_none_for_test(&mut self) {
        self.name = None;
    }
}
