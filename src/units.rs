//! Length units and per-file numeric settings.

use std::fmt;

use crate::GerberError;

/// Millimeters per inch, used for every unit conversion in the crate.
pub const MM_PER_INCH: f64 = 25.4;

/// A length unit. There are exactly two values; they behave like singletons
/// (`Copy`, compared by value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Millimeter,
    Inch,
}

impl Unit {
    /// Shorthand string as used in Gerber `%MO%` and Excellon dialect comments.
    pub fn shorthand(self) -> &'static str {
        match self {
            Unit::Millimeter => "mm",
            Unit::Inch => "inch",
        }
    }

    pub fn from_shorthand(s: &str) -> Option<Unit> {
        match s.to_ascii_lowercase().as_str() {
            "mm" | "millimeter" | "millimeters" | "metric" => Some(Unit::Millimeter),
            "in" | "inch" | "inches" => Some(Unit::Inch),
            _ => None,
        }
    }

    /// Factor to multiply a value in this unit by to obtain millimeters.
    fn to_mm_factor(self) -> f64 {
        match self {
            Unit::Millimeter => 1.0,
            Unit::Inch => MM_PER_INCH,
        }
    }

    /// Convert `value`, expressed in `self`, into `target`. Idempotent when
    /// `self == target`.
    pub fn convert_to(self, target: Unit, value: f64) -> f64 {
        if self == target {
            return value;
        }
        value * self.to_mm_factor() / target.to_mm_factor()
    }

    /// Convert a point `(x, y)` from `self` into `target`.
    pub fn convert_point(self, target: Unit, point: (f64, f64)) -> (f64, f64) {
        (
            self.convert_to(target, point.0),
            self.convert_to(target, point.1),
        )
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.shorthand())
    }
}

/// Coordinate notation: absolute values vs. deltas from the previous point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notation {
    Absolute,
    Incremental,
}

/// Zero-suppression policy for fixed-point coordinate tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zeros {
    /// Leading zeros are omitted; the token is right-aligned.
    Leading,
    /// Trailing zeros are omitted; the token is left-aligned.
    Trailing,
    /// No suppression; number format is inferred from an explicit decimal point.
    None,
}

/// Per-file numeric format: how many integer and fractional digits a
/// fixed-point coordinate token has. Both must be `<= 9` once known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub integer: Option<u8>,
    pub fractional: Option<u8>,
}

impl NumberFormat {
    pub fn new(integer: u8, fractional: u8) -> Self {
        NumberFormat { integer: Some(integer), fractional: Some(fractional) }
    }

    pub fn unknown() -> Self {
        NumberFormat { integer: None, fractional: None }
    }
}

/// Describes how numbers are serialized in one specific Gerber/Excellon file.
/// Every coordinate parse/format in the crate goes through an instance of
/// this record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileSettings {
    pub unit: Unit,
    pub notation: Notation,
    pub zeros: Zeros,
    pub number_format: NumberFormat,
    /// `%FS%`'s angle unit is always degrees in practice; kept for parity
    /// with the original's `angle_unit` field.
    pub angle_unit: &'static str,
}

impl Default for FileSettings {
    fn default() -> Self {
        FileSettings {
            unit: Unit::Millimeter,
            notation: Notation::Absolute,
            zeros: Zeros::Leading,
            number_format: NumberFormat::new(4, 6),
            angle_unit: "degree",
        }
    }
}

impl FileSettings {
    /// Sane defaults used when writing a file and the caller supplied none.
    pub fn defaults() -> Self {
        Self::default()
    }

    pub fn is_metric(&self) -> bool {
        self.unit == Unit::Millimeter
    }

    pub fn is_inch(&self) -> bool {
        self.unit == Unit::Inch
    }

    pub fn is_absolute(&self) -> bool {
        self.notation == Notation::Absolute
    }

    pub fn is_incremental(&self) -> bool {
        self.notation == Notation::Incremental
    }

    /// Convert `value` (already in this file's unit) into `target`.
    pub fn unit(&self, value: f64, from: Unit) -> f64 {
        from.convert_to(self.unit, value)
    }

    fn pad(&self) -> Result<(usize, usize), GerberError> {
        let integer = self.number_format.integer.unwrap_or(2) as usize;
        let fractional = self.number_format.fractional.unwrap_or(4) as usize;
        if integer > 6 || fractional > 7 {
            return Err(GerberError::PrecisionOutOfRange { integer, fractional });
        }
        Ok((integer, fractional))
    }

    /// Parse a raw coordinate token (no sign, already stripped): if it
    /// contains a decimal point, parse directly as a float; otherwise split
    /// according to the zero-suppression policy.
    pub fn parse_gerber_value(&self, token: Option<&str>) -> Result<Option<f64>, GerberError> {
        let token = match token {
            None | Some("") => return Ok(None),
            Some(t) => t,
        };

        if token.contains('.') {
            return token
                .parse::<f64>()
                .map(Some)
                .map_err(|_| GerberError::Syntax(format!("invalid decimal number {token:?}")));
        }

        let (integer, fractional) = match self.number_format {
            NumberFormat { integer: Some(i), fractional: Some(f) } => (i as usize, f as usize),
            _ => {
                return Err(GerberError::Syntax(format!(
                    "no number format set and value {token:?} has no decimal point"
                )))
            }
        };

        let digits = match self.zeros {
            // Leading-zero suppression: token is missing leading zeros, so it
            // is right-padded up to (integer + fractional) width and the
            // fractional part is read off the right.
            Zeros::Leading | Zeros::None => {
                let width = integer + fractional;
                if token.len() >= width {
                    token.to_string()
                } else {
                    format!("{token:0>width$}", width = width)
                }
            }
            // Trailing-zero suppression: token is missing trailing zeros, so
            // it is left-padded (conceptually) and the integer part is read
            // off the left; in practice this means right-padding with zeros
            // up to the full width works the same way once aligned at the
            // decimal point from the left.
            Zeros::Trailing => {
                let width = integer + fractional;
                if token.len() >= width {
                    token.to_string()
                } else {
                    format!("{token:0<width$}", width = width)
                }
            }
        };

        let split = digits.len().saturating_sub(fractional);
        let (int_part, frac_part) = digits.split_at(split.min(digits.len()));
        let combined = format!("{int_part}.{frac_part}");
        combined
            .parse::<f64>()
            .map(Some)
            .map_err(|_| GerberError::Syntax(format!("invalid fixed-point number {token:?}")))
    }

    /// Format `value` as a Gerber coordinate token under this file's settings.
    pub fn write_gerber_value(&self, value: f64) -> Result<String, GerberError> {
        let (integer, fractional) = self.pad()?;
        let scaled = (value * 10f64.powi(fractional as i32)).round() as i64;
        if scaled == 0 {
            return Ok("0".to_string());
        }
        let sign = if scaled < 0 { "-" } else { "" };
        let digits = format!("{:0width$}", scaled.abs(), width = integer + fractional);
        let out = match self.zeros {
            Zeros::Leading | Zeros::None => {
                let trimmed = digits.trim_start_matches('0');
                if trimmed.is_empty() { "0" } else { trimmed }.to_string()
            }
            Zeros::Trailing => {
                let trimmed = digits.trim_end_matches('0');
                if trimmed.is_empty() { "0" } else { trimmed }.to_string()
            }
        };
        Ok(format!("{sign}{out}"))
    }

    /// Format `value` for Excellon/XNC output, which always uses an explicit
    /// decimal point and no suppression.
    pub fn write_excellon_value(&self, value: f64) -> String {
        let fractional = self.number_format.fractional.unwrap_or(4) as usize;
        format!("{value:.fractional$}")
    }
}

/// IPC-D-356 length/number helpers. Values are unit-scaled integers: ten
/// thousandths of an inch, or thousandths of a millimeter.
impl FileSettings {
    /// Interpret `value` (already in this file's angle unit) as radians.
    pub fn to_radian(&self, value: f64) -> f64 {
        if self.angle_unit == "radian" { value } else { value.to_radians() }
    }

    /// Parse an IPC-356 coordinate field, stripping an optional leading
    /// letter tag (`X`/`Y`) if present. Returns `default` if `token` is
    /// `None` or blank, matching a record whose coordinate didn't change
    /// from the previous one in its chain.
    pub fn parse_ipc_length(&self, token: Option<&str>, default: Option<f64>) -> Option<f64> {
        let token = token?.trim();
        if token.is_empty() {
            return default;
        }
        let numeric = if token.starts_with(|c: char| c.is_ascii_alphabetic()) { &token[1..] } else { token };
        let value: i64 = numeric.parse().ok()?;
        let scale = if self.is_inch() { 0.0001 } else { 0.001 };
        Some(value as f64 * scale)
    }

    /// Format a raw (already unit-scaled) integer into a fixed-width
    /// IPC-356 field, optionally tagged with `key` and sign.
    pub fn format_ipc_number(&self, value: Option<f64>, digits: usize, key: &str, sign: bool) -> String {
        match value {
            None => " ".repeat(digits + usize::from(sign) + key.len()),
            Some(v) => {
                let rounded = v.round() as i64;
                let width = digits + usize::from(sign);
                let body = if sign { format!("{rounded:+0width$}") } else { format!("{rounded:0width$}") };
                format!("{key}{body}")
            }
        }
    }

    /// Format `value` (in `from_unit`, or this file's unit if `None`) as a
    /// fixed-width IPC-356 length field.
    pub fn format_ipc_length(&self, value: Option<f64>, digits: usize, key: &str, from_unit: Option<Unit>, sign: bool) -> String {
        let scaled = value.map(|v| {
            let v = match from_unit {
                Some(u) => self.unit(v, u),
                None => v,
            };
            let divisor = if self.is_inch() { 0.0001 } else { 0.001 };
            v / divisor
        });
        self.format_ipc_number(scaled, digits, key, sign)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn leading_suppression_roundtrip() {
        let settings = FileSettings {
            unit: Unit::Millimeter,
            notation: Notation::Absolute,
            zeros: Zeros::Leading,
            number_format: NumberFormat::new(2, 6),
            angle_unit: "degree",
        };
        let value = settings.parse_gerber_value(Some("10000000")).unwrap().unwrap();
        assert!((value - 10.0).abs() < 1e-9);
        assert_eq!(settings.write_gerber_value(10.0).unwrap(), "10000000");
    }

    #[test]
    fn zero_renders_as_single_char() {
        let settings = FileSettings::default();
        assert_eq!(settings.write_gerber_value(0.0).unwrap(), "0");
    }

    #[test]
    fn precision_out_of_range_errors() {
        let settings = FileSettings {
            number_format: NumberFormat::new(7, 8),
            ..FileSettings::default()
        };
        assert!(settings.write_gerber_value(1.0).is_err());
    }

    #[test]
    fn decimal_point_parses_directly() {
        let settings = FileSettings::default();
        let value = settings.parse_gerber_value(Some("12.5")).unwrap().unwrap();
        assert!((value - 12.5).abs() < 1e-9);
    }

    #[test]
    fn unit_conversion_idempotent() {
        let v = Unit::Inch.convert_to(Unit::Millimeter, 1.0);
        assert!((v - 25.4).abs() < 1e-9);
        let back = Unit::Millimeter.convert_to(Unit::Inch, v);
        assert!((back - 1.0).abs() < 1e-9);
    }
}
