//! GerberX2 attributes (`%TF%`/`%TA%`/`%TO%`/`%TD%`) and escaped field
//! strings.

use std::borrow::Cow;
use std::collections::HashMap;

/// A Gerber field string, which may contain `\uXXXX` escapes. Expansion
/// requires allocation, so parsing only marks a string `Escaped` when a `\`
/// is actually present and defers unescaping until [`EscapedString::unescape`]
/// is called.
#[derive(Clone, PartialEq, Debug)]
pub enum EscapedString<'a> {
    Unescaped(Cow<'a, str>),
    Escaped(Cow<'a, str>),
}

impl<'a> EscapedString<'a> {
    pub fn new_unescaped(value: impl Into<Cow<'a, str>>) -> Self {
        EscapedString::Unescaped(value.into())
    }

    pub fn new_escaped(value: impl Into<Cow<'a, str>>) -> Self {
        EscapedString::Escaped(value.into())
    }

    /// Parse a raw attribute field, auto-detecting whether it needs escaping.
    pub fn parse(value: &'a str) -> Self {
        if value.contains('\\') {
            EscapedString::new_escaped(value)
        } else {
            EscapedString::new_unescaped(value)
        }
    }

    /// Resolve `\uXXXX` escapes into their unicode codepoints.
    pub fn unescape(&self) -> Cow<'a, str> {
        match self {
            EscapedString::Unescaped(s) => s.clone(),
            EscapedString::Escaped(s) => {
                let mut out = String::with_capacity(s.len());
                let mut chars = s.chars().peekable();
                while let Some(c) = chars.next() {
                    if c == '\\' && chars.peek() == Some(&'u') {
                        chars.next();
                        let hex: String = chars.by_ref().take(4).collect();
                        if let Ok(code) = u32::from_str_radix(&hex, 16) {
                            if let Some(ch) = char::from_u32(code) {
                                out.push(ch);
                                continue;
                            }
                        }
                        out.push('\\');
                        out.push('u');
                        out.push_str(&hex);
                    } else {
                        out.push(c);
                    }
                }
                Cow::Owned(out)
            }
        }
    }
}

/// The three attribute namespaces a Gerber file tracks. File attributes
/// (`TF`) persist for the whole file; aperture attributes (`TA`) apply to
/// apertures defined while set; object attributes (`TO`) apply to graphic
/// objects created while set. All three share the same storage shape: a
/// name mapped to zero or more comma-separated values.
pub type AttributeDict = HashMap<String, Vec<String>>;

/// Parse the body of a `%TF...%`/`%TA...%`/`%TO...%` statement (after the
/// two-letter prefix has been stripped): `name,value,value,...`.
pub fn parse_attribute_body(body: &str) -> (String, Vec<String>) {
    let mut parts = body.split(',');
    let name = parts.next().unwrap_or("").to_string();
    let values = parts.map(|v| EscapedString::parse(v).unescape().into_owned()).collect();
    (name, values)
}

/// Serialize one attribute as the body of a `%T?...%` statement.
pub fn format_attribute(name: &str, values: &[String]) -> String {
    if values.is_empty() {
        name.to_string()
    } else {
        format!("{name},{}", values.join(","))
    }
}

/// Well-known `%TF%` file attribute names. Not exhaustive, but covers
/// every attribute the crate inspects directly (e.g. to guess a dialect
/// from `.GenerationSoftware`, or identify a layer from `.FileFunction`).
pub mod names {
    pub const PART: &str = ".Part";
    pub const FILE_FUNCTION: &str = ".FileFunction";
    pub const FILE_POLARITY: &str = ".FilePolarity";
    pub const GENERATION_SOFTWARE: &str = ".GenerationSoftware";
    pub const CREATION_DATE: &str = ".CreationDate";
    pub const PROJECT_ID: &str = ".ProjectId";
    pub const MD5: &str = ".MD5";
    pub const SAME_COORDINATES: &str = ".SameCoordinates";
    pub const APERTURE_FUNCTION: &str = ".AperFunction";
    pub const DRILL_TOLERANCE: &str = ".DrillTolerance";
    pub const NET: &str = ".N";
    pub const PIN: &str = ".P";
    pub const COMPONENT: &str = ".C";
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_multi_value_body() {
        let (name, values) = parse_attribute_body(".FileFunction,Copper,L1,Top");
        assert_eq!(name, ".FileFunction");
        assert_eq!(values, vec!["Copper", "L1", "Top"]);
    }

    #[test]
    fn unescape_resolves_unicode_escape() {
        let s = EscapedString::parse("Caf\\u00e9");
        assert_eq!(s.unescape(), "Café");
    }

    #[test]
    fn roundtrip_format() {
        assert_eq!(format_attribute(".Part", &["Single".to_string()]), ".Part,Single");
    }
}
