//! Parsing, manipulation, generation and SVG rendering of Gerber (RS-274X/X2),
//! Excellon/XNC and IPC-D-356 PCB fabrication artwork.
//!
//! ## Layout
//!
//! * [`units`] — length units and the per-file numeric format (`FileSettings`).
//! * [`geometry`] — point/arc/bounding-box math and SVG path helpers shared
//!   by every renderer.
//! * [`expression`] / [`macros`] — aperture-macro arithmetic and primitives.
//! * [`graphic_primitives`] / [`apertures`] — the flattened drawing
//!   primitives apertures expand into.
//! * [`graphic_objects`] — the higher-level flashes/lines/arcs/regions that
//!   make up a layer.
//! * [`attribute`] — GerberX2 `%TF%`/`%TA%`/`%TO%`/`%TD%` attributes.
//! * [`cam`] — behavior shared by every layer-file type (bounding box, SVG).
//! * [`gerber`] — RS-274X/X2 parsing and generation.
//! * [`excellon`] — Excellon/XNC drill-file parsing and generation.
//! * [`ipc356`] — IPC-D-356 netlist parsing and generation.
//!
//! ## Implementation notes
//!
//! Statements are tokenized with plain string splitting rather than a
//! generated grammar; `nom` is used locally for the small fixed-shape
//! pieces (coordinate field lists, numeric literals) where a combinator
//! reads more clearly than manual slicing.

pub mod apertures;
pub mod attribute;
pub mod cam;
pub mod excellon;
pub mod expression;
pub mod geometry;
pub mod gerber;
pub mod graphic_objects;
pub mod graphic_primitives;
pub mod ipc356;
pub mod macros;
pub mod units;

use thiserror::Error;

pub use cam::CamFile;
pub use excellon::ExcellonFile;
pub use gerber::GerberFile;
pub use ipc356::Netlist;

pub(crate) type IResult<'a, T> = nom::IResult<&'a str, T>;

/// Everything that can go wrong parsing or serializing a Gerber, Excellon
/// or IPC-356 file.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GerberError {
    /// A statement, line or field didn't match the grammar at all, or had
    /// a value out of the format's valid range.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A `%FS%`/header format spec asked for more digits than this crate
    /// supports (6 integer, 7 fractional).
    #[error("coordinate format {integer}.{fractional} exceeds the supported precision")]
    PrecisionOutOfRange { integer: usize, fractional: usize },

    /// An `%IF%` include file request was rejected: either includes are
    /// disabled, the path escapes the configured include directory, or the
    /// file could not be found.
    #[error("include file error: {0}")]
    IncludePath(String),
}

/// One warning recorded while parsing a file: a condition that doesn't
/// block parsing but that a caller may want to surface (an unsupported
/// deprecated command, a missing end-of-file marker, an unrecognized
/// record type).
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub file: Option<String>,
    pub line: usize,
    pub text: String,
    pub message: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gerber_error_messages_are_human_readable() {
        let err = GerberError::PrecisionOutOfRange { integer: 7, fractional: 8 };
        assert!(err.to_string().contains("7.8"));
    }
}
