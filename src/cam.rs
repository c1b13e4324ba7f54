//! Shared layer-file behavior: bounding box, size, and compact SVG
//! rendering via line-run coalescing.

use crate::geometry::{sum_bounds, svg_rotation, svg_viewport, Bounds};
use crate::graphic_objects::GraphicObject;
use crate::graphic_primitives::GraphicPrimitive;
use crate::units::Unit;

/// Collects consecutive [`GraphicPrimitive::Line`]s that share polarity and
/// width into one SVG `<path>`, rather than emitting one `<line>` per
/// segment.
#[derive(Debug, Default)]
pub struct Polyline {
    coords: Vec<(f64, f64)>,
    polarity_dark: bool,
    width: f64,
}

impl Polyline {
    pub fn new() -> Self {
        Polyline { coords: Vec::new(), polarity_dark: true, width: 0.0 }
    }

    /// Try to extend this run with `line`. Returns `false` (without
    /// mutating `self`) if `line` doesn't continue from this run's last
    /// point with matching polarity/width, signaling the caller to flush
    /// and start a new run.
    pub fn append(&mut self, line: &GraphicPrimitive) -> bool {
        let GraphicPrimitive::Line { x1, y1, x2, y2, width, polarity_dark } = *line else {
            return false;
        };
        if self.coords.is_empty() {
            self.coords.push((x1, y1));
            self.coords.push((x2, y2));
            self.polarity_dark = polarity_dark;
            self.width = width;
            return true;
        }

        let &(x, y) = self.coords.last().unwrap();
        if self.polarity_dark == polarity_dark && (self.width - width).abs() < 1e-9 && (x1 - x).abs() < 1e-9 && (y1 - y).abs() < 1e-9 {
            self.coords.push((x2, y2));
            true
        } else {
            false
        }
    }

    pub fn to_svg(&self, fg: &str, bg: &str) -> Option<String> {
        if self.coords.is_empty() {
            return None;
        }
        let color = if self.polarity_dark { fg } else { bg };
        let (x0, y0) = self.coords[0];
        let mut d = format!("M {x0:.6} {y0:.6} ");
        d.push_str(
            &self.coords[1..]
                .iter()
                .map(|(x, y)| format!("L {x:.6} {y:.6}"))
                .collect::<Vec<_>>()
                .join(" "),
        );
        let width = if self.width.abs() < 1e-9 { "0.01mm".to_string() } else { format!("{:.6}", self.width) };
        Some(format!(
            "<path d=\"{d}\" style=\"fill: none; stroke: {color}; stroke-width: {width}; stroke-linejoin: round; stroke-linecap: round\"/>"
        ))
    }
}

/// Shared behavior for layer files ([`crate::gerber::GerberFile`],
/// [`crate::excellon::ExcellonFile`], [`crate::ipc356::Netlist`]).
pub trait CamFile {
    fn objects(&self) -> &[GraphicObject];

    fn bounding_box(&self, unit: Unit) -> Option<Bounds> {
        sum_bounds(self.objects().iter().map(|o| o.bounding_box(unit)))
    }

    fn size(&self, unit: Unit) -> (f64, f64) {
        match self.bounding_box(unit) {
            Some(((x0, y0), (x1, y1))) => (x1 - x0, y1 - y0),
            None => (0.0, 0.0),
        }
    }

    fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }

    /// Flatten every object to primitives in `svg_unit`, coalescing runs of
    /// touching same-style lines into single `<path>`s.
    fn svg_objects(&self, svg_unit: Unit, fg: &str, bg: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut run: Option<Polyline> = None;
        for obj in self.objects() {
            for primitive in obj.to_primitives(svg_unit) {
                if matches!(primitive, GraphicPrimitive::Line { .. }) {
                    match &mut run {
                        None => {
                            let mut pl = Polyline::new();
                            pl.append(&primitive);
                            run = Some(pl);
                        }
                        Some(pl) => {
                            if !pl.append(&primitive) {
                                if let Some(svg) = pl.to_svg(fg, bg) {
                                    out.push(svg);
                                }
                                let mut fresh = Polyline::new();
                                fresh.append(&primitive);
                                run = Some(fresh);
                            }
                        }
                    }
                } else {
                    if let Some(pl) = run.take() {
                        if let Some(svg) = pl.to_svg(fg, bg) {
                            out.push(svg);
                        }
                    }
                    out.push(primitive.to_svg(fg, bg));
                }
            }
        }
        if let Some(pl) = run {
            if let Some(svg) = pl.to_svg(fg, bg) {
                out.push(svg);
            }
        }
        out
    }

    /// Render a complete standalone SVG document. `force_bounds`, if given
    /// (already in `svg_unit`), overrides the computed bounding box, e.g. to
    /// keep several related renderings on a shared viewport.
    fn to_svg(&self, margin: f64, arg_unit: Unit, svg_unit: Unit, force_bounds: Option<Bounds>, fg: &str, bg: &str) -> String {
        let bounds = force_bounds.or_else(|| self.bounding_box(svg_unit)).unwrap_or(((0.0, 0.0), (0.0, 0.0)));
        let tags = self.svg_objects(svg_unit, fg, bg).join("\n");

        let ((content_min_x, content_min_y), (content_max_x, _)) = bounds;
        let content_h = bounds.1 .1 - content_min_y;
        let _ = content_max_x;
        let xform = format!(
            "translate({:.6} {:.6}) scale(1 -1) translate({:.6} {:.6})",
            content_min_x,
            content_min_y + content_h,
            -content_min_x,
            -content_min_y
        );
        let group = format!("<g transform=\"{xform}\">{tags}</g>");

        let (min_x, min_y, w, h) = svg_viewport(bounds, margin, arg_unit, svg_unit);
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"{:.6} {:.6} {:.6} {:.6}\" \
             width=\"{:.6}{u}\" height=\"{:.6}{u}\" style=\"background-color: {bg}\">{group}</svg>",
            min_x,
            min_y,
            w,
            h,
            w,
            h,
            u = svg_unit.shorthand(),
        )
    }
}

/// Used by rotated-rectangle and macro primitives; kept here alongside the
/// rest of the SVG assembly helpers rather than duplicated per call site.
pub fn rotation_transform(angle_rad: f64, cx: f64, cy: f64) -> String {
    svg_rotation(angle_rad, cx, cy)
}

#[cfg(test)]
mod test {
    use super::*;

    struct Fixture(Vec<GraphicObject>);
    impl CamFile for Fixture {
        fn objects(&self) -> &[GraphicObject] {
            &self.0
        }
    }

    #[test]
    fn polyline_coalesces_touching_segments() {
        let mut pl = Polyline::new();
        assert!(pl.append(&GraphicPrimitive::Line { x1: 0.0, y1: 0.0, x2: 1.0, y2: 0.0, width: 0.1, polarity_dark: true }));
        assert!(pl.append(&GraphicPrimitive::Line { x1: 1.0, y1: 0.0, x2: 2.0, y2: 0.0, width: 0.1, polarity_dark: true }));
        assert_eq!(pl.coords.len(), 3);
    }

    #[test]
    fn polyline_rejects_disjoint_segment() {
        let mut pl = Polyline::new();
        pl.append(&GraphicPrimitive::Line { x1: 0.0, y1: 0.0, x2: 1.0, y2: 0.0, width: 0.1, polarity_dark: true });
        assert!(!pl.append(&GraphicPrimitive::Line { x1: 5.0, y1: 5.0, x2: 6.0, y2: 5.0, width: 0.1, polarity_dark: true }));
    }

    #[test]
    fn empty_camfile_has_zero_size() {
        let fixture = Fixture(Vec::new());
        assert_eq!(fixture.size(Unit::Millimeter), (0.0, 0.0));
        assert!(fixture.is_empty());
    }

    #[test]
    fn to_svg_force_bounds_overrides_computed_viewport() {
        let fixture = Fixture(Vec::new());
        let natural = fixture.to_svg(0.0, Unit::Millimeter, Unit::Millimeter, None, "#000", "#fff");
        let forced = fixture.to_svg(0.0, Unit::Millimeter, Unit::Millimeter, Some(((0.0, 0.0), (50.0, 50.0))), "#000", "#fff");
        assert!(natural.contains("width=\"1.000000mm\""));
        assert!(forced.contains("width=\"50.000000mm\""));
    }
}
