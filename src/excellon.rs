//! Excellon/XNC drill file parsing, manipulation and serialization.

use std::collections::HashMap;

use log::warn;

use crate::apertures::Aperture;
use crate::attribute::AttributeDict;
use crate::cam::CamFile;
use crate::graphic_objects::{ExcellonSink, GraphicObject};
use crate::units::{FileSettings, Notation, NumberFormat, Unit, Zeros};
use crate::{Diagnostic, GerberError};

/// Excellon's two-phase structure: a header of tool definitions followed
/// by the drill/route program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Header,
    Drilling,
    Routing,
}

/// Serializer state. Implements [`ExcellonSink`] so [`GraphicObject`] can
/// emit its own statements.
#[derive(Debug, Clone)]
pub struct ExcellonContext {
    pub settings: FileSettings,
    pub current_tool: Option<u32>,
    pub mode: ProgramState,
    pub current_point: (f64, f64),
}

impl ExcellonContext {
    pub fn new(settings: FileSettings) -> Self {
        ExcellonContext { settings, current_tool: None, mode: ProgramState::Drilling, current_point: (0.0, 0.0) }
    }
}

impl ExcellonSink for ExcellonContext {
    fn settings(&self) -> FileSettings {
        self.settings
    }

    fn select_tool(&mut self, tool: &Aperture) -> Vec<String> {
        let code = tool_code(tool);
        if self.current_tool == Some(code) {
            return Vec::new();
        }
        self.current_tool = Some(code);
        vec![format!("T{code:02}")]
    }

    fn drill_mode(&mut self) -> Vec<String> {
        if self.mode == ProgramState::Drilling {
            return Vec::new();
        }
        self.mode = ProgramState::Drilling;
        vec!["G05".to_string()]
    }

    fn route_mode(&mut self, unit: Unit, x: f64, y: f64) -> Vec<String> {
        let (x, y) = unit.convert_point(self.settings.unit, (x, y));
        self.mode = ProgramState::Routing;
        self.current_point = (x, y);
        vec![format!("G00X{}Y{}", self.settings.write_excellon_value(x), self.settings.write_excellon_value(y))]
    }

    fn set_current_point(&mut self, unit: Unit, x: f64, y: f64) {
        self.current_point = unit.convert_point(self.settings.unit, (x, y));
    }
}

fn tool_code(tool: &Aperture) -> u32 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    format!("{tool:?}").hash(&mut hasher);
    1 + (hasher.finish() % 99) as u32
}

/// Everything captured while reading one Excellon source file.
#[derive(Debug, Clone, Default)]
pub struct ExcellonFile {
    pub objects: Vec<GraphicObject>,
    pub comments: Vec<String>,
    pub import_settings: Option<FileSettings>,
    pub generator_hints: Vec<String>,
    pub tools: HashMap<u32, Aperture>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CamFile for ExcellonFile {
    fn objects(&self) -> &[GraphicObject] {
        &self.objects
    }
}

impl ExcellonFile {
    pub fn parse(data: &str, override_settings: Option<FileSettings>) -> Result<ExcellonFile, GerberError> {
        ExcellonParser::new(override_settings).parse(data)
    }

    pub fn generator(&self) -> Option<String> {
        self.generator_hints.first().cloned()
    }

    pub fn is_plated(&self) -> bool {
        self.tools.values().all(|t| matches!(t, Aperture::ExcellonTool { plated: Some(true), .. }))
    }

    pub fn is_nonplated(&self) -> bool {
        self.tools.values().all(|t| matches!(t, Aperture::ExcellonTool { plated: Some(false), .. }))
    }

    pub fn is_plating_unknown(&self) -> bool {
        self.tools.values().all(|t| matches!(t, Aperture::ExcellonTool { plated: None, .. }))
    }

    pub fn is_mixed_plating(&self) -> bool {
        !self.is_plated() && !self.is_nonplated() && !self.is_plating_unknown()
    }

    /// Partition into (plated, non-plated, unknown) sub-files, mirroring
    /// `split_by_plating`.
    pub fn split_by_plating(&self) -> (ExcellonFile, ExcellonFile, ExcellonFile) {
        let mut plated = self.empty_like();
        let mut nonplated = self.empty_like();
        let mut unknown = self.empty_like();
        for obj in &self.objects {
            let GraphicObject::Flash { aperture, .. } = obj else { continue };
            let Aperture::ExcellonTool { plated: p, .. } = aperture else { continue };
            match p {
                Some(true) => plated.objects.push(obj.clone()),
                Some(false) => nonplated.objects.push(obj.clone()),
                None => unknown.objects.push(obj.clone()),
            }
        }
        (plated, nonplated, unknown)
    }

    fn empty_like(&self) -> ExcellonFile {
        ExcellonFile {
            import_settings: self.import_settings,
            tools: self.tools.clone(),
            generator_hints: self.generator_hints.clone(),
            ..ExcellonFile::default()
        }
    }

    pub fn hit_count(&self) -> usize {
        self.objects.iter().filter(|o| matches!(o, GraphicObject::Flash { .. })).count()
    }

    pub fn drill_sizes(&self, unit: Unit) -> Vec<f64> {
        let mut sizes: Vec<f64> = self
            .tools
            .values()
            .filter_map(|t| match t {
                Aperture::ExcellonTool { diameter, unit: u, .. } => Some(u.convert_to(unit, *diameter)),
                _ => None,
            })
            .collect();
        sizes.sort_by(|a, b| a.partial_cmp(b).unwrap());
        sizes
    }

    pub fn drills(&self) -> impl Iterator<Item = &GraphicObject> {
        self.objects.iter().filter(|o| matches!(o, GraphicObject::Flash { .. }))
    }

    pub fn slots(&self) -> impl Iterator<Item = &GraphicObject> {
        self.objects.iter().filter(|o| matches!(o, GraphicObject::Line { .. } | GraphicObject::Arc { .. }))
    }

    /// Sum of route segment lengths, the Excellon analogue of a routed-slot
    /// bill of materials entry.
    pub fn path_lengths(&self, unit: Unit) -> HashMap<u32, f64> {
        let mut out: HashMap<u32, f64> = HashMap::new();
        for obj in &self.objects {
            let (aperture, length) = match obj {
                GraphicObject::Line { aperture, .. } | GraphicObject::Arc { aperture, .. } => (aperture, obj.curve_length(unit)),
                _ => continue,
            };
            if let Some(ap) = aperture {
                *out.entry(tool_code(ap)).or_insert(0.0) += length;
            }
        }
        out
    }

    pub fn offset(&mut self, dx: f64, dy: f64, unit: Unit) {
        for obj in &mut self.objects {
            obj.offset(dx, dy, unit);
        }
    }

    pub fn rotate(&mut self, angle: f64, cx: f64, cy: f64, unit: Unit) {
        let _ = unit;
        for obj in &mut self.objects {
            obj.rotate(angle, cx, cy);
        }
    }

    pub fn merge(&mut self, other: ExcellonFile) {
        self.objects.extend(other.objects);
        self.comments.extend(other.comments);
        self.tools.extend(other.tools);
    }

    pub fn to_excellon(&self) -> String {
        let settings = self.import_settings.unwrap_or(FileSettings { unit: Unit::Millimeter, ..FileSettings::defaults() });
        let mut ctx = ExcellonContext::new(settings);
        let mut out = vec!["M48".to_string()];
        out.push(format!(
            "{},{},{}.{}",
            if settings.is_metric() { "METRIC" } else { "INCH" },
            if settings.zeros == Zeros::Leading { "LZ" } else { "TZ" },
            "0".repeat(settings.number_format.integer.unwrap_or(3) as usize),
            "0".repeat(settings.number_format.fractional.unwrap_or(3) as usize),
        ));
        let mixed_plating = self.is_mixed_plating();
        let mut codes: Vec<(u32, &Aperture)> = self.tools.iter().map(|(k, v)| (*k, v)).collect();
        codes.sort_by_key(|(k, _)| *k);
        for (code, tool) in codes {
            if mixed_plating {
                if let Aperture::ExcellonTool { plated, .. } = tool {
                    out.push(if *plated == Some(true) { ";TYPE=PLATED".to_string() } else { ";TYPE=NON_PLATED".to_string() });
                }
            }
            out.push(format!("T{code:02}{}", tool.to_xnc(&settings)));
        }
        out.push("%".to_string());
        for obj in &self.objects {
            out.extend(obj.to_xnc(&mut ctx));
        }
        out.push("M30".to_string());
        out.join("\n")
    }
}

/// Free-function dialect-detection helpers, kept separate from
/// `ExcellonFile::parse` so callers compose them explicitly with sidecar
/// files rather than the core parser reaching into the filesystem.
pub fn parse_allegro_ncparam(data: &str) -> Result<FileSettings, GerberError> {
    let mut settings = FileSettings { number_format: NumberFormat::unknown(), ..FileSettings::defaults() };
    let (mut lz_supp, mut tz_supp) = (false, false);

    for raw in data.lines() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix("FORMAT ") {
            if let Some((i, f)) = rest.split_once('.') {
                settings.number_format = NumberFormat::new(i.trim().parse().unwrap_or(2), f.trim().parse().unwrap_or(4));
            }
        } else if let Some(rest) = line.strip_prefix("INTEGER-PLACES ") {
            let frac = settings.number_format.fractional.unwrap_or(4);
            settings.number_format = NumberFormat::new(rest.trim().parse().unwrap_or(2), frac);
        } else if let Some(rest) = line.strip_prefix("DECIMAL-PLACES ") {
            let int = settings.number_format.integer.unwrap_or(2);
            settings.number_format = NumberFormat::new(int, rest.trim().parse().unwrap_or(4));
        } else if let Some(rest) = line.strip_prefix("COORDINATES ") {
            settings.notation = if rest.trim().eq_ignore_ascii_case("ABSOLUTE") { Notation::Absolute } else { Notation::Incremental };
        } else if let Some(rest) = line.strip_prefix("OUTPUT-UNITS ") {
            settings.unit = if rest.trim() == "METRIC" { Unit::Millimeter } else { Unit::Inch };
        } else if let Some(rest) = line.strip_prefix("SUPPRESS-LEAD-ZEROES ") {
            lz_supp = rest.trim() == "YES";
        } else if let Some(rest) = line.strip_prefix("SUPPRESS-TRAIL-ZEROES ") {
            tz_supp = rest.trim() == "YES";
        }
    }

    if lz_supp && tz_supp {
        return Err(GerberError::Syntax(
            "Allegro nc_param specifies both leading and trailing zero suppression".to_string(),
        ));
    }
    settings.zeros = if lz_supp { Zeros::Leading } else { Zeros::Trailing };
    Ok(settings)
}

pub fn parse_allegro_logfile(data: &str) -> HashMap<u32, Aperture> {
    let mut found = HashMap::new();
    let mut unit = Unit::Millimeter;
    for raw in data.lines() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix("OUTPUT-UNITS ") {
            unit = if rest.trim() == "METRIC" { Unit::Millimeter } else { Unit::Inch };
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(first) = fields.next().and_then(|t| t.strip_prefix('T')) else { continue };
        let Ok(index1) = first.parse::<u32>() else { continue };
        let Some(second) = fields.next().and_then(|t| t.strip_suffix('.')) else { continue };
        let Ok(index2) = second.parse::<u32>() else { continue };
        if index1 != index2 {
            return HashMap::new();
        }
        let Some(dia_str) = fields.next() else { continue };
        let Ok(mut diameter) = dia_str.parse::<f64>() else { continue };
        if unit == Unit::Inch {
            diameter /= 1000.0;
        }
        let plated = fields.find(|t| matches!(*t, "PLATED" | "NON_PLATED" | "OPTIONAL")).map(|t| t != "NON_PLATED");
        found.insert(index1, Aperture::ExcellonTool { diameter, plated, unit, attrs: AttributeDict::new() });
    }
    found
}

pub fn parse_zuken_logfile(data: &str) -> Option<FileSettings> {
    let lines: Vec<&str> = data.lines().map(|l| l.trim()).collect();
    if !lines.contains(&"*****  DRILL LIST  *****") {
        return None;
    }
    let mut params = HashMap::new();
    for line in &lines {
        if let Some((key, value)) = line.split_once(':') {
            if !value.trim().is_empty() {
                params.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    let fmt = params.get("Coordinate Format")?;
    let (integer, decimal) = fmt.split_once('V')?;
    let mut settings = FileSettings {
        number_format: NumberFormat::new(integer.parse().ok()?, decimal.parse().ok()?),
        ..FileSettings::defaults()
    };
    if let Some(supp) = params.get("Zero Suppress") {
        let word = supp.split_whitespace().next().unwrap_or("");
        settings.zeros = if word.eq_ignore_ascii_case("leading") { Zeros::Leading } else { Zeros::Trailing };
    }
    Some(settings)
}

/// Line-oriented reader over Excellon statements.
struct ExcellonParser {
    settings: FileSettings,
    override_settings: Option<FileSettings>,
    program_state: ProgramState,
    current_point: (f64, f64),
    current_tool: Option<u32>,
    notation_locked: bool,
    file: ExcellonFile,
    line_no: usize,
    /// Set by an Altium-style `;TYPE=PLATED`/`;TYPE=NON_PLATED` marker
    /// comment, applied to every tool definition parsed afterwards.
    current_plating: Option<bool>,
}

impl ExcellonParser {
    fn new(override_settings: Option<FileSettings>) -> Self {
        ExcellonParser {
            settings: override_settings.unwrap_or_default(),
            override_settings,
            program_state: ProgramState::Header,
            current_point: (0.0, 0.0),
            current_tool: None,
            notation_locked: override_settings.is_some(),
            file: ExcellonFile::default(),
            line_no: 0,
            current_plating: None,
        }
    }

    fn warn(&mut self, msg: impl Into<String>, line: impl Into<String>) {
        let diag = Diagnostic { file: None, line: self.line_no, text: line.into(), message: msg.into() };
        warn!("{}:{} {:?}: {}", diag.file.as_deref().unwrap_or("<input>"), diag.line, diag.text, diag.message);
        self.file.diagnostics.push(diag);
    }

    fn parse(mut self, data: &str) -> Result<ExcellonFile, GerberError> {
        for raw in data.lines() {
            self.line_no += 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            self.dispatch(line)?;
        }
        self.file.import_settings = Some(self.settings);
        Ok(self.file)
    }

    fn dispatch(&mut self, line: &str) -> Result<(), GerberError> {
        match line {
            "M48" => {
                self.program_state = ProgramState::Header;
                return Ok(());
            }
            "%" | "M95" => {
                self.program_state = ProgramState::Drilling;
                return Ok(());
            }
            "M30" | "M00" => {
                return Ok(());
            }
            "G05" => {
                self.program_state = ProgramState::Drilling;
                return Ok(());
            }
            "G00" => {
                self.program_state = ProgramState::Routing;
                return Ok(());
            }
            "G90" | "G91" | "G70" | "G71" => {
                self.warn("deprecated legacy mode command", line);
                return Ok(());
            }
            _ => {}
        }

        if let Some(rest) = line.strip_prefix(';') {
            match rest.trim() {
                "TYPE=PLATED" => {
                    self.current_plating = Some(true);
                    return Ok(());
                }
                "TYPE=NON_PLATED" => {
                    self.current_plating = Some(false);
                    return Ok(());
                }
                _ => {}
            }
            self.file.comments.push(rest.trim().to_string());
            return Ok(());
        }
        if line == "INCH" || line == "METRIC" || line.starts_with("METRIC,") || line.starts_with("INCH,") {
            self.parse_unit_header(line);
            return Ok(());
        }
        if let Some(rest) = line.strip_prefix('T') {
            return self.parse_tool(rest, line);
        }
        self.parse_coordinate_line(line)
    }

    fn parse_unit_header(&mut self, line: &str) {
        if self.notation_locked {
            return;
        }
        let mut parts = line.split(',');
        let unit = parts.next().unwrap_or("METRIC");
        self.settings.unit = if unit == "METRIC" { Unit::Millimeter } else { Unit::Inch };
        for part in parts {
            match part {
                "LZ" => self.settings.zeros = Zeros::Leading,
                "TZ" => self.settings.zeros = Zeros::Trailing,
                fmt if fmt.contains('.') => {
                    let (i, f) = fmt.trim_start_matches(|c: char| !c.is_ascii_digit() && c != '0').split_once('.').unwrap_or(("3", "3"));
                    self.settings.number_format = NumberFormat::new(i.len().max(1) as u8, f.len().max(1) as u8);
                }
                _ => {}
            }
        }
    }

    fn parse_tool(&mut self, rest: &str, line: &str) -> Result<(), GerberError> {
        let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(GerberError::Syntax(format!("malformed tool statement {line:?}")));
        }
        let code: u32 = rest[..digits_end].parse().map_err(|_| GerberError::Syntax(format!("invalid tool number in {line:?}")))?;
        let tail = &rest[digits_end..];
        if tail.is_empty() {
            self.current_tool = Some(code);
            return Ok(());
        }
        let diameter = tail
            .trim_start_matches('C')
            .parse::<f64>()
            .map_err(|_| GerberError::Syntax(format!("invalid tool diameter in {line:?}")))?;
        self.file.tools.insert(
            code,
            Aperture::ExcellonTool { diameter, plated: self.current_plating, unit: self.settings.unit, attrs: AttributeDict::new() },
        );
        Ok(())
    }

    fn parse_coordinate_line(&mut self, line: &str) -> Result<(), GerberError> {
        let (mode, body) = if let Some(rest) = line.strip_prefix("G01") {
            (Some(false), rest)
        } else if let Some(rest) = line.strip_prefix("G02") {
            (Some(true), rest)
        } else if let Some(rest) = line.strip_prefix("G03") {
            (Some(false), rest)
        } else {
            (None, line)
        };

        let (x, y, i, j) = parse_xyij(body)?;
        if x.is_none() && y.is_none() && i.is_none() && j.is_none() {
            return Err(GerberError::Syntax(format!("unrecognized Excellon statement {line:?}")));
        }

        let settings = self.settings;
        let (x0, y0) = self.current_point;
        let x = settings.parse_gerber_value(x)?.map(|v| if settings.is_absolute() { v } else { x0 + v }).unwrap_or(x0);
        let y = settings.parse_gerber_value(y)?.map(|v| if settings.is_absolute() { v } else { y0 + v }).unwrap_or(y0);

        let tool = self
            .current_tool
            .and_then(|t| self.file.tools.get(&t).cloned())
            .ok_or_else(|| GerberError::Syntax("operation with no tool selected".to_string()))?;
        let unit = settings.unit;

        match (self.program_state, mode) {
            (ProgramState::Routing, Some(clockwise)) => {
                let i = settings.parse_gerber_value(i)?.unwrap_or(0.0);
                let j = settings.parse_gerber_value(j)?.unwrap_or(0.0);
                self.file.objects.push(GraphicObject::Arc {
                    x1: x0,
                    y1: y0,
                    x2: x,
                    y2: y,
                    cx: i,
                    cy: j,
                    clockwise,
                    aperture: Some(tool),
                    unit,
                    polarity_dark: true,
                    attrs: AttributeDict::new(),
                });
            }
            (ProgramState::Routing, None) => {
                self.file.objects.push(GraphicObject::Line {
                    x1: x0,
                    y1: y0,
                    x2: x,
                    y2: y,
                    aperture: Some(tool),
                    unit,
                    polarity_dark: true,
                    attrs: AttributeDict::new(),
                });
            }
            _ => {
                self.program_state = ProgramState::Drilling;
                self.file.objects.push(GraphicObject::Flash { x, y, aperture: tool, unit, polarity_dark: true, attrs: AttributeDict::new() });
            }
        }
        self.current_point = (x, y);
        Ok(())
    }
}

fn parse_xyij(input: &str) -> Result<(Option<&str>, Option<&str>, Option<&str>, Option<&str>), GerberError> {
    fn field<'a>(input: &'a str, letter: char) -> (Option<&'a str>, &'a str) {
        let Some(rest) = input.strip_prefix(letter) else { return (None, input) };
        let end = rest.find(|c: char| !(c.is_ascii_digit() || c == '+' || c == '-' || c == '.')).unwrap_or(rest.len());
        (Some(&rest[..end]), &rest[end..])
    }
    let (x, rest) = field(input, 'X');
    let (y, rest) = field(rest, 'Y');
    let (i, rest) = field(rest, 'I');
    let (j, rest) = field(rest, 'J');
    if !rest.is_empty() {
        return Err(GerberError::Syntax(format!("trailing garbage in Excellon coordinate field: {rest:?}")));
    }
    Ok((x, y, i, j))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scenario_s4_flash() {
        let external = FileSettings {
            unit: Unit::Millimeter,
            notation: crate::units::Notation::Absolute,
            zeros: Zeros::Leading,
            number_format: NumberFormat::new(3, 3),
            angle_unit: "degree",
        };
        let src = "M48\nMETRIC,LZ,000.000\nT1C0.8\n%\nT1\nX1000Y2000\nM30";
        let file = ExcellonFile::parse(src, Some(external)).unwrap();
        assert_eq!(file.objects.len(), 1);
        match &file.objects[0] {
            GraphicObject::Flash { x, y, aperture, .. } => {
                assert!((*x - 1.0).abs() < 1e-9);
                assert!((*y - 2.0).abs() < 1e-9);
                let Aperture::ExcellonTool { diameter, .. } = aperture else { panic!("expected tool") };
                assert!((*diameter - 0.8).abs() < 1e-9);
            }
            other => panic!("expected flash, got {other:?}"),
        }
    }

    #[test]
    fn hit_count_and_plating_queries() {
        let src = "M48\nMETRIC,LZ,000.000\nT1C0.8\n%\nT1\nX1000Y2000\nX2000Y3000\nM30";
        let settings = FileSettings { zeros: Zeros::Leading, number_format: NumberFormat::new(3, 3), ..FileSettings::defaults() };
        let file = ExcellonFile::parse(src, Some(settings)).unwrap();
        assert_eq!(file.hit_count(), 2);
        assert!(file.is_plating_unknown());
    }

    #[test]
    fn zuken_logfile_rejected_when_marker_missing() {
        assert!(parse_zuken_logfile("nothing interesting here").is_none());
    }

    #[test]
    fn allegro_ncparam_rejects_conflicting_suppression() {
        let data = "SUPPRESS-LEAD-ZEROES YES\nSUPPRESS-TRAIL-ZEROES YES\n";
        assert!(parse_allegro_ncparam(data).is_err());
    }
}
