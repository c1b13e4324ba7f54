//! IPC-D-356 netlist read/write. Fixed-column text records describing
//! test points, conductors and board outlines.

use std::collections::{HashMap, HashSet};

use crate::geometry::rotate_point;
use crate::units::{FileSettings, NumberFormat, Unit, Zeros};
use crate::GerberError;

/// How a test record's pad is realized on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadType {
    ThroughHole,
    SmdPad,
    ToolingFeature,
    ToolingHole,
    NonplatedHole,
}

impl PadType {
    fn from_digit(d: u32) -> Result<Self, GerberError> {
        Ok(match d {
            1 => PadType::ThroughHole,
            2 => PadType::SmdPad,
            3 => PadType::ToolingFeature,
            4 => PadType::ToolingHole,
            6 => PadType::NonplatedHole,
            other => return Err(GerberError::Syntax(format!("unknown IPC-356 pad type {other}"))),
        })
    }

    fn digit(self) -> u32 {
        match self {
            PadType::ThroughHole => 1,
            PadType::SmdPad => 2,
            PadType::ToolingFeature => 3,
            PadType::ToolingHole => 4,
            PadType::NonplatedHole => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoldermaskInfo {
    None,
    Primary,
    Secondary,
    Both,
}

impl SoldermaskInfo {
    fn from_digit(d: u32) -> Result<Self, GerberError> {
        Ok(match d {
            0 => SoldermaskInfo::None,
            1 => SoldermaskInfo::Primary,
            2 => SoldermaskInfo::Secondary,
            3 => SoldermaskInfo::Both,
            other => return Err(GerberError::Syntax(format!("unknown IPC-356 soldermask info {other}"))),
        })
    }

    fn digit(self) -> u32 {
        match self {
            SoldermaskInfo::None => 0,
            SoldermaskInfo::Primary => 1,
            SoldermaskInfo::Secondary => 2,
            SoldermaskInfo::Both => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineType {
    BoardEdge,
    PanelEdge,
    ScoreLine,
    OtherFab,
}

impl OutlineType {
    fn parse(name: &str) -> Result<Self, GerberError> {
        Ok(match name {
            "BOARD_EDGE" => OutlineType::BoardEdge,
            "PANEL_EDGE" => OutlineType::PanelEdge,
            "SCORE_LINE" => OutlineType::ScoreLine,
            "OTHER_FAB" => OutlineType::OtherFab,
            other => return Err(GerberError::Syntax(format!("unknown IPC-356 outline type {other:?}"))),
        })
    }

    fn name(self) -> &'static str {
        match self {
            OutlineType::BoardEdge => "BOARD_EDGE",
            OutlineType::PanelEdge => "PANEL_EDGE",
            OutlineType::ScoreLine => "SCORE_LINE",
            OutlineType::OtherFab => "OTHER_FAB",
        }
    }
}

/// One `317`/`327`/`367` test record: a single test point, via or
/// tooling feature on the board.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRecord {
    pub pad_type: PadType,
    pub net_name: Option<String>,
    pub is_connected: bool,
    pub ref_des: Option<String>,
    pub is_via: bool,
    pub pin_num: Option<String>,
    pub is_middle: bool,
    pub hole_dia: Option<f64>,
    pub is_plated: Option<bool>,
    pub access_layer: Option<u32>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub w: Option<f64>,
    pub h: Option<f64>,
    pub rotation: f64,
    pub solder_mask: Option<SoldermaskInfo>,
    pub leftover: Option<String>,
    pub unit: Unit,
}

fn field(line: &str, at: usize) -> u8 {
    line.as_bytes().get(at).copied().unwrap_or(b' ')
}

fn slice(line: &str, from: usize, to: usize) -> &str {
    let end = to.min(line.len());
    let start = from.min(end);
    &line[start..end]
}

fn pad80(line: &str) -> String {
    if line.len() >= 80 {
        line.to_string()
    } else {
        format!("{line:<80}")
    }
}

impl TestRecord {
    pub fn rotate(&mut self, angle: f64, cx: f64, cy: f64) {
        self.rotation += angle;
        if let (Some(x), Some(y)) = (self.x, self.y) {
            let (nx, ny) = rotate_point(x, y, angle, cx, cy);
            self.x = Some(nx);
            self.y = Some(ny);
        }
    }

    pub fn offset(&mut self, dx: f64, dy: f64) {
        if let Some(x) = self.x.as_mut() {
            *x += dx;
        }
        if let Some(y) = self.y.as_mut() {
            *y += dy;
        }
    }

    pub fn parse(line: &str, settings: &FileSettings, net_name_map: &HashMap<String, String>) -> Result<TestRecord, GerberError> {
        let line = pad80(line);

        let pad_type = PadType::from_digit(
            field(&line, 1)
                .is_ascii_digit()
                .then(|| (field(&line, 1) - b'0') as u32)
                .ok_or_else(|| GerberError::Syntax(format!("invalid IPC-356 test record pad type in {line:?}")))?,
        )?;

        let raw_net = slice(&line, 3, 17).trim();
        let (net_name, is_connected) = if raw_net == "N/C" {
            (None, false)
        } else if raw_net.is_empty() {
            (None, true)
        } else {
            (Some(net_name_map.get(raw_net).cloned().unwrap_or_else(|| raw_net.to_string())), true)
        };

        let raw_ref = slice(&line, 20, 26).trim();
        let (is_via, ref_des) = if raw_ref == "VIA" { (true, None) } else { (false, (!raw_ref.is_empty()).then(|| raw_ref.to_string())) };

        let pin_num = slice(&line, 27, 31).trim();
        let pin_num = (!pin_num.is_empty()).then(|| pin_num.to_string());

        let is_middle = field(&line, 31) == b'M';

        let hole_dia = if field(&line, 32) == b'D' { settings.parse_ipc_length(Some(slice(&line, 33, 37)), None) } else { None };

        let is_plated = match field(&line, 37) {
            b'P' => Some(true),
            b'U' => Some(false),
            _ => None,
        };

        let access_layer = if field(&line, 38) == b'A' { slice(&line, 39, 41).trim().parse().ok() } else { None };

        let x = if field(&line, 41) == b'X' { settings.parse_ipc_length(Some(slice(&line, 42, 49)), None) } else { None };
        let y = if field(&line, 49) == b'Y' { settings.parse_ipc_length(Some(slice(&line, 50, 57)), None) } else { None };
        let w = if field(&line, 57) == b'X' { settings.parse_ipc_length(Some(slice(&line, 58, 62)), None) } else { None };
        let h = if field(&line, 62) == b'Y' { settings.parse_ipc_length(Some(slice(&line, 63, 67)), None) } else { None };

        let rotation = if field(&line, 67) == b'R' {
            let deg: f64 = slice(&line, 68, 71).trim().parse().unwrap_or(0.0);
            deg.to_radians()
        } else {
            0.0
        };

        let solder_mask = if field(&line, 72) == b'S' {
            Some(SoldermaskInfo::from_digit((field(&line, 73) - b'0') as u32)?)
        } else {
            None
        };

        let leftover = slice(&line, 74, line.len()).trim();
        let leftover = (!leftover.is_empty()).then(|| leftover.to_string());

        Ok(TestRecord {
            pad_type,
            net_name,
            is_connected,
            ref_des,
            is_via,
            pin_num,
            is_middle,
            hole_dia,
            is_plated,
            access_layer,
            x,
            y,
            w,
            h,
            rotation,
            solder_mask,
            leftover,
            unit: settings.unit,
        })
    }

    pub fn format(&self, settings: &FileSettings, net_name_map: &HashMap<String, String>) -> String {
        let ref_des: String = if self.is_via { "VIA".to_string() } else { self.ref_des.clone().unwrap_or_default() };
        let net_name = if self.is_connected {
            self.net_name.as_ref().map(|n| net_name_map.get(n).cloned().unwrap_or_else(|| n.clone())).unwrap_or_default()
        } else {
            "N/C".to_string()
        };

        let mut out = String::new();
        out.push('3');
        out.push_str(&self.pad_type.digit().to_string());
        out.push('7');
        out.push_str(&format!("{net_name:<14}")[..14]);
        out.push_str("   ");
        out.push_str(&format!("{ref_des:<6}")[..6]);
        out.push('-');
        out.push_str(&format!("{:<4}", self.pin_num.clone().unwrap_or_default())[..4]);
        out.push(if self.is_middle { 'M' } else { ' ' });
        out.push_str(&settings.format_ipc_length(self.hole_dia, 4, "D", Some(self.unit), false));
        out.push(match self.is_plated {
            Some(true) => 'P',
            Some(false) => 'U',
            None => ' ',
        });
        out.push_str(&settings.format_ipc_number(self.access_layer.map(|v| v as f64), 2, "A", false));
        out.push_str(&settings.format_ipc_length(self.x, 6, "X", Some(self.unit), true));
        out.push_str(&settings.format_ipc_length(self.y, 6, "Y", Some(self.unit), true));
        out.push_str(&settings.format_ipc_length(self.w, 4, "X", Some(self.unit), false));
        out.push_str(&settings.format_ipc_length(self.h, 4, "Y", Some(self.unit), false));
        out.push_str(&settings.format_ipc_number(Some(self.rotation.to_degrees()), 3, "R", false));
        out.push(' ');
        out.push_str(&settings.format_ipc_number(self.solder_mask.map(|m| m.digit() as f64), 1, "S", false));
        out.push_str(&format!("{:<6}", self.leftover.clone().unwrap_or_default()));
        out
    }
}

/// Parse a whitespace-separated `X<n>Y<n>` coordinate chain split on `*`
/// into loops, each a sequence of absolute points.
pub fn parse_coord_chain(line: &str, settings: &FileSettings) -> Result<Vec<Vec<(f64, f64)>>, GerberError> {
    let mut chains = Vec::new();
    let mut x: Option<f64> = None;
    let mut y: Option<f64> = None;
    for segment in line.split('*') {
        let mut coords = Vec::new();
        for coord in segment.split_whitespace() {
            let (x_tok, y_tok) = split_xy_token(coord)?;
            x = settings.parse_ipc_length(x_tok, x);
            y = settings.parse_ipc_length(y_tok, y);
            let (cx, cy) = (
                x.ok_or_else(|| GerberError::Syntax("outline or conductor coordinate chain is missing an X coordinate at the start".to_string()))?,
                y.ok_or_else(|| GerberError::Syntax("outline or conductor coordinate chain is missing a Y coordinate at the start".to_string()))?,
            );
            coords.push((cx, cy));
        }
        chains.push(coords);
    }
    Ok(chains)
}

fn split_xy_token(token: &str) -> Result<(Option<&str>, Option<&str>), GerberError> {
    let mut rest = token;
    let mut x_tok = None;
    if let Some(after) = rest.strip_prefix('X') {
        let end = digit_run_end(after);
        x_tok = Some(&token[..end + 1]);
        rest = &after[end..];
    }
    let mut y_tok = None;
    if let Some(after) = rest.strip_prefix('Y') {
        let end = digit_run_end(after);
        let start = token.len() - rest.len();
        y_tok = Some(&token[start..start + end + 1]);
    }
    Ok((x_tok, y_tok))
}

fn digit_run_end(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    i
}

/// Format a sequence of points as `X<n>Y<n>` fields, wrapping onto
/// continuation lines prefixed with `cont` once a line would exceed 80
/// columns.
pub fn format_coord_chain(first_line: &str, settings: &FileSettings, coords: &[(f64, f64)], cont: &str, unit: Unit) -> Vec<String> {
    let mut out = Vec::new();
    let mut line = first_line.to_string();
    for &(x, y) in coords {
        let mut coord = settings.format_ipc_length(Some(x), 6, "X", Some(unit), true);
        coord.push_str(&settings.format_ipc_length(Some(y), 6, "Y", Some(unit), true));

        if line.len() + coord.len() <= 80 {
            line.push_str(&coord);
            line.push(' ');
            if line.len() > 80 {
                line.truncate(80);
            }
        } else {
            out.push(line);
            line = format!("{cont} {coord} ");
        }
    }
    out.push(line);
    out
}

/// A `389` board/panel outline or score line: a single closed loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    pub outline_type: OutlineType,
    pub outline: Vec<(f64, f64)>,
    pub unit: Unit,
}

impl Outline {
    pub fn parse(line: &str, settings: &FileSettings) -> Result<Vec<Outline>, GerberError> {
        let outline_type = OutlineType::parse(slice(line, 3, 17).trim())?;
        let chains = parse_coord_chain(slice(line, 22, line.len()), settings)?;
        Ok(chains.into_iter().map(|outline| Outline { outline_type, outline, unit: settings.unit }).collect())
    }

    pub fn format(&self, settings: &FileSettings) -> Vec<String> {
        let first = format!("389{:<14}     ", self.outline_type.name());
        format_coord_chain(&first, settings, &self.outline, "089", self.unit)
    }

    pub fn rotate(&mut self, angle: f64, cx: f64, cy: f64) {
        for p in &mut self.outline {
            *p = rotate_point(p.0, p.1, angle, cx, cy);
        }
    }

    pub fn offset(&mut self, dx: f64, dy: f64) {
        for p in &mut self.outline {
            p.0 += dx;
            p.1 += dy;
        }
    }
}

/// A `378` conductor trace segment: a net name, copper layer, aperture
/// size and point chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Conductor {
    pub net_name: Option<String>,
    pub layer: u32,
    pub aperture: (f64, Option<f64>),
    pub coords: Vec<(f64, f64)>,
    pub unit: Unit,
}

impl Conductor {
    pub fn parse(line: &str, settings: &FileSettings, net_name_map: &HashMap<String, String>) -> Result<Vec<Conductor>, GerberError> {
        let raw_net = slice(line, 3, 17).trim();
        let net_name = (!raw_net.is_empty()).then(|| net_name_map.get(raw_net).cloned().unwrap_or_else(|| raw_net.to_string()));

        if field(line, 18) != b'L' {
            return Err(GerberError::Syntax(format!("invalid IPC-356 layer number specification for conductor in line {line:?}")));
        }
        let layer: u32 = slice(line, 19, 21)
            .trim()
            .parse()
            .map_err(|_| GerberError::Syntax(format!("invalid IPC-356 conductor layer in line {line:?}")))?;

        let rest = slice(line, 22, line.len());
        let (aperture_def, coords_str) = rest.split_once(' ').unwrap_or((rest, ""));
        let (ax_tok, ay_tok) = split_xy_token(aperture_def)?;
        let ax = settings
            .parse_ipc_length(ax_tok, None)
            .ok_or_else(|| GerberError::Syntax(format!("invalid IPC-356 conductor aperture specification {aperture_def:?}")))?;
        let ay = settings.parse_ipc_length(ay_tok, None);

        let chains = parse_coord_chain(coords_str, settings)?;
        Ok(chains
            .into_iter()
            .map(|coords| Conductor { net_name: net_name.clone(), layer, aperture: (ax, ay), coords, unit: settings.unit })
            .collect())
    }

    pub fn format(&self, settings: &FileSettings, net_name_map: &HashMap<String, String>) -> Vec<String> {
        let net_name = self.net_name.as_ref().map(|n| net_name_map.get(n).cloned().unwrap_or_else(|| n.clone())).unwrap_or_default();
        let mut aperture_str = settings.format_ipc_length(Some(self.aperture.0), 5, "X", Some(self.unit), false);
        if let Some(ay) = self.aperture.1 {
            aperture_str.push_str(&settings.format_ipc_length(Some(ay), 5, "Y", Some(self.unit), false));
        }
        let first = format!("378{:<14} L{:02} {aperture_str} ", net_name, self.layer);
        format_coord_chain(&first, settings, &self.coords, "078", self.unit)
    }

    pub fn rotate(&mut self, angle: f64, cx: f64, cy: f64) {
        for p in &mut self.coords {
            *p = rotate_point(p.0, p.1, angle, cx, cy);
        }
    }

    pub fn offset(&mut self, dx: f64, dy: f64) {
        for p in &mut self.coords {
            p.0 += dx;
            p.1 += dy;
        }
    }
}

/// A parsed IPC-356 netlist: test records, conductors, board outlines and
/// net adjacency. Not a [`crate::cam::CamFile`]: its records describe
/// electrical/geometric facts about nets, not drawable graphic objects, so
/// it exposes its own query helpers instead.
#[derive(Debug, Clone, Default)]
pub struct Netlist {
    pub test_records: Vec<TestRecord>,
    pub conductors: Vec<Conductor>,
    pub outlines: Vec<Outline>,
    pub comments: Vec<String>,
    pub adjacency: HashMap<String, HashSet<String>>,
    pub params: Vec<(String, String)>,
    pub import_settings: Option<FileSettings>,
    pub generator_hints: Vec<String>,
}

impl Netlist {
    pub fn parse(data: &str) -> Result<Netlist, GerberError> {
        NetlistParser::new().parse(data)
    }

    /// Merge `other` into `self`, optionally prefixing each netlist's net
    /// names to keep them from colliding. Consumes `other`.
    pub fn merge(&mut self, mut other: Netlist, our_prefix: Option<&str>, their_prefix: Option<&str>) {
        self.prefix_nets(our_prefix);
        other.prefix_nets(their_prefix);

        self.test_records.append(&mut other.test_records);
        self.conductors.append(&mut other.conductors);
        self.outlines.append(&mut other.outlines);
        self.comments.append(&mut other.comments);
        self.adjacency.extend(other.adjacency);

        for (k, v) in other.params {
            if let Some(slot) = self.params.iter_mut().find(|(key, _)| *key == k) {
                slot.1 = v;
            } else {
                self.params.push((k, v));
            }
        }
        for key in ["JOB", "NUM", "REV", "VER"] {
            self.params.retain(|(k, _)| k != key);
        }
        self.params.push(("JOB".to_string(), "netlist merge".to_string()));
    }

    pub fn prefix_nets(&mut self, prefix: Option<&str>) {
        let Some(prefix) = prefix else { return };
        for record in &mut self.test_records {
            if let Some(name) = &mut record.net_name {
                *name = format!("{prefix}{name}");
            }
        }
        for conductor in &mut self.conductors {
            if let Some(name) = &mut conductor.net_name {
                *name = format!("{prefix}{name}");
            }
        }
        let mut new_adjacency = HashMap::new();
        for (key, others) in self.adjacency.drain() {
            new_adjacency.insert(format!("{prefix}{key}"), others.into_iter().map(|n| format!("{prefix}{n}")).collect());
        }
        self.adjacency = new_adjacency;
    }

    pub fn offset(&mut self, dx: f64, dy: f64) {
        for r in &mut self.test_records {
            r.offset(dx, dy);
        }
        for c in &mut self.conductors {
            c.offset(dx, dy);
        }
        for o in &mut self.outlines {
            o.offset(dx, dy);
        }
    }

    pub fn rotate(&mut self, angle: f64, cx: f64, cy: f64) {
        for r in &mut self.test_records {
            r.rotate(angle, cx, cy);
        }
        for c in &mut self.conductors {
            c.rotate(angle, cx, cy);
        }
        for o in &mut self.outlines {
            o.rotate(angle, cx, cy);
        }
    }

    pub fn net_names(&self) -> HashSet<String> {
        self.test_records.iter().filter_map(|r| r.net_name.clone()).collect()
    }

    pub fn vias(&self) -> impl Iterator<Item = &TestRecord> {
        self.test_records.iter().filter(|r| r.is_via)
    }

    pub fn reference_designators(&self) -> HashSet<String> {
        self.test_records.iter().filter_map(|r| r.ref_des.clone()).collect()
    }

    pub fn records_by_reference<'a>(&'a self, reference_designator: &'a str) -> impl Iterator<Item = &'a TestRecord> {
        self.test_records.iter().filter(move |r| r.ref_des.as_deref() == Some(reference_designator))
    }

    pub fn records_by_net_name<'a>(&'a self, net_name: &'a str) -> impl Iterator<Item = &'a TestRecord> {
        self.test_records.iter().filter(move |r| r.net_name.as_deref() == Some(net_name))
    }

    pub fn conductors_by_net_name<'a>(&'a self, net_name: &'a str) -> impl Iterator<Item = &'a Conductor> {
        self.conductors.iter().filter(move |c| c.net_name.as_deref() == Some(net_name))
    }

    pub fn conductors_by_layer(&self, layer: u32) -> impl Iterator<Item = &Conductor> {
        self.conductors.iter().filter(move |c| c.layer == layer)
    }

    pub fn to_ipc356(&self, settings: Option<FileSettings>, drop_comments: bool) -> String {
        let settings = settings.unwrap_or_else(|| {
            let mut s = self.import_settings.unwrap_or_default();
            s.zeros = Zeros::None;
            s.number_format = NumberFormat::new(5, 6);
            s
        });

        let mut lines = vec!["C  IPC-D-356 netlist export".to_string(), "C".to_string()];
        let job = self.params.iter().find(|(k, _)| k == "JOB").map(|(_, v)| v.clone()).unwrap_or_else(|| "netlist export".to_string());
        lines.push(format!("P  JOB {job}"));
        lines.push(if settings.is_inch() { "P  UNITS CUST 0".to_string() } else { "P  UNITS CUST 1".to_string() });

        if !drop_comments {
            for comment in &self.comments {
                lines.push(format!("C  {comment}"));
            }
        }
        for (name, value) in &self.params {
            if name == "JOB" {
                continue;
            }
            lines.push(format!("P  {name} {value}"));
        }

        let mut net_name_map = HashMap::new();
        let mut alias_lines = Vec::new();
        for (i, name) in self.net_names().into_iter().filter(|n| n.len() > 14).enumerate() {
            let alias = format!("NNAME{i}");
            alias_lines.push(format!("P  {alias} {name}"));
            net_name_map.insert(name, alias);
        }
        if !alias_lines.is_empty() {
            lines.push("C".to_string());
            lines.push("C  Net name mapping:".to_string());
            lines.push("C".to_string());
            lines.extend(alias_lines);
        }

        lines.push("C".to_string());
        lines.push("C  Test records:".to_string());
        lines.push("C".to_string());
        for record in &self.test_records {
            lines.push(record.format(&settings, &net_name_map));
        }

        if !self.conductors.is_empty() {
            lines.push("C".to_string());
            lines.push("C  Conductors:".to_string());
            lines.push("C".to_string());
            for conductor in &self.conductors {
                lines.extend(conductor.format(&settings, &net_name_map));
            }
        }

        if !self.outlines.is_empty() {
            lines.push("C".to_string());
            lines.push("C  Outlines:".to_string());
            lines.push("C".to_string());
            for outline in &self.outlines {
                lines.extend(outline.format(&settings));
            }
        }

        if !self.adjacency.is_empty() {
            lines.push("C".to_string());
            lines.push("C  Adjacency data:".to_string());
            lines.push("C".to_string());
            let mut done: HashSet<(String, String)> = HashSet::new();
            for (net, others) in &self.adjacency {
                let filtered: Vec<&String> =
                    others.iter().filter(|o| !done.contains(&(net.clone(), (*o).clone())) && !done.contains(&((*o).clone(), net.clone()))).collect();
                if filtered.is_empty() {
                    continue;
                }
                let mut line = format!("379 {net}");
                for other in &filtered {
                    if line.len() + 1 + other.len() > 80 {
                        lines.push(line);
                        line = format!("079 {other}");
                    } else {
                        line.push(' ');
                        line.push_str(other);
                    }
                    done.insert((net.clone(), (*other).clone()));
                }
                lines.push(line);
            }
        }

        lines.push("99".to_string());
        lines.join("\n")
    }
}

struct NetlistParser {
    has_unit: bool,
    settings: FileSettings,
    net_names: HashMap<String, String>,
    params: Vec<(String, String)>,
    comments: Vec<String>,
    test_records: Vec<TestRecord>,
    conductors: Vec<Conductor>,
    outlines: Vec<Outline>,
    adjacency: HashMap<String, HashSet<String>>,
    eof: bool,
    generator_hints: Vec<String>,
    line_no: usize,
}

impl NetlistParser {
    fn new() -> Self {
        NetlistParser {
            has_unit: false,
            settings: FileSettings::default(),
            net_names: HashMap::new(),
            params: Vec::new(),
            comments: Vec::new(),
            test_records: Vec::new(),
            conductors: Vec::new(),
            outlines: Vec::new(),
            adjacency: HashMap::new(),
            eof: false,
            generator_hints: Vec::new(),
            line_no: 0,
        }
    }

    fn warn(&self, msg: impl AsRef<str>) {
        log::warn!("{}: {}", self.line_no, msg.as_ref());
    }

    fn assert_unit(&self) -> Result<(), GerberError> {
        if !self.has_unit {
            return Err(GerberError::Syntax("IPC-356 netlist file does not contain a unit specification before its first record".to_string()));
        }
        Ok(())
    }

    /// Join multiline records: a continuation line starts with `0` followed
    /// by the parent record's type digits, and its content from column 3
    /// onward is appended to the accumulated line.
    fn parse(mut self, data: &str) -> Result<Netlist, GerberError> {
        let mut oldline = String::new();
        for (lineno, line) in data.lines().enumerate() {
            if !oldline.is_empty() {
                if line.starts_with('0') {
                    oldline.push_str(slice(line, 3, line.len()).trim_end());
                } else {
                    self.line_no = lineno;
                    self.parse_line(&oldline)?;
                    oldline = line.to_string();
                }
            } else {
                self.line_no = lineno;
                oldline = line.to_string();
            }
        }
        self.parse_line(&oldline)?;

        Ok(Netlist {
            test_records: self.test_records,
            conductors: self.conductors,
            outlines: self.outlines,
            comments: self.comments,
            adjacency: self.adjacency,
            params: self.params,
            import_settings: Some(self.settings),
            generator_hints: self.generator_hints,
        })
    }

    fn parse_line(&mut self, line: &str) -> Result<(), GerberError> {
        if line.is_empty() {
            return Ok(());
        }
        if self.eof {
            self.warn("data following IPC-356 end-of-file marker");
        }

        match field(line, 0) {
            b'C' => {
                let body = slice(line, 2, line.len()).trim();
                if body.contains("Ouptut") && body.contains("Allegro") {
                    self.generator_hints.push("allegro".to_string());
                } else if !body.contains("Ouptut") && body.contains("Allegro") {
                    self.warn("file looks like a newer Allegro export this parser doesn't specifically recognize");
                } else if body.contains("EAGLE") && body.contains("CadSoft") {
                    self.generator_hints.push("eagle".to_string());
                }

                if body.starts_with("NNAME") {
                    let mut parts = body.split_whitespace();
                    let name = parts.next().unwrap_or("").to_string();
                    let value: String = parts.collect::<Vec<_>>().join(" ");
                    self.warn("file contains non-standard Allegro-style net name alias definitions in comments");
                    let value = if self.generator_hints.iter().any(|h| h == "allegro") && value.len() > 5 { value[5..].to_string() } else { value };
                    self.net_names.insert(name, value);
                } else {
                    self.comments.push(body.to_string());
                }
            }
            b'P' => {
                let body = slice(line, 2, line.len());
                let mut parts = body.split_whitespace();
                let name = parts.next().unwrap_or("").to_string();
                let value: String = parts.collect::<Vec<_>>().join(" ");

                if name == "UNITS" {
                    match value.as_str() {
                        "CUST" | "CUST 0" => {
                            self.settings.unit = Unit::Inch;
                            self.settings.angle_unit = "degree";
                            self.has_unit = true;
                        }
                        "CUST 1" => {
                            self.settings.unit = Unit::Millimeter;
                            self.settings.angle_unit = "degree";
                            self.has_unit = true;
                        }
                        "CUST 2" => {
                            self.settings.unit = Unit::Inch;
                            self.settings.angle_unit = "radian";
                            self.has_unit = true;
                        }
                        other => return Err(GerberError::Syntax(format!("unsupported IPC-356 netlist unit specification {other:?}"))),
                    }
                } else if let Some(alias) = name.strip_prefix("NNAME") {
                    let _ = alias;
                    let value = if self.generator_hints.iter().any(|h| h == "allegro") && value.len() > 5 { value[5..].to_string() } else { value };
                    self.net_names.insert(name, value);
                } else if let Some(slot) = self.params.iter_mut().find(|(k, _)| *k == name) {
                    slot.1 = value;
                } else {
                    self.params.push((name, value));
                }
            }
            b'9' => {
                self.eof = true;
            }
            _ if matches!(slice(line, 0, 3), "317" | "327" | "367") => {
                self.assert_unit()?;
                self.test_records.push(TestRecord::parse(line, &self.settings, &self.net_names)?);
            }
            _ if slice(line, 0, 3) == "378" => {
                self.assert_unit()?;
                self.conductors.extend(Conductor::parse(line, &self.settings, &self.net_names)?);
            }
            _ if slice(line, 0, 3) == "379" => {
                let body = slice(line, 3, line.len()).trim();
                let mut parts = body.split_whitespace();
                if let Some(net) = parts.next() {
                    for other in parts {
                        self.adjacency.entry(net.to_string()).or_default().insert(other.to_string());
                        self.adjacency.entry(other.to_string()).or_default().insert(net.to_string());
                    }
                }
            }
            _ if slice(line, 0, 3) == "389" => {
                self.assert_unit()?;
                self.outlines.extend(Outline::parse(line, &self.settings)?);
            }
            _ => {
                self.warn(format!("unknown IPC-356 record type {:?}", slice(line, 0, 3)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_record() -> TestRecord {
        TestRecord {
            pad_type: PadType::ThroughHole,
            net_name: Some("TESTNET".to_string()),
            is_connected: true,
            ref_des: Some("U1".to_string()),
            is_via: false,
            pin_num: Some("3".to_string()),
            is_middle: false,
            hole_dia: Some(0.8),
            is_plated: Some(true),
            access_layer: None,
            x: Some(12.5),
            y: Some(-3.25),
            w: None,
            h: None,
            rotation: 0.0,
            solder_mask: None,
            leftover: None,
            unit: Unit::Millimeter,
        }
    }

    #[test]
    fn test_record_round_trips_through_format_and_parse() {
        let settings = FileSettings { unit: Unit::Millimeter, zeros: Zeros::None, number_format: NumberFormat::new(5, 6), ..FileSettings::default() };
        let net_name_map = HashMap::new();
        let line = sample_record().format(&settings, &net_name_map);
        let parsed = TestRecord::parse(&line, &settings, &net_name_map).unwrap();
        assert_eq!(parsed.pad_type, PadType::ThroughHole);
        assert_eq!(parsed.net_name.as_deref(), Some("TESTNET"));
        assert_eq!(parsed.ref_des.as_deref(), Some("U1"));
        assert!((parsed.x.unwrap() - 12.5).abs() < 1e-6);
        assert!((parsed.y.unwrap() + 3.25).abs() < 1e-6);
        assert!((parsed.hole_dia.unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(parsed.is_plated, Some(true));
    }

    #[test]
    fn netlist_round_trips_through_to_ipc356_and_parse() {
        let mut netlist = Netlist::default();
        netlist.params.push(("JOB".to_string(), "demo".to_string()));
        netlist.test_records.push(sample_record());
        let settings = FileSettings { unit: Unit::Millimeter, zeros: Zeros::None, number_format: NumberFormat::new(5, 6), ..FileSettings::default() };
        let text = netlist.to_ipc356(Some(settings), true);
        let reparsed = Netlist::parse(&text).unwrap();
        assert_eq!(reparsed.test_records.len(), 1);
        assert_eq!(reparsed.test_records[0].net_name.as_deref(), Some("TESTNET"));
    }

    #[test]
    fn rejects_record_before_unit_specification() {
        let settings = FileSettings { unit: Unit::Millimeter, zeros: Zeros::None, number_format: NumberFormat::new(5, 6), ..FileSettings::default() };
        let line = sample_record().format(&settings, &HashMap::new());
        let data = format!("{line}\n99\n");
        let err = Netlist::parse(&data).unwrap_err();
        assert!(matches!(err, GerberError::Syntax(_)));
    }

    #[test]
    fn parse_coord_chain_splits_on_asterisk_into_loops() {
        let settings = FileSettings { unit: Unit::Millimeter, ..FileSettings::default() };
        let chains = parse_coord_chain("X+001000Y+001000 X+002000 * X+000000Y+000000", &settings).unwrap();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].len(), 2);
        assert!((chains[0][0].0 - 1.0).abs() < 1e-9);
        assert!((chains[0][1].0 - 2.0).abs() < 1e-9);
        assert!((chains[0][1].1 - 1.0).abs() < 1e-9, "missing Y field should repeat the previous value");
    }

    #[test]
    fn net_name_prefixing_updates_records_and_adjacency() {
        let mut netlist = Netlist::default();
        netlist.test_records.push(TestRecord {
            pad_type: PadType::SmdPad,
            net_name: Some("GND".to_string()),
            is_connected: true,
            ref_des: Some("U1".to_string()),
            is_via: false,
            pin_num: None,
            is_middle: false,
            hole_dia: None,
            is_plated: None,
            access_layer: None,
            x: Some(0.0),
            y: Some(0.0),
            w: None,
            h: None,
            rotation: 0.0,
            solder_mask: None,
            leftover: None,
            unit: Unit::Millimeter,
        });
        netlist.adjacency.insert("GND".to_string(), HashSet::from(["VCC".to_string()]));
        netlist.prefix_nets(Some("A_"));
        assert_eq!(netlist.test_records[0].net_name.as_deref(), Some("A_GND"));
        assert!(netlist.adjacency.contains_key("A_GND"));
    }

    #[test]
    fn conductor_round_trips_through_format_and_parse() {
        let settings = FileSettings { unit: Unit::Millimeter, zeros: Zeros::None, number_format: NumberFormat::new(5, 6), ..FileSettings::default() };
        let net_name_map = HashMap::new();
        let conductor = Conductor {
            net_name: Some("GND".to_string()),
            layer: 2,
            aperture: (0.2, None),
            coords: vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)],
            unit: Unit::Millimeter,
        };
        let lines = conductor.format(&settings, &net_name_map);
        assert_eq!(lines.len(), 1);
        let parsed = Conductor::parse(&lines[0], &settings, &net_name_map).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].net_name.as_deref(), Some("GND"));
        assert_eq!(parsed[0].layer, 2);
        assert_eq!(parsed[0].coords.len(), 3);
        assert!((parsed[0].coords[1].0 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn outline_round_trips_through_format_and_parse() {
        let settings = FileSettings { unit: Unit::Millimeter, zeros: Zeros::None, number_format: NumberFormat::new(5, 6), ..FileSettings::default() };
        let outline = Outline { outline_type: OutlineType::BoardEdge, outline: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)], unit: Unit::Millimeter };
        let lines = outline.format(&settings);
        assert_eq!(lines.len(), 1);
        let parsed = Outline::parse(&lines[0], &settings).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].outline_type, OutlineType::BoardEdge);
        assert_eq!(parsed[0].outline.len(), 4);
    }
}
