//! Parsed form of the paint command stream.
//!
//! [`Decoder`] turns a stream into [`Instruction`] values one at a time and
//! never touches a surface; executing them is left to the interpreter and
//! the document.

use crate::paper::error::DecodeError;
use crate::paper::images::{FitMode, HAnchor, ImagePlacement, VAnchor};
use crate::paper::model::{Color, DeviceRect, FontMetrics, PaintMode};
use crate::paper::scanner::Scanner;

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `Z;` (hard) or `Zd;` (soft).
    Reset { hard: bool },
    /// `B` (paint now) or `b` (define only).
    Band(BandDef),
    /// `U`: repaint everything from the band store.
    Update,
    Line { x1: f64, y1: f64, x2: f64, y2: f64 },
    Rect { op: RectOp, rect: DeviceRect },
    RoundRect { mode: PaintMode, radius: f64, rect: DeviceRect },
    Text {
        mode: PaintMode,
        x: f64,
        y: f64,
        text: String,
        max_width: Option<f64>,
    },
    FillColor(Color),
    TextColor(Color),
    StrokeColor(Color),
    LineWidth(f64),
    Ellipse { mode: PaintMode, rect: DeviceRect },
    Image(ImagePlacement),
    FontFamily(String),
    Font { mask: u8, size: f64 },
    FontMetrics(FontMetrics),
    /// `X`: obsolete origin command, kept so old streams still decode.
    LegacyOrigin { x: f64, y: f64 },
    Transform { dx: f64, dy: f64, angle: f64 },
    ResetTransform,
    Grid { major: f64, minor: f64 },
    Page { number: u32, count: u32 },
    Editor(EditorOp),
    /// `P` / `p`: path and line pattern commands the server may send but we don't draw.
    Reserved(char),
    /// A stray `;` between commands.
    Separator,
    Unknown(char),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BandDef {
    pub paint: bool,
    pub kind: String,
    pub id: i64,
    pub editable: bool,
    pub height: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectOp {
    Paint(PaintMode),
    Clear,
}

/// Editor sub-protocol, everything under `e`.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorOp {
    /// `ea`: JSON binding for a widget.
    Attach(String),
    Configure(EditMode),
    /// `ep`: overlay box in device units. The rest of the stream belongs to the overlay.
    Prepare(DeviceRect),
    Start(EditorStart),
    Update(EditorUpdate),
    Finish,
    DebugBox(DeviceRect),
    Hint { rect: DeviceRect, text: String },
    Other(char),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditMode {
    Text,
    ReadOnly { sub_document: Option<SubDocument> },
    Date { pattern: Option<String> },
    Number { pattern: Option<String> },
    Combo(ComboConfig),
    ServerCombo { sub_document: Option<SubDocument> },
    LedgerCombo { fields: Vec<String> },
    /// `R`: a parameter (`row == -1`) or a field of the given row.
    FieldArray {
        row: i64,
        variable: String,
        values: String,
    },
    Other(char),
}

impl EditMode {
    pub fn tag(&self) -> char {
        match self {
            EditMode::Text => 't',
            EditMode::ReadOnly { .. } => 'r',
            EditMode::Date { .. } => 'd',
            EditMode::Number { .. } => 'n',
            EditMode::Combo(_) => 'c',
            EditMode::ServerCombo { .. } => 'C',
            EditMode::LedgerCombo { .. } => 'l',
            EditMode::FieldArray { .. } => 'R',
            EditMode::Other(c) => *c,
        }
    }

    pub fn sub_document(&self) -> Option<&SubDocument> {
        match self {
            EditMode::ReadOnly { sub_document } | EditMode::ServerCombo { sub_document } => {
                sub_document.as_ref()
            }
            EditMode::Combo(ComboConfig::Inline { sub_document, .. }) => sub_document.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubDocument {
    pub uri: Option<String>,
    pub report: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComboConfig {
    /// Version 2 combos carry their whole model as JSON.
    Binding(String),
    Inline {
        nullable: bool,
        fields: Vec<String>,
        list_id: String,
        sub_document: Option<SubDocument>,
        list_json: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditorStart {
    pub x: f64,
    pub baseline: f64,
    pub height: f64,
    pub band_id: i64,
    pub value: StartValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartValue {
    Plain(String),
    Keyed { id: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditorUpdate {
    pub fields: [String; 3],
    pub json: Option<String>,
}

/// Pulls instructions out of a stream, starting at a given offset.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    scanner: Scanner<'a>,
}

impl<'a> Decoder<'a> {
    pub fn new(src: &'a str, start: usize) -> Self {
        Self {
            scanner: Scanner::at(src, start),
        }
    }

    pub fn position(&self) -> usize {
        self.scanner.position()
    }

    /// Whether the last decoded instruction ended on `;`.
    pub fn terminated(&self) -> bool {
        self.scanner.previous() == Some(';')
    }

    pub fn is_at_end(&self) -> bool {
        self.scanner.is_at_end()
    }

    pub fn next_instruction(&mut self) -> Option<Result<Instruction, DecodeError>> {
        let opcode = self.scanner.next_char()?;
        Some(decode_opcode(opcode, &mut self.scanner))
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_instruction()
    }
}

/// Decodes a whole stream, dropping malformed instructions.
pub fn decode_all(src: &str) -> Vec<Instruction> {
    Decoder::new(src, 0).filter_map(Result::ok).collect()
}

fn decode_opcode(opcode: char, s: &mut Scanner<'_>) -> Result<Instruction, DecodeError> {
    let instruction = match opcode {
        'Z' => {
            let hard = !s.eat('d');
            s.skip(1);
            Instruction::Reset { hard }
        }
        'B' | 'b' => Instruction::Band(decode_band(opcode == 'B', s)?),
        'U' => Instruction::Update,
        'L' => Instruction::Line {
            x1: s.read_number()?,
            y1: s.read_number()?,
            x2: s.read_number()?,
            y2: s.read_number()?,
        },
        'R' => {
            let op = if s.eat('C') {
                RectOp::Clear
            } else {
                RectOp::Paint(paint_option(s, PaintMode::Stroke))
            };
            Instruction::Rect {
                op,
                rect: read_rect(s)?,
            }
        }
        'r' => {
            let mode = paint_option(s, PaintMode::Stroke);
            let radius = s.read_number()?;
            Instruction::RoundRect {
                mode,
                radius,
                rect: read_rect(s)?,
            }
        }
        'T' => {
            let mode = paint_option(s, PaintMode::Fill);
            let x = s.read_number()?;
            let y = s.read_number()?;
            let text = s.read_string_raw()?.to_owned();
            let max_width = if s.eat(',') {
                Some(s.read_number()?)
            } else {
                s.skip(1);
                None
            };
            Instruction::Text {
                mode,
                x,
                y,
                text,
                max_width,
            }
        }
        'C' => Instruction::FillColor(s.read_color()?),
        'c' => Instruction::TextColor(s.read_color()?),
        's' => Instruction::StrokeColor(s.read_color()?),
        'w' => Instruction::LineWidth(s.read_number()?),
        'E' => {
            let mode = paint_option(s, PaintMode::Fill);
            Instruction::Ellipse {
                mode,
                rect: read_rect(s)?,
            }
        }
        'I' => Instruction::Image(decode_image(s)?),
        'F' => Instruction::FontFamily(s.read_string()?.to_owned()),
        'f' => {
            if s.eat('m') {
                Instruction::FontMetrics(FontMetrics {
                    flags: s.read_number()?,
                    top: s.read_number()?,
                    ascent: s.read_number()?,
                    descent: s.read_number()?,
                    bottom: s.read_number()?,
                    leading: s.read_number()?,
                    avg_char_width: s.read_number()?,
                    max_char_width: s.read_number()?,
                    underline_thickness: s.read_number()?,
                    underline_position: s.read_number()?,
                })
            } else {
                let mask = s.read_number()?;
                let size = s.read_number()?;
                Instruction::Font {
                    mask: mask as u8,
                    size: size.round(),
                }
            }
        }
        'X' => Instruction::LegacyOrigin {
            x: s.read_number()?,
            y: s.read_number()?,
        },
        't' => match s.next_char() {
            Some('r') => Instruction::Transform {
                dx: s.read_number()?,
                dy: s.read_number()?,
                angle: s.read_number()?,
            },
            Some('c') => {
                s.skip(1);
                Instruction::ResetTransform
            }
            _ => Instruction::Unknown('t'),
        },
        'k' => match s.next_char() {
            Some('g') => Instruction::Grid {
                major: s.read_number()?,
                minor: s.read_number()?,
            },
            Some('p') => {
                let number = s.read_number()?;
                let count = s.read_number()?;
                Instruction::Page {
                    number: number.max(0.0) as u32,
                    count: count.max(0.0) as u32,
                }
            }
            _ => Instruction::Unknown('k'),
        },
        'e' => Instruction::Editor(decode_editor(s)?),
        'P' | 'p' => {
            s.skip_past(';');
            Instruction::Reserved(opcode)
        }
        ';' => Instruction::Separator,
        other => Instruction::Unknown(other),
    };
    Ok(instruction)
}

fn paint_option(s: &mut Scanner<'_>, default: PaintMode) -> PaintMode {
    match s.peek().and_then(PaintMode::from_option) {
        Some(mode) => {
            s.skip(1);
            mode
        }
        None => default,
    }
}

fn read_rect(s: &mut Scanner<'_>) -> Result<DeviceRect, DecodeError> {
    Ok(DeviceRect::new(
        s.read_number()?,
        s.read_number()?,
        s.read_number()?,
        s.read_number()?,
    ))
}

fn decode_band(paint: bool, s: &mut Scanner<'_>) -> Result<BandDef, DecodeError> {
    let kind = s.read_string()?.to_owned();
    let id = s.read_number()? as i64;
    let editable = s.next_char() == Some('t');
    s.skip(1);
    Ok(BandDef {
        paint,
        kind,
        id,
        editable,
        height: s.read_number()?,
        origin_x: s.read_number()?,
        origin_y: s.read_number()?,
    })
}

fn decode_image(s: &mut Scanner<'_>) -> Result<ImagePlacement, DecodeError> {
    let id = s.read_number()? as i64;
    let path = s.read_string()?.to_owned();
    let top = s.read_number()?;
    let left = s.read_number()?;
    let bottom = s.read_number()?;
    let right = s.read_number()?;
    let fit = FitMode::from_code(s.read_string()?);
    let h_anchor = HAnchor::from_code(s.read_string()?);
    let v_anchor = VAnchor::from_code(s.read_string()?);
    Ok(ImagePlacement {
        id,
        path,
        top,
        left,
        bottom,
        right,
        fit,
        h_anchor,
        v_anchor,
    })
}

fn decode_editor(s: &mut Scanner<'_>) -> Result<EditorOp, DecodeError> {
    let Some(option) = s.next_char() else {
        return Err(DecodeError::UnexpectedEnd {
            offset: s.position(),
        });
    };
    let op = match option {
        'a' => {
            let rest = s.rest();
            let json = rest.strip_suffix(';').unwrap_or(rest).to_owned();
            s.jump_to_end();
            EditorOp::Attach(json)
        }
        'c' => EditorOp::Configure(decode_edit_mode(s)?),
        'p' => EditorOp::Prepare(read_rect(s)?),
        's' => {
            let x = s.read_number()?;
            let baseline = s.read_number()?;
            let height = s.read_number()?;
            let band_id = s.read_number()? as i64;
            let value = if s.eat('{') {
                let id = s.read_string()?.to_owned();
                let value = s.read_string()?.to_owned();
                StartValue::Keyed { id, value }
            } else {
                StartValue::Plain(s.read_string_raw()?.to_owned())
            };
            s.skip(1);
            EditorOp::Start(EditorStart {
                x,
                baseline,
                height,
                band_id,
                value,
            })
        }
        'u' => {
            let mut update = EditorUpdate::default();
            update.fields[0] = s.read_string_raw()?.to_owned();
            if s.peek() != Some(';') {
                s.skip(1);
                update.fields[1] = s.read_string_raw()?.to_owned();
                if s.peek() != Some(';') {
                    s.skip(1);
                    update.fields[2] = s.read_string()?.to_owned();
                } else {
                    s.skip(1);
                }
            } else {
                s.skip(1);
            }
            if s.previous() != Some(';') {
                update.json = Some(s.read_string()?.to_owned());
            }
            EditorOp::Update(update)
        }
        'f' => {
            s.skip(1);
            EditorOp::Finish
        }
        'b' => {
            s.skip(1);
            EditorOp::DebugBox(read_rect(s)?)
        }
        'h' => {
            let rect = read_rect(s)?;
            let text = s.read_string()?.to_owned();
            EditorOp::Hint { rect, text }
        }
        other => EditorOp::Other(other),
    };
    Ok(op)
}

fn decode_edit_mode(s: &mut Scanner<'_>) -> Result<EditMode, DecodeError> {
    let Some(tag) = s.next_char() else {
        return Err(DecodeError::UnexpectedEnd {
            offset: s.position(),
        });
    };
    let mode = match tag {
        't' => {
            s.skip(1);
            EditMode::Text
        }
        'r' | 'C' => {
            let sub_document = if s.eat(',') {
                let uri = s.read_string()?;
                let report = s.read_string_raw()?;
                Some(sub_document(uri, report))
            } else {
                None
            };
            s.skip(1);
            if tag == 'r' {
                EditMode::ReadOnly { sub_document }
            } else {
                EditMode::ServerCombo { sub_document }
            }
        }
        'd' | 'n' => {
            let pattern = if s.eat(',') {
                Some(s.read_string_raw()?.to_owned())
            } else {
                None
            };
            s.skip(1);
            if tag == 'd' {
                EditMode::Date { pattern }
            } else {
                EditMode::Number { pattern }
            }
        }
        'c' => {
            let version = s.read_number()?;
            if version == 2.0 {
                EditMode::Combo(ComboConfig::Binding(s.read_string()?.to_owned()))
            } else {
                let nullable = s.read_number()? != 0.0;
                let fields = field_list(s.read_string()?);
                let list_id = s.read_string()?.to_owned();
                let uri = s.read_string()?;
                let report = s.read_string_raw()?;
                let list_json = if s.eat(',') {
                    Some(s.read_string_raw()?.to_owned())
                } else {
                    None
                };
                s.skip(1);
                EditMode::Combo(ComboConfig::Inline {
                    nullable,
                    fields,
                    list_id,
                    sub_document: Some(sub_document(uri, report))
                        .filter(|doc| doc.uri.is_some() || doc.report.is_some()),
                    list_json,
                })
            }
        }
        'R' => {
            let row = s.read_number()? as i64;
            let variable = s.read_string()?.to_owned();
            let values = s.read_string()?.to_owned();
            EditMode::FieldArray {
                row,
                variable,
                values,
            }
        }
        'l' => EditMode::LedgerCombo {
            fields: field_list(s.read_string()?),
        },
        other => EditMode::Other(other),
    };
    Ok(mode)
}

fn sub_document(uri: &str, report: &str) -> SubDocument {
    let non_empty = |text: &str| (!text.is_empty()).then(|| text.to_owned());
    SubDocument {
        uri: non_empty(uri),
        report: non_empty(report),
    }
}

/// `{a,b,c}` -> `["a", "b", "c"]`; anything shorter than `{x}` is empty.
fn field_list(raw: &str) -> Vec<String> {
    if raw.chars().count() <= 2 {
        return Vec::new();
    }
    let inner = raw
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(raw);
    inner.split(',').map(str::to_owned).collect()
}
