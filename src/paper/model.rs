use std::fmt;

pub const BOLD_MASK: u8 = 0x01;
pub const ITALIC_MASK: u8 = 0x02;
pub const UNDERLINE_MASK: u8 = 0x04;
pub const STRIKEOUT_MASK: u8 = 0x08;

pub const DEFAULT_FONT_FAMILY: &str = "DejaVu Sans Condensed";
pub const DEFAULT_FONT_SIZE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const RED: Color = Color::rgba(255, 0, 0, 255);
    pub const GRID: Color = Color::rgba(0xC0, 0xC0, 0xC0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    /// Parses `RRGGBB` with an optional leading `#`, or the short `#RGB` form.
    pub fn from_hex(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#').unwrap_or(text);
        match digits.len() {
            6 => {
                let mut rgb = [0u8; 3];
                hex::decode_to_slice(digits, &mut rgb).ok()?;
                Some(Self::rgb(rgb[0], rgb[1], rgb[2]))
            }
            3 => {
                let mut expanded = String::with_capacity(6);
                for c in digits.chars() {
                    expanded.push(c);
                    expanded.push(c);
                }
                Self::from_hex(&expanded)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", hex::encode_upper([self.r, self.g, self.b]))
    }
}

/// Stroke/fill selector shared by `R`, `r`, `T` and `E`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintMode {
    Stroke,
    Fill,
    FillAndStroke,
}

impl PaintMode {
    pub fn from_option(c: char) -> Option<Self> {
        match c {
            'S' => Some(Self::Stroke),
            'F' => Some(Self::Fill),
            'P' => Some(Self::FillAndStroke),
            _ => None,
        }
    }

    pub fn fills(self) -> bool {
        matches!(self, Self::Fill | Self::FillAndStroke)
    }

    pub fn strokes(self) -> bool {
        matches!(self, Self::Stroke | Self::FillAndStroke)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub family: String,
    pub size: f64,
    pub mask: u8,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            family: DEFAULT_FONT_FAMILY.into(),
            size: DEFAULT_FONT_SIZE,
            mask: 0,
        }
    }
}

impl FontSpec {
    pub fn bold(&self) -> bool {
        self.mask & BOLD_MASK != 0
    }

    pub fn italic(&self) -> bool {
        self.mask & ITALIC_MASK != 0
    }

    pub fn underline(&self) -> bool {
        self.mask & UNDERLINE_MASK != 0
    }

    pub fn strikeout(&self) -> bool {
        self.mask & STRIKEOUT_MASK != 0
    }
}

/// CSS shorthand, e.g. `bold italic 12px DejaVu Sans Condensed`.
impl fmt::Display for FontSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bold() {
            f.write_str("bold ")?;
        }
        if self.italic() {
            f.write_str("italic ")?;
        }
        write!(f, "{}px {}", self.size.round(), self.family)
    }
}

/// Font metrics sent with `fm`, used to align overlay text with the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FontMetrics {
    pub flags: f64,
    pub top: f64,
    pub ascent: f64,
    pub descent: f64,
    pub bottom: f64,
    pub leading: f64,
    pub avg_char_width: f64,
    pub max_char_width: f64,
    pub underline_thickness: f64,
    pub underline_position: f64,
}

/// 2D affine transform in canvas order: `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// `self * other`: `other` is applied to points first.
    pub fn multiply(&self, other: &Affine) -> Affine {
        Affine {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Affine {
        self.multiply(&Affine {
            e: dx,
            f: dy,
            ..Affine::IDENTITY
        })
    }

    pub fn rotate(&self, radians: f64) -> Affine {
        let (sin, cos) = radians.sin_cos();
        self.multiply(&Affine {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        })
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn invert(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        Some(Affine {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }

    pub fn is_identity(&self) -> bool {
        *self == Affine::IDENTITY
    }
}

/// Rectangle in server device units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DeviceRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn to_css(self, ratio: f64) -> CssRect {
        CssRect {
            left: self.x / ratio,
            top: self.y / ratio,
            width: self.width / ratio,
            height: self.height / ratio,
        }
    }
}

/// Rectangle in CSS pixels, the unit overlay widgets are positioned in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CssRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl CssRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn midpoint(&self) -> (f64, f64) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }
}

/// Drawing state threaded through one interpretation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    pub fill_color: Color,
    pub text_color: Color,
    pub stroke_color: Color,
    pub line_width: f64,
    pub font: FontSpec,
    pub metrics: FontMetrics,
    pub transform: Affine,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            fill_color: Color::WHITE,
            text_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: 1.0,
            font: FontSpec::default(),
            metrics: FontMetrics::default(),
            transform: Affine::IDENTITY,
        }
    }
}

/// Rounds to two decimal places, the precision used on the wire.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
