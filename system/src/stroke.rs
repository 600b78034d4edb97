use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

pub type StrokeId = uuid::Uuid;

pub const DEFAULT_STROKE_WIDTH: f32 = 2.0;
pub const MIN_STROKE_WIDTH: f32 = 1.0;
pub const MAX_STROKE_WIDTH: f32 = 20.0;

/// A position on the canvas, normalized to [0, 1] on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn clamped(x: f32, y: f32) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl std::default::Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color: {0:?}")]
pub struct ParseColorError(String);

impl FromStr for Color {
    type Err = ParseColorError;

    /// Accepts `#rrggbb` and the short `#rgb` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseColorError(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(err)?;
        if !hex.is_ascii() {
            return Err(err());
        }
        let channel = |range: &str| u8::from_str_radix(range, 16).map_err(|_| err());
        match hex.len() {
            6 => Ok(Color {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
            }),
            3 => {
                let expand = |c: &str| channel(&c.repeat(2));
                Ok(Color {
                    r: expand(&hex[0..1])?,
                    g: expand(&hex[1..2])?,
                    b: expand(&hex[2..3])?,
                })
            }
            _ => Err(err()),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ParseColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeKind {
    Freehand,
    Eraser,
    Line,
    Rectangle,
    Arrow,
    Text,
    Curve,
}

impl StrokeKind {
    pub const ALL: [StrokeKind; 7] = [
        StrokeKind::Freehand,
        StrokeKind::Eraser,
        StrokeKind::Line,
        StrokeKind::Rectangle,
        StrokeKind::Arrow,
        StrokeKind::Text,
        StrokeKind::Curve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrokeKind::Freehand => "freehand",
            StrokeKind::Eraser => "eraser",
            StrokeKind::Line => "line",
            StrokeKind::Rectangle => "rectangle",
            StrokeKind::Arrow => "arrow",
            StrokeKind::Text => "text",
            StrokeKind::Curve => "curve",
        }
    }

    pub fn from_tag(tag: &str) -> Option<StrokeKind> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == tag)
    }
}

/// Kind-dependent geometry. Serialized with the kind as the `kind` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Shape {
    Freehand { points: Vec<Point> },
    Eraser { points: Vec<Point> },
    Line { start: Point, end: Point },
    Rectangle { start: Point, end: Point },
    Arrow { start: Point, end: Point },
    Text { x: f32, y: f32, text: String },
    Curve { start: Point, control: Point, end: Point },
}

impl Shape {
    pub fn kind(&self) -> StrokeKind {
        match self {
            Shape::Freehand { .. } => StrokeKind::Freehand,
            Shape::Eraser { .. } => StrokeKind::Eraser,
            Shape::Line { .. } => StrokeKind::Line,
            Shape::Rectangle { .. } => StrokeKind::Rectangle,
            Shape::Arrow { .. } => StrokeKind::Arrow,
            Shape::Text { .. } => StrokeKind::Text,
            Shape::Curve { .. } => StrokeKind::Curve,
        }
    }
}

fn default_width() -> f32 {
    DEFAULT_STROKE_WIDTH
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    #[serde(rename = "strokeId")]
    pub id: StrokeId,
    #[serde(flatten)]
    pub shape: Shape,
    #[serde(default)]
    pub color: Color,
    #[serde(default = "default_width")]
    pub width: f32,
}

impl Stroke {
    /// Creates a stroke with a fresh v4 id. Peers never coordinate id allocation.
    pub fn new(shape: Shape, color: Color, width: f32) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            shape,
            color,
            width,
        }
    }

    pub fn kind(&self) -> StrokeKind {
        self.shape.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_shapes() -> Vec<Shape> {
        let a = Point::new(0.25, 0.5);
        let b = Point::new(0.75, 0.125);
        vec![
            Shape::Freehand {
                points: vec![a, b, Point::new(0.5, 0.5)],
            },
            Shape::Eraser { points: vec![b, a] },
            Shape::Line { start: a, end: b },
            Shape::Rectangle { start: a, end: b },
            Shape::Arrow { start: b, end: a },
            Shape::Text {
                x: 0.1,
                y: 0.9,
                text: "hello".into(),
            },
            Shape::Curve {
                start: a,
                control: Point::new(0.5, 0.0),
                end: b,
            },
        ]
    }

    #[test]
    fn it_round_trips_every_kind_through_json() {
        let shapes = sample_shapes();
        assert_eq!(shapes.len(), StrokeKind::ALL.len());

        for shape in shapes {
            let stroke = Stroke::new(shape, Color::new(0x12, 0xab, 0xff), 4.0);
            let json = serde_json::to_string(&stroke).expect("must serialize");
            let parsed: Stroke = serde_json::from_str(&json).expect("must parse");
            assert_eq!(parsed, stroke);
        }
    }

    #[test]
    fn it_uses_original_field_names_on_the_wire() {
        let stroke = Stroke::new(
            Shape::Line {
                start: Point::new(0.0, 0.0),
                end: Point::new(1.0, 1.0),
            },
            Color::BLACK,
            2.0,
        );
        let value = serde_json::to_value(&stroke).expect("must serialize");
        assert_eq!(value["strokeId"], stroke.id.to_string());
        assert_eq!(value["kind"], "line");
        assert_eq!(value["color"], "#000000");
        assert_eq!(value["end"]["x"], 1.0);
    }

    #[test]
    fn it_parses_short_and_long_colors() {
        assert_eq!("#fff".parse::<Color>(), Ok(Color::new(255, 255, 255)));
        assert_eq!("#0a0B0c".parse::<Color>(), Ok(Color::new(10, 11, 12)));
        assert!("000000".parse::<Color>().is_err());
        assert!("#12345".parse::<Color>().is_err());
        assert!("#gggggg".parse::<Color>().is_err());
    }

    #[test]
    fn it_defaults_missing_style_fields() {
        let json = r#"{"strokeId":"6d1c9e4e-4a55-4f6c-9f5f-2a7d8f3c1b11","kind":"text","x":0.5,"y":0.5,"text":"hi"}"#;
        let stroke: Stroke = serde_json::from_str(json).expect("must parse");
        assert_eq!(stroke.color, Color::BLACK);
        assert_eq!(stroke.width, DEFAULT_STROKE_WIDTH);
        assert_eq!(stroke.kind(), StrokeKind::Text);
    }

    #[test]
    fn it_clamps_points_into_unit_square() {
        assert_eq!(Point::clamped(-0.5, 1.5), Point::new(0.0, 1.0));
        assert_eq!(Point::clamped(f32::NAN, 0.3), Point::new(0.0, 0.3));
    }
}
