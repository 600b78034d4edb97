use crate::stroke::{MAX_STROKE_WIDTH, MIN_STROKE_WIDTH};
use crate::{Color, Point, Shape, Stroke, StrokeId, DEFAULT_STROKE_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
    Line,
    Rectangle,
    Arrow,
    Curve,
    Text,
}

/// Pointer input, already normalized to canvas-relative [0, 1] coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up(Point),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuilderOutput {
    Nothing,
    /// Live feedback while dragging. When `redraw_history` is set the
    /// preview replaces the previous one, so the history must be redrawn
    /// underneath it first.
    Preview { stroke: Stroke, redraw_history: bool },
    Finished(Stroke),
    /// The text tool needs the text itself; see `StrokeBuilder::commit_text`.
    TextRequested(Point),
}

#[derive(Debug)]
struct ActiveStroke {
    id: StrokeId,
    start: Point,
    points: Vec<Point>,
}

/// Turns pointer down/move/up sequences into strokes for the current tool.
#[derive(Debug)]
pub struct StrokeBuilder {
    tool: Tool,
    color: Color,
    width: f32,
    active: Option<ActiveStroke>,
}

impl Default for StrokeBuilder {
    fn default() -> Self {
        Self {
            tool: Tool::default(),
            color: Color::default(),
            width: DEFAULT_STROKE_WIDTH,
            active: None,
        }
    }
}

impl StrokeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switching tools drops any stroke in progress.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.active = None;
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn set_width(&mut self, width: f32) {
        self.width = width.clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH);
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    pub fn handle(&mut self, event: PointerEvent) -> BuilderOutput {
        match event {
            PointerEvent::Down(p) => self.down(clamp(p)),
            PointerEvent::Move(p) => self.drag(clamp(p)),
            PointerEvent::Up(p) => self.up(clamp(p)),
        }
    }

    pub fn commit_text(&mut self, text: &str, at: Point) -> Option<Stroke> {
        if text.trim().is_empty() {
            return None;
        }
        let at = clamp(at);
        Some(Stroke::new(
            Shape::Text {
                x: at.x,
                y: at.y,
                text: text.to_string(),
            },
            self.color,
            self.width,
        ))
    }

    fn down(&mut self, p: Point) -> BuilderOutput {
        if self.tool == Tool::Text {
            return BuilderOutput::TextRequested(p);
        }
        self.active = Some(ActiveStroke {
            id: uuid::Uuid::new_v4(),
            start: p,
            points: vec![p],
        });
        BuilderOutput::Nothing
    }

    fn drag(&mut self, p: Point) -> BuilderOutput {
        let tool = self.tool;
        let active = match self.active.as_mut() {
            Some(active) => active,
            None => return BuilderOutput::Nothing,
        };
        let last = active.points.last().copied().unwrap_or(active.start);
        active.points.push(p);
        let id = active.id;

        match tool {
            // only the newest segment is drawn while the pointer moves
            Tool::Pen | Tool::Eraser => BuilderOutput::Preview {
                stroke: self.stroke_with(id, freehand_shape(tool, vec![last, p])),
                redraw_history: false,
            },
            _ => {
                let shape = self.shape_for(p);
                BuilderOutput::Preview {
                    stroke: self.stroke_with(id, shape),
                    redraw_history: true,
                }
            }
        }
    }

    fn up(&mut self, p: Point) -> BuilderOutput {
        let shape = match self.tool {
            Tool::Pen | Tool::Eraser => match self.active.as_ref() {
                Some(active) => freehand_shape(self.tool, active.points.clone()),
                None => return BuilderOutput::Nothing,
            },
            _ => {
                if self.active.is_none() {
                    return BuilderOutput::Nothing;
                }
                self.shape_for(p)
            }
        };
        match self.active.take() {
            Some(active) => BuilderOutput::Finished(self.stroke_with(active.id, shape)),
            None => BuilderOutput::Nothing,
        }
    }

    fn shape_for(&self, end: Point) -> Shape {
        let (start, control) = match self.active.as_ref() {
            Some(active) => {
                let control = active.points[active.points.len() / 2];
                (active.start, control)
            }
            None => (end, end),
        };
        match self.tool {
            Tool::Line => Shape::Line { start, end },
            Tool::Rectangle => Shape::Rectangle { start, end },
            Tool::Arrow => Shape::Arrow { start, end },
            Tool::Curve => {
                let control = if control == start || control == end {
                    start.midpoint(&end)
                } else {
                    control
                };
                Shape::Curve {
                    start,
                    control,
                    end,
                }
            }
            Tool::Pen | Tool::Eraser | Tool::Text => Shape::Line { start, end },
        }
    }

    fn stroke_with(&self, id: StrokeId, shape: Shape) -> Stroke {
        Stroke {
            id,
            shape,
            color: self.color,
            width: self.width,
        }
    }
}

fn freehand_shape(tool: Tool, points: Vec<Point>) -> Shape {
    if tool == Tool::Eraser {
        Shape::Eraser { points }
    } else {
        Shape::Freehand { points }
    }
}

fn clamp(p: Point) -> Point {
    Point::clamped(p.x, p.y)
}
