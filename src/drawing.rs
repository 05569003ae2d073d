//! Freehand drawing blocks.
//!
//! Drawings are not part of the text-marker syntax; they persist as element
//! attributes (`data-lines` JSON plus a `style` height) and must survive a
//! save/reload through those attributes. Strokes are stored in a logical
//! coordinate space 500 units wide so they scale with the canvas.
//!
//! Interface only: the textarea shell has no drawing canvas, so this module
//! is used solely by hosts that embed one. Inside the crate only
//! [`DEFAULT_HEIGHT`] is read, by the editor config.

use serde::{Deserialize, Serialize};

pub const LOGICAL_WIDTH: f64 = 500.0;
pub const DEFAULT_HEIGHT: u32 = 300;
pub const MIN_HEIGHT: u32 = 100;
pub const MAX_HEIGHT: u32 = 800;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

pub type Line = Vec<Point>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawingAttrs {
    pub lines: Vec<Line>,
    pub width: f64,
    pub height: u32,
}

impl Default for DrawingAttrs {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            width: LOGICAL_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl DrawingAttrs {
    pub fn with_height(height: u32) -> Self {
        Self {
            height: height.clamp(MIN_HEIGHT, MAX_HEIGHT),
            ..Self::default()
        }
    }

    /// Element attributes for the drawing node.
    pub fn to_attributes(&self) -> Vec<(&'static str, String)> {
        let lines = serde_json::to_string(&self.lines).unwrap_or_else(|_| "[]".to_string());
        vec![
            ("data-type", "drawing".to_string()),
            ("data-lines", lines),
            ("data-width", self.width.to_string()),
            ("style", format!("height: {}px", self.height)),
        ]
    }

    /// Rebuilds a drawing from element attributes. Missing or garbled values
    /// fall back to defaults instead of failing the whole note.
    pub fn from_attributes(
        data_lines: Option<&str>,
        data_width: Option<&str>,
        style: Option<&str>,
    ) -> Self {
        let width = data_width
            .and_then(|w| w.trim().parse::<f64>().ok())
            .filter(|w| w.is_finite() && *w > 0.0)
            .unwrap_or(LOGICAL_WIDTH);
        Self {
            lines: parse_lines(data_lines.unwrap_or_default()),
            width,
            height: style.and_then(parse_style_height).unwrap_or(DEFAULT_HEIGHT),
        }
    }

    /// Converts a canvas pixel position into logical coordinates.
    pub fn to_logical(&self, px: f64, py: f64, canvas_width: f64, canvas_height: f64) -> Point {
        let sx = if canvas_width > 0.0 {
            self.width / canvas_width
        } else {
            1.0
        };
        let sy = if canvas_height > 0.0 {
            self.height as f64 / canvas_height
        } else {
            1.0
        };
        Point {
            x: px * sx,
            y: py * sy,
        }
    }

    pub fn begin_stroke(&mut self, at: Point) {
        self.lines.push(vec![at]);
    }

    pub fn extend_stroke(&mut self, to: Point) {
        match self.lines.last_mut() {
            Some(line) => line.push(to),
            None => self.lines.push(vec![to]),
        }
    }

    /// Height after dragging the resize handle by `delta` pixels from `start`.
    pub fn resize(&mut self, start: u32, delta: i32) -> u32 {
        let next = (start as i64 + delta as i64).clamp(MIN_HEIGHT as i64, MAX_HEIGHT as i64);
        self.height = next as u32;
        self.height
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

fn parse_lines(raw: &str) -> Vec<Line> {
    let raw = raw.trim();
    // Older saves sometimes hold "[object Object]" and similar junk.
    if !(raw.starts_with('[') || raw.starts_with('{')) {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Line>>(raw) {
        Ok(lines) => lines,
        Err(err) => {
            log::debug!("ignoring unreadable drawing lines: {err}");
            Vec::new()
        }
    }
}

/// Reads `height: 240px` out of an inline style, parseInt-style.
fn parse_style_height(style: &str) -> Option<u32> {
    style.split(';').find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        if name.trim() != "height" {
            return None;
        }
        let digits: String = value
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse::<u32>().ok().filter(|h| *h > 0)
    })
}
