use crate::rendering::domain::draw_surface::{Color, DrawSurface, Rect};

/// Average glyph advance of a sans-serif face, as a fraction of font size.
const GLYPH_ADVANCE: f64 = 0.6;

/// One recorded drawing operation.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    StrokeRect {
        rect: Rect,
        color: Color,
        line_width: f64,
    },
    FillRect {
        rect: Rect,
        color: Color,
    },
    Text {
        text: String,
        x: f64,
        y: f64,
        font_px: f64,
        color: Color,
    },
}

/// Draw surface that records a display list instead of rasterizing.
///
/// Hosts replay [`OverlayCanvas::commands`] onto whatever they display
/// (the desktop app's canvas widget, log output in the CLI).
#[derive(Clone, Debug, Default)]
pub struct OverlayCanvas {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
}

impl OverlayCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn is_blank(&self) -> bool {
        self.commands.is_empty()
    }
}

impl DrawSurface for OverlayCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.commands.clear();
        }
    }

    fn clear(&mut self) {
        self.commands.clear();
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f64) {
        self.commands.push(DrawCommand::StrokeRect {
            rect,
            color,
            line_width,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.commands.push(DrawCommand::FillRect { rect, color });
    }

    fn measure_text(&self, text: &str, font_px: f64) -> f64 {
        text.chars().count() as f64 * font_px * GLYPH_ADVANCE
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, font_px: f64, color: Color) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            x,
            y,
            font_px,
            color,
        });
    }
}
