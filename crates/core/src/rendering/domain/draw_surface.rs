/// RGBA color; `alpha` is 0.0 (transparent) to 1.0 (opaque).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub alpha: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, alpha: 1.0 }
    }

    pub const fn with_alpha(self, alpha: f32) -> Self {
        Self { alpha, ..self }
    }
}

/// Axis-aligned rectangle in surface pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// 2D drawing target layered over the video.
///
/// Coordinates are in the pixel space of the source frame; the surface is
/// kept at the frame's native size so no scaling happens while drawing.
pub trait DrawSurface {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Changes the pixel dimensions. Implementations drop their contents when
    /// the size actually changes.
    fn resize(&mut self, width: u32, height: u32);

    /// Removes every mark.
    fn clear(&mut self);

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f64);

    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Width in pixels of `text` rendered at `font_px`.
    fn measure_text(&self, text: &str, font_px: f64) -> f64;

    /// Draws `text` with its top-left corner at `(x, y)`.
    fn fill_text(&mut self, text: &str, x: f64, y: f64, font_px: f64, color: Color);

    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}
