use iced::mouse;
use iced::widget::canvas::{self, Frame, Path, Stroke};
use iced::{Color, Pixels, Point, Rectangle, Renderer, Size, Theme};

use live_detect_core::rendering::domain::draw_surface::{self, DrawSurface, Rect};
use live_detect_core::rendering::infrastructure::overlay_canvas::{DrawCommand, OverlayCanvas};

/// Copy of the session's overlay surface, replayed on top of the video.
///
/// The video is shown with `ContentFit::Contain`, so commands are scaled and
/// centered the same way.
#[derive(Debug, Default, Clone)]
pub struct OverlayView {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
}

/// Maps surface pixels into widget coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Placement {
    fn point(&self, x: f64, y: f64) -> Point {
        Point::new(
            self.offset_x + x as f32 * self.scale,
            self.offset_y + y as f32 * self.scale,
        )
    }

    fn size(&self, width: f64, height: f64) -> Size {
        Size::new(width as f32 * self.scale, height as f32 * self.scale)
    }
}

impl OverlayView {
    /// Takes the current contents of `canvas`.
    pub fn capture(&mut self, canvas: &OverlayCanvas) {
        self.width = canvas.width();
        self.height = canvas.height();
        self.commands.clear();
        self.commands.extend_from_slice(canvas.commands());
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    fn placement(&self, bounds: Size) -> Option<Placement> {
        if self.width == 0 || self.height == 0 || bounds.width <= 0.0 || bounds.height <= 0.0 {
            return None;
        }
        let scale = (bounds.width / self.width as f32).min(bounds.height / self.height as f32);
        Some(Placement {
            scale,
            offset_x: (bounds.width - self.width as f32 * scale) / 2.0,
            offset_y: (bounds.height - self.height as f32 * scale) / 2.0,
        })
    }
}

impl<Message> canvas::Program<Message> for OverlayView {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        if let Some(placement) = self.placement(bounds.size()) {
            for command in &self.commands {
                replay(&mut frame, command, &placement);
            }
        }
        vec![frame.into_geometry()]
    }
}

fn replay(frame: &mut Frame, command: &DrawCommand, placement: &Placement) {
    match command {
        DrawCommand::StrokeRect {
            rect,
            color,
            line_width,
        } => {
            let path = rect_path(rect, placement);
            frame.stroke(
                &path,
                Stroke::default()
                    .with_color(to_iced(*color))
                    .with_width(*line_width as f32),
            );
        }
        DrawCommand::FillRect { rect, color } => {
            frame.fill_rectangle(
                placement.point(rect.x, rect.y),
                placement.size(rect.width, rect.height),
                to_iced(*color),
            );
        }
        DrawCommand::Text {
            text,
            x,
            y,
            font_px,
            color,
        } => {
            frame.fill_text(canvas::Text {
                content: text.clone(),
                position: placement.point(*x, *y),
                color: to_iced(*color),
                size: Pixels(*font_px as f32 * placement.scale),
                ..canvas::Text::default()
            });
        }
    }
}

fn rect_path(rect: &Rect, placement: &Placement) -> Path {
    Path::rectangle(
        placement.point(rect.x, rect.y),
        placement.size(rect.width, rect.height),
    )
}

fn to_iced(color: draw_surface::Color) -> Color {
    Color::from_rgba8(color.r, color.g, color.b, color.alpha)
}
