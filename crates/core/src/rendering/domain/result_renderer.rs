use crate::shared::constants::{PERSON_LABEL, RENDER_CONFIDENCE_THRESHOLD};
use crate::shared::detection_result::DetectionResult;

use super::draw_surface::{Color, DrawSurface, Rect};

pub const PERSON_COLOR: Color = Color::rgb(0, 255, 0);
pub const OTHER_COLOR: Color = Color::rgb(255, 69, 0);
pub const LABEL_TEXT_COLOR: Color = Color::BLACK;

pub const BOX_LINE_WIDTH: f64 = 2.0;
pub const BOX_FILL_ALPHA: f32 = 0.2;
pub const LABEL_FONT_PX: f64 = 16.0;
const LABEL_PADDING_X: f64 = 4.0;
const LABEL_PADDING_Y: f64 = 2.0;

/// Box color for a class: one bucket for people, one for everything else.
pub fn color_for(class_label: &str) -> Color {
    if class_label == PERSON_LABEL {
        PERSON_COLOR
    } else {
        OTHER_COLOR
    }
}

/// Replaces the surface contents with one frame's detections.
///
/// Results below [`RENDER_CONFIDENCE_THRESHOLD`] leave no marks. Rendering
/// the same detections twice on a same-sized surface produces the same
/// contents.
pub fn render<S: DrawSurface + ?Sized>(surface: &mut S, detections: &[DetectionResult]) {
    surface.clear();
    for det in detections
        .iter()
        .filter(|d| d.score >= RENDER_CONFIDENCE_THRESHOLD)
    {
        draw_detection(surface, det);
    }
}

fn draw_detection<S: DrawSurface + ?Sized>(surface: &mut S, det: &DetectionResult) {
    let color = color_for(&det.class_label);
    let b = &det.bbox;
    let rect = Rect::new(b.x, b.y, b.width, b.height);

    surface.stroke_rect(rect, color, BOX_LINE_WIDTH);
    surface.fill_rect(rect, color.with_alpha(BOX_FILL_ALPHA));

    let text = det.label_text();
    let text_width = surface.measure_text(&text, LABEL_FONT_PX);
    let label_bg = Rect::new(
        b.x,
        b.y,
        text_width + 2.0 * LABEL_PADDING_X,
        LABEL_FONT_PX + 2.0 * LABEL_PADDING_Y,
    );
    surface.fill_rect(label_bg, color);
    surface.fill_text(
        &text,
        b.x + LABEL_PADDING_X,
        b.y + LABEL_PADDING_Y,
        LABEL_FONT_PX,
        LABEL_TEXT_COLOR,
    );
}
