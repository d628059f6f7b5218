/// Axis-aligned box in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from corner coordinates, clamped to a `frame_w` x `frame_h` frame.
    pub fn from_corners_clamped(
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        frame_w: u32,
        frame_h: u32,
    ) -> Self {
        let fw = frame_w as f64;
        let fh = frame_h as f64;
        let left = x1.clamp(0.0, fw);
        let top = y1.clamp(0.0, fh);
        let right = x2.clamp(0.0, fw);
        let bottom = y2.clamp(0.0, fh);
        Self {
            x: left,
            y: top,
            width: (right - left).max(0.0),
            height: (bottom - top).max(0.0),
        }
    }
}

/// One object found in one frame. Produced fresh every cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    pub class_label: String,
    /// Provider confidence in `[0, 1]`.
    pub score: f64,
    pub bbox: BoundingBox,
}

impl DetectionResult {
    pub fn new(class_label: impl Into<String>, score: f64, bbox: BoundingBox) -> Self {
        Self {
            class_label: class_label.into(),
            score,
            bbox,
        }
    }

    /// Overlay caption, e.g. `"person 92%"`.
    pub fn label_text(&self) -> String {
        format!(
            "{} {}%",
            self.class_label,
            (self.score * 100.0).round() as i64
        )
    }
}
