use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use live_detect_core::shared::constants::{
    DEFAULT_CAPTURE_FPS, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, YOLO_MODEL_URL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Appearance {
    System,
    Dark,
    Light,
}

impl Appearance {
    pub const ALL: &[Appearance] = &[Appearance::System, Appearance::Dark, Appearance::Light];
}

impl std::fmt::Display for Appearance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Appearance::System => write!(f, "System"),
            Appearance::Dark => write!(f, "Dark"),
            Appearance::Light => write!(f, "Light"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Capture device; `None` picks the platform default.
    pub camera_device: Option<String>,
    /// Still image shown instead of a camera.
    pub still_image: Option<PathBuf>,
    pub capture_width: u32,
    pub capture_height: u32,
    pub frame_rate: u32,
    /// Local model file; `None` resolves the default model by name.
    pub model_path: Option<PathBuf>,
    pub model_url: String,
    pub appearance: Appearance,
    pub high_contrast: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            camera_device: None,
            still_image: None,
            capture_width: DEFAULT_CAPTURE_WIDTH,
            capture_height: DEFAULT_CAPTURE_HEIGHT,
            frame_rate: DEFAULT_CAPTURE_FPS,
            model_path: None,
            model_url: YOLO_MODEL_URL.to_string(),
            appearance: Appearance::System,
            high_contrast: false,
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("LiveDetect").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Missing or unreadable files yield the defaults.
    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            self.save_to(&path);
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    log::warn!("Could not save settings to {}: {e}", path.display());
                }
            }
            Err(e) => log::warn!("Could not serialize settings: {e}"),
        }
    }
}
