use iced::color;
use iced::theme::Palette;
use iced::{Color, Theme};

use crate::settings::Appearance;

/// Builds the app theme from the appearance settings.
pub fn resolve_theme(appearance: Appearance, high_contrast: bool) -> Theme {
    let dark = match appearance {
        Appearance::Dark => true,
        Appearance::Light => false,
        Appearance::System => system_prefers_dark(),
    };
    Theme::custom("Live Detect", palette(dark, high_contrast))
}

fn palette(dark: bool, high_contrast: bool) -> Palette {
    match (dark, high_contrast) {
        (true, false) => Palette {
            background: color!(0x17, 0x18, 0x1c),
            text: color!(0xd6, 0xd6, 0xd9),
            primary: color!(0x4c, 0xa3, 0x6b),
            success: color!(0x3d, 0xd6, 0x6a),
            warning: color!(0xf2, 0xb9, 0x3b),
            danger: color!(0xff, 0x55, 0x44),
        },
        (false, false) => Palette {
            background: color!(0xf4, 0xf5, 0xf7),
            text: color!(0x1b, 0x1c, 0x1f),
            primary: color!(0x2e, 0x8b, 0x57),
            success: color!(0x2f, 0xa8, 0x4f),
            warning: color!(0xd9, 0x8c, 0x00),
            danger: color!(0xd9, 0x30, 0x25),
        },
        (true, true) => Palette {
            background: Color::BLACK,
            text: Color::WHITE,
            primary: color!(0x00, 0xe0, 0x5a),
            success: color!(0x00, 0xff, 0x66),
            warning: color!(0xff, 0xd6, 0x0a),
            danger: color!(0xff, 0x45, 0x3a),
        },
        (false, true) => Palette {
            background: Color::WHITE,
            text: Color::BLACK,
            primary: color!(0x00, 0x6b, 0x2e),
            success: color!(0x1e, 0x7a, 0x32),
            warning: color!(0x9c, 0x52, 0x00),
            danger: color!(0xc4, 0x00, 0x12),
        },
    }
}

/// Letterbox color behind the video.
pub fn video_background(theme: &Theme) -> Color {
    let background = theme.palette().background;
    let darken = |c: f32| c * 0.6;
    Color::from_rgb(
        darken(background.r),
        darken(background.g),
        darken(background.b),
    )
}

fn system_prefers_dark() -> bool {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("defaults")
            .args(["read", "-g", "AppleInterfaceStyle"])
            .output()
            .map(|o| {
                String::from_utf8_lossy(&o.stdout)
                    .trim()
                    .eq_ignore_ascii_case("dark")
            })
            .unwrap_or(true)
    }
    #[cfg(not(target_os = "macos"))]
    {
        true
    }
}
