pub mod cta;
pub mod filters;
pub mod intro;
pub mod subtitles;
pub mod text;
pub mod watermark;

use serde::{Deserialize, Serialize};

use crate::effects::{noise, GraphicEffect};
use crate::render::palette::parse_hex;
use crate::render::{Align, Canvas, TextRenderer};

pub use cta::{CtaConfig, CtaMode, CtaOverlay};
pub use intro::{IntroConfig, IntroOverlay};
pub use subtitles::{SubtitleBgStyle, SubtitleLayer, SubtitleMode, SubtitleOrientation, SubtitleStyle};
pub use text::{TextOverlay, TextOverlayConfig};
pub use watermark::{WatermarkConfig, WatermarkOverlay, WatermarkPosition};
pub use filters::{FilterConfig, FilterKind, FilterLayer};

/// What the overlays may read for one tick.
#[derive(Clone, Copy, Debug)]
pub struct OverlayContext<'a> {
    /// Playback time of the current item in seconds.
    pub time: f64,
    pub frame_index: u64,
    pub bins: &'a [u8],
    pub beat: bool,
}

/// One of nine named positions on the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    #[default]
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Anchor {
    /// Base point and text alignment inside a `w`x`h` frame, padded from
    /// the edges.
    pub fn resolve(self, w: f32, h: f32) -> (f32, f32, Align) {
        let (px, py) = (w * 0.025, h * 0.05);
        let (x, align) = match self {
            Self::TopLeft | Self::CenterLeft | Self::BottomLeft => (px, Align::Left),
            Self::TopCenter | Self::Center | Self::BottomCenter => (w / 2.0, Align::Center),
            Self::TopRight | Self::CenterRight | Self::BottomRight => (w - px, Align::Right),
        };
        let y = match self {
            Self::TopLeft | Self::TopCenter | Self::TopRight => py,
            Self::CenterLeft | Self::Center | Self::CenterRight => h / 2.0,
            Self::BottomLeft | Self::BottomCenter | Self::BottomRight => h - py,
        };
        (x, y, align)
    }
}

/// `#rrggbb` to RGB, white when unparseable.
pub(crate) fn rgb_or_white(hex: &str) -> [u8; 3] {
    parse_hex(hex).unwrap_or([255, 255, 255])
}

/// Text appearance shared by the overlays.
#[derive(Clone, Copy, Debug)]
pub struct TextStyle {
    pub size: f32,
    pub color: [u8; 3],
    pub stroke: [u8; 3],
    pub effect: GraphicEffect,
    pub align: Align,
}

/// Draw one line of text with its graphic effect. `y` is the line's
/// vertical center.
pub fn draw_styled(
    canvas: &mut Canvas,
    font: &TextRenderer,
    line: &str,
    x: f32,
    y: f32,
    style: &TextStyle,
    beat: bool,
    frame_index: u64,
) {
    let TextStyle { size, color, stroke, effect, align } = *style;
    let ring = |r: f32| {
        (0..8).map(move |i| {
            let a = i as f32 / 8.0 * std::f32::consts::TAU;
            (a.cos() * r, a.sin() * r)
        })
    };

    match effect {
        GraphicEffect::None => {}
        GraphicEffect::Bold => {
            let d = (size * 0.02).max(0.5);
            for (dx, dy) in [(d, 0.0), (-d, 0.0), (0.0, d)] {
                font.draw(canvas, line, x + dx, y + dy, size, color, align);
            }
        }
        GraphicEffect::Shadow => {
            let d = size * 0.06;
            canvas.save();
            canvas.set_alpha(0.6);
            font.draw(canvas, line, x + d, y + d, size, [0, 0, 0], align);
            canvas.restore();
        }
        GraphicEffect::Neon => {
            canvas.save();
            canvas.set_alpha(0.25);
            for (dx, dy) in ring(size * 0.08) {
                font.draw(canvas, line, x + dx, y + dy, size, color, align);
            }
            canvas.restore();
        }
        GraphicEffect::Outline => {
            for (dx, dy) in ring((size * 0.05).max(1.0)) {
                font.draw(canvas, line, x + dx, y + dy, size, stroke, align);
            }
        }
        GraphicEffect::Faux3d => {
            let step = (size * 0.015).max(0.5);
            let depth = [stroke[0] / 2, stroke[1] / 2, stroke[2] / 2];
            for layer in (1..=6).rev() {
                let d = step * layer as f32;
                font.draw(canvas, line, x + d, y + d, size, depth, align);
            }
        }
        GraphicEffect::Glitch => {
            if beat {
                let amount = size * 0.1;
                let jitter = |salt: u64| (noise(frame_index, salt) - 0.5) * amount;
                canvas.save();
                canvas.set_alpha(0.7);
                font.draw(canvas, line, x + jitter(1), y + jitter(2), size, [255, 0, 100], align);
                font.draw(canvas, line, x + jitter(3), y + jitter(4), size, [0, 255, 255], align);
                canvas.restore();
            }
        }
    }
    font.draw(canvas, line, x, y, size, color, align);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_cover_the_grid() {
        let (x, y, align) = Anchor::TopLeft.resolve(1000.0, 500.0);
        assert_eq!((x, y, align), (25.0, 25.0, Align::Left));
        let (x, y, align) = Anchor::BottomRight.resolve(1000.0, 500.0);
        assert_eq!((x, y, align), (975.0, 475.0, Align::Right));
        let (x, y, align) = Anchor::Center.resolve(1000.0, 500.0);
        assert_eq!((x, y, align), (500.0, 250.0, Align::Center));
    }

    #[test]
    fn anchor_names_are_kebab_case() {
        #[derive(Deserialize)]
        struct Wrap {
            anchor: Anchor,
        }
        let w: Wrap = toml::from_str("anchor = \"bottom-center\"").unwrap();
        assert_eq!(w.anchor, Anchor::BottomCenter);
    }
}
