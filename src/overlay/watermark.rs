use serde::{Deserialize, Serialize};

use super::{rgb_or_white, Anchor};
use crate::assets::AssetCache;
use crate::render::{Align, Canvas, TextRenderer};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl std::str::FromStr for WatermarkPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "top-left" => Ok(Self::TopLeft),
            "top-right" => Ok(Self::TopRight),
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-right" => Ok(Self::BottomRight),
            "center" => Ok(Self::Center),
            other => Err(format!("unknown watermark position '{}'", other)),
        }
    }
}

impl WatermarkPosition {
    pub fn anchor(self) -> Anchor {
        match self {
            Self::TopLeft => Anchor::TopLeft,
            Self::TopRight => Anchor::TopRight,
            Self::BottomLeft => Anchor::BottomLeft,
            Self::BottomRight => Anchor::BottomRight,
            Self::Center => Anchor::Center,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub enabled: bool,
    pub text: String,
    /// Image path or URL. Once loaded it is drawn instead of the text.
    pub image: Option<String>,
    pub position: WatermarkPosition,
    pub opacity: f32,
    /// Text size as a percentage of the frame width.
    pub size_vw: f32,
    /// Image width as a percentage of the frame width.
    pub image_width_pct: f32,
    pub color: String,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            text: String::new(),
            image: None,
            position: WatermarkPosition::BottomRight,
            opacity: 0.5,
            size_vw: 2.5,
            image_width_pct: 12.0,
            color: "#ffffff".into(),
        }
    }
}

impl WatermarkConfig {
    /// Top-left corner of a `bw`x`bh` box pinned to the position inside a
    /// `w`x`h` frame, padded like the text anchors.
    pub fn box_origin(&self, w: f32, h: f32, bw: f32, bh: f32) -> (f32, f32) {
        let (x, y, align) = self.position.anchor().resolve(w, h);
        let x = match align {
            Align::Left => x,
            Align::Center => x - bw / 2.0,
            Align::Right => x - bw,
        };
        let y = match self.position {
            WatermarkPosition::TopLeft | WatermarkPosition::TopRight => y,
            WatermarkPosition::Center => y - bh / 2.0,
            WatermarkPosition::BottomLeft | WatermarkPosition::BottomRight => y - bh,
        };
        (x, y)
    }
}

/// A translucent logo or signature line pinned to a corner or the center.
pub struct WatermarkOverlay {
    config: WatermarkConfig,
}

impl WatermarkOverlay {
    pub fn new(config: WatermarkConfig) -> Self {
        Self { config }
    }

    /// The image the asset cache should load, if any.
    pub fn image_source(&self) -> Option<&str> {
        self.config.image.as_deref().filter(|_| self.config.enabled)
    }

    /// Text needs `font`; an image watermark draws without one.
    pub fn draw(&self, canvas: &mut Canvas, font: Option<&TextRenderer>, assets: &AssetCache) {
        if !self.config.enabled {
            return;
        }
        let (w, h) = (canvas.width(), canvas.height());
        canvas.save();
        canvas.set_alpha(self.config.opacity.clamp(0.0, 1.0));
        if let Some(image) = self.image_source().and_then(|src| assets.get(src)) {
            let bw = w * self.config.image_width_pct / 100.0;
            let bh = bw * image.height() as f32 / image.width().max(1) as f32;
            let (x, y) = self.config.box_origin(w, h, bw, bh);
            canvas.draw_image(image, x, y, bw, bh);
        } else if let Some(font) = font.filter(|_| !self.config.text.is_empty()) {
            let size = w * self.config.size_vw / 100.0;
            let (x, y) = self.config.box_origin(w, h, 0.0, size);
            let (_, _, align) = self.config.position.anchor().resolve(w, h);
            font.draw(canvas, &self.config.text, x, y + size / 2.0, size, rgb_or_white(&self.config.color), align);
        }
        canvas.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Pixmap;

    fn at(position: WatermarkPosition) -> WatermarkConfig {
        WatermarkConfig {
            enabled: true,
            position,
            ..Default::default()
        }
    }

    #[test]
    fn boxes_sit_inside_the_padding() {
        let (w, h) = (1000.0, 500.0);
        let origin = |p| at(p).box_origin(w, h, 100.0, 50.0);
        assert_eq!(origin(WatermarkPosition::TopLeft), (25.0, 25.0));
        assert_eq!(origin(WatermarkPosition::TopRight), (875.0, 25.0));
        assert_eq!(origin(WatermarkPosition::BottomLeft), (25.0, 425.0));
        assert_eq!(origin(WatermarkPosition::BottomRight), (875.0, 425.0));
        assert_eq!(origin(WatermarkPosition::Center), (450.0, 225.0));
    }

    #[test]
    fn image_is_drawn_at_its_corner_with_opacity() {
        let mut assets = AssetCache::new();
        let mut red = Pixmap::new(8, 8).unwrap();
        red.fill(tiny_skia::Color::from_rgba8(255, 0, 0, 255));
        assets.insert("logo.png", red);

        let overlay = WatermarkOverlay::new(WatermarkConfig {
            image: Some("logo.png".into()),
            image_width_pct: 10.0,
            ..at(WatermarkPosition::BottomRight)
        });
        let mut canvas = Canvas::new(320, 180).unwrap();
        overlay.draw(&mut canvas, None, &assets);

        // 32x32 box; its corner is at (280, 139) after the 8px / 9px padding.
        let rgba = canvas.to_rgba();
        let px = |x: usize, y: usize| &rgba[(y * 320 + x) * 4..(y * 320 + x) * 4 + 4];
        let inside = px(296, 155);
        assert!(inside[0] > 200 && inside[1] < 30);
        assert!((120..=136).contains(&inside[3]), "alpha {}", inside[3]);
        assert_eq!(px(10, 10)[3], 0);
        assert_eq!(canvas.depth(), 0);
    }

    #[test]
    fn disabled_or_empty_draws_nothing() {
        let assets = AssetCache::new();
        let mut canvas = Canvas::new(64, 36).unwrap();
        WatermarkOverlay::new(WatermarkConfig {
            image: Some("logo.png".into()),
            ..Default::default()
        })
        .draw(&mut canvas, None, &assets);
        WatermarkOverlay::new(at(WatermarkPosition::Center)).draw(&mut canvas, None, &assets);
        assert!(canvas.to_rgba().iter().all(|&b| b == 0));
    }

    #[test]
    fn image_is_only_requested_when_enabled() {
        let mut cfg = WatermarkConfig {
            image: Some("logo.png".into()),
            ..Default::default()
        };
        assert_eq!(WatermarkOverlay::new(cfg.clone()).image_source(), None);
        cfg.enabled = true;
        assert_eq!(WatermarkOverlay::new(cfg).image_source(), Some("logo.png"));
    }

    #[test]
    fn positions_parse_kebab_case() {
        let cfg: WatermarkConfig = toml::from_str("enabled = true\nposition = \"top-left\"").unwrap();
        assert_eq!(cfg.position, WatermarkPosition::TopLeft);
        assert_eq!(cfg.opacity, 0.5);
    }
}
