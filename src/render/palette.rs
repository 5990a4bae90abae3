use serde::{Deserialize, Serialize};
use tiny_skia::Color;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaletteKind {
    #[default]
    Default,
    Cyberpunk,
    Sunset,
    Glacier,
    Lava,
    Midnight,
    White,
    Rainbow,
    Custom,
}

impl std::str::FromStr for PaletteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "cyberpunk" => Ok(Self::Cyberpunk),
            "sunset" => Ok(Self::Sunset),
            "glacier" => Ok(Self::Glacier),
            "lava" => Ok(Self::Lava),
            "midnight" => Ok(Self::Midnight),
            "white" => Ok(Self::White),
            "rainbow" => Ok(Self::Rainbow),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown palette: {other}")),
        }
    }
}

/// Resolved colors handed to renderers for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Palette {
    pub kind: PaletteKind,
    pub primary: [u8; 3],
    pub secondary: [u8; 3],
    pub accent: [u8; 3],
    pub glow: [u8; 3],
    /// Hue span in degrees used by gradient-style renderers.
    pub hue_range: (f32, f32),
}

impl Palette {
    pub fn preset(kind: PaletteKind, custom: [u8; 3]) -> Self {
        let (primary, secondary, accent, glow, hue_range) = match kind {
            PaletteKind::Default => ([0, 229, 255], [236, 72, 153], [255, 255, 255], [34, 211, 238], (180.0, 320.0)),
            PaletteKind::Cyberpunk => ([255, 0, 255], [0, 255, 255], [255, 255, 0], [255, 0, 200], (280.0, 360.0)),
            PaletteKind::Sunset => ([255, 94, 77], [255, 195, 0], [255, 240, 200], [255, 120, 60], (0.0, 50.0)),
            PaletteKind::Glacier => ([125, 211, 252], [224, 242, 254], [255, 255, 255], [56, 189, 248], (180.0, 220.0)),
            PaletteKind::Lava => ([255, 69, 0], [255, 140, 0], [255, 215, 0], [220, 38, 38], (0.0, 40.0)),
            PaletteKind::Midnight => ([99, 102, 241], [30, 27, 75], [196, 181, 253], [79, 70, 229], (230.0, 280.0)),
            PaletteKind::White => ([255, 255, 255], [220, 220, 220], [255, 255, 255], [200, 200, 200], (0.0, 0.0)),
            PaletteKind::Rainbow => ([255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 255], (0.0, 80.0)),
            PaletteKind::Custom => {
                let secondary = custom.map(|c| c / 2);
                let accent = custom.map(|c| c.saturating_add((255 - c) / 2));
                let (h, _, _) = rgb_to_hsl(custom);
                (custom, secondary, accent, custom, (h, h + 60.0))
            }
        };
        Self {
            kind,
            primary,
            secondary,
            accent,
            glow,
            hue_range,
        }
    }

    /// Rainbow rotates its hue with the frame counter; other palettes are static.
    pub fn at_frame(&self, frame_index: u64) -> Self {
        if self.kind != PaletteKind::Rainbow {
            return *self;
        }
        let hue = (frame_index as f32 * 0.1) % 360.0;
        Self {
            primary: hsl_to_rgb(hue, 0.9, 0.6),
            secondary: hsl_to_rgb((hue + 120.0) % 360.0, 0.8, 0.6),
            accent: hsl_to_rgb((hue + 40.0) % 360.0, 1.0, 0.8),
            hue_range: (hue, hue + 80.0),
            ..*self
        }
    }

    /// Color along the palette hue range, `t` in 0..=1.
    pub fn hue_at(&self, t: f32, saturation: f32, lightness: f32) -> [u8; 3] {
        if self.kind == PaletteKind::White {
            return self.primary;
        }
        let (start, end) = self.hue_range;
        hsl_to_rgb((start + (end - start) * t.clamp(0.0, 1.0)).rem_euclid(360.0), saturation, lightness)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::preset(PaletteKind::Default, [255, 255, 255])
    }
}

pub fn color(rgb: [u8; 3], alpha: f32) -> Color {
    Color::from_rgba8(rgb[0], rgb[1], rgb[2], (alpha.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Parse `#rrggbb` or `#rgb`.
pub fn parse_hex(s: &str) -> Option<[u8; 3]> {
    let hex = s.trim().trim_start_matches('#');
    let expand = |c: u8| c * 17;
    match hex.len() {
        6 => {
            let v = u32::from_str_radix(hex, 16).ok()?;
            Some([(v >> 16) as u8, (v >> 8) as u8, v as u8])
        }
        3 => {
            let v = u16::from_str_radix(hex, 16).ok()?;
            Some([
                expand(((v >> 8) & 0xf) as u8),
                expand(((v >> 4) & 0xf) as u8),
                expand((v & 0xf) as u8),
            ])
        }
        _ => None,
    }
}

pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [u8; 3] {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_u8 = |v: f32| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}

pub fn rgb_to_hsl(rgb: [u8; 3]) -> (f32, f32, f32) {
    let [r, g, b] = rgb.map(|c| c as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if max == min {
        return (0.0, 0.0, l);
    }
    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h * 60.0, s, l)
}
