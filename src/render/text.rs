use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings};
use std::path::Path;
use tiny_skia::Pixmap;

use super::canvas::Canvas;

/// Fonts tried when no font is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

pub struct TextRenderer {
    font: Font,
}

impl TextRenderer {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| anyhow!("Failed to parse font: {}", e))?;
        Ok(Self { font })
    }

    /// Resolve a font from downloaded bytes, an explicit path, or the first
    /// system font that exists, in that order.
    pub fn load(path: Option<&Path>, bytes: Option<&[u8]>) -> Result<Self> {
        if let Some(bytes) = bytes {
            return Self::from_bytes(bytes);
        }
        if let Some(path) = path {
            let data = std::fs::read(path)
                .with_context(|| format!("Failed to read font: {}", path.display()))?;
            return Self::from_bytes(&data);
        }
        for candidate in SYSTEM_FONTS {
            let p = Path::new(candidate);
            if let Ok(data) = std::fs::read(p) {
                log::info!("Using system font {}", p.display());
                return Self::from_bytes(&data);
            }
        }
        anyhow::bail!("No font configured and no system font found")
    }

    pub fn line_height(&self, size: f32) -> f32 {
        match self.font.horizontal_line_metrics(size) {
            Some(m) => m.new_line_size,
            None => size * 1.2,
        }
    }

    /// Measure the width of rendered text in pixels.
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, size).advance_width)
            .sum()
    }

    /// Rasterize one line into a tight pixmap filled with `color`.
    pub fn rasterize(&self, text: &str, size: f32, color: [u8; 3]) -> Option<Pixmap> {
        let (ascent, descent) = match self.font.horizontal_line_metrics(size) {
            Some(m) => (m.ascent, m.descent),
            None => (size * 0.8, -size * 0.2),
        };
        let width = self.measure(text, size).ceil() as u32 + 2;
        let height = (ascent - descent).ceil() as u32 + 2;
        let mut pixmap = Pixmap::new(width.max(1), height.max(1))?;
        let pw = pixmap.width() as i32;
        let ph = pixmap.height() as i32;
        let data = pixmap.data_mut();

        let mut cursor_x = 1.0f32;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, size);
            let gx0 = (cursor_x + metrics.xmin as f32).round() as i32;
            let gy0 = (ascent - metrics.height as f32 - metrics.ymin as f32).round() as i32 + 1;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }
                    let px = gx0 + gx as i32;
                    let py = gy0 + gy as i32;
                    if px < 0 || py < 0 || px >= pw || py >= ph {
                        continue;
                    }
                    let idx = ((py * pw + px) * 4) as usize;
                    let a = coverage.max(data[idx + 3]) as u16;
                    data[idx] = ((color[0] as u16 * a + 127) / 255) as u8;
                    data[idx + 1] = ((color[1] as u16 * a + 127) / 255) as u8;
                    data[idx + 2] = ((color[2] as u16 * a + 127) / 255) as u8;
                    data[idx + 3] = a as u8;
                }
            }
            cursor_x += metrics.advance_width;
        }
        Some(pixmap)
    }

    /// Draw one line with its vertical center at `y`.
    pub fn draw(
        &self,
        canvas: &mut Canvas,
        text: &str,
        x: f32,
        y: f32,
        size: f32,
        color: [u8; 3],
        align: Align,
    ) {
        if text.is_empty() {
            return;
        }
        let Some(glyphs) = self.rasterize(text, size, color) else {
            return;
        };
        let (w, h) = (glyphs.width() as f32, glyphs.height() as f32);
        let left = match align {
            Align::Left => x,
            Align::Center => x - w / 2.0,
            Align::Right => x - w,
        };
        canvas.draw_image(&glyphs, left, y - h / 2.0, w, h);
    }
}

/// Download a TTF/OTF font from a URL.
pub fn load_font_from_url(url: &str) -> Result<Vec<u8>> {
    log::info!("Downloading font from {}", url);
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("Failed to fetch font: {}", url))?
        .error_for_status()
        .context("Font server returned an error")?;
    let bytes = response.bytes().context("Failed to read font body")?;
    Ok(bytes.to_vec())
}

/// Wrap text into lines that fit within `max_chars`.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.is_empty() {
            current_line.push_str(word);
        } else if current_line.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current_line));
            current_line.push_str(word);
        } else {
            current_line.push(' ');
            current_line.push_str(word);
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_line() {
        assert_eq!(wrap_text("hello", 10), vec!["hello"]);
    }

    #[test]
    fn long_text_wraps_on_words() {
        let lines = wrap_text("the quick brown fox jumps", 10);
        assert_eq!(lines, vec!["the quick", "brown fox", "jumps"]);
    }

    #[test]
    fn counts_chars_not_bytes() {
        assert_eq!(wrap_text("日本語のうた", 6).len(), 1);
    }

    #[test]
    fn missing_font_path_errors() {
        let result = TextRenderer::load(Some(Path::new("/nonexistent/font.ttf")), None);
        assert!(result.is_err());
        assert!(TextRenderer::from_bytes(b"not a font").is_err());
    }
}
