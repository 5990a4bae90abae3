use tiny_skia::{GradientStop, LinearGradient, PathBuilder, Point, Rect, SpreadMode, Transform};

use super::bars::capped;
use super::{rgba, DrawParams, Renderer, BAND_CEILING};
use crate::render::Canvas;

const WHITE_KEYS: usize = 28;
/// Black key after white key `i % 7` (C#, D#, _, F#, G#, A#, _).
const BLACK_PATTERN: [bool; 7] = [true, true, false, true, true, true, false];

/// Level per white key, each key an equal slice of the lower 70% of the
/// Nyquist range, sensitivity applied.
pub(crate) fn key_presses(p: &DrawParams) -> [f32; WHITE_KEYS] {
    let key_hz = BAND_CEILING * p.nyquist() / WHITE_KEYS as f32;
    let mut presses = [0.0; WHITE_KEYS];
    for (i, press) in presses.iter_mut().enumerate() {
        *press = p.band_amplitude(i as f32 * key_hz, (i + 1) as f32 * key_hz);
    }
    presses
}

/// A keyboard along the bottom edge whose keys sink with their band.
pub struct PianoVirtuoso;

impl PianoVirtuoso {
    fn key(canvas: &mut Canvas, x: f32, y: f32, w: f32, h: f32, top: [u8; 3], bottom: [u8; 3]) {
        let Some(rect) = Rect::from_xywh(x, y, w, h) else {
            return;
        };
        let path = PathBuilder::from_rect(rect);
        let shader = LinearGradient::new(
            Point::from_xy(x, y),
            Point::from_xy(x, y + h),
            vec![
                GradientStop::new(0.0, canvas.tint(rgba(top, 1.0))),
                GradientStop::new(1.0, canvas.tint(rgba(bottom, 1.0))),
            ],
            SpreadMode::Pad,
            Transform::identity(),
        );
        match shader {
            Some(shader) => canvas.fill_path_with(&path, shader),
            None => canvas.fill_path(&path, rgba(top, 1.0)),
        }
    }
}

impl Renderer for PianoVirtuoso {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let presses = key_presses(p);
        let keyboard_h = p.height * 0.25;
        let keyboard_y = p.height - keyboard_h;
        let white_w = p.width / WHITE_KEYS as f32;
        let black_w = white_w * 0.6;
        let black_h = keyboard_h * 0.6;
        let sink = capped(p.height, 0.002, 2.0);

        canvas.save();

        if p.flags.beat {
            canvas.fill_rect(
                0.0,
                keyboard_y - capped(p.height, 0.02, 20.0),
                p.width,
                capped(p.height, 0.02, 20.0),
                rgba(p.palette.accent, 0.25),
            );
        }

        for (i, &press) in presses.iter().enumerate() {
            let pressed = press.powi(2) > 0.1;
            let x = i as f32 * white_w;
            let y = keyboard_y + if pressed { sink } else { 0.0 };
            let (top, bottom) = if pressed {
                ([187, 187, 187], [153, 153, 153])
            } else {
                ([255, 255, 255], [224, 224, 224])
            };
            Self::key(canvas, x, y, white_w, keyboard_h, top, bottom);
            if let Some(rect) = Rect::from_xywh(x, y, white_w, keyboard_h) {
                canvas.stroke_path(&PathBuilder::from_rect(rect), 1.0, rgba([51, 51, 51], 1.0));
            }
            if pressed {
                // Glow rising off the pressed key.
                let glow_h = press * p.height * 0.3;
                canvas.fill_rect(x + white_w * 0.2, y - glow_h, white_w * 0.6, glow_h, rgba(p.palette.primary, 0.35));
            }
        }

        for i in 0..WHITE_KEYS - 1 {
            if !BLACK_PATTERN[i % 7] {
                continue;
            }
            let press = (presses[i] + presses[i + 1]) / 2.0;
            let pressed = press.powi(2) > 0.15;
            let x = (i + 1) as f32 * white_w - black_w / 2.0;
            let y = keyboard_y + if pressed { sink } else { 0.0 };
            let (top, bottom) = if pressed {
                ([85, 85, 85], [51, 51, 51])
            } else {
                ([51, 51, 51], [0, 0, 0])
            };
            Self::key(canvas, x, y, black_w, black_h, top, bottom);
        }

        canvas.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetCache;
    use crate::effects::tests::params;
    use crate::render::Palette;

    #[test]
    fn presses_follow_their_band() {
        let (palette, assets) = (Palette::default(), AssetCache::new());
        let mut bins = vec![0u8; 1024];
        // 551.25 Hz per key at 44.1 kHz: key 2 spans bins 51..76.
        for b in &mut bins[51..76] {
            *b = 255;
        }
        let presses = key_presses(&params(Some(&bins), &palette, &assets));
        assert_eq!(presses[2], 1.0);
        assert_eq!(presses[1], 0.0);
        assert_eq!(presses[3], 0.0);
    }

    #[test]
    fn presses_scale_with_sensitivity() {
        let (palette, assets) = (Palette::default(), AssetCache::new());
        let mut bins = vec![0u8; 1024];
        for b in &mut bins[0..26] {
            *b = 51;
        }
        let mut p = params(Some(&bins), &palette, &assets);
        assert!((key_presses(&p)[0] - 0.2).abs() < 1e-6);
        p.sensitivity = 3.0;
        assert!((key_presses(&p)[0] - 0.6).abs() < 1e-6);
        p.sensitivity = 10.0;
        assert_eq!(key_presses(&p)[0], 1.0);
    }

    #[test]
    fn presses_handle_tiny_spectra() {
        let (palette, assets) = (Palette::default(), AssetCache::new());
        let presses = key_presses(&params(Some(&[255, 255]), &palette, &assets));
        assert_eq!(presses[0], 1.0);
        assert!(presses.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
