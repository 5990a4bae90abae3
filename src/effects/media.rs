use std::sync::Arc;

use tiny_skia::{PathBuilder, Pixmap};

use super::bars::capped;
use super::{noise, rgba, DrawParams, Renderer};
use crate::render::canvas::{cover_rect, rounded_rect_path};
use crate::render::Canvas;

fn resolve<'a>(p: &DrawParams<'a>) -> Option<&'a Arc<Pixmap>> {
    p.image.and_then(|id| p.assets.get(id))
}

/// A spinning record with the image as its label and a ring of bars.
pub struct VinylRecord;

impl Renderer for VinylRecord {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let bass = p.bass();
        let (cx, cy) = (p.width / 2.0, p.height / 2.0);
        let radius = p.min_dim() * 0.32;
        let label_r = radius * 0.38;
        let spin = p.frame_index as f32 * 0.6;

        canvas.save();

        let bars = 96;
        let max_bar = p.min_dim() * 0.12;
        let bar_w = capped(p.min_dim(), 0.004, 4.0).max(1.0);
        for i in 0..bars {
            let amp = p.amplitude_along(i as f32 / bars as f32, 0.5);
            let h = amp.powi(2) * max_bar;
            if h < 1.0 {
                continue;
            }
            let angle = i as f32 / bars as f32 * std::f32::consts::TAU - std::f32::consts::FRAC_PI_2;
            let (sin, cos) = angle.sin_cos();
            let r0 = radius * 1.04;
            let t = i as f32 / bars as f32;
            canvas.line(
                cx + cos * r0,
                cy + sin * r0,
                cx + cos * (r0 + h),
                cy + sin * (r0 + h),
                bar_w,
                rgba(p.palette.hue_at(t, 0.85, 0.6), 1.0),
            );
        }

        canvas.save();
        canvas.translate(cx, cy);
        canvas.scale(1.0 + bass * 0.03, 1.0 + bass * 0.03);
        canvas.rotate(spin);

        canvas.fill_circle(0.0, 0.0, radius, rgba([18, 18, 18], 1.0));
        let grooves = 14;
        for g in 1..grooves {
            let r = label_r + (radius - label_r) * g as f32 / grooves as f32;
            canvas.stroke_circle(0.0, 0.0, r, 1.0, rgba([60, 60, 60], 0.6));
        }
        // Sheen wedge so the rotation reads.
        canvas.line(0.0, -radius * 0.95, 0.0, -label_r * 1.1, capped(p.min_dim(), 0.006, 6.0), rgba([255, 255, 255], 0.08));

        match (resolve(p), PathBuilder::from_circle(0.0, 0.0, label_r)) {
            (Some(image), Some(clip)) => {
                let (x, y, w, h) = cover_rect(image.width() as f32, image.height() as f32, label_r * 2.0, label_r * 2.0);
                canvas.draw_image_clipped(image, x - label_r, y - label_r, w, h, &clip);
            }
            _ => canvas.fill_circle(0.0, 0.0, label_r, rgba(p.palette.primary, 1.0)),
        }
        canvas.fill_circle(0.0, 0.0, label_r * 0.08, rgba([10, 10, 10], 1.0));
        canvas.restore();

        let arm_color = rgba([200, 200, 205], 1.0);
        let pivot = (cx + radius * 1.15, cy - radius * 0.95);
        let tip = (cx + radius * 0.55, cy + radius * 0.25);
        canvas.fill_circle(pivot.0, pivot.1, radius * 0.07, arm_color);
        canvas.line(pivot.0, pivot.1, tip.0, tip.1, capped(p.min_dim(), 0.008, 8.0), arm_color);

        canvas.restore();
    }
}

/// The image shaking and pulsing with the bass.
pub struct PhotoShake;

impl Renderer for PhotoShake {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let bass = p.bass();
        let (cx, cy) = (p.width / 2.0, p.height / 2.0);
        let (box_w, box_h) = (p.width * 0.6, p.height * 0.6);
        let shake = capped(p.min_dim(), 0.03, 30.0) * bass.powi(2);
        let dx = (noise(p.frame_index, 1) - 0.5) * 2.0 * shake;
        let dy = (noise(p.frame_index, 2) - 0.5) * 2.0 * shake;
        let tilt = (noise(p.frame_index, 3) - 0.5) * 4.0 * bass;
        let zoom = 1.0 + bass * if p.flags.beat { 0.08 } else { 0.04 };

        canvas.save();
        canvas.translate(cx + dx, cy + dy);
        canvas.rotate(tilt);
        canvas.scale(zoom, zoom);

        let radius = capped(p.min_dim(), 0.02, 24.0);
        let Some(frame) = rounded_rect_path(-box_w / 2.0, -box_h / 2.0, box_w, box_h, radius) else {
            canvas.restore();
            return;
        };
        match resolve(p) {
            Some(image) => {
                let (x, y, w, h) = cover_rect(image.width() as f32, image.height() as f32, box_w, box_h);
                canvas.draw_image_clipped(image, x - box_w / 2.0, y - box_h / 2.0, w, h, &frame);
            }
            None => canvas.fill_path(&frame, rgba(p.palette.secondary, 0.35)),
        }
        canvas.stroke_path(&frame, capped(p.min_dim(), 0.004, 4.0).max(1.0), rgba(p.palette.primary, 0.9));
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
    fn uses_cached_image_when_ready() {
        let palette = Palette::default();
        let mut assets = AssetCache::new();
        let mut red = Pixmap::new(8, 8).unwrap();
        red.fill(tiny_skia::Color::from_rgba8(255, 0, 0, 255));
        assets.insert("missing.png", red);

        let mut canvas = Canvas::new(320, 180).unwrap();
        let p = params(None, &palette, &assets);
        assert!(resolve(&p).is_some());
        PhotoShake.draw(&mut canvas, &p);

        let center = ((90 * 320 + 160) * 4) as usize;
        let px = &canvas.pixmap().data()[center..center + 4];
        assert_eq!(px, &[255, 0, 0, 255]);
    }

    #[test]
    fn placeholder_while_pending() {
        let palette = Palette::default();
        let assets = AssetCache::new();
        let p = params(None, &palette, &assets);
        assert!(resolve(&p).is_none());
        let mut canvas = Canvas::new(320, 180).unwrap();
        VinylRecord.draw(&mut canvas, &p);
        assert!(canvas.pixmap().data().chunks_exact(4).any(|px| px[3] > 0));
    }
}
