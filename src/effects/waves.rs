use tiny_skia::{GradientStop, LinearGradient, Path, PathBuilder, Point, SpreadMode, Transform};

use super::bars::{capped, draw_solid_wave, mirrored_wave};
use super::{noise, rgba, DrawParams, Renderer, STROKE_COLOR};
use crate::render::Canvas;

/// Polyline through `points`, smoothed with midpoint quadratic segments.
fn smooth_curve(points: &[(f32, f32)]) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.0, first.1);
    for pair in rest.windows(2) {
        let (cx, cy) = pair[0];
        let (nx, ny) = pair[1];
        pb.quad_to(cx, cy, (cx + nx) / 2.0, (cy + ny) / 2.0);
    }
    if let Some(&(lx, ly)) = rest.last() {
        pb.line_to(lx, ly);
    }
    pb.finish()
}

/// Mirrored glowing waves around a horizontal light beam.
pub struct LuminousWave;

impl Renderer for LuminousWave {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let center_x = p.width / 2.0;
        let center_y = p.height / 2.0;
        let max_amp = p.height * 0.35;
        let palette = p.palette;

        canvas.save();

        let beam = LinearGradient::new(
            Point::from_xy(0.0, center_y),
            Point::from_xy(p.width, center_y),
            vec![
                GradientStop::new(0.0, canvas.tint(rgba(palette.accent, 0.0))),
                GradientStop::new(0.2, canvas.tint(rgba(palette.accent, 0.25))),
                GradientStop::new(0.5, canvas.tint(rgba(palette.accent, 1.0))),
                GradientStop::new(0.8, canvas.tint(rgba(palette.accent, 0.25))),
                GradientStop::new(1.0, canvas.tint(rgba(palette.accent, 0.0))),
            ],
            SpreadMode::Pad,
            Transform::identity(),
        );
        let beam_h = capped(p.height, 0.004, 4.0).max(1.0);
        if let (Some(shader), Some(path)) = (
            beam,
            tiny_skia::Rect::from_xywh(0.0, center_y - beam_h / 2.0, p.width, beam_h)
                .map(PathBuilder::from_rect),
        ) {
            canvas.fill_path_with(&path, shader);
        }

        let osc_amp = capped(p.height, 0.005, 5.0);
        let points_per_side = 128;
        for side in [-1.0f32, 1.0] {
            let mut top = Vec::with_capacity(points_per_side + 1);
            let mut bottom = Vec::with_capacity(points_per_side + 1);
            for i in 0..=points_per_side {
                let progress = i as f32 / points_per_side as f32;
                let x = center_x + side * progress * center_x;
                let a = p.amplitude_along(progress, 0.5) * max_amp;
                let osc = (i as f32 * 0.1 + p.frame_index as f32 * 0.05).sin() * osc_amp * (a / max_amp);
                top.push((x, center_y - (a + osc)));
                bottom.push((x, center_y + (a + osc)));
            }

            for curve in [top, bottom] {
                let Some(path) = smooth_curve(&curve) else {
                    continue;
                };
                if p.stroke {
                    canvas.stroke_path(&path, 4.5, rgba(STROKE_COLOR, 0.7));
                }
                let gradient = LinearGradient::new(
                    Point::from_xy(center_x, center_y - max_amp),
                    Point::from_xy(center_x, center_y + max_amp),
                    vec![
                        GradientStop::new(0.0, canvas.tint(rgba(palette.secondary, 0.8))),
                        GradientStop::new(0.4, canvas.tint(rgba(palette.primary, 1.0))),
                        GradientStop::new(0.5, canvas.tint(rgba(palette.accent, 1.0))),
                        GradientStop::new(0.6, canvas.tint(rgba(palette.primary, 1.0))),
                        GradientStop::new(1.0, canvas.tint(rgba(palette.secondary, 0.8))),
                    ],
                    SpreadMode::Pad,
                    Transform::identity(),
                );
                canvas.stroke_path(&path, 7.0, rgba(palette.primary, 0.12));
                match gradient {
                    Some(shader) => canvas.stroke_path_with(&path, 2.5, shader),
                    None => canvas.stroke_path(&path, 2.5, rgba(palette.primary, 1.0)),
                }
            }
        }

        canvas.restore();
    }
}

/// A translucent cloud between mirrored solid waves, edged with drifting dots.
pub struct NebulaWave;

impl Renderer for NebulaWave {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let center_y = p.height / 2.0;
        let frame = p.frame_index as f32;
        let wave = mirrored_wave(p, capped(p.height, 0.14, 150.0));

        canvas.save();

        let mut pb = PathBuilder::new();
        for (i, &(x, amp)) in wave.iter().enumerate() {
            let y = center_y - amp * 0.9;
            if i == 0 {
                pb.move_to(x, y);
            } else {
                pb.line_to(x, y);
            }
        }
        for &(x, amp) in wave.iter().rev() {
            pb.line_to(x, center_y + amp * 0.9);
        }
        pb.close();
        if let Some(cloud) = pb.finish() {
            canvas.fill_path(&cloud, rgba(p.palette.secondary, 0.18));
            canvas.stroke_path(&cloud, 1.0, rgba(p.palette.glow, 0.3));
        }

        draw_solid_wave(canvas, p, &wave, center_y, frame);

        let r = capped(p.height, 0.0014, 1.5).max(0.75);
        for &(x, amp) in &wave {
            let osc = (x * 0.08 - frame * 0.03).sin() * capped(p.height, 0.0075, 8.0);
            canvas.fill_circle(x, center_y + amp * 1.2 + osc, r, rgba(p.palette.accent, 0.9));
            canvas.fill_circle(x, center_y - amp * 1.2 + osc, r, rgba(p.palette.accent, 0.9));
        }

        canvas.restore();
    }
}

/// Closed polar waveform around the center, mirrored left/right.
pub struct CircularWave;

impl Renderer for CircularWave {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let center_x = p.width / 2.0;
        let center_y = p.height / 2.0;
        let base = p.min_dim() * 0.25;
        let reach = p.min_dim() * 0.15;
        let points = 180;
        let spin = p.frame_index as f32 * 0.2;

        let radius_at = |i: usize| {
            let half = points / 2;
            let mirrored = if i <= half { i } else { points - i };
            let a = p.amplitude_along(mirrored as f32 / half as f32, 0.5);
            base + a.powf(1.5) * reach
        };

        canvas.save();
        canvas.translate(center_x, center_y);
        canvas.rotate(spin);

        let mut pb = PathBuilder::new();
        for i in 0..points {
            let angle = i as f32 / points as f32 * std::f32::consts::TAU - std::f32::consts::FRAC_PI_2;
            let r = radius_at(i);
            let (x, y) = (angle.cos() * r, angle.sin() * r);
            if i == 0 {
                pb.move_to(x, y);
            } else {
                pb.line_to(x, y);
            }
        }
        pb.close();
        if let Some(path) = pb.finish() {
            canvas.fill_path(&path, rgba(p.palette.secondary, 0.2));
            if p.stroke {
                canvas.stroke_path(&path, 4.5, rgba(STROKE_COLOR, 0.7));
            }
            let color = if p.flags.beat { p.palette.accent } else { p.palette.primary };
            canvas.stroke_path(&path, 2.5, rgba(color, 1.0));
        }
        canvas.stroke_circle(0.0, 0.0, base * 0.95, 1.0, rgba(p.palette.glow, 0.4));

        canvas.restore();
    }
}

/// Oscilloscope-style line with scanlines and horizontal slips on beats.
pub struct GlitchWave;

impl Renderer for GlitchWave {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let center_y = p.height / 2.0;
        let count = (p.bins().len() / 2).max(2);
        let slice_width = p.width / count as f32;

        canvas.save();

        let mut pb = PathBuilder::new();
        for i in 0..count {
            let a = p.amplitude_along(i as f32 / count as f32, 0.5);
            let (x, y) = (i as f32 * slice_width, center_y + a.powf(1.5) * p.height * 0.3);
            if i == 0 {
                pb.move_to(x, y);
            } else {
                pb.line_to(x, y);
            }
        }
        if let Some(path) = pb.finish() {
            if p.stroke {
                canvas.stroke_path(&path, 4.5, rgba(STROKE_COLOR, 0.7));
            }
            canvas.stroke_path(&path, 2.5, rgba(p.palette.primary, 1.0));
        }

        let line_gap = capped(p.height, 0.011, 12.0).max(2.0);
        let mut y = 0.0;
        while y < p.height {
            canvas.fill_rect(0.0, y, p.width, 1.0, rgba([0, 0, 0], 0.1));
            y += line_gap;
        }

        canvas.restore();

        let frame = p.frame_index;
        if p.flags.beat && noise(frame, 0) > 0.6 {
            let slices = 1 + (noise(frame, 1) * 3.0) as u64;
            for s in 0..slices {
                let sy = noise(frame, 10 + s) * p.height;
                let sh = noise(frame, 20 + s) * p.height / 15.0 + 3.0;
                let dx = (noise(frame, 30 + s) - 0.5) * capped(p.width, 0.013, 25.0);
                canvas.shift_band(sy, sh, dx);
            }
        }
    }

    fn honors_transform(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smooth_curve_needs_points() {
        assert!(smooth_curve(&[]).is_none());
        assert!(smooth_curve(&[(0.0, 0.0), (10.0, 5.0), (20.0, 0.0)]).is_some());
    }

    #[test]
    fn glitch_wave_opts_out_of_transforms() {
        assert!(!GlitchWave.honors_transform());
        assert!(LuminousWave.honors_transform());
    }
}
