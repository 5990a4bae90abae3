use tiny_skia::PathBuilder;

use super::{rgba, DrawParams, Renderer, BAND_CEILING, STROKE_COLOR};
use crate::render::canvas::rounded_rect_path;
use crate::render::palette::{hsl_to_rgb, PaletteKind};
use crate::render::Canvas;

/// `min(fraction * dim, cap)`
pub(crate) fn capped(dim: f32, fraction: f32, cap: f32) -> f32 {
    (fraction * dim).min(cap)
}

/// Mirrored rounded bars growing up and down from the horizontal center.
pub struct Monstercat;

impl Renderer for Monstercat {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let bars_per_half = 64;
        let bar_width = p.width / (bars_per_half * 2) as f32;
        let center_x = p.width / 2.0;
        let center_y = p.height / 2.0;
        let max_height = p.height * 0.45;
        let (start_hue, end_hue) = p.palette.hue_range;
        let gap = capped(bar_width, 0.25, 2.0);
        let effective = (bar_width - gap).max(1.0);
        let radius = (effective / 3.0).min(capped(p.height, 0.004, 4.0));
        // Keeps a visible baseline before analysis arrives.
        let floor = if p.is_idle() { capped(p.height, 0.003, 2.0) } else { 0.0 };

        canvas.save();
        for i in 0..bars_per_half {
            let amp = p.amplitude_along(i as f32 / bars_per_half as f32, BAND_CEILING);
            let bar_height = (amp.powf(2.5) * max_height).max(floor);
            if bar_height < 2.0 && floor == 0.0 {
                continue;
            }

            let color = if p.palette.kind == PaletteKind::White {
                hsl_to_rgb(220.0, 0.1, 0.85 + amp * 0.15)
            } else {
                let hue = start_hue + (i as f32 / bars_per_half as f32) * (end_hue - start_hue);
                let saturation = if p.flags.beat { 1.0 } else { 0.9 };
                hsl_to_rgb(hue, saturation, 0.6 + amp * 0.1)
            };

            for x in [
                center_x - (i + 1) as f32 * bar_width + gap / 2.0,
                center_x + i as f32 * bar_width + gap / 2.0,
            ] {
                for y in [center_y - bar_height, center_y] {
                    let Some(path) = rounded_rect_path(x, y, effective, bar_height, radius) else {
                        continue;
                    };
                    if p.flags.beat {
                        canvas.stroke_path(&path, effective * 0.5, rgba(color, 0.2));
                    }
                    canvas.fill_path(&path, rgba(color, 1.0));
                    if p.stroke {
                        canvas.stroke_path(&path, 1.5, rgba(STROKE_COLOR, 0.4));
                    }
                }
            }
        }
        canvas.restore();
    }
}

/// Dotted spectrum columns rising from the bottom edge plus mirrored solid
/// and dotted waves across the middle.
pub struct Fusion;

impl Renderer for Fusion {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let center_y = p.height / 2.0;
        let (start_hue, end_hue) = p.palette.hue_range;
        let frame = p.frame_index as f32;

        canvas.save();

        let columns = 128;
        let spacing_x = p.width / columns as f32;
        let dot_spacing = capped(p.height, 0.012, 8.0).max(1.0);
        let dot_scale = capped(p.height, 1.0 / 1080.0, 1.0).max(0.5);
        for i in 0..columns {
            let amp = p.amplitude_along(i as f32 / columns as f32, BAND_CEILING);
            let column_height = amp.powi(2) * p.height * 0.8;
            if column_height < 1.0 {
                continue;
            }
            let color = if p.palette.kind == PaletteKind::White {
                hsl_to_rgb(220.0, 0.05, 0.8 + amp * 0.2)
            } else {
                hsl_to_rgb(start_hue + (i as f32 / columns as f32) * (end_hue - start_hue), 0.8, 0.6)
            };
            let x = i as f32 * spacing_x + spacing_x / 2.0;
            let dots = (column_height / dot_spacing) as usize;
            for j in 0..dots {
                let y = p.height - j as f32 * dot_spacing - dot_spacing / 2.0;
                let opacity = 1.0 - (j as f32 / dots as f32).powi(2);
                let radius = (1.0 + amp * 1.5) * dot_scale;
                canvas.fill_circle(x, y, radius, rgba(color, opacity));
            }
        }

        let wave = mirrored_wave(p, capped(p.height, 0.14, 150.0));
        draw_solid_wave(canvas, p, &wave, center_y, frame);
        for &(x, amp) in &wave {
            let osc = (x * 0.08 - frame * 0.03).sin() * capped(p.height, 0.0075, 8.0);
            let r = capped(p.height, 0.0014, 1.5).max(0.75);
            canvas.fill_circle(x, center_y + amp * 1.2 + osc, r, rgba(p.palette.secondary, 1.0));
            canvas.fill_circle(x, center_y - amp * 1.2 + osc, r, rgba(p.palette.secondary, 1.0));
        }

        canvas.restore();
    }
}

/// `(x, amplitude)` samples in ascending x, mirrored around the vertical
/// center line. Covers the lower 35% of the spectrum.
pub(crate) fn mirrored_wave(p: &DrawParams, max_amp: f32) -> Vec<(f32, f32)> {
    let width = p.width;
    let center_x = width / 2.0;
    let half_points = ((width / 4.0) as usize).max(2);
    let left: Vec<(f32, f32)> = (0..=half_points)
        .map(|i| {
            let progress = i as f32 / half_points as f32;
            let amp = p.amplitude_along(progress, 0.35);
            (center_x - progress * center_x, amp.powi(2) * max_amp)
        })
        .collect();
    let mut wave: Vec<(f32, f32)> = left.iter().rev().copied().collect();
    wave.extend(left.iter().skip(1).map(|&(x, a)| (width - x, a)));
    wave
}

/// Top and bottom solid wave lines shared by Fusion and NebulaWave.
pub(crate) fn draw_solid_wave(
    canvas: &mut Canvas,
    p: &DrawParams,
    wave: &[(f32, f32)],
    center_y: f32,
    frame: f32,
) {
    let osc_amp = capped(p.height, 0.005, 5.0);
    for sign in [1.0f32, -1.0] {
        let mut pb = PathBuilder::new();
        for (i, &(x, amp)) in wave.iter().enumerate() {
            let y = center_y + sign * amp * 0.6 + (x * 0.05 + frame * 0.02).sin() * osc_amp;
            if i == 0 {
                pb.move_to(x, y);
            } else {
                pb.line_to(x, y);
            }
        }
        let Some(path) = pb.finish() else {
            continue;
        };
        if p.stroke {
            canvas.stroke_path(&path, 4.5, rgba(STROKE_COLOR, 0.7));
        }
        canvas.stroke_path(&path, 6.0, rgba(p.palette.primary, 0.15));
        canvas.stroke_path(&path, 2.5, rgba(p.palette.primary, 1.0));
    }
}

/// Two rings of spikes: bass pointing inwards, treble outwards.
pub struct RadialBars;

impl Renderer for RadialBars {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let center_x = p.width / 2.0;
        let center_y = p.height / 2.0;
        let inner = p.min_dim() * 0.22;
        let outer = inner + p.width * 0.015;
        let color = if p.flags.beat { p.palette.accent } else { p.palette.primary };
        let line_width = capped(p.min_dim(), 0.002, 2.0).max(1.0);

        canvas.save();
        canvas.stroke_circle(center_x, center_y, inner, 1.0, rgba(color, 0.15));
        canvas.stroke_circle(center_x, center_y, outer, 1.0, rgba(color, 0.15));

        // Each ring spans `lo_hz..hi_hz` around the circle.
        let spikes = |canvas: &mut Canvas, radius: f32, max_h: f32, lo_hz: f32, hi_hz: f32, dir: f32| {
            let count = 128;
            for i in 0..count {
                let amp = p.amplitude_at(lo_hz + (hi_hz - lo_hz) * i as f32 / count as f32);
                let h = amp.powi(2) * max_h;
                if h < 1.0 {
                    continue;
                }
                let angle = i as f32 / count as f32 * std::f32::consts::TAU - std::f32::consts::FRAC_PI_2;
                let (sin, cos) = angle.sin_cos();
                let (x1, y1) = (center_x + cos * radius, center_y + sin * radius);
                let (x2, y2) = (center_x + cos * (radius + h * dir), center_y + sin * (radius + h * dir));
                if p.stroke {
                    canvas.line(x1, y1, x2, y2, line_width + 2.0, rgba(STROKE_COLOR, 0.7));
                }
                canvas.line(x1, y1, x2, y2, line_width, rgba(color, 1.0));
            }
        };

        let nyquist = p.nyquist();
        spikes(canvas, inner, p.min_dim() * 0.08, 0.0, 1400.0, -1.0);
        spikes(canvas, outer, p.min_dim() * 0.28, 2150.0, nyquist / 4.0, 1.0);
        canvas.restore();
    }
}

/// Rotating wireframe terrain whose heights follow the spectrum.
pub struct AudioLandscape;

impl Renderer for AudioLandscape {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let center_x = p.width / 2.0;
        let center_y = p.height * 0.6;
        let fov = p.width * 0.8;
        let grid_x = 40;
        let grid_z = 30;
        let spacing = p.width / grid_x as f32 * 1.2;
        let max_terrain = p.height * 0.2;
        let angle = p.frame_index as f32 * 0.002;
        let (sin_a, cos_a) = angle.sin_cos();
        let (start_hue, end_hue) = p.palette.hue_range;

        let heights: Vec<f32> = (0..grid_x)
            .map(|x| {
                let amp = p.amplitude_along(x as f32 / grid_x as f32, 0.6);
                amp.powi(2) * max_terrain
            })
            .collect();

        canvas.save();
        for z in 0..grid_z {
            let mut pb = PathBuilder::new();
            let mut started = false;
            for (x, &terrain) in heights.iter().enumerate() {
                let x3 = (x as f32 - grid_x as f32 / 2.0) * spacing;
                let z3 = (z as f32 - grid_z as f32 / 2.0) * spacing;
                let rot_x = x3 * cos_a - z3 * sin_a;
                let rot_z = x3 * sin_a + z3 * cos_a;
                let scale = fov / (fov + rot_z);
                if scale <= 0.0 || !scale.is_finite() {
                    continue;
                }
                let (px, py) = (rot_x * scale + center_x, -terrain * scale + center_y);
                if started {
                    pb.line_to(px, py);
                } else {
                    pb.move_to(px, py);
                    started = true;
                }
            }
            let Some(path) = pb.finish() else {
                continue;
            };
            let progress = z as f32 / grid_z as f32;
            let color = if p.palette.kind == PaletteKind::White {
                p.palette.primary
            } else {
                hsl_to_rgb(start_hue + progress * (end_hue - start_hue), 0.9, 0.4 + progress * 0.3)
            };
            canvas.stroke_path(&path, 1.5, rgba(color, 1.0 - progress * 0.7));
        }
        canvas.restore();
    }
}
