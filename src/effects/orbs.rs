use tiny_skia::{GradientStop, PathBuilder, Point, RadialGradient, SpreadMode, Transform};

use super::bars::capped;
use super::{noise, rgba, DrawParams, Renderer, STROKE_COLOR};
use crate::render::Canvas;

const MID_HZ: (f32, f32) = (690.0, 2750.0);
const TREBLE_HZ: (f32, f32) = (2750.0, 5500.0);

/// Bass, mid and treble levels the orb effects listen to, sensitivity applied.
fn bands(p: &DrawParams) -> (f32, f32, f32) {
    (
        p.bass(),
        p.band_amplitude(MID_HZ.0, MID_HZ.1),
        p.band_amplitude(TREBLE_HZ.0, TREBLE_HZ.1),
    )
}

fn overall(p: &DrawParams) -> (f32, f32) {
    let (bass, mid, treble) = bands(p);
    (bass, (bass * 0.5 + mid * 0.3 + treble * 0.2).clamp(0.0, 1.0))
}

/// Expanding rings whose age cycles every 100 frames.
fn ripples(
    canvas: &mut Canvas,
    p: &DrawParams,
    count: u64,
    stagger: u64,
    max_radius: f32,
    intensity: f32,
    max_width: f32,
) {
    let (cx, cy) = (p.width / 2.0, p.height / 2.0);
    let color = if p.flags.beat { p.palette.accent } else { p.palette.primary };
    for layer in 0..count {
        let age = ((p.frame_index + layer * stagger) % 100) as f32 / 100.0;
        let opacity = (1.0 - age).max(0.0) * 0.75;
        if opacity <= 0.05 {
            continue;
        }
        let width = (max_width - layer as f32 * max_width / (count as f32 + 1.0)).max(1.0);
        canvas.stroke_circle(cx, cy, age * max_radius, width, rgba(color, opacity * intensity));
    }
}

/// Glowing radial core: accent center fading out through primary.
fn core(canvas: &mut Canvas, p: &DrawParams, radius: f32) {
    let (cx, cy) = (p.width / 2.0, p.height / 2.0);
    let shader = RadialGradient::new(
        Point::from_xy(cx, cy),
        Point::from_xy(cx, cy),
        radius.max(1.0),
        vec![
            GradientStop::new(0.0, canvas.tint(rgba(p.palette.accent, 1.0))),
            GradientStop::new(0.4, canvas.tint(rgba(p.palette.primary, 1.0))),
            GradientStop::new(1.0, canvas.tint(rgba(p.palette.primary, 0.0))),
        ],
        SpreadMode::Pad,
        Transform::identity(),
    );
    match (shader, PathBuilder::from_circle(cx, cy, radius.max(1.0))) {
        (Some(shader), Some(path)) => canvas.fill_path_with(&path, shader),
        _ => canvas.fill_circle(cx, cy, radius, rgba(p.palette.primary, 1.0)),
    }
}

/// Eight orbiting note dots sized by spread-out spectrum samples.
fn notes(canvas: &mut Canvas, p: &DrawParams, threshold: f32, max_size: f32, halo: bool) {
    let (cx, cy) = (p.width / 2.0, p.height / 2.0);
    let orbit = p.min_dim() * 0.25;
    let count = 8;
    for i in 0..count {
        let angle = i as f32 / count as f32 * std::f32::consts::TAU + p.frame_index as f32 * 0.02;
        let intensity = p.amplitude_along(i as f32 / count as f32, 1.0);
        if intensity <= threshold {
            continue;
        }
        let size = intensity * max_size;
        let (x, y) = (cx + angle.cos() * orbit, cy + angle.sin() * orbit);
        if halo {
            canvas.stroke_circle(x, y, size * 2.0, 2.0, rgba(p.palette.secondary, intensity * 0.4));
        }
        canvas.fill_circle(x, y, size * 1.3, rgba(p.palette.secondary, intensity * 0.2));
        canvas.fill_circle(x, y, size, rgba(p.palette.secondary, intensity * 0.8));
    }
}

/// A pulsing star: ripples, orbiting notes, swirling tendrils and a hot core.
pub struct StellarCore;

impl Renderer for StellarCore {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let (bass, intensity) = overall(p);
        let (cx, cy) = (p.width / 2.0, p.height / 2.0);
        let frame = p.frame_index as f32;

        canvas.save();
        ripples(canvas, p, 4, 20, p.min_dim() * 0.5, intensity, capped(p.min_dim(), 0.006, 6.0));
        notes(canvas, p, 0.12, capped(p.min_dim(), 0.023, 25.0), true);

        let spikes = 90;
        let base = p.min_dim() * 0.12;
        let max_spike = capped(p.min_dim(), 0.11, 120.0);
        let swirl_cap = capped(p.min_dim(), 0.0075, 8.0);
        for i in 0..spikes {
            let amp = p.amplitude_along(i as f32 / spikes as f32, 0.5);
            let h = amp.powf(1.5) * max_spike;
            if h < 2.0 {
                continue;
            }
            let angle = i as f32 / spikes as f32 * std::f32::consts::TAU;
            let (sin, cos) = angle.sin_cos();
            let wobble = (frame * 0.03 + i as f32 * 0.05).sin();
            let swirl = h / 15.0 + wobble * swirl_cap;
            let control_r = base + h / 2.0;

            let mut pb = PathBuilder::new();
            pb.move_to(cx + cos * base, cy + sin * base);
            pb.quad_to(
                cx + cos * control_r,
                cy + sin * control_r + wobble * swirl,
                cx + cos * (base + h),
                cy + sin * (base + h),
            );
            let Some(path) = pb.finish() else {
                continue;
            };
            if p.stroke {
                canvas.stroke_path(&path, 4.0, rgba(STROKE_COLOR, 0.6));
            }
            canvas.stroke_path(&path, 3.0, rgba(p.palette.primary, 1.0));
        }

        let core_radius = p.min_dim() * 0.05 + bass * capped(p.min_dim(), 0.037, 40.0);
        core(canvas, p, core_radius);

        if p.flags.beat && noise(p.frame_index, 7) > 0.6 {
            for r in 0..3u64 {
                let age = ((p.frame_index + r * 15) % 60) as f32 / 60.0;
                let opacity = (1.0 - age) * 0.6;
                if opacity > 0.08 {
                    let radius = core_radius + age * capped(p.min_dim(), 0.028, 30.0);
                    canvas.stroke_circle(cx, cy, radius, 3.0, rgba(p.palette.accent, opacity));
                }
            }
        }
        canvas.restore();
    }
}

/// Concentric ripples spreading from a glowing drop.
pub struct WaterRipple;

impl Renderer for WaterRipple {
    fn draw(&self, canvas: &mut Canvas, p: &DrawParams) {
        let (bass, intensity) = overall(p);
        let (cx, cy) = (p.width / 2.0, p.height / 2.0);
        let max_radius = p.min_dim() * 0.45;

        canvas.save();
        ripples(canvas, p, 5, 15, max_radius, intensity.max(0.15), capped(p.min_dim(), 0.004, 4.0));

        if p.flags.beat {
            let age = (p.frame_index % 100) as f32 / 100.0;
            let radius = age * max_radius;
            let opacity = (1.0 - age) * 0.9;
            let wobble = capped(p.min_dim(), 0.0075, 8.0);
            for wave in 0..12 {
                let angle = wave as f32 / 12.0 * std::f32::consts::TAU;
                let r = radius + (p.frame_index as f32 * 0.15 + wave as f32).sin() * wobble;
                canvas.fill_circle(
                    cx + angle.cos() * r,
                    cy + angle.sin() * r,
                    capped(p.min_dim(), 0.003, 3.0).max(1.0),
                    rgba(p.palette.accent, opacity),
                );
            }
        }

        core(canvas, p, p.min_dim() * 0.08 + bass * capped(p.min_dim(), 0.037, 40.0));
        notes(canvas, p, 0.1, capped(p.min_dim(), 0.019, 20.0), false);
        canvas.restore();
    }
}
