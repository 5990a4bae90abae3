use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};
use tiny_skia::{PathBuilder, Rect};

use crate::effects::{noise, rgba};
use crate::render::palette::hsl_to_rgb;
use crate::render::Canvas;

/// Shortest star lifetime in frames; each star lives one to four of these.
const STAR_LIFE: u64 = 100;
/// Falling particles wrap this far outside the frame.
const MARGIN: f32 = 20.0;
const BOLT_SEGMENTS: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    #[default]
    Snow,
    Particles,
    Stars,
    Rain,
    CherryBlossom,
    Lightning,
}

impl std::str::FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "snow" => Ok(Self::Snow),
            "particles" => Ok(Self::Particles),
            "stars" => Ok(Self::Stars),
            "rain" => Ok(Self::Rain),
            "cherry-blossom" | "sakura" => Ok(Self::CherryBlossom),
            "lightning" => Ok(Self::Lightning),
            other => Err(format!("unknown filter effect '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    pub kind: FilterKind,
    /// Particle density, 0..=1.
    pub intensity: f32,
    pub opacity: f32,
    /// Fall speed multiplier, 0.5..=2.
    pub speed: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: FilterKind::Snow,
            intensity: 0.5,
            opacity: 0.6,
            speed: 1.0,
        }
    }
}

impl FilterConfig {
    /// 150 particles at full intensity on a 1080p frame, scaled with the
    /// larger of the two resolution ratios.
    pub fn particle_count(&self, w: f32, h: f32) -> usize {
        let scale = (w / 1920.0).max(h / 1080.0) * 1.5;
        (self.intensity.clamp(0.0, 1.0) * 150.0 * scale).floor() as usize
    }

    fn speed(&self) -> f32 {
        self.speed.clamp(0.5, 2.0)
    }
}

/// Where one particle is, and how it looks, on a given frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub alpha: f32,
    /// Radians.
    pub rotation: f32,
    pub color: [u8; 3],
}

/// Full-screen weather drawn over the visualizations. Every particle is a
/// function of its slot and the frame index only.
pub struct FilterLayer {
    config: FilterConfig,
}

impl FilterLayer {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled && self.config.opacity > 0.0
    }

    pub fn particle(&self, slot: u64, frame: u64, w: f32, h: f32) -> Particle {
        match self.config.kind {
            FilterKind::Stars => self.star(slot, frame, w, h),
            _ => self.falling(slot, frame, w, h),
        }
    }

    fn falling(&self, slot: u64, frame: u64, w: f32, h: f32) -> Particle {
        let r = |salt: u64| noise(slot, salt);
        let res = (w / 1920.0).max(h / 1080.0) * 2.0;
        let speed = self.config.speed();
        let base = 0.5 + speed * 1.5;
        let size = (6.0 + r(1) * 12.0) * res;
        let t = frame as f32;

        let (vx, vy, size, alpha, spin, color) = match self.config.kind {
            FilterKind::Particles => (
                (r(2) - 0.5) * 0.8,
                base * 0.5 + r(3) * base * 0.7,
                size * 1.2,
                0.7 + r(4) * 0.3,
                (r(5) - 0.5) * 0.03,
                hsl_to_rgb(r(6) * 360.0, 0.9, 0.6 + r(7) * 0.25),
            ),
            FilterKind::Rain => (
                (r(2) - 0.5) * 0.2,
                base * 2.0 + r(3) * base,
                (1.0 + r(1) * 2.0) * res.max(0.5),
                0.2 + r(4) * 0.3,
                0.0,
                [255, 255, 255],
            ),
            FilterKind::CherryBlossom => (
                (r(2) - 0.5) * 0.8,
                base * 0.6 + r(3) * base * 0.4,
                size * 1.2,
                0.4 + r(4) * 0.4,
                (r(5) - 0.5) * 0.03,
                hsl_to_rgb(320.0 + r(6) * 40.0, 0.6, 0.7 + r(7) * 0.2),
            ),
            _ => (
                (r(2) - 0.5) * 0.5,
                base + r(3) * base,
                size,
                0.3 + r(4) * 0.4,
                (r(5) - 0.5) * 0.02,
                [255, 255, 255],
            ),
        };

        let (span_x, span_y) = (w + 2.0 * MARGIN, h + 2.0 * MARGIN);
        let sway = (t * 0.017 + r(8) * TAU).sin() * 9.0 * res;
        Particle {
            x: (r(10) * span_x + vx * speed * t + sway).rem_euclid(span_x) - MARGIN,
            y: (r(9) * span_y + vy * speed * t).rem_euclid(span_y) - MARGIN,
            size,
            alpha,
            rotation: r(11) * TAU + spin * t,
            color,
        }
    }

    /// Stars hold still for their lifetime, twinkle, then reappear elsewhere.
    fn star(&self, slot: u64, frame: u64, w: f32, h: f32) -> Particle {
        let res = (w / 1920.0).max(h / 1080.0) * 2.0;
        let life = STAR_LIFE * (1 + (noise(slot, 2) * 3.0) as u64);
        let offset = (noise(slot, 3) * life as f32) as u64;
        let cycle = (frame + offset) / life;
        let cell = |salt: u64| noise(slot.wrapping_mul(7919).wrapping_add(cycle), salt);
        let (x, y) = (cell(4) * w, cell(5) * h);
        let twinkle = (frame as f32 * 0.17 + x + y).sin() * 0.5 + 0.5;
        Particle {
            x,
            y,
            size: (3.0 + cell(6) * 6.0) * res,
            alpha: (0.3 + cell(7) * 0.7) * (0.3 + twinkle * 0.7),
            rotation: 0.0,
            color: [255, 255, 255],
        }
    }

    /// Zigzag bolts from top to bottom, struck on some beats.
    pub fn bolts(&self, frame: u64, beat: bool, w: f32, h: f32) -> Vec<Vec<(f32, f32)>> {
        if !beat || noise(frame, 40) <= 0.6 {
            return Vec::new();
        }
        let reach = (w / 1920.0).max(0.25);
        let count = 1 + (noise(frame, 41) * 3.0) as u64;
        (0..count)
            .map(|b| {
                let start_x = noise(frame, 50 + b) * w;
                let end_x = start_x + (noise(frame, 60 + b) - 0.5) * 200.0 * reach;
                let mut points = vec![(start_x, 0.0)];
                for j in 1..=BOLT_SEGMENTS {
                    let progress = j as f32 / BOLT_SEGMENTS as f32;
                    let jitter = (noise(frame, 100 + b * 16 + j as u64) - 0.5) * 40.0 * reach;
                    points.push((start_x + (end_x - start_x) * progress + jitter, h * progress));
                }
                points
            })
            .collect()
    }

    pub fn draw(&self, canvas: &mut Canvas, frame_index: u64, beat: bool) {
        if !self.enabled() {
            return;
        }
        let (w, h) = (canvas.width(), canvas.height());
        canvas.save();
        canvas.set_alpha(self.config.opacity.clamp(0.0, 1.0));
        if self.config.kind == FilterKind::Lightning {
            self.draw_lightning(canvas, frame_index, beat);
        } else {
            for slot in 0..self.config.particle_count(w, h) as u64 {
                let p = self.particle(slot, frame_index, w, h);
                draw_particle(canvas, self.config.kind, &p);
            }
        }
        canvas.restore();
    }

    fn draw_lightning(&self, canvas: &mut Canvas, frame_index: u64, beat: bool) {
        let (w, h) = (canvas.width(), canvas.height());
        let bolts = self.bolts(frame_index, beat, w, h);
        if bolts.is_empty() {
            return;
        }
        canvas.fill_rect(0.0, 0.0, w, h, rgba([255, 255, 255], 0.15 * self.config.intensity.clamp(0.0, 1.0)));
        for points in bolts {
            let mut pb = PathBuilder::new();
            pb.move_to(points[0].0, points[0].1);
            for &(x, y) in &points[1..] {
                pb.line_to(x, y);
            }
            if let Some(path) = pb.finish() {
                canvas.stroke_path(&path, 9.0, rgba([0, 255, 255], 0.35));
                canvas.stroke_path(&path, 3.0, rgba([255, 255, 255], 1.0));
            }
        }
    }
}

fn draw_particle(canvas: &mut Canvas, kind: FilterKind, p: &Particle) {
    let Particle { x, y, size, alpha, rotation, color } = *p;
    match kind {
        FilterKind::Snow => {
            let mut pb = PathBuilder::new();
            for i in 0..6 {
                let angle = rotation + PI / 3.0 * i as f32;
                let (px, py) = (x + angle.cos() * size, y + angle.sin() * size);
                if i == 0 {
                    pb.move_to(px, py);
                } else {
                    pb.line_to(px, py);
                }
            }
            pb.close();
            if let Some(path) = pb.finish() {
                canvas.fill_path(&path, rgba(color, alpha));
            }
        }
        FilterKind::Particles => {
            canvas.fill_circle(x, y, size * 3.0, rgba(color, alpha * 0.25));
            canvas.fill_circle(x, y, size, rgba(color, alpha));
        }
        FilterKind::Stars => {
            canvas.fill_circle(x, y, size * 2.0, rgba(color, alpha * 0.2));
            let arm = size * 1.5;
            let width = (size * 0.2).max(1.0);
            canvas.line(x - arm, y, x + arm, y, width, rgba(color, alpha * 0.8));
            canvas.line(x, y - arm, x, y + arm, width, rgba(color, alpha * 0.8));
            canvas.fill_circle(x, y, size, rgba(color, alpha));
        }
        FilterKind::Rain => {
            canvas.line(x, y - size * 3.0, x, y + size * 3.0, size, rgba(color, alpha));
        }
        FilterKind::CherryBlossom => {
            let Some(oval) = Rect::from_xywh(-size, -size * 0.6, size * 2.0, size * 1.2) else {
                return;
            };
            let Some(path) = PathBuilder::from_oval(oval) else {
                return;
            };
            canvas.save();
            canvas.translate(x, y);
            canvas.rotate(rotation.to_degrees());
            canvas.fill_path(&path, rgba(color, alpha));
            canvas.restore();
        }
        FilterKind::Lightning => {}
    }
}
