use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use tiny_skia::{Pixmap, PathBuilder};

use crate::effects::{noise, rgba};
use crate::render::Canvas;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionType {
    TvStatic,
    Fade,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
    ZoomIn,
    ZoomOut,
    Spiral,
    Wave,
    Diamond,
    Circle,
    Blinds,
    Checkerboard,
    RandomPixels,
}

impl TransitionType {
    pub const ALL: [TransitionType; 15] = [
        Self::TvStatic,
        Self::Fade,
        Self::SlideLeft,
        Self::SlideRight,
        Self::SlideUp,
        Self::SlideDown,
        Self::ZoomIn,
        Self::ZoomOut,
        Self::Spiral,
        Self::Wave,
        Self::Diamond,
        Self::Circle,
        Self::Blinds,
        Self::Checkerboard,
        Self::RandomPixels,
    ];

    /// Seconds from start to finish.
    pub fn duration(self) -> f64 {
        match self {
            Self::TvStatic | Self::Fade | Self::Blinds => 0.8,
            Self::SlideLeft | Self::SlideRight | Self::SlideUp | Self::SlideDown => 0.6,
            Self::ZoomIn | Self::ZoomOut => 0.7,
            Self::Spiral => 1.2,
            Self::Wave => 0.9,
            Self::Diamond | Self::Circle => 0.65,
            Self::Checkerboard => 0.75,
            Self::RandomPixels => 1.0,
        }
    }

    /// Map linear progress 0..=1 onto the curve this transition plays with.
    /// Fade and wave rise and fall back (a sine hump); TV static oscillates.
    pub fn ease(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Fade | Self::Wave => (t * PI).sin(),
            Self::SlideLeft | Self::SlideRight | Self::SlideUp | Self::SlideDown => {
                1.0 - (1.0 - t).powi(3)
            }
            Self::ZoomIn | Self::ZoomOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Self::Spiral => t + (t * PI * 4.0).sin() * 0.1,
            Self::Diamond | Self::Circle => 1.0 - (1.0 - t).powi(2),
            Self::Blinds | Self::Checkerboard | Self::RandomPixels => t,
            Self::TvStatic => (t * PI * 6.0).sin() * 0.5 + 0.5,
        }
    }

    /// Draw the covering mask for eased `progress` over the whole canvas.
    pub fn draw(self, canvas: &mut Canvas, progress: f32, frame_index: u64) {
        let (w, h) = (canvas.width(), canvas.height());
        let black = rgba([0, 0, 0], 1.0);
        let (cx, cy) = (w / 2.0, h / 2.0);
        let diagonal = (cx * cx + cy * cy).sqrt();

        canvas.save();
        match self {
            Self::TvStatic => tv_static(canvas, progress, frame_index),
            Self::Fade => {
                canvas.set_alpha(progress.clamp(0.0, 1.0));
                canvas.fill_rect(0.0, 0.0, w, h, black);
            }
            Self::SlideLeft => canvas.fill_rect(0.0, 0.0, w * progress, h, black),
            Self::SlideRight => canvas.fill_rect(w - w * progress, 0.0, w * progress, h, black),
            Self::SlideUp => canvas.fill_rect(0.0, 0.0, w, h * progress, black),
            Self::SlideDown => canvas.fill_rect(0.0, h - h * progress, w, h * progress, black),
            Self::ZoomIn => canvas.fill_circle(cx, cy, diagonal * progress, black),
            Self::ZoomOut => canvas.fill_circle(cx, cy, diagonal * (1.0 - progress), black),
            Self::Spiral => {
                let turns = PI * 8.0;
                let max_angle = progress.max(0.0) * turns;
                let mut pb = PathBuilder::new();
                pb.move_to(cx, cy);
                let mut angle = 0.0;
                while angle < max_angle {
                    let r = angle / turns * diagonal * progress;
                    pb.line_to(cx + angle.cos() * r, cy + angle.sin() * r);
                    angle += 0.1;
                }
                if let Some(path) = pb.finish() {
                    canvas.stroke_path(&path, 20.0, black);
                }
            }
            Self::Wave => {
                let mut pb = PathBuilder::new();
                pb.move_to(0.0, h);
                let mut x = 0.0;
                while x <= w {
                    let crest = h * (1.0 - progress);
                    let offset = ((x / w) * PI * 4.0 + progress * PI * 2.0).sin() * 50.0 * progress;
                    pb.line_to(x, crest + offset);
                    x += 5.0;
                }
                pb.line_to(w, h);
                pb.close();
                if let Some(path) = pb.finish() {
                    canvas.fill_path(&path, black);
                }
            }
            Self::Diamond => {
                let size = w.min(h) * progress;
                let mut pb = PathBuilder::new();
                pb.move_to(cx, cy - size);
                pb.line_to(cx + size, cy);
                pb.line_to(cx, cy + size);
                pb.line_to(cx - size, cy);
                pb.close();
                if let Some(path) = pb.finish() {
                    canvas.fill_path(&path, black);
                }
            }
            Self::Circle => canvas.fill_circle(cx, cy, w.min(h) / 2.0 * progress, black),
            Self::Blinds => {
                let count = 20;
                let blind_h = h / count as f32;
                for i in 0..count {
                    let p = (progress - i as f32 / count as f32 * 0.5).max(0.0);
                    if p > 0.0 {
                        canvas.fill_rect(0.0, i as f32 * blind_h, w, blind_h * p, black);
                    }
                }
            }
            Self::Checkerboard => {
                let tile = 50.0;
                let tiles_x = (w / tile).ceil() as usize;
                let tiles_y = (h / tile).ceil() as usize;
                for x in 0..tiles_x {
                    for y in 0..tiles_y {
                        let p = (progress - (x + y) as f32 / (tiles_x + tiles_y) as f32 * 0.8).max(0.0);
                        if (x + y) % 2 == 0 && p > 0.0 {
                            canvas.fill_rect(x as f32 * tile, y as f32 * tile, tile, tile, rgba([0, 0, 0], p.min(1.0)));
                        }
                    }
                }
            }
            Self::RandomPixels => {
                let count = (w * h * progress.max(0.0) * 0.1) as u64;
                for i in 0..count {
                    let x = noise(frame_index, i * 2) * w;
                    let y = noise(frame_index, i * 2 + 1) * h;
                    canvas.fill_rect(x, y, 2.0, 2.0, black);
                }
            }
        }
        canvas.restore();
    }
}

impl std::str::FromStr for TransitionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| format!("{:?}", t).to_ascii_lowercase() == key)
            .ok_or_else(|| format!("unknown transition '{}'", s))
    }
}

/// Full-frame monochrome noise, rendered at quarter resolution and scaled up.
fn tv_static(canvas: &mut Canvas, progress: f32, frame_index: u64) {
    let (w, h) = (canvas.width(), canvas.height());
    let intensity = (progress * PI * 4.0).sin() * 0.5 + 0.5;
    let alpha = (progress * PI).sin() * 0.8 + 0.2;
    let (nw, nh) = (((w / 4.0) as u32).max(1), ((h / 4.0) as u32).max(1));
    let Some(mut grain) = Pixmap::new(nw, nh) else {
        return;
    };
    for (i, px) in grain.data_mut().chunks_exact_mut(4).enumerate() {
        let n = (noise(frame_index, i as u64) * 255.0) as u8;
        let v = if intensity > 0.5 { n } else { 255 - n };
        px.copy_from_slice(&[v, v, v, 255]);
    }
    canvas.save();
    canvas.set_alpha(alpha);
    canvas.draw_image(&grain, 0.0, 0.0, w, h);
    canvas.restore();

    if intensity > 0.3 {
        let line = rgba([255, 255, 255], 0.8 * intensity * 0.3);
        let mut y = 0.0;
        let mut salt = 1 << 32;
        while y < h {
            if noise(frame_index, salt) < intensity {
                canvas.line(0.0, y, w, y, 2.0, line);
            }
            y += 20.0;
            salt += 1;
        }
        let mut x = 0.0;
        while x < w {
            if noise(frame_index, salt) < intensity * 0.5 {
                canvas.line(x, 0.0, x, h, 2.0, line);
            }
            x += 30.0;
            salt += 1;
        }
    }
}

/// A transition playing from a start time on the output clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveTransition {
    pub kind: TransitionType,
    pub started_at: f64,
}

impl ActiveTransition {
    pub fn new(kind: TransitionType, started_at: f64) -> Self {
        Self { kind, started_at }
    }

    /// Linear progress at `now`, `None` once finished.
    pub fn progress(&self, now: f64) -> Option<f32> {
        let elapsed = (now - self.started_at).max(0.0);
        let duration = self.kind.duration();
        (elapsed < duration).then(|| (elapsed / duration) as f32)
    }

    pub fn finished(&self, now: f64) -> bool {
        self.progress(now).is_none()
    }

    /// Draw the eased frame for `now`; returns false once the transition is over.
    pub fn draw(&self, canvas: &mut Canvas, now: f64, frame_index: u64) -> bool {
        match self.progress(now) {
            Some(t) => {
                self.kind.draw(canvas, self.kind.ease(t), frame_index);
                true
            }
            None => false,
        }
    }
}
