use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};
use std::path::{Path, PathBuf};
use tiny_skia::{Path as SkPath, PathBuilder};

use super::{draw_styled, OverlayContext, TextStyle};
use crate::effects::{noise, rgba, GraphicEffect};
use crate::media::VideoReader;
use crate::render::canvas::{cover_rect, rounded_rect_path};
use crate::render::{Align, Canvas, TextRenderer};

/// Seconds of the ink-blot wipe at the end of the CTA.
const INK_BLOT_SECS: f64 = 1.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CtaConfig {
    pub enabled: bool,
    pub channel_name: String,
    /// Substitute clip shown instead of the card when `replace_animation` is set.
    pub video: Option<PathBuf>,
    pub replace_animation: bool,
    pub start_secs: f64,
    pub duration_secs: f64,
    /// Center, percent of width.
    pub position_x: f32,
    /// Center, percent of height.
    pub position_y: f32,
    pub ink_blot: bool,
    /// Gain of the clip's audio in the recording.
    pub audio_gain: f32,
}

impl Default for CtaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_name: String::new(),
            video: None,
            replace_animation: false,
            start_secs: 0.0,
            duration_secs: 10.0,
            position_x: 50.0,
            position_y: 80.0,
            ink_blot: true,
            audio_gain: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CtaMode {
    Card,
    Video,
}

impl CtaConfig {
    /// The card and the substitute video are mutually exclusive.
    pub fn mode(&self) -> Option<CtaMode> {
        if !self.enabled {
            return None;
        }
        match (self.replace_animation, &self.video) {
            (true, Some(_)) => Some(CtaMode::Video),
            _ if !self.channel_name.is_empty() => Some(CtaMode::Card),
            _ => None,
        }
    }

    /// Linear progress through the CTA window at item time `t`.
    pub fn progress(&self, t: f64) -> Option<f64> {
        if self.duration_secs <= 0.0 {
            return None;
        }
        let p = (t - self.start_secs) / self.duration_secs;
        (0.0..1.0).contains(&p).then_some(p)
    }

    /// Progress 0..=1 of the closing ink-blot wipe, if it is playing.
    pub fn ink_progress(&self, t: f64) -> Option<f32> {
        if !self.ink_blot {
            return None;
        }
        let end = self.start_secs + self.duration_secs;
        let wipe = INK_BLOT_SECS.min(self.duration_secs);
        let since = t - (end - wipe);
        (since >= 0.0 && t < end).then(|| (since / wipe) as f32)
    }
}

/// Card opacity: 10% fade at each end of the window.
pub fn card_alpha(progress: f64) -> f32 {
    let a = if progress < 0.1 {
        progress * 10.0
    } else if progress > 0.9 {
        (1.0 - progress) * 10.0
    } else {
        1.0
    };
    a.clamp(0.0, 1.0) as f32
}

/// Irregular closed blob shrinking from `radius` to nothing as `progress` goes 0..1.
pub fn ink_blot_path(cx: f32, cy: f32, radius: f32, progress: f32, seed: u64) -> Option<SkPath> {
    let r = radius * (1.0 - progress.clamp(0.0, 1.0));
    if r <= 0.5 {
        return None;
    }
    let points = 48;
    let mut pb = PathBuilder::new();
    for i in 0..points {
        let a = i as f32 / points as f32 * TAU;
        let wobble = 1.0 + 0.18 * (a * 5.0 + progress * PI * 2.0).sin() + 0.1 * (noise(seed, i) - 0.5);
        let (x, y) = (cx + a.cos() * r * wobble, cy + a.sin() * r * wobble);
        if i == 0 {
            pb.move_to(x, y);
        } else {
            pb.line_to(x, y);
        }
    }
    pb.close();
    pb.finish()
}

/// Call-to-action overlay: an animated subscribe card or a substitute clip.
pub struct CtaOverlay {
    config: CtaConfig,
    video: Option<VideoReader>,
    fps: u32,
}

impl CtaOverlay {
    pub fn new(config: CtaConfig, fps: u32) -> Self {
        Self {
            config,
            video: None,
            fps,
        }
    }

    pub fn config(&self) -> &CtaConfig {
        &self.config
    }

    /// Replace the substitute clip, e.g. with the next batch item's.
    pub fn set_video(&mut self, video: Option<PathBuf>) {
        if self.config.video != video {
            self.video = None;
            self.config.video = video;
        }
    }

    pub fn video_path(&self) -> Option<&Path> {
        self.config.video.as_deref()
    }

    /// Close any open clip reader.
    pub fn release(&mut self) {
        self.video = None;
    }

    pub fn draw(&mut self, canvas: &mut Canvas, font: &TextRenderer, ctx: &OverlayContext) {
        let Some(mode) = self.config.mode() else {
            return;
        };
        let Some(progress) = self.config.progress(ctx.time) else {
            if mode == CtaMode::Video {
                self.release();
            }
            return;
        };
        let (w, h) = (canvas.width(), canvas.height());
        let (cx, cy) = (w * self.config.position_x / 100.0, h * self.config.position_y / 100.0);
        let Ok(mut layer) = Canvas::new(w as u32, h as u32) else {
            return;
        };

        let extent = match mode {
            CtaMode::Card => self.draw_card(&mut layer, font, cx, cy, progress, ctx),
            CtaMode::Video => self.draw_video(&mut layer, cx, cy),
        };

        let ink = self
            .config
            .ink_progress(ctx.time)
            .and_then(|p| ink_blot_path(cx, cy, extent, p, ctx.frame_index / 4));
        match ink {
            Some(blot) => canvas.draw_image_clipped(layer.pixmap(), 0.0, 0.0, w, h, &blot),
            None if self.config.ink_progress(ctx.time).is_some() => {}
            None => canvas.draw_image(layer.pixmap(), 0.0, 0.0, w, h),
        }
    }

    /// Returns the radius that encloses what was drawn.
    fn draw_card(&self, layer: &mut Canvas, font: &TextRenderer, cx: f32, cy: f32, progress: f64, ctx: &OverlayContext) -> f32 {
        let w = layer.width();
        let (card_w, card_h) = ((w * 0.27).min(520.0), (w * 0.073).min(140.0));
        let elapsed = progress * self.config.duration_secs;
        let flash = (elapsed / 6.0).min(1.0) as f32;
        let pulse = 1.0 + (flash * PI * 4.0).sin() * 0.2;

        layer.set_alpha(card_alpha(progress));
        layer.fill_circle(cx, cy, card_w / 2.0 + 30.0, rgba([255, 0, 0], 0.06));
        if let Some(card) = rounded_rect_path(cx - card_w / 2.0, cy - card_h / 2.0, card_w, card_h, card_h * 0.18) {
            layer.fill_path(&card, rgba([10, 10, 10], 0.45));
            layer.stroke_path(&card, 3.0, rgba([255, 255, 255], 0.7));
        }

        let button_x = cx - card_w * 0.31;
        let button_r = card_h * 0.32;
        layer.save();
        layer.translate(button_x, cy);
        layer.scale(pulse, pulse);
        layer.fill_circle(0.0, 0.0, button_r, rgba([255, 0, 0], 1.0));
        let mut play = PathBuilder::new();
        play.move_to(-button_r * 0.3, -button_r * 0.4);
        play.line_to(button_r * 0.45, 0.0);
        play.line_to(-button_r * 0.3, button_r * 0.4);
        play.close();
        if let Some(tri) = play.finish() {
            layer.fill_path(&tri, rgba([255, 255, 255], 1.0));
        }
        layer.restore();

        let text_x = button_x + button_r * 1.6;
        let name = TextStyle {
            size: card_h * 0.26,
            color: [255, 255, 255],
            stroke: [0, 0, 0],
            effect: GraphicEffect::Bold,
            align: Align::Left,
        };
        draw_styled(layer, font, &self.config.channel_name, text_x, cy - card_h * 0.14, &name, false, ctx.frame_index);
        let hint = TextStyle {
            size: card_h * 0.2,
            color: [255, 80, 80],
            effect: GraphicEffect::None,
            ..name
        };
        draw_styled(layer, font, "Subscribe", text_x, cy + card_h * 0.2, &hint, false, ctx.frame_index);

        (card_w * card_w + card_h * card_h).sqrt() / 2.0 + 30.0
    }

    fn draw_video(&mut self, layer: &mut Canvas, cx: f32, cy: f32) -> f32 {
        let (w, h) = (layer.width(), layer.height());
        let (box_w, box_h) = (w * 0.35, h * 0.35);
        if self.video.is_none() {
            if let Some(path) = self.config.video.clone() {
                match VideoReader::open(&path, box_w as u32, box_h as u32, self.fps, false) {
                    Ok(reader) => self.video = Some(reader),
                    Err(err) => {
                        log::warn!("CTA video unavailable: {:#}", err);
                        self.config.replace_animation = false;
                    }
                }
            }
        }
        let (x, y) = (cx - box_w / 2.0, cy - box_h / 2.0);
        match self.video.as_mut().and_then(VideoReader::next_frame) {
            Some(frame) => {
                let (fx, fy, fw, fh) = cover_rect(frame.width() as f32, frame.height() as f32, box_w, box_h);
                layer.draw_image(&frame, x + fx, y + fy, fw, fh);
            }
            None => layer.fill_rect(x, y, box_w, box_h, rgba([0, 0, 0], 0.6)),
        }
        (box_w * box_w + box_h * box_h).sqrt() / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_and_video_are_exclusive() {
        let mut cfg = CtaConfig {
            enabled: true,
            channel_name: "chan".into(),
            ..Default::default()
        };
        assert_eq!(cfg.mode(), Some(CtaMode::Card));
        cfg.video = Some("clip.mp4".into());
        assert_eq!(cfg.mode(), Some(CtaMode::Card));
        cfg.replace_animation = true;
        assert_eq!(cfg.mode(), Some(CtaMode::Video));
        cfg.enabled = false;
        assert_eq!(cfg.mode(), None);
    }

    #[test]
    fn window_and_fades() {
        let cfg = CtaConfig::default();
        assert_eq!(cfg.progress(5.0), Some(0.5));
        assert_eq!(cfg.progress(10.0), None);
        assert_eq!(card_alpha(0.05), 0.5);
        assert_eq!(card_alpha(0.5), 1.0);
        assert!((card_alpha(0.95) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn ink_blot_plays_in_the_last_second() {
        let cfg = CtaConfig::default();
        assert_eq!(cfg.ink_progress(8.5), None);
        assert_eq!(cfg.ink_progress(9.5), Some(0.5));
        assert_eq!(cfg.ink_progress(10.0), None);
        let off = CtaConfig {
            ink_blot: false,
            ..Default::default()
        };
        assert_eq!(off.ink_progress(9.5), None);
    }

    #[test]
    fn blot_shrinks_away() {
        assert!(ink_blot_path(50.0, 50.0, 40.0, 0.2, 1).is_some());
        assert!(ink_blot_path(50.0, 50.0, 40.0, 1.0, 1).is_none());
    }
}
