use serde::{Deserialize, Serialize};

use super::{draw_styled, rgb_or_white, OverlayContext, TextStyle};
use crate::effects::GraphicEffect;
use crate::render::{Align, Canvas, TextRenderer};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntroConfig {
    pub enabled: bool,
    pub title: String,
    pub artist: String,
    pub description: String,
    pub color: String,
    pub effect: GraphicEffect,
    pub fade_in: f64,
    pub hold: f64,
    pub fade_out: f64,
    /// Block center, percent of width.
    pub position_x: f32,
    /// Block center, percent of height.
    pub position_y: f32,
}

impl Default for IntroConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            title: String::new(),
            artist: String::new(),
            description: String::new(),
            color: "#ffffff".into(),
            effect: GraphicEffect::Shadow,
            fade_in: 1.0,
            hold: 3.0,
            fade_out: 1.0,
            position_x: 50.0,
            position_y: 45.0,
        }
    }
}

impl IntroConfig {
    pub fn total(&self) -> f64 {
        self.fade_in.max(0.0) + self.hold.max(0.0) + self.fade_out.max(0.0)
    }

    /// Opacity `elapsed` seconds after the intro began.
    pub fn opacity(&self, elapsed: f64) -> f32 {
        let (fi, hold, fo) = (self.fade_in.max(0.0), self.hold.max(0.0), self.fade_out.max(0.0));
        let a = if elapsed < 0.0 || elapsed >= fi + hold + fo {
            0.0
        } else if elapsed < fi {
            elapsed / fi
        } else if elapsed < fi + hold {
            1.0
        } else {
            1.0 - (elapsed - fi - hold) / fo
        };
        a.clamp(0.0, 1.0) as f32
    }
}

/// Title card shown at the start of playback or on demand.
pub struct IntroOverlay {
    config: IntroConfig,
    started_at: Option<f64>,
    auto_fired: bool,
}

impl IntroOverlay {
    pub fn new(config: IntroConfig) -> Self {
        Self {
            config,
            started_at: None,
            auto_fired: false,
        }
    }

    pub fn config(&self) -> &IntroConfig {
        &self.config
    }

    /// Playback or recording began at `time`. Fires the intro the first
    /// time this happens at `t = 0`.
    pub fn on_start(&mut self, time: f64) {
        if self.config.enabled && !self.auto_fired && time.abs() < 1e-6 {
            self.auto_fired = true;
            self.started_at = Some(time);
        }
    }

    /// Explicit preview, replaying from `now` regardless of earlier runs.
    pub fn trigger(&mut self, now: f64) {
        self.started_at = Some(now);
    }

    pub fn opacity(&self, now: f64) -> f32 {
        match self.started_at {
            Some(start) if self.config.enabled => self.config.opacity(now - start),
            _ => 0.0,
        }
    }

    pub fn draw(&self, canvas: &mut Canvas, font: &TextRenderer, now: f64, ctx: &OverlayContext) {
        let alpha = self.opacity(now);
        if alpha <= 0.0 {
            return;
        }
        let (w, h) = (canvas.width(), canvas.height());
        let cx = w * self.config.position_x / 100.0;
        let cy = h * self.config.position_y / 100.0;
        let color = rgb_or_white(&self.config.color);
        let lines = [
            (&self.config.title, w * 0.06),
            (&self.config.artist, w * 0.035),
            (&self.config.description, w * 0.022),
        ];

        canvas.save();
        canvas.set_alpha(alpha);
        let mut y = cy;
        for (text, size) in lines {
            if text.is_empty() {
                continue;
            }
            let style = TextStyle {
                size,
                color,
                stroke: [0, 0, 0],
                effect: self.config.effect,
                align: Align::Center,
            };
            draw_styled(canvas, font, text, cx, y, &style, ctx.beat, ctx.frame_index);
            y += font.line_height(size) * 1.2;
        }
        canvas.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IntroConfig {
        IntroConfig {
            enabled: true,
            title: "Title".into(),
            fade_in: 1.0,
            hold: 2.0,
            fade_out: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn three_phase_curve() {
        let c = config();
        assert_eq!(c.opacity(0.0), 0.0);
        assert_eq!(c.opacity(0.5), 0.5);
        assert_eq!(c.opacity(2.0), 1.0);
        assert_eq!(c.opacity(3.5), 0.5);
        assert_eq!(c.opacity(4.0), 0.0);
        assert_eq!(c.opacity(-1.0), 0.0);
    }

    #[test]
    fn auto_fires_once_from_zero() {
        let mut intro = IntroOverlay::new(config());
        intro.on_start(12.0);
        assert_eq!(intro.opacity(12.5), 0.0);

        intro.on_start(0.0);
        assert_eq!(intro.opacity(2.0), 1.0);

        // A later restart from zero does not replay it.
        intro.on_start(0.0);
        assert_eq!(intro.opacity(10.0), 0.0);
    }

    #[test]
    fn preview_trigger_replays() {
        let mut intro = IntroOverlay::new(config());
        intro.on_start(0.0);
        intro.trigger(20.0);
        assert_eq!(intro.opacity(22.0), 1.0);
    }

    #[test]
    fn disabled_intro_stays_hidden() {
        let mut intro = IntroOverlay::new(IntroConfig::default());
        intro.on_start(0.0);
        intro.trigger(0.0);
        assert_eq!(intro.opacity(2.0), 0.0);
    }
}
