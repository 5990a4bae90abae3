use serde::{Deserialize, Serialize};

use super::{draw_styled, rgb_or_white, Anchor, OverlayContext, TextStyle};
use crate::audio::features::bass_level;
use crate::effects::GraphicEffect;
use crate::render::{Canvas, TextRenderer};

pub const MAX_TEXT_SLOTS: usize = 3;
const OFFSET_LIMIT: f32 = 50.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOverlayConfig {
    pub enabled: bool,
    pub text: String,
    pub color: String,
    pub stroke_color: String,
    pub effect: GraphicEffect,
    /// Font size as a percentage of the frame width.
    pub size_vw: f32,
    /// Percent of width, added to the anchor point.
    pub offset_x: f32,
    /// Percent of height, added to the anchor point.
    pub offset_y: f32,
    pub rotation: f32,
    pub anchor: Anchor,
}

impl Default for TextOverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            text: String::new(),
            color: "#ffffff".into(),
            stroke_color: "#000000".into(),
            effect: GraphicEffect::None,
            size_vw: 4.0,
            offset_x: 0.0,
            offset_y: 0.0,
            rotation: 0.0,
            anchor: Anchor::BottomRight,
        }
    }
}

impl TextOverlayConfig {
    /// Anchor point plus offsets, in pixels.
    pub fn position(&self, w: f32, h: f32) -> (f32, f32) {
        let (x, y, _) = self.anchor.resolve(w, h);
        let ox = self.offset_x.clamp(-OFFSET_LIMIT, OFFSET_LIMIT);
        let oy = self.offset_y.clamp(-OFFSET_LIMIT, OFFSET_LIMIT);
        (x + w * ox / 100.0, y + h * oy / 100.0)
    }

    /// Base size grown by up to 5% with the bass.
    pub fn font_size(&self, w: f32, bass: f32) -> f32 {
        let base = w * self.size_vw / 100.0;
        base + bass.clamp(0.0, 1.0) * base * 0.05
    }
}

/// Up to three independent custom text slots.
pub struct TextOverlay {
    slots: Vec<TextOverlayConfig>,
}

impl TextOverlay {
    /// Slots beyond the third are ignored.
    pub fn new(mut slots: Vec<TextOverlayConfig>) -> Self {
        if slots.len() > MAX_TEXT_SLOTS {
            log::warn!("Only {} text overlays are supported, ignoring {}", MAX_TEXT_SLOTS, slots.len() - MAX_TEXT_SLOTS);
            slots.truncate(MAX_TEXT_SLOTS);
        }
        Self { slots }
    }

    pub fn slots(&self) -> &[TextOverlayConfig] {
        &self.slots
    }

    pub fn draw(&self, canvas: &mut Canvas, font: &TextRenderer, ctx: &OverlayContext) {
        let (w, h) = (canvas.width(), canvas.height());
        let bass = bass_level(ctx.bins) / 255.0;
        for slot in self.slots.iter().filter(|s| s.enabled && !s.text.is_empty()) {
            let (x, y) = slot.position(w, h);
            let (_, _, align) = slot.anchor.resolve(w, h);
            let style = TextStyle {
                size: slot.font_size(w, bass),
                color: rgb_or_white(&slot.color),
                stroke: rgb_or_white(&slot.stroke_color),
                effect: slot.effect,
                align,
            };
            canvas.save();
            canvas.translate(x, y);
            canvas.rotate(slot.rotation);
            draw_styled(canvas, font, &slot.text, 0.0, 0.0, &style, ctx.beat, ctx.frame_index);
            canvas.restore();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Align;

    #[test]
    fn offsets_are_clamped() {
        let cfg = TextOverlayConfig {
            anchor: Anchor::Center,
            offset_x: 80.0,
            offset_y: -10.0,
            ..Default::default()
        };
        assert_eq!(cfg.position(1000.0, 500.0), (1000.0, 200.0));
    }

    #[test]
    fn bass_pulses_size_by_five_percent() {
        let cfg = TextOverlayConfig {
            size_vw: 10.0,
            ..Default::default()
        };
        assert_eq!(cfg.font_size(1000.0, 0.0), 100.0);
        assert_eq!(cfg.font_size(1000.0, 1.0), 105.0);
    }

    #[test]
    fn anchors_resolve_to_nine_points() {
        let (w, h) = (1000.0, 500.0);
        let (px, py) = (25.0, 25.0);
        let cases = [
            (Anchor::TopLeft, px, py, Align::Left),
            (Anchor::TopCenter, 500.0, py, Align::Center),
            (Anchor::TopRight, w - px, py, Align::Right),
            (Anchor::CenterLeft, px, 250.0, Align::Left),
            (Anchor::Center, 500.0, 250.0, Align::Center),
            (Anchor::CenterRight, w - px, 250.0, Align::Right),
            (Anchor::BottomLeft, px, h - py, Align::Left),
            (Anchor::BottomCenter, 500.0, h - py, Align::Center),
            (Anchor::BottomRight, w - px, h - py, Align::Right),
        ];
        for (anchor, x, y, align) in cases {
            assert_eq!(anchor.resolve(w, h), (x, y, align), "{:?}", anchor);
        }
    }

    #[test]
    fn offsets_add_to_every_anchor() {
        let cfg = TextOverlayConfig {
            anchor: Anchor::TopRight,
            offset_x: -10.0,
            offset_y: 20.0,
            ..Default::default()
        };
        assert_eq!(cfg.position(1000.0, 500.0), (875.0, 125.0));
    }

    #[test]
    fn extra_slots_are_dropped() {
        let overlay = TextOverlay::new(vec![TextOverlayConfig::default(); 5]);
        assert_eq!(overlay.slots().len(), MAX_TEXT_SLOTS);
    }
}
