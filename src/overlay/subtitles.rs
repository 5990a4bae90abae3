use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use super::{draw_styled, rgb_or_white, OverlayContext, TextStyle};
use crate::effects::{rgba, GraphicEffect};
use crate::render::canvas::rounded_rect_path;
use crate::render::text::wrap_text;
use crate::render::{Align, Canvas, TextRenderer};
use crate::subtitle::cue::{active_index, latest_started};
use crate::subtitle::SubtitleCue;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubtitleMode {
    None,
    #[default]
    Classic,
    LyricsScroll,
    WordByWord,
    SlidingGroup,
    FadeLines,
    /// The sung line sharpens into focus; its neighbours stay blurred.
    PartialBlur,
}

impl SubtitleMode {
    /// Modes that show one cue at a time and can therefore be set vertically.
    fn single_cue(self) -> bool {
        matches!(self, Self::Classic | Self::WordByWord | Self::FadeLines | Self::PartialBlur)
    }
}

impl std::str::FromStr for SubtitleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "none" => Ok(Self::None),
            "classic" => Ok(Self::Classic),
            "lyrics-scroll" => Ok(Self::LyricsScroll),
            "word-by-word" => Ok(Self::WordByWord),
            "sliding-group" => Ok(Self::SlidingGroup),
            "fade-lines" => Ok(Self::FadeLines),
            "partial-blur" => Ok(Self::PartialBlur),
            other => Err(format!("unknown subtitle mode '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubtitleOrientation {
    #[default]
    Horizontal,
    /// Characters stacked top to bottom, columns running right to left.
    Vertical,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubtitleBgStyle {
    None,
    #[default]
    Translucent,
    Black,
}

impl SubtitleBgStyle {
    fn alpha(self) -> Option<f32> {
        match self {
            Self::None => None,
            Self::Translucent => Some(0.5),
            Self::Black => Some(0.8),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub mode: SubtitleMode,
    pub orientation: SubtitleOrientation,
    /// Font size as a percentage of the frame width.
    pub size_vw: f32,
    pub color: String,
    pub stroke_color: String,
    pub effect: GraphicEffect,
    pub background: SubtitleBgStyle,
    /// Vertical position of the text block, percent of height.
    pub position_y: f32,
    pub max_chars_per_line: usize,
    pub fade_in: f64,
    pub fade_out: f64,
    pub guide_lines: bool,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            mode: SubtitleMode::Classic,
            orientation: SubtitleOrientation::Horizontal,
            size_vw: 3.0,
            color: "#ffffff".into(),
            stroke_color: "#000000".into(),
            effect: GraphicEffect::None,
            background: SubtitleBgStyle::Translucent,
            position_y: 88.0,
            max_chars_per_line: 42,
            fade_in: 0.4,
            fade_out: 0.4,
            guide_lines: false,
        }
    }
}

/// Characters of `cue` revealed at `time`, proportional to the elapsed
/// fraction of its duration.
pub fn revealed_chars(cue: &SubtitleCue, time: f64) -> usize {
    let total = cue.text.chars().count();
    let duration = cue.duration();
    if duration <= 0.0 {
        return total;
    }
    let fraction = ((time - cue.start_time) / duration).clamp(0.0, 1.0);
    ((fraction * total as f64).ceil() as usize).min(total)
}

/// Opacity of a cue under fade-in/fade-out ramps at its boundaries.
pub fn fade_alpha(cue: &SubtitleCue, time: f64, fade_in: f64, fade_out: f64) -> f32 {
    if !cue.contains(time) {
        return 0.0;
    }
    let rise = if fade_in > 0.0 { (time - cue.start_time) / fade_in } else { 1.0 };
    let fall = if fade_out > 0.0 { (cue.end_time - time) / fade_out } else { 1.0 };
    rise.min(fall).clamp(0.0, 1.0) as f32
}

/// How far out of focus a cue is at `time`: 1 before and after it, easing
/// to 0 over the fade ramps.
pub fn blur_amount(cue: &SubtitleCue, time: f64, fade_in: f64, fade_out: f64) -> f32 {
    1.0 - fade_alpha(cue, time, fade_in, fade_out)
}

/// Glyph centers for `text` set vertically: up to `per_column` characters
/// per column, the first column at `right` and later ones `step` further
/// left. A newline starts a new column; spaces leave a gap.
pub fn vertical_layout(text: &str, per_column: usize, right: f32, top: f32, step: f32) -> Vec<(char, f32, f32)> {
    let per_column = per_column.max(1);
    let (mut col, mut row) = (0usize, 0usize);
    let mut glyphs = Vec::new();
    for c in text.chars() {
        if c == '\n' {
            if row > 0 {
                col += 1;
                row = 0;
            }
            continue;
        }
        if row == per_column {
            col += 1;
            row = 0;
        }
        if !c.is_whitespace() {
            glyphs.push((c, right - col as f32 * step, top + row as f32 * step));
        }
        row += 1;
    }
    glyphs
}

/// Lines shown by the scrolling lyric list: `(cue index, offset from the
/// focused line, alpha)`. The list scrolls smoothly over 0.3 s when a new
/// cue starts.
pub fn scroll_window(cues: &[SubtitleCue], time: f64, radius: usize) -> Vec<(usize, f32, f32)> {
    let Some(focus) = latest_started(cues, time) else {
        return cues
            .iter()
            .take(radius + 1)
            .enumerate()
            .map(|(i, _)| (i, i as f32 + 1.0, (1.0 - (i as f32 + 1.0) * 0.25).max(0.15)))
            .collect();
    };
    let since = (time - cues[focus].start_time) as f32;
    let ease = 1.0 - (since / 0.3).clamp(0.0, 1.0);
    let start = focus.saturating_sub(radius);
    let end = (focus + radius + 1).min(cues.len());
    (start..end)
        .map(|i| {
            let offset = i as f32 - focus as f32 + ease;
            let alpha = (1.0 - offset.abs() * 0.25).max(0.15);
            (i, offset, alpha)
        })
        .collect()
}

/// Cues per group in sliding-group mode.
const GROUP_SIZE: usize = 3;

/// Subtitle and lyric drawing for every display mode.
pub struct SubtitleLayer {
    cues: Vec<SubtitleCue>,
    style: SubtitleStyle,
}

impl SubtitleLayer {
    pub fn new(cues: Vec<SubtitleCue>, style: SubtitleStyle) -> Self {
        Self { cues, style }
    }

    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }

    /// Swap in the cues of the next batch item.
    pub fn set_cues(&mut self, cues: Vec<SubtitleCue>) {
        self.cues = cues;
    }

    pub fn style(&self) -> &SubtitleStyle {
        &self.style
    }

    fn text_style(&self, w: f32) -> TextStyle {
        TextStyle {
            size: self.style.size_vw / 100.0 * w,
            color: rgb_or_white(&self.style.color),
            stroke: rgb_or_white(&self.style.stroke_color),
            effect: self.style.effect,
            align: Align::Center,
        }
    }

    fn backdrop(&self, canvas: &mut Canvas, cx: f32, cy: f32, text_w: f32, text_h: f32, size: f32) {
        let Some(alpha) = self.style.background.alpha() else {
            return;
        };
        let (pad_x, pad_y) = (size * 0.4, size * 0.2);
        let (bw, bh) = (text_w + pad_x * 2.0, text_h + pad_y * 2.0);
        if let Some(path) = rounded_rect_path(cx - bw / 2.0, cy - bh / 2.0, bw, bh, 5.0) {
            canvas.fill_path(&path, rgba([0, 0, 0], alpha));
        }
    }

    /// Lines of one cue centered around `cy`, with the backdrop behind them.
    fn block(&self, canvas: &mut Canvas, font: &TextRenderer, text: &str, cy: f32, style: &TextStyle, ctx: &OverlayContext) {
        let lines = wrap_text(text, self.style.max_chars_per_line.max(1));
        let line_h = font.line_height(style.size);
        let widest = lines.iter().map(|l| font.measure(l, style.size)).fold(0.0, f32::max);
        let cx = canvas.width() / 2.0;
        self.backdrop(canvas, cx, cy, widest, line_h * lines.len() as f32, style.size);
        let top = cy - line_h * (lines.len() as f32 - 1.0) / 2.0;
        for (i, line) in lines.iter().enumerate() {
            draw_styled(canvas, font, line, cx, top + i as f32 * line_h, style, ctx.beat, ctx.frame_index);
        }
    }

    /// Eight faint copies around the line, then the line itself fading in
    /// as `amount` drops to 0.
    fn blurred(
        &self,
        canvas: &mut Canvas,
        font: &TextRenderer,
        text: &str,
        y: f32,
        style: &TextStyle,
        amount: f32,
        ctx: &OverlayContext,
    ) {
        let x = canvas.width() / 2.0;
        let radius = amount.clamp(0.0, 1.0) * style.size * 0.3;
        if radius >= 0.5 {
            let plain = TextStyle {
                effect: GraphicEffect::None,
                ..*style
            };
            for k in 0..8 {
                let a = k as f32 / 8.0 * TAU;
                canvas.save();
                canvas.set_alpha(0.15);
                draw_styled(canvas, font, text, x + a.cos() * radius, y + a.sin() * radius, &plain, false, ctx.frame_index);
                canvas.restore();
            }
        }
        canvas.save();
        canvas.set_alpha(1.0 - amount.clamp(0.0, 1.0) * 0.7);
        draw_styled(canvas, font, text, x, y, style, ctx.beat, ctx.frame_index);
        canvas.restore();
    }

    /// The active cue set in columns down the right side of the frame.
    fn vertical(&self, canvas: &mut Canvas, font: &TextRenderer, text: &str, style: &TextStyle, ctx: &OverlayContext) {
        let (w, h) = (canvas.width(), canvas.height());
        let step = font.line_height(style.size).max(1.0);
        let per_column = ((h * 0.8) / step).floor() as usize;
        let glyphs = vertical_layout(text, per_column, w * 0.92, h * 0.1 + step / 2.0, step);
        if glyphs.is_empty() {
            return;
        }
        if let Some(alpha) = self.style.background.alpha() {
            let left = glyphs.iter().map(|g| g.1).fold(f32::MAX, f32::min) - step * 0.7;
            let right = glyphs.iter().map(|g| g.1).fold(f32::MIN, f32::max) + step * 0.7;
            let bottom = glyphs.iter().map(|g| g.2).fold(f32::MIN, f32::max) + step * 0.7;
            let top = h * 0.1 - step * 0.2;
            if let Some(path) = rounded_rect_path(left, top, right - left, bottom - top, 5.0) {
                canvas.fill_path(&path, rgba([0, 0, 0], alpha));
            }
        }
        let mut buf = [0u8; 4];
        for (c, x, y) in glyphs {
            draw_styled(canvas, font, c.encode_utf8(&mut buf), x, y, style, ctx.beat, ctx.frame_index);
        }
    }

    /// Text of cue `i` as the single-cue modes show it at `time`.
    fn shown_text(&self, i: usize, time: f64) -> String {
        let cue = &self.cues[i];
        match self.style.mode {
            SubtitleMode::WordByWord => cue.text.chars().take(revealed_chars(cue, time)).collect(),
            _ => cue.text.clone(),
        }
    }

    pub fn draw(&self, canvas: &mut Canvas, font: &TextRenderer, ctx: &OverlayContext) {
        if self.cues.is_empty() || self.style.mode == SubtitleMode::None {
            return;
        }
        let (w, h) = (canvas.width(), canvas.height());
        let style = self.text_style(w);
        let cy = h * self.style.position_y / 100.0;
        let active = active_index(&self.cues, ctx.time);

        canvas.save();
        if self.style.orientation == SubtitleOrientation::Vertical && self.style.mode.single_cue() {
            if let Some(i) = active {
                if matches!(self.style.mode, SubtitleMode::FadeLines | SubtitleMode::PartialBlur) {
                    canvas.set_alpha(fade_alpha(&self.cues[i], ctx.time, self.style.fade_in, self.style.fade_out));
                }
                self.vertical(canvas, font, &self.shown_text(i, ctx.time), &style, ctx);
            }
            canvas.restore();
            return;
        }
        match self.style.mode {
            SubtitleMode::None => {}
            SubtitleMode::Classic => {
                if let Some(i) = active {
                    self.block(canvas, font, &self.cues[i].text, cy, &style, ctx);
                }
            }
            SubtitleMode::WordByWord => {
                if let Some(i) = active {
                    let mut visible = self.shown_text(i, ctx.time);
                    let blink = (ctx.time / 0.5).floor() as i64 % 2 == 0;
                    if blink && visible.chars().count() < self.cues[i].text.chars().count() {
                        visible.push('|');
                    }
                    if !visible.is_empty() {
                        self.block(canvas, font, &visible, cy, &style, ctx);
                    }
                }
            }
            SubtitleMode::LyricsScroll => {
                let spacing = font.line_height(style.size) * 1.6;
                let center = h / 2.0;
                for (i, offset, alpha) in scroll_window(&self.cues, ctx.time, 3) {
                    let focused = offset.abs() < 0.5;
                    let mut line_style = style;
                    if focused {
                        line_style.size *= 1.15;
                    } else {
                        line_style.effect = GraphicEffect::None;
                    }
                    canvas.save();
                    canvas.set_alpha(alpha);
                    draw_styled(
                        canvas,
                        font,
                        &self.cues[i].text,
                        w / 2.0,
                        center + offset * spacing,
                        &line_style,
                        ctx.beat,
                        ctx.frame_index,
                    );
                    canvas.restore();
                }
            }
            SubtitleMode::SlidingGroup => {
                if let Some(i) = active {
                    let group = i / GROUP_SIZE * GROUP_SIZE;
                    let group_start = self.cues[group].start_time;
                    let slide = (1.0 - ((ctx.time - group_start) / 0.4).clamp(0.0, 1.0)) as f32;
                    let dx = slide * slide * w * 0.3;
                    let line_h = font.line_height(style.size) * 1.3;
                    let members = (group..(group + GROUP_SIZE).min(self.cues.len())).collect::<Vec<_>>();
                    let top = cy - line_h * (members.len() as f32 - 1.0);
                    for (row, &j) in members.iter().enumerate() {
                        canvas.save();
                        let emphasis = if j == i { 1.0 } else { 0.45 };
                        canvas.set_alpha(emphasis * (1.0 - slide));
                        draw_styled(canvas, font, &self.cues[j].text, w / 2.0 + dx, top + row as f32 * line_h, &style, ctx.beat, ctx.frame_index);
                        canvas.restore();
                    }
                }
            }
            SubtitleMode::FadeLines => {
                let line_h = font.line_height(style.size) * 1.4;
                if let Some(i) = active {
                    let alpha = fade_alpha(&self.cues[i], ctx.time, self.style.fade_in, self.style.fade_out);
                    canvas.save();
                    canvas.set_alpha(alpha);
                    self.block(canvas, font, &self.cues[i].text, cy, &style, ctx);
                    canvas.restore();
                }
                // Neighbours stay faint above and below.
                let focus = active.or_else(|| latest_started(&self.cues, ctx.time));
                let neighbours = match focus {
                    Some(i) => [i.checked_sub(1).map(|p| (p, -1.0)), Some((i + 1, 1.0))],
                    None => [None, Some((0, 1.0))],
                };
                let mut dim = style;
                dim.size *= 0.8;
                dim.effect = GraphicEffect::None;
                for (j, dir) in neighbours.into_iter().flatten() {
                    if let Some(cue) = self.cues.get(j) {
                        canvas.save();
                        canvas.set_alpha(0.35);
                        draw_styled(canvas, font, &cue.text, w / 2.0, cy + dir * line_h, &dim, false, ctx.frame_index);
                        canvas.restore();
                    }
                }
                if self.style.guide_lines {
                    let guide = rgba(style.color, 0.3);
                    let half = w * 0.3;
                    for dir in [-1.0, 1.0] {
                        let gy = cy + dir * line_h * 1.6;
                        canvas.line(w / 2.0 - half, gy, w / 2.0 + half, gy, 1.0, guide);
                    }
                }
            }
            SubtitleMode::PartialBlur => {
                let line_h = font.line_height(style.size) * 1.4;
                if let Some(i) = active {
                    let amount = blur_amount(&self.cues[i], ctx.time, self.style.fade_in, self.style.fade_out);
                    self.blurred(canvas, font, &self.cues[i].text, cy, &style, amount, ctx);
                }
                let focus = active.or_else(|| latest_started(&self.cues, ctx.time));
                let neighbours = match focus {
                    Some(i) => [i.checked_sub(1).map(|p| (p, -1.0)), Some((i + 1, 1.0))],
                    None => [None, Some((0, 1.0))],
                };
                let mut dim = style;
                dim.size *= 0.8;
                for (j, dir) in neighbours.into_iter().flatten() {
                    if let Some(cue) = self.cues.get(j) {
                        canvas.save();
                        canvas.set_alpha(0.5);
                        self.blurred(canvas, font, &cue.text, cy + dir * line_h, &dim, 1.0, ctx);
                        canvas.restore();
                    }
                }
            }
        }
        canvas.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cues() -> Vec<SubtitleCue> {
        vec![
            SubtitleCue::new(0.0, 2.0, "one"),
            SubtitleCue::new(2.0, 4.0, "two"),
            SubtitleCue::new(4.0, 6.0, "three"),
            SubtitleCue::new(6.0, 8.0, "four"),
        ]
    }

    #[test]
    fn word_by_word_reveals_proportionally() {
        let cue = SubtitleCue::new(10.0, 14.0, "abcd");
        assert_eq!(revealed_chars(&cue, 10.0), 0);
        assert_eq!(revealed_chars(&cue, 11.0), 1);
        assert_eq!(revealed_chars(&cue, 12.5), 3);
        assert_eq!(revealed_chars(&cue, 20.0), 4);
        assert_eq!(revealed_chars(&cue, 5.0), 0);
    }

    #[test]
    fn fade_ramps_at_both_ends() {
        let cue = SubtitleCue::new(1.0, 3.0, "x");
        assert_eq!(fade_alpha(&cue, 1.0, 0.5, 0.5), 0.0);
        assert_eq!(fade_alpha(&cue, 1.25, 0.5, 0.5), 0.5);
        assert_eq!(fade_alpha(&cue, 2.0, 0.5, 0.5), 1.0);
        assert_eq!(fade_alpha(&cue, 2.75, 0.5, 0.5), 0.5);
        assert_eq!(fade_alpha(&cue, 3.0, 0.5, 0.5), 0.0);
        assert_eq!(fade_alpha(&cue, 2.0, 0.0, 0.0), 1.0);
    }

    #[test]
    fn scroll_window_centers_on_latest_cue() {
        let cues = cues();
        let window = scroll_window(&cues, 4.5, 1);
        let indices: Vec<_> = window.iter().map(|w| w.0).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        let focused = window.iter().find(|w| w.0 == 2).unwrap();
        assert_eq!(focused.1, 0.0);
        assert_eq!(focused.2, 1.0);
    }

    #[test]
    fn scroll_window_eases_into_new_line() {
        let cues = cues();
        let window = scroll_window(&cues, 4.0, 0);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].1, 1.0);
    }

    #[test]
    fn scroll_window_before_first_cue_lists_upcoming() {
        let cues = vec![SubtitleCue::new(5.0, 6.0, "later")];
        let window = scroll_window(&cues, 0.0, 2);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].0, 0);
        assert!(window[0].1 > 0.0);
    }

    #[test]
    fn style_defaults_deserialize_from_partial_toml() {
        let style: SubtitleStyle = toml::from_str("mode = \"fade-lines\"\nguide_lines = true").unwrap();
        assert_eq!(style.mode, SubtitleMode::FadeLines);
        assert!(style.guide_lines);
        assert_eq!(style.max_chars_per_line, 42);
        assert_eq!(style.orientation, SubtitleOrientation::Horizontal);

        let style: SubtitleStyle = toml::from_str("mode = \"partial-blur\"\norientation = \"vertical\"").unwrap();
        assert_eq!(style.mode, SubtitleMode::PartialBlur);
        assert_eq!(style.orientation, SubtitleOrientation::Vertical);
        assert_eq!("Partial_Blur".parse::<SubtitleMode>(), Ok(SubtitleMode::PartialBlur));
    }

    #[test]
    fn blur_clears_while_the_cue_is_sung() {
        let cue = SubtitleCue::new(1.0, 3.0, "x");
        assert_eq!(blur_amount(&cue, 0.5, 0.4, 0.4), 1.0);
        assert_eq!(blur_amount(&cue, 1.0, 0.4, 0.4), 1.0);
        assert!((blur_amount(&cue, 1.2, 0.4, 0.4) - 0.5).abs() < 1e-6);
        assert_eq!(blur_amount(&cue, 2.0, 0.4, 0.4), 0.0);
        assert_eq!(blur_amount(&cue, 3.5, 0.4, 0.4), 1.0);
    }

    #[test]
    fn vertical_layout_fills_columns_right_to_left() {
        let glyphs = vertical_layout("abcde", 2, 100.0, 10.0, 20.0);
        assert_eq!(
            glyphs,
            vec![
                ('a', 100.0, 10.0),
                ('b', 100.0, 30.0),
                ('c', 80.0, 10.0),
                ('d', 80.0, 30.0),
                ('e', 60.0, 10.0),
            ]
        );
    }

    #[test]
    fn vertical_layout_breaks_on_newlines_and_keeps_space_gaps() {
        let glyphs = vertical_layout("a b\ncd", 5, 100.0, 0.0, 10.0);
        assert_eq!(glyphs, vec![('a', 100.0, 0.0), ('b', 100.0, 20.0), ('c', 90.0, 0.0), ('d', 90.0, 10.0)]);
        assert!(vertical_layout(" \n ", 0, 0.0, 0.0, 1.0).is_empty());
    }

    #[test]
    fn single_cue_modes_can_go_vertical() {
        assert!(SubtitleMode::Classic.single_cue());
        assert!(SubtitleMode::PartialBlur.single_cue());
        assert!(!SubtitleMode::LyricsScroll.single_cue());
        assert!(!SubtitleMode::SlidingGroup.single_cue());
    }
}
