use anyhow::Result;
use std::path::PathBuf;

use crate::assets::AssetCache;
use crate::audio::AnalysisFrame;
use crate::background::Background;
use crate::config::Config;
use crate::effects::{DrawParams, EffectFlags, EffectRegistry, GraphicEffect};
use crate::overlay::{CtaOverlay, FilterLayer, IntroOverlay, OverlayContext, SubtitleLayer, TextOverlay, WatermarkOverlay};
use crate::render::{Canvas, Palette, TextRenderer};
use crate::scene::CompositeScene;
use crate::subtitle::SubtitleCue;
use crate::transition::{ActiveTransition, TransitionType};

/// Sample rate assumed before any analysis frame arrives.
const IDLE_SAMPLE_RATE: u32 = 44_100;

/// Per-tick compositor: background, visualizations, overlays, then any
/// running transition, all into one reusable canvas.
pub struct Engine {
    fps: u32,
    canvas: Canvas,
    scene: CompositeScene,
    palette: Palette,
    sensitivity: f32,
    stroke: bool,
    graphic: GraphicEffect,
    image: Option<String>,
    assets: AssetCache,
    background: Background,
    filter: FilterLayer,
    subtitles: SubtitleLayer,
    text: TextOverlay,
    watermark: WatermarkOverlay,
    intro: IntroOverlay,
    cta: CtaOverlay,
    default_cta_video: Option<PathBuf>,
    font: Option<TextRenderer>,
    transition: Option<ActiveTransition>,
    frame_index: u64,
}

impl Engine {
    /// Overlays that draw text are skipped when `font` is `None`.
    pub fn new(config: &Config, font: Option<TextRenderer>) -> Result<Self> {
        let (width, height) = config.output.dimensions();
        let fps = config.output.fps.max(1);
        let canvas = Canvas::new(width, height)?;

        let mut scene = CompositeScene::new(EffectRegistry::standard());
        for (kind, patch) in config.visual.transform_patches() {
            scene.set_transform(kind, &patch);
        }
        let selected = config.visual.selected();
        if selected.len() > 1 {
            scene.set_selected(&selected);
        } else {
            scene.select(selected[0]);
        }
        log::info!("Visualizations: {:?}", scene.active());

        let mut assets = AssetCache::new();
        for source in config.background.image_sources() {
            assets.request(source);
        }
        if let Some(image) = &config.visual.image {
            assets.request(image);
        }
        let watermark = WatermarkOverlay::new(config.watermark.clone());
        if let Some(image) = watermark.image_source() {
            assets.request(image);
        }

        Ok(Self {
            fps,
            canvas,
            scene,
            palette: Palette::preset(config.visual.palette, config.visual.custom_rgb()),
            sensitivity: config.audio.sensitivity,
            stroke: config.visual.stroke,
            graphic: config.visual.graphic_effect,
            image: config.visual.image.clone(),
            assets,
            background: Background::new(config.background.clone(), width, height, fps),
            filter: FilterLayer::new(config.filter.clone()),
            subtitles: SubtitleLayer::new(Vec::new(), config.subtitle.style.clone()),
            text: TextOverlay::new(config.text.clone()),
            watermark,
            intro: IntroOverlay::new(config.intro.clone()),
            cta: CtaOverlay::new(config.cta.clone(), fps),
            default_cta_video: config.cta.video.clone(),
            font,
            transition: None,
            frame_index: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width() as u32
    }

    pub fn height(&self) -> u32 {
        self.canvas.height() as u32
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Seconds of output rendered so far.
    pub fn clock(&self) -> f64 {
        self.frame_index as f64 / self.fps as f64
    }

    pub fn scene(&self) -> &CompositeScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut CompositeScene {
        &mut self.scene
    }

    pub fn assets_mut(&mut self) -> &mut AssetCache {
        &mut self.assets
    }

    /// Block until requested images are decoded so the first frames have them.
    pub fn prepare(&mut self) {
        if self.assets.pending() > 0 {
            log::info!("Waiting for {} images...", self.assets.pending());
            self.assets.wait_all();
        }
    }

    /// Replay the intro from the current item time.
    pub fn preview_intro(&mut self, item_time: f64) {
        self.intro.trigger(item_time);
    }

    pub fn intro_opacity(&self, item_time: f64) -> f32 {
        self.intro.opacity(item_time)
    }

    /// Switch overlays to a new song. The output clock keeps running.
    pub fn begin_item(&mut self, cues: Vec<SubtitleCue>, cta_video: Option<PathBuf>) {
        self.subtitles.set_cues(cues);
        self.cta.set_video(cta_video.or_else(|| self.default_cta_video.clone()));
        self.intro.on_start(0.0);
    }

    pub fn start_transition(&mut self, kind: TransitionType) {
        log::debug!("Transition {:?} at {:.2}s", kind, self.clock());
        self.transition = Some(ActiveTransition::new(kind, self.clock()));
    }

    pub fn transition_active(&self) -> bool {
        self.transition.is_some_and(|t| !t.finished(self.clock()))
    }

    /// Close video readers held by overlays.
    pub fn release(&mut self) {
        self.cta.release();
    }

    /// Composite one tick. `analysis` is `None` while nothing is playing;
    /// `item_time` is the playback position within the current song.
    pub fn render(&mut self, analysis: Option<&AnalysisFrame>, item_time: f64) -> &Canvas {
        self.assets.poll();
        let now = self.clock();
        let frame_index = self.frame_index;
        self.background.draw(&mut self.canvas, now, frame_index, &self.assets);

        let palette = self.palette.at_frame(frame_index);
        let beat = analysis.is_some_and(AnalysisFrame::is_beat);
        let params = DrawParams {
            magnitudes: analysis.map(|a| a.magnitudes.as_slice()),
            smoothed: analysis.map(|a| a.smoothed_magnitudes.as_slice()),
            width: self.canvas.width(),
            height: self.canvas.height(),
            frame_index,
            sensitivity: self.sensitivity,
            palette: &palette,
            flags: EffectFlags {
                beat,
                graphic: self.graphic,
            },
            stroke: self.stroke,
            sample_rate: analysis.map_or(IDLE_SAMPLE_RATE, |a| a.sample_rate),
            assets: &self.assets,
            image: self.image.as_deref(),
        };
        self.scene.render(&mut self.canvas, &params);
        self.filter.draw(&mut self.canvas, frame_index, beat);

        if let Some(font) = &self.font {
            let ctx = OverlayContext {
                time: item_time,
                frame_index,
                bins: params.bins(),
                beat,
            };
            self.subtitles.draw(&mut self.canvas, font, &ctx);
            self.text.draw(&mut self.canvas, font, &ctx);
            self.intro.draw(&mut self.canvas, font, item_time, &ctx);
            self.cta.draw(&mut self.canvas, font, &ctx);
        }
        self.watermark.draw(&mut self.canvas, self.font.as_ref(), &self.assets);

        if let Some(transition) = self.transition {
            if !transition.draw(&mut self.canvas, now, frame_index) {
                self.transition = None;
            }
        }

        self.frame_index += 1;
        &self.canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::BackgroundSpec;
    use crate::effects::VisualizationType;

    fn small_config() -> Config {
        let mut cfg = Config::default();
        cfg.output.width = 64;
        cfg.output.height = 36;
        cfg.output.fps = 10;
        cfg
    }

    fn frame(level: u8) -> AnalysisFrame {
        AnalysisFrame {
            magnitudes: vec![level; 1024],
            smoothed_magnitudes: vec![level; 1024],
            frame_index: 0,
            sample_rate: 44_100,
        }
    }

    #[test]
    fn builds_selection_from_config() {
        let mut cfg = small_config();
        cfg.visual.effects = vec!["Fusion".into(), "WaterRipple".into()];
        let engine = Engine::new(&cfg, None).unwrap();
        assert!(engine.scene().is_multi());
        assert_eq!(
            engine.scene().active(),
            vec![VisualizationType::Fusion, VisualizationType::WaterRipple]
        );
    }

    #[test]
    fn idle_tick_renders_and_advances_clock() {
        let mut engine = Engine::new(&small_config(), None).unwrap();
        let canvas = engine.render(None, 0.0);
        assert_eq!(canvas.to_rgba().len(), 64 * 36 * 4);
        assert_eq!(engine.frame_index(), 1);
        assert!((engine.clock() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn loud_frame_draws_over_background() {
        let mut engine = Engine::new(&small_config(), None).unwrap();
        let quiet = engine.render(Some(&frame(0)), 0.0).to_rgba();
        let loud = engine.render(Some(&frame(255)), 0.1).to_rgba();
        assert_ne!(quiet, loud);
    }

    #[test]
    fn transition_runs_for_its_duration() {
        let mut cfg = small_config();
        cfg.background = BackgroundSpec::Color { color: "#ffffff".into() };
        let mut engine = Engine::new(&cfg, None).unwrap();
        engine.start_transition(TransitionType::Fade);
        assert!(engine.transition_active());
        for _ in 0..8 {
            engine.render(None, 0.0);
        }
        assert!(!engine.transition_active());
    }

    #[test]
    fn filter_layer_draws_without_a_font() {
        let mut cfg = small_config();
        cfg.output.width = 320;
        cfg.output.height = 180;
        cfg.background = BackgroundSpec::Color { color: "#000000".into() };
        let plain = Engine::new(&cfg, None).unwrap().render(None, 0.0).to_rgba();

        cfg.filter.enabled = true;
        cfg.filter.intensity = 1.0;
        let mut engine = Engine::new(&cfg, None).unwrap();
        assert_ne!(engine.render(None, 0.0).to_rgba(), plain);
    }

    #[test]
    fn intro_fires_once_then_replays_on_preview() {
        let mut cfg = small_config();
        cfg.intro.enabled = true;
        cfg.intro.title = "Night Drive".into();
        let mut engine = Engine::new(&cfg, None).unwrap();
        engine.begin_item(Vec::new(), None);
        assert_eq!(engine.intro_opacity(2.0), 1.0);
        assert_eq!(engine.intro_opacity(6.0), 0.0);

        // a second song starting at t=0 does not replay it
        engine.begin_item(Vec::new(), None);
        assert_eq!(engine.intro_opacity(20.0), 0.0);

        engine.preview_intro(20.0);
        assert_eq!(engine.intro_opacity(20.0), 0.0);
        assert_eq!(engine.intro_opacity(22.0), 1.0);
    }
}
