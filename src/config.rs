use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::audio::AnalysisSettings;
use crate::background::BackgroundSpec;
use crate::effects::{GraphicEffect, VisualizationType};
use crate::overlay::{CtaConfig, FilterConfig, IntroConfig, SubtitleStyle, TextOverlayConfig, WatermarkConfig};
use crate::render::palette::parse_hex;
use crate::render::PaletteKind;
use crate::scene::transform::TransformPatch;
use crate::subtitle::{DurationPolicy, SubtitleFormat};
use crate::transition::TransitionType;

/// Named output sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum ResolutionPreset {
    #[serde(rename = "720p")]
    Hd,
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "4k")]
    Uhd,
    #[serde(rename = "square-1080")]
    Square1080,
    #[serde(rename = "square-4k")]
    Square4k,
    #[serde(rename = "wide-4096")]
    Wide4096,
    #[serde(rename = "wide-1920")]
    Wide1920,
    #[serde(rename = "wide-1280")]
    Wide1280,
}

impl ResolutionPreset {
    pub const ALL: [ResolutionPreset; 8] = [
        Self::Hd,
        Self::FullHd,
        Self::Uhd,
        Self::Square1080,
        Self::Square4k,
        Self::Wide4096,
        Self::Wide1920,
        Self::Wide1280,
    ];

    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Hd => (1280, 720),
            Self::FullHd => (1920, 1080),
            Self::Uhd => (3840, 2160),
            Self::Square1080 => (1080, 1080),
            Self::Square4k => (2160, 2160),
            Self::Wide4096 => (4096, 2048),
            Self::Wide1920 => (1920, 960),
            Self::Wide1280 => (1280, 640),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Hd => "720p",
            Self::FullHd => "1080p",
            Self::Uhd => "4k",
            Self::Square1080 => "square-1080",
            Self::Square4k => "square-4k",
            Self::Wide4096 => "wide-4096",
            Self::Wide1920 => "wide-1920",
            Self::Wide1280 => "wide-1280",
        }
    }
}

impl std::str::FromStr for ResolutionPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| format!("unknown resolution preset: {s}"))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub visual: VisualConfig,
    #[serde(default)]
    pub subtitle: SubtitleConfig,
    #[serde(default)]
    pub text: Vec<TextOverlayConfig>,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub intro: IntroConfig,
    #[serde(default)]
    pub cta: CtaConfig,
    #[serde(default)]
    pub background: BackgroundSpec,
    #[serde(default)]
    pub recording: RecordingConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Takes precedence over `width`/`height` when set.
    #[serde(default)]
    pub preset: Option<ResolutionPreset>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub font: Option<PathBuf>,
    #[serde(default)]
    pub font_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Smoothing window in ticks, 0..=10.
    #[serde(default = "default_smoothing")]
    pub smoothing: u32,
    #[serde(default)]
    pub equalization: f32,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
}

#[derive(Debug, Deserialize)]
pub struct VisualConfig {
    /// More than one entry turns on multi-select.
    #[serde(default = "default_effects")]
    pub effects: Vec<String>,
    #[serde(default)]
    pub palette: PaletteKind,
    #[serde(default = "default_custom_color")]
    pub custom_color: String,
    #[serde(default)]
    pub stroke: bool,
    #[serde(default)]
    pub graphic_effect: GraphicEffect,
    /// Photo used by the image-based visualizations.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub transforms: HashMap<String, TransformPatch>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubtitleConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Detected from the text when unset.
    #[serde(default)]
    pub format: Option<SubtitleFormat>,
    #[serde(default)]
    pub duration: DurationPolicy,
    #[serde(default)]
    pub style: SubtitleStyle,
}

#[derive(Debug, Deserialize)]
pub struct RecordingConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_crf")]
    pub crf: u32,
    /// Played between songs of a batch.
    #[serde(default = "default_transition")]
    pub transition: Option<TransitionType>,
    /// Only WebM carries alpha.
    #[serde(default)]
    pub transparent: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            preset: None,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            font: None,
            font_url: None,
        }
    }
}

impl OutputConfig {
    pub fn dimensions(&self) -> (u32, u32) {
        self.preset
            .map(ResolutionPreset::dimensions)
            .unwrap_or((self.width, self.height))
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            smoothing: default_smoothing(),
            equalization: 0.0,
            sensitivity: default_sensitivity(),
        }
    }
}

impl AudioConfig {
    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            smoothing: self.smoothing.min(10),
            equalization: self.equalization.max(0.0),
        }
    }
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            effects: default_effects(),
            palette: PaletteKind::default(),
            custom_color: default_custom_color(),
            stroke: false,
            graphic_effect: GraphicEffect::None,
            image: None,
            transforms: HashMap::new(),
        }
    }
}

impl VisualConfig {
    /// Selected types in order; unknown names are skipped.
    pub fn selected(&self) -> Vec<VisualizationType> {
        let mut kinds = Vec::new();
        for name in &self.effects {
            match name.parse::<VisualizationType>() {
                Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Ok(_) => {}
                Err(err) => log::warn!("{}", err),
            }
        }
        if kinds.is_empty() {
            kinds.push(VisualizationType::Monstercat);
        }
        kinds
    }

    pub fn transform_patches(&self) -> Vec<(VisualizationType, TransformPatch)> {
        self.transforms
            .iter()
            .filter_map(|(name, patch)| match name.parse::<VisualizationType>() {
                Ok(kind) => Some((kind, *patch)),
                Err(err) => {
                    log::warn!("Ignoring transform: {}", err);
                    None
                }
            })
            .collect()
    }

    pub fn custom_rgb(&self) -> [u8; 3] {
        parse_hex(&self.custom_color).unwrap_or([255, 255, 255])
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            crf: default_crf(),
            transition: default_transition(),
            transparent: false,
        }
    }
}

fn default_width() -> u32 { 1920 }
fn default_height() -> u32 { 1080 }
fn default_fps() -> u32 { 30 }
fn default_crf() -> u32 { 31 }
fn default_smoothing() -> u32 { 2 }
fn default_sensitivity() -> f32 { 1.0 }
fn default_effects() -> Vec<String> { vec!["Monstercat".into()] }
fn default_custom_color() -> String { "#ffffff".into() }
fn default_output_dir() -> PathBuf { PathBuf::from(".") }
fn default_transition() -> Option<TransitionType> { Some(TransitionType::Fade) }

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
}

/// First existing config file: `./sonicreel.toml`, then
/// `~/.config/sonicreel/config.toml`, then the platform config dir.
pub fn discover_config() -> Option<PathBuf> {
    let local = PathBuf::from("sonicreel.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("sonicreel").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("sonicreel").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
