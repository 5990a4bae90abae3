pub mod bars;
pub mod media;
pub mod orbs;
pub mod piano;
pub mod waves;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tiny_skia::Color;

use crate::assets::AssetCache;
use crate::audio::analysis::BIN_COUNT;
use crate::render::{palette, Canvas, Palette};

/// The closed set of selectable visualizations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VisualizationType {
    Monstercat,
    Fusion,
    RadialBars,
    LuminousWave,
    NebulaWave,
    CircularWave,
    GlitchWave,
    AudioLandscape,
    StellarCore,
    WaterRipple,
    PianoVirtuoso,
    VinylRecord,
    PhotoShake,
}

impl VisualizationType {
    pub const ALL: [VisualizationType; 13] = [
        Self::Monstercat,
        Self::Fusion,
        Self::RadialBars,
        Self::LuminousWave,
        Self::NebulaWave,
        Self::CircularWave,
        Self::GlitchWave,
        Self::AudioLandscape,
        Self::StellarCore,
        Self::WaterRipple,
        Self::PianoVirtuoso,
        Self::VinylRecord,
        Self::PhotoShake,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Monstercat => "Monstercat",
            Self::Fusion => "Fusion",
            Self::RadialBars => "RadialBars",
            Self::LuminousWave => "LuminousWave",
            Self::NebulaWave => "NebulaWave",
            Self::CircularWave => "CircularWave",
            Self::GlitchWave => "GlitchWave",
            Self::AudioLandscape => "AudioLandscape",
            Self::StellarCore => "StellarCore",
            Self::WaterRipple => "WaterRipple",
            Self::PianoVirtuoso => "PianoVirtuoso",
            Self::VinylRecord => "VinylRecord",
            Self::PhotoShake => "PhotoShake",
        }
    }
}

impl fmt::Display for VisualizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VisualizationType {
    type Err = String;

    /// Case-insensitive; `-`, `_` and spaces are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.name().to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("unknown effect: {s}"))
    }
}

/// Stylistic treatment shared by visualizers and text overlays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphicEffect {
    #[default]
    None,
    Bold,
    Shadow,
    Neon,
    Outline,
    Faux3d,
    Glitch,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EffectFlags {
    pub beat: bool,
    pub graphic: GraphicEffect,
}

/// Everything a renderer may read for one tick.
pub struct DrawParams<'a> {
    pub magnitudes: Option<&'a [u8]>,
    pub smoothed: Option<&'a [u8]>,
    pub width: f32,
    pub height: f32,
    pub frame_index: u64,
    pub sensitivity: f32,
    pub palette: &'a Palette,
    pub flags: EffectFlags,
    /// Outline waveforms with a dark stroke.
    pub stroke: bool,
    pub sample_rate: u32,
    pub assets: &'a AssetCache,
    /// Source id of the image used by photo-based renderers.
    pub image: Option<&'a str>,
}

static SILENCE: [u8; BIN_COUNT] = [0; BIN_COUNT];

impl<'a> DrawParams<'a> {
    pub fn is_idle(&self) -> bool {
        self.smoothed.map_or(true, |d| d.is_empty())
    }

    /// Smoothed bins, or a silent spectrum before analysis is ready.
    pub fn bins(&self) -> &'a [u8] {
        match self.smoothed {
            Some(d) if !d.is_empty() => d,
            _ => &SILENCE,
        }
    }

    pub fn min_dim(&self) -> f32 {
        self.width.min(self.height)
    }

    pub fn nyquist(&self) -> f32 {
        self.sample_rate.max(2) as f32 / 2.0
    }

    /// Amplitude of the bin holding `freq`, scaled by sensitivity, 0..=1.
    pub fn amplitude_at(&self, freq: f32) -> f32 {
        let bins = self.bins();
        let bin = frequency_bin(freq, self.nyquist(), bins.len());
        (level(bins, bin) * self.sensitivity).clamp(0.0, 1.0)
    }

    /// Amplitude `fraction` of the way from 0 Hz up to `ceiling` × Nyquist.
    pub fn amplitude_along(&self, fraction: f32, ceiling: f32) -> f32 {
        self.amplitude_at(fraction.clamp(0.0, 1.0) * ceiling * self.nyquist())
    }

    /// Mean amplitude over `lo_hz..hi_hz`, scaled by sensitivity, 0..=1.
    pub fn band_amplitude(&self, lo_hz: f32, hi_hz: f32) -> f32 {
        let bins = self.bins();
        let nyquist = self.nyquist();
        let start = frequency_bin(lo_hz, nyquist, bins.len());
        let end = frequency_bin(hi_hz, nyquist, bins.len()).max(start + 1);
        (band(bins, start, end) * self.sensitivity).clamp(0.0, 1.0)
    }

    /// Mean of the bass bins beat detection listens to, scaled by
    /// sensitivity, 0..=1.
    pub fn bass(&self) -> f32 {
        (band(self.bins(), 0, BASS_BINS) * self.sensitivity).clamp(0.0, 1.0)
    }
}

/// Share of the Nyquist range the banded visuals spread across.
pub const BAND_CEILING: f32 = 0.7;

const BASS_BINS: usize = 32;

/// `clamp(floor(freq / nyquist * len), 0, len - 1)`
pub fn frequency_bin(freq: f32, nyquist: f32, len: usize) -> usize {
    if len == 0 || nyquist <= 0.0 {
        return 0;
    }
    let bin = (freq / nyquist * len as f32).floor();
    (bin.max(0.0) as usize).min(len - 1)
}

/// Raw amplitude of bin `index` (clamped into range), 0..=1.
pub(crate) fn level(bins: &[u8], index: usize) -> f32 {
    match bins.len() {
        0 => 0.0,
        len => bins[index.min(len - 1)] as f32 / 255.0,
    }
}

/// Mean raw amplitude over `range`, 0..=1.
pub(crate) fn band(bins: &[u8], start: usize, end: usize) -> f32 {
    let end = end.min(bins.len());
    if start >= end {
        return 0.0;
    }
    bins[start..end].iter().map(|&b| b as f32).sum::<f32>() / ((end - start) as f32 * 255.0)
}

/// Deterministic noise in 0..1 keyed by frame and salt.
pub(crate) fn noise(frame: u64, salt: u64) -> f32 {
    let mut z = frame
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(salt.wrapping_mul(0xBF58_476D_1CE4_E5B9));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 40) as f32 / (1u64 << 24) as f32
}

pub(crate) fn rgba(rgb: [u8; 3], alpha: f32) -> Color {
    palette::color(rgb, alpha)
}

pub(crate) const STROKE_COLOR: [u8; 3] = [0, 0, 0];

/// A stateless draw routine for one visualization type.
pub trait Renderer: Send + Sync {
    fn draw(&self, canvas: &mut Canvas, params: &DrawParams);

    /// Whether the per-type placement transform applies. Full-frame glitch
    /// effects operate on device pixels and ignore it.
    fn honors_transform(&self) -> bool {
        true
    }
}

pub struct EffectRegistry {
    renderers: HashMap<VisualizationType, Box<dyn Renderer>>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self {
            renderers: HashMap::new(),
        }
    }

    /// Every built-in visualization.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(VisualizationType::Monstercat, Box::new(bars::Monstercat));
        registry.register(VisualizationType::Fusion, Box::new(bars::Fusion));
        registry.register(VisualizationType::RadialBars, Box::new(bars::RadialBars));
        registry.register(VisualizationType::AudioLandscape, Box::new(bars::AudioLandscape));
        registry.register(VisualizationType::LuminousWave, Box::new(waves::LuminousWave));
        registry.register(VisualizationType::NebulaWave, Box::new(waves::NebulaWave));
        registry.register(VisualizationType::CircularWave, Box::new(waves::CircularWave));
        registry.register(VisualizationType::GlitchWave, Box::new(waves::GlitchWave));
        registry.register(VisualizationType::StellarCore, Box::new(orbs::StellarCore));
        registry.register(VisualizationType::WaterRipple, Box::new(orbs::WaterRipple));
        registry.register(VisualizationType::PianoVirtuoso, Box::new(piano::PianoVirtuoso));
        registry.register(VisualizationType::VinylRecord, Box::new(media::VinylRecord));
        registry.register(VisualizationType::PhotoShake, Box::new(media::PhotoShake));
        registry
    }

    /// Replaces any renderer already bound to `kind`.
    pub fn register(&mut self, kind: VisualizationType, renderer: Box<dyn Renderer>) {
        self.renderers.insert(kind, renderer);
    }

    pub fn get(&self, kind: VisualizationType) -> Option<&dyn Renderer> {
        self.renderers.get(&kind).map(|r| r.as_ref())
    }

    pub fn contains(&self, kind: VisualizationType) -> bool {
        self.renderers.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<VisualizationType> {
        let mut kinds: Vec<_> = self.renderers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn params<'a>(
        bins: Option<&'a [u8]>,
        palette: &'a Palette,
        assets: &'a AssetCache,
    ) -> DrawParams<'a> {
        DrawParams {
            magnitudes: bins,
            smoothed: bins,
            width: 320.0,
            height: 180.0,
            frame_index: 42,
            sensitivity: 1.0,
            palette,
            flags: EffectFlags {
                beat: true,
                graphic: GraphicEffect::None,
            },
            stroke: true,
            sample_rate: 44100,
            assets,
            image: Some("missing.png"),
        }
    }

    fn painted(canvas: &Canvas) -> usize {
        canvas.pixmap().data().chunks_exact(4).filter(|p| p[3] > 0).count()
    }

    #[test]
    fn bin_mapping_clamps() {
        assert_eq!(frequency_bin(0.0, 22050.0, 1024), 0);
        assert_eq!(frequency_bin(11025.0, 22050.0, 1024), 512);
        assert_eq!(frequency_bin(30000.0, 22050.0, 1024), 1023);
        assert_eq!(frequency_bin(-5.0, 22050.0, 1024), 0);
        assert_eq!(frequency_bin(100.0, 22050.0, 0), 0);
    }

    #[test]
    fn sensitivity_scales_before_clamp() {
        let palette = Palette::default();
        let assets = AssetCache::new();
        let bins = vec![100u8; 1024];
        let mut p = params(Some(&bins), &palette, &assets);
        let base = p.amplitude_at(1000.0);
        p.sensitivity = 2.0;
        assert!((p.amplitude_at(1000.0) - base * 2.0).abs() < 1e-6);
        p.sensitivity = 10.0;
        assert_eq!(p.amplitude_at(1000.0), 1.0);
    }

    #[test]
    fn bands_are_addressed_by_frequency() {
        let palette = Palette::default();
        let assets = AssetCache::new();
        let mut bins = vec![0u8; 1024];
        // 22050 Hz Nyquist over 1024 bins: 2000..4000 Hz is bins 92..185.
        for b in &mut bins[92..185] {
            *b = 200;
        }
        let mut p = params(Some(&bins), &palette, &assets);
        assert!((p.band_amplitude(2000.0, 4000.0) - 200.0 / 255.0).abs() < 1e-6);
        assert_eq!(p.band_amplitude(0.0, 1900.0), 0.0);
        // 3000 Hz sits at 3000 / (0.7 * 22050) of the banded range.
        assert!(p.amplitude_along(3000.0 / (BAND_CEILING * 22050.0), BAND_CEILING) > 0.0);
        assert_eq!(p.amplitude_along(0.0, BAND_CEILING), 0.0);

        p.sensitivity = 2.0;
        assert_eq!(p.band_amplitude(2000.0, 4000.0), 1.0);
        assert_eq!(p.bass(), 0.0);
    }

    #[test]
    fn bass_follows_sensitivity() {
        let palette = Palette::default();
        let assets = AssetCache::new();
        let bins = vec![51u8; 1024];
        let mut p = params(Some(&bins), &palette, &assets);
        assert!((p.bass() - 0.2).abs() < 1e-6);
        p.sensitivity = 3.0;
        assert!((p.bass() - 0.6).abs() < 1e-6);
        p.sensitivity = 10.0;
        assert_eq!(p.bass(), 1.0);
    }

    #[test]
    fn parses_names_loosely() {
        assert_eq!("radial-bars".parse::<VisualizationType>(), Ok(VisualizationType::RadialBars));
        assert_eq!("Monstercat".parse::<VisualizationType>(), Ok(VisualizationType::Monstercat));
        assert!("laser show".parse::<VisualizationType>().is_err());
    }

    #[test]
    fn standard_registers_every_type() {
        let registry = EffectRegistry::standard();
        assert_eq!(registry.kinds(), VisualizationType::ALL.to_vec());
    }

    #[test]
    fn every_renderer_survives_missing_and_empty_data() {
        let registry = EffectRegistry::standard();
        let palette = Palette::default();
        let assets = AssetCache::new();
        let empty: [u8; 0] = [];
        for kind in VisualizationType::ALL {
            let renderer = registry.get(kind).unwrap();
            let mut canvas = Canvas::new(320, 180).unwrap();
            renderer.draw(&mut canvas, &params(None, &palette, &assets));
            renderer.draw(&mut canvas, &params(Some(&empty), &palette, &assets));
            assert_eq!(canvas.depth(), 0, "{kind} left the canvas stack unbalanced");
        }
    }

    #[test]
    fn every_renderer_draws_something_when_loud() {
        let registry = EffectRegistry::standard();
        let palette = Palette::default();
        let assets = AssetCache::new();
        let loud = vec![230u8; 1024];
        for kind in VisualizationType::ALL {
            let mut canvas = Canvas::new(320, 180).unwrap();
            registry
                .get(kind)
                .unwrap()
                .draw(&mut canvas, &params(Some(&loud), &palette, &assets));
            assert!(painted(&canvas) > 0, "{kind} drew nothing");
            assert_eq!(canvas.depth(), 0);
        }
    }

    #[test]
    fn noise_is_deterministic_and_in_range() {
        assert_eq!(noise(7, 1), noise(7, 1));
        assert_ne!(noise(7, 1), noise(8, 1));
        for f in 0..200 {
            let n = noise(f, 3);
            assert!((0.0..1.0).contains(&n));
        }
    }
}
