use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use super::decode::AudioData;
use super::features::AnalysisFrame;

pub const FFT_SIZE: usize = 2048;
pub const BIN_COUNT: usize = FFT_SIZE / 2;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Supplies one frequency snapshot per tick for the active audio.
pub trait AnalysisSource: Send {
    /// Snapshot for tick `tick`, or `None` past the end of the audio.
    fn frame(&self, tick: u64) -> Option<AnalysisFrame>;
    fn sample_rate(&self) -> u32;
    fn tick_count(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Temporal smoothing window in ticks, 0 disables.
    pub smoothing: u32,
    /// High-frequency tilt exponent, 0 disables.
    pub equalization: f32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            smoothing: 2,
            equalization: 0.0,
        }
    }
}

/// Precomputed analysis of one decoded track, sampled at the render rate.
pub struct TrackAnalyzer {
    raw: Vec<Vec<u8>>,
    smoothed: Vec<Vec<u8>>,
    sample_rate: u32,
}

impl TrackAnalyzer {
    pub fn new(audio: &AudioData, fps: u32, settings: AnalysisSettings) -> Self {
        let duration = audio.duration();
        let total_frames = (duration * fps as f64).ceil() as usize;

        log::info!("Analysis pass 1: per-tick FFT ({} ticks)...", total_frames);
        let raw = spectrum_per_tick(&audio.samples, audio.sample_rate, fps, total_frames);

        log::info!(
            "Analysis pass 2: equalize={:.2}, smoothing window={}",
            settings.equalization,
            settings.smoothing
        );
        let smoothed = smooth_over_time(&raw, settings);

        Self {
            raw,
            smoothed,
            sample_rate: audio.sample_rate,
        }
    }
}

impl AnalysisSource for TrackAnalyzer {
    fn frame(&self, tick: u64) -> Option<AnalysisFrame> {
        let idx = usize::try_from(tick).ok()?;
        Some(AnalysisFrame {
            magnitudes: self.raw.get(idx)?.clone(),
            smoothed_magnitudes: self.smoothed.get(idx)?.clone(),
            frame_index: tick,
            sample_rate: self.sample_rate,
        })
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn tick_count(&self) -> u64 {
        self.raw.len() as u64
    }
}

fn spectrum_per_tick(samples: &[f32], sample_rate: u32, fps: u32, total_frames: usize) -> Vec<Vec<u8>> {
    let samples_per_frame = sample_rate as f64 / fps as f64;
    let window = blackman_window(FFT_SIZE);

    (0..total_frames)
        .into_par_iter()
        .map_init(
            || FftPlanner::<f32>::new().plan_fft_forward(FFT_SIZE),
            |fft, frame_idx| {
                // Window ends at the tick time, like a live analyser reading the latest samples.
                let end = (((frame_idx + 1) as f64 * samples_per_frame) as usize).min(samples.len());
                let start = end.saturating_sub(FFT_SIZE);

                let mut buffer = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];
                let offset = FFT_SIZE - (end - start);
                for (i, &s) in samples[start..end].iter().enumerate() {
                    buffer[offset + i] = Complex::new(s * window[offset + i], 0.0);
                }
                fft.process(&mut buffer);

                buffer[..BIN_COUNT]
                    .iter()
                    .map(|c| magnitude_to_byte(c.norm() / FFT_SIZE as f32))
                    .collect()
            },
        )
        .collect()
}

fn magnitude_to_byte(mag: f32) -> u8 {
    let db = 20.0 * mag.max(1e-12).log10();
    let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
    scaled.clamp(0.0, 255.0) as u8
}

/// Tilt magnitudes towards the treble: bin `i` is scaled by `(i/len)^balance`.
pub fn equalize(bins: &[u8], balance: f32) -> Vec<u8> {
    if balance <= 0.0 {
        return bins.to_vec();
    }
    let len = bins.len() as f32;
    bins.iter()
        .enumerate()
        .map(|(i, &b)| (b as f32 * (i as f32 / len).powf(balance)) as u8)
        .collect()
}

/// Exponential moving average across ticks with span `settings.smoothing`.
fn smooth_over_time(raw: &[Vec<u8>], settings: AnalysisSettings) -> Vec<Vec<u8>> {
    let window = settings.smoothing.min(10);
    let alpha = 2.0 / (window as f32 + 1.0);

    let mut state: Vec<f32> = Vec::new();
    let mut out = Vec::with_capacity(raw.len());
    for bins in raw {
        let eq = equalize(bins, settings.equalization);
        if state.len() != eq.len() || window == 0 {
            state = eq.iter().map(|&b| b as f32).collect();
        } else {
            for (s, &b) in state.iter_mut().zip(eq.iter()) {
                *s += alpha * (b as f32 - *s);
            }
        }
        out.push(state.iter().map(|&v| v.round().clamp(0.0, 255.0) as u8).collect());
    }
    out
}

fn blackman_window(size: usize) -> Vec<f32> {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    (0..size)
        .map(|i| {
            let x = std::f32::consts::TAU * i as f32 / size as f32;
            a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, seconds: f32, rate: u32) -> AudioData {
        let n = (seconds * rate as f32) as usize;
        AudioData {
            samples: (0..n)
                .map(|i| (i as f32 * freq * std::f32::consts::TAU / rate as f32).sin() * 0.8)
                .collect(),
            sample_rate: rate,
        }
    }

    #[test]
    fn tick_count_matches_duration() {
        let analyzer = TrackAnalyzer::new(&tone(440.0, 2.0, 44100), 30, AnalysisSettings::default());
        assert_eq!(analyzer.tick_count(), 60);
        assert!(analyzer.frame(59).is_some());
        assert!(analyzer.frame(60).is_none());
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let rate = 44100;
        let analyzer = TrackAnalyzer::new(&tone(1000.0, 1.0, rate), 30, AnalysisSettings::default());
        let frame = analyzer.frame(15).unwrap();
        assert_eq!(frame.magnitudes.len(), BIN_COUNT);

        let expected = (1000.0 / frame.nyquist() * BIN_COUNT as f32) as usize;
        let peak = frame
            .magnitudes
            .iter()
            .enumerate()
            .max_by_key(|(_, &m)| m)
            .map(|(i, _)| i)
            .unwrap();
        assert!((peak as i64 - expected as i64).abs() <= 1, "peak {} expected {}", peak, expected);
        assert!(frame.magnitudes[peak] > 200);
        assert!(frame.magnitudes[BIN_COUNT - 10] < 50);
    }

    #[test]
    fn silence_is_all_zero() {
        let audio = AudioData {
            samples: vec![0.0; 44100],
            sample_rate: 44100,
        };
        let analyzer = TrackAnalyzer::new(&audio, 30, AnalysisSettings::default());
        let frame = analyzer.frame(3).unwrap();
        assert!(frame.magnitudes.iter().all(|&m| m == 0));
        assert!(frame.smoothed_magnitudes.iter().all(|&m| m == 0));
    }

    #[test]
    fn smoothing_lags_behind_a_step() {
        let raw = vec![vec![0u8; 4], vec![200u8; 4], vec![200u8; 4]];
        let smooth = smooth_over_time(&raw, AnalysisSettings { smoothing: 3, equalization: 0.0 });
        assert_eq!(smooth[0], vec![0; 4]);
        assert_eq!(smooth[1], vec![100; 4]);
        assert_eq!(smooth[2], vec![150; 4]);

        let passthrough = smooth_over_time(&raw, AnalysisSettings { smoothing: 0, equalization: 0.0 });
        assert_eq!(passthrough, raw);
    }

    #[test]
    fn equalize_tilts_low_bins_down() {
        let eq = equalize(&[200, 200, 200, 200], 1.0);
        assert_eq!(eq, vec![0, 50, 100, 150]);
        assert_eq!(equalize(&[7, 8], 0.0), vec![7, 8]);
    }
}
