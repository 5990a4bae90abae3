/// One tick's frequency-domain snapshot of the active audio.
///
/// Byte magnitudes follow the browser analyser convention: 0 maps to the
/// floor decibel level and 255 to the ceiling.
#[derive(Clone, Debug)]
pub struct AnalysisFrame {
    /// Per-bin magnitudes of this tick only
    pub magnitudes: Vec<u8>,
    /// Equalized and time-smoothed magnitudes, what renderers consume
    pub smoothed_magnitudes: Vec<u8>,
    pub frame_index: u64,
    pub sample_rate: u32,
}

/// Bass average above which a tick counts as a beat.
pub const BEAT_THRESHOLD: f32 = 180.0;

impl AnalysisFrame {
    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    /// Mean of the first 32 raw bins, 0-255.
    pub fn bass_level(&self) -> f32 {
        bass_level(&self.magnitudes)
    }

    pub fn is_beat(&self) -> bool {
        self.bass_level() > BEAT_THRESHOLD
    }
}

pub fn bass_level(bins: &[u8]) -> f32 {
    let n = bins.len().min(32);
    if n == 0 {
        return 0.0;
    }
    bins[..n].iter().map(|&b| b as f32).sum::<f32>() / n as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beat_follows_bass_average() {
        let mut frame = AnalysisFrame {
            magnitudes: vec![0; 1024],
            smoothed_magnitudes: vec![0; 1024],
            frame_index: 0,
            sample_rate: 44100,
        };
        assert!(!frame.is_beat());
        for b in frame.magnitudes.iter_mut().take(32) {
            *b = 200;
        }
        assert!(frame.is_beat());
        assert_eq!(frame.nyquist(), 22050.0);
    }

    #[test]
    fn bass_level_of_empty_is_zero() {
        assert_eq!(bass_level(&[]), 0.0);
    }
}
