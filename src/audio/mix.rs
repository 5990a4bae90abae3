use std::sync::Arc;

use super::decode::AudioData;

pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;

/// A source read at its own rate and resampled linearly to the mix rate.
struct Voice {
    data: Arc<AudioData>,
    position: f64,
    gain: f32,
}

impl Voice {
    fn new(data: Arc<AudioData>, gain: f32) -> Self {
        Self {
            data,
            position: 0.0,
            gain,
        }
    }

    fn finished(&self) -> bool {
        self.position >= self.data.samples.len() as f64
    }

    fn next(&mut self, out_rate: u32) -> f32 {
        let samples = &self.data.samples;
        let idx = self.position as usize;
        let value = match (samples.get(idx), samples.get(idx + 1)) {
            (Some(&a), Some(&b)) => {
                let frac = (self.position - idx as f64) as f32;
                a + (b - a) * frac
            }
            (Some(&a), None) => a,
            _ => 0.0,
        };
        self.position += self.data.sample_rate as f64 / out_rate as f64;
        value * self.gain
    }
}

/// The audio graph feeding the recording: one main track plus an optional
/// CTA track. Replacing the main input does not interrupt the output stream.
pub struct AudioMix {
    main: Option<Voice>,
    aux: Option<Voice>,
    out_rate: u32,
    tick_remainder: f64,
}

impl AudioMix {
    pub fn new(out_rate: u32) -> Self {
        Self {
            main: None,
            aux: None,
            out_rate,
            tick_remainder: 0.0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.out_rate
    }

    /// Swap the main input; playback of the new source starts at zero.
    pub fn set_main(&mut self, data: Option<Arc<AudioData>>) {
        self.main = data.map(|d| Voice::new(d, 1.0));
    }

    /// Attach or detach the CTA source. It is mixed into the output only and
    /// never reaches the analyser.
    pub fn set_aux(&mut self, data: Option<Arc<AudioData>>, gain: f32) {
        self.aux = data.map(|d| Voice::new(d, gain));
    }

    pub fn main_finished(&self) -> bool {
        self.main.as_ref().map_or(true, Voice::finished)
    }

    /// Current main playback position in seconds.
    pub fn main_time(&self) -> f64 {
        self.main
            .as_ref()
            .map_or(0.0, |v| v.position / v.data.sample_rate as f64)
    }

    pub fn pull(&mut self, count: usize) -> Vec<f32> {
        let rate = self.out_rate;
        (0..count)
            .map(|_| {
                let mut s = 0.0;
                if let Some(main) = self.main.as_mut() {
                    s += main.next(rate);
                }
                if let Some(aux) = self.aux.as_mut() {
                    s += aux.next(rate);
                }
                s.clamp(-1.0, 1.0)
            })
            .collect()
    }

    /// Samples for one video tick, carrying the fractional part forward so
    /// audio and video stay locked over long recordings.
    pub fn pull_tick(&mut self, fps: u32) -> Vec<f32> {
        let exact = self.out_rate as f64 / fps as f64 + self.tick_remainder;
        let count = exact.floor();
        self.tick_remainder = exact - count;
        self.pull(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f32, len: usize, rate: u32) -> Arc<AudioData> {
        Arc::new(AudioData {
            samples: vec![value; len],
            sample_rate: rate,
        })
    }

    #[test]
    fn silent_without_inputs() {
        let mut mix = AudioMix::new(48_000);
        assert!(mix.pull(10).iter().all(|&s| s == 0.0));
        assert!(mix.main_finished());
    }

    #[test]
    fn resamples_to_output_rate() {
        let mut mix = AudioMix::new(48_000);
        mix.set_main(Some(constant(0.25, 24_000, 24_000)));
        let out = mix.pull(48_000);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
        assert!(mix.main_finished());
        assert!((mix.main_time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn swapping_main_restarts_position() {
        let mut mix = AudioMix::new(100);
        mix.set_main(Some(constant(0.5, 50, 100)));
        mix.pull(50);
        assert!(mix.main_finished());
        mix.set_main(Some(constant(-0.5, 50, 100)));
        assert!(!mix.main_finished());
        assert_eq!(mix.pull(1)[0], -0.5);
    }

    #[test]
    fn aux_mixes_and_clamps() {
        let mut mix = AudioMix::new(100);
        mix.set_main(Some(constant(0.8, 10, 100)));
        mix.set_aux(Some(constant(0.8, 10, 100)), 1.0);
        assert_eq!(mix.pull(1)[0], 1.0);
    }

    #[test]
    fn tick_pulls_do_not_drift() {
        let mut mix = AudioMix::new(44_100);
        let total: usize = (0..30).map(|_| mix.pull_tick(29)).map(|v| v.len()).sum();
        let expected = (44_100.0f64 * 30.0 / 29.0).floor() as usize;
        assert!((total as i64 - expected as i64).abs() <= 1);
    }
}
