use serde::{Deserialize, Serialize};

/// A subtitle cue: one timed lyric/subtitle line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

impl SubtitleCue {
    pub fn new(start_time: f64, end_time: f64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start_time,
            end_time,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn contains(&self, time: f64) -> bool {
        self.start_time <= time && time < self.end_time
    }
}

/// How end times are assigned to cue formats that only carry a start time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DurationPolicy {
    /// Each cue lasts until the next cue starts; the last cue (or a cue whose
    /// successor shares its start time) lasts `fallback_secs`.
    NextCueOrFixed { fallback_secs: f64 },
    /// Every cue lasts exactly `secs`.
    Fixed { secs: f64 },
}

impl Default for DurationPolicy {
    fn default() -> Self {
        DurationPolicy::NextCueOrFixed { fallback_secs: 10.0 }
    }
}

impl DurationPolicy {
    /// Assign end times to start-sorted `(start, text)` pairs.
    pub fn apply(&self, starts: Vec<(f64, String)>) -> Vec<SubtitleCue> {
        let mut cues = Vec::with_capacity(starts.len());
        for (i, (start, text)) in starts.iter().enumerate() {
            let end = match *self {
                DurationPolicy::Fixed { secs } => start + secs.max(0.01),
                DurationPolicy::NextCueOrFixed { fallback_secs } => {
                    match starts.get(i + 1) {
                        Some((next, _)) if *next > *start => *next,
                        _ => start + fallback_secs.max(0.01),
                    }
                }
            };
            cues.push(SubtitleCue::new(*start, end, text.clone()));
        }
        cues
    }
}

/// Stable sort by start time; equal starts keep input order.
pub fn sort_cues(cues: &mut [SubtitleCue]) {
    cues.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
}

/// Index of the last cue with `start <= time < end`.
///
/// Recomputed from scratch on every call since playback time may jump
/// backwards on seek.
pub fn active_index(cues: &[SubtitleCue], time: f64) -> Option<usize> {
    let upper = cues.partition_point(|c| c.start_time <= time);
    (0..upper).rev().find(|&i| cues[i].contains(time))
}

pub fn active_cue(cues: &[SubtitleCue], time: f64) -> Option<&SubtitleCue> {
    active_index(cues, time).map(|i| &cues[i])
}

/// Index of the last cue that has started by `time`, whether or not it has ended.
pub fn latest_started(cues: &[SubtitleCue], time: f64) -> Option<usize> {
    cues.partition_point(|c| c.start_time <= time).checked_sub(1)
}
