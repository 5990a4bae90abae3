pub mod cue;
pub mod parse;

pub use cue::{active_cue, active_index, DurationPolicy, SubtitleCue};
pub use parse::{detect_format, parse, parse_auto, to_bracket, to_srt, SubtitleFormat};
