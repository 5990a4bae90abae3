pub mod analysis;
pub mod decode;
pub mod features;
pub mod mix;

pub use analysis::{AnalysisSettings, AnalysisSource, TrackAnalyzer};
pub use decode::AudioData;
pub use features::AnalysisFrame;
pub use mix::AudioMix;
