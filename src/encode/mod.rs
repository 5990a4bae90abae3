pub mod ffmpeg;
pub mod session;

pub use ffmpeg::FfmpegBackend;
pub use session::{
    output_stem, select_format, Artifact, EncoderBackend, RecordingFormat, RecordingSession, SessionStatus,
    StreamSpec, FORMAT_PREFERENCES,
};
