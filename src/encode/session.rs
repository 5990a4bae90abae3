use std::path::PathBuf;

use crate::error::{EngineError, Result};

/// A container/codec combination the recording can be written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordingFormat {
    pub container: &'static str,
    pub video_codec: &'static str,
    pub audio_codec: &'static str,
}

impl RecordingFormat {
    pub const fn new(container: &'static str, video_codec: &'static str, audio_codec: &'static str) -> Self {
        Self {
            container,
            video_codec,
            audio_codec,
        }
    }

    pub fn mime(&self) -> String {
        format!("video/{};codecs={},{}", self.container, self.video_codec, self.audio_codec)
    }

    pub fn supports_alpha(&self) -> bool {
        self.container == "webm"
    }

    pub fn ffmpeg_video_encoder(&self) -> &'static str {
        match self.video_codec {
            "vp9" => "libvpx-vp9",
            "vp8" => "libvpx",
            "h264" => "libx264",
            other => other,
        }
    }

    pub fn ffmpeg_audio_encoder(&self) -> &'static str {
        match self.audio_codec {
            "opus" => "libopus",
            "vorbis" => "libvorbis",
            other => other,
        }
    }

    pub fn pix_fmt(&self, transparent: bool) -> &'static str {
        if transparent && self.supports_alpha() {
            "yuva420p"
        } else {
            "yuv420p"
        }
    }
}

/// Tried in order; the first one the host can encode wins.
pub const FORMAT_PREFERENCES: [RecordingFormat; 4] = [
    RecordingFormat::new("webm", "vp9", "opus"),
    RecordingFormat::new("webm", "vp8", "opus"),
    RecordingFormat::new("mp4", "h264", "aac"),
    RecordingFormat::new("webm", "vp8", "vorbis"),
];

/// Shape of the streams pushed into a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
    pub transparent: bool,
}

/// The finished recording.
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub extension: &'static str,
    pub format: RecordingFormat,
    pub width: u32,
    pub height: u32,
}

/// Where encoded output goes. Implementations own the actual codec work.
pub trait EncoderBackend: Send {
    fn supports(&mut self, format: &RecordingFormat) -> bool;
    fn open(&mut self, format: &RecordingFormat, spec: &StreamSpec) -> anyhow::Result<()>;
    fn write_video(&mut self, rgba: &[u8]) -> anyhow::Result<()>;
    fn write_audio(&mut self, samples: &[f32]) -> anyhow::Result<()>;
    /// Flush everything written so far and produce the artifact.
    fn finish(&mut self) -> anyhow::Result<Artifact>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Active,
    Finalizing,
}

impl SessionStatus {
    fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "already active",
            Self::Finalizing => "finalizing",
        }
    }
}

/// Pick the first preferred format the backend can encode. Transparent
/// output only considers formats that carry alpha.
pub fn select_format<B: EncoderBackend + ?Sized>(
    backend: &mut B,
    preferences: &[RecordingFormat],
    transparent: bool,
) -> Result<RecordingFormat> {
    let candidates: Vec<&RecordingFormat> = preferences
        .iter()
        .filter(|f| !transparent || f.supports_alpha())
        .collect();
    for format in &candidates {
        if backend.supports(format) {
            return Ok(**format);
        }
        log::debug!("Recording format {} not available", format.mime());
    }
    Err(EngineError::Capability {
        tried: candidates.iter().map(|f| f.mime()).collect(),
    })
}

/// One continuous recording. Its lifetime is independent of which audio is
/// feeding it: callers swap inputs on the mix, never restart the session.
pub struct RecordingSession<B: EncoderBackend> {
    backend: B,
    status: SessionStatus,
    format: Option<RecordingFormat>,
    frames: u64,
    samples: u64,
    failed: bool,
}

impl<B: EncoderBackend> RecordingSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            status: SessionStatus::Idle,
            format: None,
            frames: 0,
            samples: 0,
            failed: false,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn format(&self) -> Option<&RecordingFormat> {
        self.format.as_ref()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open the encoder stream in the first supported preferred format.
    pub fn start(&mut self, preferences: &[RecordingFormat], spec: StreamSpec) -> Result<RecordingFormat> {
        if self.status != SessionStatus::Idle {
            return Err(EngineError::SessionState(self.status.name()));
        }
        let format = select_format(&mut self.backend, preferences, spec.transparent)?;
        self.backend
            .open(&format, &spec)
            .map_err(|e| EngineError::EncoderWrite(format!("{:#}", e)))?;
        log::info!("Recording started as {}", format.mime());
        self.status = SessionStatus::Active;
        self.format = Some(format);
        self.frames = 0;
        self.samples = 0;
        self.failed = false;
        Ok(format)
    }

    pub fn push_frame(&mut self, rgba: &[u8]) -> Result<()> {
        if self.status != SessionStatus::Active {
            return Err(EngineError::SessionState(self.status.name()));
        }
        self.backend.write_video(rgba).map_err(|e| {
            self.failed = true;
            EngineError::EncoderWrite(format!("{:#}", e))
        })?;
        self.frames += 1;
        Ok(())
    }

    pub fn push_audio(&mut self, samples: &[f32]) -> Result<()> {
        if self.status != SessionStatus::Active {
            return Err(EngineError::SessionState(self.status.name()));
        }
        self.backend.write_audio(samples).map_err(|e| {
            self.failed = true;
            EngineError::EncoderWrite(format!("{:#}", e))
        })?;
        self.samples += samples.len() as u64;
        Ok(())
    }

    /// Flush and resolve the artifact. Also used after a write failure to
    /// salvage whatever was captured.
    pub fn stop(&mut self) -> Result<Artifact> {
        if self.status != SessionStatus::Active {
            return Err(EngineError::SessionState(self.status.name()));
        }
        self.status = SessionStatus::Finalizing;
        let result = self.backend.finish();
        self.status = SessionStatus::Idle;
        match result {
            Ok(artifact) => {
                log::info!(
                    "Recording finished: {} ({} frames{})",
                    artifact.path.display(),
                    self.frames,
                    if self.failed { ", after a write failure" } else { "" }
                );
                Ok(artifact)
            }
            Err(e) => Err(EngineError::EncoderWrite(format!("{:#}", e))),
        }
    }
}

/// Output file stem derived from the source audio name.
pub fn output_stem(audio: &std::path::Path) -> String {
    audio
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "recording".to_string())
}
