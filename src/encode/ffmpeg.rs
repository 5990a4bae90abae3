use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use super::session::{Artifact, EncoderBackend, RecordingFormat, StreamSpec};

/// Video-only ffmpeg process fed raw RGBA frames on stdin.
pub struct FfmpegEncoder {
    child: Child,
}

/// Argument list for the video pass. Logging is limited to errors with no
/// periodic stats, since stderr is only drained when the encoder finishes.
fn encoder_args(output_path: &Path, spec: &StreamSpec, format: &RecordingFormat, crf: u32) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-v".into(), "error".into(),
        "-nostats".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", spec.width, spec.height),
        "-framerate".into(), spec.fps.to_string(),
        "-i".into(), "pipe:0".into(),
        "-an".into(),
        "-c:v".into(), format.ffmpeg_video_encoder().into(),
        "-pix_fmt".into(), format.pix_fmt(spec.transparent).into(),
    ];
    match format.video_codec {
        "h264" => args.extend(["-crf".into(), crf.to_string(), "-preset".into(), "medium".into()]),
        // libvpx VP8 only honours crf in constrained quality mode, which
        // needs a bitrate ceiling.
        "vp8" => args.extend(["-crf".into(), crf.to_string(), "-b:v".into(), vp8_bitrate(spec)]),
        _ => args.extend(["-crf".into(), crf.to_string(), "-b:v".into(), "0".into()]),
    }
    args.push(output_path.to_string_lossy().into_owned());
    args
}

/// Roughly 0.1 bits per pixel, never below 500k.
fn vp8_bitrate(spec: &StreamSpec) -> String {
    let pixels_per_sec = spec.width as u64 * spec.height as u64 * spec.fps as u64;
    format!("{}k", (pixels_per_sec / 10_000).max(500))
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, spec: &StreamSpec, format: &RecordingFormat, crf: u32) -> Result<Self> {
        let args = encoder_args(output_path, spec, format, crf);

        let child = own_process_group(&mut Command::new("ffmpeg"))
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            spec.width, spec.height, spec.fps, format.ffmpeg_video_encoder()
        );

        Ok(Self { child })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg video pass complete");
        Ok(())
    }
}

/// Terminal Ctrl-C reaches only sonicreel; the stream is closed by `finish`.
fn own_process_group(cmd: &mut Command) -> &mut Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}

/// Names listed by `ffmpeg -encoders`.
fn available_encoders() -> Result<Vec<String>> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;
    Ok(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Encoder lines look like ` V....D libx264   libx264 H.264 ...`.
fn parse_encoder_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let flags = fields.next()?;
            let name = fields.next()?;
            let kind = flags.chars().next()?;
            (flags.len() == 6 && matches!(kind, 'V' | 'A') && name != "=").then(|| name.to_string())
        })
        .collect()
}

/// Recording backend writing through ffmpeg: video frames stream to a
/// temporary video-only file, audio spools to a temporary WAV, and `finish`
/// muxes both into the artifact.
pub struct FfmpegBackend {
    output_dir: PathBuf,
    stem: String,
    crf: u32,
    encoders: Option<Vec<String>>,
    open: Option<OpenStream>,
}

struct OpenStream {
    format: RecordingFormat,
    spec: StreamSpec,
    video: Option<FfmpegEncoder>,
    audio: Option<hound::WavWriter<std::io::BufWriter<std::fs::File>>>,
    scratch: tempfile::TempDir,
}

impl OpenStream {
    fn video_path(&self) -> PathBuf {
        self.scratch.path().join(format!("video.{}", self.format.container))
    }

    fn audio_path(&self) -> PathBuf {
        self.scratch.path().join("audio.wav")
    }
}

impl FfmpegBackend {
    pub fn new(output_dir: impl Into<PathBuf>, stem: impl Into<String>, crf: u32) -> Self {
        Self {
            output_dir: output_dir.into(),
            stem: stem.into(),
            crf,
            encoders: None,
            open: None,
        }
    }

    fn encoders(&mut self) -> &[String] {
        if self.encoders.is_none() {
            self.encoders = Some(available_encoders().unwrap_or_else(|err| {
                log::warn!("Could not list ffmpeg encoders: {:#}", err);
                Vec::new()
            }));
        }
        self.encoders.as_deref().unwrap_or(&[])
    }
}

impl EncoderBackend for FfmpegBackend {
    fn supports(&mut self, format: &RecordingFormat) -> bool {
        let encoders = self.encoders();
        let has = |name: &str| encoders.iter().any(|e| e == name);
        has(format.ffmpeg_video_encoder()) && has(format.ffmpeg_audio_encoder())
    }

    fn open(&mut self, format: &RecordingFormat, spec: &StreamSpec) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;
        let scratch = tempfile::Builder::new()
            .prefix("sonicreel-")
            .tempdir()
            .context("Failed to create scratch directory")?;
        let mut stream = OpenStream {
            format: *format,
            spec: *spec,
            video: None,
            audio: None,
            scratch,
        };
        stream.video = Some(FfmpegEncoder::new(&stream.video_path(), spec, format, self.crf)?);
        let wav = hound::WavSpec {
            channels: 1,
            sample_rate: spec.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        stream.audio = Some(
            hound::WavWriter::create(stream.audio_path(), wav).context("Failed to create audio spool")?,
        );
        self.open = Some(stream);
        Ok(())
    }

    fn write_video(&mut self, rgba: &[u8]) -> Result<()> {
        let encoder = self
            .open
            .as_mut()
            .and_then(|s| s.video.as_mut())
            .context("No open video stream")?;
        encoder.write_frame(rgba)
    }

    fn write_audio(&mut self, samples: &[f32]) -> Result<()> {
        let writer = self
            .open
            .as_mut()
            .and_then(|s| s.audio.as_mut())
            .context("No open audio spool")?;
        for &s in samples {
            writer.write_sample(s).context("Failed to spool audio")?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Artifact> {
        let mut stream = self.open.take().context("No open recording")?;
        let video_result = stream.video.take().map(FfmpegEncoder::finish).transpose();
        if let Some(writer) = stream.audio.take() {
            writer.finalize().context("Failed to finalize audio spool")?;
        }
        video_result?;

        let output = self
            .output_dir
            .join(format!("{}.{}", self.stem, stream.format.container));
        log::info!("Muxing audio into {}", output.display());
        let mux = own_process_group(&mut Command::new("ffmpeg"))
            .args(["-y", "-v", "error", "-i"])
            .arg(stream.video_path())
            .arg("-i")
            .arg(stream.audio_path())
            .args(["-c:v", "copy", "-c:a", stream.format.ffmpeg_audio_encoder()])
            .args(["-b:a", "192k"])
            .arg(&output)
            .stdin(Stdio::null())
            .output()
            .context("Failed to spawn ffmpeg for muxing")?;
        if !mux.status.success() {
            anyhow::bail!("FFmpeg mux failed:\n{}", String::from_utf8_lossy(&mux.stderr));
        }

        Ok(Artifact {
            path: output,
            extension: stream.format.container,
            format: stream.format,
            width: stream.spec.width,
            height: stream.spec.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_encoder_listing() {
        let listing = "Encoders:\n V..... = Video\n A..... = Audio\n ------\n V....D libx264              libx264 H.264\n V....D libvpx-vp9           libvpx VP9\n A....D libopus              libopus Opus\n A....D aac                  AAC (Advanced Audio Coding)\n";
        let names = parse_encoder_list(listing);
        assert_eq!(names, vec!["libx264", "libvpx-vp9", "libopus", "aac"]);
    }

    fn spec() -> StreamSpec {
        StreamSpec {
            width: 1920,
            height: 1080,
            fps: 30,
            sample_rate: 48_000,
            transparent: false,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn video_pass_keeps_stderr_quiet() {
        for format in crate::encode::FORMAT_PREFERENCES {
            let args = encoder_args(Path::new("out.webm"), &spec(), &format, 31);
            assert_eq!(value_after(&args, "-v"), Some("error"));
            assert!(args.iter().any(|a| a == "-nostats"));
            assert_eq!(args.last().map(String::as_str), Some("out.webm"));
        }
    }

    #[test]
    fn rate_control_per_codec() {
        let vp9 = encoder_args(Path::new("o.webm"), &spec(), &crate::encode::FORMAT_PREFERENCES[0], 31);
        assert_eq!(value_after(&vp9, "-b:v"), Some("0"));

        let vp8 = encoder_args(Path::new("o.webm"), &spec(), &crate::encode::FORMAT_PREFERENCES[1], 31);
        assert_eq!(value_after(&vp8, "-crf"), Some("31"));
        assert_eq!(value_after(&vp8, "-b:v"), Some("6220k"));

        let h264 = encoder_args(Path::new("o.mp4"), &spec(), &crate::encode::FORMAT_PREFERENCES[2], 23);
        assert_eq!(value_after(&h264, "-b:v"), None);
        assert_eq!(value_after(&h264, "-preset"), Some("medium"));
    }

    #[test]
    fn vp8_bitrate_has_a_floor() {
        let tiny = StreamSpec { width: 32, height: 18, fps: 10, ..spec() };
        assert_eq!(vp8_bitrate(&tiny), "500k");
    }
}
