use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use tiny_skia::Pixmap;

use crate::audio::decode::AudioData;
use crate::audio::mix::OUTPUT_SAMPLE_RATE;
use crate::render::canvas::pixmap_from_rgba;

/// Frames decoded ahead of the render thread.
const READ_AHEAD: usize = 2;

/// Decodes a video file with ffmpeg into RGBA frames at the render size and
/// rate. Frames are produced on a reader thread; the render thread takes the
/// newest one available and keeps showing it when the reader falls behind.
pub struct VideoReader {
    child: Child,
    frames: Receiver<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    width: u32,
    height: u32,
    current: Option<Arc<Pixmap>>,
    ended: bool,
}

impl VideoReader {
    pub fn open(path: &Path, width: u32, height: u32, fps: u32, looping: bool) -> Result<Self> {
        let mut args: Vec<String> = Vec::new();
        if looping {
            args.extend(["-stream_loop".into(), "-1".into()]);
        }
        args.extend([
            "-i".into(),
            path.to_string_lossy().into_owned(),
            "-an".into(),
            "-vf".into(),
            format!(
                "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},fps={fps}",
                w = width,
                h = height,
                fps = fps
            ),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "pipe:1".into(),
        ]);

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin"])
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        let mut stdout = child.stdout.take().context("ffmpeg stdout not available")?;
        let frame_len = width as usize * height as usize * 4;
        let (tx, rx) = mpsc::sync_channel(READ_AHEAD);
        let reader = std::thread::spawn(move || loop {
            let mut buf = vec![0u8; frame_len];
            if stdout.read_exact(&mut buf).is_err() {
                break;
            }
            if tx.send(buf).is_err() {
                break;
            }
        });

        log::info!("Video reader started: {} ({}x{} @ {}fps)", path.display(), width, height, fps);

        Ok(Self {
            child,
            frames: rx,
            reader: Some(reader),
            width,
            height,
            current: None,
            ended: false,
        })
    }

    /// Advance by one tick. Returns the latest decoded frame, or the previous
    /// one when nothing new is ready.
    pub fn next_frame(&mut self) -> Option<Arc<Pixmap>> {
        match self.frames.try_recv() {
            Ok(rgba) => match pixmap_from_rgba(self.width, self.height, rgba) {
                Ok(pixmap) => self.current = Some(Arc::new(pixmap)),
                Err(err) => log::debug!("Dropped video frame: {}", err),
            },
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.ended = true,
        }
        self.current.clone()
    }

    /// Block until the first frame arrives so playback does not start on a
    /// placeholder.
    pub fn prime(&mut self) {
        if self.current.is_some() {
            return;
        }
        match self.frames.recv() {
            Ok(rgba) => {
                if let Ok(pixmap) = pixmap_from_rgba(self.width, self.height, rgba) {
                    self.current = Some(Arc::new(pixmap));
                }
            }
            Err(_) => self.ended = true,
        }
    }

    pub fn current(&self) -> Option<&Arc<Pixmap>> {
        self.current.as_ref()
    }

    pub fn ended(&self) -> bool {
        self.ended
    }
}

impl Drop for VideoReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

/// Extract the audio track of a video as mono samples at the mix rate.
/// Returns `Ok(None)` for silent videos.
pub fn extract_audio(path: &Path) -> Result<Option<AudioData>> {
    let output = Command::new("ffmpeg")
        .args(["-v", "error", "-nostdin", "-i"])
        .arg(path)
        .args(["-vn", "-ac", "1", "-ar"])
        .arg(OUTPUT_SAMPLE_RATE.to_string())
        .args(["-f", "f32le", "pipe:1"])
        .stdin(Stdio::null())
        .output()
        .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("does not contain any stream") || stderr.contains("Output file #0 does not contain") {
            return Ok(None);
        }
        anyhow::bail!("ffmpeg failed to extract audio from {}:\n{}", path.display(), stderr);
    }

    let samples = samples_from_f32le(&output.stdout);
    if samples.is_empty() {
        return Ok(None);
    }
    Ok(Some(AudioData {
        samples,
        sample_rate: OUTPUT_SAMPLE_RATE,
    }))
}

fn samples_from_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32le_ignores_trailing_partial_sample() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        bytes.push(0xff);
        assert_eq!(samples_from_f32le(&bytes), vec![0.5, -1.0]);
    }
}
