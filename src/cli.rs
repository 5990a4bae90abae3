use clap::Parser;
use std::path::PathBuf;

use crate::config::ResolutionPreset;
use crate::overlay::{FilterKind, SubtitleMode, WatermarkPosition};
use crate::render::PaletteKind;
use crate::subtitle::SubtitleFormat;
use crate::transition::TransitionType;

#[derive(Parser, Debug)]
#[command(name = "sonicreel", about = "Audio-reactive visualizer video recorder")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Directory the recording is written to; the file is named after the audio
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Batch manifest (TOML [[song]] tables, or JSON) rendered into one recording
    #[arg(short, long, conflicts_with = "input")]
    pub batch: Option<PathBuf>,

    /// Config file (default: ./sonicreel.toml, then ~/.config/sonicreel/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Subtitle or lyrics file (bracket, SRT or LRC)
    #[arg(short, long)]
    pub subtitles: Option<PathBuf>,

    /// Subtitle format; detected from the text when omitted
    #[arg(long)]
    pub subtitle_format: Option<SubtitleFormat>,

    /// Subtitle display mode (classic, lyrics-scroll, word-by-word, sliding-group, fade-lines, partial-blur, none)
    #[arg(long)]
    pub subtitle_mode: Option<SubtitleMode>,

    /// Set single-line subtitles vertically, in columns down the right edge
    #[arg(long)]
    pub vertical_subtitles: bool,

    /// Visualizations to draw (comma-separated); more than one layers them
    #[arg(short, long, value_delimiter = ',')]
    pub effects: Vec<String>,

    /// Color palette (default, cyberpunk, sunset, glacier, lava, midnight, white, rainbow, custom)
    #[arg(short, long)]
    pub palette: Option<PaletteKind>,

    /// Base color for the custom palette, as #rrggbb
    #[arg(long)]
    pub color: Option<String>,

    /// Resolution preset (720p, 1080p, 4k, square-1080, square-4k, wide-4096, wide-1920, wide-1280)
    #[arg(short, long)]
    pub resolution: Option<ResolutionPreset>,

    /// Video width in pixels
    #[arg(long, default_value_t = 1920)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 1080)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Encoder CRF quality (lower = better)
    #[arg(long, default_value_t = 31)]
    pub crf: u32,

    /// Amplitude multiplier applied before drawing
    #[arg(long, default_value_t = 1.0)]
    pub sensitivity: f32,

    /// Temporal smoothing window in frames (0-10)
    #[arg(long, default_value_t = 2)]
    pub smoothing: u32,

    /// Treble tilt exponent (0 disables)
    #[arg(long, default_value_t = 0.0)]
    pub equalization: f32,

    /// Background: a #rrggbb color, "transparent", an image or a video file
    #[arg(long)]
    pub background: Option<String>,

    /// Transition played between songs of a batch
    #[arg(long)]
    pub transition: Option<TransitionType>,

    /// Title shown by the intro card
    #[arg(long)]
    pub title: Option<String>,

    /// Artist shown by the intro card
    #[arg(long)]
    pub artist: Option<String>,

    /// Custom text overlay
    #[arg(long)]
    pub text: Option<String>,

    /// Watermark text
    #[arg(long)]
    pub watermark: Option<String>,

    /// Watermark image, drawn instead of the text
    #[arg(long)]
    pub watermark_image: Option<String>,

    /// Watermark position (top-left, top-right, bottom-left, bottom-right, center)
    #[arg(long)]
    pub watermark_position: Option<WatermarkPosition>,

    /// Full-screen filter effect (snow, particles, stars, rain, cherry-blossom, lightning)
    #[arg(long)]
    pub filter: Option<FilterKind>,

    /// Image used by the photo-based visualizations
    #[arg(long)]
    pub image: Option<String>,

    /// Keep the background transparent (WebM output only)
    #[arg(long)]
    pub transparent: bool,

    /// Path to a TTF/OTF font
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// URL of a TTF/OTF font to download
    #[arg(long)]
    pub font_url: Option<String>,

    /// List available visualizations and exit
    #[arg(long)]
    pub list_effects: bool,

    /// Convert --subtitles to this file (.srt or bracket text) and exit
    #[arg(long, requires = "subtitles")]
    pub convert_subtitles: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_batch_invocation() {
        let cli = Cli::parse_from([
            "sonicreel",
            "--batch",
            "songs.toml",
            "-e",
            "radial-bars,vinyl-record",
            "--resolution",
            "square-1080",
            "--transition",
            "checkerboard",
            "--palette",
            "rainbow",
        ]);
        assert_eq!(cli.batch.as_deref(), Some(std::path::Path::new("songs.toml")));
        assert_eq!(cli.effects, vec!["radial-bars", "vinyl-record"]);
        assert_eq!(cli.resolution, Some(ResolutionPreset::Square1080));
        assert_eq!(cli.transition, Some(TransitionType::Checkerboard));
        assert_eq!(cli.palette, Some(PaletteKind::Rainbow));
        assert_eq!(cli.fps, 30);
    }

    #[test]
    fn batch_and_input_conflict() {
        assert!(Cli::try_parse_from(["sonicreel", "song.mp3", "--batch", "songs.toml"]).is_err());
    }
}
