use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tiny_skia::Color;

use crate::assets::AssetCache;
use crate::media::VideoReader;
use crate::render::canvas::cover_rect;
use crate::render::palette::{color, parse_hex};
use crate::render::Canvas;
use crate::transition::{ActiveTransition, TransitionType};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackgroundSpec {
    Color { color: String },
    Transparent,
    Image { path: String },
    Video { path: PathBuf },
    Slideshow {
        images: Vec<String>,
        #[serde(default = "default_interval")]
        interval_secs: f64,
        #[serde(default)]
        transition: Option<TransitionType>,
    },
}

fn default_interval() -> f64 {
    5.0
}

impl Default for BackgroundSpec {
    fn default() -> Self {
        Self::Color {
            color: "#000000".into(),
        }
    }
}

impl BackgroundSpec {
    /// Image sources the asset cache should start decoding.
    pub fn image_sources(&self) -> Vec<&str> {
        match self {
            Self::Image { path } => vec![path.as_str()],
            Self::Slideshow { images, .. } => images.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_transparent(&self) -> bool {
        matches!(self, Self::Transparent)
    }
}

/// Which slide is showing at `time` and whether a boundary transition is
/// still playing.
pub(crate) fn slide_at(time: f64, count: usize, interval: f64) -> (usize, Option<f64>) {
    if count == 0 || interval <= 0.0 {
        return (0, None);
    }
    let step = (time.max(0.0) / interval).floor() as usize;
    let boundary = (step > 0).then(|| step as f64 * interval);
    (step % count, boundary)
}

/// The bottom layer of every frame.
pub struct Background {
    spec: BackgroundSpec,
    fill: Color,
    video: Option<VideoReader>,
}

impl Background {
    pub fn new(spec: BackgroundSpec, width: u32, height: u32, fps: u32) -> Self {
        let fill = match &spec {
            BackgroundSpec::Color { color: hex } => match parse_hex(hex) {
                Some(rgb) => color(rgb, 1.0),
                None => {
                    log::warn!("Unrecognised background color '{}', using black", hex);
                    Color::BLACK
                }
            },
            BackgroundSpec::Transparent => Color::TRANSPARENT,
            _ => Color::BLACK,
        };
        let video = match &spec {
            BackgroundSpec::Video { path } => match VideoReader::open(path, width, height, fps, true) {
                Ok(mut reader) => {
                    reader.prime();
                    Some(reader)
                }
                Err(err) => {
                    log::warn!("Background video unavailable: {:#}", err);
                    None
                }
            },
            _ => None,
        };
        Self { spec, fill, video }
    }

    pub fn spec(&self) -> &BackgroundSpec {
        &self.spec
    }

    /// Paint the background for output time `time`. Images still decoding
    /// leave the fill color showing.
    pub fn draw(&mut self, canvas: &mut Canvas, time: f64, frame_index: u64, assets: &AssetCache) {
        canvas.clear(self.fill);
        let (w, h) = (canvas.width(), canvas.height());

        match &self.spec {
            BackgroundSpec::Color { .. } | BackgroundSpec::Transparent => {}
            BackgroundSpec::Image { path } => {
                if let Some(image) = assets.get(path) {
                    let (x, y, dw, dh) = cover_rect(image.width() as f32, image.height() as f32, w, h);
                    canvas.draw_image(image, x, y, dw, dh);
                }
            }
            BackgroundSpec::Video { .. } => {
                if let Some(frame) = self.video.as_mut().and_then(VideoReader::next_frame) {
                    canvas.draw_image(&frame, 0.0, 0.0, w, h);
                }
            }
            BackgroundSpec::Slideshow {
                images,
                interval_secs,
                transition,
            } => {
                let (index, boundary) = slide_at(time, images.len(), *interval_secs);
                if let Some(image) = images.get(index).and_then(|src| assets.get(src)) {
                    let (x, y, dw, dh) = cover_rect(image.width() as f32, image.height() as f32, w, h);
                    canvas.draw_image(image, x, y, dw, dh);
                }
                if let (Some(kind), Some(start)) = (transition, boundary) {
                    ActiveTransition::new(*kind, start).draw(canvas, time, frame_index);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slideshow_cycles_and_reports_boundaries() {
        assert_eq!(slide_at(0.0, 3, 5.0), (0, None));
        assert_eq!(slide_at(4.9, 3, 5.0), (0, None));
        assert_eq!(slide_at(5.2, 3, 5.0), (1, Some(5.0)));
        assert_eq!(slide_at(16.0, 3, 5.0), (0, Some(15.0)));
        assert_eq!(slide_at(3.0, 0, 5.0), (0, None));
    }

    #[test]
    fn spec_deserializes_from_toml() {
        let spec: BackgroundSpec = toml::from_str(
            r#"
kind = "slideshow"
images = ["a.png", "b.png"]
transition = "checkerboard"
"#,
        )
        .unwrap();
        assert_eq!(spec.image_sources(), vec!["a.png", "b.png"]);
        match spec {
            BackgroundSpec::Slideshow { interval_secs, transition, .. } => {
                assert_eq!(interval_secs, 5.0);
                assert_eq!(transition, Some(TransitionType::Checkerboard));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn color_fill_paints_every_pixel() {
        let mut bg = Background::new(BackgroundSpec::Color { color: "#ff0000".into() }, 8, 8, 30);
        let mut canvas = Canvas::new(8, 8).unwrap();
        bg.draw(&mut canvas, 0.0, 0, &AssetCache::new());
        assert!(canvas.pixmap().data().chunks_exact(4).all(|px| px == [255, 0, 0, 255]));
    }

    #[test]
    fn transparent_leaves_alpha_zero() {
        let mut bg = Background::new(BackgroundSpec::Transparent, 4, 4, 30);
        let mut canvas = Canvas::new(4, 4).unwrap();
        bg.draw(&mut canvas, 1.0, 30, &AssetCache::new());
        assert!(canvas.pixmap().data().iter().all(|&b| b == 0));
    }
}
