mod assets;
mod audio;
mod background;
mod batch;
mod cli;
mod config;
mod effects;
mod encode;
mod engine;
mod error;
mod media;
mod overlay;
mod render;
mod scene;
mod subtitle;
mod transition;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use background::BackgroundSpec;
use batch::{BatchObserver, BatchRunner, BatchState, DecodeLoader, Progress, RowField, RunnerOptions, SongQueue};
use cli::Cli;
use config::Config;
use effects::{EffectRegistry, VisualizationType};
use encode::{output_stem, FfmpegBackend, FORMAT_PREFERENCES};
use engine::Engine;
use overlay::text::MAX_TEXT_SLOTS;
use overlay::{CtaMode, TextOverlayConfig};
use render::text::load_font_from_url;
use render::TextRenderer;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_effects {
        let registry = EffectRegistry::standard();
        println!("Available visualizations:");
        for kind in VisualizationType::ALL {
            let marker = if registry.contains(kind) { "" } else { " (unavailable)" };
            println!("  {}{}", kind, marker);
        }
        return Ok(());
    }

    // Load config: explicit --config path, or auto-detect sonicreel.toml / global config
    let config_path = cli.config.clone().or_else(config::discover_config);
    let mut cfg = match config_path {
        Some(ref path) => match config::load_config(path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(err) if cli.config.is_some() => return Err(err),
            Err(err) => {
                log::warn!("{:#}", err);
                Config::default()
            }
        },
        None => Config::default(),
    };
    apply_cli(&cli, &mut cfg);

    if let Some(ref out) = cli.convert_subtitles {
        return convert_subtitles(&cfg, out);
    }

    let mut queue = build_queue(&cli, &cfg)?;

    let (width, height) = cfg.output.dimensions();
    log::info!("sonicreel - audio-reactive visualizer recorder");
    log::info!("Songs: {}", queue.len());
    log::info!("Resolution: {}x{} @ {}fps", width, height, cfg.output.fps);
    log::info!("Output directory: {}", cfg.recording.output_dir.display());

    let font = load_font(&cfg);
    let mut engine = Engine::new(&cfg, font)?;
    engine.prepare();

    let stem = queue
        .get(0)
        .and_then(|item| item.audio.as_deref())
        .map(output_stem)
        .unwrap_or_else(|| "recording".to_string());
    let backend = FfmpegBackend::new(&cfg.recording.output_dir, stem, cfg.recording.crf);
    let loader = DecodeLoader {
        fps: cfg.output.fps,
        settings: cfg.audio.analysis_settings(),
        cta_start: (cfg.cta.mode() == Some(CtaMode::Video)).then_some(cfg.cta.start_secs),
    };
    let options = RunnerOptions {
        formats: FORMAT_PREFERENCES.to_vec(),
        transparent: cfg.recording.transparent,
        transition: if queue.len() > 1 { cfg.recording.transition } else { None },
        cta_gain: cfg.cta.audio_gain,
    };

    let mut progress = CliProgress::new(estimate_frames(&queue, cfg.output.fps));
    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        if on_interrupt(&handler_stop) {
            std::process::exit(130);
        }
    })
    .context("Failed to install Ctrl-C handler")?;
    let mut runner =
        BatchRunner::new(engine, backend, Arc::new(loader), options).with_stop_handle(stop);
    let outcome = runner.run(&mut queue, &mut progress)?;
    progress.bar.finish_and_clear();
    if runner.stop_handle().load(Ordering::SeqCst) {
        let skipped = outcome
            .statuses
            .iter()
            .filter(|s| **s == batch::ItemStatus::Pending)
            .count();
        log::warn!("Stopped early; {} songs were not recorded", skipped);
    }

    match (outcome.state, outcome.artifact) {
        (BatchState::Completed, Some(artifact)) => {
            log::info!(
                "Done! {} frames written to {} ({}x{}, {})",
                outcome.frames,
                artifact.path.display(),
                artifact.width,
                artifact.height,
                artifact.format.mime()
            );
        }
        (BatchState::Aborted, Some(artifact)) => {
            log::warn!("Recording aborted; partial output kept at {}", artifact.path.display());
        }
        (state, _) => anyhow::bail!("Batch ended in {:?} without a recording", state),
    }
    let failed = outcome
        .statuses
        .iter()
        .filter(|s| **s == batch::ItemStatus::Failed)
        .count();
    if failed > 0 {
        log::warn!("{} of {} songs failed and were skipped", failed, outcome.statuses.len());
    }
    Ok(())
}

/// CLI values win over the config file unless they are at their defaults.
fn apply_cli(cli: &Cli, cfg: &mut Config) {
    if let Some(preset) = cli.resolution {
        cfg.output.preset = Some(preset);
    }
    if cli.width != 1920 || cli.height != 1080 {
        cfg.output.preset = None;
        cfg.output.width = cli.width;
        cfg.output.height = cli.height;
    }
    if cli.fps != 30 { cfg.output.fps = cli.fps; }
    if cli.crf != 31 { cfg.recording.crf = cli.crf; }
    if cli.sensitivity != 1.0 { cfg.audio.sensitivity = cli.sensitivity; }
    if cli.smoothing != 2 { cfg.audio.smoothing = cli.smoothing; }
    if cli.equalization != 0.0 { cfg.audio.equalization = cli.equalization; }
    if cli.output_dir.as_os_str() != "." {
        cfg.recording.output_dir = cli.output_dir.clone();
    }
    if cli.transparent {
        cfg.recording.transparent = true;
        cfg.background = BackgroundSpec::Transparent;
    }
    if !cli.effects.is_empty() {
        cfg.visual.effects = cli.effects.clone();
    }
    if let Some(palette) = cli.palette {
        cfg.visual.palette = palette;
    }
    if let Some(ref color) = cli.color {
        cfg.visual.custom_color = color.clone();
    }
    if let Some(ref image) = cli.image {
        cfg.visual.image = Some(image.clone());
    }
    if let Some(transition) = cli.transition {
        cfg.recording.transition = Some(transition);
    }
    if let Some(ref bg) = cli.background {
        cfg.background = background_from_arg(bg);
    }
    if cli.subtitles.is_some() {
        cfg.subtitle.file = cli.subtitles.clone();
    }
    if cli.subtitle_format.is_some() {
        cfg.subtitle.format = cli.subtitle_format;
    }
    if let Some(mode) = cli.subtitle_mode {
        cfg.subtitle.style.mode = mode;
    }
    if cli.vertical_subtitles {
        cfg.subtitle.style.orientation = overlay::SubtitleOrientation::Vertical;
    }
    if cli.title.is_some() || cli.artist.is_some() {
        cfg.intro.enabled = true;
        if let Some(ref title) = cli.title {
            cfg.intro.title = title.clone();
        }
        if let Some(ref artist) = cli.artist {
            cfg.intro.artist = artist.clone();
        }
    }
    if let Some(ref text) = cli.text {
        place_cli_text(&mut cfg.text, text);
    }
    if cli.watermark.is_some() || cli.watermark_image.is_some() {
        cfg.watermark.enabled = true;
        if let Some(ref text) = cli.watermark {
            cfg.watermark.text = text.clone();
        }
        if cli.watermark_image.is_some() {
            cfg.watermark.image = cli.watermark_image.clone();
        }
    }
    if let Some(position) = cli.watermark_position {
        cfg.watermark.position = position;
    }
    if let Some(kind) = cli.filter {
        cfg.filter.enabled = true;
        cfg.filter.kind = kind;
    }
    if cli.font.is_some() {
        cfg.output.font = cli.font.clone();
    }
    if cli.font_url.is_some() {
        cfg.output.font_url = cli.font_url.clone();
    }
}

/// `--text` fills the first blank slot, else a new one. With every slot
/// taken it replaces the first slot's text.
fn place_cli_text(slots: &mut Vec<TextOverlayConfig>, text: &str) {
    if let Some(slot) = slots.iter_mut().take(MAX_TEXT_SLOTS).find(|s| s.text.is_empty()) {
        slot.text = text.to_string();
        slot.enabled = true;
    } else if slots.len() < MAX_TEXT_SLOTS {
        slots.push(TextOverlayConfig {
            text: text.to_string(),
            ..Default::default()
        });
    } else {
        log::warn!(
            "All {} text overlay slots are configured; --text replaces {:?}",
            MAX_TEXT_SLOTS,
            slots[0].text
        );
        slots[0].text = text.to_string();
        slots[0].enabled = true;
    }
}

fn background_from_arg(arg: &str) -> BackgroundSpec {
    if arg.eq_ignore_ascii_case("transparent") {
        return BackgroundSpec::Transparent;
    }
    if arg.starts_with('#') {
        return BackgroundSpec::Color { color: arg.to_string() };
    }
    let ext = Path::new(arg)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "webm" | "mov" | "mkv" | "avi" => BackgroundSpec::Video { path: arg.into() },
        _ => BackgroundSpec::Image { path: arg.to_string() },
    }
}

/// A batch manifest, or a one-song queue from the input file.
fn build_queue(cli: &Cli, cfg: &Config) -> Result<SongQueue> {
    if let Some(ref manifest) = cli.batch {
        return SongQueue::from_manifest(manifest, cfg.subtitle.duration);
    }
    let input = cli.input.as_ref().context("Input audio file or --batch manifest is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    let mut queue = SongQueue::new(cfg.subtitle.duration);
    queue.update_row(0, RowField::Audio, input)?;
    if let Some(ref subs) = cfg.subtitle.file {
        match cfg.subtitle.format {
            Some(format) => {
                let text = std::fs::read_to_string(subs)
                    .with_context(|| format!("Failed to read subtitles: {}", subs.display()))?;
                let cues = subtitle::parse(&text, format, cfg.subtitle.duration);
                queue.set_cues(0, subs, cues);
            }
            None => queue.update_row(0, RowField::Subtitle, subs)?,
        }
    }
    if let Some(ref clip) = cfg.cta.video {
        queue.update_row(0, RowField::Cta, clip)?;
    }
    Ok(queue)
}

/// Re-encode the configured subtitle file as SRT or bracket text, chosen
/// by the output extension.
fn convert_subtitles(cfg: &Config, out: &Path) -> Result<()> {
    let input = cfg.subtitle.file.as_ref().context("No subtitle file given")?;
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read subtitles: {}", input.display()))?;
    let format = cfg.subtitle.format.unwrap_or_else(|| subtitle::detect_format(&text));
    let cues = subtitle::parse(&text, format, cfg.subtitle.duration);
    let to_srt = out
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("srt"));
    let converted = if to_srt { subtitle::to_srt(&cues) } else { subtitle::to_bracket(&cues) };
    std::fs::write(out, converted).with_context(|| format!("Failed to write {}", out.display()))?;
    log::info!("Wrote {} cues ({:?} input) to {}", cues.len(), format, out.display());
    Ok(())
}

fn load_font(cfg: &Config) -> Option<TextRenderer> {
    let bytes = cfg.output.font_url.as_deref().and_then(|url| match load_font_from_url(url) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            log::warn!("Failed to load font from URL: {:#}", err);
            None
        }
    });
    match TextRenderer::load(cfg.output.font.as_deref(), bytes.as_deref()) {
        Ok(font) => Some(font),
        Err(err) => {
            log::warn!("Text overlays disabled: {:#}", err);
            None
        }
    }
}

/// Total frames from container durations, for the progress bar.
fn estimate_frames(queue: &SongQueue, fps: u32) -> u64 {
    queue
        .items()
        .iter()
        .filter_map(|item| item.audio.as_deref())
        .filter_map(|path| audio::decode::probe_track(path).ok())
        .filter_map(|info| info.duration)
        .map(|secs| (secs * fps as f64).ceil() as u64)
        .sum()
}

/// First Ctrl-C asks the batch to finish its recording; a second one
/// returns `true` and the process exits without waiting.
fn on_interrupt(stop: &AtomicBool) -> bool {
    if stop.swap(true, Ordering::SeqCst) {
        log::warn!("Interrupted again, exiting without finalizing");
        return true;
    }
    log::warn!("Interrupted, finalizing the recording (Ctrl-C again to abort)");
    false
}

struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total_frames: u64) -> Self {
        let bar = ProgressBar::new(total_frames);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { bar }
    }
}

impl BatchObserver for CliProgress {
    fn progress(&mut self, progress: &Progress) {
        self.bar.set_message(format!(
            "song {}/{} {:?}",
            progress.index + 1,
            progress.total,
            progress.status
        ));
        log::debug!("{:?}", progress);
    }

    fn frame(&mut self, frames: u64) {
        if frames > self.bar.length().unwrap_or(0) {
            self.bar.set_length(frames);
        }
        self.bar.set_position(frames);
    }
}
