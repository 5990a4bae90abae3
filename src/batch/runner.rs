use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;

use super::queue::{SongQueue, SongQueueItem};
use super::scheduler::{BatchEvent, BatchScheduler, BatchState, Command, Progress};
use super::ItemStatus;
use crate::audio::{decode, AnalysisSettings, AnalysisSource, AudioData, AudioMix, TrackAnalyzer};
use crate::encode::{Artifact, EncoderBackend, RecordingFormat, RecordingSession, StreamSpec};
use crate::engine::Engine;
use crate::error::Result;
use crate::media;
use crate::transition::TransitionType;

/// Everything needed to play one queue item.
pub struct LoadedTrack {
    pub audio: Arc<AudioData>,
    pub analysis: Box<dyn AnalysisSource>,
    /// Substitute CTA clip audio, already delayed to the CTA start.
    pub cta_audio: Option<Arc<AudioData>>,
}

/// Resolves a queue item into playable data. Runs on a worker thread.
pub trait TrackLoader: Send + Sync {
    fn load(&self, item: &SongQueueItem) -> anyhow::Result<LoadedTrack>;
}

/// Decodes audio with symphonia, analyses it and pulls CTA clip audio
/// through ffmpeg.
pub struct DecodeLoader {
    pub fps: u32,
    pub settings: AnalysisSettings,
    /// CTA start in item seconds when the substitute clip is in use.
    pub cta_start: Option<f64>,
}

impl TrackLoader for DecodeLoader {
    fn load(&self, item: &SongQueueItem) -> anyhow::Result<LoadedTrack> {
        let path = item.audio.as_deref().context("No audio bound")?;
        log::info!("Decoding {}", path.display());
        let audio = decode::decode_audio(path)?;
        log::info!(
            "Decoded {:.1}s at {} Hz",
            audio.duration(),
            audio.sample_rate
        );
        let analysis = TrackAnalyzer::new(&audio, self.fps, self.settings);

        let cta_audio = match (self.cta_start, item.cta_video.as_deref()) {
            (Some(start), Some(clip)) => match media::extract_audio(clip) {
                Ok(clip_audio) => clip_audio.map(|a| Arc::new(delayed(a, start))),
                Err(err) => {
                    log::warn!("CTA audio unavailable: {:#}", err);
                    None
                }
            },
            _ => None,
        };

        Ok(LoadedTrack {
            audio: Arc::new(audio),
            analysis: Box::new(analysis),
            cta_audio,
        })
    }
}

/// Prefix `secs` of silence.
fn delayed(mut audio: AudioData, secs: f64) -> AudioData {
    let pad = (secs.max(0.0) * audio.sample_rate as f64).round() as usize;
    if pad > 0 {
        let mut samples = vec![0.0; pad];
        samples.append(&mut audio.samples);
        audio.samples = samples;
    }
    audio
}

/// Receives progress updates from a running batch.
pub trait BatchObserver {
    fn progress(&mut self, _progress: &Progress) {}
    fn frame(&mut self, _frames: u64) {}
}

impl BatchObserver for () {}

pub struct RunnerOptions {
    pub formats: Vec<RecordingFormat>,
    pub transparent: bool,
    /// Played between songs; `None` cuts straight to the next one.
    pub transition: Option<TransitionType>,
    pub cta_gain: f32,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub state: BatchState,
    pub artifact: Option<Artifact>,
    pub statuses: Vec<ItemStatus>,
    pub frames: u64,
}

/// Load jobs in flight, keyed by queue index.
struct Loads {
    tx: Sender<(usize, anyhow::Result<LoadedTrack>)>,
    rx: Receiver<(usize, anyhow::Result<LoadedTrack>)>,
    workers: HashMap<usize, JoinHandle<()>>,
    ready: HashMap<usize, anyhow::Result<LoadedTrack>>,
}

impl Loads {
    fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            tx,
            rx,
            workers: HashMap::new(),
            ready: HashMap::new(),
        }
    }

    fn request(&mut self, index: usize, item: &SongQueueItem, loader: &Arc<dyn TrackLoader>) {
        if self.workers.contains_key(&index) || self.ready.contains_key(&index) {
            return;
        }
        let loader = Arc::clone(loader);
        let tx = self.tx.clone();
        let item = item.clone();
        let handle = std::thread::spawn(move || {
            let result = loader.load(&item);
            let _ = tx.send((index, result));
        });
        self.workers.insert(index, handle);
    }

    /// Block until item `index` has resolved. Returns `None` as soon as
    /// `stop` is raised.
    fn wait(&mut self, index: usize, stop: &AtomicBool) -> Option<anyhow::Result<LoadedTrack>> {
        loop {
            if stop.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(result) = self.ready.remove(&index) {
                if let Some(handle) = self.workers.remove(&index) {
                    let _ = handle.join();
                }
                return Some(result);
            }
            match self.rx.recv_timeout(Duration::from_millis(100)) {
                Ok((i, result)) => {
                    self.ready.insert(i, result);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let dead = self.workers.get(&index).map_or(true, JoinHandle::is_finished);
                    if dead && !self.ready.contains_key(&index) {
                        // A finished worker may still have a message queued.
                        if let Ok((i, result)) = self.rx.try_recv() {
                            self.ready.insert(i, result);
                            continue;
                        }
                        self.workers.remove(&index);
                        return Some(Err(anyhow::anyhow!("loader for item {} stopped without a result", index)));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Some(Err(anyhow::anyhow!("loader channel closed"))),
            }
        }
    }
}

/// Drives the engine, the audio mix and one recording session through a
/// whole batch, following the scheduler's commands.
pub struct BatchRunner<B: EncoderBackend> {
    engine: Engine,
    session: RecordingSession<B>,
    mix: AudioMix,
    loader: Arc<dyn TrackLoader>,
    scheduler: BatchScheduler,
    options: RunnerOptions,
    stop: Arc<AtomicBool>,
    current: Option<LoadedTrack>,
    tick: u64,
    artifact: Option<Artifact>,
}

impl<B: EncoderBackend> BatchRunner<B> {
    pub fn new(engine: Engine, backend: B, loader: Arc<dyn TrackLoader>, options: RunnerOptions) -> Self {
        Self {
            engine,
            session: RecordingSession::new(backend),
            mix: AudioMix::new(crate::audio::mix::OUTPUT_SAMPLE_RATE),
            loader,
            scheduler: BatchScheduler::new(),
            options,
            stop: Arc::new(AtomicBool::new(false)),
            current: None,
            tick: 0,
            artifact: None,
        }
    }

    /// Share an existing stop flag, e.g. one raised by a signal handler.
    pub fn with_stop_handle(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Set from any thread to finish the recording early.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn session(&self) -> &RecordingSession<B> {
        &self.session
    }

    pub fn run(&mut self, queue: &mut SongQueue, observer: &mut dyn BatchObserver) -> Result<BatchOutcome> {
        self.stop.store(false, Ordering::SeqCst);
        self.artifact = None;
        let mut loads = Loads::new();
        let mut pending: VecDeque<Command> = self.scheduler.start(queue)?.into();

        loop {
            while let Some(command) = pending.pop_front() {
                for event in self.execute(command, queue, &mut loads, observer)? {
                    pending.extend(self.scheduler.handle(event));
                }
            }

            let state = self.scheduler.state();
            if state.is_terminal() || state == BatchState::Idle {
                break;
            }
            if self.stop.load(Ordering::SeqCst) {
                pending.extend(self.scheduler.handle(BatchEvent::Stop));
                continue;
            }

            let event = match state {
                BatchState::Loading(i) => Some(match loads.wait(i, &self.stop) {
                    Some(Ok(track)) => {
                        self.current = Some(track);
                        BatchEvent::Loaded(i)
                    }
                    Some(Err(err)) => BatchEvent::LoadFailed(i, format!("{:#}", err)),
                    None => BatchEvent::Stop,
                }),
                BatchState::Playing(i) => self.play_tick(i, observer),
                BatchState::Ending(i) => self.transition_tick(i, observer),
                _ => None,
            };
            if let Some(event) = event {
                pending.extend(self.scheduler.handle(event));
            }
        }

        self.current = None;
        self.mix.set_main(None);
        self.mix.set_aux(None, 0.0);
        self.engine.release();
        Ok(BatchOutcome {
            state: self.scheduler.state(),
            artifact: self.artifact.take(),
            statuses: self.scheduler.statuses().to_vec(),
            frames: self.session.frames(),
        })
    }

    fn execute(
        &mut self,
        command: Command,
        queue: &mut SongQueue,
        loads: &mut Loads,
        observer: &mut dyn BatchObserver,
    ) -> Result<Vec<BatchEvent>> {
        let mut events = Vec::new();
        match command {
            Command::StartRecording => {
                let spec = StreamSpec {
                    width: self.engine.width(),
                    height: self.engine.height(),
                    fps: self.engine.fps(),
                    sample_rate: self.mix.sample_rate(),
                    transparent: self.options.transparent,
                };
                if let Err(err) = self.session.start(&self.options.formats, spec) {
                    self.scheduler.handle(BatchEvent::StartFailed);
                    return Err(err);
                }
            }
            Command::Load(i) | Command::Preload(i) => {
                if let Some(item) = queue.get(i) {
                    loads.request(i, item, &self.loader);
                }
            }
            Command::Play(i) => {
                if let (Some(track), Some(item)) = (self.current.as_ref(), queue.get(i)) {
                    log::info!("Playing {}/{}: {}", i + 1, queue.len(), item.song_name);
                    self.mix.set_main(Some(Arc::clone(&track.audio)));
                    self.mix.set_aux(track.cta_audio.clone(), self.options.cta_gain);
                    self.engine.begin_item(item.subtitle_cues.clone(), item.cta_video.clone());
                    self.tick = 0;
                }
            }
            Command::PlayTransition(i) => match self.options.transition {
                Some(kind) => self.engine.start_transition(kind),
                None => events.push(BatchEvent::TransitionDone(i)),
            },
            Command::Report(progress) => {
                queue.set_status(progress.index, progress.status);
                observer.progress(&progress);
            }
            Command::StopRecording => {
                self.mix.set_main(None);
                self.engine.release();
                match self.session.stop() {
                    Ok(artifact) => {
                        self.artifact = Some(artifact);
                        events.push(BatchEvent::Finalized);
                    }
                    Err(err) => events.push(BatchEvent::EncoderFailed(err.to_string())),
                }
            }
            Command::AbortRecording => match self.session.stop() {
                Ok(artifact) => {
                    log::warn!("Kept partial recording {}", artifact.path.display());
                    self.artifact = Some(artifact);
                }
                Err(err) => log::warn!("Could not flush recording: {}", err),
            },
        }
        Ok(events)
    }

    fn play_tick(&mut self, index: usize, observer: &mut dyn BatchObserver) -> Option<BatchEvent> {
        let frame = self.current.as_ref().and_then(|t| t.analysis.frame(self.tick));
        let item_time = self.tick as f64 / self.engine.fps() as f64;
        self.tick += 1;
        if let Some(failure) = self.capture(frame.as_ref(), item_time, observer) {
            return Some(failure);
        }
        self.mix.main_finished().then_some(BatchEvent::TrackEnded(index))
    }

    /// The previous song's visuals keep rendering idle under the transition.
    fn transition_tick(&mut self, index: usize, observer: &mut dyn BatchObserver) -> Option<BatchEvent> {
        let item_time = self.tick as f64 / self.engine.fps() as f64;
        self.tick += 1;
        if let Some(failure) = self.capture(None, item_time, observer) {
            return Some(failure);
        }
        (!self.engine.transition_active()).then_some(BatchEvent::TransitionDone(index))
    }

    /// Render one tick and push it with its audio into the recording.
    fn capture(
        &mut self,
        frame: Option<&crate::audio::AnalysisFrame>,
        item_time: f64,
        observer: &mut dyn BatchObserver,
    ) -> Option<BatchEvent> {
        let rgba = self.engine.render(frame, item_time).to_rgba();
        let samples = self.mix.pull_tick(self.engine.fps());
        let pushed = self
            .session
            .push_frame(&rgba)
            .and_then(|()| self.session.push_audio(&samples));
        match pushed {
            Ok(()) => {
                observer.frame(self.session.frames());
                None
            }
            Err(err) => Some(BatchEvent::EncoderFailed(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::queue::RowField;
    use crate::config::Config;
    use crate::encode::session::testing::MemoryBackend;
    use crate::encode::FORMAT_PREFERENCES;
    use crate::error::EngineError;
    use std::path::Path;

    const RATE: u32 = 48_000;

    /// Half a second of tone per item; items whose file name contains
    /// "bad" fail to load.
    struct ToneLoader;

    impl TrackLoader for ToneLoader {
        fn load(&self, item: &SongQueueItem) -> anyhow::Result<LoadedTrack> {
            let path = item.audio.as_deref().context("No audio bound")?;
            if path.to_string_lossy().contains("bad") {
                anyhow::bail!("unsupported codec");
            }
            let audio = AudioData {
                samples: (0..RATE / 2).map(|i| (i as f32 * 0.3).sin() * 0.5).collect(),
                sample_rate: RATE,
            };
            let analysis = TrackAnalyzer::new(&audio, 10, AnalysisSettings::default());
            Ok(LoadedTrack {
                audio: Arc::new(audio),
                analysis: Box::new(analysis),
                cta_audio: None,
            })
        }
    }

    fn engine() -> Engine {
        let mut cfg = Config::default();
        cfg.output.width = 32;
        cfg.output.height = 18;
        cfg.output.fps = 10;
        Engine::new(&cfg, None).unwrap()
    }

    fn options(transition: Option<TransitionType>) -> RunnerOptions {
        RunnerOptions {
            formats: FORMAT_PREFERENCES.to_vec(),
            transparent: false,
            transition,
            cta_gain: 1.0,
        }
    }

    fn queue(dir: &Path, names: &[&str]) -> SongQueue {
        let mut q = SongQueue::default();
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                q.add_row().unwrap();
            }
            let path = dir.join(name);
            std::fs::write(&path, "").unwrap();
            q.update_row(i, RowField::Audio, &path).unwrap();
        }
        q
    }

    #[derive(Default)]
    struct Log {
        progress: Vec<Progress>,
        frames: u64,
    }

    impl BatchObserver for Log {
        fn progress(&mut self, progress: &Progress) {
            self.progress.push(*progress);
        }

        fn frame(&mut self, frames: u64) {
            self.frames = frames;
        }
    }

    #[test]
    fn batch_records_one_continuous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = queue(dir.path(), &["a.mp3", "b.mp3"]);
        let mut runner = BatchRunner::new(engine(), MemoryBackend::all_formats(), Arc::new(ToneLoader), options(None));
        let mut log = Log::default();
        let outcome = runner.run(&mut q, &mut log).unwrap();

        assert_eq!(outcome.state, BatchState::Completed);
        assert!(outcome.artifact.is_some());
        assert_eq!(outcome.statuses, vec![ItemStatus::Done, ItemStatus::Done]);
        let backend = runner.session().backend();
        assert_eq!(backend.opened, 1);
        assert_eq!(backend.finished, 1);
        // 0.5s per song at 10 fps.
        assert_eq!(outcome.frames, 10);
        assert_eq!(log.frames, 10);
        assert_eq!(backend.audio.len(), 10 * 4800);
        assert_eq!(q.get(1).unwrap().status, ItemStatus::Done);
        assert!(log.progress.iter().any(|p| p.index == 1 && p.total == 2));
    }

    #[test]
    fn failed_load_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = queue(dir.path(), &["a.mp3", "bad.mp3", "c.mp3"]);
        let mut runner = BatchRunner::new(
            engine(),
            MemoryBackend::all_formats(),
            Arc::new(ToneLoader),
            options(Some(TransitionType::Fade)),
        );
        let outcome = runner.run(&mut q, &mut ()).unwrap();
        assert_eq!(outcome.state, BatchState::Completed);
        assert_eq!(
            outcome.statuses,
            vec![ItemStatus::Done, ItemStatus::Failed, ItemStatus::Done]
        );
        assert_eq!(runner.session().backend().finished, 1);
        // Two songs plus two 0.8s fades.
        assert!((10 + 14..=10 + 18).contains(&outcome.frames), "{} frames", outcome.frames);
    }

    #[test]
    fn stop_mid_item_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = queue(dir.path(), &["a.mp3", "b.mp3", "c.mp3"]);
        let stop = Arc::new(AtomicBool::new(false));
        let backend = MemoryBackend {
            stop_after: Some((3, Arc::clone(&stop))),
            ..MemoryBackend::all_formats()
        };
        let mut runner =
            BatchRunner::new(engine(), backend, Arc::new(ToneLoader), options(None)).with_stop_handle(stop);

        let outcome = runner.run(&mut q, &mut ()).unwrap();
        assert_eq!(outcome.state, BatchState::Completed);
        assert_eq!(outcome.frames, 3);
        assert!(outcome.artifact.is_some());
        assert_eq!(runner.session().backend().finished, 1);
        assert_eq!(outcome.statuses[0], ItemStatus::Done);
        assert_eq!(outcome.statuses[1], ItemStatus::Pending);
    }

    /// Holds back item `b` until the observer sees it loading, then raises
    /// the stop flag before handing the track over.
    struct StopWhileLoading {
        gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
        stop: Arc<AtomicBool>,
    }

    impl TrackLoader for StopWhileLoading {
        fn load(&self, item: &SongQueueItem) -> anyhow::Result<LoadedTrack> {
            if item.song_name == "b" {
                let gate = self.gate.lock().unwrap();
                gate.recv()?;
                self.stop.store(true, Ordering::SeqCst);
            }
            ToneLoader.load(item)
        }
    }

    struct OpenGateOn {
        state: BatchState,
        gate: Sender<()>,
    }

    impl BatchObserver for OpenGateOn {
        fn progress(&mut self, progress: &Progress) {
            if progress.state == self.state {
                let _ = self.gate.send(());
            }
        }
    }

    #[test]
    fn stop_while_loading_returns_item_to_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = queue(dir.path(), &["a.mp3", "b.mp3", "c.mp3"]);
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = channel();
        let loader = StopWhileLoading {
            gate: std::sync::Mutex::new(rx),
            stop: Arc::clone(&stop),
        };
        let mut runner = BatchRunner::new(engine(), MemoryBackend::all_formats(), Arc::new(loader), options(None))
            .with_stop_handle(stop);
        let mut observer = OpenGateOn {
            state: BatchState::Loading(1),
            gate: tx,
        };

        let outcome = runner.run(&mut q, &mut observer).unwrap();
        assert_eq!(outcome.state, BatchState::Completed);
        assert_eq!(
            outcome.statuses,
            vec![ItemStatus::Done, ItemStatus::Pending, ItemStatus::Pending]
        );
        // Only the first song was recorded.
        assert_eq!(outcome.frames, 5);
        assert!(outcome.artifact.is_some());
        assert_eq!(runner.session().backend().finished, 1);
    }

    #[test]
    fn missing_capability_blocks_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = queue(dir.path(), &["a.mp3"]);
        let mut runner = BatchRunner::new(engine(), MemoryBackend::default(), Arc::new(ToneLoader), options(None));
        assert!(matches!(
            runner.run(&mut q, &mut ()),
            Err(EngineError::Capability { .. })
        ));
        assert_eq!(runner.session().backend().opened, 0);
        assert_eq!(runner.scheduler.state(), BatchState::Idle);
    }

    #[test]
    fn encoder_failure_aborts_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = queue(dir.path(), &["a.mp3", "b.mp3"]);
        let backend = MemoryBackend {
            fail_after: Some(2),
            ..MemoryBackend::all_formats()
        };
        let mut runner = BatchRunner::new(engine(), backend, Arc::new(ToneLoader), options(None));
        let outcome = runner.run(&mut q, &mut ()).unwrap();
        assert_eq!(outcome.state, BatchState::Aborted);
        assert!(outcome.artifact.is_some());
        assert_eq!(runner.session().backend().frames.len(), 2);
        assert_eq!(outcome.statuses[0], ItemStatus::Failed);
    }

    #[test]
    fn validation_error_starts_nothing() {
        let mut q = SongQueue::default();
        let mut runner = BatchRunner::new(engine(), MemoryBackend::all_formats(), Arc::new(ToneLoader), options(None));
        assert!(matches!(
            runner.run(&mut q, &mut ()),
            Err(EngineError::Validation { .. })
        ));
        assert_eq!(runner.session().backend().opened, 0);
    }

    #[test]
    fn delay_pads_silence() {
        let audio = AudioData {
            samples: vec![1.0; 4],
            sample_rate: 10,
        };
        let out = delayed(audio, 0.5);
        assert_eq!(out.samples, vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
    }
}
