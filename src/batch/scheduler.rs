use super::queue::{ItemStatus, SongQueue};
use crate::error::{EngineError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Loading(usize),
    Playing(usize),
    Ending(usize),
    Finalizing,
    Completed,
    Aborted,
}

impl BatchState {
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Loading(i) | Self::Playing(i) | Self::Ending(i) => Some(i),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Between the recording start and the recording stop.
    pub fn is_running(self) -> bool {
        self.index().is_some()
    }
}

/// Inputs to the scheduler. Item-scoped events carry the index they were
/// raised for; events for any other item are stale and ignored.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchEvent {
    Loaded(usize),
    LoadFailed(usize, String),
    TrackEnded(usize),
    TransitionDone(usize),
    /// The recording could not be started; nothing was captured.
    StartFailed,
    Stop,
    Finalized,
    EncoderFailed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub index: usize,
    pub total: usize,
    pub status: ItemStatus,
    pub state: BatchState,
}

/// Side effects the runner must perform, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    StartRecording,
    Load(usize),
    Preload(usize),
    Play(usize),
    PlayTransition(usize),
    Report(Progress),
    StopRecording,
    /// Flush whatever was captured after an encoder failure.
    AbortRecording,
}

/// Batch lifecycle as a pure state machine.
pub struct BatchScheduler {
    state: BatchState,
    statuses: Vec<ItemStatus>,
    last_index: usize,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchScheduler {
    pub fn new() -> Self {
        Self {
            state: BatchState::Idle,
            statuses: Vec::new(),
            last_index: 0,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn statuses(&self) -> &[ItemStatus] {
        &self.statuses
    }

    pub fn total(&self) -> usize {
        self.statuses.len()
    }

    /// Validate the queue and enter `Loading(0)`. The recording starts in
    /// the same step.
    pub fn start(&mut self, queue: &SongQueue) -> Result<Vec<Command>> {
        if self.state.is_running() || self.state == BatchState::Finalizing {
            return Err(EngineError::SessionState("already active"));
        }
        queue.validate()?;
        self.statuses = vec![ItemStatus::Pending; queue.len()];
        log::info!("Batch started with {} songs", queue.len());
        let mut out = vec![Command::StartRecording];
        self.enter_loading(0, &mut out);
        Ok(out)
    }

    pub fn handle(&mut self, event: BatchEvent) -> Vec<Command> {
        let mut out = Vec::new();
        match (self.state, event) {
            (BatchState::Loading(i), BatchEvent::Loaded(j)) if i == j => {
                self.state = BatchState::Playing(i);
                out.push(Command::Play(i));
                if i + 1 < self.total() {
                    out.push(Command::Preload(i + 1));
                }
                out.push(self.report(i));
            }
            (BatchState::Loading(i), BatchEvent::LoadFailed(j, reason)) if i == j => {
                log::warn!("Skipping song {}: {}", i + 1, reason);
                self.statuses[i] = ItemStatus::Failed;
                out.push(self.report(i));
                self.advance(i, &mut out);
            }
            (BatchState::Playing(i), BatchEvent::TrackEnded(j)) if i == j => {
                self.statuses[i] = ItemStatus::Done;
                self.state = BatchState::Ending(i);
                out.push(Command::PlayTransition(i));
                out.push(self.report(i));
            }
            (BatchState::Ending(i), BatchEvent::TransitionDone(j)) if i == j => {
                self.advance(i, &mut out);
            }
            (state, BatchEvent::StartFailed) if state.is_running() => {
                self.state = BatchState::Idle;
                self.statuses.clear();
            }
            (state, BatchEvent::Stop) if state.is_running() => {
                log::info!("Batch stopped at song {}", self.last_index + 1);
                match state {
                    BatchState::Playing(i) => self.statuses[i] = ItemStatus::Done,
                    BatchState::Loading(i) => self.statuses[i] = ItemStatus::Pending,
                    _ => {}
                }
                self.enter_finalizing(&mut out);
            }
            (BatchState::Finalizing, BatchEvent::Finalized) => {
                self.state = BatchState::Completed;
                log::info!("Batch completed");
                out.push(self.report(self.last_index));
            }
            (state, BatchEvent::EncoderFailed(reason)) if state.is_running() || state == BatchState::Finalizing => {
                log::warn!("Recording failed: {}", reason);
                if let Some(i) = state.index() {
                    self.statuses[i] = ItemStatus::Failed;
                    out.push(Command::AbortRecording);
                }
                self.state = BatchState::Aborted;
                out.push(self.report(self.last_index));
            }
            (state, event) => log::debug!("Ignoring {:?} in {:?}", event, state),
        }
        out
    }

    fn enter_loading(&mut self, i: usize, out: &mut Vec<Command>) {
        self.state = BatchState::Loading(i);
        self.last_index = i;
        self.statuses[i] = ItemStatus::Active;
        out.push(Command::Load(i));
        out.push(self.report(i));
    }

    fn enter_finalizing(&mut self, out: &mut Vec<Command>) {
        self.state = BatchState::Finalizing;
        out.push(Command::StopRecording);
        out.push(self.report(self.last_index));
    }

    fn advance(&mut self, i: usize, out: &mut Vec<Command>) {
        if i + 1 < self.total() {
            self.enter_loading(i + 1, out);
        } else {
            self.enter_finalizing(out);
        }
    }

    fn report(&self, index: usize) -> Command {
        Command::Report(Progress {
            index,
            total: self.total(),
            status: self.statuses.get(index).copied().unwrap_or(ItemStatus::Pending),
            state: self.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::queue::RowField;
    use std::path::Path;

    fn queue(rows: usize, bound: &[usize], dir: &Path) -> SongQueue {
        let song = dir.join("song.mp3");
        std::fs::write(&song, "").unwrap();
        let mut q = SongQueue::default();
        for _ in 1..rows {
            q.add_row().unwrap();
        }
        for &i in bound {
            q.update_row(i, RowField::Audio, &song).unwrap();
        }
        q
    }

    fn has(cmds: &[Command], wanted: &Command) -> bool {
        cmds.iter().any(|c| c == wanted)
    }

    #[test]
    fn validation_blocks_start_without_recording() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(3, &[0, 2], dir.path());
        let mut sched = BatchScheduler::new();
        match sched.start(&q) {
            Err(EngineError::Validation { missing }) => assert_eq!(missing, vec![1]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sched.state(), BatchState::Idle);
    }

    #[test]
    fn recording_starts_with_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(2, &[0, 1], dir.path());
        let mut sched = BatchScheduler::new();
        let cmds = sched.start(&q).unwrap();
        assert_eq!(cmds[0], Command::StartRecording);
        assert_eq!(cmds[1], Command::Load(0));
        assert_eq!(sched.state(), BatchState::Loading(0));
    }

    #[test]
    fn failed_item_is_skipped_and_batch_completes() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(3, &[0, 1, 2], dir.path());
        let mut sched = BatchScheduler::new();
        sched.start(&q).unwrap();

        let cmds = sched.handle(BatchEvent::Loaded(0));
        assert!(has(&cmds, &Command::Play(0)));
        assert!(has(&cmds, &Command::Preload(1)));
        sched.handle(BatchEvent::TrackEnded(0));
        assert_eq!(sched.state(), BatchState::Ending(0));
        let cmds = sched.handle(BatchEvent::TransitionDone(0));
        assert!(has(&cmds, &Command::Load(1)));

        let cmds = sched.handle(BatchEvent::LoadFailed(1, "corrupt".into()));
        assert!(has(&cmds, &Command::Load(2)));
        assert!(!has(&cmds, &Command::StopRecording));

        sched.handle(BatchEvent::Loaded(2));
        sched.handle(BatchEvent::TrackEnded(2));
        let cmds = sched.handle(BatchEvent::TransitionDone(2));
        assert!(has(&cmds, &Command::StopRecording));
        assert_eq!(sched.state(), BatchState::Finalizing);
        sched.handle(BatchEvent::Finalized);
        assert_eq!(sched.state(), BatchState::Completed);
        assert_eq!(
            sched.statuses(),
            &[ItemStatus::Done, ItemStatus::Failed, ItemStatus::Done]
        );
    }

    #[test]
    fn stop_mid_item_finalizes_once() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(3, &[0, 1, 2], dir.path());
        let mut sched = BatchScheduler::new();
        sched.start(&q).unwrap();
        sched.handle(BatchEvent::Loaded(0));
        let cmds = sched.handle(BatchEvent::Stop);
        assert_eq!(cmds.iter().filter(|c| **c == Command::StopRecording).count(), 1);
        assert_eq!(sched.state(), BatchState::Finalizing);
        assert!(sched.handle(BatchEvent::Stop).is_empty());
        sched.handle(BatchEvent::Finalized);
        assert_eq!(sched.state(), BatchState::Completed);
    }

    #[test]
    fn stale_and_idle_events_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(2, &[0, 1], dir.path());
        let mut sched = BatchScheduler::new();
        assert!(sched.handle(BatchEvent::Stop).is_empty());
        sched.start(&q).unwrap();
        assert!(sched.handle(BatchEvent::Loaded(1)).is_empty());
        assert!(sched.handle(BatchEvent::TrackEnded(0)).is_empty());
        assert_eq!(sched.state(), BatchState::Loading(0));
    }

    #[test]
    fn encoder_failure_aborts_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(2, &[0, 1], dir.path());
        let mut sched = BatchScheduler::new();
        sched.start(&q).unwrap();
        sched.handle(BatchEvent::Loaded(0));
        let cmds = sched.handle(BatchEvent::EncoderFailed("disk full".into()));
        assert!(has(&cmds, &Command::AbortRecording));
        assert_eq!(sched.state(), BatchState::Aborted);
        assert!(sched.handle(BatchEvent::Stop).is_empty());
    }

    #[test]
    fn can_start_again_after_completion() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(1, &[0], dir.path());
        let mut sched = BatchScheduler::new();
        sched.start(&q).unwrap();
        assert!(sched.start(&q).is_err());
        sched.handle(BatchEvent::Stop);
        sched.handle(BatchEvent::Finalized);
        assert!(sched.start(&q).is_ok());
    }
}
