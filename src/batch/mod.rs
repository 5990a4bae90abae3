//! Back-to-back rendering of a song queue into one continuous recording.

pub mod queue;
pub mod runner;
pub mod scheduler;

pub use queue::{ItemStatus, RowField, SongQueue, SongQueueItem, MAX_QUEUE_ROWS};
pub use runner::{BatchObserver, BatchOutcome, BatchRunner, DecodeLoader, LoadedTrack, RunnerOptions, TrackLoader};
pub use scheduler::{BatchEvent, BatchScheduler, BatchState, Command, Progress};
