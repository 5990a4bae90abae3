use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::subtitle::{parse_auto, DurationPolicy, SubtitleCue};

pub const MAX_QUEUE_ROWS: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    Active,
    Done,
    Failed,
}

/// Which file of a queue row an update binds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowField {
    Audio,
    Subtitle,
    Cta,
}

#[derive(Clone, Debug)]
pub struct SongQueueItem {
    pub id: Uuid,
    pub audio: Option<PathBuf>,
    pub subtitle_path: Option<PathBuf>,
    pub subtitle_cues: Vec<SubtitleCue>,
    pub cta_video: Option<PathBuf>,
    pub song_name: String,
    pub status: ItemStatus,
}

impl SongQueueItem {
    fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            audio: None,
            subtitle_path: None,
            subtitle_cues: Vec::new(),
            cta_video: None,
            song_name: String::new(),
            status: ItemStatus::Pending,
        }
    }
}

/// Ordered list of songs rendered back to back into one recording.
/// Always holds between 1 and [`MAX_QUEUE_ROWS`] rows.
pub struct SongQueue {
    items: Vec<SongQueueItem>,
    policy: DurationPolicy,
}

impl Default for SongQueue {
    fn default() -> Self {
        Self::new(DurationPolicy::default())
    }
}

impl SongQueue {
    pub fn new(policy: DurationPolicy) -> Self {
        Self {
            items: vec![SongQueueItem::empty()],
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[SongQueueItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&SongQueueItem> {
        self.items.get(index)
    }

    pub fn set_status(&mut self, index: usize, status: ItemStatus) {
        if let Some(item) = self.items.get_mut(index) {
            item.status = status;
        }
    }

    /// Append an empty row and return its index.
    pub fn add_row(&mut self) -> Result<usize> {
        if self.items.len() >= MAX_QUEUE_ROWS {
            return Err(EngineError::QueueFull(MAX_QUEUE_ROWS));
        }
        self.items.push(SongQueueItem::empty());
        Ok(self.items.len() - 1)
    }

    /// Removing the only row clears it instead.
    pub fn remove_row(&mut self, index: usize) -> Result<()> {
        if index >= self.items.len() {
            return Err(EngineError::NoSuchRow(index));
        }
        if self.items.len() == 1 {
            self.items[0] = SongQueueItem::empty();
        } else {
            self.items.remove(index);
        }
        Ok(())
    }

    /// Bind `path` to one field of row `index`. Subtitle files are parsed
    /// immediately; the song name follows the audio file's stem.
    pub fn update_row(&mut self, index: usize, field: RowField, path: &Path) -> Result<()> {
        let policy = self.policy;
        let item = self.items.get_mut(index).ok_or(EngineError::NoSuchRow(index))?;
        if !path.exists() {
            return Err(EngineError::NotFound(path.to_path_buf()));
        }
        match field {
            RowField::Audio => {
                item.song_name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                item.audio = Some(path.to_path_buf());
            }
            RowField::Subtitle => {
                let text = std::fs::read_to_string(path)?;
                item.subtitle_cues = parse_auto(&text, policy);
                log::info!(
                    "Row {}: {} subtitle cues from {}",
                    index,
                    item.subtitle_cues.len(),
                    path.display()
                );
                item.subtitle_path = Some(path.to_path_buf());
            }
            RowField::Cta => item.cta_video = Some(path.to_path_buf()),
        }
        Ok(())
    }

    /// Bind already-parsed cues, e.g. when the format was given explicitly.
    pub fn set_cues(&mut self, index: usize, path: &Path, cues: Vec<SubtitleCue>) {
        if let Some(item) = self.items.get_mut(index) {
            item.subtitle_path = Some(path.to_path_buf());
            item.subtitle_cues = cues;
        }
    }

    /// Every row must have audio bound before a batch can start.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.audio.is_none())
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation { missing })
        }
    }

    /// Build a queue from a manifest of `[[song]]` tables (TOML, or JSON
    /// `{"song": [...]}` when the file ends in `.json`). Relative paths
    /// resolve against the manifest's directory.
    pub fn from_manifest(path: &Path, policy: DurationPolicy) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read batch manifest: {}", path.display()))?;
        let manifest: Manifest = if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid batch manifest: {}", path.display()))?
        } else {
            toml::from_str(&text).with_context(|| format!("Invalid batch manifest: {}", path.display()))?
        };
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_parsed(manifest, base, policy)
            .with_context(|| format!("Invalid batch manifest: {}", path.display()))
    }

    pub fn from_manifest_str(text: &str, base: &Path, policy: DurationPolicy) -> anyhow::Result<Self> {
        Self::from_parsed(toml::from_str(text)?, base, policy)
    }

    fn from_parsed(manifest: Manifest, base: &Path, policy: DurationPolicy) -> anyhow::Result<Self> {
        if manifest.song.is_empty() {
            anyhow::bail!("manifest lists no songs");
        }
        let mut queue = Self::new(policy);
        for (i, song) in manifest.song.into_iter().enumerate() {
            if i > 0 {
                queue.add_row()?;
            }
            let resolve = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
            // A missing audio file is left bound so the item fails at load
            // time and the rest of the batch still records.
            if let Some(audio) = song.audio.map(resolve) {
                if queue.update_row(i, RowField::Audio, &audio).is_err() {
                    log::warn!("Row {}: audio {} does not exist", i, audio.display());
                    queue.items[i].song_name = audio
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    queue.items[i].audio = Some(audio);
                }
            }
            if let Some(subs) = song.subtitles.map(resolve) {
                if let Err(err) = queue.update_row(i, RowField::Subtitle, &subs) {
                    log::warn!("Row {}: subtitles skipped: {}", i, err);
                }
            }
            if let Some(cta) = song.cta_video.map(resolve) {
                if let Err(err) = queue.update_row(i, RowField::Cta, &cta) {
                    log::warn!("Row {}: CTA video skipped: {}", i, err);
                }
            }
            if let Some(name) = song.name {
                queue.items[i].song_name = name;
            }
        }
        Ok(queue)
    }
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    song: Vec<ManifestSong>,
}

#[derive(Deserialize)]
struct ManifestSong {
    audio: Option<PathBuf>,
    subtitles: Option<PathBuf>,
    cta_video: Option<PathBuf>,
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn starts_with_one_row_and_caps_at_twenty() {
        let mut queue = SongQueue::default();
        assert_eq!(queue.len(), 1);
        for _ in 1..MAX_QUEUE_ROWS {
            queue.add_row().unwrap();
        }
        assert!(matches!(queue.add_row(), Err(EngineError::QueueFull(20))));
    }

    #[test]
    fn removing_the_last_row_resets_it() {
        let dir = tempfile::tempdir().unwrap();
        let song = touch(dir.path(), "a.mp3", "");
        let mut queue = SongQueue::default();
        queue.update_row(0, RowField::Audio, &song).unwrap();
        queue.remove_row(0).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(queue.get(0).unwrap().audio.is_none());
        assert!(matches!(queue.remove_row(3), Err(EngineError::NoSuchRow(3))));
    }

    #[test]
    fn update_binds_audio_and_parses_subtitles() {
        let dir = tempfile::tempdir().unwrap();
        let song = touch(dir.path(), "Night Drive.mp3", "");
        let subs = touch(dir.path(), "nd.txt", "[00:01.00] hello\n[00:03.00] world\n");
        let mut queue = SongQueue::default();
        queue.update_row(0, RowField::Audio, &song).unwrap();
        queue.update_row(0, RowField::Subtitle, &subs).unwrap();
        let item = queue.get(0).unwrap();
        assert_eq!(item.song_name, "Night Drive");
        assert_eq!(item.subtitle_cues.len(), 2);
        assert_eq!(item.subtitle_cues[0].end_time, 3.0);
        assert_eq!(item.subtitle_cues[1].end_time, 13.0);

        let missing = dir.path().join("nope.mp4");
        assert!(matches!(
            queue.update_row(0, RowField::Cta, &missing),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn validation_lists_rows_without_audio() {
        let dir = tempfile::tempdir().unwrap();
        let song = touch(dir.path(), "a.mp3", "");
        let mut queue = SongQueue::default();
        queue.add_row().unwrap();
        queue.add_row().unwrap();
        queue.update_row(0, RowField::Audio, &song).unwrap();
        queue.update_row(2, RowField::Audio, &song).unwrap();
        match queue.validate() {
            Err(EngineError::Validation { missing }) => assert_eq!(missing, vec![1]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn manifest_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "one.mp3", "");
        touch(dir.path(), "one.srt", "1\n00:00:01,000 --> 00:00:02,000\nhi\n\n");
        let text = r#"
            [[song]]
            audio = "one.mp3"
            subtitles = "one.srt"

            [[song]]
            audio = "two.mp3"
            name = "Second"
        "#;
        let queue = SongQueue::from_manifest_str(text, dir.path(), DurationPolicy::default()).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(0).unwrap().song_name, "one");
        assert_eq!(queue.get(0).unwrap().subtitle_cues.len(), 1);
        assert_eq!(queue.get(1).unwrap().audio.as_deref(), Some(dir.path().join("two.mp3").as_path()));
        assert_eq!(queue.get(1).unwrap().song_name, "Second");
        assert!(queue.validate().is_ok());
    }

    #[test]
    fn json_manifest_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.flac", "");
        let manifest = touch(
            dir.path(),
            "set.json",
            r#"{"song": [{"audio": "a.flac"}, {"audio": "b.flac", "name": "B"}]}"#,
        );
        let queue = SongQueue::from_manifest(&manifest, DurationPolicy::default()).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(0).unwrap().song_name, "a");
        assert_eq!(queue.get(1).unwrap().song_name, "B");

        let empty = touch(dir.path(), "empty.json", r#"{"song": []}"#);
        assert!(SongQueue::from_manifest(&empty, DurationPolicy::default()).is_err());
    }
}
