use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::model::{Clip, TimelineState};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EditOperation {
    Add,
    Update,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClipEditRecord {
    pub match_id: String,
    pub player_id: String,
    pub operation_type: EditOperation,
    pub clip_id: String,
    pub track_id: String,
    pub clip_data: Option<Clip>,
    pub previous_data: Option<Clip>,
    pub timestamp: DateTime<Utc>,
}

impl ClipEditRecord {
    #[must_use]
    pub fn add(match_id: &str, player_id: &str, track_id: &str, clip: Clip) -> Self {
        Self::new(
            match_id,
            player_id,
            track_id,
            EditOperation::Add,
            Some(clip),
            None,
        )
    }

    #[must_use]
    pub fn update(
        match_id: &str,
        player_id: &str,
        track_id: &str,
        previous: Clip,
        current: Clip,
    ) -> Self {
        Self::new(
            match_id,
            player_id,
            track_id,
            EditOperation::Update,
            Some(current),
            Some(previous),
        )
    }

    #[must_use]
    pub fn remove(match_id: &str, player_id: &str, track_id: &str, previous: Clip) -> Self {
        Self::new(
            match_id,
            player_id,
            track_id,
            EditOperation::Remove,
            None,
            Some(previous),
        )
    }

    fn new(
        match_id: &str,
        player_id: &str,
        track_id: &str,
        operation_type: EditOperation,
        clip_data: Option<Clip>,
        previous_data: Option<Clip>,
    ) -> Self {
        let clip_id = clip_data
            .as_ref()
            .or(previous_data.as_ref())
            .map(|clip| clip.id().to_string())
            .unwrap_or_default();
        Self {
            match_id: match_id.to_string(),
            player_id: player_id.to_string(),
            operation_type,
            clip_id,
            track_id: track_id.to_string(),
            clip_data,
            previous_data,
            timestamp: Utc::now(),
        }
    }
}

pub trait MatchStore: Send + Sync {
    fn load_timeline(&self, match_id: &str) -> Result<Option<TimelineState>>;
    fn save_timeline(&self, match_id: &str, timeline: &TimelineState) -> Result<()>;
    fn append_edit(&self, record: &ClipEditRecord) -> Result<()>;
    fn edit_history(&self, match_id: &str, limit: Option<usize>) -> Result<Vec<ClipEditRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    timelines: RwLock<HashMap<String, TimelineState>>,
    edits: RwLock<HashMap<String, Vec<ClipEditRecord>>>,
}

impl InMemoryMatchStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for InMemoryMatchStore {
    fn load_timeline(&self, match_id: &str) -> Result<Option<TimelineState>> {
        Ok(self.timelines.read().get(match_id).cloned())
    }

    fn save_timeline(&self, match_id: &str, timeline: &TimelineState) -> Result<()> {
        self.timelines
            .write()
            .insert(match_id.to_string(), timeline.clone());
        Ok(())
    }

    fn append_edit(&self, record: &ClipEditRecord) -> Result<()> {
        self.edits
            .write()
            .entry(record.match_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn edit_history(&self, match_id: &str, limit: Option<usize>) -> Result<Vec<ClipEditRecord>> {
        let edits = self.edits.read();
        let records = edits.get(match_id).map_or(&[][..], Vec::as_slice);
        Ok(newest_first(records.iter().cloned(), limit))
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileMatchStore {
    root: PathBuf,
}

impl JsonFileMatchStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create match store: {}", root.display()))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn timeline_path(&self, match_id: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(format!("{}.timeline.json", checked_match_id(match_id)?)))
    }

    fn edits_path(&self, match_id: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(format!("{}.edits.jsonl", checked_match_id(match_id)?)))
    }
}

fn checked_match_id(match_id: &str) -> Result<&str> {
    let valid = !match_id.is_empty()
        && match_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(match_id)
    } else {
        Err(anyhow::anyhow!("invalid match id: {match_id:?}"))
    }
}

impl MatchStore for JsonFileMatchStore {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn load_timeline(&self, match_id: &str) -> Result<Option<TimelineState>> {
        let path = self.timeline_path(match_id)?;
        if !path.is_file() {
            debug!("no stored timeline");
            return Ok(None);
        }

        let content = fs::read(&path)
            .with_context(|| format!("failed to read timeline: {}", path.display()))?;
        let timeline: TimelineState = serde_json::from_slice(&content)
            .with_context(|| format!("invalid timeline json: {}", path.display()))?;
        timeline
            .validate()
            .with_context(|| format!("stored timeline violates invariants: {}", path.display()))?;

        info!(clips = timeline.clip_count(), "timeline loaded");
        Ok(Some(timeline))
    }

    #[instrument(skip(self, timeline), fields(root = %self.root.display()))]
    fn save_timeline(&self, match_id: &str, timeline: &TimelineState) -> Result<()> {
        let path = self.timeline_path(match_id)?;
        timeline
            .validate()
            .context("refusing to store a timeline that violates invariants")?;
        let json = serde_json::to_vec_pretty(timeline).context("failed to serialize timeline")?;
        let mut temp_file = tempfile::NamedTempFile::new_in(&self.root)
            .context("failed to create temp timeline file")?;
        temp_file
            .write_all(&json)
            .context("failed to write temp timeline file")?;
        temp_file
            .persist(&path)
            .map_err(|error| anyhow::anyhow!(error.error))
            .with_context(|| format!("failed to persist timeline: {}", path.display()))?;

        debug!(clips = timeline.clip_count(), "timeline saved");
        Ok(())
    }

    #[instrument(skip(self, record), fields(
        match_id = %record.match_id,
        clip_id = %record.clip_id,
        operation = ?record.operation_type,
    ))]
    fn append_edit(&self, record: &ClipEditRecord) -> Result<()> {
        let path = self.edits_path(&record.match_id)?;
        let mut line = serde_json::to_vec(record).context("failed to serialize edit record")?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open edit log: {}", path.display()))?;
        file.write_all(&line)
            .with_context(|| format!("failed to append edit log: {}", path.display()))?;
        Ok(())
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn edit_history(&self, match_id: &str, limit: Option<usize>) -> Result<Vec<ClipEditRecord>> {
        let path = self.edits_path(match_id)?;
        if !path.is_file() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&path)
            .with_context(|| format!("failed to open edit log: {}", path.display()))?;
        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line =
                line.with_context(|| format!("failed to read edit log: {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ClipEditRecord>(&line) {
                Ok(record) => records.push(record),
                Err(error) => warn!(line = index + 1, %error, "skipping corrupt edit record"),
            }
        }
        Ok(newest_first(records.into_iter(), limit))
    }
}

fn newest_first(
    records: impl DoubleEndedIterator<Item = ClipEditRecord>,
    limit: Option<usize>,
) -> Vec<ClipEditRecord> {
    records.rev().take(limit.unwrap_or(usize::MAX)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_constructors_fill_clip_id_and_nulls() {
        let clip = Clip::video("a.mp4", 0.0, 2.0);
        let add = ClipEditRecord::add("m1", "p1", "video-0", clip.clone());
        assert_eq!(add.clip_id, clip.id());
        assert!(add.previous_data.is_none());

        let remove = ClipEditRecord::remove("m1", "p1", "video-0", clip.clone());
        assert_eq!(remove.operation_type, EditOperation::Remove);
        assert!(remove.clip_data.is_none());
        assert_eq!(remove.clip_id, clip.id());
    }

    #[test]
    fn record_json_uses_camel_case() {
        let record = ClipEditRecord::add("m1", "p1", "audio-0", Clip::audio("a.mp3", 0.0, 1.0));
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["operationType"], "add");
        assert_eq!(json["trackId"], "audio-0");
        assert!(json["previousData"].is_null());
    }

    #[test]
    fn in_memory_history_is_newest_first() {
        let store = InMemoryMatchStore::new();
        for index in 0..3 {
            let clip = Clip::video("a.mp4", f64::from(index), 1.0).with_id(format!("c{index}"));
            store
                .append_edit(&ClipEditRecord::add("m1", "p1", "video-0", clip))
                .expect("append");
        }

        let history = store.edit_history("m1", Some(2)).expect("history");
        let ids: Vec<_> = history.iter().map(|record| record.clip_id.as_str()).collect();
        assert_eq!(ids, ["c2", "c1"]);
        assert!(store.edit_history("other", None).expect("history").is_empty());
    }

    #[test]
    fn file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileMatchStore::open(dir.path()).expect("open");
        assert!(store.load_timeline("../escape").is_err());
        assert!(store.load_timeline("").is_err());
        assert!(store.load_timeline("match-1").expect("load").is_none());
    }

    #[test]
    fn file_store_refuses_timelines_it_could_not_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileMatchStore::open(dir.path()).expect("open");
        let mut timeline = TimelineState::for_match(&crate::model::MatchConfig::default());
        timeline.tracks[0]
            .clips
            .push(Clip::video("a.mp4", 0.0, f64::INFINITY));

        assert!(store.save_timeline("m1", &timeline).is_err());
        assert!(store.load_timeline("m1").expect("load").is_none());
    }
}
