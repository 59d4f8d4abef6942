use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    history::{HistoryEngine, Subscription},
    match_store::{ClipEditRecord, MatchStore},
    model::{Clip, MatchConfig, TimelineState},
    timeline::{ClipPatch, TimelineError, TrimEdge},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Timeline(#[from] TimelineError),
    #[error("store error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for SessionError {
    fn from(value: anyhow::Error) -> Self {
        Self::Store(format!("{value:#}"))
    }
}

pub struct EditSession {
    match_id: String,
    player_id: String,
    timeline: Arc<TimelineState>,
    history: HistoryEngine,
    store: Arc<dyn MatchStore>,
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("match_id", &self.match_id)
            .field("player_id", &self.player_id)
            .field("clips", &self.timeline.clip_count())
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl EditSession {
    /// # Errors
    /// Fails when the store cannot be read or written.
    #[instrument(skip(store, config))]
    pub fn open(
        match_id: &str,
        player_id: &str,
        store: Arc<dyn MatchStore>,
        config: &MatchConfig,
        max_history: usize,
    ) -> Result<Self, SessionError> {
        let timeline = match store.load_timeline(match_id)? {
            Some(timeline) => {
                debug!(clips = timeline.clip_count(), "resuming stored timeline");
                timeline
            }
            None => {
                let timeline = TimelineState::for_match(config);
                store.save_timeline(match_id, &timeline)?;
                info!(tracks = timeline.tracks.len(), "created match timeline");
                timeline
            }
        };

        let timeline = Arc::new(timeline);
        let mut history = HistoryEngine::with_max_depth(max_history);
        history.push(Arc::clone(&timeline));

        Ok(Self {
            match_id: match_id.to_string(),
            player_id: player_id.to_string(),
            timeline,
            history,
            store,
        })
    }

    #[must_use]
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    #[must_use]
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    #[must_use]
    pub fn timeline(&self) -> &Arc<TimelineState> {
        &self.timeline
    }

    #[must_use]
    pub fn history(&self) -> &HistoryEngine {
        &self.history
    }

    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.history.subscribe(listener)
    }

    /// # Errors
    /// Timeline validation failures leave the session untouched.
    #[instrument(skip(self, clip), fields(match_id = %self.match_id, clip_id = %clip.id()))]
    pub fn add_clip(&mut self, track_id: &str, clip: Clip) -> Result<(), SessionError> {
        let next = self.timeline.add_clip(track_id, clip.clone())?;
        let record = ClipEditRecord::add(&self.match_id, &self.player_id, track_id, clip);
        self.commit(next, &[record])?;
        info!("clip added");
        Ok(())
    }

    /// # Errors
    /// Timeline validation failures leave the session untouched.
    #[instrument(skip(self, patch), fields(match_id = %self.match_id))]
    pub fn update_clip(
        &mut self,
        track_id: &str,
        clip_id: &str,
        patch: &ClipPatch,
    ) -> Result<(), SessionError> {
        let next = self.timeline.update_clip(track_id, clip_id, patch)?;
        self.commit_update(next, track_id, clip_id)?;
        info!("clip updated");
        Ok(())
    }

    /// # Errors
    /// Timeline validation failures leave the session untouched.
    #[instrument(skip(self), fields(match_id = %self.match_id))]
    pub fn move_clip(
        &mut self,
        track_id: &str,
        clip_id: &str,
        start_time: f64,
    ) -> Result<(), SessionError> {
        let next = self.timeline.move_clip(track_id, clip_id, start_time)?;
        self.commit_update(next, track_id, clip_id)?;
        info!("clip moved");
        Ok(())
    }

    /// # Errors
    /// Timeline validation failures leave the session untouched.
    #[instrument(skip(self), fields(match_id = %self.match_id))]
    pub fn trim_clip(
        &mut self,
        track_id: &str,
        clip_id: &str,
        edge: TrimEdge,
        at_time: f64,
    ) -> Result<(), SessionError> {
        let next = self.timeline.trim_clip(track_id, clip_id, edge, at_time)?;
        self.commit_update(next, track_id, clip_id)?;
        info!("clip trimmed");
        Ok(())
    }

    /// # Errors
    /// Fails when the clip does not exist.
    #[instrument(skip(self), fields(match_id = %self.match_id))]
    pub fn remove_clip(&mut self, track_id: &str, clip_id: &str) -> Result<(), SessionError> {
        let previous = self.existing_clip(track_id, clip_id)?;
        let next = self.timeline.remove_clip(track_id, clip_id)?;
        let record = ClipEditRecord::remove(&self.match_id, &self.player_id, track_id, previous);
        self.commit(next, &[record])?;
        info!("clip removed");
        Ok(())
    }

    /// # Errors
    /// [`TimelineError::SplitOutOfRange`] when `at_time` is not strictly
    /// inside the clip.
    #[instrument(skip(self), fields(match_id = %self.match_id))]
    pub fn split_clip(
        &mut self,
        track_id: &str,
        clip_id: &str,
        at_time: f64,
    ) -> Result<String, SessionError> {
        let previous = self.existing_clip(track_id, clip_id)?;
        let right_id = Uuid::new_v4().to_string();
        let next = self
            .timeline
            .split_clip_as(track_id, clip_id, at_time, right_id.clone())?;

        let left = next.find_clip(track_id, clip_id).cloned();
        let right = next.find_clip(track_id, &right_id).cloned();
        let mut records = Vec::with_capacity(2);
        if let Some(left) = left {
            records.push(ClipEditRecord::update(
                &self.match_id,
                &self.player_id,
                track_id,
                previous,
                left,
            ));
        }
        if let Some(right) = right {
            records.push(ClipEditRecord::add(
                &self.match_id,
                &self.player_id,
                track_id,
                right,
            ));
        }

        self.commit(next, &records)?;
        info!(right_id = %right_id, "clip split");
        Ok(right_id)
    }

    /// # Errors
    /// Fails when the restored timeline cannot be persisted.
    #[instrument(skip(self), fields(match_id = %self.match_id))]
    pub fn undo(&mut self) -> Result<bool, SessionError> {
        let Some(snapshot) = self.history.undo() else {
            debug!("nothing to undo");
            return Ok(false);
        };
        if let Err(error) = self.restore(snapshot) {
            self.history.redo();
            return Err(error);
        }
        info!("undo applied");
        Ok(true)
    }

    /// # Errors
    /// Fails when the restored timeline cannot be persisted.
    #[instrument(skip(self), fields(match_id = %self.match_id))]
    pub fn redo(&mut self) -> Result<bool, SessionError> {
        let Some(snapshot) = self.history.redo() else {
            debug!("nothing to redo");
            return Ok(false);
        };
        if let Err(error) = self.restore(snapshot) {
            self.history.undo();
            return Err(error);
        }
        info!("redo applied");
        Ok(true)
    }

    /// # Errors
    /// Fails when the store cannot be read.
    pub fn edit_history(&self, limit: Option<usize>) -> Result<Vec<ClipEditRecord>, SessionError> {
        Ok(self.store.edit_history(&self.match_id, limit)?)
    }

    fn existing_clip(&self, track_id: &str, clip_id: &str) -> Result<Clip, TimelineError> {
        self.timeline
            .find_clip(track_id, clip_id)
            .cloned()
            .ok_or_else(|| TimelineError::ClipNotFound {
                track_id: track_id.to_string(),
                clip_id: clip_id.to_string(),
            })
    }

    fn commit_update(
        &mut self,
        next: TimelineState,
        track_id: &str,
        clip_id: &str,
    ) -> Result<(), SessionError> {
        let previous = self.existing_clip(track_id, clip_id)?;
        let Some(current) = next.find_clip(track_id, clip_id).cloned() else {
            return Err(TimelineError::ClipNotFound {
                track_id: track_id.to_string(),
                clip_id: clip_id.to_string(),
            }
            .into());
        };
        let record = ClipEditRecord::update(
            &self.match_id,
            &self.player_id,
            track_id,
            previous,
            current,
        );
        self.commit(next, &[record])
    }

    fn commit(
        &mut self,
        next: TimelineState,
        records: &[ClipEditRecord],
    ) -> Result<(), SessionError> {
        let next = Arc::new(next);
        self.store.save_timeline(&self.match_id, &next)?;
        for record in records {
            if let Err(error) = self.store.append_edit(record) {
                // The stored timeline must keep matching the edit log.
                if let Err(rollback) = self.store.save_timeline(&self.match_id, &self.timeline) {
                    warn!(error = %format!("{rollback:#}"), "failed to roll back stored timeline");
                }
                return Err(error.into());
            }
        }
        self.history.push(Arc::clone(&next));
        self.timeline = next;
        Ok(())
    }

    fn restore(&mut self, snapshot: Arc<TimelineState>) -> Result<(), SessionError> {
        self.store.save_timeline(&self.match_id, &snapshot)?;
        self.timeline = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::match_store::{EditOperation, InMemoryMatchStore};

    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryMatchStore,
        fail_saves: AtomicBool,
        fail_appends: AtomicBool,
    }

    impl MatchStore for FlakyStore {
        fn load_timeline(&self, match_id: &str) -> anyhow::Result<Option<TimelineState>> {
            self.inner.load_timeline(match_id)
        }

        fn save_timeline(&self, match_id: &str, timeline: &TimelineState) -> anyhow::Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.save_timeline(match_id, timeline)
        }

        fn append_edit(&self, record: &ClipEditRecord) -> anyhow::Result<()> {
            if self.fail_appends.load(Ordering::SeqCst) {
                anyhow::bail!("edit log unavailable");
            }
            self.inner.append_edit(record)
        }

        fn edit_history(
            &self,
            match_id: &str,
            limit: Option<usize>,
        ) -> anyhow::Result<Vec<ClipEditRecord>> {
            self.inner.edit_history(match_id, limit)
        }
    }

    fn flaky_session() -> (EditSession, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::default());
        let session = EditSession::open("m1", "p1", store.clone(), &MatchConfig::default(), 50)
            .expect("open session");
        (session, store)
    }

    fn stored_clips(store: &dyn MatchStore) -> Option<usize> {
        store
            .load_timeline("m1")
            .expect("load")
            .map(|timeline| timeline.clip_count())
    }

    fn session() -> (EditSession, Arc<InMemoryMatchStore>) {
        let store = Arc::new(InMemoryMatchStore::new());
        let session = EditSession::open("m1", "p1", store.clone(), &MatchConfig::default(), 50)
            .expect("open session");
        (session, store)
    }

    #[test]
    fn open_creates_and_persists_match_layout() {
        let (session, store) = session();
        assert_eq!(session.timeline().tracks.len(), 5);
        assert!(store.load_timeline("m1").expect("load").is_some());
        assert!(!session.history().can_undo());
    }

    #[test]
    fn split_records_update_then_add() {
        let (mut session, _) = session();
        let clip = Clip::video("a.mp4", 0.0, 10.0).with_id("c1");
        session.add_clip("video-0", clip).expect("add");
        let right_id = session.split_clip("video-0", "c1", 4.0).expect("split");

        let history = session.edit_history(None).expect("history");
        let operations: Vec<_> = history.iter().map(|record| record.operation_type).collect();
        assert_eq!(
            operations,
            [EditOperation::Add, EditOperation::Update, EditOperation::Add]
        );
        assert_eq!(history[0].clip_id, right_id);
        assert_eq!(history[1].clip_id, "c1");
    }

    #[test]
    fn rejected_split_changes_nothing() {
        let (mut session, _) = session();
        session
            .add_clip("video-0", Clip::video("a.mp4", 2.0, 3.0).with_id("c1"))
            .expect("add");
        let before = Arc::clone(session.timeline());

        let error = session.split_clip("video-0", "c1", 2.0).expect_err("boundary");
        assert!(matches!(
            error,
            SessionError::Timeline(TimelineError::SplitOutOfRange { .. })
        ));
        assert_eq!(session.timeline(), &before);
        assert_eq!(session.edit_history(None).expect("history").len(), 1);
    }

    #[test]
    fn undo_restores_and_persists_previous_snapshot() {
        let (mut session, store) = session();
        session
            .add_clip("audio-0", Clip::audio("a.mp3", 0.0, 3.0).with_id("a1"))
            .expect("add");
        assert!(session.undo().expect("undo"));
        assert_eq!(session.timeline().clip_count(), 0);
        assert_eq!(
            store.load_timeline("m1").expect("load").map(|t| t.clip_count()),
            Some(0)
        );

        assert!(session.redo().expect("redo"));
        assert_eq!(session.timeline().clip_count(), 1);
        assert!(!session.redo().expect("redo"));
    }

    #[test]
    fn failed_edit_log_append_rolls_back_stored_timeline() {
        let (mut session, store) = flaky_session();
        store.fail_appends.store(true, Ordering::SeqCst);

        let result = session.add_clip("video-0", Clip::video("a.mp4", 0.0, 2.0).with_id("c1"));
        assert!(matches!(result, Err(SessionError::Store(_))));
        assert_eq!(session.timeline().clip_count(), 0);
        assert!(!session.history().can_undo());
        assert_eq!(stored_clips(store.as_ref()), Some(0));
        assert!(session.edit_history(None).expect("history").is_empty());

        store.fail_appends.store(false, Ordering::SeqCst);
        session
            .add_clip("video-0", Clip::video("a.mp4", 0.0, 2.0).with_id("c1"))
            .expect("add once the log recovers");
        assert_eq!(stored_clips(store.as_ref()), Some(1));
    }

    #[test]
    fn failed_undo_save_keeps_history_in_step() {
        let (mut session, store) = flaky_session();
        session
            .add_clip("video-0", Clip::video("a.mp4", 0.0, 2.0).with_id("c1"))
            .expect("add");
        let before = Arc::clone(session.timeline());

        store.fail_saves.store(true, Ordering::SeqCst);
        assert!(session.undo().is_err());
        assert_eq!(session.timeline(), &before);
        assert_eq!(session.history().present(), Some(&before));
        assert!(session.history().can_undo());
        assert!(!session.history().can_redo());

        store.fail_saves.store(false, Ordering::SeqCst);
        assert!(session.undo().expect("undo"));
        store.fail_saves.store(true, Ordering::SeqCst);
        assert!(session.redo().is_err());
        assert_eq!(session.timeline().clip_count(), 0);
        assert_eq!(
            session.history().present().map(|snapshot| snapshot.clip_count()),
            Some(0)
        );
        assert!(session.history().can_redo());
        assert_eq!(stored_clips(store.as_ref()), Some(0));
    }
}
