use std::sync::Arc;

use clipclash_core::{Clip, HistoryEngine, MatchConfig, TimelineState};
use proptest::prelude::*;

fn snapshot(seed: u16) -> TimelineState {
    let mut timeline = TimelineState::for_match(&MatchConfig::default());
    let clip = Clip::video("media/a.mp4", f64::from(seed), 1.0).with_id(format!("clip-{seed}"));
    if let Some(track) = timeline.tracks.first_mut() {
        track.clips.push(clip);
    }
    timeline
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn past_never_exceeds_depth(
        seeds in prop::collection::vec(any::<u16>(), 0..200),
        depth in 1usize..60,
    ) {
        let mut history = HistoryEngine::with_max_depth(depth);
        for seed in seeds {
            history.push(snapshot(seed));
            prop_assert!(history.stats().undo_count <= depth);
        }
    }

    #[test]
    fn pushing_present_again_changes_nothing(seeds in prop::collection::vec(any::<u16>(), 1..40)) {
        let mut history = HistoryEngine::new();
        for seed in &seeds {
            history.push(snapshot(*seed));
        }
        let before = history.stats();
        let present = Arc::clone(history.present().expect("present after pushes"));

        prop_assert!(!history.push(present.as_ref().clone()));
        prop_assert_eq!(history.stats(), before);
    }

    #[test]
    fn undo_then_redo_restores_present(
        seeds in prop::collection::vec(any::<u16>(), 2..40),
        steps in 1usize..10,
    ) {
        let mut history = HistoryEngine::new();
        for seed in &seeds {
            history.push(snapshot(*seed));
        }
        let present = history.present().cloned().expect("present after pushes");

        let mut undone = 0;
        for _ in 0..steps {
            if history.undo().is_some() {
                undone += 1;
            }
        }
        for _ in 0..undone {
            prop_assert!(history.redo().is_some());
        }

        prop_assert_eq!(history.present().map(|snapshot| snapshot.as_ref()), Some(present.as_ref()));
        prop_assert!(!history.can_redo());
    }

    #[test]
    fn push_after_undo_discards_redo(seeds in prop::collection::vec(0u16..1000, 3..20)) {
        let mut history = HistoryEngine::new();
        for seed in &seeds {
            history.push(snapshot(*seed));
        }
        history.undo();
        history.push(snapshot(5_000));
        prop_assert!(!history.can_redo());
        prop_assert!(history.redo().is_none());
    }
}
