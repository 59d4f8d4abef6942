use clipclash_core::{
    JsonFileMatchStore, MatchStore, fixtures::demo_timeline,
};
use proptest::prelude::*;

const MATCH_ID: &str = "corrupt-match";

fn no_panic_load(store: &JsonFileMatchStore) -> bool {
    std::panic::catch_unwind(|| {
        let _ = store.load_timeline(MATCH_ID);
        let _ = store.edit_history(MATCH_ID, None);
    })
    .is_ok()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn random_timeline_bytes_do_not_panic(raw in prop::collection::vec(any::<u8>(), 0..4096)) {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let store = JsonFileMatchStore::open(temp.path()).expect("store should open");
        std::fs::write(temp.path().join(format!("{MATCH_ID}.timeline.json")), &raw)
            .expect("writing random payload should work");
        std::fs::write(temp.path().join(format!("{MATCH_ID}.edits.jsonl")), &raw)
            .expect("writing random payload should work");
        prop_assert!(no_panic_load(&store));
    }

    #[test]
    fn truncated_timeline_payloads_do_not_panic(prefix_len in 0usize..8192usize) {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let store = JsonFileMatchStore::open(temp.path()).expect("store should open");
        store
            .save_timeline(MATCH_ID, &demo_timeline())
            .expect("saving fixture timeline should work");

        let path = temp.path().join(format!("{MATCH_ID}.timeline.json"));
        let mut payload = std::fs::read(&path).expect("reading saved timeline should work");
        let truncated_len = prefix_len.min(payload.len());
        let complete = truncated_len == payload.len();
        payload.truncate(truncated_len);
        std::fs::write(&path, payload).expect("writing truncated payload should work");

        prop_assert!(no_panic_load(&store));
        prop_assert_eq!(store.load_timeline(MATCH_ID).is_ok(), complete);
    }

    #[test]
    fn mutated_timeline_payloads_do_not_panic(index in 0usize..8192usize, delta in any::<u8>()) {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let store = JsonFileMatchStore::open(temp.path()).expect("store should open");
        store
            .save_timeline(MATCH_ID, &demo_timeline())
            .expect("saving fixture timeline should work");

        let path = temp.path().join(format!("{MATCH_ID}.timeline.json"));
        let mut payload = std::fs::read(&path).expect("reading saved timeline should work");
        if !payload.is_empty() {
            let target = index % payload.len();
            payload[target] ^= delta.max(1);
        }
        std::fs::write(&path, payload).expect("writing mutated payload should work");

        prop_assert!(no_panic_load(&store));
    }
}
