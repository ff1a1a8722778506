//! Property tests for the append-only store

use proptest::prelude::*;
use tsview_registry::AppendOnlyStore;

proptest! {
    #[test]
    fn every_pushed_value_is_readable(
        first in 1usize..16,
        values in prop::collection::vec(any::<i64>(), 0..300),
    ) {
        let store = AppendOnlyStore::with_first_chunk_len(first);
        for (expected, value) in values.iter().enumerate() {
            prop_assert_eq!(store.push(*value), expected);
        }

        prop_assert_eq!(store.len(), values.len());
        for (index, value) in values.iter().enumerate() {
            prop_assert_eq!(store.get(index), Some(value));
        }
        prop_assert_eq!(store.get(values.len()), None);
        prop_assert!(store.iter().eq(values.iter()));
    }

    #[test]
    fn references_survive_growth(first in 1usize..8, extra in 1usize..200) {
        let store = AppendOnlyStore::with_first_chunk_len(first);
        store.push(String::from("anchor"));
        let anchor = store.get(0).unwrap() as *const String;

        for i in 0..extra {
            store.push(i.to_string());
        }

        let last = (extra - 1).to_string();
        prop_assert!(std::ptr::eq(store.get(0).unwrap(), anchor));
        prop_assert_eq!(store.get(extra), Some(&last));
    }
}
