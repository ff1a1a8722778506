//! Concurrent registration tests
//!
//! Many threads racing to register the same element type must all observe
//! one id, and the registry must end up with exactly one descriptor for it.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use tsview_dispatch::plain_element;
use tsview_registry::{id_of, info, RuntimeTypeId, TypeRegistry};

const THREADS: usize = 50;

#[derive(Clone, Copy)]
#[repr(C)]
struct Candle {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Clone, Copy)]
struct SeenOnlyByTheGlobalRace(u64);

plain_element!(Candle, SeenOnlyByTheGlobalRace);

fn race<F>(register: F) -> Vec<RuntimeTypeId>
where
    F: Fn() -> RuntimeTypeId + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(THREADS));
    let register = Arc::new(register);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let register = Arc::clone(&register);
            thread::spawn(move || {
                barrier.wait();
                register()
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
}

// ============================================================================
// Private registry
// ============================================================================

#[test]
fn test_fifty_threads_one_id() {
    let registry = Arc::new(TypeRegistry::new());

    let ids = {
        let registry = Arc::clone(&registry);
        race(move || registry.get_or_register::<Candle>())
    };

    let distinct: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(distinct.len(), 1, "threads saw different ids: {distinct:?}");
    assert_eq!(registry.len(), 1);

    let id = ids[0];
    let described = registry.info(id).unwrap();
    assert_eq!(described.id(), id);
    assert_eq!(described.size(), 32);
}

#[test]
fn test_racing_distinct_types() {
    let registry = Arc::new(TypeRegistry::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                match i % 5 {
                    0 => registry.get_or_register::<u8>(),
                    1 => registry.get_or_register::<i16>(),
                    2 => registry.get_or_register::<f32>(),
                    3 => registry.get_or_register::<String>(),
                    _ => registry.get_or_register::<Candle>(),
                }
            })
        })
        .collect();

    let ids: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 5);
    assert_eq!(registry.len(), 5);

    let mut indices: Vec<_> = ids.iter().map(|id| id.index()).collect();
    indices.sort_unstable();
    assert_eq!(indices, [0, 1, 2, 3, 4]);
}

// ============================================================================
// Process-wide registry
// ============================================================================

#[test]
fn test_global_race() {
    let ids = race(id_of::<SeenOnlyByTheGlobalRace>);

    let distinct: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(distinct.len(), 1);

    let matching = TypeRegistry::global()
        .iter()
        .filter(|described| described.is::<SeenOnlyByTheGlobalRace>())
        .count();
    assert_eq!(matching, 1);
    assert!(info(ids[0]).is_some());
}
