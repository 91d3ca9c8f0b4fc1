use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};

use logevent::store::{CapabilityStore, InMemoryCapabilityStore, ShardedCapabilityStore};
use logevent::{TriggerError, TriggerResult};

const THREADS: usize = 16;

struct Record;

fn build(calls: &AtomicUsize) -> TriggerResult<(Arc<Record>, Receiver<u32>)> {
    calls.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    let (_tx, rx) = bounded(1);
    Ok((Arc::new(Record), rx))
}

fn race_same_key(store: Arc<dyn CapabilityStore<Record, u32>>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store
                    .insert_if_not_exists("trigger-1", Box::new(|| build(&calls)))
                    .unwrap()
            })
        })
        .collect();

    let receivers: Vec<Receiver<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.len(), 1);
    assert!(receivers.iter().all(|rx| rx.same_channel(&receivers[0])));
}

fn race_failing_then_retry(store: Arc<dyn CapabilityStore<Record, u32>>) {
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.insert_if_not_exists(
                    "flaky",
                    Box::new(|| -> TriggerResult<(Arc<Record>, Receiver<u32>)> {
                        Err(TriggerError::internal("listener refused"))
                    }),
                )
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_err());
    }
    assert!(store.read("flaky").is_none());

    let calls = AtomicUsize::new(0);
    store
        .insert_if_not_exists("flaky", Box::new(|| build(&calls)))
        .unwrap();
    assert!(store.read("flaky").is_some());
}

fn distinct_keys_all_commit(store: Arc<dyn CapabilityStore<Record, u32>>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let store = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                store
                    .insert_if_not_exists(&format!("trigger-{i}"), Box::new(|| build(&calls)))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), THREADS);
    assert_eq!(store.read_all().len(), THREADS);
}

#[test]
fn in_memory_constructs_once_under_contention() {
    race_same_key(Arc::new(InMemoryCapabilityStore::<Record, u32>::new()));
}

#[test]
fn sharded_constructs_once_under_contention() {
    race_same_key(Arc::new(ShardedCapabilityStore::<Record, u32>::new()));
}

#[test]
fn in_memory_failed_constructions_leave_key_absent() {
    race_failing_then_retry(Arc::new(InMemoryCapabilityStore::<Record, u32>::new()));
}

#[test]
fn sharded_failed_constructions_leave_key_absent() {
    race_failing_then_retry(Arc::new(ShardedCapabilityStore::<Record, u32>::new()));
}

#[test]
fn in_memory_distinct_keys() {
    distinct_keys_all_commit(Arc::new(InMemoryCapabilityStore::<Record, u32>::new()));
}

#[test]
fn sharded_distinct_keys() {
    distinct_keys_all_commit(Arc::new(ShardedCapabilityStore::<Record, u32>::with_stripes(4)));
}
