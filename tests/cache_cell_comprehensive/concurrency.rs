//! Concurrency Tests
//!
//! Tests for thread safety:
//! - One updater run per expiration window
//! - Lock-free fast path under concurrent reads
//! - Deduplicated first access through the keyed cache
//! - Serial retry after a failed winner

use crate::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

const NUM_THREADS: usize = 32;

/// Run `f` on `n` threads released together, collecting results in spawn order
fn race<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let barrier = Arc::new(Barrier::new(n));
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let f = Arc::clone(&f);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                f(i)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// Test expired cell under contention - exactly one updater run
#[test]
fn test_expired_cell_updates_once_under_contention() {
    init_tracing();
    let (cell, clock) = seeded_cell(0usize);
    let calls = Arc::new(AtomicUsize::new(0));

    clock.advance(10_000);

    let values = {
        let cell = Arc::clone(&cell);
        let calls = Arc::clone(&calls);
        race(NUM_THREADS, move |_| {
            let calls = Arc::clone(&calls);
            let value = cell
                .get_or_update(5_000, move || {
                    thread::sleep(Duration::from_millis(50));
                    Ok::<_, io::Error>(calls.fetch_add(1, Ordering::SeqCst) + 1)
                })
                .unwrap();
            *value.unwrap()
        })
    };

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // Skipped callers return the refreshed value, never the stale 0
    assert!(values.iter().all(|v| *v == 1));
    assert_eq!(cell.peek().as_deref(), Some(&1));

    let stats = cell.stats();
    assert_eq!(stats.updates, 1);
    assert_eq!(stats.skipped_updates, stats.lock_acquisitions - 1);
}

/// Test repeated expiration windows - one updater run per window
#[test]
fn test_one_update_per_expiration_window() {
    const WINDOWS: usize = 5;

    let (cell, clock) = seeded_cell(0usize);
    let calls = Arc::new(AtomicUsize::new(0));

    for window in 1..=WINDOWS {
        clock.advance(1_001);

        {
            let cell = Arc::clone(&cell);
            let window_calls = Arc::clone(&calls);
            race(8, move |_| {
                let calls = Arc::clone(&window_calls);
                cell.get_or_update(1_000, move || {
                    thread::sleep(Duration::from_millis(5));
                    Ok::<_, io::Error>(calls.fetch_add(1, Ordering::SeqCst) + 1)
                })
                .unwrap();
            });
        }

        assert_eq!(calls.load(Ordering::SeqCst), window);
    }
}

/// Test fresh value under concurrent reads - the update lock is never taken
#[test]
fn test_fresh_reads_never_take_update_lock() {
    const READS_PER_THREAD: usize = 200;

    let (cell, _clock) = seeded_cell("fresh");

    {
        let cell = Arc::clone(&cell);
        race(NUM_THREADS, move |_| {
            for _ in 0..READS_PER_THREAD {
                let value = cell
                    .get_or_update(60_000, || -> Result<&'static str, io::Error> {
                        thread::sleep(Duration::from_secs(10));
                        Ok("slow")
                    })
                    .unwrap();
                assert_eq!(value.as_deref(), Some(&"fresh"));
            }
        });
    }

    let stats = cell.stats();
    assert_eq!(stats.lock_acquisitions, 0);
    assert_eq!(stats.hits, (NUM_THREADS * READS_PER_THREAD) as u64);
}

/// Test fast path is not held up by a running update on another cell
#[test]
fn test_fast_path_does_not_wait_for_other_updates() {
    let (cache, _clock) = manual_cache::<&'static str>(60_000);
    cache.insert("fresh".to_string(), "ready");

    let started = Arc::new(Barrier::new(2));
    let slow = {
        let cache = Arc::clone(&cache);
        let started = Arc::clone(&started);
        thread::spawn(move || {
            cache
                .get(&"slow".to_string(), || {
                    started.wait();
                    thread::sleep(Duration::from_millis(500));
                    Ok::<_, io::Error>("done")
                })
                .unwrap()
        })
    };

    started.wait();
    let begin = Instant::now();
    let value = cache.get(&"fresh".to_string(), fail("must not run")).unwrap();
    assert_eq!(value.as_deref(), Some(&"ready"));
    assert!(begin.elapsed() < Duration::from_millis(250));

    assert_eq!(slow.join().unwrap().as_deref(), Some(&"done"));
}

/// Test first access through the keyed cache - one updater run, one value
#[test]
fn test_first_access_deduplicated_by_cache() {
    let (cache, _clock) = manual_cache::<String>(60_000);
    let calls = Arc::new(AtomicUsize::new(0));

    let values = {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        race(NUM_THREADS, move |_| {
            let calls = Arc::clone(&calls);
            cache
                .get(&"new-key".to_string(), move || {
                    thread::sleep(Duration::from_millis(50));
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, io::Error>(format!("computed-{}", n))
                })
                .unwrap()
                .unwrap()
        })
    };

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(values.iter().all(|v| v.as_str() == "computed-0"));
    assert_eq!(cache.len(), 1);
}

/// Test distinct keys update independently and in parallel
#[test]
fn test_distinct_keys_update_independently() {
    const KEYS: usize = 8;

    let (cache, _clock) = manual_cache::<usize>(60_000);
    let calls = Arc::new(AtomicUsize::new(0));

    {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        race(KEYS * 4, move |i| {
            let key = format!("key-{}", i % KEYS);
            let calls = Arc::clone(&calls);
            let value = cache
                .get(&key, move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, io::Error>(i % KEYS)
                })
                .unwrap();
            assert_eq!(*value.unwrap(), i % KEYS);
        });
    }

    assert_eq!(calls.load(Ordering::SeqCst), KEYS);
    assert_eq!(cache.len(), KEYS);
}

/// Test failing updater under contention - callers retry one at a time
#[test]
fn test_failing_updater_retried_serially() {
    let (cell, _clock) = empty_cell::<usize>();
    let running = Arc::new(AtomicUsize::new(0));
    let max_running = Arc::new(AtomicUsize::new(0));

    let results = {
        let cell = Arc::clone(&cell);
        let running = Arc::clone(&running);
        let max_running = Arc::clone(&max_running);
        race(8, move |_| {
            let running = Arc::clone(&running);
            let max_running = Arc::clone(&max_running);
            cell.get_or_update(60_000, move || -> Result<usize, io::Error> {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                running.fetch_sub(1, Ordering::SeqCst);
                Err(io::Error::new(io::ErrorKind::Other, "always down"))
            })
            .is_err()
        })
    };

    // Every caller saw the never-set cell and ran the updater itself
    assert!(results.iter().all(|failed| *failed));
    assert_eq!(max_running.load(Ordering::SeqCst), 1);
    assert_eq!(cell.stats().failed_updates, 8);
    assert!(cell.peek().is_none());
}

/// Test losers never see the winner's failure once a retry succeeds
#[test]
fn test_only_updating_caller_sees_failure() {
    let (cell, clock) = seeded_cell(0usize);
    let attempts = Arc::new(AtomicUsize::new(0));

    clock.advance(2_000);

    let results = {
        let cell = Arc::clone(&cell);
        let attempts = Arc::clone(&attempts);
        race(NUM_THREADS, move |_| {
            let attempts = Arc::clone(&attempts);
            cell.get_or_update(1_000, move || {
                thread::sleep(Duration::from_millis(10));
                match attempts.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(io::Error::new(io::ErrorKind::Other, "first run fails")),
                    n => Ok(n),
                }
            })
            .map(|value| value.map(|v| *v))
        })
    };

    let failures = results.iter().filter(|r| r.is_err()).count();
    assert_eq!(failures, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(cell.peek().as_deref(), Some(&1));
}
