//! Ring buffer transport tests over the real log-entry payload.

use std::sync::Arc;
use std::thread;

use plume::entry::LogEntry;
use plume::ring::{ HeapRingBuffer, PushResult, QueueFullPolicy, RingConfig };
use plume::snapshot::Snapshot;
use plume::Level;

fn tagged_entry(tag: i32) -> LogEntry {
    let mut snapshot = Snapshot::new();
    snapshot.capture_i32(tag);
    LogEntry::with_snapshot(Level::Info, snapshot)
}

fn tag_of(entry: &LogEntry) -> i32 {
    entry.snapshot.format_all().parse().unwrap()
}

fn ring(capacity: usize, policy: QueueFullPolicy) -> HeapRingBuffer<LogEntry> {
    HeapRingBuffer::new(RingConfig::new(capacity).unwrap().with_policy(policy)).unwrap()
}

#[test]
fn drop_newest_keeps_first_four() {
    let rb = ring(4, QueueFullPolicy::DropNewest);

    for tag in 1..=4 {
        assert!(matches!(rb.try_push(tagged_entry(tag)), PushResult::Ok(_)));
    }
    assert_eq!(rb.try_push(tagged_entry(5)), PushResult::DroppedNewest);

    let mut out = LogEntry::new();
    let mut seen = Vec::new();
    while rb.try_pop(&mut out) {
        seen.push(tag_of(&out));
    }
    assert_eq!(seen, vec![1, 2, 3, 4]);
}

#[test]
fn drop_oldest_keeps_last_four() {
    let rb = ring(4, QueueFullPolicy::DropOldest);

    for tag in 1..=4 {
        assert!(matches!(rb.try_push(tagged_entry(tag)), PushResult::Ok(_)));
    }
    assert!(matches!(rb.try_push(tagged_entry(5)), PushResult::DroppedOldest(_)));

    let mut out = LogEntry::new();
    let mut seen = Vec::new();
    while rb.try_pop(&mut out) {
        seen.push(tag_of(&out));
    }
    assert_eq!(seen, vec![2, 3, 4, 5]);
}

#[test]
fn size_is_bounded_by_capacity_under_churn() {
    let rb = Arc::new(ring(8, QueueFullPolicy::DropNewest));
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let observer = {
        let rb = Arc::clone(&rb);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                assert!(rb.size() <= rb.capacity());
            }
        })
    };

    let consumer = {
        let rb = Arc::clone(&rb);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut out = LogEntry::new();
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                rb.try_pop(&mut out);
            }
        })
    };

    for tag in 0..20_000 {
        rb.try_push(tagged_entry(tag));
    }
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    observer.join().unwrap();
    consumer.join().unwrap();
}

#[test]
fn spsc_order_matches_push_order() {
    let rb = Arc::new(ring(64, QueueFullPolicy::Block));
    let total = 50_000;

    let producer = {
        let rb = Arc::clone(&rb);
        thread::spawn(move || {
            for tag in 0..total {
                while !rb.try_push(tagged_entry(tag)).is_published() {
                    std::hint::spin_loop();
                }
            }
        })
    };

    let mut out = LogEntry::new();
    let mut expected = 0;
    while expected < total {
        if rb.try_pop(&mut out) {
            assert_eq!(tag_of(&out), expected, "pop order must equal push order");
            expected += 1;
        } else {
            std::hint::spin_loop();
        }
    }
    producer.join().unwrap();
}

#[test]
fn popped_entries_were_all_pushed() {
    // No spurious reads: every popped tag must come from the pushed set, each
    // at most once.
    use std::sync::atomic::{ AtomicBool, Ordering };

    let rb = Arc::new(ring(128, QueueFullPolicy::DropNewest));
    let done = Arc::new(AtomicBool::new(false));
    let producers = 4;
    let per_producer = 2_000;

    let mut handles = Vec::new();
    for p in 0..producers {
        let rb = Arc::clone(&rb);
        handles.push(
            thread::spawn(move || {
                let mut accepted = 0u32;
                for i in 0..per_producer {
                    let tag = p * per_producer + i;
                    if rb.try_push(tagged_entry(tag)).is_published() {
                        accepted += 1;
                    }
                }
                accepted
            })
        );
    }

    let consumer = {
        let rb = Arc::clone(&rb);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut seen = vec![0u8; (producers * per_producer) as usize];
            let mut out = LogEntry::new();
            let mut count = 0u32;
            loop {
                if rb.try_pop(&mut out) {
                    let tag = tag_of(&out) as usize;
                    seen[tag] += 1;
                    assert_eq!(seen[tag], 1, "entry {tag} popped twice");
                    count += 1;
                } else if done.load(Ordering::Acquire) && rb.is_empty() {
                    break;
                } else {
                    std::hint::spin_loop();
                }
            }
            count
        })
    };

    let accepted: u32 = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .sum();
    done.store(true, std::sync::atomic::Ordering::Release);
    let popped = consumer.join().unwrap();
    assert_eq!(accepted, popped, "every accepted push must be popped exactly once");
}

#[test]
fn wire_payload_survives_ring_transit() {
    let rb = ring(8, QueueFullPolicy::DropNewest);

    let mut snapshot = Snapshot::new();
    snapshot.capture_view("state {} of {}");
    snapshot.capture_u32(3);
    snapshot.capture_u32(7);
    let mut entry = LogEntry::with_snapshot(Level::Error, snapshot);
    entry.timestamp = 123;
    entry.thread_id = 9;

    assert!(rb.try_push(entry).is_published());
    let mut out = LogEntry::new();
    assert!(rb.try_pop(&mut out));

    assert_eq!(out.timestamp, 123);
    assert_eq!(out.thread_id, 9);
    assert_eq!(out.level, Level::Error);
    assert_eq!(out.snapshot.format_all(), "state 3 of 7");
}
