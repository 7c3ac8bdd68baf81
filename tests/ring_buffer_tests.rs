//! Sample ring tests: index invariants, wraparound, overwrite-oldest and
//! concurrent producer/consumer ordering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use ads8689_stream::ring::SampleRing;

fn drain(ring: &SampleRing, max_len: usize) -> Vec<i16> {
    let mut out = vec![0i16; max_len];
    let drained = ring.drain_into(&mut out);
    out.truncate(drained.count);
    out
}

#[test]
fn test_empty_iff_indices_equal() {
    let ring = SampleRing::new(5);
    let mut next = 0i16;

    // Mixed pushes and partial drains, checking the invariant each step.
    for round in 0..40 {
        for _ in 0..(round % 4) {
            ring.push(next, 1);
            next += 1;
        }
        assert_eq!(ring.is_empty(), ring.front() == ring.rear());
        assert!(ring.front() < ring.slots());
        assert!(ring.rear() < ring.slots());

        drain(&ring, round % 3);
        assert_eq!(ring.is_empty(), ring.front() == ring.rear());
        assert!(ring.len() <= ring.capacity());
    }
}

#[test]
fn test_full_push_advances_both_indices() {
    let ring = SampleRing::new(4);
    for s in 0..4 {
        assert!(!ring.push(s, 1));
    }

    for s in 4..20 {
        let (front, rear) = (ring.front(), ring.rear());
        assert!(ring.push(s, 1));
        assert_eq!(ring.front(), (front + 1) % ring.slots());
        assert_eq!(ring.rear(), (rear + 1) % ring.slots());
        assert_eq!(ring.len(), 4);
    }
    // Unread region is intact: the four newest, oldest first.
    assert_eq!(drain(&ring, 8), [16, 17, 18, 19]);
}

#[test]
fn test_wraparound_drain_in_two_segments() {
    // 8 slots
    let ring = SampleRing::new(7);
    for s in 0..6 {
        ring.push(s, 1_000);
    }
    assert_eq!(drain(&ring, 6), [0, 1, 2, 3, 4, 5]);

    for s in [100, 101, 102, 103] {
        ring.push(s, 1_000);
    }
    assert_eq!(ring.rear(), 6);
    assert_eq!(ring.front(), 2);

    let mut out = [0i16; 8];
    let drained = ring.drain_into(&mut out);
    assert_eq!(drained.count, 4);
    assert_eq!(&out[..4], [100, 101, 102, 103]);
    assert_eq!(drained.rate_hz(), Some(1_000.0));
    assert_eq!(ring.rear(), ring.front());
    assert!(ring.is_empty());
}

#[test]
fn test_overwrite_oldest_keeps_newest() {
    const N: usize = 16;
    let ring = SampleRing::new(N);
    for s in 0..=N as i16 {
        ring.push(s, 1);
    }

    assert_eq!(ring.len(), N);
    assert_eq!(ring.dropped(), 1);
    let expected: Vec<i16> = (1..=N as i16).collect();
    assert_eq!(drain(&ring, N * 2), expected);
}

#[test]
fn test_drain_limit_leaves_rest_in_order() {
    let ring = SampleRing::new(10);
    for s in 0..10 {
        ring.push(s, 1);
    }
    assert_eq!(drain(&ring, 3), [0, 1, 2]);
    assert_eq!(drain(&ring, 3), [3, 4, 5]);
    assert_eq!(drain(&ring, 100), [6, 7, 8, 9]);
    assert!(drain(&ring, 100).is_empty());
}

#[test]
fn test_concurrent_delivery_is_ordered_and_accounted() {
    const PUSHES: i16 = 30_000;
    let ring = Arc::new(SampleRing::new(64));
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let ring = ring.clone();
        let done = done.clone();
        thread::spawn(move || {
            for s in 0..PUSHES {
                ring.push(s, 10);
                if s % 512 == 0 {
                    thread::yield_now();
                }
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut delivered = 0usize;
    let mut last = -1i32;
    let mut out = [0i16; 48];
    loop {
        let finished = done.load(Ordering::Acquire);
        let drained = ring.drain_into(&mut out);
        for &s in &out[..drained.count] {
            assert!(s as i32 > last, "sample {} after {}", s, last);
            last = s as i32;
        }
        delivered += drained.count;
        if finished && drained.count == 0 {
            break;
        }
    }
    producer.join().unwrap();

    assert_eq!(delivered + ring.dropped() as usize, PUSHES as usize);
    assert_eq!(last, PUSHES as i32 - 1);
}
