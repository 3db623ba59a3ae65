//! Integration tests for the bounded buffer.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use workq::{BoundedBuffer, CancelToken, Error};

const BLOCKED: Duration = Duration::from_millis(100);
const PROMPT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn zero_capacity_is_rejected() {
    let result = BoundedBuffer::<u32>::new(0);
    assert!(matches!(result, Err(Error::InvalidCapacity(0))));
}

#[test]
fn new_buffer_is_empty_and_running() {
    let buffer = BoundedBuffer::<u32>::new(3).unwrap();
    assert_eq!(buffer.capacity(), 3);
    assert_eq!(buffer.len(), 0);
    assert!(buffer.is_empty());
    assert!(!buffer.is_stopped());
}

// ---------------------------------------------------------------------------
// FIFO and blocking
// ---------------------------------------------------------------------------

#[test]
fn take_returns_items_in_put_order() {
    let buffer = BoundedBuffer::new(4).unwrap();
    buffer.put("a").unwrap();
    buffer.put("b").unwrap();
    buffer.put("c").unwrap();

    assert_eq!(buffer.take().unwrap(), "a");
    assert_eq!(buffer.take().unwrap(), "b");
    assert_eq!(buffer.take().unwrap(), "c");
    assert!(buffer.is_empty());
}

#[test]
fn put_blocks_while_full_until_take() {
    let buffer = BoundedBuffer::new(1).unwrap();
    buffer.put(1).unwrap();

    let (tx, rx) = mpsc::channel();
    let producer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            buffer.put(2).unwrap();
            tx.send(()).unwrap();
        })
    };

    // Second put must still be parked on the full buffer.
    assert!(rx.recv_timeout(BLOCKED).is_err());
    assert_eq!(buffer.len(), 1);

    assert_eq!(buffer.take().unwrap(), 1);
    rx.recv_timeout(PROMPT).expect("blocked put should complete");
    assert_eq!(buffer.take().unwrap(), 2);

    producer.join().unwrap();
}

#[test]
fn take_blocks_while_empty_until_put() {
    let buffer = BoundedBuffer::new(2).unwrap();

    let (tx, rx) = mpsc::channel();
    let consumer = {
        let buffer = buffer.clone();
        thread::spawn(move || tx.send(buffer.take().unwrap()).unwrap())
    };

    assert!(rx.recv_timeout(BLOCKED).is_err());
    buffer.put(42).unwrap();
    assert_eq!(rx.recv_timeout(PROMPT).unwrap(), 42);

    consumer.join().unwrap();
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

#[test]
fn stop_drains_then_fails() {
    let buffer = BoundedBuffer::new(5).unwrap();
    buffer.put(1).unwrap();
    buffer.put(2).unwrap();
    assert!(buffer.stop());

    assert_eq!(buffer.take().unwrap(), 1);
    assert_eq!(buffer.take().unwrap(), 2);
    assert!(matches!(buffer.take(), Err(Error::Stopped)));
    assert!(matches!(buffer.take(), Err(Error::Stopped)));
}

#[test]
fn stop_rejects_new_puts_even_with_space() {
    let buffer = BoundedBuffer::new(5).unwrap();
    buffer.put(1).unwrap();
    buffer.stop();

    assert!(matches!(buffer.put(99), Err(Error::Stopped)));
    assert_eq!(buffer.len(), 1);

    assert_eq!(buffer.take().unwrap(), 1);
    assert!(matches!(buffer.take(), Err(Error::Stopped)));

    let stats = buffer.stats();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.rejected, 1);
}

#[test]
fn stop_is_idempotent() {
    let buffer = BoundedBuffer::<u8>::new(1).unwrap();
    assert!(buffer.stop());
    assert!(!buffer.stop());
    assert!(!buffer.stop());
    assert!(buffer.is_stopped());
}

#[test]
fn stop_releases_every_blocked_taker() {
    let buffer = BoundedBuffer::<u32>::new(2).unwrap();

    let (tx, rx) = mpsc::channel();
    let takers: Vec<_> = (0..4)
        .map(|_| {
            let buffer = buffer.clone();
            let tx = tx.clone();
            thread::spawn(move || tx.send(buffer.take()).unwrap())
        })
        .collect();

    assert!(rx.recv_timeout(BLOCKED).is_err());
    buffer.stop();

    for _ in 0..4 {
        let result = rx.recv_timeout(PROMPT).expect("taker should wake on stop");
        assert!(matches!(result, Err(Error::Stopped)));
    }
    for taker in takers {
        taker.join().unwrap();
    }
}

#[test]
fn stop_releases_every_blocked_putter() {
    let buffer = BoundedBuffer::new(1).unwrap();
    buffer.put(0).unwrap();

    let (tx, rx) = mpsc::channel();
    let putters: Vec<_> = (1..=3)
        .map(|n| {
            let buffer = buffer.clone();
            let tx = tx.clone();
            thread::spawn(move || tx.send(buffer.put(n)).unwrap())
        })
        .collect();

    assert!(rx.recv_timeout(BLOCKED).is_err());
    buffer.stop();

    for _ in 0..3 {
        let result = rx.recv_timeout(PROMPT).expect("putter should wake on stop");
        assert!(matches!(result, Err(Error::Stopped)));
    }
    for putter in putters {
        putter.join().unwrap();
    }

    // Only the item admitted before stop is delivered.
    assert_eq!(buffer.take().unwrap(), 0);
    assert!(matches!(buffer.take(), Err(Error::Stopped)));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn cancel_releases_blocked_take_with() {
    let buffer = BoundedBuffer::<u32>::new(1).unwrap();
    let token = CancelToken::new();

    let (tx, rx) = mpsc::channel();
    let consumer = {
        let buffer = buffer.clone();
        let token = token.clone();
        thread::spawn(move || tx.send(buffer.take_with(&token)).unwrap())
    };

    assert!(rx.recv_timeout(BLOCKED).is_err());
    token.cancel();

    let result = rx.recv_timeout(PROMPT).expect("take_with should wake on cancel");
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!buffer.is_stopped());
    consumer.join().unwrap();
}

#[test]
fn cancel_releases_blocked_put_with() {
    let buffer = BoundedBuffer::new(1).unwrap();
    buffer.put(1).unwrap();
    let token = CancelToken::new();

    let (tx, rx) = mpsc::channel();
    let producer = {
        let buffer = buffer.clone();
        let token = token.clone();
        thread::spawn(move || tx.send(buffer.put_with(2, &token)).unwrap())
    };

    assert!(rx.recv_timeout(BLOCKED).is_err());
    token.cancel();

    let result = rx.recv_timeout(PROMPT).expect("put_with should wake on cancel");
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(buffer.len(), 1);
    producer.join().unwrap();
}

#[test]
fn cancelled_token_still_gets_ready_items() {
    let buffer = BoundedBuffer::new(2).unwrap();
    let token = CancelToken::new();
    token.cancel();

    buffer.put_with(7, &token).unwrap();
    assert_eq!(buffer.take_with(&token).unwrap(), 7);
    assert!(matches!(buffer.take_with(&token), Err(Error::Cancelled)));
}

#[test]
fn cancel_only_affects_its_own_waiter() {
    let buffer = BoundedBuffer::<u32>::new(1).unwrap();
    let cancelled = CancelToken::new();
    let untouched = CancelToken::new();

    let (tx, rx) = mpsc::channel();
    let spawn_taker = |token: CancelToken| {
        let buffer = buffer.clone();
        let tx = tx.clone();
        thread::spawn(move || tx.send(buffer.take_with(&token)).unwrap())
    };
    let first = spawn_taker(cancelled.clone());
    let second = spawn_taker(untouched.clone());

    assert!(rx.recv_timeout(BLOCKED).is_err());
    cancelled.cancel();
    assert!(matches!(
        rx.recv_timeout(PROMPT).unwrap(),
        Err(Error::Cancelled)
    ));

    // The other taker is still waiting for data.
    assert!(rx.recv_timeout(BLOCKED).is_err());
    buffer.put(5).unwrap();
    assert_eq!(rx.recv_timeout(PROMPT).unwrap().unwrap(), 5);

    first.join().unwrap();
    second.join().unwrap();
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn capacity_is_never_exceeded_under_contention() {
    const CAPACITY: usize = 3;
    let buffer = BoundedBuffer::new(CAPACITY).unwrap();
    let max_seen = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let buffer = buffer.clone();
            let max_seen = Arc::clone(&max_seen);
            thread::spawn(move || {
                for i in 0..500 {
                    buffer.put(p * 1000 + i).unwrap();
                    max_seen.fetch_max(buffer.len(), Ordering::Relaxed);
                }
            })
        })
        .collect();

    let consumer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            for _ in 0..2000 {
                buffer.take().unwrap();
            }
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    consumer.join().unwrap();

    assert!(max_seen.load(Ordering::Relaxed) <= CAPACITY);
    assert!(buffer.is_empty());
}

#[test]
fn no_item_lost_or_duplicated_across_many_threads() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 3;
    const PER_PRODUCER: usize = 1000;

    let buffer = BoundedBuffer::new(8).unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    buffer.put((p, i)).unwrap();
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut taken = Vec::new();
                while let Ok(item) = buffer.take() {
                    taken.push(item);
                }
                taken
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    buffer.stop();

    let mut seen = HashSet::new();
    let mut total = 0;
    for consumer in consumers {
        for item in consumer.join().unwrap() {
            assert!(seen.insert(item), "duplicate item {item:?}");
            total += 1;
        }
    }

    assert_eq!(total, PRODUCERS * PER_PRODUCER);
    for p in 0..PRODUCERS {
        for i in 0..PER_PRODUCER {
            assert!(seen.contains(&(p, i)), "missing item {:?}", (p, i));
        }
    }
}

#[test]
fn single_consumer_sees_each_producer_in_order() {
    let buffer = BoundedBuffer::new(2).unwrap();

    let producers: Vec<_> = (0..3)
        .map(|p| {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for seq in 0..200u32 {
                    buffer.put((p, seq)).unwrap();
                }
            })
        })
        .collect();

    let mut next = [0u32; 3];
    for _ in 0..600 {
        let (p, seq) = buffer.take().unwrap();
        assert_eq!(seq, next[p], "producer {p} out of order");
        next[p] += 1;
    }

    for producer in producers {
        producer.join().unwrap();
    }
}
