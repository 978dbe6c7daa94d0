// Notes:
// - one buffer per device; all of a device's field traces read the same samples, so a frame
//   takes one lock per device instead of one per field
// - the producer is the device's delivery thread, the consumer the render thread; both only
//   hold the lock for a copy, nothing blocking happens under it

use parking_lot::Mutex;
use std::time::Duration;

use crate::sample::Timestamped;

/// The lock could not be acquired within the requested timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contended;

/// Outcome of a push, so callers can log outside of the critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    Appended,
    /// The oldest entry was overwritten.
    Overwrote,
    /// A timestamp older than the newest held one was pushed (device clock reset),
    /// the previous content was discarded.
    Reset,
}

struct Ring<T> {
    slots: Vec<T>,
    // index of the oldest entry once the ring is full, always 0 before
    head: usize,
}

impl<T: Copy + Timestamped> Ring<T> {
    fn halves(&self) -> (&[T], &[T]) {
        let (newer, older) = self.slots.split_at(self.head);
        (older, newer)
    }

    fn newest(&self) -> Option<&T> {
        if self.slots.is_empty() {
            None
        } else if self.head == 0 {
            self.slots.last()
        } else {
            self.slots.get(self.head - 1)
        }
    }
}

/// Fixed-capacity circular buffer, newest data wins.
pub struct RingBuffer<T> {
    ring: Mutex<Ring<T>>,
    capacity: usize,
}

impl<T: Copy + Timestamped> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` entries (at least one).
    ///
    /// All storage is allocated here, pushes never allocate.
    pub fn new(capacity: usize) -> RingBuffer<T> {
        let capacity = capacity.max(1);

        RingBuffer {
            ring: Mutex::new(Ring {
                slots: Vec::with_capacity(capacity),
                head: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ring.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, item: T) -> Pushed {
        let mut ring = self.ring.lock();

        let mut outcome = Pushed::Appended;
        if let Some(newest) = ring.newest() {
            if item.timestamp() < newest.timestamp() {
                ring.slots.clear();
                ring.head = 0;
                outcome = Pushed::Reset;
            }
        }

        if ring.slots.len() < self.capacity {
            ring.slots.push(item);
        } else {
            let head = ring.head;
            ring.slots[head] = item;
            ring.head = (head + 1) % self.capacity;
            if outcome == Pushed::Appended {
                outcome = Pushed::Overwrote;
            }
        }

        outcome
    }

    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.slots.clear();
        ring.head = 0;
    }

    pub fn newest_timestamp(&self) -> Option<u64> {
        self.ring.lock().newest().map(|item| item.timestamp())
    }

    /// Ordered copy of the held entries, oldest first.
    ///
    /// With `max_age`, only entries whose timestamp is within `max_age` of the newest
    /// held entry are returned.
    pub fn snapshot(&self, max_age: Option<u64>) -> Vec<T> {
        let mut out = Vec::with_capacity(self.capacity);
        let ring = self.ring.lock();
        copy_window(&ring, max_age, &mut out);
        out
    }

    /// Like [`RingBuffer::snapshot`], reusing `out` and giving up after `timeout`.
    pub fn try_snapshot_into(
        &self,
        timeout: Duration,
        max_age: Option<u64>,
        out: &mut Vec<T>,
    ) -> Result<usize, Contended> {
        out.clear();
        let ring = self.ring.try_lock_for(timeout).ok_or(Contended)?;
        copy_window(&ring, max_age, out);
        Ok(out.len())
    }

    /// (used, allocated) bytes.
    pub fn memory_footprint(&self) -> (usize, usize) {
        let item_size = std::mem::size_of::<T>();
        (self.len() * item_size, self.capacity * item_size)
    }

    #[cfg(test)]
    pub(crate) fn hold_lock(&self) -> parking_lot::MutexGuard<'_, impl Sized> {
        self.ring.lock()
    }
}

fn copy_window<T: Copy + Timestamped>(ring: &Ring<T>, max_age: Option<u64>, out: &mut Vec<T>) {
    let (older, newer) = ring.halves();

    let min_timestamp = match (max_age, ring.newest()) {
        (Some(age), Some(newest)) => newest.timestamp().saturating_sub(age),
        _ => 0,
    };

    // each half is individually sorted, so the window start is a partition point
    let start = older.partition_point(|item| item.timestamp() < min_timestamp);
    out.extend_from_slice(&older[start..]);
    let start = newer.partition_point(|item| item.timestamp() < min_timestamp);
    out.extend_from_slice(&newer[start..]);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::sample::Sample;

    fn timestamps(samples: &[Sample]) -> Vec<u64> {
        samples.iter().map(|sample| sample.timestamp).collect()
    }

    #[test]
    fn keeps_most_recent_in_order() {
        let buffer = RingBuffer::new(5);
        for t in 1..=7 {
            buffer.push(Sample::scalar(t, t as f64 * 10.0));
        }

        let snapshot = buffer.snapshot(None);
        assert_eq!(timestamps(&snapshot), vec![3, 4, 5, 6, 7]);
        assert_eq!(snapshot[0].value(0), Some(30.0));
        assert_eq!(snapshot[4].value(0), Some(70.0));
    }

    #[test]
    fn never_exceeds_capacity() {
        for capacity in [1, 2, 3, 8, 13] {
            let buffer = RingBuffer::new(capacity);
            for t in 0..(capacity as u64 * 3 + 1) {
                let outcome = buffer.push(Sample::scalar(t, 0.0));
                assert!(buffer.len() <= capacity);
                if t >= capacity as u64 {
                    assert_eq!(outcome, Pushed::Overwrote);
                }
            }

            let snapshot = buffer.snapshot(None);
            let last = capacity as u64 * 3;
            let expected: Vec<u64> = (last + 1 - capacity as u64..=last).collect();
            assert_eq!(timestamps(&snapshot), expected);
        }
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let buffer = RingBuffer::new(0);
        buffer.push(Sample::scalar(1, 1.0));
        buffer.push(Sample::scalar(2, 2.0));

        assert_eq!(buffer.capacity(), 1);
        assert_eq!(timestamps(&buffer.snapshot(None)), vec![2]);
    }

    #[test]
    fn max_age_is_relative_to_newest() {
        let buffer = RingBuffer::new(4);
        for t in [10, 20, 30, 40, 50, 60] {
            buffer.push(Sample::scalar(t, 0.0));
        }

        // ring wrapped: held [30, 40, 50, 60]
        assert_eq!(timestamps(&buffer.snapshot(Some(15))), vec![50, 60]);
        assert_eq!(timestamps(&buffer.snapshot(Some(30))), vec![30, 40, 50, 60]);
        assert_eq!(timestamps(&buffer.snapshot(Some(0))), vec![60]);
        assert_eq!(buffer.newest_timestamp(), Some(60));
    }

    #[test]
    fn clock_reset_discards_older_content() {
        let buffer = RingBuffer::new(3);
        for t in [100, 200, 300, 400] {
            buffer.push(Sample::scalar(t, 0.0));
        }

        assert_eq!(buffer.push(Sample::scalar(5, 0.0)), Pushed::Reset);
        buffer.push(Sample::scalar(6, 0.0));
        assert_eq!(timestamps(&buffer.snapshot(None)), vec![5, 6]);
    }

    #[test]
    fn contended_snapshot_gives_up() {
        let buffer = RingBuffer::new(4);
        buffer.push(Sample::scalar(1, 0.0));

        let mut out = vec![Sample::default(); 3];
        {
            let _guard = buffer.hold_lock();
            let buffer = &buffer;
            let result = thread::scope(|scope| {
                scope
                    .spawn(|| buffer.try_snapshot_into(Duration::from_millis(5), None, &mut out))
                    .join()
                    .unwrap()
            });
            assert_eq!(result, Err(Contended));
        }
        assert!(out.is_empty());

        assert_eq!(
            buffer.try_snapshot_into(Duration::from_millis(5), None, &mut out),
            Ok(1)
        );
    }

    #[test]
    fn concurrent_snapshots_stay_monotonic() {
        let buffer = Arc::new(RingBuffer::new(64));
        let done = Arc::new(AtomicBool::new(false));

        let producer = {
            let buffer = buffer.clone();
            let done = done.clone();
            thread::spawn(move || {
                for t in 0..200_000u64 {
                    buffer.push(Sample::scalar(t, t as f64));
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let mut checked = 0;
        let mut scratch = Vec::new();
        while !done.load(Ordering::SeqCst) || checked == 0 {
            if buffer
                .try_snapshot_into(Duration::from_millis(10), Some(40), &mut scratch)
                .is_ok()
            {
                assert!(scratch.len() <= 64);
                assert!(scratch.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
                assert!(scratch.iter().all(|s| s.value(0) == Some(s.timestamp as f64)));
                checked += 1;
            }
        }

        producer.join().unwrap();
        assert!(checked > 0);
    }
}
