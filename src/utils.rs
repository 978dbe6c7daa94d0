use std::time::{Duration, Instant};

pub fn human_readable_size(size: usize) -> String {
    const T: usize = 2048;

    if size < T {
        format!("{} B", size)
    } else if (size / 1024) < T {
        format!("{} KiB", size / 1024)
    } else if (size / 1024 / 1024) < T {
        format!("{} MiB", size / 1024 / 1024)
    } else {
        format!("{} GiB", size / 1024 / 1024 / 1024)
    }
}

/// Rate limiter for repetitive log lines.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
    suppressed: usize,
}

impl Throttle {
    pub fn new(interval: Duration) -> Throttle {
        Throttle {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// `Some(n)` if the event should be reported now, `n` being how many were
    /// swallowed since the last report; `None` if it should be swallowed.
    pub fn check(&mut self, now: Instant) -> Option<usize> {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };

        if due {
            self.last = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_formatted_with_binary_units() {
        assert_eq!(human_readable_size(100), "100 B");
        assert_eq!(human_readable_size(4096), "4 KiB");
        assert_eq!(human_readable_size(3 * 1024 * 1024), "3 MiB");
    }

    #[test]
    fn throttle_counts_suppressed_events() {
        let start = Instant::now();
        let mut throttle = Throttle::new(Duration::from_secs(5));

        assert_eq!(throttle.check(start), Some(0));
        assert_eq!(throttle.check(start + Duration::from_secs(1)), None);
        assert_eq!(throttle.check(start + Duration::from_secs(4)), None);
        assert_eq!(throttle.check(start + Duration::from_secs(5)), Some(2));
        assert_eq!(throttle.check(start + Duration::from_secs(6)), None);
    }
}
