use std::time::{Duration, Instant};

use crate::view::Range;

/// Smallest vertical span an autoscaled axis is allowed to collapse to.
const MIN_SPAN: f64 = 1e-3;

#[derive(Debug, Clone, Copy)]
struct PendingShrink {
    // union of every tight range observed since the shrink became possible
    envelope: Range,
    since: Instant,
}

/// Vertical autoscale with hysteresis.
///
/// The range grows immediately to include anything observed, but only shrinks
/// once a full decay period has passed without data outside the shrunk range;
/// it then shrinks to the envelope of what was seen during that period.
#[derive(Debug, Clone, Default)]
pub struct Autoscaler {
    current: Option<Range>,
    pending: Option<PendingShrink>,
}

impl Autoscaler {
    pub fn new() -> Autoscaler {
        Autoscaler::default()
    }

    pub fn current(&self) -> Option<Range> {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.pending = None;
    }

    /// Feed the extent of the currently visible samples and get the range to display.
    ///
    /// `None` as `observed` (nothing visible) keeps the previous range.
    pub fn update(
        &mut self,
        observed: Option<Range>,
        margin: f64,
        decay: Duration,
        now: Instant,
    ) -> Option<Range> {
        let Some(observed) = observed.filter(Range::is_finite) else {
            return self.current;
        };
        let tight = observed.padded(margin, 0.0).with_min_span(MIN_SPAN);

        let current = match self.current {
            None => {
                self.current = Some(tight);
                return self.current;
            }
            Some(current) => current,
        };

        if !current.contains_range(tight) {
            self.current = Some(Range::union(current, tight));
            self.pending = None;
        } else if tight == current {
            self.pending = None;
        } else {
            let pending = match self.pending {
                Some(mut pending) => {
                    pending.envelope = Range::union(pending.envelope, tight);
                    pending
                }
                None => PendingShrink {
                    envelope: tight,
                    since: now,
                },
            };

            if now.saturating_duration_since(pending.since) >= decay {
                self.current = Some(pending.envelope);
                self.pending = None;
            } else {
                self.pending = Some(pending);
            }
        }

        self.current
    }
}

/// Min/max over `values`, ignoring non-finite ones.
pub fn extent<I: IntoIterator<Item = f64>>(values: I) -> Option<Range> {
    let mut range: Option<Range> = None;
    for value in values {
        if !value.is_finite() {
            continue;
        }
        match &mut range {
            None => range = Some(Range::new(value, value)),
            Some(range) => range.expand_to_include(value),
        }
    }
    range
}
