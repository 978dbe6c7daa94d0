/// Upper bound on the number of scalar fields a single sample can carry.
pub const MAX_FIELDS: usize = 4;

/// One timestamped data point: up to [`MAX_FIELDS`] scalar values.
///
/// The value storage is inline so pushing a sample never allocates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: u64,
    values: [f64; MAX_FIELDS],
    len: u8,
}

impl Sample {
    /// Build a sample from the given field values.
    ///
    /// Values past [`MAX_FIELDS`] are dropped (debug builds assert instead).
    pub fn new(timestamp: u64, fields: &[f64]) -> Sample {
        debug_assert!(fields.len() <= MAX_FIELDS, "too many fields: {}", fields.len());

        let len = fields.len().min(MAX_FIELDS);
        let mut values = [0.0; MAX_FIELDS];
        values[..len].copy_from_slice(&fields[..len]);

        Sample {
            timestamp,
            values,
            len: len as u8,
        }
    }

    pub fn scalar(timestamp: u64, value: f64) -> Sample {
        Sample::new(timestamp, &[value])
    }

    pub fn values(&self) -> &[f64] {
        &self.values[..self.len as usize]
    }

    pub fn value(&self, field: usize) -> Option<f64> {
        self.values().get(field).copied()
    }

    pub fn field_count(&self) -> usize {
        self.len as usize
    }
}

impl Default for Sample {
    fn default() -> Self {
        Sample {
            timestamp: 0,
            values: [0.0; MAX_FIELDS],
            len: 0,
        }
    }
}

/// Anything carrying a monotonic timestamp, used by the ring buffer to window snapshots.
pub trait Timestamped {
    fn timestamp(&self) -> u64;
}

impl Timestamped for Sample {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_kept_in_order() {
        let sample = Sample::new(10, &[1.0, -2.0, 3.5]);

        assert_eq!(sample.values(), &[1.0, -2.0, 3.5]);
        assert_eq!(sample.field_count(), 3);
        assert_eq!(sample.value(1), Some(-2.0));
        assert_eq!(sample.value(3), None);
    }
}
