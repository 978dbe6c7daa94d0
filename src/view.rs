//! Axis ranges and the projection from data space into display coordinates.

const MIN_SPAN: f64 = 1e-9;

/// Numeric range with inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    /// Create a new range, swapping bounds if needed.
    pub fn new(mut min: f64, mut max: f64) -> Range {
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }
        Range { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn contains_range(&self, other: Range) -> bool {
        other.min >= self.min && other.max <= self.max
    }

    pub fn expand_to_include(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn union(a: Range, b: Range) -> Range {
        Range {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    /// Add `frac` of the span on both sides, at least `min_padding`.
    pub fn padded(&self, frac: f64, min_padding: f64) -> Range {
        let padding = (self.span().abs() * frac).max(min_padding);
        Range {
            min: self.min - padding,
            max: self.max + padding,
        }
    }

    /// Ensure the range has at least the given span, keeping its center.
    pub fn with_min_span(&self, min_span: f64) -> Range {
        if self.span() >= min_span {
            return *self;
        }
        let center = (self.min + self.max) * 0.5;
        let half = min_span * 0.5;
        Range {
            min: center - half,
            max: center + half,
        }
    }
}

/// Visible data ranges on both axes; X is seconds relative to the newest sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: Range,
    pub y: Range,
}

impl Viewport {
    pub fn new(x: Range, y: Range) -> Viewport {
        Viewport { x, y }
    }
}

/// Maps data coordinates into normalized device coordinates, `[-1, 1]` on both axes.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    x: Range,
    y: Range,
}

impl Projection {
    pub fn new(viewport: Viewport) -> Option<Projection> {
        if !viewport.x.is_finite() || !viewport.y.is_finite() {
            return None;
        }
        Some(Projection {
            x: viewport.x.with_min_span(MIN_SPAN),
            y: viewport.y.with_min_span(MIN_SPAN),
        })
    }

    pub fn project(&self, x: f64, y: f64) -> Option<[f32; 2]> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let nx = 2.0 * (x - self.x.min) / self.x.span() - 1.0;
        let ny = 2.0 * (y - self.y.min) / self.y.span() - 1.0;
        Some([nx as f32, ny as f32])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_with_min_span_expands() {
        let range = Range::new(2.0, 2.0);
        let expanded = range.with_min_span(1.0);
        assert!(expanded.span() >= 1.0);
        assert!(((expanded.min + expanded.max) * 0.5 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn projection_maps_corners() {
        let viewport = Viewport::new(Range::new(-5.0, 0.0), Range::new(3.0, 4.0));
        let projection = Projection::new(viewport).unwrap();

        assert_eq!(projection.project(-5.0, 3.0), Some([-1.0, -1.0]));
        assert_eq!(projection.project(0.0, 4.0), Some([1.0, 1.0]));
        assert_eq!(projection.project(-2.5, 3.5), Some([0.0, 0.0]));
        assert_eq!(projection.project(f64::NAN, 3.5), None);
    }

    #[test]
    fn flat_range_does_not_divide_by_zero() {
        let viewport = Viewport::new(Range::new(-1.0, 0.0), Range::new(2.0, 2.0));
        let projection = Projection::new(viewport).unwrap();

        let [_, y] = projection.project(0.0, 2.0).unwrap();
        assert!(y.abs() < 1e-6);
    }
}
