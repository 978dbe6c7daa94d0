//! Per-frame vertex construction.
//!
//! Everything here is a pure function of buffer snapshots and settings, so a
//! frame can be built and checked without threads, devices or a renderer.

use crate::autoscale;
use crate::device::DeviceId;
use crate::sample::Sample;
use crate::settings::{Color, GraphSettings};
use crate::view::{Projection, Range, Viewport};

/// A vertex in normalized device coordinates.
pub type Vertex = [f32; 2];

/// One plotted line: a single field of a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId {
    pub device: DeviceId,
    pub field: usize,
}

impl TraceId {
    pub fn new(device: DeviceId, field: usize) -> TraceId {
        TraceId { device, field }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineStrip {
    pub trace: TraceId,
    pub color: Color,
    pub points: Vec<Vertex>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub viewport: Viewport,
    pub strips: Vec<LineStrip>,
    /// Devices whose buffer could not be read in time; their traces are not in `strips`.
    pub skipped: Vec<DeviceId>,
}

impl Frame {
    pub fn strip(&self, trace: TraceId) -> Option<&LineStrip> {
        self.strips.iter().find(|strip| strip.trace == trace)
    }
}

/// Windowed samples of one device, as read for the current frame.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSamples<'a> {
    pub device: DeviceId,
    pub samples: &'a [Sample],
    /// Per-field enable flags; fields past the end are enabled.
    pub enabled: &'a [bool],
}

impl DeviceSamples<'_> {
    fn is_enabled(&self, field: usize) -> bool {
        self.enabled.get(field).copied().unwrap_or(true)
    }

    fn plotted_fields<'s>(
        &'s self,
        settings: &'s GraphSettings,
    ) -> impl Iterator<Item = usize> + 's {
        (0..settings.field_count())
            .filter(move |&field| settings.is_trace_visible(field) && self.is_enabled(field))
    }
}

/// Seconds between `timestamp` and `newest`, as a non-positive X coordinate.
fn relative_seconds(timestamp: u64, newest: u64) -> f64 {
    -(newest.saturating_sub(timestamp) as f64 / 1e6)
}

/// Value extent over every plotted trace, the input to autoscaling.
pub fn visible_extent(settings: &GraphSettings, devices: &[DeviceSamples]) -> Option<Range> {
    let mut extent: Option<Range> = None;
    for device in devices {
        for field in device.plotted_fields(settings) {
            let field_extent =
                autoscale::extent(device.samples.iter().filter_map(|sample| sample.value(field)));
            extent = match (extent, field_extent) {
                (Some(a), Some(b)) => Some(Range::union(a, b)),
                (a, b) => a.or(b),
            };
        }
    }
    extent
}

/// Build the line strips for one frame with `y` as the vertical axis range.
///
/// X spans the configured time window ending at each device's newest sample.
/// Traces with more than `max_vertices` points are min/max decimated.
pub fn assemble(
    settings: &GraphSettings,
    y: Range,
    devices: &[DeviceSamples],
    skipped: Vec<DeviceId>,
    max_vertices: usize,
) -> Frame {
    let viewport = Viewport::new(Range::new(-settings.time_window_seconds, 0.0), y);
    let mut strips = Vec::new();

    let Some(projection) = Projection::new(viewport) else {
        log::warn!("non-finite viewport {:?}, nothing drawn", viewport);
        return Frame {
            viewport,
            strips,
            skipped,
        };
    };

    let mut points = Vec::new();
    let mut scratch = DecimationScratch::default();

    for device in devices {
        let Some(newest) = device.samples.last().map(|sample| sample.timestamp) else {
            continue;
        };

        for field in device.plotted_fields(settings) {
            points.clear();
            points.extend(device.samples.iter().filter_map(|sample| {
                let value = sample.value(field)?;
                Some(Point::new(relative_seconds(sample.timestamp, newest), value))
            }));
            if points.is_empty() {
                continue;
            }

            let source = if points.len() > max_vertices && max_vertices >= 2 {
                decimate_minmax(&points, viewport.x, max_vertices / 2, &mut scratch)
            } else {
                &points[..]
            };

            strips.push(LineStrip {
                trace: TraceId::new(device.device, field),
                color: settings.trace_color(field),
                points: source
                    .iter()
                    .filter_map(|point| projection.project(point.x, point.y))
                    .collect(),
            });
        }
    }

    Frame {
        viewport,
        strips,
        skipped,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

impl Point {
    fn new(x: f64, y: f64) -> Point {
        Point { x, y }
    }
}

#[derive(Debug, Default)]
struct DecimationScratch {
    buckets: Vec<Bucket>,
    points: Vec<Point>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    extrema: Option<(Point, Point)>,
}

impl Bucket {
    fn push(&mut self, point: Point) {
        self.extrema = match self.extrema {
            None => Some((point, point)),
            Some((min, max)) => Some((
                if point.y < min.y { point } else { min },
                if point.y > max.y { point } else { max },
            )),
        };
    }

    // emit in time order so the strip never doubles back
    fn push_ordered(&self, out: &mut Vec<Point>) {
        match self.extrema {
            None => {}
            Some((min, max)) if min == max => out.push(min),
            Some((min, max)) if min.x <= max.x => out.extend([min, max]),
            Some((min, max)) => out.extend([max, min]),
        }
    }
}

/// Reduce `points` to at most two per bucket, keeping each bucket's extrema.
fn decimate_minmax<'a>(
    points: &[Point],
    x_range: Range,
    buckets: usize,
    scratch: &'a mut DecimationScratch,
) -> &'a [Point] {
    scratch.points.clear();
    let span = x_range.span();
    if buckets == 0 || span <= 0.0 {
        scratch.points.extend_from_slice(points);
        return &scratch.points;
    }

    scratch.buckets.clear();
    scratch.buckets.resize(buckets, Bucket::default());

    let width = buckets as f64;
    for point in points {
        let t = (point.x - x_range.min) / span;
        if !(0.0..=1.0).contains(&t) || !point.y.is_finite() {
            continue;
        }
        let index = ((t * width) as usize).min(buckets - 1);
        scratch.buckets[index].push(*point);
    }

    for bucket in &scratch.buckets {
        bucket.push_ordered(&mut scratch.points);
    }
    &scratch.points
}
