//! Renderer boundary.
//!
//! A [`Renderer`] receives the axes once per frame and then one line strip per
//! plotted trace. Vertices are in normalized device coordinates.

use crate::frame::{Frame, TraceId, Vertex};
use crate::settings::Color;
use crate::view::Viewport;

pub trait Renderer {
    fn set_axes(&mut self, viewport: &Viewport);

    fn draw_line_strip(&mut self, trace: TraceId, points: &[Vertex], color: Color);
}

pub fn dispatch<R: Renderer + ?Sized>(frame: &Frame, renderer: &mut R) {
    renderer.set_axes(&frame.viewport);
    for strip in &frame.strips {
        renderer.draw_line_strip(strip.trace, &strip.points, strip.color);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Axes(Viewport),
    LineStrip {
        trace: TraceId,
        points: Vec<Vertex>,
        color: Color,
    },
}

/// Renderer that records every call, for tests and headless use.
#[derive(Debug, Default, Clone)]
pub struct FrameRecorder {
    calls: Vec<RenderCall>,
}

impl FrameRecorder {
    pub fn new() -> FrameRecorder {
        FrameRecorder::default()
    }

    pub fn calls(&self) -> &[RenderCall] {
        &self.calls
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Number of frames started so far.
    pub fn frames(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, RenderCall::Axes(_)))
            .count()
    }

    pub fn last_axes(&self) -> Option<&Viewport> {
        self.calls.iter().rev().find_map(|call| match call {
            RenderCall::Axes(viewport) => Some(viewport),
            _ => None,
        })
    }

    /// Every strip drawn for `trace`, oldest frame first.
    pub fn strips_for(&self, trace: TraceId) -> Vec<&[Vertex]> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::LineStrip {
                    trace: drawn,
                    points,
                    ..
                } if *drawn == trace => Some(points.as_slice()),
                _ => None,
            })
            .collect()
    }
}

impl Renderer for FrameRecorder {
    fn set_axes(&mut self, viewport: &Viewport) {
        self.calls.push(RenderCall::Axes(*viewport));
    }

    fn draw_line_strip(&mut self, trace: TraceId, points: &[Vertex], color: Color) {
        self.calls.push(RenderCall::LineStrip {
            trace,
            points: points.to_vec(),
            color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;
    use crate::frame::LineStrip;
    use crate::view::Range;

    #[test]
    fn dispatch_sets_axes_before_strips() {
        let trace = TraceId::new(DeviceId(1), 0);
        let frame = Frame {
            viewport: Viewport::new(Range::new(-5.0, 0.0), Range::new(0.0, 1.0)),
            strips: vec![LineStrip {
                trace,
                color: Color::RED,
                points: vec![[-1.0, 0.0], [1.0, 0.5]],
            }],
            skipped: Vec::new(),
        };
        let mut recorder = FrameRecorder::new();

        dispatch(&frame, &mut recorder);

        assert_eq!(recorder.calls()[0], RenderCall::Axes(frame.viewport));
        assert_eq!(recorder.frames(), 1);
        assert_eq!(
            recorder.strips_for(trace),
            vec![&[[-1.0, 0.0], [1.0, 0.5]][..]]
        );
    }
}
