//! egui implementation of the renderer boundary.

use eframe::egui::{self, Align2, Color32, FontId, Pos2, Rect, Sense, Shape, Stroke};

use crate::frame::{TraceId, Vertex};
use crate::render::Renderer;
use crate::settings::Color;
use crate::view::Viewport;

const LINE_WIDTH: f32 = 1.5;
const GRID_LINES: usize = 4;
const LABEL_FONT_SIZE: f32 = 11.0;

struct Strip {
    trace: TraceId,
    points: Vec<Vertex>,
    color: Color,
}

/// Collects one frame of line strips, then paints them into an egui `Ui`.
#[derive(Default)]
pub struct PlotPainter {
    viewport: Option<Viewport>,
    strips: Vec<Strip>,
    // strips from earlier frames, kept for their allocations
    spare: Vec<Strip>,
}

impl PlotPainter {
    pub fn new() -> PlotPainter {
        PlotPainter::default()
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    pub fn trace_count(&self) -> usize {
        self.strips.len()
    }

    pub fn traces(&self) -> impl Iterator<Item = TraceId> + '_ {
        self.strips.iter().map(|strip| strip.trace)
    }

    /// Paint the collected frame into the remaining space of `ui`.
    pub fn paint(&self, ui: &mut egui::Ui, units: &str) -> egui::Response {
        let size = ui.available_size_before_wrap().max(egui::vec2(64.0, 48.0));
        let (response, painter) = ui.allocate_painter(size, Sense::hover());
        let rect = response.rect;
        let visuals = ui.visuals();

        painter.rect_filled(rect, 2.0, visuals.extreme_bg_color);

        let grid = Stroke::new(1.0, visuals.faint_bg_color);
        let text_color = visuals.weak_text_color();
        let font = FontId::monospace(LABEL_FONT_SIZE);

        for line in 0..=GRID_LINES {
            let t = line as f32 / GRID_LINES as f32;
            let y = rect.bottom() - t * rect.height();
            painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], grid);
            let x = rect.left() + t * rect.width();
            painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], grid);

            if let Some(viewport) = &self.viewport {
                let value = viewport.y.min + t as f64 * viewport.y.span();
                painter.text(
                    Pos2::new(rect.left() + 2.0, y),
                    if line == 0 {
                        Align2::LEFT_BOTTOM
                    } else {
                        Align2::LEFT_TOP
                    },
                    format!("{:.3} {}", value, units),
                    font.clone(),
                    text_color,
                );

                let seconds = viewport.x.min + t as f64 * viewport.x.span();
                painter.text(
                    Pos2::new(x, rect.bottom() - 2.0),
                    if line == GRID_LINES {
                        Align2::RIGHT_BOTTOM
                    } else {
                        Align2::CENTER_BOTTOM
                    },
                    format!("{:.1} s", seconds),
                    font.clone(),
                    text_color,
                );
            }
        }

        let clipped = painter.with_clip_rect(rect);
        for strip in &self.strips {
            let [r, g, b] = [strip.color.r, strip.color.g, strip.color.b];
            let stroke = Stroke::new(LINE_WIDTH, Color32::from_rgb(r, g, b));
            let points: Vec<Pos2> = strip
                .points
                .iter()
                .map(|vertex| to_screen(rect, *vertex))
                .collect();

            match points.len() {
                0 => {}
                1 => {
                    clipped.circle_filled(points[0], LINE_WIDTH, stroke.color);
                }
                _ => {
                    clipped.add(Shape::line(points, stroke));
                }
            }
        }

        response
    }
}

/// Map a normalized device coordinate into `rect`, Y pointing up.
pub fn to_screen(rect: Rect, [x, y]: Vertex) -> Pos2 {
    Pos2::new(
        rect.left() + (x + 1.0) * 0.5 * rect.width(),
        rect.bottom() - (y + 1.0) * 0.5 * rect.height(),
    )
}

impl Renderer for PlotPainter {
    fn set_axes(&mut self, viewport: &Viewport) {
        self.viewport = Some(*viewport);
        self.spare.append(&mut self.strips);
    }

    fn draw_line_strip(&mut self, trace: TraceId, points: &[Vertex], color: Color) {
        let mut strip = self.spare.pop().unwrap_or(Strip {
            trace,
            points: Vec::new(),
            color,
        });
        strip.trace = trace;
        strip.color = color;
        strip.points.clear();
        strip.points.extend_from_slice(points);
        self.strips.push(strip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;
    use crate::view::Range;

    #[test]
    fn corners_map_to_rect_corners() {
        let rect = Rect::from_min_max(Pos2::new(10.0, 20.0), Pos2::new(110.0, 70.0));

        assert_eq!(to_screen(rect, [-1.0, -1.0]), Pos2::new(10.0, 70.0));
        assert_eq!(to_screen(rect, [1.0, 1.0]), Pos2::new(110.0, 20.0));
        assert_eq!(to_screen(rect, [0.0, 0.0]), Pos2::new(60.0, 45.0));
    }

    #[test]
    fn each_frame_replaces_the_previous_strips() {
        let mut painter = PlotPainter::new();
        let viewport = Viewport::new(Range::new(-5.0, 0.0), Range::new(0.0, 1.0));
        let a = TraceId::new(DeviceId(1), 0);
        let b = TraceId::new(DeviceId(2), 0);

        painter.set_axes(&viewport);
        painter.draw_line_strip(a, &[[0.0, 0.0]], Color::RED);
        painter.draw_line_strip(b, &[[0.0, 0.0]], Color::BLUE);
        assert_eq!(painter.trace_count(), 2);

        painter.set_axes(&viewport);
        painter.draw_line_strip(b, &[[0.5, 0.5], [1.0, 1.0]], Color::BLUE);

        assert_eq!(painter.traces().collect::<Vec<_>>(), vec![b]);
        assert_eq!(painter.strips[0].points, vec![[0.5, 0.5], [1.0, 1.0]]);
        assert_eq!(painter.viewport(), Some(&viewport));
    }
}
