//! # Pitch Graph Widget
//!
//! Canvas drawing the reference and live pitch contours on a zoomable,
//! pannable time axis. Layout comes from `cantor_core::render`; this widget
//! only turns the laid-out scene into canvas geometry and translates pointer
//! input into viewport messages.
//!
//! Several graphs can be on screen at once (the normal view and the
//! full-screen view), each with its own viewport. Wheel and press events are
//! only acted on when the pointer is inside this instance's bounds.

use cantor_core::marker::{Marker, Region, Severity};
use cantor_core::render::{
    CurveOptions, CurveSegment, FrequencyAxis, Scene, SceneInput, StrokeKind, render_scene,
};
use cantor_core::viewport::{PlotArea, Timeline, ViewportController};
use cantor_core::PitchSample;
use iced::widget::canvas::{self, event, Event, Frame, Geometry, LineDash, Path, Stroke, Text};
use iced::{alignment, mouse, Color, Element, Length, Point, Rectangle, Renderer, Size, Theme};

use crate::Message;

/// Pointer travel before a press becomes a drag.
const DRAG_THRESHOLD_PX: f32 = 3.0;
/// How close a click has to be to a marker to seek to it.
const MARKER_HIT_PX: f32 = 6.0;
/// Pixel scroll deltas per wheel line.
const PIXELS_PER_LINE: f32 = 40.0;

const BACKGROUND: Color = Color::from_rgb(0.12, 0.12, 0.14);
const GRID: Color = Color::from_rgba(1.0, 1.0, 1.0, 0.08);
const LABEL: Color = Color::from_rgb(0.62, 0.62, 0.66);
const REFERENCE: Color = Color::from_rgb(0.35, 0.62, 0.95);
const LIVE: Color = Color::from_rgb(0.98, 0.60, 0.22);
const CURSOR: Color = Color::from_rgb(0.95, 0.95, 0.95);
const MISMATCH: Color = Color::from_rgb(1.0, 0.2, 0.2);

const TENTATIVE_DASH: &[f32] = &[6.0, 4.0];
const BRIDGE_DASH: &[f32] = &[2.0, 4.0];

/// Which graph instance a message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphId {
    Normal,
    FullScreen,
}

/// Pointer input, already filtered to this instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GraphEvent {
    /// The canvas bounds no longer match the viewport's plot area.
    Resized { width: f32, height: f32 },
    /// A press moved past the drag threshold.
    DragStarted { anchor: f32, x: f32 },
    Dragged { x: f32 },
    DragEnded,
    Wheel { x: f32, lines: f32 },
    /// A press released without dragging. Carries the timeline position to
    /// seek to: the nearest marker's time, or the time under the pointer.
    Clicked { time: f64 },
}

#[derive(Debug, Default)]
pub struct Interaction {
    pressed_at: Option<Point>,
    dragging: bool,
}

pub struct PitchGraph<'a> {
    pub id: GraphId,
    pub viewport: &'a ViewportController,
    pub timeline: Timeline,
    pub reference: &'a [PitchSample],
    pub live: &'a [PitchSample],
    pub markers: &'a [Marker],
    pub regions: &'a [Region],
    pub audio_duration: Option<f64>,
    pub show_cursor: bool,
    pub axis: FrequencyAxis,
    pub options: CurveOptions,
}

impl<'a> PitchGraph<'a> {
    pub fn view(self, height: Length) -> Element<'a, Message> {
        canvas::Canvas::new(self)
            .width(Length::Fill)
            .height(height)
            .into()
    }

    fn scene(&self, size: Size) -> Scene {
        let plot = PlotArea::new(size.width, size.height);
        let mut viewport = self.viewport.clone();
        viewport.set_plot(plot);
        render_scene(&SceneInput {
            plot,
            window: viewport.visible_window(&self.timeline),
            reference: self.reference,
            live: self.live,
            current_time: self.show_cursor.then_some(self.timeline.current_time),
            audio_duration: self.audio_duration,
            markers: self.markers,
            regions: self.regions,
            axis: self.axis,
            options: self.options,
        })
    }

    fn message(&self, event: GraphEvent) -> Option<Message> {
        Some(Message::Graph(self.id, event))
    }
}

impl canvas::Program<Message> for PitchGraph<'_> {
    type State = Interaction;

    fn update(
        &self,
        state: &mut Self::State,
        event: Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> (event::Status, Option<Message>) {
        let Event::Mouse(mouse_event) = event else {
            return (event::Status::Ignored, None);
        };

        let plot = self.viewport.plot();
        if (plot.width - bounds.width).abs() > 0.5 || (plot.height - bounds.height).abs() > 0.5 {
            let resized = GraphEvent::Resized {
                width: bounds.width,
                height: bounds.height,
            };
            return (event::Status::Ignored, self.message(resized));
        }

        match mouse_event {
            mouse::Event::ButtonPressed(mouse::Button::Left) => {
                let Some(position) = cursor.position_in(bounds) else {
                    return (event::Status::Ignored, None);
                };
                state.pressed_at = Some(position);
                state.dragging = false;
                (event::Status::Captured, None)
            }
            mouse::Event::CursorMoved { position } => {
                let Some(origin) = state.pressed_at else {
                    return (event::Status::Ignored, None);
                };
                // A drag keeps tracking outside the bounds once started here.
                let x = position.x - bounds.x;
                if state.dragging {
                    return (event::Status::Captured, self.message(GraphEvent::Dragged { x }));
                }
                if (x - origin.x).abs() < DRAG_THRESHOLD_PX {
                    return (event::Status::Captured, None);
                }
                state.dragging = true;
                let started = GraphEvent::DragStarted { anchor: origin.x, x };
                (event::Status::Captured, self.message(started))
            }
            mouse::Event::ButtonReleased(mouse::Button::Left) => {
                let Some(origin) = state.pressed_at.take() else {
                    return (event::Status::Ignored, None);
                };
                if std::mem::take(&mut state.dragging) {
                    return (event::Status::Captured, self.message(GraphEvent::DragEnded));
                }
                let scene = self.scene(bounds.size());
                if !scene.plot.contains(origin.x, origin.y) {
                    return (event::Status::Captured, None);
                }
                let time = scene
                    .hit_test_marker(origin.x, MARKER_HIT_PX)
                    .map(|marker| marker.time)
                    .unwrap_or_else(|| scene.time_at(origin.x));
                (event::Status::Captured, self.message(GraphEvent::Clicked { time }))
            }
            mouse::Event::WheelScrolled { delta } => {
                let Some(position) = cursor.position_in(bounds) else {
                    return (event::Status::Ignored, None);
                };
                let lines = match delta {
                    mouse::ScrollDelta::Lines { y, .. } => y,
                    mouse::ScrollDelta::Pixels { y, .. } => y / PIXELS_PER_LINE,
                };
                if lines == 0.0 {
                    return (event::Status::Ignored, None);
                }
                let wheel = GraphEvent::Wheel { x: position.x, lines };
                (event::Status::Captured, self.message(wheel))
            }
            _ => (event::Status::Ignored, None),
        }
    }

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        if !bounds.width.is_finite() || !bounds.height.is_finite() {
            return vec![frame.into_geometry()];
        }

        let scene = self.scene(bounds.size());
        let plot = scene.plot;
        frame.fill_rectangle(
            Point::new(plot.plot_left(), plot.plot_top()),
            Size::new(plot.plot_width(), plot.plot_height()),
            BACKGROUND,
        );

        draw_regions(&mut frame, &scene);
        draw_grid(&mut frame, &scene);
        draw_curve(&mut frame, &scene.reference, REFERENCE);
        draw_curve(&mut frame, &scene.live, LIVE);

        if let Some(x) = scene.cursor_x {
            let line = Path::line(Point::new(x, plot.plot_top()), Point::new(x, plot.plot_bottom()));
            frame.stroke(&line, Stroke::default().with_color(CURSOR).with_width(1.5));
        }

        draw_markers(&mut frame, &scene);
        for glyph in &scene.mismatches {
            frame.fill(&Path::circle(Point::new(glyph.x, glyph.y), 3.5), MISMATCH);
        }

        if self.reference.is_empty() && self.live.is_empty() {
            frame.fill_text(Text {
                content: "No pitch data yet".to_string(),
                position: frame.center(),
                color: LABEL,
                size: 16.0.into(),
                horizontal_alignment: alignment::Horizontal::Center,
                vertical_alignment: alignment::Vertical::Center,
                ..Text::default()
            });
        }

        vec![frame.into_geometry()]
    }

    fn mouse_interaction(
        &self,
        state: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if state.dragging {
            mouse::Interaction::Grabbing
        } else if cursor.is_over(bounds) {
            mouse::Interaction::Crosshair
        } else {
            mouse::Interaction::default()
        }
    }
}

fn draw_grid(frame: &mut Frame, scene: &Scene) {
    let plot = scene.plot;
    let grid = Stroke::default().with_color(GRID).with_width(1.0);

    for line in &scene.time_grid {
        let path = Path::line(
            Point::new(line.position, plot.plot_top()),
            Point::new(line.position, plot.plot_bottom()),
        );
        frame.stroke(&path, grid);
        frame.fill_text(Text {
            content: line.label.clone(),
            position: Point::new(line.position, plot.plot_bottom() + 4.0),
            color: LABEL,
            size: 11.0.into(),
            horizontal_alignment: alignment::Horizontal::Center,
            vertical_alignment: alignment::Vertical::Top,
            ..Text::default()
        });
    }

    for line in &scene.frequency_grid {
        let path = Path::line(
            Point::new(plot.plot_left(), line.position),
            Point::new(plot.plot_right(), line.position),
        );
        frame.stroke(&path, grid);
        frame.fill_text(Text {
            content: line.label.clone(),
            position: Point::new(plot.plot_left() - 4.0, line.position),
            color: LABEL,
            size: 10.0.into(),
            horizontal_alignment: alignment::Horizontal::Right,
            vertical_alignment: alignment::Vertical::Center,
            ..Text::default()
        });
    }
}

fn draw_regions(frame: &mut Frame, scene: &Scene) {
    let plot = scene.plot;
    for region in &scene.regions {
        let color = match region.score {
            Some(score) if score >= 80.0 => Color::from_rgba(0.2, 0.8, 0.4, 0.12),
            Some(score) if score >= 50.0 => Color::from_rgba(1.0, 0.76, 0.0, 0.12),
            Some(_) => Color::from_rgba(1.0, 0.2, 0.2, 0.12),
            None => Color::from_rgba(1.0, 1.0, 1.0, 0.05),
        };
        frame.fill_rectangle(
            Point::new(region.x_start, plot.plot_top()),
            Size::new((region.x_end - region.x_start).max(1.0), plot.plot_height()),
            color,
        );
        if let Some(score) = region.score {
            frame.fill_text(Text {
                content: format!("{score:.0}"),
                position: Point::new(region.x_start + 3.0, plot.plot_top() + 2.0),
                color: LABEL,
                size: 10.0.into(),
                ..Text::default()
            });
        }
    }
}

fn draw_curve(frame: &mut Frame, segments: &[CurveSegment], color: Color) {
    for segment in segments {
        let [first, rest @ ..] = segment.points.as_slice() else {
            continue;
        };
        if rest.is_empty() {
            frame.fill(&Path::circle(Point::new(first.x, first.y), 1.5), color);
            continue;
        }
        let path = Path::new(|builder| {
            builder.move_to(Point::new(first.x, first.y));
            for point in rest {
                builder.line_to(Point::new(point.x, point.y));
            }
        });
        let stroke = match segment.kind {
            StrokeKind::Solid => Stroke::default().with_color(color).with_width(2.0),
            StrokeKind::Tentative => Stroke {
                line_dash: LineDash {
                    segments: TENTATIVE_DASH,
                    offset: 0,
                },
                ..Stroke::default().with_color(Color { a: 0.5, ..color }).with_width(1.5)
            },
            StrokeKind::Bridge => Stroke {
                line_dash: LineDash {
                    segments: BRIDGE_DASH,
                    offset: 0,
                },
                ..Stroke::default().with_color(Color { a: 0.35, ..color }).with_width(1.0)
            },
        };
        frame.stroke(&path, stroke);
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Low => Color::from_rgb8(0xFF, 0xC3, 0x00),
        Severity::Medium => Color::from_rgb8(0xFF, 0x8C, 0x1A),
        Severity::High => Color::from_rgb8(0xFF, 0x33, 0x33),
    }
}

fn draw_markers(frame: &mut Frame, scene: &Scene) {
    let plot = scene.plot;
    for marker in &scene.markers {
        let color = severity_color(marker.severity);
        let line = Path::line(
            Point::new(marker.x, plot.plot_top()),
            Point::new(marker.x, plot.plot_bottom()),
        );
        frame.stroke(&line, Stroke::default().with_color(Color { a: 0.6, ..color }).with_width(1.0));

        let head = Path::new(|builder| {
            builder.move_to(Point::new(marker.x - 5.0, plot.plot_top()));
            builder.line_to(Point::new(marker.x + 5.0, plot.plot_top()));
            builder.line_to(Point::new(marker.x, plot.plot_top() + 8.0));
            builder.close();
        });
        frame.fill(&head, color);
    }
}
