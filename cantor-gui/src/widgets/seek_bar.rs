//! Seek bar for one player. Press or drag to move the player; the other
//! player follows through the synchronizer.

use cantor_core::render::format_time;
use cantor_core::sync::EngineId;
use iced::widget::canvas::{self, event, Event, Frame, Geometry, Path, Text};
use iced::{alignment, mouse, Color, Element, Length, Point, Rectangle, Renderer, Size, Theme};

use crate::Message;

const HEIGHT: f32 = 28.0;
const TRACK_HEIGHT: f32 = 6.0;
const LABEL_WIDTH: f32 = 110.0;

pub struct SeekBar {
    engine: EngineId,
    label: &'static str,
    current_time: f64,
    duration: Option<f64>,
    color: Color,
}

impl SeekBar {
    pub fn new(engine: EngineId, current_time: f64, duration: Option<f64>) -> Self {
        let (label, color) = match engine {
            EngineId::Reference => ("Reference", Color::from_rgb(0.35, 0.62, 0.95)),
            EngineId::Student => ("Your take", Color::from_rgb(0.98, 0.60, 0.22)),
        };
        Self {
            engine,
            label,
            current_time,
            duration,
            color,
        }
    }

    pub fn view(self) -> Element<'static, Message> {
        canvas::Canvas::new(self)
            .width(Length::Fill)
            .height(Length::Fixed(HEIGHT))
            .into()
    }

    fn progress(&self) -> f32 {
        match self.duration {
            Some(duration) if duration > 0.0 => (self.current_time / duration).clamp(0.0, 1.0) as f32,
            _ => 0.0,
        }
    }

    fn track(bounds: Rectangle) -> (f32, f32) {
        let left = LABEL_WIDTH;
        let width = (bounds.width - LABEL_WIDTH - 8.0).max(1.0);
        (left, width)
    }

    fn seek_message(&self, bounds: Rectangle, x: f32) -> Option<Message> {
        self.duration?;
        let (left, width) = Self::track(bounds);
        let fraction = ((x - left) / width).clamp(0.0, 1.0) as f64;
        Some(Message::Seek(self.engine, fraction))
    }
}

impl canvas::Program<Message> for SeekBar {
    /// Whether a drag started on this bar.
    type State = bool;

    fn update(
        &self,
        dragging: &mut Self::State,
        event: Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> (event::Status, Option<Message>) {
        match event {
            Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                let Some(position) = cursor.position_in(bounds) else {
                    return (event::Status::Ignored, None);
                };
                *dragging = true;
                (event::Status::Captured, self.seek_message(bounds, position.x))
            }
            Event::Mouse(mouse::Event::CursorMoved { position }) if *dragging => {
                (event::Status::Captured, self.seek_message(bounds, position.x - bounds.x))
            }
            Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) if *dragging => {
                *dragging = false;
                (event::Status::Captured, None)
            }
            _ => (event::Status::Ignored, None),
        }
    }

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        let text_color = theme.palette().text;
        let center_y = bounds.height / 2.0;

        let time = match self.duration {
            Some(duration) => format!("{} / {}", format_time(self.current_time), format_time(duration)),
            None => "--".to_string(),
        };
        frame.fill_text(Text {
            content: format!("{}  {time}", self.label),
            position: Point::new(0.0, center_y),
            color: text_color,
            size: 12.0.into(),
            vertical_alignment: alignment::Vertical::Center,
            ..Text::default()
        });

        let (left, width) = Self::track(bounds);
        let top = center_y - TRACK_HEIGHT / 2.0;
        frame.fill_rectangle(
            Point::new(left, top),
            Size::new(width, TRACK_HEIGHT),
            Color::from_rgb8(0x40, 0x40, 0x40),
        );
        if self.duration.is_some() {
            let filled = width * self.progress();
            frame.fill_rectangle(Point::new(left, top), Size::new(filled, TRACK_HEIGHT), self.color);
            frame.fill(&Path::circle(Point::new(left + filled, center_y), 6.0), self.color);
        }

        vec![frame.into_geometry()]
    }
}
