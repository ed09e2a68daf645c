//! # Cent Meter Widget
//!
//! Shows how far the latest sung pitch is from the reference at the same
//! moment, or from the nearest note when there is no reference.

use cantor_core::compare::MISMATCH_THRESHOLD_CENTS;
use iced::widget::canvas::{self, Geometry, Path, Stroke, Text};
use iced::widget::container;
use iced::{alignment, mouse, Color, Element, Point, Rectangle, Renderer, Size, Theme};

/// The meter spans -200 to +200 cents.
const METER_RANGE: f32 = 200.0;
/// Within this the singer counts as on pitch.
const IN_TUNE_CENTS: f32 = 25.0;

pub struct CentMeter {
    /// Current deviation, `None` when nothing voiced is being sung.
    cents: Option<f32>,
}

impl CentMeter {
    pub fn new(cents: Option<f32>) -> Self {
        Self { cents }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fixed(48.0)),
        )
        .into()
    }
}

impl<Message> canvas::Program<Message> for CentMeter {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        let background = Path::rectangle(Point::ORIGIN, bounds.size());
        frame.fill(&background, Color::from_rgb8(0x40, 0x40, 0x40));

        // Mismatch threshold band.
        let to_x = |cents: f32| (cents.clamp(-METER_RANGE, METER_RANGE) + METER_RANGE) / (2.0 * METER_RANGE) * bounds.width;
        let band_left = to_x(-MISMATCH_THRESHOLD_CENTS);
        frame.fill_rectangle(
            Point::new(band_left, 0.0),
            Size::new(to_x(MISMATCH_THRESHOLD_CENTS) - band_left, bounds.height),
            Color::from_rgba(1.0, 1.0, 1.0, 0.06),
        );

        let center_x = bounds.width / 2.0;
        let center_line = Path::line(Point::new(center_x, 0.0), Point::new(center_x, bounds.height));
        frame.stroke(&center_line, Stroke::default().with_width(2.0).with_color(Color::WHITE));

        if let Some(c) = self.cents {
            let needle_pos = to_x(c);
            let color = if c.abs() < IN_TUNE_CENTS {
                Color::from_rgb8(0x34, 0xDB, 0x98) // Green
            } else if c.abs() <= MISMATCH_THRESHOLD_CENTS {
                Color::from_rgb8(0xFF, 0xC3, 0x00) // Yellow
            } else {
                Color::from_rgb8(0xFF, 0x33, 0x33) // Red
            };

            let needle = Path::rectangle(Point::new(needle_pos - 2.0, 0.0), Size::new(4.0, bounds.height));
            frame.fill(&needle, color);

            frame.fill_text(Text {
                content: format!("{c:+.0}¢"),
                position: Point::new(bounds.width - 6.0, bounds.height / 2.0),
                color: Color::WHITE,
                size: 14.0.into(),
                horizontal_alignment: alignment::Horizontal::Right,
                vertical_alignment: alignment::Vertical::Center,
                ..Text::default()
            });
        }

        vec![frame.into_geometry()]
    }
}
