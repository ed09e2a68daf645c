//! # Main Display Module
//!
//! Layout of the practice screen: transport buttons, the pitch graph with its
//! seek bars and cent meter, and the library/settings sidebar. The
//! full-screen mode shows a second graph instance with a fixed frequency band.

use cantor_core::activity::ActivityKind;
use cantor_core::playback::{MAX_SPEED, MIN_SPEED};
use cantor_core::render::{CurveOptions, FrequencyAxis};
use cantor_core::sync::{EngineId, PlaybackEngine};
use iced::widget::{
    button, checkbox, column, container, horizontal_space, progress_bar, row, scrollable, slider, text,
    text_input, Column, Space,
};
use iced::{Alignment, Background, Color, Element, Length};

use super::cent_meter::CentMeter;
use crate::widgets::pitch_graph::{GraphId, PitchGraph};
use crate::widgets::seek_bar::SeekBar;
use crate::{CantorApp, Message};

const ACTIVE: Color = Color::from_rgb(0.8, 0.2, 0.2);
const BANNER: Color = Color::from_rgb(0.55, 0.12, 0.12);

/// Transport buttons in display order.
const ACTIVITIES: [(&str, ActivityKind); 4] = [
    ("Record", ActivityKind::Recording),
    ("Practice", ActivityKind::Practicing),
    ("Follow", ActivityKind::FollowingReference),
    ("Play back", ActivityKind::PlayingBack),
];

pub fn create_main_view(app: &CantorApp) -> Element<'_, Message> {
    let header = row![
        text("Cantor").size(28),
        horizontal_space(),
        text(app.status.clone()).size(14),
    ]
    .align_y(Alignment::Center);

    let mut page = Column::new().spacing(10).padding(20);
    if let Some(message) = &app.banner {
        page = page.push(create_banner(message));
    }
    page = page.push(header).push(create_transport(app));

    if app.full_screen {
        page = page
            .push(graph(app, GraphId::FullScreen, Length::Fill))
            .push(create_seek_bars(app));
        return container(page).width(Length::Fill).height(Length::Fill).into();
    }

    let main_column = column![
        graph(app, GraphId::Normal, Length::Fixed(340.0)),
        create_seek_bars(app),
        create_cent_meter_panel(app),
        create_score_panel(app),
    ]
    .spacing(10)
    .width(Length::Fill);

    let content = row![main_column, Space::with_width(10), create_sidebar(app)].align_y(Alignment::Start);
    page = page.push(content);

    container(page).width(Length::Fill).height(Length::Fill).into()
}

fn create_banner(message: &str) -> Element<'_, Message> {
    container(
        row![
            text(message).size(15),
            horizontal_space(),
            button(text("Dismiss").size(13)).on_press(Message::DismissBanner),
        ]
        .align_y(Alignment::Center)
        .spacing(10),
    )
    .padding([8, 12])
    .width(Length::Fill)
    .style(|_theme| container::Style {
        background: Some(Background::Color(BANNER)),
        text_color: Some(Color::WHITE),
        ..container::Style::default()
    })
    .into()
}

fn create_transport(app: &CantorApp) -> Element<'_, Message> {
    let running = app.session.state().kind();
    let has_reference = app.session.reference_duration().is_some();

    let mut buttons = row![].spacing(8).align_y(Alignment::Center);
    for (label, kind) in ACTIVITIES {
        let enabled = match kind {
            ActivityKind::Recording => true,
            ActivityKind::Practicing | ActivityKind::FollowingReference => has_reference,
            ActivityKind::PlayingBack => {
                !app.players.student().is_empty() || !app.players.reference().is_empty()
            }
        };
        let mut activity = button(text(label).size(14))
            .padding([6, 12])
            .on_press_maybe(enabled.then_some(Message::Start(kind)));
        if running == Some(kind) {
            activity = activity.style(|_theme, _status| button::Style {
                background: Some(Background::Color(ACTIVE)),
                text_color: Color::WHITE,
                ..button::Style::default()
            });
        }
        buttons = buttons.push(activity);
    }

    let can_score = app.selected.is_some() && !app.session.recorded().is_empty() && !app.scoring && running.is_none();
    buttons
        .push(
            button(text("Stop").size(14))
                .padding([6, 12])
                .on_press_maybe(running.is_some().then_some(Message::Stop)),
        )
        .push(Space::with_width(20))
        .push(
            button(text(if app.scoring { "Scoring..." } else { "Score" }).size(14))
                .padding([6, 12])
                .on_press_maybe(can_score.then_some(Message::Score)),
        )
        .push(horizontal_space())
        .push(button(text("Fit").size(14)).padding([6, 12]).on_press(Message::FitToData))
        .push(
            button(text(if app.full_screen { "Exit full screen" } else { "Full screen" }).size(14))
                .padding([6, 12])
                .on_press(Message::ToggleFullScreen),
        )
        .into()
}

fn graph(app: &CantorApp, id: GraphId, height: Length) -> Element<'_, Message> {
    let (viewport, axis) = match id {
        GraphId::Normal => (&app.normal_view, FrequencyAxis::Auto),
        GraphId::FullScreen => {
            let (min_hz, max_hz) = app.settings.fixed_frequency_band;
            (&app.full_view, FrequencyAxis::Fixed { min_hz, max_hz })
        }
    };
    let timeline = app.session.timeline(app.now);
    PitchGraph {
        id,
        viewport,
        timeline,
        reference: app.session.reference().samples(),
        live: app.session.live().samples(),
        markers: app.session.markers(),
        regions: app.session.regions(),
        audio_duration: app.session.reference_duration(),
        show_cursor: app.session.state().is_active() || timeline.current_time > 0.0,
        axis,
        options: CurveOptions {
            bridge_gaps: app.settings.bridge_gaps,
            ..CurveOptions::default()
        },
    }
    .view(height)
}

fn create_seek_bars(app: &CantorApp) -> Element<'_, Message> {
    let reference = app.players.reference();
    let student = app.players.student();
    column![
        SeekBar::new(EngineId::Reference, reference.current_time(), reference.duration()).view(),
        SeekBar::new(EngineId::Student, student.current_time(), student.duration()).view(),
    ]
    .spacing(4)
    .into()
}

fn create_cent_meter_panel(app: &CantorApp) -> Element<'_, Message> {
    let (cents, caption) = match app.live_cents() {
        Some((cents, caption)) => (Some(cents), caption),
        None => (None, "Sing to see your pitch against the reference".to_string()),
    };
    let lyric = app.current_text().unwrap_or_default().to_owned();

    container(
        column![
            row![text("Pitch").size(18), horizontal_space(), text(caption).size(14)],
            CentMeter::new(cents).view(),
            text(lyric).size(20),
        ]
        .spacing(8),
    )
    .padding(15)
    .width(Length::Fill)
    .into()
}

fn create_score_panel(app: &CantorApp) -> Element<'_, Message> {
    let mut panel = column![text("Score").size(18)].spacing(6);
    match &app.last_score {
        Some(summary) => {
            panel = panel.push(text(format!("{:.0} / 100", summary.score)).size(28));
            if !summary.feedback.is_empty() {
                panel = panel.push(text(summary.feedback.clone()).size(14));
            }
        }
        None => panel = panel.push(text("Record a take and press Score").size(14)),
    }

    let best = app
        .selected
        .as_ref()
        .and_then(|entry| app.history.best_for(&entry.id));
    if let Some(best) = best {
        panel = panel.push(text(format!("Best for this reference: {best:.0}")).size(14));
    }
    panel = panel.push(text(format!("{} attempt(s) recorded", app.history.len())).size(12));

    container(panel).padding(15).width(Length::Fill).into()
}

fn create_sidebar(app: &CantorApp) -> Element<'_, Message> {
    column![create_library_section(app), create_settings_section(app)]
        .spacing(20)
        .padding(15)
        .width(Length::Fixed(300.0))
        .into()
}

fn create_library_section(app: &CantorApp) -> Element<'_, Message> {
    let selected_id = app.selected.as_ref().map(|entry| entry.id.as_str());

    let entries = app.references.iter().fold(column![].spacing(6), |list, entry| {
        let mut caption = entry.title.clone();
        if let Some(maqam) = &entry.maqam {
            caption.push_str(&format!(" ({maqam})"));
        }
        let mut select = button(text(caption).size(14).width(Length::Fill))
            .padding([6, 10])
            .width(Length::Fill)
            .on_press(Message::SelectReference(entry.id.clone()));
        if selected_id == Some(entry.id.as_str()) {
            select = select.style(|_theme, _status| button::Style {
                background: Some(Background::Color(Color::from_rgb(0.2, 0.45, 0.75))),
                text_color: Color::WHITE,
                ..button::Style::default()
            });
        }
        list.push(
            row![
                select,
                button(text("Rename").size(12)).on_press(Message::RenameReference(entry.id.clone())),
                button(text("Delete").size(12)).on_press(Message::DeleteReference(entry.id.clone())),
            ]
            .spacing(4)
            .align_y(Alignment::Center),
        )
    });

    let mut section = column![
        row![
            text("Library").size(18),
            horizontal_space(),
            button(text("Refresh").size(12)).on_press(Message::RefreshReferences),
        ]
        .align_y(Alignment::Center),
        scrollable(entries).height(Length::Fixed(220.0)),
        text_input("Title", &app.title_input).on_input(Message::TitleInputChanged),
        text_input("Path to a WAV file", &app.upload_path)
            .on_input(Message::UploadPathChanged)
            .on_submit(Message::UploadReference),
        button(text("Upload").size(14)).on_press_maybe(
            (!app.upload_path.trim().is_empty() && app.transfer.is_none()).then_some(Message::UploadReference),
        ),
    ]
    .spacing(8);

    if let Some((done, total)) = app.transfer {
        let fraction = match total {
            Some(total) if total > 0 => done as f32 / total as f32,
            _ => 0.0,
        };
        section = section.push(progress_bar(0.0..=1.0, fraction).height(Length::Fixed(8.0)));
    } else if app.loading_reference {
        section = section.push(text("Extracting reference pitch...").size(12));
    }

    section.into()
}

fn create_settings_section(app: &CantorApp) -> Element<'_, Message> {
    let speed = app.settings.playback_speed;
    column![
        text("Settings").size(18),
        text(format!("Playback speed {speed:.2}x")).size(14),
        slider(MIN_SPEED..=MAX_SPEED, speed, Message::SpeedChanged).step(0.05),
        checkbox("Connect across pauses", app.settings.bridge_gaps).on_toggle(Message::BridgeGapsToggled),
        checkbox("Band-limit and smooth live pitch", app.settings.extractor.enabled)
            .on_toggle(Message::ExtractorToggled),
        text("Backend").size(14),
        text_input("http://host:port", &app.backend_url_input)
            .on_input(Message::BackendUrlChanged)
            .on_submit(Message::ApplyBackendUrl),
    ]
    .spacing(8)
    .into()
}
