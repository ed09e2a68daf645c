//! # Cantor - Vocal Training GUI
//!
//! Practice screen for singing against a reference recording. The student's
//! pitch is captured live and drawn next to the reference contour, and the
//! recorded take can be played back in sync with the reference and scored.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme
//! - **Capture Thread**: microphone stream and pitch extraction (`cantor_core::capture`)
//! - **Job Threads**: one per backend request (`jobs`)
//! - **Communication**: Crossbeam channels drained on every tick
//! - **Updates**: 60 FPS tick driving capture, player sync and the viewports

mod jobs;
mod ui;
mod widgets;

use std::time::Instant;

use cantor_core::activity::{ActivityKind, ActivityState};
use cantor_core::backend::{BackendClient, ReferenceEntry, ReferenceSource, TextSegment};
use cantor_core::capture::{CaptureEvent, CaptureHandle};
use cantor_core::compare::ALIGNMENT_TOLERANCE_SECS;
use cantor_core::history::{Attempt, AttemptHistory};
use cantor_core::playback::PcmPlayer;
use cantor_core::recording;
use cantor_core::sample::{cents_between, nearest_note};
use cantor_core::session::{PracticeSession, SessionEvent};
use cantor_core::settings::Settings;
use cantor_core::sync::{EngineId, PlaybackEngine, PlaybackSynchronizer, SyncEvent};
use cantor_core::viewport::{PlotArea, ViewportController};
use cantor_core::{CantorError, PitchSeries, SeriesKind};
use crossbeam_channel::{Receiver, Sender};
use iced::{Element, Subscription, Theme};

use jobs::{Job, JobReply};
use ui::main_display::create_main_view;
use widgets::pitch_graph::{GraphEvent, GraphId};

pub fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Starting Cantor...");
    iced::application("Cantor", CantorApp::update, CantorApp::view)
        .subscription(CantorApp::subscription)
        .theme(CantorApp::theme)
        .run()?;
    log::info!("Cantor finished");
    Ok(())
}

#[derive(Debug, Clone)]
pub enum Message {
    // Activities
    Start(ActivityKind),
    Stop,
    Score,

    // Graph and players
    Graph(GraphId, GraphEvent),
    Seek(EngineId, f64),
    FitToData,
    ToggleFullScreen,

    // Reference library
    RefreshReferences,
    SelectReference(String),
    DeleteReference(String),
    RenameReference(String),
    TitleInputChanged(String),
    UploadPathChanged(String),
    UploadReference,

    // Settings
    SpeedChanged(f32),
    BridgeGapsToggled(bool),
    ExtractorToggled(bool),
    BackendUrlChanged(String),
    ApplyBackendUrl,

    DismissBanner,

    // Continuous update message
    Tick,
}

/// The last scoring result shown under the graph.
#[derive(Debug, Clone)]
pub struct ScoreSummary {
    pub score: f32,
    pub feedback: String,
}

/// Application root. Owns every piece of state; widgets get borrowed views.
pub struct CantorApp {
    pub(crate) settings: Settings,
    pub(crate) history: AttemptHistory,
    pub(crate) session: PracticeSession,
    pub(crate) players: PlaybackSynchronizer<PcmPlayer, PcmPlayer>,
    pub(crate) normal_view: ViewportController,
    pub(crate) full_view: ViewportController,
    pub(crate) full_screen: bool,

    capture: Option<CaptureHandle>,
    capture_tx: Sender<CaptureEvent>,
    capture_rx: Receiver<CaptureEvent>,

    client: Option<BackendClient>,
    job_tx: Sender<JobReply>,
    job_rx: Receiver<JobReply>,

    pub(crate) references: Vec<ReferenceEntry>,
    pub(crate) selected: Option<ReferenceEntry>,
    pub(crate) text_segments: Vec<TextSegment>,
    pub(crate) loading_reference: bool,
    pub(crate) transfer: Option<(u64, Option<u64>)>,
    pub(crate) last_score: Option<ScoreSummary>,
    pub(crate) scoring: bool,

    pub(crate) title_input: String,
    pub(crate) upload_path: String,
    pub(crate) backend_url_input: String,

    /// Session-invalidating problem shown until dismissed.
    pub(crate) banner: Option<String>,
    /// One-line status for everything else.
    pub(crate) status: String,
    pub(crate) now: Instant,
}

impl Default for CantorApp {
    fn default() -> Self {
        let settings = Settings::load();
        let (capture_tx, capture_rx) = crossbeam_channel::unbounded();
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let client = match BackendClient::new(&settings.backend_url) {
            Ok(client) => Some(client),
            Err(err) => {
                log::error!("Could not create backend client: {err}");
                None
            }
        };

        let mut app = Self {
            session: PracticeSession::new(settings.live_conditioning, settings.reference_conditioning),
            players: PlaybackSynchronizer::new(PcmPlayer::empty(), PcmPlayer::empty()),
            normal_view: ViewportController::new(),
            full_view: ViewportController::new(),
            full_screen: false,
            history: AttemptHistory::load(),
            capture: None,
            capture_tx,
            capture_rx,
            client,
            job_tx,
            job_rx,
            references: Vec::new(),
            selected: None,
            text_segments: Vec::new(),
            loading_reference: false,
            transfer: None,
            last_score: None,
            scoring: false,
            title_input: String::new(),
            upload_path: String::new(),
            backend_url_input: settings.backend_url.clone(),
            banner: None,
            status: String::new(),
            now: Instant::now(),
            settings,
        };
        app.spawn_job(Job::ListReferences);
        app
    }
}

impl CantorApp {
    fn update(&mut self, message: Message) {
        if !matches!(message, Message::Tick | Message::Graph(..) | Message::Seek(..)) {
            log::debug!("Message: {message:?}");
        }

        match message {
            Message::Tick => self.tick(),
            Message::Start(kind) => self.start_activity(kind),
            Message::Stop => {
                let now = Instant::now();
                self.stop_activity(now);
            }
            Message::Score => self.request_score(),

            Message::Graph(id, event) => self.on_graph_event(id, event),
            Message::Seek(engine, fraction) => {
                if self.capturing() {
                    return;
                }
                self.players.user_seek(engine, fraction, Instant::now());
                self.sync_playback_position();
            }
            Message::FitToData => {
                self.normal_view.fit_to_data();
                self.full_view.fit_to_data();
            }
            Message::ToggleFullScreen => {
                // The view being entered takes over the zoom of the one being left.
                if self.full_screen {
                    self.normal_view.apply_external_zoom(self.full_view.zoom());
                } else {
                    self.full_view.apply_external_zoom(self.normal_view.zoom());
                }
                self.full_screen = !self.full_screen;
            }

            Message::RefreshReferences => self.spawn_job(Job::ListReferences),
            Message::SelectReference(id) => self.select_reference(&id),
            Message::DeleteReference(id) => self.spawn_job(Job::Delete { id }),
            Message::RenameReference(id) => {
                let title = self.title_input.trim().to_owned();
                if title.is_empty() {
                    self.status = "Type the new title first".into();
                    return;
                }
                self.spawn_job(Job::Rename { id, title });
            }
            Message::TitleInputChanged(title) => self.title_input = title,
            Message::UploadPathChanged(path) => self.upload_path = path,
            Message::UploadReference => self.upload_reference(),

            Message::SpeedChanged(speed) => {
                self.settings.playback_speed = speed;
                self.players.reference().set_speed(speed);
                self.players.student().set_speed(speed);
                self.save_settings();
            }
            Message::BridgeGapsToggled(enabled) => {
                self.settings.bridge_gaps = enabled;
                self.save_settings();
            }
            Message::ExtractorToggled(enabled) => {
                self.settings.extractor.enabled = enabled;
                self.save_settings();
            }
            Message::BackendUrlChanged(url) => self.backend_url_input = url,
            Message::ApplyBackendUrl => self.apply_backend_url(),

            Message::DismissBanner => self.banner = None,
        }
    }

    fn view(&self) -> Element<'_, Message> {
        create_main_view(self)
    }

    /// Fires every 16ms (60 FPS) to drain the worker channels and animate
    /// the graphs.
    fn subscription(&self) -> Subscription<Message> {
        iced::time::every(std::time::Duration::from_millis(16)).map(|_| Message::Tick)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn tick(&mut self) {
        let now = Instant::now();
        self.now = now;

        let events: Vec<CaptureEvent> = self.capture_rx.try_iter().collect();
        for event in events {
            match event {
                CaptureEvent::Pitch { detected, at } => {
                    if let Some(SessionEvent::ForceStopped { elapsed }) = self.session.on_pitch(&detected, at) {
                        self.after_force_stop(elapsed, now);
                    }
                }
                CaptureEvent::Audio(chunk) => {
                    if let Some(capture) = &self.capture {
                        self.session.on_audio(&chunk, capture.sample_rate());
                    }
                }
                CaptureEvent::Failed(reason) => {
                    log::error!("Capture failed: {reason}");
                    self.stop_activity(now);
                    self.banner = Some(format!("The microphone stopped working: {reason}"));
                }
            }
        }
        if let Some(SessionEvent::ForceStopped { elapsed }) = self.session.tick(now) {
            self.after_force_stop(elapsed, now);
        }

        for event in self.players.poll(now) {
            match event {
                SyncEvent::ReferenceEnded => self.on_reference_ended(now),
                SyncEvent::DriftCorrected { student_time } => {
                    log::debug!("Student player moved to {student_time:.2}s");
                }
            }
        }
        // A take played back without a reference has no reference end.
        if matches!(self.session.state(), ActivityState::PlayingBack { .. })
            && self.players.reference().duration().is_none()
            && self.players.student().has_finished()
        {
            self.players.pause();
            self.on_reference_ended(now);
        }
        if self.players.is_playing() {
            self.sync_playback_position();
        }

        let replies: Vec<JobReply> = self.job_rx.try_iter().collect();
        for reply in replies {
            self.on_job_reply(reply);
        }

        let active = self.session.state().is_active();
        let timeline = self.session.timeline(now);
        for viewport in [&mut self.normal_view, &mut self.full_view] {
            viewport.set_activity_active(active);
            viewport.tick(now, &timeline);
        }
    }

    fn capturing(&self) -> bool {
        self.session.state().kind().is_some_and(ActivityKind::captures)
    }

    fn sync_playback_position(&mut self) {
        let position = if self.players.reference().duration().is_some() {
            self.players.reference().current_time()
        } else {
            self.players.student().current_time()
        };
        self.session.set_playback_position(position);
    }

    // --- Activities ---

    fn start_activity(&mut self, kind: ActivityKind) {
        let now = Instant::now();
        if self.session.state().is_active() {
            self.stop_activity(now);
        }

        if kind.follows_reference() && self.session.reference_duration().is_none() {
            self.status = "Select a reference first".into();
            return;
        }
        if kind == ActivityKind::PlayingBack && self.players.student().is_empty() && self.players.reference().is_empty() {
            self.status = "Nothing to play back yet".into();
            return;
        }

        if kind.captures() {
            // Frames from an earlier capture must not land in the new take.
            self.capture_rx.try_iter().for_each(drop);
            match CaptureHandle::start(self.settings.extractor, self.capture_tx.clone()) {
                Ok(handle) => self.capture = Some(handle),
                Err(err) => {
                    self.report(err);
                    return;
                }
            }
        }

        if let Err(err) = self.session.start(kind, now) {
            self.release_capture();
            self.report(err);
            return;
        }

        let playback = match kind {
            ActivityKind::Practicing => {
                // Only the reference plays while practising.
                self.players.replace_student(PcmPlayer::empty());
                self.players.play_both(now)
            }
            ActivityKind::PlayingBack => self.players.play_both(now),
            ActivityKind::Recording | ActivityKind::FollowingReference => Ok(()),
        };
        if let Err(err) = playback {
            self.stop_activity(now);
            self.report(err);
            return;
        }

        if kind.captures() {
            self.last_score = None;
            self.session.set_score_overlays(Vec::new(), Vec::new());
        }
        self.status = activity_label(kind).into();
    }

    /// Tears down in order: extraction and device, then the players. Plotted
    /// data stays.
    fn stop_activity(&mut self, now: Instant) {
        let kind = self.session.state().kind();
        self.release_capture();
        self.players.stop_all(now);
        if let Err(err) = self.session.stop(now) {
            log::warn!("{err}");
        }
        if kind.is_some_and(ActivityKind::captures) {
            self.finish_take();
        }
        self.status.clear();
    }

    fn after_force_stop(&mut self, elapsed: f64, now: Instant) {
        self.release_capture();
        self.players.stop_all(now);
        self.finish_take();
        self.status = format!("Stopped after {elapsed:.1}s, past the end of the reference");
    }

    fn on_reference_ended(&mut self, now: Instant) {
        let kind = self.session.state().kind();
        if let Err(err) = self.session.on_playback_ended(now) {
            log::warn!("{err}");
            return;
        }
        if !self.session.state().is_active() {
            self.release_capture();
            if kind.is_some_and(ActivityKind::captures) {
                self.finish_take();
            }
            self.status.clear();
        }
    }

    fn release_capture(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.stop();
        }
    }

    /// Makes the take just recorded the student player's clip.
    fn finish_take(&mut self) {
        if self.session.recorded().is_empty() {
            return;
        }
        let player = PcmPlayer::new(self.session.recorded().to_vec(), self.session.recording_rate());
        player.set_speed(self.settings.playback_speed);
        log::info!(
            "Take ready: {:.1}s",
            player.duration().unwrap_or(0.0)
        );
        self.players.replace_student(player);
    }

    // --- Graph ---

    fn on_graph_event(&mut self, id: GraphId, event: GraphEvent) {
        let now = Instant::now();
        if let GraphEvent::Clicked { time } = event {
            self.seek_to_time(time, now);
            return;
        }

        let timeline = self.session.timeline(now);
        let viewport = match id {
            GraphId::Normal => &mut self.normal_view,
            GraphId::FullScreen => &mut self.full_view,
        };
        match event {
            GraphEvent::Resized { width, height } => viewport.set_plot(PlotArea::new(width, height)),
            GraphEvent::DragStarted { anchor, x } => {
                viewport.begin_drag(anchor);
                viewport.drag_to(x, &timeline);
            }
            GraphEvent::Dragged { x } => viewport.drag_to(x, &timeline),
            GraphEvent::DragEnded => viewport.end_drag(now),
            GraphEvent::Wheel { x, lines } => viewport.wheel_zoom(x, lines, &timeline, now),
            GraphEvent::Clicked { .. } => {}
        }
    }

    fn seek_to_time(&mut self, time: f64, now: Instant) {
        if self.capturing() {
            return;
        }
        let target = [
            (EngineId::Reference, self.players.reference().duration()),
            (EngineId::Student, self.players.student().duration()),
        ]
        .into_iter()
        .find_map(|(engine, duration)| duration.filter(|d| *d > 0.0).map(|d| (engine, d)));

        if let Some((engine, duration)) = target {
            self.players.user_seek(engine, time / duration, now);
            self.sync_playback_position();
        }
    }

    /// Cents between the latest sung pitch and the reference at that time,
    /// or the nearest note without a reference. Only while capturing.
    pub(crate) fn live_cents(&self) -> Option<(f32, String)> {
        if !self.capturing() {
            return None;
        }
        let last = self.session.live_raw().samples().iter().rev().find(|s| s.is_voiced())?;
        let frequency = last.voiced_frequency()?;
        let reference = self
            .session
            .reference()
            .nearest_voiced(last.time, ALIGNMENT_TOLERANCE_SECS)
            .and_then(|s| s.voiced_frequency());
        match reference {
            Some(target) => Some((
                cents_between(frequency, target),
                format!("{frequency:.0} Hz against {target:.0} Hz"),
            )),
            None => nearest_note(frequency)
                .map(|(name, target)| (cents_between(frequency, target), format!("{frequency:.0} Hz, {name}"))),
        }
    }

    /// Text of the reference segment at the current time.
    pub(crate) fn current_text(&self) -> Option<&str> {
        let time = self.session.current_time(self.now);
        self.text_segments
            .iter()
            .find(|segment| time >= segment.start && time < segment.end)
            .and_then(|segment| segment.text.as_deref())
    }

    // --- Backend ---

    fn spawn_job(&mut self, job: Job) {
        let Some(client) = &self.client else {
            self.status = "No backend configured".into();
            return;
        };
        jobs::spawn(client.clone(), job, self.job_tx.clone());
    }

    fn select_reference(&mut self, id: &str) {
        let Some(entry) = self.references.iter().find(|entry| entry.id == id).cloned() else {
            return;
        };
        let now = Instant::now();
        self.stop_activity(now);

        self.session.set_reference(PitchSeries::new(SeriesKind::Reference), None);
        self.session.set_score_overlays(Vec::new(), Vec::new());
        self.players.replace_reference(PcmPlayer::empty());
        self.players.replace_student(PcmPlayer::empty());
        self.text_segments = entry.text_segments.clone();
        self.last_score = None;
        self.normal_view.fit_to_data();
        self.full_view.fit_to_data();

        log::info!("Selected reference {} ({})", entry.id, entry.title);
        self.status = format!("Loading {}...", entry.title);
        self.loading_reference = true;
        self.selected = Some(entry);
        self.spawn_job(Job::LoadReference { id: id.to_owned() });
    }

    fn request_score(&mut self) {
        let Some(selected) = &self.selected else {
            self.status = "Select a reference to score against".into();
            return;
        };
        if self.session.recorded().is_empty() {
            self.status = "Record a take first".into();
            return;
        }
        let wav = recording::upload_bytes(self.session.recorded(), self.session.recording_rate());
        let source = ReferenceSource::Id(selected.id.clone());
        self.scoring = true;
        self.status = "Scoring...".into();
        self.spawn_job(Job::Score { wav, source });
    }

    fn upload_reference(&mut self) {
        let path = std::path::PathBuf::from(self.upload_path.trim());
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.status = format!("Could not read {}: {err}", path.display());
                return;
            }
        };
        let title = match self.title_input.trim() {
            "" => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Untitled".into()),
            title => title.to_owned(),
        };
        self.status = format!("Uploading {title}...");
        self.transfer = Some((0, Some(bytes.len() as u64)));
        self.spawn_job(Job::Upload { title, bytes });
    }

    fn apply_backend_url(&mut self) {
        let url = self.backend_url_input.trim().to_owned();
        match BackendClient::new(&url) {
            Ok(client) => {
                self.client = Some(client);
                self.settings.backend_url = url;
                self.save_settings();
                self.spawn_job(Job::ListReferences);
            }
            Err(err) => self.report(err),
        }
    }

    fn on_job_reply(&mut self, reply: JobReply) {
        match reply {
            JobReply::Progress { done, total } => self.transfer = Some((done, total)),
            JobReply::References(result) => match result {
                Ok(references) => {
                    log::info!("Library has {} reference(s)", references.len());
                    self.references = references;
                }
                Err(err) => self.report(err),
            },
            JobReply::ReferenceLoaded { id, audio, extraction } => {
                if self.selected.as_ref().is_none_or(|entry| entry.id != id) {
                    log::debug!("Ignoring load result for deselected reference {id}");
                    return;
                }
                self.loading_reference = false;
                self.transfer = None;
                self.on_reference_loaded(audio, extraction);
            }
            JobReply::Scored(result) => {
                self.scoring = false;
                match result {
                    Ok(response) => {
                        self.session.set_score_overlays(response.markers(), response.regions());
                        let attempt = Attempt::now(
                            self.selected.as_ref().map(|entry| entry.id.clone()),
                            self.selected.as_ref().map(|entry| entry.title.clone()),
                            response.score,
                        );
                        self.history.record(attempt);
                        if let Err(err) = self.history.save() {
                            log::warn!("Could not save practice history: {err}");
                        }
                        self.status = format!("Scored {:.0}", response.score);
                        self.last_score = Some(ScoreSummary {
                            score: response.score,
                            feedback: response.feedback_text(),
                        });
                    }
                    Err(err) => self.report(err),
                }
            }
            JobReply::Uploaded(result) => {
                self.transfer = None;
                match result {
                    Ok(entry) => {
                        self.status = format!("Uploaded {}", entry.title);
                        self.title_input.clear();
                        self.upload_path.clear();
                        self.references.push(entry);
                    }
                    Err(err) => self.report(err),
                }
            }
            JobReply::Deleted { id, result } => match result {
                Ok(()) => {
                    self.references.retain(|entry| entry.id != id);
                    if self.selected.as_ref().is_some_and(|entry| entry.id == id) {
                        self.clear_reference();
                    }
                }
                Err(err) => self.report(err),
            },
            JobReply::Renamed(result) => match result {
                Ok(entry) => {
                    if let Some(existing) = self.references.iter_mut().find(|e| e.id == entry.id) {
                        *existing = entry.clone();
                    }
                    if self.selected.as_ref().is_some_and(|e| e.id == entry.id) {
                        self.selected = Some(entry);
                    }
                    self.title_input.clear();
                }
                Err(err) => self.report(err),
            },
        }
    }

    fn on_reference_loaded(
        &mut self,
        audio: cantor_core::Result<Vec<u8>>,
        extraction: cantor_core::Result<cantor_core::backend::ReferenceExtraction>,
    ) {
        let duration = match audio.and_then(|bytes| PcmPlayer::from_wav_bytes(&bytes)) {
            Ok(player) => {
                player.set_speed(self.settings.playback_speed);
                let duration = player.duration();
                self.players.replace_reference(player);
                duration
            }
            Err(err) => {
                self.report(err);
                None
            }
        };
        let duration = duration.or_else(|| self.selected.as_ref().and_then(|entry| entry.duration));

        match extraction {
            Ok(extraction) => {
                if !extraction.text_segments.is_empty() {
                    self.text_segments = extraction.text_segments;
                }
                self.status = if extraction.available {
                    String::new()
                } else {
                    "Reference pitch unavailable, practising without the contour".into()
                };
                self.session.set_reference(extraction.series, duration);
            }
            Err(err) => {
                self.session.set_reference(PitchSeries::new(SeriesKind::Reference), duration);
                self.report(err);
            }
        }
    }

    fn clear_reference(&mut self) {
        self.stop_activity(Instant::now());
        self.selected = None;
        self.text_segments.clear();
        self.session.set_reference(PitchSeries::new(SeriesKind::Reference), None);
        self.players.replace_reference(PcmPlayer::empty());
    }

    /// Fatal errors go to the banner, the rest to the status line.
    fn report(&mut self, err: CantorError) {
        log::error!("{err}");
        if !err.is_session_fatal() {
            self.status = err.to_string();
            return;
        }
        let message = match &err {
            CantorError::CaptureDenied(_) => {
                "Cantor cannot use the microphone. Check that an input device is connected and allowed.".to_string()
            }
            CantorError::CaptureBusy(_) => {
                "The microphone is in use by another application. Close it and try again.".to_string()
            }
            CantorError::StaleReference(_) => {
                self.clear_reference();
                self.spawn_job(Job::ListReferences);
                "This reference was removed from the library. Pick another one.".to_string()
            }
            other => other.to_string(),
        };
        self.banner = Some(message);
    }

    fn save_settings(&self) {
        if let Err(err) = self.settings.save() {
            log::warn!("Could not save settings: {err}");
        }
    }
}

pub fn activity_label(kind: ActivityKind) -> &'static str {
    match kind {
        ActivityKind::Recording => "Recording",
        ActivityKind::Practicing => "Practising with the reference",
        ActivityKind::FollowingReference => "Following the reference",
        ActivityKind::PlayingBack => "Playing back",
    }
}
