//! # Backend Client
//!
//! Blocking HTTP client for the scoring service and the reference library.
//! The GUI runs every call on a worker thread and gets the result back over
//! a channel, the same way capture results arrive.
//!
//! Status mapping:
//! - 404 on a request that names a reference: [`CantorError::StaleReference`]
//! - any other non-2xx: [`CantorError::Backend`]
//! - transport failures and timeouts: [`CantorError::ExtractionTimeout`]

use std::io::{Cursor, Read};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Body, Client, Response, multipart};
use serde::{Deserialize, Serialize};

use crate::error::{CantorError, Result};
use crate::marker::{Marker, Region, Severity};
use crate::sample::{PitchSample, PitchSeries, SeriesKind};

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// Which reference a scoring or extraction request is about.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceSource {
    /// A reference stored in the library.
    Id(String),
    /// An audio file supplied by the user.
    Upload { file_name: String, bytes: Vec<u8> },
}

impl ReferenceSource {
    fn id(&self) -> Option<&str> {
        match self {
            ReferenceSource::Id(id) => Some(id),
            ReferenceSource::Upload { .. } => None,
        }
    }
}

/// One point of a backend pitch track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackendPitchPoint {
    pub time: f64,
    #[serde(default)]
    pub f_hz: Option<f32>,
    #[serde(default)]
    pub midi: Option<f32>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl From<&BackendPitchPoint> for PitchSample {
    fn from(point: &BackendPitchPoint) -> Self {
        let frequency = point.f_hz.filter(|f| f.is_finite() && *f > 0.0);
        let confidence = match frequency {
            Some(_) => point.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
            None => 0.0,
        };
        PitchSample {
            time: point.time,
            frequency,
            confidence,
        }
    }
}

/// Builds a series from backend points, dropping any out of time order.
pub fn series_from_points(kind: SeriesKind, points: &[BackendPitchPoint]) -> PitchSeries {
    PitchSeries::from_samples(kind, points.iter().map(PitchSample::from).collect())
}

/// A span of the reference text with its timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractedPitch {
    #[serde(default)]
    pub reference: Vec<BackendPitchPoint>,
    #[serde(default)]
    pub student: Vec<BackendPitchPoint>,
    #[serde(default)]
    pub ayah_timing: Option<Vec<TextSegment>>,
}

/// Reference contour ready for the session, possibly empty.
#[derive(Debug, Clone)]
pub struct ReferenceExtraction {
    pub series: PitchSeries,
    pub text_segments: Vec<TextSegment>,
    /// False when extraction failed and `series` is a placeholder.
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredSegment {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub accuracy: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorPoint {
    pub time: f64,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, alias = "message")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ScorePitchData {
    #[serde(default)]
    pub reference: Vec<BackendPitchPoint>,
    #[serde(default)]
    pub student: Vec<BackendPitchPoint>,
    #[serde(rename = "errorPoints", default)]
    pub error_points: Vec<ErrorPoint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoreResponse {
    pub score: f32,
    /// Either a plain message or a structured object.
    #[serde(default)]
    pub feedback: serde_json::Value,
    #[serde(default)]
    pub segments: Vec<ScoredSegment>,
    #[serde(rename = "pitchData", default)]
    pub pitch_data: ScorePitchData,
    #[serde(rename = "ayatTiming", default)]
    pub ayat_timing: Vec<TextSegment>,
    #[serde(rename = "scoreBreakdown", default)]
    pub score_breakdown: serde_json::Value,
}

impl ScoreResponse {
    pub fn markers(&self) -> Vec<Marker> {
        self.pitch_data
            .error_points
            .iter()
            .map(|point| Marker {
                time: point.time,
                severity: point.severity,
                label: point.label.clone(),
            })
            .collect()
    }

    pub fn regions(&self) -> Vec<Region> {
        self.segments
            .iter()
            .map(|segment| Region {
                start: segment.start,
                end: segment.end,
                score: segment.score.or(segment.accuracy),
            })
            .collect()
    }

    /// Feedback as display text.
    pub fn feedback_text(&self) -> String {
        match &self.feedback {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Object(map) => ["summary", "message", "text"]
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
                .map(str::to_owned)
                .unwrap_or_else(|| self.feedback.to_string()),
            other => other.to_string(),
        }
    }
}

/// A stored reference recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub maqam: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub text_segments: Vec<TextSegment>,
}

/// Metadata edit for a stored reference. `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReferenceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maqam: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_segments: Option<Vec<TextSegment>>,
}

/// Maps a failed response status to the error the caller acts on.
pub fn status_error(status: u16, body: String, reference_id: Option<&str>) -> CantorError {
    match reference_id {
        Some(id) if status == StatusCode::NOT_FOUND.as_u16() => CantorError::StaleReference(id.to_owned()),
        _ => CantorError::Backend { status, body },
    }
}

fn check(response: Response, reference_id: Option<&str>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(status_error(status.as_u16(), body, reference_id))
}

/// Reports bytes read so far to a callback.
struct ProgressReader<R, F> {
    inner: R,
    done: u64,
    total: u64,
    progress: F,
}

impl<R: Read, F: FnMut(u64, Option<u64>)> Read for ProgressReader<R, F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.done += n as u64;
        (self.progress)(self.done, Some(self.total));
        Ok(n)
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    http: Client,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn attach_reference(form: multipart::Form, source: &ReferenceSource, upload_field: &'static str) -> Result<multipart::Form> {
        Ok(match source {
            ReferenceSource::Id(id) => form.text("reference_id", id.clone()),
            ReferenceSource::Upload { file_name, bytes } => form.part(
                upload_field,
                multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str("application/octet-stream")?,
            ),
        })
    }

    /// Scores a student take against a reference.
    pub fn score(&self, student_wav: Vec<u8>, source: &ReferenceSource) -> Result<ScoreResponse> {
        let form = multipart::Form::new().part(
            "student_audio",
            multipart::Part::bytes(student_wav)
                .file_name("student.wav")
                .mime_str("audio/wav")?,
        );
        let form = Self::attach_reference(form, source, "reference_audio")?;
        let response = self.http.post(self.url("/score")).multipart(form).send()?;
        let score: ScoreResponse = check(response, source.id())?.json()?;
        log::info!(
            "Score received: {:.1} ({} segments, {} error points)",
            score.score,
            score.segments.len(),
            score.pitch_data.error_points.len()
        );
        Ok(score)
    }

    pub fn extract_pitch(&self, source: &ReferenceSource) -> Result<ExtractedPitch> {
        let form = Self::attach_reference(multipart::Form::new(), source, "audio")?;
        let response = self
            .http
            .post(self.url("/api/extract-pitch"))
            .multipart(form)
            .send()?;
        Ok(check(response, source.id())?.json()?)
    }

    /// Extracts the reference contour, falling back to an empty one.
    ///
    /// Only a stale reference is returned as an error; the caller has to ask
    /// the user to pick another one. Everything else is logged and the
    /// practice screen runs without a reference curve.
    pub fn extract_reference_or_empty(&self, source: &ReferenceSource) -> Result<ReferenceExtraction> {
        match self.extract_pitch(source) {
            Ok(extracted) => Ok(ReferenceExtraction {
                series: series_from_points(SeriesKind::Reference, &extracted.reference),
                text_segments: extracted.ayah_timing.unwrap_or_default(),
                available: true,
            }),
            Err(err @ CantorError::StaleReference(_)) => Err(err),
            Err(err) => {
                log::warn!("Reference extraction failed, continuing without it: {err}");
                Ok(ReferenceExtraction {
                    series: PitchSeries::new(SeriesKind::Reference),
                    text_segments: Vec::new(),
                    available: false,
                })
            }
        }
    }

    pub fn list_references(&self) -> Result<Vec<ReferenceEntry>> {
        let response = self.http.get(self.url("/api/references")).send()?;
        Ok(check(response, None)?.json()?)
    }

    /// Downloads a reference's audio, reporting `(received, total)` bytes.
    pub fn fetch_reference_audio(&self, id: &str, mut progress: impl FnMut(u64, Option<u64>)) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(self.url(&format!("/api/references/{id}/audio")))
            .send()?;
        let mut response = check(response, Some(id))?;
        let total = response.content_length();

        let mut bytes = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut chunk = vec![0_u8; DOWNLOAD_CHUNK];
        loop {
            let n = response.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..n]);
            progress(bytes.len() as u64, total);
        }
        log::debug!("Downloaded {} bytes for reference {id}", bytes.len());
        Ok(bytes)
    }

    /// Adds a recording to the library, reporting `(sent, total)` bytes.
    pub fn upload_reference(
        &self,
        title: &str,
        bytes: Vec<u8>,
        progress: impl FnMut(u64, Option<u64>) + Send + 'static,
    ) -> Result<ReferenceEntry> {
        let total = bytes.len() as u64;
        let reader = ProgressReader {
            inner: Cursor::new(bytes),
            done: 0,
            total,
            progress,
        };
        let response = self
            .http
            .post(self.url("/api/references"))
            .query(&[("title", title)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::sized(reader, total))
            .send()?;
        let entry: ReferenceEntry = check(response, None)?.json()?;
        log::info!("Uploaded reference {} ({})", entry.id, entry.title);
        Ok(entry)
    }

    pub fn delete_reference(&self, id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/api/references/{id}")))
            .send()?;
        check(response, Some(id))?;
        log::info!("Deleted reference {id}");
        Ok(())
    }

    pub fn update_reference(&self, id: &str, update: &ReferenceUpdate) -> Result<ReferenceEntry> {
        let response = self
            .http
            .patch(self.url(&format!("/api/references/{id}")))
            .json(update)
            .send()?;
        Ok(check(response, Some(id))?.json()?)
    }
}
