//! # Backend Jobs
//!
//! Backend requests are blocking, so each one runs on its own thread and
//! reports back over a crossbeam channel that the GUI drains on every tick.

use std::thread;

use cantor_core::backend::{
    BackendClient, ReferenceEntry, ReferenceExtraction, ReferenceSource, ReferenceUpdate, ScoreResponse,
};
use cantor_core::{PitchSeries, Result, SeriesKind};
use crossbeam_channel::Sender;

/// Work the GUI hands to a background thread.
#[derive(Debug, Clone)]
pub enum Job {
    ListReferences,
    /// Download the audio and extract the pitch contour of a reference.
    LoadReference { id: String },
    Score { wav: Vec<u8>, source: ReferenceSource },
    Upload { title: String, bytes: Vec<u8> },
    Delete { id: String },
    Rename { id: String, title: String },
}

/// What comes back from a job.
#[derive(Debug)]
pub enum JobReply {
    References(Result<Vec<ReferenceEntry>>),
    /// `(done, total)` bytes of a transfer.
    Progress { done: u64, total: Option<u64> },
    ReferenceLoaded {
        id: String,
        audio: Result<Vec<u8>>,
        extraction: Result<ReferenceExtraction>,
    },
    Scored(Result<ScoreResponse>),
    Uploaded(Result<ReferenceEntry>),
    Deleted { id: String, result: Result<()> },
    Renamed(Result<ReferenceEntry>),
}

/// Runs `job` on a fresh thread. The reply is dropped if the GUI is gone.
pub fn spawn(client: BackendClient, job: Job, replies: Sender<JobReply>) {
    let name = format!("cantor-job-{}", job_name(&job));
    let spawned = thread::Builder::new().name(name).spawn(move || {
        let reply = run(&client, job, &replies);
        let _ = replies.send(reply);
    });
    if let Err(err) = spawned {
        log::error!("Could not start backend job: {err}");
    }
}

fn job_name(job: &Job) -> &'static str {
    match job {
        Job::ListReferences => "list",
        Job::LoadReference { .. } => "load",
        Job::Score { .. } => "score",
        Job::Upload { .. } => "upload",
        Job::Delete { .. } => "delete",
        Job::Rename { .. } => "rename",
    }
}

fn run(client: &BackendClient, job: Job, replies: &Sender<JobReply>) -> JobReply {
    match job {
        Job::ListReferences => JobReply::References(client.list_references()),
        Job::LoadReference { id } => {
            let progress = replies.clone();
            let audio = client.fetch_reference_audio(&id, |done, total| {
                let _ = progress.send(JobReply::Progress { done, total });
            });
            // No extraction for a reference whose audio could not be fetched.
            let extraction = match &audio {
                Ok(_) => client.extract_reference_or_empty(&ReferenceSource::Id(id.clone())),
                Err(_) => Ok(ReferenceExtraction {
                    series: PitchSeries::new(SeriesKind::Reference),
                    text_segments: Vec::new(),
                    available: false,
                }),
            };
            JobReply::ReferenceLoaded { id, audio, extraction }
        }
        Job::Score { wav, source } => JobReply::Scored(client.score(wav, &source)),
        Job::Upload { title, bytes } => {
            let progress = replies.clone();
            JobReply::Uploaded(client.upload_reference(&title, bytes, move |done, total| {
                let _ = progress.send(JobReply::Progress { done, total });
            }))
        }
        Job::Delete { id } => {
            let result = client.delete_reference(&id);
            JobReply::Deleted { id, result }
        }
        Job::Rename { id, title } => {
            let update = ReferenceUpdate {
                title: Some(title),
                ..ReferenceUpdate::default()
            };
            JobReply::Renamed(client.update_reference(&id, &update))
        }
    }
}
