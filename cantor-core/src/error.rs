//! # Error Module
//!
//! Error taxonomy shared by capture, extraction, playback and the backend
//! client. Errors that invalidate the current session (denied microphone,
//! missing reference) are returned to the caller; recoverable ones are
//! absorbed where they happen and only logged.

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CantorError>;

#[derive(Debug, Error)]
pub enum CantorError {
    /// Microphone permission refused or no input device present.
    #[error("Microphone unavailable: {0}")]
    CaptureDenied(String),

    /// The input device is held by another application.
    #[error("Microphone is busy: {0}")]
    CaptureBusy(String),

    /// Backend pitch/score extraction failed or the request never completed.
    #[error("Extraction failed: {0}")]
    ExtractionTimeout(String),

    /// The backend no longer knows the selected reference.
    #[error("Reference {0} no longer exists")]
    StaleReference(String),

    /// Any other non-success response from the backend.
    #[error("Backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Invalid activity transition: {0}")]
    InvalidTransition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CantorError {
    /// Whether the error invalidates the running session and should be shown
    /// to the user with an actionable message.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            CantorError::CaptureDenied(_)
                | CantorError::CaptureBusy(_)
                | CantorError::StaleReference(_)
        )
    }
}

/// Non-fatal failure while re-encoding captured audio.
///
/// Never returned to the user: the caller keeps the original bytes and
/// logs this at warn level.
#[derive(Debug, Error)]
#[error("Format conversion failed, using captured bytes: {reason}")]
pub struct FormatConversionWarning {
    pub reason: String,
}

impl From<reqwest::Error> for CantorError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            CantorError::Backend {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            CantorError::ExtractionTimeout(err.to_string())
        }
    }
}

impl From<hound::Error> for CantorError {
    fn from(err: hound::Error) -> Self {
        CantorError::Audio(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_fatal_errors() {
        assert!(CantorError::CaptureDenied("no device".into()).is_session_fatal());
        assert!(CantorError::StaleReference("abc".into()).is_session_fatal());
        assert!(!CantorError::ExtractionTimeout("timeout".into()).is_session_fatal());
        assert!(
            !CantorError::Backend {
                status: 500,
                body: String::new()
            }
            .is_session_fatal()
        );
    }
}
