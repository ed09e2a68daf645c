//! Activity state machine.
//!
//! Recording, practice, follow-the-reference and playback are mutually
//! exclusive. Every change goes through [`transition`] so the rules live in
//! one place.

use std::time::Instant;

use crate::error::{CantorError, Result};

/// What the user can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    /// Free recording, no reference required.
    Recording,
    /// Singing against the reference while it plays.
    Practicing,
    /// Live pitch following the reference timeline, without playback.
    FollowingReference,
    /// Synchronized playback of reference and recording.
    PlayingBack,
}

impl ActivityKind {
    /// Whether the activity needs the microphone.
    pub fn captures(self) -> bool {
        !matches!(self, ActivityKind::PlayingBack)
    }

    /// Whether live samples are mapped onto the reference timeline.
    pub fn follows_reference(self) -> bool {
        matches!(self, ActivityKind::Practicing | ActivityKind::FollowingReference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityState {
    #[default]
    Idle,
    Recording { since: Instant },
    Practicing { since: Instant },
    FollowingReference { since: Instant },
    PlayingBack { since: Instant },
}

impl ActivityState {
    pub fn kind(&self) -> Option<ActivityKind> {
        match self {
            ActivityState::Idle => None,
            ActivityState::Recording { .. } => Some(ActivityKind::Recording),
            ActivityState::Practicing { .. } => Some(ActivityKind::Practicing),
            ActivityState::FollowingReference { .. } => Some(ActivityKind::FollowingReference),
            ActivityState::PlayingBack { .. } => Some(ActivityKind::PlayingBack),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, ActivityState::Idle)
    }

    pub fn since(&self) -> Option<Instant> {
        match *self {
            ActivityState::Idle => None,
            ActivityState::Recording { since }
            | ActivityState::Practicing { since }
            | ActivityState::FollowingReference { since }
            | ActivityState::PlayingBack { since } => Some(since),
        }
    }

    fn started(kind: ActivityKind, since: Instant) -> Self {
        match kind {
            ActivityKind::Recording => ActivityState::Recording { since },
            ActivityKind::Practicing => ActivityState::Practicing { since },
            ActivityKind::FollowingReference => ActivityState::FollowingReference { since },
            ActivityKind::PlayingBack => ActivityState::PlayingBack { since },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityCommand {
    Start(ActivityKind),
    /// The user asked to stop.
    Stop,
    /// The alignment hard stop fired.
    ForceStop,
    /// The reference player reached its end.
    PlaybackEnded,
}

/// Applies `command` to `state`.
///
/// Starting while another activity runs is rejected; the caller stops the
/// running one first. Stopping while idle is a no-op.
pub fn transition(state: ActivityState, command: ActivityCommand, now: Instant) -> Result<ActivityState> {
    match (state, command) {
        (ActivityState::Idle, ActivityCommand::Start(kind)) => Ok(ActivityState::started(kind, now)),
        (running, ActivityCommand::Start(kind)) => Err(CantorError::InvalidTransition(format!(
            "cannot start {kind:?} while {:?} is running",
            running.kind()
        ))),
        (ActivityState::Idle, _) => Ok(ActivityState::Idle),
        (_, ActivityCommand::Stop) => Ok(ActivityState::Idle),
        (_, ActivityCommand::ForceStop) => Ok(ActivityState::Idle),
        (running, ActivityCommand::PlaybackEnded) => match running.kind() {
            // Free recording does not depend on the player.
            Some(ActivityKind::Recording) => Ok(running),
            _ => Ok(ActivityState::Idle),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_stop() {
        let now = Instant::now();
        let state = transition(ActivityState::Idle, ActivityCommand::Start(ActivityKind::Practicing), now).unwrap();
        assert_eq!(state, ActivityState::Practicing { since: now });
        assert_eq!(state.kind(), Some(ActivityKind::Practicing));
        assert_eq!(transition(state, ActivityCommand::Stop, now).unwrap(), ActivityState::Idle);
    }

    #[test]
    fn cannot_start_twice() {
        let now = Instant::now();
        let state = ActivityState::Recording { since: now };
        assert!(matches!(
            transition(state, ActivityCommand::Start(ActivityKind::PlayingBack), now),
            Err(CantorError::InvalidTransition(_))
        ));
    }

    #[test]
    fn playback_end_leaves_recording_running() {
        let now = Instant::now();
        let recording = ActivityState::Recording { since: now };
        assert_eq!(transition(recording, ActivityCommand::PlaybackEnded, now).unwrap(), recording);
        let practice = ActivityState::Practicing { since: now };
        assert_eq!(
            transition(practice, ActivityCommand::PlaybackEnded, now).unwrap(),
            ActivityState::Idle
        );
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let now = Instant::now();
        assert_eq!(
            transition(ActivityState::Idle, ActivityCommand::ForceStop, now).unwrap(),
            ActivityState::Idle
        );
    }
}
