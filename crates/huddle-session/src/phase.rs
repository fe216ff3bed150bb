//! Session phase controller: `Lobby → Active → Review`, never backwards.
//!
//! The deadline set on start is display data. Nothing here expires it; the
//! server may opt into an automatic review transition (see the gateway's
//! `deadline_elapsed`).

use chrono::{DateTime, TimeDelta, Utc};
use huddle_core::errors::SessionError;
use huddle_core::model::{PhaseName, SessionPhase};

#[derive(Debug, Default)]
pub struct PhaseController {
    phase: SessionPhase,
}

impl PhaseController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn name(&self) -> PhaseName {
        self.phase.name()
    }

    /// Start the session. Only valid from `Lobby`.
    pub fn start(
        &mut self,
        duration_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SessionError> {
        if duration_minutes == 0 {
            return Err(SessionError::InvalidDuration(duration_minutes));
        }
        if self.phase != SessionPhase::Lobby {
            return Err(SessionError::InvalidPhase {
                action: "start the session",
                phase: self.phase.name(),
            });
        }
        let deadline = now + TimeDelta::minutes(i64::from(duration_minutes));
        self.phase = SessionPhase::Active { deadline };
        tracing::info!(duration_minutes, deadline = %deadline, "session started");
        Ok(deadline)
    }

    /// Enter review from any phase. Clears the deadline.
    /// Returns the phase that was left.
    pub fn enter_review(&mut self) -> PhaseName {
        let previous = self.phase.name();
        self.phase = SessionPhase::Review;
        tracing::info!(from = %previous, "entered review");
        previous
    }

    /// Whether the session is active and its deadline is at or before `now`.
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.phase.deadline().is_some_and(|d| d <= now)
    }
}
