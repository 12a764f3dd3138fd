//! Lockout Tracker
//!
//! Failure counting for the login and transaction tracks of accounts and
//! for admin logins. Works on `LockTrack` values; the caller persists the
//! owning record afterwards.

use chrono::{DateTime, Utc};

use crate::domain::DomainError;
use crate::model::{Account, LockTrack, Track};

/// Failed attempts allowed before a track locks
pub const DEFAULT_THRESHOLD: u32 = 3;

/// What a verification attempt did to a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Secret accepted; counter reset
    Accepted,
    /// Secret rejected; track still open
    Rejected { remaining: u32 },
    /// Secret rejected and this failure locked the track
    LockedNow,
    /// Track was already locked; nothing was evaluated
    AlreadyLocked,
}

impl AttemptOutcome {
    /// Map to the caller-facing result for `track`
    pub fn into_result(self, track: Track) -> Result<(), DomainError> {
        match self {
            AttemptOutcome::Accepted => Ok(()),
            AttemptOutcome::Rejected { remaining } => Err(DomainError::InvalidCredential {
                remaining_attempts: remaining,
            }),
            AttemptOutcome::LockedNow => Err(DomainError::InvalidCredential {
                remaining_attempts: 0,
            }),
            AttemptOutcome::AlreadyLocked => Err(DomainError::TrackLocked(track)),
        }
    }

    /// Did the attempt change persisted state?
    pub fn is_state_change(&self) -> bool {
        !matches!(self, AttemptOutcome::AlreadyLocked)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LockoutTracker {
    threshold: u32,
}

impl LockoutTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_locked(&self, account: &Account, track: Track) -> bool {
        account.track(track).is_locked()
    }

    /// Count a failed verification; locks once the threshold is reached
    pub fn fail(&self, state: &mut LockTrack, now: DateTime<Utc>) -> AttemptOutcome {
        match *state {
            LockTrack::Locked { .. } => AttemptOutcome::AlreadyLocked,
            LockTrack::Unlocked { failures } => {
                let failures = failures + 1;
                if failures >= self.threshold {
                    *state = LockTrack::Locked { since: now };
                    AttemptOutcome::LockedNow
                } else {
                    *state = LockTrack::Unlocked { failures };
                    AttemptOutcome::Rejected {
                        remaining: self.threshold - failures,
                    }
                }
            }
        }
    }

    /// Count a successful verification; never unlocks a locked track
    pub fn succeed(&self, state: &mut LockTrack) -> AttemptOutcome {
        if state.is_locked() {
            return AttemptOutcome::AlreadyLocked;
        }
        *state = LockTrack::unlocked();
        AttemptOutcome::Accepted
    }

    /// Apply a verification result to one track: locked tracks short-circuit
    pub fn apply(&self, state: &mut LockTrack, valid: bool, now: DateTime<Utc>) -> AttemptOutcome {
        if valid {
            self.succeed(state)
        } else {
            self.fail(state, now)
        }
    }

    pub fn record_failure(&self, account: &mut Account, track: Track, now: DateTime<Utc>) -> AttemptOutcome {
        self.fail(account.track_mut(track), now)
    }

    pub fn record_success(&self, account: &mut Account, track: Track) -> AttemptOutcome {
        self.succeed(account.track_mut(track))
    }

    /// Apply a verification result to an account track
    pub fn attempt(&self, account: &mut Account, track: Track, valid: bool, now: DateTime<Utc>) -> AttemptOutcome {
        self.apply(account.track_mut(track), valid, now)
    }

    /// Explicit unlock: counter to zero, lock cleared
    pub fn clear(&self, state: &mut LockTrack) {
        *state = LockTrack::unlocked();
    }

    pub fn reset(&self, account: &mut Account, track: Track) {
        self.clear(account.track_mut(track));
    }

    /// Lock regardless of the counter
    pub fn force_lock(&self, account: &mut Account, track: Track, now: DateTime<Utc>) {
        let state = account.track_mut(track);
        if !state.is_locked() {
            *state = LockTrack::Locked { since: now };
        }
    }
}

impl Default for LockoutTracker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}
