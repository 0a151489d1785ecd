use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::backend::BackendError;
use crate::voting::PollId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Validation error: {message}")]
pub struct ValidationError {
    message: String,
}

pub fn poll_question_empty() -> ValidationError {
    ValidationError {
        message: String::from("poll question must not be empty"),
    }
}

pub fn poll_option_limit_exceeded(limits: RangeInclusive<usize>, count: usize) -> ValidationError {
    ValidationError {
        message: format!("poll must have between {} and {} options, got {count}", limits.start(), limits.end()),
    }
}

pub fn poll_changes_empty() -> ValidationError {
    ValidationError {
        message: String::from("poll update does not change anything"),
    }
}

pub fn credentials_email_invalid(email: &str) -> ValidationError {
    ValidationError {
        message: format!("'{email}' is not a valid email address"),
    }
}

pub fn credentials_password_too_short(min: usize, len: usize) -> ValidationError {
    ValidationError {
        message: format!("password must be at least {min} characters, got {len}"),
    }
}

/// Coarse classification used to decide how a failure is surfaced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Rejected before the backend was contacted.
    Validation,
    /// Blocking, non-retryable user-facing condition.
    Conflict,
    /// Network, permission or lookup failure reported by the backend.
    Backend,
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no option selected")]
    NoSelection,

    #[error("poll accepts a single option, got {count}")]
    TooManySelections { count: usize },

    #[error("already voted in poll {0}")]
    AlreadyVoted(PollId),

    #[error("poll {poll_id} ended at {ended_at}")]
    PollExpired { poll_id: PollId, ended_at: DateTime<Utc> },

    #[error("poll {0} not found")]
    NotFound(PollId),

    #[error("poll {0} belongs to another user")]
    NotOwner(PollId),

    #[error("results of poll {0} are hidden")]
    ResultsHidden(PollId),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl PollError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PollError::Validation(_) | PollError::NoSelection | PollError::TooManySelections { .. } => {
                ErrorKind::Validation
            }
            PollError::AlreadyVoted(_)
            | PollError::PollExpired { .. }
            | PollError::NotOwner(_)
            | PollError::ResultsHidden(_) => ErrorKind::Conflict,
            PollError::NotFound(_) | PollError::Backend(_) => ErrorKind::Backend,
        }
    }
}
