//! Lifecycle errors

use super::abandon::AbandonStep;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// A profile field write that failed
#[derive(Debug)]
pub struct FieldFailure {
    pub field: &'static str,
    pub source: matrix_api::Error,
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.source)
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] matrix_api::Error),

    #[error("invalid declaration for {address}: {reason}")]
    InvalidDeclaration { address: String, reason: String },

    #[error("existing access token was rejected: {source}")]
    InvalidExistingToken { source: matrix_api::Error },

    #[error("username is taken and logging in as {username} failed: {source}")]
    LoginFailed {
        username: String,
        source: matrix_api::Error,
    },

    #[error("profile update failed: {}", join(.failures))]
    ProfileUpdate { failures: Vec<FieldFailure> },

    #[error("a default access token is required to upload content")]
    MissingUploadCredential,

    #[error("{field} mismatch while adopting content. expected: '{expected}'  got: '{actual}'")]
    AdoptionMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("content objects are immutable")]
    ImmutableResource,

    #[error("changing {} requires replacing the resource", .fields.join(", "))]
    ForceNewRequired { fields: Vec<String> },

    #[error("updating room {field} failed (already written: {}): {source}", committed_list(.committed))]
    RoomFieldUpdate {
        field: &'static str,
        committed: Vec<&'static str>,
        source: matrix_api::Error,
    },

    #[error("cannot derive a server name from user id {0:?}")]
    MalformedUserId(String),

    #[error("member {user_id} has no content in their member event")]
    MalformedMemberEvent { user_id: String },

    #[error(
        "room teardown failed at {step}: {source} (last completed step: {})",
        .last_completed.map_or("none", AbandonStep::label)
    )]
    Abandonment {
        step: AbandonStep,
        last_completed: Option<AbandonStep>,
        source: Box<Error>,
    },
}

fn committed_list(committed: &[&'static str]) -> String {
    if committed.is_empty() {
        "nothing".to_string()
    } else {
        committed.join(", ")
    }
}

impl Error {
    /// The underlying API error, if any
    pub fn api(&self) -> Option<&matrix_api::Error> {
        match self {
            Self::Api(err)
            | Self::InvalidExistingToken { source: err }
            | Self::LoginFailed { source: err, .. }
            | Self::RoomFieldUpdate { source: err, .. } => Some(err),
            Self::Abandonment { source, .. } => source.api(),
            _ => None,
        }
    }

    /// Whether retrying the same call might succeed
    pub fn is_retryable(&self) -> bool {
        self.api().is_some_and(matrix_api::Error::is_retryable)
    }

    /// What kind of failure this is and what to do about it
    pub fn hint(&self) -> Option<String> {
        self.api().map(|err| {
            let category = err.category();
            format!("{category}: {}", category.advice())
        })
    }
}
