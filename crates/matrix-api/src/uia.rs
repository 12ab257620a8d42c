//! Registration through the interactive-auth handshake.
//!
//! Only the flow made of the single `m.login.dummy` stage is supported:
//!
//! 1. probe `POST /register` with an empty body and read the 401 challenge
//! 2. pick the dummy-only flow
//! 3. resubmit with the dummy stage, the challenge session and the credentials
//!
//! Nothing is retried. A second 401 means the homeserver did not accept the
//! dummy stage.

use crate::backend::{Method, RemoteClient};
use crate::error::{Error, RemoteError, Result};
use crate::path::ApiPath;
use crate::types::{AUTH_TYPE_DUMMY, AuthenticationData, RegisterRequest, Session, UiAuthChallenge};

const UNAUTHORIZED: u16 = 401;

/// Outcome of one registration round-trip.
#[derive(Debug)]
enum Round {
    Challenged(UiAuthChallenge),
    Registered(Session),
}

/// Path of the registration endpoint for ordinary users.
pub fn register_path() -> ApiPath {
    ApiPath::client(["register"]).query("kind", "user")
}

/// Register `username` with `password`, completing the dummy auth stage.
///
/// # Errors
///
/// - [`Error::UnsupportedAuthFlow`] if no flow is exactly `[m.login.dummy]`
/// - [`Error::UnexpectedChallengeRepeat`] if the completed request is challenged again
/// - [`Error::MissingChallenge`] if the probe registers without a challenge
/// - any transport, decode or remote error from either round-trip, unchanged
pub fn register<C: RemoteClient + ?Sized>(
    client: &C,
    username: &str,
    password: &str,
) -> Result<Session> {
    log::debug!("Getting registration flows");
    let challenge = match submit(client, &RegisterRequest::default())? {
        Round::Challenged(challenge) => challenge,
        Round::Registered(_) => return Err(Error::MissingChallenge),
    };

    select_dummy_flow(&challenge)?;

    log::debug!("Using dummy registration flow to register {username}");
    let request = RegisterRequest {
        authentication: Some(AuthenticationData {
            kind: AUTH_TYPE_DUMMY.to_string(),
            session: challenge.session,
        }),
        username: username.to_string(),
        password: password.to_string(),
    };
    match submit(client, &request)? {
        Round::Registered(session) => Ok(session),
        Round::Challenged(_) => Err(Error::UnexpectedChallengeRepeat),
    }
}

/// Check that the challenge offers the dummy-only flow.
pub fn select_dummy_flow(challenge: &UiAuthChallenge) -> Result<()> {
    let supported = challenge
        .flows
        .iter()
        .any(|flow| flow.stages.len() == 1 && flow.stages[0] == AUTH_TYPE_DUMMY);
    if supported {
        Ok(())
    } else {
        Err(Error::UnsupportedAuthFlow {
            flows: challenge
                .flows
                .iter()
                .map(|flow| flow.stages.clone())
                .collect(),
        })
    }
}

fn submit<C: RemoteClient + ?Sized>(client: &C, request: &RegisterRequest) -> Result<Round> {
    let body = serde_json::to_value(request)?;
    match client.request(Method::Post, &register_path(), Some(&body), None) {
        Ok(value) => serde_json::from_value(value)
            .map(Round::Registered)
            .map_err(Error::decode),
        Err(Error::Remote(RemoteError {
            status: UNAUTHORIZED,
            raw_body,
            ..
        })) => serde_json::from_str(&raw_body)
            .map(Round::Challenged)
            .map_err(Error::decode),
        Err(err) => Err(err),
    }
}
