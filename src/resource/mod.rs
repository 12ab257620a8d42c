//! Matrix resources managed by mxform
//!
//! Each resource kind implements [`declarative::Lifecycle`] over an injected
//! [`RemoteClient`]. Lifecycles borrow the client for the length of one run
//! and keep no state of their own.

pub mod abandon;
pub mod account;
pub mod content;
pub mod error;
pub mod room;

pub use error::{Error, Result};

use matrix_api::types::WhoAmI;
use matrix_api::{ApiPath, RemoteClient, RemoteClientExt};
use std::fmt;

/// Resolve the user an access token belongs to
pub fn whoami(client: &dyn RemoteClient, access_token: &str) -> matrix_api::Result<String> {
    let me: WhoAmI = client.get_json(&ApiPath::client(["account", "whoami"]), Some(access_token))?;
    Ok(me.user_id)
}

/// Path of a room state event; an empty state key is left off
pub fn state_path(room_id: &str, kind: &str, state_key: &str) -> ApiPath {
    let mut segments = vec!["rooms", room_id, "state", kind];
    if !state_key.is_empty() {
        segments.push(state_key);
    }
    ApiPath::client(segments)
}

/// A secret that compares by value but never prints it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sensitive<'a>(pub &'a str);

impl fmt::Display for Sensitive<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            Ok(())
        } else {
            f.write_str("(sensitive value)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_api::{Method, MockBackend};
    use serde_json::json;

    #[test]
    fn test_state_path_omits_empty_key() {
        assert_eq!(
            state_path("!r:hs", "m.room.name", "").to_string(),
            "/_matrix/client/r0/rooms/!r:hs/state/m.room.name"
        );
        assert_eq!(
            state_path("!r:hs", "m.room.member", "@a:hs").to_string(),
            "/_matrix/client/r0/rooms/!r:hs/state/m.room.member/@a:hs"
        );
    }

    #[test]
    fn test_whoami_sends_token() {
        let mock = MockBackend::new();
        mock.reply(
            Method::Get,
            &ApiPath::client(["account", "whoami"]),
            json!({"user_id": "@a:hs"}),
        );
        assert_eq!(whoami(&mock, "tok").unwrap(), "@a:hs");
        assert_eq!(mock.calls()[0].access_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_sensitive_hides_value() {
        assert_eq!(Sensitive("secret").to_string(), "(sensitive value)");
        assert_eq!(Sensitive("").to_string(), "");
        assert_ne!(Sensitive("a"), Sensitive("b"));
    }
}
