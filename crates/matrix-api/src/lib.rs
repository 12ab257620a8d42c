//! # matrix-api
//!
//! Blocking plumbing for the Matrix client-server API, sized for resource
//! provisioning rather than chat.
//!
//! This crate provides:
//! - A [`RemoteClient`] seam with a `ureq` backend and a scripted [`MockBackend`]
//! - Wire types for registration, profiles, media and room state
//! - [`ApiPath`], which percent-encodes room ids and aliases per segment
//! - [`mxc`] locator parsing
//! - [`uia`] registration through the dummy interactive-auth stage
//! - An error taxonomy that names the errcodes callers branch on
//!
//! ## Example
//!
//! ```no_run
//! use matrix_api::{connect, ApiPath, RemoteClientExt};
//! use matrix_api::types::WhoAmI;
//!
//! let client = connect("https://matrix.example.org").expect("bad base URL");
//!
//! let session = matrix_api::uia::register(&client, "bot", "s3cret").expect("registration failed");
//! let me: WhoAmI = client
//!     .get_json(&ApiPath::client(["account", "whoami"]), Some(&session.access_token))
//!     .expect("whoami failed");
//! assert_eq!(me.user_id, session.user_id);
//! ```
//!
//! ## Errors
//!
//! Non-200 responses become [`Error::Remote`]. The errcodes the provisioning
//! logic reacts to are named in [`ErrorCode`]:
//!
//! | errcode           | variant                    |
//! |-------------------|----------------------------|
//! | `M_USER_IN_USE`   | [`ErrorCode::UserInUse`]   |
//! | `M_UNKNOWN_TOKEN` | [`ErrorCode::UnknownToken`]|
//! | `M_NOT_FOUND`     | [`ErrorCode::NotFound`]    |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod mxc;
pub mod path;
pub mod types;
pub mod uia;

pub use backend::http::HttpBackend;
pub use backend::{Download, Method, MockBackend, RemoteClient, RemoteClientExt};
pub use error::{Error, ErrorCategory, ErrorCode, RemoteError, Result};
pub use mxc::Mxc;
pub use path::ApiPath;

/// Create an HTTP client for a homeserver base URL.
///
/// # Errors
///
/// [`Error::InvalidUrl`] if `base_url` does not parse as a base URL.
pub fn connect(base_url: &str) -> Result<HttpBackend> {
    HttpBackend::new(base_url)
}
