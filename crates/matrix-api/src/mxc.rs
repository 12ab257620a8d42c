//! Content locators of the form `mxc://origin/media_id`.

use crate::error::{Error, Result};
use std::fmt;

/// Scheme prefix of a content locator.
pub const MXC_PREFIX: &str = "mxc://";

/// A parsed content locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mxc {
    /// The locator rebuilt from its parts, without query or fragment.
    pub canonical: String,
    /// Server name that owns the media.
    pub origin: String,
    /// Media identifier on that server.
    pub media_id: String,
}

impl Mxc {
    /// Build a locator from its parts.
    pub fn new(origin: &str, media_id: &str) -> Self {
        Self {
            canonical: format(origin, media_id),
            origin: origin.to_string(),
            media_id: media_id.to_string(),
        }
    }
}

impl fmt::Display for Mxc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl std::str::FromStr for Mxc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

/// Render a locator from origin and media id.
pub fn format(origin: &str, media_id: &str) -> String {
    format!("{MXC_PREFIX}{origin}/{media_id}")
}

/// Parse a locator, dropping any query string and fragment.
///
/// # Errors
///
/// [`Error::MalformedLocator`] when the `mxc://` prefix is missing, nothing
/// is left after it, or the rest is not exactly two non-empty segments.
pub fn parse(input: &str) -> Result<Mxc> {
    let malformed = |reason| Error::MalformedLocator {
        input: input.to_string(),
        reason,
    };

    let rest = input
        .strip_prefix(MXC_PREFIX)
        .ok_or_else(|| malformed("missing protocol"))?
        .trim();
    let rest = rest.split('?').next().unwrap_or_default();
    let rest = rest.split('#').next().unwrap_or_default();
    if rest.is_empty() {
        return Err(malformed("no origin or media_id"));
    }

    let mut parts = rest.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(origin), Some(media_id), None) => {
            if origin.is_empty() || media_id.is_empty() {
                return Err(malformed("empty origin or media_id"));
            }
            Ok(Mxc::new(origin, media_id))
        }
        _ => Err(malformed("wrong number of segments, expected 2")),
    }
}
