//! Request paths relative to the homeserver base URL.
//!
//! Paths are kept as raw segments so identifiers such as `!room:host` or
//! `#alias:host` are percent-encoded exactly once, when the HTTP backend
//! joins them onto the base URL.

use std::fmt;
use url::Url;

const CLIENT_PREFIX: [&str; 3] = ["_matrix", "client", "r0"];
const MEDIA_PREFIX: [&str; 3] = ["_matrix", "media", "r0"];

/// A homeserver path with an optional query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiPath {
    segments: Vec<String>,
    query: Vec<(String, String)>,
}

impl ApiPath {
    /// A path under the client-server API prefix.
    pub fn client<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_prefix(&CLIENT_PREFIX, segments)
    }

    /// A path under the media API prefix.
    pub fn media<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_prefix(&MEDIA_PREFIX, segments)
    }

    fn with_prefix<I, S>(prefix: &[&str], segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = prefix
            .iter()
            .map(|s| (*s).to_string())
            .chain(segments.into_iter().map(Into::into))
            .collect();
        Self {
            segments,
            query: Vec::new(),
        }
    }

    /// Append a query parameter.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Raw path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolve against a base URL, percent-encoding every segment.
    pub fn resolve(&self, base: &Url) -> crate::Result<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| crate::Error::InvalidUrl(format!("{base} cannot be a base URL")))?
            .pop_if_empty()
            .extend(&self.segments);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        for (i, (key, value)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}
