//! Blocking HTTP backend over `ureq`.
//!
//! Every call shares one agent with a 30 second global timeout. Statuses are
//! inspected here rather than by `ureq`, so a 4xx body can be decoded into a
//! [`RemoteError`].

use crate::backend::{Download, Method, RemoteClient};
use crate::error::{Error, RemoteError, Result};
use crate::path::ApiPath;
use crate::types::ContentUploadResponse;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Per-call timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Content type used when an upload does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const USER_AGENT: &str = concat!("mxform/", env!("CARGO_PKG_VERSION"));

/// Homeserver client over HTTP.
///
/// # Example
///
/// ```no_run
/// use matrix_api::backend::http::HttpBackend;
/// use matrix_api::backend::RemoteClientExt;
/// use matrix_api::types::WhoAmI;
/// use matrix_api::ApiPath;
///
/// let backend = HttpBackend::new("https://matrix.example.org").unwrap();
/// let me: WhoAmI = backend
///     .get_json(&ApiPath::client(["account", "whoami"]), Some("token"))
///     .unwrap();
/// println!("{}", me.user_id);
/// ```
pub struct HttpBackend {
    agent: ureq::Agent,
    base: Url,
}

impl HttpBackend {
    /// Create a backend for a homeserver base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("{base_url} cannot be a base URL")));
        }
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build();
        Ok(Self {
            agent: ureq::Agent::new_with_config(config),
            base,
        })
    }

    /// The homeserver base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &ApiPath) -> Result<String> {
        path.resolve(&self.base).map(String::from)
    }

    fn bearer(access_token: &str) -> String {
        format!("Bearer {access_token}")
    }

    /// Turn a response into JSON, or a remote error for any non-200 status.
    fn read_json(mut response: ureq::http::Response<ureq::Body>) -> Result<Value> {
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        if status != 200 {
            return Err(Error::Remote(RemoteError::from_body(status, body)));
        }
        if body.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&body).map_err(Error::decode)
    }
}

impl RemoteClient for HttpBackend {
    fn request(
        &self,
        method: Method,
        path: &ApiPath,
        body: Option<&Value>,
        access_token: Option<&str>,
    ) -> Result<Value> {
        let url = self.url(path)?;
        log::debug!("{method} {path}");
        let auth = access_token.map(Self::bearer);

        let response = match method {
            Method::Get | Method::Delete => {
                let mut request = if method == Method::Get {
                    self.agent.get(&url)
                } else {
                    self.agent.delete(&url)
                };
                request = request.header("User-Agent", USER_AGENT);
                if let Some(auth) = &auth {
                    request = request.header("Authorization", auth);
                }
                request.call()?
            }
            Method::Put | Method::Post => {
                let mut request = if method == Method::Put {
                    self.agent.put(&url)
                } else {
                    self.agent.post(&url)
                };
                request = request.header("User-Agent", USER_AGENT);
                if let Some(auth) = &auth {
                    request = request.header("Authorization", auth);
                }
                match body {
                    Some(body) => request.send_json(body)?,
                    None => request.send_empty()?,
                }
            }
        };

        let result = Self::read_json(response);
        if let Err(err) = &result {
            log::debug!("{method} {path} failed: {err}");
        }
        result
    }

    fn upload(
        &self,
        content: &[u8],
        file_name: Option<&str>,
        content_type: &str,
        access_token: &str,
    ) -> Result<ContentUploadResponse> {
        let mut path = ApiPath::media(["upload"]);
        if let Some(name) = file_name {
            path = path.query("filename", name);
        }
        let url = self.url(&path)?;
        let content_type = if content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            content_type
        };
        log::debug!("POST {path} ({} bytes, {content_type})", content.len());

        let response = self
            .agent
            .post(&url)
            .header("User-Agent", USER_AGENT)
            .header("Authorization", &Self::bearer(access_token))
            .header("Content-Type", content_type)
            .send(content)?;

        let value = Self::read_json(response)?;
        serde_json::from_value(value).map_err(Error::decode)
    }

    fn download(&self, origin: &str, media_id: &str) -> Result<Download> {
        let path = ApiPath::media(["download", origin, media_id]);
        let url = self.url(&path)?;
        log::debug!("GET {path}");

        let mut response = self
            .agent
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .call()?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.body_mut().read_to_string()?;
            return Err(Error::Remote(RemoteError::from_body(status, body)));
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        Ok(Download {
            headers,
            body: Box::new(response.into_body().into_reader()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_parses_base() {
        let backend = HttpBackend::new("https://matrix.example.org").unwrap();
        assert_eq!(backend.base_url().as_str(), "https://matrix.example.org/");
    }

    #[test]
    fn test_new_rejects_garbage() {
        assert!(matches!(
            HttpBackend::new("not a url"),
            Err(Error::InvalidUrl(_))
        ));
        assert!(HttpBackend::new("mailto:admin@example.org").is_err());
    }

    #[test]
    fn test_url_encodes_room_ids() {
        let backend = HttpBackend::new("https://hs.example.org/").unwrap();
        let url = backend
            .url(&ApiPath::client(["rooms", "!abc:hs.example.org", "leave"]))
            .unwrap();
        assert_eq!(
            url,
            "https://hs.example.org/_matrix/client/r0/rooms/!abc:hs.example.org/leave"
        );
    }

    #[test]
    fn test_bearer_header() {
        assert_eq!(HttpBackend::bearer("abc"), "Bearer abc");
    }
}
