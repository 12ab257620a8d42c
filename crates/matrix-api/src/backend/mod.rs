//! The homeserver transport seam.
//!
//! [`RemoteClient`] is the single interface the provisioning logic talks
//! through. [`http::HttpBackend`] is the real implementation;
//! [`MockBackend`] scripts replies in memory for tests.
//!
//! # Testing
//!
//! ```
//! use matrix_api::backend::{Method, MockBackend, RemoteClientExt};
//! use matrix_api::types::WhoAmI;
//! use matrix_api::ApiPath;
//! use serde_json::json;
//!
//! let mock = MockBackend::new();
//! let whoami = ApiPath::client(["account", "whoami"]);
//! mock.reply(Method::Get, &whoami, json!({"user_id": "@bot:example.org"}));
//!
//! let me: WhoAmI = mock.get_json(&whoami, Some("token")).unwrap();
//! assert_eq!(me.user_id, "@bot:example.org");
//! ```

pub mod http;

use crate::error::{Error, RemoteError, Result};
use crate::path::ApiPath;
use crate::types::ContentUploadResponse;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io::Read;
use std::sync::{Arc, Mutex};

/// HTTP methods used by the client-server API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
    /// DELETE
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        })
    }
}

/// A media download in progress. The body must be drained or dropped.
pub struct Download {
    /// Response headers, lowercase names.
    pub headers: Vec<(String, String)>,
    /// Streaming body.
    pub body: Box<dyn Read + Send>,
}

impl Download {
    /// Value of a header, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Transport for homeserver calls.
///
/// Implementations decode 200 responses as JSON and turn every other status
/// into [`Error::Remote`].
pub trait RemoteClient: Send + Sync {
    /// Issue a JSON request, optionally authenticated with a bearer token.
    fn request(
        &self,
        method: Method,
        path: &ApiPath,
        body: Option<&Value>,
        access_token: Option<&str>,
    ) -> Result<Value>;

    /// Upload raw bytes to the media repository.
    fn upload(
        &self,
        content: &[u8],
        file_name: Option<&str>,
        content_type: &str,
        access_token: &str,
    ) -> Result<ContentUploadResponse>;

    /// Start downloading a media object.
    fn download(&self, origin: &str, media_id: &str) -> Result<Download>;
}

/// Typed helpers over [`RemoteClient::request`].
pub trait RemoteClientExt: RemoteClient {
    /// GET and decode.
    fn get_json<R: DeserializeOwned>(&self, path: &ApiPath, access_token: Option<&str>) -> Result<R> {
        let value = self.request(Method::Get, path, None, access_token)?;
        serde_json::from_value(value).map_err(Error::decode)
    }

    /// Send a JSON body and decode the response.
    fn send_json<B: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &ApiPath,
        body: &B,
        access_token: Option<&str>,
    ) -> Result<R> {
        let body = serde_json::to_value(body)?;
        let value = self.request(method, path, Some(&body), access_token)?;
        serde_json::from_value(value).map_err(Error::decode)
    }

    /// Send a request whose response body is irrelevant.
    fn send_unit(
        &self,
        method: Method,
        path: &ApiPath,
        body: Option<&Value>,
        access_token: Option<&str>,
    ) -> Result<()> {
        self.request(method, path, body, access_token).map(|_| ())
    }
}

impl<T: RemoteClient + ?Sized> RemoteClientExt for T {}

// =============================================================================
// Mock backend
// =============================================================================

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with this body.
    Ok(Value),
    /// Non-200 status.
    Remote(RemoteError),
    /// The call timed out.
    Timeout,
    /// The connection failed.
    Transport(String),
}

impl Reply {
    fn into_result(self) -> Result<Value> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Remote(err) => Err(Error::Remote(err)),
            Self::Timeout => Err(Error::Timeout("global".to_string())),
            Self::Transport(message) => Err(Error::Transport(message)),
        }
    }
}

/// A call observed by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Method.
    pub method: Method,
    /// Rendered path, e.g. `/_matrix/client/r0/account/whoami`.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<Value>,
    /// Bearer token, if any.
    pub access_token: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    replies: HashMap<(Method, String), VecDeque<Reply>>,
    uploads: VecDeque<Reply>,
    media: HashMap<(String, String), Vec<u8>>,
    calls: Vec<RecordedCall>,
}

/// In-memory backend with scripted replies.
///
/// Replies queue per `(method, path)`. Each call pops the front reply; the
/// last reply of a queue is sticky and answers every later call. Calls with
/// no scripted reply fail with a transport error naming the path.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue a reply for a method and path.
    pub fn script(&self, method: Method, path: &ApiPath, reply: Reply) {
        self.lock()
            .replies
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Queue a 200 reply.
    pub fn reply(&self, method: Method, path: &ApiPath, body: Value) {
        self.script(method, path, Reply::Ok(body));
    }

    /// Queue a Matrix error reply.
    pub fn fail(&self, method: Method, path: &ApiPath, err: RemoteError) {
        self.script(method, path, Reply::Remote(err));
    }

    /// Queue a reply to the next upload.
    pub fn script_upload(&self, reply: Reply) {
        self.lock().uploads.push_back(reply);
    }

    /// Make a media object downloadable.
    pub fn add_media(&self, origin: &str, media_id: &str, content: Vec<u8>) {
        self.lock()
            .media
            .insert((origin.to_string(), media_id.to_string()), content);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Calls matching a method and path.
    pub fn calls_to(&self, method: Method, path: &ApiPath) -> Vec<RecordedCall> {
        let rendered = path.to_string();
        self.lock()
            .calls
            .iter()
            .filter(|call| call.method == method && call.path == rendered)
            .cloned()
            .collect()
    }

    /// Calls with a given method.
    pub fn calls_with(&self, method: Method) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    /// Forget recorded calls, keeping scripted replies.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn next_reply(queue: &mut VecDeque<Reply>) -> Option<Reply> {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl RemoteClient for MockBackend {
    fn request(
        &self,
        method: Method,
        path: &ApiPath,
        body: Option<&Value>,
        access_token: Option<&str>,
    ) -> Result<Value> {
        let rendered = path.to_string();
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method,
            path: rendered.clone(),
            body: body.cloned(),
            access_token: access_token.map(str::to_string),
        });

        state
            .replies
            .get_mut(&(method, rendered.clone()))
            .and_then(Self::next_reply)
            .ok_or_else(|| Error::Transport(format!("mock reply not configured: {method} {rendered}")))?
            .into_result()
    }

    fn upload(
        &self,
        content: &[u8],
        file_name: Option<&str>,
        content_type: &str,
        access_token: &str,
    ) -> Result<ContentUploadResponse> {
        let path = match file_name {
            Some(name) => ApiPath::media(["upload"]).query("filename", name),
            None => ApiPath::media(["upload"]),
        };
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method: Method::Post,
            path: path.to_string(),
            body: Some(serde_json::json!({
                "content_type": content_type,
                "length": content.len(),
            })),
            access_token: Some(access_token.to_string()),
        });

        let value = Self::next_reply(&mut state.uploads)
            .ok_or_else(|| Error::Transport("mock upload reply not configured".to_string()))?
            .into_result()?;
        serde_json::from_value(value).map_err(Error::decode)
    }

    fn download(&self, origin: &str, media_id: &str) -> Result<Download> {
        let path = ApiPath::media(["download", origin, media_id]);
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method: Method::Get,
            path: path.to_string(),
            body: None,
            access_token: None,
        });

        let content = state
            .media
            .get(&(origin.to_string(), media_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                Error::Remote(RemoteError::new(
                    crate::ErrorCode::NotFound,
                    "Not found",
                    404,
                ))
            })?;
        Ok(Download {
            headers: vec![(
                "content-length".to_string(),
                content.len().to_string(),
            )],
            body: Box::new(std::io::Cursor::new(content)),
        })
    }
}
