//! Error types for Matrix API operations.
//!
//! Remote failures keep their full context (errcode, message, raw body and
//! HTTP status). The handful of errcodes callers branch on are lifted into
//! [`ErrorCode`] so control flow never compares strings.

use std::fmt;

/// Result type alias for Matrix API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errcodes the provisioning logic reacts to.
///
/// Everything else is carried verbatim in [`ErrorCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// `M_USER_IN_USE`: the requested username is taken.
    UserInUse,
    /// `M_UNKNOWN_TOKEN`: the access token is unknown or expired.
    UnknownToken,
    /// `M_NOT_FOUND`: the requested resource does not exist.
    NotFound,
    /// Any other errcode, or an empty string when the body had none.
    Other(String),
}

impl ErrorCode {
    /// Parse the `errcode` field of an error body.
    pub fn from_errcode(code: &str) -> Self {
        match code {
            "M_USER_IN_USE" => Self::UserInUse,
            "M_UNKNOWN_TOKEN" => Self::UnknownToken,
            "M_NOT_FOUND" => Self::NotFound,
            other => Self::Other(other.to_string()),
        }
    }

    /// The wire form of this errcode.
    pub fn as_str(&self) -> &str {
        match self {
            Self::UserInUse => "M_USER_IN_USE",
            Self::UnknownToken => "M_UNKNOWN_TOKEN",
            Self::NotFound => "M_NOT_FOUND",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-200 response from the homeserver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Parsed errcode.
    pub code: ErrorCode,
    /// Human-readable `error` field.
    pub message: String,
    /// The response body exactly as received.
    pub raw_body: String,
    /// HTTP status code.
    pub status: u16,
}

impl RemoteError {
    /// Build a remote error from its parts.
    pub fn new(code: ErrorCode, message: impl Into<String>, status: u16) -> Self {
        let message = message.into();
        let raw_body = serde_json::json!({ "errcode": code.as_str(), "error": message }).to_string();
        Self {
            code,
            message,
            raw_body,
            status,
        }
    }

    /// Decode a raw error body. Bodies that are not Matrix error objects
    /// still produce an error, with an empty errcode.
    pub fn from_body(status: u16, raw_body: String) -> Self {
        #[derive(serde::Deserialize)]
        struct Body {
            #[serde(default)]
            errcode: String,
            #[serde(default)]
            error: String,
        }

        match serde_json::from_str::<Body>(&raw_body) {
            Ok(body) => Self {
                code: ErrorCode::from_errcode(&body.errcode),
                message: body.error,
                raw_body,
                status,
            },
            Err(_) => Self {
                code: ErrorCode::Other(String::new()),
                message: format!("request failed: {raw_body}"),
                raw_body,
                status,
            },
        }
    }

    /// Whether the homeserver reported the resource as missing, either by
    /// errcode or by a 404 status.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::NotFound || self.status == 404
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "code={} message={} status_code={}",
            self.code, self.message, self.status
        )
    }
}

impl std::error::Error for RemoteError {}

/// Categories of API errors for retry logic and user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection problems and timeouts (transient, retryable).
    Network,
    /// The homeserver rejected the credentials.
    Auth,
    /// The requested object does not exist remotely.
    NotFound,
    /// The homeserver answered, but not the way the protocol requires.
    Protocol,
    /// Caller-supplied input was malformed.
    Input,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Auth => "Authentication rejected",
            Self::NotFound => "Remote object not found",
            Self::Protocol => "Unexpected homeserver behaviour",
            Self::Input => "Invalid input",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the homeserver URL and your connection, then try again",
            Self::Auth => "Check the access token or credentials in the manifest",
            Self::NotFound => "Verify the identifier exists on the homeserver",
            Self::Protocol => "The homeserver may not support this operation",
            Self::Input => "Fix the declared value and run again",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to a homeserver.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The homeserver answered with a non-200 status.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// The request did not complete within the per-call timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// A 200 response whose body did not match the expected shape.
    #[error("invalid API response: {0}")]
    Decode(String),

    /// The server base URL or a request path could not be turned into a URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A content locator did not have the `mxc://origin/media_id` shape.
    #[error("invalid mxc: {reason}")]
    MalformedLocator {
        /// The locator as supplied.
        input: String,
        /// Which rule it broke.
        reason: &'static str,
    },

    /// Registration offered no flow consisting solely of the dummy stage.
    #[error("no dummy auth stage among registration flows {flows:?}")]
    UnsupportedAuthFlow {
        /// The flows the homeserver offered, as stage lists.
        flows: Vec<Vec<String>>,
    },

    /// The registration probe succeeded instead of issuing a challenge.
    #[error("ui auth failed: expected an auth challenge but registration completed")]
    MissingChallenge,

    /// The dummy stage was submitted but the homeserver challenged again.
    #[error("ui auth failed: expected response but got login flow")]
    UnexpectedChallengeRepeat,
}

impl Error {
    /// Create a decode error.
    pub fn decode(message: impl fmt::Display) -> Self {
        Self::Decode(message.to_string())
    }

    /// The remote error, if this is one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    /// Whether this is a remote error with the given errcode.
    pub fn has_code(&self, code: &ErrorCode) -> bool {
        self.remote().is_some_and(|remote| &remote.code == code)
    }

    /// Whether this is a remote "not found", by errcode or by status.
    pub fn is_not_found(&self) -> bool {
        self.remote().is_some_and(RemoteError::is_not_found)
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Remote(remote) => match remote.code {
                ErrorCode::UnknownToken => ErrorCategory::Auth,
                ErrorCode::NotFound => ErrorCategory::NotFound,
                _ if remote.status == 404 => ErrorCategory::NotFound,
                _ if remote.status == 401 || remote.status == 403 => ErrorCategory::Auth,
                _ if remote.status >= 500 => ErrorCategory::Network,
                _ => ErrorCategory::Other,
            },
            Error::Timeout(_) | Error::Transport(_) => ErrorCategory::Network,
            Error::Decode(_)
            | Error::UnsupportedAuthFlow { .. }
            | Error::MissingChallenge
            | Error::UnexpectedChallengeRepeat => ErrorCategory::Protocol,
            Error::InvalidUrl(_) | Error::MalformedLocator { .. } => ErrorCategory::Input,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Self::Remote(err)
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(which) => Self::Timeout(format!("{which:?}")),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}
