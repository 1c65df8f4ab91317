//! Strongly typed error system for the upload link.
//!
//! Every failure the link can surface is a [`LinkError`] carrying a typed
//! [`ErrorCode`]. Transport aborts are an error *kind* (`ABORTED`) so that
//! the reconciler can tell consumer-initiated cancellation apart from real
//! failures.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::response::FetchResult;

/// Typed error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // Transport errors
    NetworkError,
    Aborted,

    // Response errors
    ServerError,
    ServerParseError,

    // Request errors
    SerializeError,
    InvalidRequest,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "NETWORK_ERROR",
            Self::Aborted => "ABORTED",
            Self::ServerError => "SERVER_ERROR",
            Self::ServerParseError => "SERVER_PARSE_ERROR",
            Self::SerializeError => "SERIALIZE_ERROR",
            Self::InvalidRequest => "INVALID_REQUEST",
        }
    }

    /// Returns true if a surrounding retry layer may try again.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error produced by the link or by a [`Fetch`](crate::fetch::Fetch)
/// implementation.
#[derive(Error, Debug, Clone)]
#[error("[{code}] {message}")]
pub struct LinkError {
    /// Typed error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// HTTP status of the response, when one was received.
    pub status: Option<StatusCode>,
    /// Raw response body, kept when it could not be parsed.
    pub body_text: Option<String>,
    /// Parsed GraphQL result that came with a failed response.
    pub result: Option<FetchResult>,
}

impl LinkError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            body_text: None,
            result: None,
        }
    }

    /// Attaches the HTTP status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches the raw response body.
    pub fn with_body_text(mut self, body_text: impl Into<String>) -> Self {
        self.body_text = Some(body_text.into());
        self
    }

    /// Attaches a parsed GraphQL result.
    pub fn with_result(mut self, result: FetchResult) -> Self {
        self.result = Some(result);
        self
    }

    // Convenience constructors

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    /// Creates the abort error a transport returns when its signal fires.
    pub fn aborted() -> Self {
        Self::new(ErrorCode::Aborted, "The operation was aborted")
    }

    /// Creates a server error for an unsuccessful or incomplete response.
    pub fn server(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, message).with_status(status)
    }

    /// Creates an error for a response body that is not valid JSON.
    pub fn server_parse(
        status: StatusCode,
        body_text: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCode::ServerParseError, message)
            .with_status(status)
            .with_body_text(body_text)
    }

    /// Creates a serialization error.
    pub fn serialize(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializeError, message)
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Returns true if this error means the request was cancelled.
    pub fn is_abort(&self) -> bool {
        self.code == ErrorCode::Aborted
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Returns the attached result when it carries an `errors` array and
    /// non-null `data`.
    ///
    /// Such a result is forwarded to the subscriber before the error so that
    /// downstream links can inspect GraphQL errors on non-2xx responses.
    pub fn partial_result(&self) -> Option<&FetchResult> {
        self.result
            .as_ref()
            .filter(|result| result.errors.is_some() && result.has_data())
    }
}

impl Serialize for LinkError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("LinkError", 4)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(status) = self.status {
            state.serialize_field("status", &status.as_u16())?;
        }
        if let Some(ref result) = self.result {
            state.serialize_field("result", result)?;
        }
        state.end()
    }
}

/// Type alias for link results.
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Result extension for mapping foreign errors into [`LinkError`].
pub trait ResultExt<T> {
    /// Maps the error to a `LinkError` with the given code.
    fn map_link_err(self, code: ErrorCode) -> LinkResult<T>;

    /// Maps the error to a `LinkError` with the given code and a message prefix.
    fn map_link_err_with(self, code: ErrorCode, message: impl fmt::Display) -> LinkResult<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn map_link_err(self, code: ErrorCode) -> LinkResult<T> {
        self.map_err(|e| LinkError::new(code, e.to_string()))
    }

    fn map_link_err_with(self, code: ErrorCode, message: impl fmt::Display) -> LinkResult<T> {
        self.map_err(|e| LinkError::new(code, format!("{message}: {e}")))
    }
}
