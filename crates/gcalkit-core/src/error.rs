//! Error types for calendar operations.
//!
//! Every failure surfaced by this workspace is a [`CalendarError`] tagged with
//! an [`ErrorKind`]. Server-classified kinds map one-to-one onto HTTP status
//! codes returned by the calendar API; the remaining kinds cover local
//! validation, transport and configuration problems.

use std::fmt;
use thiserror::Error;

/// The category of a calendar error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A token exchange was rejected by the authorization server.
    AuthorizationFailed,
    /// The resource server rejected the access token (401).
    InvalidCredentials,
    /// The request was malformed (400) or returned an unmapped status.
    RequestFailed,
    /// The resource does not exist (404).
    NotFound,
    /// An event with the asserted identifier already exists (409).
    IdentifierAlreadyExists,
    /// The resource is gone, e.g. a stale sync token or double delete (410).
    Gone,
    /// Optimistic-concurrency conflict (412).
    PreconditionFailed,
    /// The server failed internally (500).
    BackendError,
    /// Access was denied (403).
    Forbidden,
    /// The project's daily quota is used up (403).
    DailyLimitExceeded,
    /// The per-user rate limit was hit (403).
    UserRateLimitExceeded,
    /// The project rate limit was hit (403).
    RateLimitExceeded,
    /// The calendar usage limits were hit (403).
    CalendarUsageLimitExceeded,
    /// The legacy feed API redirected more times than allowed.
    TooManyRedirections,
    /// A caller-supplied value failed validation.
    InvalidArgument,
    /// An operation needed a calendar identifier and none was given.
    CalendarIdMissing,
    /// The HTTP round trip could not be completed.
    Network,
    /// A successful response carried a body that could not be decoded.
    InvalidResponse,
    /// Client configuration or local storage is invalid.
    Configuration,
}

impl ErrorKind {
    /// Returns true for the kinds produced by a 403 response.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::Forbidden
                | Self::DailyLimitExceeded
                | Self::UserRateLimitExceeded
                | Self::RateLimitExceeded
                | Self::CalendarUsageLimitExceeded
        )
    }

    /// Returns true for the quota and rate-limit kinds.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            Self::DailyLimitExceeded
                | Self::UserRateLimitExceeded
                | Self::RateLimitExceeded
                | Self::CalendarUsageLimitExceeded
        )
    }

    /// Returns a stable snake_case name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationFailed => "authorization_failed",
            Self::InvalidCredentials => "invalid_credentials",
            Self::RequestFailed => "request_failed",
            Self::NotFound => "not_found",
            Self::IdentifierAlreadyExists => "identifier_already_exists",
            Self::Gone => "gone",
            Self::PreconditionFailed => "precondition_failed",
            Self::BackendError => "backend_error",
            Self::Forbidden => "forbidden",
            Self::DailyLimitExceeded => "daily_limit_exceeded",
            Self::UserRateLimitExceeded => "user_rate_limit_exceeded",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::CalendarUsageLimitExceeded => "calendar_usage_limit_exceeded",
            Self::TooManyRedirections => "too_many_redirections",
            Self::InvalidArgument => "invalid_argument",
            Self::CalendarIdMissing => "calendar_id_missing",
            Self::Network => "network",
            Self::InvalidResponse => "invalid_response",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while talking to the calendar service.
#[derive(Debug, Error)]
pub struct CalendarError {
    kind: ErrorKind,
    message: String,
    /// HTTP status of the response that produced this error, if any.
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CalendarError {
    /// Creates a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Creates an authorization failure.
    pub fn authorization_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthorizationFailed, message)
    }

    /// Creates an invalid credentials error.
    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCredentials, message)
    }

    /// Creates a request failure.
    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestFailed, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Creates a redirect-limit error.
    pub fn too_many_redirections(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TooManyRedirections, message)
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Creates a missing calendar id error.
    pub fn calendar_id_missing() -> Self {
        Self::new(ErrorKind::CalendarIdMissing, "calendar id is required")
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Records the HTTP status that produced this error.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status, if the error came from a response.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns true if this is a [`ErrorKind::NotFound`] error.
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl fmt::Display for CalendarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        Ok(())
    }
}

/// A specialized Result type for calendar operations.
pub type CalendarResult<T> = Result<T, CalendarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_family() {
        assert!(ErrorKind::Forbidden.is_forbidden());
        assert!(ErrorKind::RateLimitExceeded.is_forbidden());
        assert!(!ErrorKind::Forbidden.is_rate_limit());
        assert!(ErrorKind::CalendarUsageLimitExceeded.is_rate_limit());
        assert!(!ErrorKind::NotFound.is_forbidden());
    }

    #[test]
    fn error_display() {
        let err = CalendarError::not_found("event abcde missing").with_status(404);
        assert_eq!(err.to_string(), "not_found: event abcde missing (HTTP 404)");
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn error_without_status() {
        let err = CalendarError::invalid_argument("bad id");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.message(), "bad id");
        assert_eq!(err.to_string(), "invalid_argument: bad id");
    }

    #[test]
    fn error_with_source() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = CalendarError::configuration("failed to save tokens").with_source(io_err);
        assert!(err.source().is_some());
    }
}
