//! Bus tracker errors

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = anyhow::Result<T, Error>;

/// Domain level error type shared by the tracker crates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested resource could not be found.
    #[error("code: 404, description: {0}")]
    NotFound(String),

    /// A non recoverable internal error occurred.
    #[error("code: 500, description: {0}")]
    Internal(String),

    /// The backend failed while fulfilling the request.
    #[error("code: 502, description: {0}")]
    BadGateway(String),

    /// A payload could not be decoded.
    #[error("code: 500, description: invalid_format {0}")]
    InvalidFormat(String),

    /// The device cannot provide a position for this session.
    #[error("code: 503, description: geolocation_unavailable {0}")]
    GeolocationUnavailable(String),

    /// The backend answered but holds no reading yet.
    #[error("code: 204, description: no_data")]
    NoData,
}

impl Error {
    /// Returns the stable error code associated with the variant.
    #[must_use]
    pub const fn code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::GeolocationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NoData => StatusCode::NO_CONTENT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure is expected to clear on the next attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::BadGateway(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        let chain = err.chain().map(ToString::to_string).collect::<Vec<_>>().join(" -> ");

        // if type is Error, return it with the newly added context
        if let Some(inner) = err.downcast_ref::<Self>() {
            tracing::debug!("Error: {err}, caused by: {inner}");

            return match inner {
                Self::NotFound(_) => Self::NotFound(chain),
                Self::BadGateway(_) => Self::BadGateway(chain),
                Self::Internal(_) => Self::Internal(chain),
                Self::InvalidFormat(e) => Self::InvalidFormat(format!("{err}: {e}")),
                Self::GeolocationUnavailable(e) => {
                    Self::GeolocationUnavailable(format!("{err}: {e}"))
                }
                Self::NoData => Self::NoData,
            };
        }

        // otherwise, return an Internal error
        Self::Internal(chain)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

/// Error wrapper returned by the host's HTTP handlers.
pub struct HttpError {
    status: StatusCode,
    error: String,
}

impl From<Error> for HttpError {
    fn from(e: Error) -> Self {
        Self { status: e.code(), error: e.to_string() }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, self.error).into_response()
    }
}

#[macro_export]
macro_rules! not_found {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::NotFound(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::NotFound(format!($err))
    };
}

#[macro_export]
macro_rules! bad_gateway {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::BadGateway(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::BadGateway(format!($err))
    };
}
