//! Error types shared between the fetch worker, the frame loop and the HUD.

use thiserror::Error;

/// Failure of a single flight data request. Each one rejects only the
/// request (refresh cycle) that produced it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlightDataError {
    /// The client-credentials token exchange failed or was refused.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The network call itself failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    /// The response did not have the expected shape.
    #[error("malformed response: {0}")]
    Data(String),
    #[error("invalid observer coordinates ({latitude}, {longitude})")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
    /// The background fetch worker is gone (shutdown or panic).
    #[error("fetch worker is not running")]
    WorkerStopped,
}

impl FlightDataError {
    /// Transport-class failures, including non-success statuses.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. })
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Data(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Failure reported by a location provider. Logged, never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeoError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location unavailable: {0}")]
    Unavailable(String),
    #[error("location request timed out")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_count_as_transport() {
        let err = FlightDataError::Status {
            status: 503,
            url: "https://example.test/states/all".to_string(),
        };
        assert!(err.is_transport());
        assert!(FlightDataError::Transport("reset".into()).is_transport());
        assert!(!FlightDataError::Auth("401".into()).is_transport());
    }

    #[test]
    fn messages_are_human_readable() {
        let err = FlightDataError::Status {
            status: 429,
            url: "https://opensky-network.org/api/states/all".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP 429 from https://opensky-network.org/api/states/all"
        );
        assert_eq!(GeoError::Timeout.to_string(), "location request timed out");
    }
}
