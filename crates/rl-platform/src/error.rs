use rl_resilience::{CircuitOpen, Retryable};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("unauthorized against the platform")]
    Unauthorized,
    #[error("not found: {what}")]
    NotFound { what: String },
    #[error("rate limited")]
    RateLimited,
    #[error("platform unavailable (status {status})")]
    Unavailable { status: u16 },
    #[error("platform call timed out")]
    Timeout,
    #[error("platform circuit open")]
    CircuitOpen,
    #[error("http error: {message}")]
    Http { message: String },
    #[error("unexpected response: {message}")]
    Decode { message: String },
}

impl PlatformError {
    pub fn from_status(status: u16, what: &str) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound {
                what: what.to_string(),
            },
            429 => Self::RateLimited,
            _ => Self::Unavailable { status },
        }
    }
}

impl Retryable for PlatformError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Unavailable { .. } | Self::Timeout | Self::Http { .. }
        )
    }
}

impl From<CircuitOpen> for PlatformError {
    fn from(_: CircuitOpen) -> Self {
        Self::CircuitOpen
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode {
                message: err.to_string(),
            }
        } else {
            Self::Http {
                message: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analyzer rejected credentials")]
    Unauthorized,
    #[error("analyzer rate limited")]
    RateLimited,
    #[error("analyzer unavailable (status {status})")]
    Unavailable { status: u16 },
    #[error("analyzer call timed out")]
    Timeout,
    #[error("analyzer circuit open")]
    CircuitOpen,
    #[error("http error: {message}")]
    Http { message: String },
    #[error("malformed analyzer response: {message}")]
    InvalidResponse { message: String },
}

impl AnalyzerError {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            429 => Self::RateLimited,
            _ => Self::Unavailable { status },
        }
    }
}

impl Retryable for AnalyzerError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Unavailable { .. } | Self::Timeout | Self::Http { .. }
        )
    }
}

impl From<CircuitOpen> for AnalyzerError {
    fn from(_: CircuitOpen) -> Self {
        Self::CircuitOpen
    }
}

impl From<reqwest::Error> for AnalyzerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            Self::Http {
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            PlatformError::from_status(401, "pr"),
            PlatformError::Unauthorized
        ));
        assert!(matches!(
            PlatformError::from_status(404, "pr"),
            PlatformError::NotFound { .. }
        ));
        assert!(PlatformError::from_status(429, "pr").is_transient());
        assert!(PlatformError::from_status(503, "pr").is_transient());
        assert!(!PlatformError::from_status(401, "pr").is_transient());
        assert!(!PlatformError::CircuitOpen.is_transient());
    }
}
