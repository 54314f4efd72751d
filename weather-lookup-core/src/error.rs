use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification; the controller reports both kinds the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Decoding,
}

/// Everything that can go wrong between issuing a lookup and holding a report.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timed out: {0}")]
    Timeout(#[source] BoxError),

    #[error("Network error: {0}")]
    Transport(#[source] BoxError),

    #[error("Weather service responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected weather response: {0}")]
    Decoding(#[from] serde_json::Error),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Timeout(_) | FetchError::Transport(_) | FetchError::Status { .. } => {
                ErrorKind::Transport
            }
            FetchError::Decoding(_) => ErrorKind::Decoding,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest embeds the full URL, credential included
        let err = err.without_url();
        if err.is_timeout() || caused_by_timed_out_io(&err) {
            FetchError::Timeout(Box::new(err))
        } else {
            FetchError::Transport(Box::new(err))
        }
    }
}

// Read timeouts surface as an io::Error deep in hyper's chain.
fn caused_by_timed_out_io(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out");
        let timeout = FetchError::Timeout(Box::new(io));
        assert_eq!(timeout.kind(), ErrorKind::Transport);
        assert!(timeout.is_timeout());

        let status = FetchError::Status { status: 404, message: "city not found".into() };
        assert_eq!(status.kind(), ErrorKind::Transport);
        assert_eq!(
            status.to_string(),
            "Weather service responded with status 404: city not found"
        );

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(FetchError::from(json).kind(), ErrorKind::Decoding);
    }
}
