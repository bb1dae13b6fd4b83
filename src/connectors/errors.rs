use std::fmt;

/// Failures talking to an outbound HTTP service.
#[derive(Debug)]
pub enum ConnectorError {
    /// The service answered with a non-2xx status.
    Upstream { status: u16, body: String },
    /// Unreachable, refused, or timed out.
    Unavailable(String),
    /// The request could not be built or the response could not be read.
    Http(String),
}

impl ConnectorError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream { status, body } => write!(f, "upstream returned {}: {}", status, body),
            Self::Unavailable(msg) => write!(f, "upstream unavailable: {}", msg),
            Self::Http(msg) => write!(f, "HTTP error: {}", msg),
        }
    }
}

impl std::error::Error for ConnectorError {}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Unavailable(format!("request timeout: {}", err))
        } else if err.is_connect() {
            Self::Unavailable(format!("connection failed: {}", err))
        } else if let Some(status) = err.status() {
            Self::Upstream {
                status: status.as_u16(),
                body: String::new(),
            }
        } else if err.is_body() || err.is_decode() || err.is_request() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}
