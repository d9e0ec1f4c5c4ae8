/// Errors from calls to the Session Manager.
/// Exactly two kinds: the upstream was unreachable, or it answered non-2xx.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream error {status}: {body}")]
    Upstream { status: u16, body: String },
}

impl ClientError {
    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        Self::Upstream { status, body }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network_error",
            Self::Upstream { .. } => "upstream_error",
        }
    }

    /// Status code of the upstream response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network(_) => None,
            Self::Upstream { status, .. } => Some(*status),
        }
    }
}
