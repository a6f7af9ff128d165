use thiserror::Error;

/// Codec errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Inbound request violates the wire format or targets another account.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Reply from the server could not be understood.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ProtocolError {
    pub(crate) fn request(detail: impl Into<String>) -> Self {
        Self::MalformedRequest(detail.into())
    }

    pub(crate) fn response(detail: impl Into<String>) -> Self {
        Self::MalformedResponse(detail.into())
    }
}
