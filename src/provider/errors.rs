//! Error types for the translation provider client.

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("translation provider credentials are not configured")]
    NotConfigured,
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider response envelope was malformed: {0}")]
    MalformedEnvelope(String),
}
