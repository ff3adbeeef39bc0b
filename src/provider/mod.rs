//! The upstream translation provider, treated as an opaque request/response service.

pub mod errors;
pub mod http;

pub use errors::ProviderError;
pub use http::{HttpProvider, ProviderSettings};

use async_trait::async_trait;

/// A billable, non-idempotent translation backend.
///
/// Implementations return the provider's raw textual payload. Unwrapping and
/// decoding it is the gateway's job, since providers routinely wrap structured
/// output in markdown fences or prose.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Whether credentials are present. Requests are rejected up front when not.
    fn is_configured(&self) -> bool {
        true
    }

    /// Translate an ordered batch. The payload should decode to
    /// `{"translations": [...]}` with one entry per input, in order.
    async fn translate_batch(
        &self,
        target_language: &str,
        texts: &[String],
    ) -> Result<String, ProviderError>;

    /// Translate a single text, asking for exactly one string and nothing else.
    async fn translate_one(&self, target_language: &str, text: &str)
    -> Result<String, ProviderError>;
}
