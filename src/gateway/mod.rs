//! The translation gateway: cache-first batch translation with bounded,
//! deduplicated upstream calls and self-healing of degenerate results.
//!
//! A batch flows through the cache (hits resolved locally), then the misses go
//! upstream as one coalesced call under the concurrency limiter. The decoded
//! result is reconciled position by position, written back to the cache and
//! checked by the quality heuristics. Suspicious results trigger per-item
//! retries for small batches; large ones fall back to the original texts.
//!
//! Provider failures never surface as errors. Callers always get one string per
//! input, in order, falling back to the untranslated text where needed.

pub mod cache;
pub mod coalesce;
pub mod limiter;
pub mod parse;
pub mod quality;

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::provider::{ProviderError, TranslationProvider};
use cache::{CacheError, TranslationCache};
use coalesce::{CoalesceError, Coalescer, batch_key};
use limiter::{LimiterClosed, UpstreamLimiter};
use quality::QualityReport;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Upper bound on accepted language-code length (BCP 47 tags stay well under this).
const MAX_LANGUAGE_LEN: usize = 35;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub cache_ttl: Duration,
    pub max_concurrent_upstream: usize,
    /// Largest batch eligible for per-item retries when flagged suspicious.
    pub retry_batch_limit: usize,
    pub upstream_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            max_concurrent_upstream: 4,
            retry_batch_limit: 50,
            upstream_timeout: Duration::from_secs(30),
        }
    }
}

/// Request-level rejections. Everything past validation is fail-open.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("texts must be a non-empty list")]
    EmptyBatch,
    #[error("invalid target language: {0:?}")]
    InvalidLanguage(String),
    #[error("translation provider credentials are not configured")]
    NotConfigured,
}

/// Why an upstream call produced nothing usable.
#[derive(Debug, thiserror::Error)]
enum UpstreamError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Closed(#[from] LimiterClosed),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub cached_entries: usize,
    pub in_flight: usize,
    pub upstream_capacity: usize,
    pub upstream_available: usize,
    pub upstream_in_use: usize,
}

/// Handles shared with spawned upstream work.
#[derive(Clone)]
struct Upstream {
    cache: Arc<TranslationCache>,
    limiter: UpstreamLimiter,
    provider: Arc<dyn TranslationProvider>,
    timeout: Duration,
}

impl Upstream {
    async fn batch(&self, target_language: &str, texts: &[String]) -> Result<String, UpstreamError> {
        let _permit = self.limiter.acquire().await?;
        tokio::time::timeout(
            self.timeout,
            self.provider.translate_batch(target_language, texts),
        )
        .await
        .map_err(|_| UpstreamError::Timeout(self.timeout))?
        .map_err(UpstreamError::from)
    }

    async fn one(&self, target_language: &str, text: &str) -> Result<String, UpstreamError> {
        let _permit = self.limiter.acquire().await?;
        tokio::time::timeout(self.timeout, self.provider.translate_one(target_language, text))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))?
            .map_err(UpstreamError::from)
    }

    /// Translate the cache misses of one batch. Always returns one string per
    /// input, falling back to the input itself wherever no translation exists.
    async fn fetch_batch(self, target_language: String, missing: Vec<String>) -> Arc<Vec<String>> {
        let raw = match self.batch(&target_language, &missing).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    lang = %target_language,
                    count = missing.len(),
                    error = %e,
                    "Upstream batch failed, returning original texts"
                );
                return Arc::new(missing);
            }
        };

        let Some(entries) = parse::parse_batch_payload(&raw) else {
            warn!(
                lang = %target_language,
                count = missing.len(),
                "Upstream payload undecodable, returning original texts"
            );
            return Arc::new(missing);
        };

        if entries.len() != missing.len() {
            warn!(
                lang = %target_language,
                expected = missing.len(),
                got = entries.len(),
                "Upstream returned wrong number of translations, mapping positionally"
            );
        }

        let reconciled = reconcile(&missing, entries);
        for &i in &reconciled.cacheable {
            self.cache
                .put(&target_language, &missing[i], &reconciled.translations[i]);
        }
        if !reconciled.cacheable.is_empty() {
            self.cache.flush_in_background();
        }

        debug!(
            lang = %target_language,
            count = missing.len(),
            cached = reconciled.cacheable.len(),
            "Upstream batch reconciled"
        );
        Arc::new(reconciled.translations)
    }
}

#[derive(Debug, PartialEq)]
struct Reconciled {
    translations: Vec<String>,
    /// Positions trusted enough to be written to the cache.
    cacheable: Vec<usize>,
}

/// Map decoded entries onto the requested texts by position.
///
/// Non-string, blank or absent entries fall back to the source text. Results
/// are only trusted for caching when the entry count matches the request.
fn reconcile(missing: &[String], entries: Vec<Value>) -> Reconciled {
    let shape_ok = entries.len() == missing.len();
    let mut entries = entries.into_iter();
    let mut translations = Vec::with_capacity(missing.len());
    let mut cacheable = Vec::new();

    for (i, source) in missing.iter().enumerate() {
        match entries.next() {
            Some(Value::String(s)) if !s.trim().is_empty() => {
                if shape_ok {
                    cacheable.push(i);
                }
                translations.push(s);
            }
            _ => translations.push(source.clone()),
        }
    }

    Reconciled {
        translations,
        cacheable,
    }
}

/// Language codes are short ASCII tags (`hi`, `pt-BR`, `zh_Hant`).
fn validate_language(target_language: &str) -> Result<(), GatewayError> {
    let valid = !target_language.is_empty()
        && target_language.len() <= MAX_LANGUAGE_LEN
        && target_language
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidLanguage(target_language.to_string()))
    }
}

pub struct TranslationGateway {
    upstream: Upstream,
    coalescer: Coalescer<Arc<Vec<String>>>,
    retry_batch_limit: usize,
}

impl TranslationGateway {
    pub fn new(
        cache: Arc<TranslationCache>,
        provider: Arc<dyn TranslationProvider>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            upstream: Upstream {
                cache,
                limiter: UpstreamLimiter::new(config.max_concurrent_upstream),
                provider,
                timeout: config.upstream_timeout,
            },
            coalescer: Coalescer::new(),
            retry_batch_limit: config.retry_batch_limit,
        }
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.upstream.cache
    }

    pub fn is_configured(&self) -> bool {
        self.upstream.provider.is_configured()
    }

    /// Translate `texts` into `target_language`, returning one string per input in order.
    #[tracing::instrument(skip_all, fields(lang = %target_language, count = texts.len()))]
    pub async fn translate_batch(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> Result<Vec<String>, GatewayError> {
        if texts.is_empty() {
            return Err(GatewayError::EmptyBatch);
        }
        validate_language(target_language)?;
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let cache = &self.upstream.cache;
        let mut outputs: Vec<Option<String>> = texts
            .iter()
            .map(|text| cache.get(target_language, text))
            .collect();

        let missing_at: Vec<usize> = outputs
            .iter()
            .enumerate()
            .filter_map(|(i, hit)| hit.is_none().then_some(i))
            .collect();

        // Fully cached batches never reach the provider or the validator.
        if missing_at.is_empty() {
            debug!(hits = texts.len(), "Served entirely from cache");
            return Ok(outputs.into_iter().flatten().collect());
        }

        let missing: Vec<String> = missing_at.iter().map(|&i| texts[i].clone()).collect();
        debug!(
            hits = texts.len() - missing.len(),
            misses = missing.len(),
            "Resolved cache hits"
        );

        let key = batch_key(target_language, &missing);
        let upstream = self.upstream.clone();
        let lang = target_language.to_string();
        let fallback = missing.clone();

        let translated = self
            .coalescer
            .get_or_start(key, move || upstream.fetch_batch(lang, missing))
            .await
            .unwrap_or_else(|e: CoalesceError| {
                warn!(error = %e, "Upstream batch task failed, returning original texts");
                Arc::new(fallback)
            });

        for (&i, translation) in missing_at.iter().zip(translated.iter()) {
            outputs[i] = Some(translation.clone());
        }

        let outputs: Vec<String> = outputs
            .into_iter()
            .zip(texts)
            .map(|(output, text)| output.unwrap_or_else(|| text.clone()))
            .collect();

        let report = quality::assess(texts, &outputs, target_language);
        if !report.suspicious() {
            return Ok(outputs);
        }

        if texts.len() > self.retry_batch_limit {
            warn!(
                collapsed = report.collapsed,
                mismatched = report.mismatched.len(),
                limit = self.retry_batch_limit,
                "Suspicious result on a batch too large to retry, returning original texts"
            );
            return Ok(texts.to_vec());
        }

        warn!(
            collapsed = report.collapsed,
            mismatched = report.mismatched.len(),
            "Suspicious result, retrying flagged items individually"
        );
        Ok(self
            .retry_flagged(texts, outputs, target_language, &report)
            .await)
    }

    /// Re-translate flagged indices one at a time, each under the limiter.
    async fn retry_flagged(
        &self,
        texts: &[String],
        mut outputs: Vec<String>,
        target_language: &str,
        report: &QualityReport,
    ) -> Vec<String> {
        let mut repaired = 0usize;

        for (i, text) in texts.iter().enumerate() {
            if !report.needs_retry(i) {
                continue;
            }

            match self.upstream.one(target_language, text).await {
                Ok(raw) => match parse::parse_single_payload(&raw) {
                    Some(translation) => {
                        self.upstream.cache.put(target_language, text, &translation);
                        outputs[i] = translation;
                        repaired += 1;
                    }
                    None => {
                        debug!(index = i, "Retry returned an empty payload");
                        outputs[i] = text.clone();
                    }
                },
                Err(e) => {
                    debug!(index = i, error = %e, "Retry failed, keeping original text");
                    outputs[i] = text.clone();
                }
            }
        }

        if repaired > 0 {
            self.upstream.cache.flush_in_background();
        }
        info!(repaired, "Per-item retries finished");
        outputs
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            cached_entries: self.upstream.cache.len(),
            in_flight: self.coalescer.in_flight(),
            upstream_capacity: self.upstream.limiter.capacity(),
            upstream_available: self.upstream.limiter.available(),
            upstream_in_use: self.upstream.limiter.in_use(),
        }
    }

    /// Persist the cache now, waiting for the write to finish.
    pub async fn flush(&self) -> Result<usize, CacheError> {
        self.upstream.cache.flush().await
    }

    /// Stop admitting upstream calls. Calls already holding a slot run to completion,
    /// callers still waiting fall back to their original texts.
    pub fn close(&self) {
        self.upstream.limiter.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reconcile_matching_shape() {
        let missing = strings(&["a", "b", "c"]);
        let result = reconcile(&missing, vec![json!("A"), json!(null), json!("C")]);
        assert_eq!(result.translations, strings(&["A", "b", "C"]));
        assert_eq!(result.cacheable, vec![0, 2]);
    }

    #[test]
    fn reconcile_short_payload_maps_positionally() {
        let missing = strings(&["a", "b", "c"]);
        let result = reconcile(&missing, vec![json!("A"), json!("B")]);
        assert_eq!(result.translations, strings(&["A", "B", "c"]));
        assert!(result.cacheable.is_empty());
    }

    #[test]
    fn reconcile_long_payload_is_truncated() {
        let missing = strings(&["a"]);
        let result = reconcile(&missing, vec![json!("A"), json!("extra")]);
        assert_eq!(result.translations, strings(&["A"]));
        assert!(result.cacheable.is_empty());
    }

    #[test]
    fn reconcile_rejects_blank_entries() {
        let missing = strings(&["a", "b"]);
        let result = reconcile(&missing, vec![json!("  "), json!(7)]);
        assert_eq!(result.translations, missing);
        assert!(result.cacheable.is_empty());
    }

    #[test]
    fn language_validation() {
        for ok in ["en", "hi", "pt-BR", "zh_Hant"] {
            assert!(validate_language(ok).is_ok(), "{ok}");
        }
        let long = "x".repeat(MAX_LANGUAGE_LEN + 1);
        for bad in ["", "en::x", "e n", "fr/", long.as_str()] {
            assert!(
                matches!(validate_language(bad), Err(GatewayError::InvalidLanguage(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(2_592_000));
        assert_eq!(config.max_concurrent_upstream, 4);
        assert_eq!(config.retry_batch_limit, 50);
    }
}
