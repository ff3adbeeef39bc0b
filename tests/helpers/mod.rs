//! Shared fixtures: a scripted provider and gateway builders.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use translation_gateway::gateway::cache::TranslationCache;
use translation_gateway::gateway::{DEFAULT_CACHE_TTL, GatewayConfig, TranslationGateway};
use translation_gateway::provider::{ProviderError, TranslationProvider};

type BatchFn = dyn Fn(&str, &[String]) -> Result<String, ProviderError> + Send + Sync;
type SingleFn = dyn Fn(&str, &str) -> Result<String, ProviderError> + Send + Sync;

/// Provider double with call counters and a concurrency gauge.
///
/// By default a batch answers `{"translations": ["{lang}:{text}", ...]}` and a
/// single call answers `{lang}:{text}`.
pub struct MockProvider {
    batch: Box<BatchFn>,
    single: Box<SingleFn>,
    delay: Duration,
    configured: bool,
    batch_calls: AtomicUsize,
    single_calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    batches_seen: Mutex<Vec<Vec<String>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            batch: Box::new(|lang: &str, texts: &[String]| {
                let out: Vec<String> = texts.iter().map(|t| format!("{lang}:{t}")).collect();
                Ok(json!({ "translations": out }).to_string())
            }),
            single: Box::new(|lang: &str, text: &str| Ok(format!("{lang}:{text}"))),
            delay: Duration::ZERO,
            configured: true,
            batch_calls: AtomicUsize::new(0),
            single_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            batches_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_batch(
        mut self,
        f: impl Fn(&str, &[String]) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.batch = Box::new(f);
        self
    }

    /// Answer every batch with the same raw payload.
    pub fn with_batch_payload(self, payload: &str) -> Self {
        let payload = payload.to_string();
        self.with_batch(move |_, _| Ok(payload.clone()))
    }

    pub fn with_single(
        mut self,
        f: impl Fn(&str, &str) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.single = Box::new(f);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn batches_seen(&self) -> Vec<Vec<String>> {
        self.batches_seen.lock().unwrap().clone()
    }

    async fn occupy(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _leave = Leave(&self.active);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

struct Leave<'a>(&'a AtomicUsize);

impl Drop for Leave<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn translate_batch(
        &self,
        target_language: &str,
        texts: &[String],
    ) -> Result<String, ProviderError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batches_seen.lock().unwrap().push(texts.to_vec());
        self.occupy().await;
        (self.batch)(target_language, texts)
    }

    async fn translate_one(
        &self,
        target_language: &str,
        text: &str,
    ) -> Result<String, ProviderError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.occupy().await;
        (self.single)(target_language, text)
    }
}

pub fn upstream_failure() -> ProviderError {
    ProviderError::Status {
        status: 503,
        body: "upstream unavailable".to_string(),
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub struct Harness {
    pub gateway: Arc<TranslationGateway>,
    pub provider: Arc<MockProvider>,
    pub cache: Arc<TranslationCache>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(provider: MockProvider) -> Self {
        Self::with_config(provider, GatewayConfig::default())
    }

    pub fn with_config(provider: MockProvider, config: GatewayConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(TranslationCache::new(
            dir.path().join("translation-cache.json"),
            DEFAULT_CACHE_TTL,
        ));
        Self::with_cache(provider, config, cache, dir)
    }

    pub fn with_cache(
        provider: MockProvider,
        config: GatewayConfig,
        cache: Arc<TranslationCache>,
        dir: TempDir,
    ) -> Self {
        let provider = Arc::new(provider);
        let gateway = Arc::new(TranslationGateway::new(
            Arc::clone(&cache),
            Arc::clone(&provider) as Arc<dyn TranslationProvider>,
            &config,
        ));
        Self {
            gateway,
            provider,
            cache,
            dir,
        }
    }
}
