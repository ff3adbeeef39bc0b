//! Application state shared across request handlers.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::gateway::TranslationGateway;

/// Health status of a dependency.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Disabled,
}

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<TranslationGateway>,
    /// Used when a request omits `targetLanguage`.
    pub default_target_language: Arc<str>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(gateway: Arc<TranslationGateway>, default_target_language: &str) -> Self {
        Self {
            gateway,
            default_target_language: Arc::from(default_target_language),
            started_at: Instant::now(),
        }
    }

    pub fn provider_status(&self) -> ServiceStatus {
        if self.gateway.is_configured() {
            ServiceStatus::Active
        } else {
            ServiceStatus::Disabled
        }
    }
}
