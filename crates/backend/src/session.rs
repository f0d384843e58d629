//! Connection and model-availability session state.
//!
//! Rebuilt by explicit connection checks, consulted by the orchestrator's
//! pre-flight validation so a turn can be rejected without touching the
//! network. Never persisted.

use crate::client::{GenerationBackend, ModelInfo};
use chrono::{DateTime, Utc};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct BackendSession {
    pub connected: bool,
    pub available_models: Vec<ModelInfo>,
    pub selected_model: Option<String>,
    pub last_check: Option<DateTime<Utc>>,
}

impl BackendSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe the backend and reload the model catalog. When nothing is
    /// selected yet (or the selection vanished from the catalog), the
    /// first listed model becomes the selection. Returns the new
    /// connected state.
    pub async fn refresh<B: GenerationBackend + ?Sized>(&mut self, backend: &B) -> bool {
        self.connected = backend.is_available().await;
        self.last_check = Some(Utc::now());

        if !self.connected {
            self.available_models.clear();
            return false;
        }

        match backend.list_models().await {
            Ok(models) => {
                let selection_gone = match &self.selected_model {
                    Some(name) => !models.iter().any(|m| &m.name == name),
                    None => true,
                };
                if selection_gone {
                    self.selected_model = models.first().map(|m| m.name.clone());
                }
                self.available_models = models;
            }
            Err(err) => {
                warn!("model catalog refresh failed: {}", err);
                self.available_models.clear();
            }
        }
        self.connected
    }

    /// Record a model selection. The choice is validated against the
    /// catalog at send time, not here, so a model can be picked before the
    /// first successful connection check.
    pub fn select_model(&mut self, name: impl Into<String>) {
        self.selected_model = Some(name.into());
    }

    /// Whether the cached catalog lists `name`.
    pub fn model_available(&self, name: &str) -> bool {
        self.available_models.iter().any(|m| m.name == name)
    }
}
