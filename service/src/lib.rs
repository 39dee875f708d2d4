pub mod backend;
pub mod config;
pub mod lanes;
pub mod listener;
pub mod orchestrator;
pub mod overlay;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use backend::{BackendRouter, SuggestionBackend};
pub use config::{ConfigHandle, CoreplyConfig};
pub use listener::{ScreenEvent, ScreenService};
pub use orchestrator::{Phase, SuggestionOrchestrator};
pub use overlay::{AcceptMode, OverlayContent, OverlaySink, Presentation};

/// Installs the global `tracing` subscriber. `RUST_LOG` refines the default
/// `info` level.
pub fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .try_init()
        .map_err(|error| anyhow!("failed to install tracing subscriber: {error}"))
}

/// Loads the config, builds the HTTP backends and starts the service workers.
/// Must be called from within a tokio runtime.
pub fn launch(sink: Arc<dyn OverlaySink>) -> Result<ScreenService> {
    let config = CoreplyConfig::load()?;
    info!(
        enabled = config.suggest.enable,
        api = ?config.api.kind,
        model = %config.api.model,
        fim = config.api.is_fim(),
        debounce_ms = config.suggest.debounce_ms,
        request_timeout_ms = config.suggest.request_timeout_ms,
        cache_capacity = config.suggest.cache_capacity,
        apps = config.apps.selected.len(),
        presentation = ?config.ui.presentation,
        "loaded coreply config"
    );
    let backend = Arc::new(BackendRouter::new()?);
    let service = ScreenService::new(config, backend, sink);
    service.start();
    Ok(service)
}
