mod chat;
mod fim;
mod hosted;

use anyhow::{Context, Result};
use async_trait::async_trait;
use coreply_core::TypingInfo;
use reqwest::Client;
use tracing::debug;

pub use chat::ChatBackend;
pub use fim::FimBackend;
pub use hosted::HostedBackend;

use crate::config::{ApiConfig, ApiKind};

/// Something that completes a draft given the conversation so far.
///
/// The returned text is either the continuation or the whole message; the
/// caller reconciles it with the draft.
#[async_trait]
pub trait SuggestionBackend: Send + Sync {
    async fn request_completion(&self, typing: &TypingInfo, api: &ApiConfig) -> Result<String>;
}

/// Picks a backend per request from the live API settings.
pub struct BackendRouter {
    chat: ChatBackend,
    fim: FimBackend,
    hosted: HostedBackend,
}

impl BackendRouter {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            chat: ChatBackend::new(client.clone()),
            fim: FimBackend::new(client.clone()),
            hosted: HostedBackend::new(client),
        })
    }
}

#[async_trait]
impl SuggestionBackend for BackendRouter {
    async fn request_completion(&self, typing: &TypingInfo, api: &ApiConfig) -> Result<String> {
        match (api.kind, api.is_fim()) {
            (ApiKind::Hosted, _) => {
                debug!("requesting hosted completion");
                self.hosted.request_completion(typing, api).await
            }
            (ApiKind::Custom, true) => {
                debug!(model = %api.model, "requesting fim completion");
                self.fim.request_completion(typing, api).await
            }
            (ApiKind::Custom, false) => {
                debug!(model = %api.model, "requesting chat completion");
                self.chat.request_completion(typing, api).await
            }
        }
    }
}
