//! Generation service clients
//!
//! The session only sees [`GenerationService`]: a prompt goes in, an
//! [`OutputBundle`] or a [`ServiceError`] comes out. [`HttpGenerationClient`]
//! talks to a remote endpoint; [`OfflineGenerator`] builds bundles locally.

mod http;
mod offline;

pub(crate) use http::HttpGenerationClient;
pub(crate) use offline::OfflineGenerator;

use crate::config::Config;
use crate::error::ServiceError;
use crate::model::OutputBundle;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// External prompt → bundle collaborator
#[async_trait]
pub(crate) trait GenerationService: Send + Sync {
    /// Generate a bundle for `prompt`, one attempt, no retries
    async fn generate(&self, prompt: &str) -> Result<OutputBundle, ServiceError>;
}

/// Build the service selected by configuration
pub(crate) fn service_from_config(
    config: &Config,
    force_offline: bool,
) -> anyhow::Result<Arc<dyn GenerationService>> {
    match config.api_url() {
        Some(api_url) if !force_offline => {
            info!(api_url, "Using remote generation service");
            let client = HttpGenerationClient::new(api_url, config.request_timeout())?;
            Ok(Arc::new(client))
        }
        _ => {
            info!("Using offline generator");
            Ok(Arc::new(OfflineGenerator))
        }
    }
}
