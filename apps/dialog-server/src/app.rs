use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use dialog_api::DialogGrpcService;
use dialog_core::AppConfig;
use dialog_llm::{ClientTlsMaterial, GatewayClient, LlmClient, MockLlmClient};
use dialog_session::RedisSessionStore;

use crate::tls::TlsMaterial;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: RedisSessionStore,
    pub llm: Arc<dyn LlmClient>,
}

impl AppState {
    /// Wire up all dependencies. Failures here are fatal: without the
    /// session cache or a usable LLM client there is nothing to serve.
    pub async fn new(config: AppConfig, tls: Option<&TlsMaterial>) -> Result<Self> {
        info!("initializing application components");

        let store = RedisSessionStore::connect(&config.redis_url)
            .await
            .context("Failed to connect to the session cache")?;
        store
            .ping()
            .await
            .context("Session cache did not answer PING")?;

        let llm: Arc<dyn LlmClient> = if config.mock_llm {
            info!("mock LLM mode active");
            Arc::new(MockLlmClient::new())
        } else {
            // Client-side mTLS needs the full material; cert+key without a
            // CA only secures the server surface.
            let mtls = tls.and_then(|material| {
                material.ca.as_ref().map(|ca| ClientTlsMaterial {
                    cert: material.cert.clone(),
                    key: material.key.clone(),
                    ca: ca.clone(),
                })
            });
            Arc::new(
                GatewayClient::connect(&config.llm_gateway_target, mtls)
                    .context("Failed to build the LLM gateway client")?,
            )
        };

        Ok(Self {
            config: Arc::new(config),
            store,
            llm,
        })
    }

    /// Readiness probe: the cache is the only dependency worth asking,
    /// the LLM channel is lazy by design.
    pub async fn health_check(&self) -> Result<()> {
        self.store.ping().await?;
        Ok(())
    }

    pub fn grpc_service(&self) -> DialogGrpcService {
        DialogGrpcService::new(Arc::new(self.store.clone()), self.llm.clone())
    }
}
