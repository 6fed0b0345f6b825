//! LLM gateway client for dialog-service
//!
//! The orchestrator consumes generations as a lazy, finite, non-restartable
//! sequence of decoded text fragments. The real client opens a streaming
//! RPC against the gateway; the mock trickles scripted replies for tests
//! and offline runs.

pub mod gateway;
pub mod mock;

pub use gateway::{ClientTlsMaterial, GatewayClient};
pub use mock::MockLlmClient;

use async_trait::async_trait;
use dialog_core::Turn;
use thiserror::Error;
use tokio::sync::mpsc;

/// Result type for LLM client operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// A finite sequence of text fragments from one generation. Closed on
/// end-of-stream or on a mid-stream fault; dropping it cancels the
/// backing call.
pub type TokenStream = mpsc::Receiver<String>;

/// Errors raised while opening a generation. Mid-stream faults are not
/// errors: they terminate the token sequence instead.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("llm gateway transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("llm gateway call failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("invalid llm gateway target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },
}

/// Seam between the orchestrator and whatever produces tokens.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Open a generation for `prompt` against `history`. Open failures
    /// are returned synchronously so the caller may retry.
    async fn generate(
        &self,
        trace_id: &str,
        history: &[Turn],
        prompt: &str,
    ) -> Result<TokenStream>;
}
