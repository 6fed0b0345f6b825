//! Scripted gateway stand-in for tests and `MOCK_LLM` runs.

use crate::{LlmClient, Result, TokenStream};
use async_trait::async_trait;
use dialog_core::Turn;
use std::time::Duration;
use tokio::sync::mpsc;
use tonic::Status;

const TOKEN_CHANNEL_CAPACITY: usize = 32;

enum MockReply {
    Echo,
    Fixed(String),
    FailOpen,
}

/// Mock LLM client. Replies are trickled character by character so the
/// downstream sentence handling sees realistic sub-word granularity.
pub struct MockLlmClient {
    reply: MockReply,
    char_delay: Duration,
}

impl MockLlmClient {
    /// Offline development mode: acknowledge every prompt with a canned
    /// echo, one character every 20 ms.
    pub fn new() -> Self {
        Self {
            reply: MockReply::Echo,
            char_delay: Duration::from_millis(20),
        }
    }

    /// Always reply with `text`, with no artificial delay.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            reply: MockReply::Fixed(text.into()),
            char_delay: Duration::ZERO,
        }
    }

    /// Fail every open attempt, as an unreachable backend would.
    pub fn failing() -> Self {
        Self {
            reply: MockReply::FailOpen,
            char_delay: Duration::ZERO,
        }
    }

    pub fn with_char_delay(mut self, delay: Duration) -> Self {
        self.char_delay = delay;
        self
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(
        &self,
        _trace_id: &str,
        _history: &[Turn],
        prompt: &str,
    ) -> Result<TokenStream> {
        let text = match &self.reply {
            MockReply::FailOpen => {
                return Err(Status::unavailable("mock llm is configured to fail").into());
            }
            MockReply::Echo => format!("MOCK: you said '{prompt}'."),
            MockReply::Fixed(text) => text.clone(),
        };

        let delay = self.char_delay;
        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            for ch in text.chars() {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(ch.to_string()).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}
