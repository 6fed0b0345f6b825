//! The per-stream conversation state machine.
//!
//! Inbound frames drive a turn-by-turn cycle: a `Config` frame binds the
//! stream to a session, `TextInput` fragments accumulate, and a final
//! `IsFinalInput(true)` triggers one generation. Responses go out as
//! whole sentences followed by exactly one end-of-turn marker, and the
//! session is persisted before the next frame is consumed.

use crate::error::ApiError;
use crate::sentence::SentenceBuffer;
use dialog_core::retry::RetryError;
use dialog_core::{with_exponential_backoff, Role, PROMPT_GREETING};
use dialog_llm::LlmClient;
use dialog_proto::dialog::v1::{
    stream_conversation_request::Payload as RequestPayload,
    stream_conversation_response::Payload as ResponsePayload, StreamConversationRequest,
    StreamConversationResponse,
};
use dialog_session::{Session, SessionStore};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Total connect attempts against the LLM gateway per turn; the backoff
/// between them is 1 s, 2 s, 4 s.
const LLM_MAX_ATTEMPTS: u32 = 4;

type ResponseSender = mpsc::Sender<Result<StreamConversationResponse, Status>>;

/// Owns one conversation stream from first frame to termination.
pub struct StreamOrchestrator {
    store: Arc<dyn SessionStore>,
    llm: Arc<dyn LlmClient>,
    trace_id: String,
}

impl StreamOrchestrator {
    pub fn new(store: Arc<dyn SessionStore>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            store,
            llm,
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    /// Drive the stream until the client goes away or a stream-fatal
    /// fault occurs. `inbound` is generic so tests can feed frames
    /// without a transport.
    pub async fn run<I>(self, inbound: I, outbound: ResponseSender) -> Result<(), Status>
    where
        I: Stream<Item = Result<StreamConversationRequest, Status>> + Unpin,
    {
        // Fires once the response channel's consumer is gone; interrupts
        // retry backoff and token waits mid-turn. The watcher holds a
        // sender clone, so it must not outlive the stream.
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let outbound = outbound.clone();
            let cancel = cancel.clone();
            async move {
                outbound.closed().await;
                cancel.cancel();
            }
        });

        let result = self.drive(inbound, &outbound, &cancel).await;
        watcher.abort();
        result
    }

    async fn drive<I>(
        &self,
        mut inbound: I,
        outbound: &ResponseSender,
        cancel: &CancellationToken,
    ) -> Result<(), Status>
    where
        I: Stream<Item = Result<StreamConversationRequest, Status>> + Unpin,
    {
        info!(trace_id = %self.trace_id, "conversation stream opened");

        let mut session: Option<Session> = None;
        let mut input_buffer = String::new();

        loop {
            let frame = match inbound.next().await {
                None => {
                    debug!(trace_id = %self.trace_id, "client closed the stream");
                    return Ok(());
                }
                Some(Err(status)) if status.code() == Code::Cancelled => {
                    debug!(trace_id = %self.trace_id, "client cancelled the stream");
                    return Ok(());
                }
                Some(Err(status)) => {
                    warn!(trace_id = %self.trace_id, error = %status, "stream receive failed");
                    return Err(status);
                }
                Some(Ok(frame)) => frame,
            };

            let Some(payload) = frame.payload else {
                continue;
            };

            match payload {
                RequestPayload::Config(config) => {
                    let mut loaded = match self.store.get_session(&config.session_id).await {
                        Ok(session) => session,
                        Err(err) => {
                            warn!(
                                trace_id = %self.trace_id,
                                session_id = %config.session_id,
                                error = %err,
                                "session load failed"
                            );
                            return Err(ApiError::SessionLoad(err).into());
                        }
                    };
                    loaded.user_id = config.user_id;
                    info!(
                        trace_id = %self.trace_id,
                        session_id = %loaded.session_id,
                        user_id = %loaded.user_id,
                        turns = loaded.history.len(),
                        "session loaded"
                    );

                    if loaded.history.is_empty() {
                        // Brand-new session: the assistant speaks first. A
                        // failed greeting is logged and the stream keeps
                        // listening; only a dead client ends it.
                        match self
                            .run_turn(&mut loaded, PROMPT_GREETING, outbound, cancel)
                            .await
                        {
                            Ok(()) => {}
                            Err(ApiError::ClientGone) => return Ok(()),
                            Err(err) => {
                                warn!(
                                    trace_id = %self.trace_id,
                                    error = %err,
                                    "proactive greeting failed"
                                );
                            }
                        }
                    }
                    session = Some(loaded);
                }

                RequestPayload::TextInput(text) => {
                    if session.is_none() {
                        return Err(ApiError::MissingConfig.into());
                    }
                    input_buffer.push_str(&text);
                }

                RequestPayload::IsFinalInput(is_final) => {
                    let Some(current) = session.as_mut() else {
                        return Err(ApiError::MissingConfig.into());
                    };
                    if !is_final {
                        continue;
                    }
                    let user_text = input_buffer.trim().to_string();
                    if user_text.is_empty() {
                        continue;
                    }
                    input_buffer.clear();

                    info!(trace_id = %self.trace_id, input = %user_text, "user input complete");
                    current.push_turn(Role::User, user_text.clone());

                    match self.run_turn(current, &user_text, outbound, cancel).await {
                        Ok(()) => {}
                        Err(ApiError::ClientGone) => return Ok(()),
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }
    }

    /// One generation: open the LLM stream (with retries), forward
    /// sentences, mark the end of turn, persist the session.
    async fn run_turn(
        &self,
        session: &mut Session,
        prompt: &str,
        outbound: &ResponseSender,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError> {
        let mut tokens = match with_exponential_backoff(cancel.clone(), LLM_MAX_ATTEMPTS, || {
            self.llm.generate(&self.trace_id, &session.history, prompt)
        })
        .await
        {
            Ok(tokens) => tokens,
            Err(RetryError::Cancelled) => return Err(ApiError::ClientGone),
            Err(RetryError::Exhausted { attempts, source }) => {
                return Err(ApiError::LlmUnavailable(format!(
                    "{source} (after {attempts} attempts)"
                )));
            }
        };

        let mut sentences = SentenceBuffer::new();
        let mut full_response = String::new();

        loop {
            let token = tokio::select! {
                token = tokens.recv() => token,
                _ = cancel.cancelled() => return Err(ApiError::ClientGone),
            };
            let Some(token) = token else {
                break;
            };

            full_response.push_str(&token);
            if let Some(sentence) = sentences.push(&token) {
                self.send_sentence(outbound, sentence).await?;
            }
        }
        if let Some(sentence) = sentences.flush() {
            self.send_sentence(outbound, sentence).await?;
        }

        self.send(outbound, ResponsePayload::IsFinalResponse(true))
            .await?;

        session.push_turn(Role::Assistant, full_response.trim().to_string());
        if let Err(err) = self.store.save_session(session).await {
            // Best effort: the next turn's save will carry this one too.
            warn!(
                trace_id = %self.trace_id,
                session_id = %session.session_id,
                error = %err,
                "session save failed"
            );
        }
        Ok(())
    }

    async fn send_sentence(
        &self,
        outbound: &ResponseSender,
        sentence: String,
    ) -> Result<(), ApiError> {
        // Trailing space lets the consumer concatenate sentences directly.
        self.send(outbound, ResponsePayload::TextResponse(format!("{sentence} ")))
            .await
    }

    async fn send(&self, outbound: &ResponseSender, payload: ResponsePayload) -> Result<(), ApiError> {
        outbound
            .send(Ok(StreamConversationResponse {
                payload: Some(payload),
            }))
            .await
            .map_err(|_| ApiError::ClientGone)
    }
}
