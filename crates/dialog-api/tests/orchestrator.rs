//! Conversation stream scenarios, driven end to end against an in-memory
//! session store and a scripted LLM client.

use async_trait::async_trait;
use dialog_api::StreamOrchestrator;
use dialog_core::{Role, Turn};
use dialog_llm::{LlmClient, MockLlmClient};
use dialog_proto::dialog::v1::{
    stream_conversation_request::Payload as RequestPayload,
    stream_conversation_response::Payload as ResponsePayload, ConversationConfig,
    StreamConversationRequest, StreamConversationResponse,
};
use dialog_session::{Session, SessionStore, StoreError, MAX_HISTORY_TURNS};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Code, Status};

/// In-memory stand-in for the Redis store. Entries hold the serialized
/// payload so save/get exercise the real cache contract.
#[derive(Default)]
struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    gets: AtomicUsize,
}

impl MemoryStore {
    fn with_session(session: &Session) -> Self {
        let store = Self::default();
        store.entries.lock().unwrap().insert(
            session.session_id.clone(),
            serde_json::to_string(session).unwrap(),
        );
        store
    }

    fn session(&self, session_id: &str) -> Option<Session> {
        self.entries
            .lock()
            .unwrap()
            .get(session_id)
            .map(|raw| serde_json::from_str(raw).unwrap())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_session(&self, session_id: &str) -> Result<Session, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .session(session_id)
            .unwrap_or_else(|| Session::new(session_id)))
    }

    async fn save_session(&self, session: &mut Session) -> Result<(), StoreError> {
        session.prune_history();
        self.entries.lock().unwrap().insert(
            session.session_id.clone(),
            serde_json::to_string(session)?,
        );
        Ok(())
    }
}

struct StreamHandle {
    requests: mpsc::Sender<Result<StreamConversationRequest, Status>>,
    responses: mpsc::Receiver<Result<StreamConversationResponse, Status>>,
    task: JoinHandle<Result<(), Status>>,
}

fn spawn_stream(store: Arc<MemoryStore>, llm: Arc<dyn LlmClient>) -> StreamHandle {
    let (req_tx, req_rx) = mpsc::channel(16);
    let (resp_tx, resp_rx) = mpsc::channel(16);
    let orchestrator = StreamOrchestrator::new(store, llm);
    let task = tokio::spawn(orchestrator.run(ReceiverStream::new(req_rx), resp_tx));
    StreamHandle {
        requests: req_tx,
        responses: resp_rx,
        task,
    }
}

fn config(session_id: &str, user_id: &str) -> Result<StreamConversationRequest, Status> {
    Ok(StreamConversationRequest {
        payload: Some(RequestPayload::Config(ConversationConfig {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
        })),
    })
}

fn text(input: &str) -> Result<StreamConversationRequest, Status> {
    Ok(StreamConversationRequest {
        payload: Some(RequestPayload::TextInput(input.to_string())),
    })
}

fn final_input(flag: bool) -> Result<StreamConversationRequest, Status> {
    Ok(StreamConversationRequest {
        payload: Some(RequestPayload::IsFinalInput(flag)),
    })
}

/// Read response frames until the end-of-turn marker; returns the
/// sentences and asserts the marker terminates the turn.
async fn collect_turn(
    responses: &mut mpsc::Receiver<Result<StreamConversationResponse, Status>>,
) -> Vec<String> {
    let mut sentences = Vec::new();
    loop {
        let frame = responses
            .recv()
            .await
            .expect("stream ended before the turn completed")
            .expect("turn failed");
        match frame.payload.expect("frame without payload") {
            ResponsePayload::TextResponse(text) => sentences.push(text),
            ResponsePayload::IsFinalResponse(flag) => {
                assert!(flag, "end-of-turn marker must be true");
                return sentences;
            }
        }
    }
}

fn seeded_session(session_id: &str) -> Session {
    let mut session = Session::new(session_id);
    session.user_id = "U".into();
    session.push_turn(Role::Assistant, "Merhaba.");
    session
}

#[tokio::test]
async fn test_proactive_greeting_on_empty_history() {
    let store = Arc::new(MemoryStore::default());
    let llm = Arc::new(MockLlmClient::fixed("Merhaba. Nasıl yardımcı olabilirim?"));
    let mut stream = spawn_stream(store.clone(), llm);

    stream.requests.send(config("S1", "U")).await.unwrap();

    let sentences = collect_turn(&mut stream.responses).await;
    assert_eq!(
        sentences,
        vec!["Merhaba. ".to_string(), "Nasıl yardımcı olabilirim? ".to_string()]
    );

    drop(stream.requests);
    stream.task.await.unwrap().unwrap();

    let session = store.session("S1").expect("greeting turn must be saved");
    assert_eq!(session.user_id, "U");
    assert_eq!(
        session.history,
        vec![Turn::assistant("Merhaba. Nasıl yardımcı olabilirim?")]
    );
}

#[tokio::test]
async fn test_single_round_trip() {
    let store = Arc::new(MemoryStore::with_session(&seeded_session("S2")));
    let llm = Arc::new(MockLlmClient::fixed("Bilmiyorum."));
    let mut stream = spawn_stream(store.clone(), llm);

    stream.requests.send(config("S2", "U")).await.unwrap();
    stream.requests.send(text("Hava ")).await.unwrap();
    stream.requests.send(text("nasıl?")).await.unwrap();
    stream.requests.send(final_input(true)).await.unwrap();

    let sentences = collect_turn(&mut stream.responses).await;
    assert_eq!(sentences, vec!["Bilmiyorum. ".to_string()]);

    drop(stream.requests);
    stream.task.await.unwrap().unwrap();

    let session = store.session("S2").unwrap();
    assert_eq!(session.history.len(), 3);
    assert_eq!(session.history[1], Turn::user("Hava nasıl?"));
    assert_eq!(session.history[2], Turn::assistant("Bilmiyorum."));
}

#[tokio::test]
async fn test_save_prunes_full_history() {
    let mut seeded = Session::new("S3");
    seeded.user_id = "U".into();
    for i in 0..MAX_HISTORY_TURNS {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        seeded.push_turn(role, format!("turn {i}"));
    }
    let store = Arc::new(MemoryStore::with_session(&seeded));
    let llm = Arc::new(MockLlmClient::fixed("Tamam."));
    let mut stream = spawn_stream(store.clone(), llm);

    stream.requests.send(config("S3", "U")).await.unwrap();
    stream.requests.send(text("devam")).await.unwrap();
    stream.requests.send(final_input(true)).await.unwrap();

    collect_turn(&mut stream.responses).await;
    drop(stream.requests);
    stream.task.await.unwrap().unwrap();

    let session = store.session("S3").unwrap();
    assert_eq!(session.history.len(), MAX_HISTORY_TURNS);
    // The user+assistant pair pushed the two oldest turns out.
    assert_eq!(session.history[0].content, "turn 2");
    assert_eq!(session.history.last().unwrap(), &Turn::assistant("Tamam."));
}

#[tokio::test(start_paused = true)]
async fn test_llm_retries_exhausted_ends_stream_unavailable() {
    let store = Arc::new(MemoryStore::with_session(&seeded_session("S4")));
    let llm = Arc::new(MockLlmClient::failing());
    let mut stream = spawn_stream(store.clone(), llm);

    let started = tokio::time::Instant::now();
    stream.requests.send(config("S4", "U")).await.unwrap();
    stream.requests.send(text("selam")).await.unwrap();
    stream.requests.send(final_input(true)).await.unwrap();

    let status = stream.task.await.unwrap().unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
    // Four attempts with 1 s, 2 s, 4 s between them.
    assert_eq!(started.elapsed(), Duration::from_secs(7));

    assert!(stream.responses.recv().await.is_none());
    // The failed turn was never persisted.
    assert_eq!(store.session("S4").unwrap().history.len(), 1);
}

#[tokio::test]
async fn test_non_config_first_frame_fails_precondition() {
    let store = Arc::new(MemoryStore::default());
    let llm = Arc::new(MockLlmClient::fixed("ignored"));
    let stream = spawn_stream(store.clone(), llm);

    stream.requests.send(text("hi")).await.unwrap();

    let status = stream.task.await.unwrap().unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
    // No session was ever loaded.
    assert_eq!(store.gets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_client_disconnect_mid_generation_is_clean() {
    let store = Arc::new(MemoryStore::default());
    let llm = Arc::new(
        MockLlmClient::fixed("Birinci cümle. İkinci cümle. Üçüncü cümle.")
            .with_char_delay(Duration::from_millis(20)),
    );
    let mut stream = spawn_stream(store.clone(), llm);

    stream.requests.send(config("S6", "U")).await.unwrap();

    // Take one sentence, then walk away mid-turn.
    let first = stream.responses.recv().await.unwrap().unwrap();
    assert!(matches!(
        first.payload,
        Some(ResponsePayload::TextResponse(_))
    ));
    drop(stream.responses);

    let result = stream.task.await.unwrap();
    assert!(result.is_ok(), "client disconnect must not be an error");
    // The partial turn was not persisted.
    assert!(store.session("S6").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_greeting_failure_keeps_stream_alive() {
    let store = Arc::new(MemoryStore::default());
    let llm = Arc::new(MockLlmClient::failing());
    let mut stream = spawn_stream(store.clone(), llm);

    stream.requests.send(config("S7", "U")).await.unwrap();
    // The greeting burns its retries and is swallowed; the stream must
    // still accept frames afterwards.
    stream.requests.send(final_input(false)).await.unwrap();
    drop(stream.requests);

    stream.task.await.unwrap().unwrap();
    assert!(stream.responses.recv().await.is_none());
}

#[tokio::test]
async fn test_empty_generation_still_ends_turn() {
    let store = Arc::new(MemoryStore::with_session(&seeded_session("S8")));
    let llm = Arc::new(MockLlmClient::fixed(""));
    let mut stream = spawn_stream(store.clone(), llm);

    stream.requests.send(config("S8", "U")).await.unwrap();
    stream.requests.send(text("merhaba")).await.unwrap();
    stream.requests.send(final_input(true)).await.unwrap();

    let sentences = collect_turn(&mut stream.responses).await;
    assert!(sentences.is_empty());

    drop(stream.requests);
    stream.task.await.unwrap().unwrap();

    let session = store.session("S8").unwrap();
    assert_eq!(session.history.last().unwrap(), &Turn::assistant(""));
}

#[tokio::test]
async fn test_final_input_noops() {
    let store = Arc::new(MemoryStore::with_session(&seeded_session("S9")));
    // A triggered turn would fail loudly; none of these frames may
    // trigger one.
    let llm = Arc::new(MockLlmClient::failing());
    let mut stream = spawn_stream(store.clone(), llm);

    stream.requests.send(config("S9", "U")).await.unwrap();
    stream.requests.send(final_input(false)).await.unwrap();
    stream.requests.send(final_input(false)).await.unwrap();
    stream.requests.send(final_input(true)).await.unwrap();
    stream.requests.send(final_input(true)).await.unwrap();
    drop(stream.requests);

    stream.task.await.unwrap().unwrap();
    assert!(stream.responses.recv().await.is_none());
    assert_eq!(store.session("S9").unwrap().history.len(), 1);
}

#[tokio::test]
async fn test_turns_are_processed_serially_in_order() {
    let store = Arc::new(MemoryStore::with_session(&seeded_session("S10")));
    let llm = Arc::new(MockLlmClient::fixed("Tamam."));
    let mut stream = spawn_stream(store.clone(), llm);

    stream.requests.send(config("S10", "U")).await.unwrap();
    stream.requests.send(text("bir")).await.unwrap();
    stream.requests.send(final_input(true)).await.unwrap();
    stream.requests.send(text("iki")).await.unwrap();
    stream.requests.send(final_input(true)).await.unwrap();

    assert_eq!(
        collect_turn(&mut stream.responses).await,
        vec!["Tamam. ".to_string()]
    );
    assert_eq!(
        collect_turn(&mut stream.responses).await,
        vec!["Tamam. ".to_string()]
    );

    drop(stream.requests);
    stream.task.await.unwrap().unwrap();

    let session = store.session("S10").unwrap();
    let contents: Vec<&str> = session
        .history
        .iter()
        .map(|turn| turn.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec!["Merhaba.", "bir", "Tamam.", "iki", "Tamam."]
    );
}
