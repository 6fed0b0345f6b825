//! gRPC service implementation.

use crate::grpc::orchestrator::StreamOrchestrator;
use dialog_llm::LlmClient;
use dialog_proto::dialog::v1::dialog_service_server::{DialogService, DialogServiceServer};
use dialog_proto::dialog::v1::{StreamConversationRequest, StreamConversationResponse};
use dialog_session::SessionStore;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::error;

const RESPONSE_CHANNEL_CAPACITY: usize = 32;

/// The `DialogService` RPC surface. Holds the shared store and LLM
/// client; everything per-call lives in the orchestrator.
pub struct DialogGrpcService {
    store: Arc<dyn SessionStore>,
    llm: Arc<dyn LlmClient>,
}

impl DialogGrpcService {
    pub fn new(store: Arc<dyn SessionStore>, llm: Arc<dyn LlmClient>) -> Self {
        Self { store, llm }
    }

    /// Wrap the service for registration with a tonic server.
    pub fn into_server(self) -> DialogServiceServer<Self> {
        DialogServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl DialogService for DialogGrpcService {
    type StreamConversationStream = ReceiverStream<Result<StreamConversationResponse, Status>>;

    async fn stream_conversation(
        &self,
        request: Request<Streaming<StreamConversationRequest>>,
    ) -> Result<Response<Self::StreamConversationStream>, Status> {
        let inbound = request.into_inner();
        let (tx, rx) = tokio::sync::mpsc::channel(RESPONSE_CHANNEL_CAPACITY);

        let orchestrator = StreamOrchestrator::new(self.store.clone(), self.llm.clone());
        tokio::spawn(async move {
            if let Err(status) = orchestrator.run(inbound, tx.clone()).await {
                error!(code = ?status.code(), "conversation stream failed");
                let _ = tx.send(Err(status)).await;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
