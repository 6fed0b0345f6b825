//! Streaming client for the LLM gateway service.

use crate::{LlmClient, LlmError, Result, TokenStream};
use async_trait::async_trait;
use dialog_core::{Turn, DEFAULT_TENANT_ID};
use dialog_proto::llm::v1::{
    llm_gateway_service_client::LlmGatewayServiceClient, ConversationTurn,
    GenerateDialogStreamRequest, GenerateStreamRequest, GenerationParams,
};
use tokio::sync::mpsc;
use tonic::metadata::MetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tracing::{debug, info, warn};

const TOKEN_CHANNEL_CAPACITY: usize = 32;

const DEFAULT_MAX_NEW_TOKENS: i32 = 256;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// PEM material for mutual TLS towards the gateway.
pub struct ClientTlsMaterial {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub ca: Vec<u8>,
}

/// Client for the gateway's `GenerateDialogStream` RPC. The channel is
/// lazy: connect errors surface on the first call, where the retry
/// wrapper can deal with them.
pub struct GatewayClient {
    channel: Channel,
}

impl GatewayClient {
    /// Build a client for `target`. With full TLS material the connection
    /// is mutual TLS; otherwise plaintext, which is only acceptable in
    /// development.
    pub fn connect(target: &str, tls: Option<ClientTlsMaterial>) -> Result<Self> {
        let uri = match tls {
            Some(_) => format!("https://{}", host_port(target)),
            None => format!("http://{}", host_port(target)),
        };

        let mut endpoint =
            Endpoint::from_shared(uri).map_err(|err| LlmError::InvalidTarget {
                target: target.to_string(),
                reason: err.to_string(),
            })?;

        match tls {
            Some(material) => {
                let authority = authority_from_target(target);
                let tls_config = ClientTlsConfig::new()
                    .identity(Identity::from_pem(material.cert, material.key))
                    .ca_certificate(Certificate::from_pem(material.ca))
                    .domain_name(authority);
                endpoint = endpoint.tls_config(tls_config)?;
                info!(target, "llm gateway client using mTLS");
            }
            None => {
                warn!(target, "llm gateway client running without TLS");
            }
        }

        Ok(Self {
            channel: endpoint.connect_lazy(),
        })
    }
}

#[async_trait]
impl LlmClient for GatewayClient {
    async fn generate(
        &self,
        trace_id: &str,
        history: &[Turn],
        prompt: &str,
    ) -> Result<TokenStream> {
        let body = GenerateDialogStreamRequest {
            model_selector: "local".to_string(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            llama_request: Some(GenerateStreamRequest {
                user_prompt: prompt.to_string(),
                history: history.iter().map(proto_turn).collect(),
                params: Some(GenerationParams {
                    max_new_tokens: Some(DEFAULT_MAX_NEW_TOKENS),
                    temperature: Some(DEFAULT_TEMPERATURE),
                }),
            }),
        };

        let mut request = tonic::Request::new(body);
        match MetadataValue::try_from(trace_id) {
            Ok(value) => {
                request.metadata_mut().insert("x-trace-id", value);
            }
            Err(_) => debug!(trace_id, "trace id is not a valid header value, skipping"),
        }

        let mut client = LlmGatewayServiceClient::new(self.channel.clone());
        let mut stream = client.generate_dialog_stream(request).await?.into_inner();

        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        let trace = trace_id.to_string();
        tokio::spawn(async move {
            loop {
                match stream.message().await {
                    Ok(Some(frame)) => {
                        let Some(inner) = frame.llama_response else {
                            continue;
                        };
                        if inner.token.is_empty() {
                            continue;
                        }
                        let text = String::from_utf8_lossy(&inner.token).into_owned();
                        if tx.send(text).await.is_err() {
                            debug!(trace_id = %trace, "token consumer gone, dropping stream");
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(status) => {
                        warn!(trace_id = %trace, error = %status, "llm stream error");
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

fn proto_turn(turn: &Turn) -> ConversationTurn {
    ConversationTurn {
        role: turn.role.as_str().to_string(),
        content: turn.content.clone(),
    }
}

/// Operator configs sometimes carry a scheme on the gateway target; the
/// endpoint URI wants a bare `host:port`.
fn host_port(target: &str) -> &str {
    target
        .strip_prefix("https://")
        .or_else(|| target.strip_prefix("http://"))
        .unwrap_or(target)
}

/// SNI / authority for TLS: the host portion of the target.
fn authority_from_target(target: &str) -> String {
    let host_port = host_port(target);
    host_port
        .split(':')
        .next()
        .unwrap_or(host_port)
        .to_string()
}
