//! Dialog API layer
//!
//! One `StreamConversation` call is one phone call: this crate holds the
//! per-stream state machine that turns partial utterances into
//! sentence-granular responses, plus the sentence reframer it feeds LLM
//! tokens through.

pub mod error;
pub mod grpc;
pub mod sentence;

// Re-export commonly used types
pub use error::{ApiError, Result};
pub use grpc::{DialogGrpcService, StreamOrchestrator};
pub use sentence::SentenceBuffer;
