//! gRPC module
//!
//! One orchestrator instance is spawned per inbound conversation stream.

pub mod orchestrator;
pub mod service;

pub use orchestrator::StreamOrchestrator;
pub use service::DialogGrpcService;
