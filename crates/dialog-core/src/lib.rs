//! Core building blocks for dialog-service
//!
//! This crate provides the pieces every other workspace member leans on:
//! - Environment-driven configuration
//! - Conversation turn types shared between the session store and the
//!   LLM client
//! - A cancellable exponential-backoff retry helper

pub mod config;
pub mod retry;
pub mod types;

pub use crate::config::AppConfig;
pub use crate::retry::{with_exponential_backoff, RetryError};
pub use crate::types::{Role, Turn, DEFAULT_TENANT_ID, PROMPT_GREETING};
