//! The session entity and its cache serialization contract.

use dialog_core::{Role, Turn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound on persisted history length; older turns are discarded
/// when a session is saved.
pub const MAX_HISTORY_TURNS: usize = 20;

/// The persisted state of one call.
///
/// Field names are part of the cache contract (`sessionId`, `userId`,
/// `history`, `metadata`); unknown fields are tolerated on read and the
/// legacy `variables` spelling is accepted for `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(
        default,
        alias = "variables",
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub metadata: HashMap<String, String>,
}

impl Session {
    /// A fresh session with empty history, as handed out on cache miss.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: String::new(),
            history: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Append a turn to the in-memory history. No I/O, never fails.
    pub fn push_turn(&mut self, role: Role, content: impl Into<String>) {
        self.history.push(Turn {
            role,
            content: content.into(),
        });
    }

    /// Drop the oldest turns so at most [`MAX_HISTORY_TURNS`] remain.
    /// Called on save, never on read.
    pub fn prune_history(&mut self) {
        if self.history.len() > MAX_HISTORY_TURNS {
            let excess = self.history.len() - MAX_HISTORY_TURNS;
            self.history.drain(..excess);
        }
    }
}
