//! Redis-backed persistence for sessions.

use crate::{Result, Session};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info};

/// How long a saved session survives without another write. Renewed on
/// every save; there is no separate touch path.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Keyed load/save of conversation state.
///
/// Implementations own nothing mutable: they hand out value copies and
/// serialize whatever they are given back.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session for `session_id`, or a fresh empty one when the
    /// cache has no entry. Only transport and decode failures are errors.
    async fn get_session(&self, session_id: &str) -> Result<Session>;

    /// Prune the session's history, serialize it and write it under
    /// `session:{id}`, resetting the TTL.
    async fn save_session(&self, session: &mut Session) -> Result<()>;
}

/// Production store over a shared Redis connection manager. Cloning is
/// cheap; all streams share one underlying pool.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    /// Connect to Redis at `addr`. Scheme-less `host:port` addresses are
    /// accepted and normalized.
    pub async fn connect(addr: &str) -> Result<Self> {
        let client = redis::Client::open(connection_url(addr))?;
        let conn = ConnectionManager::new(client).await?;
        info!(addr, "connected to session cache");
        Ok(Self { conn })
    }

    /// Round-trip a PING, for bootstrap and readiness checks.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get_session(&self, session_id: &str) -> Result<Session> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(session_key(session_id)).await?;

        match raw {
            None => {
                debug!(session_id, "no cached session, starting fresh");
                Ok(Session::new(session_id))
            }
            Some(raw) => Ok(serde_json::from_str(&raw)?),
        }
    }

    async fn save_session(&self, session: &mut Session) -> Result<()> {
        session.prune_history();
        let payload = serde_json::to_string(session)?;

        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(
                session_key(&session.session_id),
                payload,
                SESSION_TTL.as_secs(),
            )
            .await?;

        debug!(
            session_id = %session.session_id,
            turns = session.history.len(),
            "session saved"
        );
        Ok(())
    }
}

fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

/// The operator config may carry a bare `host:port` (the form the rest of
/// the platform uses); the redis client wants a URL.
fn connection_url(addr: &str) -> String {
    if addr.starts_with("redis://") || addr.starts_with("rediss://") || addr.starts_with("unix://")
    {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}
