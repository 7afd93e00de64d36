//! Gateway session lifecycle
//!
//! A [`Session`] is created against an ordered list of candidate servers;
//! the first server that accepts wins. Once destroyed a session is never
//! reused: a restart builds a new one.

use std::fmt;
use std::sync::Arc;

use crate::error::{ClientError, ClientResult};
use crate::gateway::{GatewayEventSender, GatewaySession, SessionClient, SessionId};
use crate::handle::{Handle, HandleRole};

/// Lifecycle of a gateway session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SessionState {
    Connecting,
    Active,
    Destroyed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// One live session and the identity it was opened with
pub struct Session {
    inner: Arc<dyn GatewaySession>,
    server: String,
    opaque_id: String,
    state: SessionState,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id())
            .field("server", &self.server)
            .field("opaque_id", &self.opaque_id)
            .field("state", &self.state)
            .finish()
    }
}

impl Session {
    /// Open a session on the first server in `servers` that accepts one
    ///
    /// Servers are tried strictly in order. If all of them fail the error
    /// names the number of attempts and the last failure.
    pub async fn connect(
        client: &dyn SessionClient,
        servers: &[String],
        opaque_id: impl Into<String>,
        events: GatewayEventSender,
    ) -> ClientResult<Self> {
        let opaque_id = opaque_id.into();
        let mut last_error = String::from("no servers configured");

        for server in servers {
            tracing::debug!("Creating session on {}", server);
            match client.connect(server, events.clone()).await {
                Ok(inner) => {
                    tracing::info!("Session {} created on {} ({})", inner.id(), server, opaque_id);
                    return Ok(Self {
                        inner,
                        server: server.clone(),
                        opaque_id,
                        state: SessionState::Active,
                    });
                }
                Err(e) => {
                    tracing::warn!("Server {} refused session: {}", server, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(ClientError::NoServerAvailable { attempted: servers.len(), last_error })
    }

    pub fn id(&self) -> SessionId {
        self.inner.id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Server endpoint that accepted the session
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn opaque_id(&self) -> &str {
        &self.opaque_id
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Attach a new handle to `plugin` in the given role
    pub async fn attach(&self, plugin: &str, role: HandleRole) -> ClientResult<Handle> {
        if self.state != SessionState::Active {
            return Err(ClientError::SessionDestroyed);
        }
        let inner = self.inner.attach(plugin, &self.opaque_id).await?;
        tracing::info!("Plugin attached! ({}, id={}, role={})", inner.plugin(), inner.id(), role);
        Ok(Handle::new(inner, role))
    }

    /// Destroy the session. Safe to call repeatedly.
    pub async fn destroy(&mut self) -> ClientResult<()> {
        if self.state == SessionState::Destroyed {
            return Ok(());
        }
        self.state = SessionState::Destroyed;
        tracing::info!("Destroying session {}", self.id());
        self.inner.destroy().await
    }

    /// Record that the gateway destroyed the session on its own
    pub fn mark_destroyed(&mut self) {
        self.state = SessionState::Destroyed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::loopback::LoopbackGateway;
    use crate::gateway::VIDEOCALL_PLUGIN;
    use tokio::sync::mpsc;

    fn servers() -> Vec<String> {
        vec!["wss://localhost:8989".to_string(), "https://localhost:8089/janus".to_string()]
    }

    #[tokio::test]
    async fn test_first_reachable_server_wins() {
        let gateway = LoopbackGateway::new().with_unreachable("wss://localhost:8989");
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Session::connect(&gateway, &servers(), "videocalltest-abc", tx).await.unwrap();
        assert_eq!(session.server(), "https://localhost:8089/janus");
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_all_servers_unreachable() {
        let gateway = LoopbackGateway::new()
            .with_unreachable("wss://localhost:8989")
            .with_unreachable("https://localhost:8089/janus");
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = Session::connect(&gateway, &servers(), "x", tx).await.unwrap_err();
        assert!(matches!(err, ClientError::NoServerAvailable { attempted: 2, .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_destroyed_session_refuses_attach() {
        let gateway = LoopbackGateway::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = Session::connect(&gateway, &servers(), "x", tx).await.unwrap();
        let _handle = session.attach(VIDEOCALL_PLUGIN, HandleRole::Peer).await.unwrap();
        assert_eq!(gateway.attached_handles(), 1);

        session.destroy().await.unwrap();
        session.destroy().await.unwrap();
        assert_eq!(gateway.attached_handles(), 0);
        assert!(matches!(
            session.attach(VIDEOCALL_PLUGIN, HandleRole::Peer).await,
            Err(ClientError::SessionDestroyed)
        ));
    }
}
