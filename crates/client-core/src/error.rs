//! Error types for the client-core library
//!
//! Every fallible operation in this crate returns [`ClientResult`]. The
//! variants of [`ClientError`] fall into the categories reported by
//! [`ClientError::category`]:
//!
//! - **Validation** - rejected locally before anything reaches the gateway
//! - **Negotiation** - attaching a handle or producing an offer/answer failed
//! - **Backend** - the gateway plugin answered with an error payload
//! - **Fatal** - the session (or the room it serves) is gone; restart required
//! - **Internal** - misuse of the API or an unexpected internal state
//!
//! # Examples
//!
//! ```rust
//! use trac_janus_client_core::{ClientError, ErrorCategory};
//!
//! let err = ClientError::invalid_username("Input is not alphanumeric");
//! assert_eq!(err.category(), ErrorCategory::Validation);
//! assert_eq!(err.to_string(), "Input is not alphanumeric");
//!
//! let taken = ClientError::backend("Username 'alice' already taken", Some(476));
//! assert!(taken.is_name_taken());
//! ```

use thiserror::Error;

use crate::gateway::HandleId;

/// Result type for client-core operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Broad error classes used to decide how the application recovers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad local input; nothing was sent and no state changed
    Validation,
    /// Handle attach or offer/answer generation failed
    Negotiation,
    /// The plugin reported an error for a request
    Backend,
    /// Unrecoverable session failure
    Fatal,
    /// API misuse or unexpected state
    Internal,
}

/// Errors that can occur while coordinating a gateway session
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Username or display name failed local validation
    #[error("{reason}")]
    InvalidUsername { reason: String },

    /// Data channel payload or other local input was rejected
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// None of the candidate servers accepted a session
    #[error("No gateway server reachable ({attempted} tried): {last_error}")]
    NoServerAvailable { attempted: usize, last_error: String },

    /// A single server refused the session
    #[error("Failed to connect to {server}: {reason}")]
    ConnectFailed { server: String, reason: String },

    /// Attaching a plugin handle failed
    #[error("Error attaching plugin {plugin}: {reason}")]
    AttachFailed { plugin: String, reason: String },

    /// Offer or answer generation failed
    #[error("WebRTC error: {reason}")]
    NegotiationFailed { reason: String },

    /// The plugin answered with an error payload
    #[error("{message}")]
    Backend { message: String, code: Option<u32> },

    /// The requested room is not configured on the gateway
    #[error("Apparently room {room} does not exist")]
    RoomNotFound { room: u64 },

    /// The room was destroyed under us
    #[error("The room {room} has been destroyed")]
    RoomDestroyed { room: u64 },

    /// The session has been destroyed and cannot be reused
    #[error("Session has been destroyed")]
    SessionDestroyed,

    /// The session reported an unrecoverable error
    #[error("Session error: {reason}")]
    SessionFailed { reason: String },

    /// An operation needs a session that was never started
    #[error("Session not started")]
    NotStarted,

    /// State machine rejected an event or operation
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// Operation not allowed in the current call status
    #[error("Invalid call state: expected {expected}, found {actual}")]
    InvalidCallState { expected: String, actual: String },

    /// Every feed slot is occupied
    #[error("Feed registry is full ({capacity} slots in use)")]
    FeedRegistryFull { capacity: usize },

    /// The remote feed already occupies a slot
    #[error("Feed {feed} is already subscribed")]
    FeedAlreadySubscribed { feed: u64 },

    /// No handle with this id is known to the gateway
    #[error("Handle {handle} not found")]
    HandleNotFound { handle: HandleId },

    /// The handle was detached and can no longer be used
    #[error("Handle {handle} is detached")]
    HandleDetached { handle: HandleId },

    /// Configuration is invalid or could not be loaded
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Payload (de)serialization failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Network failure outside the gateway session (e.g. missed-call report)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    /// Create a username validation error
    pub fn invalid_username(reason: impl Into<String>) -> Self {
        Self::InvalidUsername { reason: reason.into() }
    }

    /// Create an invalid input error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput { reason: reason.into() }
    }

    /// Create a backend error from a plugin error payload
    pub fn backend(message: impl Into<String>, code: Option<u32>) -> Self {
        Self::Backend { message: message.into(), code }
    }

    /// Create a negotiation error
    pub fn negotiation(reason: impl Into<String>) -> Self {
        Self::NegotiationFailed { reason: reason.into() }
    }

    /// Create an attach error
    pub fn attach(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AttachFailed { plugin: plugin.into(), reason: reason.into() }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(from: impl std::fmt::Debug, event: impl std::fmt::Debug) -> Self {
        Self::InvalidTransition {
            from: format!("{:?}", from),
            event: format!("{:?}", event),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Classify the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidUsername { .. } | Self::InvalidInput { .. } => ErrorCategory::Validation,
            Self::ConnectFailed { .. }
            | Self::AttachFailed { .. }
            | Self::NegotiationFailed { .. }
            | Self::FeedRegistryFull { .. }
            | Self::FeedAlreadySubscribed { .. } => ErrorCategory::Negotiation,
            Self::Backend { .. } | Self::RoomNotFound { .. } => ErrorCategory::Backend,
            Self::NoServerAvailable { .. }
            | Self::RoomDestroyed { .. }
            | Self::SessionDestroyed
            | Self::SessionFailed { .. } => ErrorCategory::Fatal,
            Self::NotStarted
            | Self::InvalidTransition { .. }
            | Self::InvalidCallState { .. }
            | Self::HandleNotFound { .. }
            | Self::HandleDetached { .. }
            | Self::Configuration { .. }
            | Self::Serialization { .. }
            | Self::Network { .. }
            | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether the only recovery is a full session restart
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Fatal
    }

    /// Whether the backend refused a registration because the name is in use
    pub fn is_name_taken(&self) -> bool {
        matches!(self, Self::Backend { message, .. } if message.contains("already taken"))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization { message: err.to_string() }
    }
}

impl From<serde_yaml::Error> for ClientError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_follow_taxonomy() {
        assert_eq!(ClientError::invalid_username("x").category(), ErrorCategory::Validation);
        assert_eq!(ClientError::negotiation("no camera").category(), ErrorCategory::Negotiation);
        assert_eq!(ClientError::backend("oops", None).category(), ErrorCategory::Backend);
        assert_eq!(ClientError::RoomNotFound { room: 1 }.category(), ErrorCategory::Backend);
        assert!(ClientError::RoomDestroyed { room: 1 }.is_fatal());
        assert!(ClientError::SessionDestroyed.is_fatal());
        assert!(!ClientError::FeedRegistryFull { capacity: 5 }.is_fatal());
    }

    #[test]
    fn test_backend_message_is_verbatim() {
        let err = ClientError::backend("Username 'bob' already taken", Some(476));
        assert_eq!(err.to_string(), "Username 'bob' already taken");
        assert!(err.is_name_taken());
        assert!(!ClientError::backend("No such username", Some(478)).is_name_taken());
    }
}
