//! # Trac Janus Client Core
//!
//! Session coordination for browser-style clients of a Janus WebRTC gateway.
//! This crate sits between a presentation layer and the gateway transport:
//! - **videocall**: one-to-one calls through the videocall plugin
//! - **videoroom**: publish/subscribe rooms through the videoroom plugin
//! - **gateway**: the transport seam, with an in-memory loopback backend
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trac_janus_client_core::{CallStatus, ClientConfig, ClientEvent, DirectCallCoordinator};
//! use trac_janus_client_core::gateway::loopback::LoopbackGateway;
//!
//! # tokio_test::block_on(async {
//! let gateway = Arc::new(LoopbackGateway::new());
//! let mut alice = DirectCallCoordinator::new(ClientConfig::default(), gateway.clone()).unwrap();
//! let mut events = alice.subscribe();
//!
//! alice.start().await.unwrap();
//! alice.register("alice").await.unwrap();
//! alice.process_pending().await;
//! assert_eq!(alice.status(), CallStatus::Waiting);
//!
//! while let Ok(event) = events.try_recv() {
//!     if let ClientEvent::Registered { username } = event {
//!         assert_eq!(username, "alice");
//!     }
//! }
//! alice.teardown().await;
//! # });
//! ```
//!
//! ## Architecture
//!
//! Each coordinator owns one gateway [`Session`] and the [`Handle`]s attached
//! to it. Gateway callbacks arrive on a single channel and are handled one at
//! a time, so coordinator state is never touched concurrently. Everything the
//! user should see is published as a [`ClientEvent`] on a broadcast channel.

pub mod config;
pub mod error;
pub mod events;
pub mod feeds;
pub mod gateway;
pub mod handle;
pub mod notify;
pub mod session;
pub mod timer;
pub mod validation;
pub mod videocall;
pub mod videoroom;

// Re-export main types
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, ErrorCategory};
pub use events::{ClientEvent, EventEmitter, EventPriority};
pub use feeds::{FeedId, FeedRegistry, FeedSlot, MAX_FEEDS};
pub use handle::{route_event, Handle, HandleListener, HandleRole, NegotiationState};
pub use notify::{
    HttpMissedCallReporter, LogNotifier, MissedCallReporter, NoopMissedCallReporter, NoopNotifier, Notification,
    Notifier,
};
pub use session::{Session, SessionState};
pub use timer::PeriodicTask;
pub use videocall::{CallStatus, CallTransition, DirectCallCoordinator};
pub use videoroom::{LocalParticipant, RoomCoordinator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
