//! One-to-one video calls over the videocall plugin
//!
//! The [`DirectCallCoordinator`] drives a single session and a single peer
//! handle through registration, outgoing and incoming calls, and hangups.
//! Its progress is tracked by [`CallStatus`]:
//!
//! ```text
//! INITIAL ─start─► STARTED ─registered─► WAITING ─incomingcall─► INCOMING
//!                                           ▲  │                    │
//!                                           │  └─accepted (ours)─┐  accepted
//!                                           │                    ▼  ▼
//!                                           └──hangup / error── TAKING
//! ```
//!
//! Every inbound plugin event is checked against the transition table; an
//! event the table does not allow is logged and dropped.

mod coordinator;
mod messages;
mod status;


pub use coordinator::{DirectCallCoordinator, OPAQUE_ID_PREFIX};
pub use messages::{VideoCallEvent, VideoCallRequest};
pub use status::{CallStatus, CallTransition};
