//! Publish/subscribe video rooms over the videoroom plugin
//!
//! The [`RoomCoordinator`] joins a room as a publisher, optionally publishes
//! our own feed, and subscribes to up to [`MAX_FEEDS`](crate::feeds::MAX_FEEDS)
//! remote feeds, each on its own subscriber handle and in its own slot.

mod coordinator;
mod messages;

#[cfg(test)]
mod tests;

pub use coordinator::{LocalParticipant, RoomCoordinator, OPAQUE_ID_PREFIX};
pub use messages::{ParticipantType, PublisherInfo, VideoRoomEvent, VideoRoomRequest, ERROR_NO_SUCH_ROOM};
