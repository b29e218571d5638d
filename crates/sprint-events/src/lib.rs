//! Event bus abstraction for group membership notifications.
//!
//! `sprint-groups` publishes one [`MembershipEvent`] per committed change so
//! that other parts of the application (feeds, push notifications) can react
//! without polling the store. Implementations:
//! - Memory (single process, tokio broadcast channels)

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use sprint_storage::{GroupId, MemberId};
use std::pin::Pin;
use thiserror::Error;

/// What happened to a group or one of its membership records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MembershipEventKind {
    GroupCreated,
    Requested,
    Accepted,
    Rejected,
    Cancelled,
    Left,
    LeadershipTransferred { previous_leader: MemberId },
    GroupDeleted,
    GroupUpdated,
}

/// A committed membership change.
///
/// `member_id` is the member whose record changed; for group-level events it
/// is the acting leader, and for a transfer it is the new leader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub kind: MembershipEventKind,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Error type for event bus operations
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Stream of membership events
pub type EventStream = Pin<Box<dyn Stream<Item = MembershipEvent> + Send>>;

/// Event bus trait for publishing and subscribing to membership events of a group.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to all subscribers of `group_id`.
    ///
    /// Called after the change has been committed; delivery is best effort.
    async fn publish(&self, group_id: &GroupId, event: MembershipEvent)
        -> Result<(), EventBusError>;

    /// Subscribe to membership events for a group.
    ///
    /// The stream only yields events published after this call and continues
    /// until dropped.
    async fn subscribe(&self, group_id: &GroupId) -> Result<EventStream, EventBusError>;
}
