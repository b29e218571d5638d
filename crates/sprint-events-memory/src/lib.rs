//! Membership notifications for a single process.
//!
//! Each group with at least one subscriber owns a broadcast channel. Groups
//! nobody listens to cost nothing: publishing to them is a lookup miss, and a
//! channel whose subscribers have all gone away is pruned on the next publish.
//! `GroupDeleted` is the last event a group emits, so delivering it closes the
//! group's channel and ends every open subscription.

use async_trait::async_trait;
use dashmap::DashMap;
use sprint_events::{EventBus, EventBusError, EventStream, MembershipEvent, MembershipEventKind};
use sprint_storage::GroupId;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Events a slow subscriber may fall behind by before it starts skipping.
const CHANNEL_CAPACITY: usize = 100;

#[derive(Default)]
pub struct MemoryEventBus {
    channels: DashMap<GroupId, broadcast::Sender<MembershipEvent>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups that currently hold a channel.
    pub fn active_groups(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(
        &self,
        group_id: &GroupId,
        event: MembershipEvent,
    ) -> Result<(), EventBusError> {
        let closes_group = matches!(event.kind, MembershipEventKind::GroupDeleted);

        // The map guard must be released before the entry can be removed.
        let delivered = match self.channels.get(group_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        };

        if closes_group {
            self.channels.remove(group_id);
        } else if !delivered {
            self.channels.remove_if(group_id, |_, tx| tx.receiver_count() == 0);
        }

        Ok(())
    }

    async fn subscribe(&self, group_id: &GroupId) -> Result<EventStream, EventBusError> {
        let rx = self
            .channels
            .entry(*group_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        // A lagging subscriber loses the overflow and keeps going.
        let stream = BroadcastStream::new(rx).filter_map(|result| result.ok());
        Ok(Box::pin(stream))
    }
}
