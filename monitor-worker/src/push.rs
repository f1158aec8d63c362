//! In-process realtime channel.
//!
//! Reconciled builds and failure alerts are published as [`PushEvent`]s on a
//! `tokio::sync::broadcast` channel. Socket `subscribe` connections forward
//! the events addressed to their recipient. Publishing with nobody listening
//! is fine; a lagging subscriber loses the oldest events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use monitor_core::{BuildSnapshot, ObjectId};
use monitor_sync::{AlertLog, Broadcaster, DeliveryError, Notifier};

pub const PUSH_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushKind {
    BuildUpdated,
    BuildFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub recipient: ObjectId,
    pub event: PushKind,
    pub build: BuildSnapshot,
}

#[derive(Debug, Clone)]
pub struct PushChannel {
    sender: broadcast::Sender<PushEvent>,
}

impl PushChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: PushEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PushChannel {
    fn default() -> Self {
        Self::new(PUSH_CHANNEL_CAPACITY)
    }
}

/// [`Broadcaster`] publishing `build_updated` events.
#[derive(Debug, Clone)]
pub struct SocketBroadcaster {
    channel: PushChannel,
}

impl SocketBroadcaster {
    pub fn new(channel: PushChannel) -> Self {
        Self { channel }
    }
}

impl Broadcaster for SocketBroadcaster {
    fn push(&self, recipient: &ObjectId, build: &BuildSnapshot) -> Result<(), DeliveryError> {
        let delivered = self.channel.publish(PushEvent {
            recipient: recipient.clone(),
            event: PushKind::BuildUpdated,
            build: build.clone(),
        });
        tracing::debug!(build = %build.id, recipient = %recipient, delivered, "pushed build update");
        Ok(())
    }
}

/// [`Notifier`] that writes the alert log and, when a channel is attached,
/// forwards a `build_failed` event to the build's owner.
#[derive(Debug, Clone)]
pub struct RealtimeNotifier {
    alerts: AlertLog,
    channel: Option<PushChannel>,
}

impl RealtimeNotifier {
    pub fn new(alerts: AlertLog, channel: Option<PushChannel>) -> Self {
        Self { alerts, channel }
    }
}

impl Notifier for RealtimeNotifier {
    fn notify_build_failed(&self, build: &BuildSnapshot) -> Result<(), DeliveryError> {
        self.alerts.notify_build_failed(build)?;
        if let Some(channel) = &self.channel {
            channel.publish(PushEvent {
                recipient: build.user.object_id.clone(),
                event: PushKind::BuildFailed,
                build: build.clone(),
            });
        }
        Ok(())
    }
}
