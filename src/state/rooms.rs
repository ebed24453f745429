use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::dto::events::ServerEvent;

/// Room receiving the viewer-facing events of one quiz.
pub fn quiz_room(quiz_id: Uuid) -> String {
    format!("quiz:{quiz_id}")
}

/// Room receiving the privileged observer events of one quiz.
pub fn admin_room(quiz_id: Uuid) -> String {
    format!("admin:{quiz_id}")
}

#[derive(Debug, Clone)]
/// Payload carried across a room channel.
pub enum RoomEvent {
    /// A broadcast event for every member of the room.
    Message(ServerEvent),
    /// Control signal telling members to tear down their connection.
    Disconnect,
}

/// Room-based fanout hub over per-room broadcast channels.
///
/// Delivery is best-effort under load: a subscriber that lags behind the
/// channel capacity skips ahead, which is the backpressure the throttled
/// fanout design expects. Membership is counted server-side so the
/// viewer-count push can read it without tracking connections elsewhere.
#[derive(Clone)]
pub struct RoomHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    rooms: DashMap<String, RoomChannel>,
    capacity: usize,
}

struct RoomChannel {
    sender: broadcast::Sender<RoomEvent>,
    members: usize,
}

impl RoomHub {
    /// Create a hub whose room channels buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                rooms: DashMap::new(),
                capacity,
            }),
        }
    }

    /// Join a room, creating its channel on first subscription.
    ///
    /// The returned subscription leaves the room when dropped.
    pub fn subscribe(&self, room: &str) -> RoomSubscription {
        let receiver = {
            let mut channel = self
                .inner
                .rooms
                .entry(room.to_string())
                .or_insert_with(|| {
                    let (sender, _receiver) = broadcast::channel(self.inner.capacity);
                    RoomChannel { sender, members: 0 }
                });
            channel.members += 1;
            channel.sender.subscribe()
        };

        RoomSubscription {
            receiver,
            hub: self.clone(),
            room: room.to_string(),
        }
    }

    /// Send an event to every member of the room; a room nobody has joined
    /// is silently skipped.
    pub fn publish(&self, room: &str, event: ServerEvent) {
        if let Some(channel) = self.inner.rooms.get(room) {
            let _ = channel.sender.send(RoomEvent::Message(event));
        }
    }

    /// Number of current members of the room.
    pub fn member_count(&self, room: &str) -> usize {
        self.inner
            .rooms
            .get(room)
            .map(|channel| channel.members)
            .unwrap_or(0)
    }

    /// Force every member out of the room and forget its channel.
    pub fn disconnect_room(&self, room: &str) {
        if let Some((_key, channel)) = self.inner.rooms.remove(room) {
            let _ = channel.sender.send(RoomEvent::Disconnect);
        }
    }
}

/// Membership handle of one room subscriber.
pub struct RoomSubscription {
    receiver: broadcast::Receiver<RoomEvent>,
    hub: RoomHub,
    room: String,
}

impl RoomSubscription {
    /// Receive the next event published to the room.
    pub async fn recv(&mut self) -> Result<RoomEvent, RecvError> {
        self.receiver.recv().await
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        if let Some(mut channel) = self.hub.inner.rooms.get_mut(&self.room) {
            channel.members = channel.members.saturating_sub(1);
        }
        self.hub
            .inner
            .rooms
            .remove_if(&self.room, |_key, channel| channel.members == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> ServerEvent {
        ServerEvent::new(None, data.to_string())
    }

    #[tokio::test]
    async fn membership_is_counted_per_room() {
        let hub = RoomHub::new(8);
        let room = quiz_room(Uuid::new_v4());

        let first = hub.subscribe(&room);
        let second = hub.subscribe(&room);
        assert_eq!(hub.member_count(&room), 2);

        drop(first);
        assert_eq!(hub.member_count(&room), 1);

        drop(second);
        assert_eq!(hub.member_count(&room), 0);
    }

    #[tokio::test]
    async fn publish_reaches_all_members() {
        let hub = RoomHub::new(8);
        let room = quiz_room(Uuid::new_v4());
        let mut first = hub.subscribe(&room);
        let mut second = hub.subscribe(&room);

        hub.publish(&room, event("hello"));

        for subscription in [&mut first, &mut second] {
            match subscription.recv().await.unwrap() {
                RoomEvent::Message(payload) => assert_eq!(payload.data, "hello"),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn publish_to_empty_room_is_a_noop() {
        let hub = RoomHub::new(8);
        hub.publish(&quiz_room(Uuid::new_v4()), event("nobody"));
    }

    #[tokio::test]
    async fn disconnect_tears_the_room_down() {
        let hub = RoomHub::new(8);
        let room = quiz_room(Uuid::new_v4());
        let mut subscription = hub.subscribe(&room);

        hub.disconnect_room(&room);

        assert!(matches!(
            subscription.recv().await.unwrap(),
            RoomEvent::Disconnect
        ));
        assert_eq!(hub.member_count(&room), 0);
    }
}
