//! Per-deployment event fan-out
//!
//! Each deployment has a room: a broadcast channel plus a bounded buffer of
//! events published before the first subscriber joined. Delivery is only
//! guaranteed to consumers that join; the buffer keeps the opening log lines
//! from being lost to a client that connects a moment after accepting.

use std::collections::HashMap;
use tfpilot_core::DeployEvent;
use tokio::sync::{broadcast, Mutex};

const CHANNEL_CAPACITY: usize = 256;
const BUFFER_LIMIT: usize = 2048;

struct Room {
    sender: broadcast::Sender<DeployEvent>,
    buffer: Vec<DeployEvent>,
    joined: bool,
    done: bool,
}

impl Room {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            buffer: Vec::new(),
            joined: false,
            done: false,
        }
    }
}

/// Subscription handle: buffered events, then (unless the deployment already
/// finished) a live receiver.
pub struct Subscription {
    pub replay: Vec<DeployEvent>,
    pub live: Option<broadcast::Receiver<DeployEvent>>,
}

#[derive(Default)]
pub struct EventHub {
    rooms: Mutex<HashMap<String, Room>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a room exists before the deployment task starts publishing.
    pub async fn open(&self, deployment_id: &str) {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(deployment_id.to_string())
            .or_insert_with(Room::new);
    }

    pub async fn publish(&self, event: DeployEvent) {
        let mut rooms = self.rooms.lock().await;
        let id = event.deployment_id().to_string();
        let room = rooms.entry(id.clone()).or_insert_with(Room::new);
        let terminal = event.is_terminal();

        if room.joined {
            // A send error only means no receiver is currently connected.
            let _ = room.sender.send(event);
        } else if room.buffer.len() < BUFFER_LIMIT {
            room.buffer.push(event);
        } else {
            log::warn!("[{}] event buffer full, dropping event", id);
        }

        if terminal {
            room.done = true;
            if room.joined {
                rooms.remove(&id);
            }
        }
    }

    /// Join a deployment's stream. Returns None for unknown identifiers.
    pub async fn subscribe(&self, deployment_id: &str) -> Option<Subscription> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.get_mut(deployment_id)?;
        room.joined = true;
        let replay = std::mem::take(&mut room.buffer);
        if room.done {
            rooms.remove(deployment_id);
            return Some(Subscription { replay, live: None });
        }
        let live = Some(room.sender.subscribe());
        Some(Subscription { replay, live })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_published_before_join_are_replayed() {
        let hub = EventHub::new();
        hub.open("dep-1").await;
        hub.publish(DeployEvent::log("dep-1", "first")).await;
        hub.publish(DeployEvent::log("dep-1", "second")).await;

        let sub = hub.subscribe("dep-1").await.unwrap();
        assert_eq!(sub.replay.len(), 2);
        assert!(sub.live.is_some());
    }

    #[tokio::test]
    async fn test_events_after_join_are_live() {
        let hub = EventHub::new();
        hub.open("dep-1").await;
        let mut sub = hub.subscribe("dep-1").await.unwrap();
        assert!(sub.replay.is_empty());

        hub.publish(DeployEvent::log("dep-1", "live line")).await;
        let event = sub.live.as_mut().unwrap().recv().await.unwrap();
        assert_eq!(event, DeployEvent::log("dep-1", "live line"));
    }

    #[tokio::test]
    async fn test_finished_room_replays_then_ends() {
        let hub = EventHub::new();
        hub.open("dep-1").await;
        hub.publish(DeployEvent::log("dep-1", "line")).await;
        hub.publish(DeployEvent::complete("dep-1", true, "done")).await;

        let sub = hub.subscribe("dep-1").await.unwrap();
        assert_eq!(sub.replay.len(), 2);
        assert!(sub.replay[1].is_terminal());
        assert!(sub.live.is_none());

        // The room is gone afterwards
        assert!(hub.subscribe("dep-1").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_deployment_is_none() {
        let hub = EventHub::new();
        assert!(hub.subscribe("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_rooms_are_isolated_by_deployment_id() {
        let hub = EventHub::new();
        hub.open("a").await;
        hub.open("b").await;
        hub.publish(DeployEvent::log("a", "for a")).await;

        let sub_b = hub.subscribe("b").await.unwrap();
        assert!(sub_b.replay.is_empty());
        let sub_a = hub.subscribe("a").await.unwrap();
        assert_eq!(sub_a.replay.len(), 1);
    }
}
