// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use tactics_common::{RoomEvent, RoomId};
use tokio::sync::broadcast;
use tracing::debug;

const ROOM_CHANNEL_CAPACITY: usize = 512;

/// Outbound notification seam. Implementations must keep per-room order.
pub trait EventSink: Send + Sync {
    fn publish(&self, room_id: &str, event: RoomEvent);
}

/// Fans each room's events out to every subscriber of that room.
#[derive(Default)]
pub struct BroadcastSink {
    channels: Mutex<HashMap<RoomId, broadcast::Sender<RoomEvent>>>,
}

impl BroadcastSink {
    fn channels(&self) -> MutexGuard<'_, HashMap<RoomId, broadcast::Sender<RoomEvent>>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, room_id: &str) -> broadcast::Receiver<RoomEvent> {
        self.channels()
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop the room's channel; subscribers see the stream end.
    pub fn close(&self, room_id: &str) {
        self.channels().remove(room_id);
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, room_id: &str, event: RoomEvent) {
        let terminal = matches!(
            event,
            RoomEvent::GameEnded { .. } | RoomEvent::NoMorePlayers
        );
        let mut channels = self.channels();
        let Some(sender) = channels.get(room_id) else {
            // Nobody has subscribed to this room yet.
            return;
        };
        if sender.send(event).is_err() {
            debug!(room_id = %room_id, "room event published without subscribers");
        }
        if terminal {
            channels.remove(room_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_room_events_in_order() {
        let sink = BroadcastSink::default();
        let mut rx = sink.subscribe("room-1");

        sink.publish("room-1", RoomEvent::DebugToggled { enabled: true });
        sink.publish("room-1", RoomEvent::NoMorePlayers);
        sink.publish("room-2", RoomEvent::DebugToggled { enabled: false });

        assert_eq!(rx.recv().await.unwrap(), RoomEvent::DebugToggled { enabled: true });
        assert_eq!(rx.recv().await.unwrap(), RoomEvent::NoMorePlayers);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn terminal_event_closes_the_room_channel() {
        let sink = BroadcastSink::default();
        let mut rx = sink.subscribe("room-1");
        sink.publish("room-1", RoomEvent::NoMorePlayers);

        assert_eq!(rx.recv().await.unwrap(), RoomEvent::NoMorePlayers);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn close_ends_the_stream() {
        let sink = BroadcastSink::default();
        let mut rx = sink.subscribe("room-1");
        sink.close("room-1");
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
