// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time fan-out for the Courier relay.
//!
//! Observers subscribe to logical rooms, `bot:{botId}` for everything a bot
//! sees and `chat:{botId}:{chatId}` for a single conversation. Publishing is
//! best-effort and at-most-once: an event sent to a room without subscribers
//! is dropped, and slow subscribers lose the oldest events.

use courier_core::BotId;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use strum::Display;
use tokio::sync::broadcast;
use tracing::trace;

/// Default per-room buffer.
pub const DEFAULT_ROOM_CAPACITY: usize = 256;

/// Kind of a fan-out event, as seen by websocket clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Message,
    MessageEdit,
    ChatUpdate,
    Reaction,
    Pin,
    PollUpdate,
}

/// One event delivered to a room.
#[derive(Debug, Clone, Serialize)]
pub struct FanoutEvent {
    pub room: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: Value,
}

/// Room for every event concerning a bot.
pub fn bot_room(bot: BotId) -> String {
    format!("bot:{bot}")
}

/// Room for a single chat of a bot.
pub fn chat_room(bot: BotId, chat_id: i64) -> String {
    format!("chat:{bot}:{chat_id}")
}

/// True when `room` has one of the two recognised shapes.
pub fn is_valid_room(room: &str) -> bool {
    let mut parts = room.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("bot"), Some(bot), None, None) => bot.parse::<i64>().is_ok(),
        (Some("chat"), Some(bot), Some(chat), None) => {
            bot.parse::<i64>().is_ok() && chat.parse::<i64>().is_ok()
        }
        _ => false,
    }
}

/// Broadcast hub keyed by room name.
pub struct FanoutHub {
    rooms: DashMap<String, broadcast::Sender<FanoutEvent>>,
    capacity: usize,
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

impl FanoutHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Join `room`, creating it on first use.
    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<FanoutEvent> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish to `room`. Returns how many subscribers received the event.
    pub fn publish(&self, room: &str, kind: EventKind, payload: Value) -> usize {
        let sent = {
            let Some(sender) = self.rooms.get(room) else {
                trace!(room, %kind, "no subscribers, event dropped");
                return 0;
            };
            sender.send(FanoutEvent {
                room: room.to_string(),
                kind,
                payload,
            })
        };
        match sent {
            Ok(receivers) => receivers,
            Err(_) => {
                // Every receiver is gone.
                self.rooms.remove_if(room, |_, tx| tx.receiver_count() == 0);
                0
            }
        }
    }

    /// Drop rooms nobody listens to. Returns the number removed.
    pub fn prune(&self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, tx| tx.receiver_count() > 0);
        before.saturating_sub(self.rooms.len())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
