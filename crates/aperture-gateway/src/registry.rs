use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use aperture_types::events::ServerEvent;
use aperture_types::models::ChatKind;

/// Addressable fan-out target. Every live connection is subscribed to a set
/// of these keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// Per-user channel, held by every connection that user has open.
    User(i64),
    Private(i64, i64),
    Group(i64),
    Album(i64),
}

impl ChannelKey {
    pub fn user(id: i64) -> Self {
        ChannelKey::User(id)
    }

    /// Key for a two-party conversation. The pair is ordered by the decimal
    /// string form of the ids, so both participants derive the same key:
    /// users 9 and 10 land on "private:10:9" no matter who joins first.
    pub fn private(a: i64, b: i64) -> Self {
        if a.to_string() <= b.to_string() {
            ChannelKey::Private(a, b)
        } else {
            ChannelKey::Private(b, a)
        }
    }

    pub fn group(id: i64) -> Self {
        ChannelKey::Group(id)
    }

    pub fn album(id: i64) -> Self {
        ChannelKey::Album(id)
    }

    /// Key a message of the given kind fans out on.
    pub fn for_message(kind: ChatKind, sender_id: i64, target_id: i64) -> Self {
        match kind {
            ChatKind::Private => ChannelKey::private(sender_id, target_id),
            ChatKind::Group => ChannelKey::Group(target_id),
            ChatKind::Album => ChannelKey::Album(target_id),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::User(id) => write!(f, "user:{id}"),
            ChannelKey::Private(a, b) => write!(f, "private:{a}:{b}"),
            ChannelKey::Group(id) => write!(f, "group:{id}"),
            ChannelKey::Album(id) => write!(f, "album:{id}"),
        }
    }
}

/// Connection and room bookkeeping behind the dispatcher. Keyed by
/// connection id, so a user with several sockets open holds several
/// independent subscriptions and each socket gets its own copy of an event.
#[derive(Default)]
pub struct RoomRegistry {
    senders: HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>,
    rooms: HashMap<ChannelKey, HashSet<Uuid>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for a user and subscribes it to the user's
    /// personal key. Returns the connection id and the event receiver the
    /// socket task drains.
    pub fn register(&mut self, user_id: i64) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(conn_id, tx);
        self.subscribe(conn_id, ChannelKey::user(user_id));
        (conn_id, rx)
    }

    pub fn subscribe(&mut self, conn_id: Uuid, key: ChannelKey) {
        self.rooms.entry(key).or_default().insert(conn_id);
    }

    pub fn unsubscribe(&mut self, conn_id: Uuid, key: &ChannelKey) {
        if let Some(members) = self.rooms.get_mut(key) {
            members.remove(&conn_id);
            if members.is_empty() {
                self.rooms.remove(key);
            }
        }
    }

    /// Connections currently subscribed to the key.
    pub fn members_of(&self, key: &ChannelKey) -> Vec<Uuid> {
        self.rooms
            .get(key)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drops the connection's sender and every room membership it held.
    /// Rooms left empty are removed.
    pub fn remove(&mut self, conn_id: Uuid) {
        self.senders.remove(&conn_id);
        self.rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    /// Queues the event on every connection in the room, one copy each.
    /// Returns how many connections it reached; closed connections are
    /// skipped.
    pub fn publish(&self, key: &ChannelKey, event: &ServerEvent) -> usize {
        let Some(members) = self.rooms.get(key) else {
            return 0;
        };

        let mut delivered = 0;
        for conn_id in members {
            if let Some(tx) = self.senders.get(conn_id) {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Queues the event on one connection. False when it is gone.
    pub fn send_to_conn(&self, conn_id: Uuid, event: ServerEvent) -> bool {
        match self.senders.get(&conn_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn is_subscribed(&self, conn_id: Uuid, key: &ChannelKey) -> bool {
        self.rooms
            .get(key)
            .is_some_and(|members| members.contains(&conn_id))
    }

    pub fn connections(&self) -> usize {
        self.senders.len()
    }
}
