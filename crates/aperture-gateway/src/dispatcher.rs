use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::trace;
use uuid::Uuid;

use aperture_types::events::ServerEvent;

use crate::registry::{ChannelKey, RoomRegistry};

/// Manages all connected clients and fans events out to rooms. Cheap to
/// clone; every handle points at the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    registry: RwLock<RoomRegistry>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry: RwLock::new(RoomRegistry::new()),
            }),
        }
    }

    /// Registers a connection for the user. The connection starts out
    /// subscribed to the user's personal key only.
    pub async fn register_connection(
        &self,
        user_id: i64,
    ) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        self.inner.registry.write().await.register(user_id)
    }

    /// Drops the connection's event queue and all of its subscriptions.
    pub async fn disconnect(&self, conn_id: Uuid) {
        self.inner.registry.write().await.remove(conn_id);
    }

    pub async fn subscribe(&self, conn_id: Uuid, key: ChannelKey) {
        self.inner.registry.write().await.subscribe(conn_id, key);
    }

    /// Fans the event out to every connection in the room. Delivery is
    /// fire-and-forget; a connection mid-teardown is skipped.
    pub async fn publish(&self, key: &ChannelKey, event: ServerEvent) -> usize {
        let delivered = self.inner.registry.read().await.publish(key, &event);
        trace!("published {} to {} connections", key, delivered);
        delivered
    }

    /// Queues an event on a single connection.
    pub async fn send_to_conn(&self, conn_id: Uuid, event: ServerEvent) -> bool {
        self.inner.registry.read().await.send_to_conn(conn_id, event)
    }

    /// Queues an event on every connection the user has open.
    pub async fn send_to_user(&self, user_id: i64, event: ServerEvent) -> usize {
        self.publish(&ChannelKey::user(user_id), event).await
    }
}
