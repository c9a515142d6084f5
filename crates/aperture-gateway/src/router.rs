use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use aperture_db::Database;
use aperture_types::events::{JoinPayload, SendPayload, ServerEvent};
use aperture_types::models::{ChatKind, ChatMessage};

use crate::dispatcher::Dispatcher;
use crate::registry::ChannelKey;

/// Why a send was refused. The Display text is exactly what the client sees
/// in the failure ack.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("chatType, targetId and content are required.")]
    MissingFields,
    #[error("Not allowed.")]
    NotMember,
    #[error("Invalid chatType.")]
    InvalidChatType,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Validates room commands against the membership store and hands accepted
/// messages to the dispatcher.
pub struct RoomRouter {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl RoomRouter {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// chat:join. Failures are silent: the command is dropped when fields
    /// are missing, the kind is unknown, or the membership check refuses.
    pub async fn join(&self, conn_id: Uuid, user_id: i64, payload: JoinPayload) {
        let (Some(kind_raw), Some(target)) = (payload.chat_type, payload.target_id) else {
            return;
        };
        let Ok(kind) = kind_raw.parse::<ChatKind>() else {
            return;
        };

        // Private rooms need no membership: any user pair may share one.
        if !matches!(kind, ChatKind::Private) && !self.check_membership(kind, target, user_id).await
        {
            return;
        }

        let key = ChannelKey::for_message(kind, user_id, target);
        self.dispatcher.subscribe(conn_id, key.clone()).await;
        debug!("user {} joined {}", user_id, key);
    }

    /// chat:send. Membership is re-checked against the store on every send,
    /// so a member revoked after joining is refused even while the room
    /// subscription is still live.
    ///
    /// On success the message has already been fanned out to the room; the
    /// caller only has to ack.
    pub async fn send(
        &self,
        user_id: i64,
        payload: SendPayload,
    ) -> Result<ChatMessage, SendError> {
        let kind_raw = payload.chat_type.unwrap_or_default();
        let target = payload.target_id.unwrap_or(0);
        let content = payload.content.unwrap_or_default();
        if kind_raw.is_empty() || target == 0 || content.is_empty() {
            return Err(SendError::MissingFields);
        }

        let kind: ChatKind = kind_raw.parse().map_err(|_| SendError::InvalidChatType)?;

        if !matches!(kind, ChatKind::Private) && !self.check_membership(kind, target, user_id).await
        {
            return Err(SendError::NotMember);
        }

        let (recipient, group, album) = match kind {
            ChatKind::Private => (Some(target), None, None),
            ChatKind::Group => (None, Some(target), None),
            ChatKind::Album => (None, None, Some(target)),
        };

        let db = self.db.clone();
        let row = tokio::task::spawn_blocking(move || {
            let id = db.insert_message(user_id, kind, recipient, group, album, &content)?;
            db.get_message(id)?
                .ok_or_else(|| anyhow::anyhow!("message {} missing after insert", id))
        })
        .await
        .map_err(anyhow::Error::from)??;

        let message = row.into_chat_message();
        let key = ChannelKey::for_message(kind, user_id, target);
        let delivered = self
            .dispatcher
            .publish(&key, ServerEvent::Message(message.clone()))
            .await;
        debug!("message {} fanned out to {} connections on {}", message.id, delivered, key);

        Ok(message)
    }

    /// Membership gate shared by join and send: the target must exist and
    /// the user must currently belong to it. Store errors count as refusal.
    async fn check_membership(&self, kind: ChatKind, target: i64, user_id: i64) -> bool {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
            match kind {
                ChatKind::Private => Ok(true),
                ChatKind::Group => {
                    Ok(db.get_group(target)?.is_some() && db.is_group_member(target, user_id)?)
                }
                ChatKind::Album => {
                    Ok(db.get_album(target)?.is_some() && db.is_album_member(target, user_id)?)
                }
            }
        })
        .await;

        match result {
            Ok(Ok(allowed)) => allowed,
            Ok(Err(e)) => {
                warn!("membership check failed: {:#}", e);
                false
            }
            Err(e) => {
                warn!("membership check task failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aperture_db::queries::MessageFilter;

    fn setup() -> (Arc<Database>, RoomRouter) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let router = RoomRouter::new(db.clone(), Dispatcher::new());
        (db, router)
    }

    fn seed_user(db: &Database, name: &str) -> i64 {
        db.create_user(name, &format!("{name}@example.com"), "hash", "")
            .unwrap()
    }

    fn join_payload(kind: &str, target: i64) -> JoinPayload {
        JoinPayload {
            chat_type: Some(kind.to_string()),
            target_id: Some(target),
        }
    }

    fn send_payload(kind: &str, target: i64, content: &str) -> SendPayload {
        SendPayload {
            chat_type: Some(kind.to_string()),
            target_id: Some(target),
            content: Some(content.to_string()),
        }
    }

    fn expect_message(event: ServerEvent) -> ChatMessage {
        match event {
            ServerEvent::Message(message) => message,
            other => panic!("expected chat:message, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn private_send_reaches_both_parties() {
        let (db, router) = setup();
        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");

        let (ada_conn, mut ada_rx) = router.dispatcher().register_connection(ada).await;
        let (bob_conn, mut bob_rx) = router.dispatcher().register_connection(bob).await;

        // Each side names the other; the normalized key makes it one room
        router.join(ada_conn, ada, join_payload("private", bob)).await;
        router.join(bob_conn, bob, join_payload("private", ada)).await;

        let sent = router.send(ada, send_payload("private", bob, "hi")).await.unwrap();
        assert_eq!(sent.content, "hi");
        assert_eq!(sent.sender.id, ada);
        assert_eq!(sent.recipient, Some(bob));

        assert_eq!(expect_message(ada_rx.try_recv().unwrap()).id, sent.id);
        assert_eq!(expect_message(bob_rx.try_recv().unwrap()).id, sent.id);
        assert!(ada_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());

        // And the reply flows the other way through the same room
        let reply = router.send(bob, send_payload("private", ada, "hey")).await.unwrap();
        assert_eq!(expect_message(ada_rx.try_recv().unwrap()).id, reply.id);
        assert_eq!(expect_message(bob_rx.try_recv().unwrap()).id, reply.id);
    }

    #[tokio::test]
    async fn group_send_checks_membership_at_send_time() {
        let (db, router) = setup();
        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");
        let gid = db.create_group("climbers", ada, &[ada, bob]).unwrap();

        let (ada_conn, mut ada_rx) = router.dispatcher().register_connection(ada).await;
        let (bob_conn, mut bob_rx) = router.dispatcher().register_connection(bob).await;
        router.join(ada_conn, ada, join_payload("group", gid)).await;
        router.join(bob_conn, bob, join_payload("group", gid)).await;

        router.send(bob, send_payload("group", gid, "first")).await.unwrap();
        assert!(ada_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_ok());

        // Revoke bob mid-session; the live subscription does not matter
        db.update_group(gid, None, Some(&[ada])).unwrap();
        let err = router
            .send(bob, send_payload("group", gid, "still here?"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::NotMember));
        assert_eq!(err.to_string(), "Not allowed.");
        assert_eq!(db.count_messages(MessageFilter::Group(gid)).unwrap(), 1);

        // But bob keeps receiving until the socket drops: revocation only
        // gates sending
        let second = router.send(ada, send_payload("group", gid, "second")).await.unwrap();
        assert_eq!(expect_message(bob_rx.try_recv().unwrap()).id, second.id);
    }

    #[tokio::test]
    async fn missing_fields_refuse_without_persisting() {
        let (db, router) = setup();
        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");

        let no_content = SendPayload {
            chat_type: Some("private".to_string()),
            target_id: Some(bob),
            content: None,
        };
        let err = router.send(ada, no_content).await.unwrap_err();
        assert!(matches!(err, SendError::MissingFields));
        assert_eq!(err.to_string(), "chatType, targetId and content are required.");

        // Zero target and empty content count as missing
        let err = router.send(ada, send_payload("private", 0, "hi")).await.unwrap_err();
        assert!(matches!(err, SendError::MissingFields));
        let err = router.send(ada, send_payload("private", bob, "")).await.unwrap_err();
        assert!(matches!(err, SendError::MissingFields));

        assert_eq!(
            db.count_messages(MessageFilter::Private { a: ada, b: bob }).unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn unknown_chat_type_is_refused() {
        let (db, router) = setup();
        let ada = seed_user(&db, "ada");

        let err = router.send(ada, send_payload("broadcast", 1, "hi")).await.unwrap_err();
        assert!(matches!(err, SendError::InvalidChatType));
        assert_eq!(err.to_string(), "Invalid chatType.");
        assert_eq!(db.count_messages(MessageFilter::Private { a: ada, b: 1 }).unwrap(), 0);
    }

    #[tokio::test]
    async fn join_is_silent_for_outsiders_and_unknown_rooms() {
        let (db, router) = setup();
        let ada = seed_user(&db, "ada");
        let eve = seed_user(&db, "eve");
        let gid = db.create_group("climbers", ada, &[ada]).unwrap();

        let (ada_conn, mut ada_rx) = router.dispatcher().register_connection(ada).await;
        let (eve_conn, mut eve_rx) = router.dispatcher().register_connection(eve).await;
        router.join(ada_conn, ada, join_payload("group", gid)).await;

        // Non-member join and nonexistent-room join both drop silently
        router.join(eve_conn, eve, join_payload("group", gid)).await;
        router.join(eve_conn, eve, join_payload("group", gid + 100)).await;
        router.join(eve_conn, eve, join_payload("broadcast", gid)).await;
        router
            .join(
                eve_conn,
                eve,
                JoinPayload { chat_type: Some("group".to_string()), target_id: None },
            )
            .await;

        router.send(ada, send_payload("group", gid, "members only")).await.unwrap();
        assert!(ada_rx.try_recv().is_ok());
        assert!(eve_rx.try_recv().is_err());

        // Sending is refused outright for someone who was never a member
        let err = router.send(eve, send_payload("group", gid, "let me in")).await.unwrap_err();
        assert!(matches!(err, SendError::NotMember));
        assert_eq!(err.to_string(), "Not allowed.");
        assert_eq!(db.count_messages(MessageFilter::Group(gid)).unwrap(), 1);
    }

    #[tokio::test]
    async fn every_socket_in_a_room_gets_its_own_copy() {
        let (db, router) = setup();
        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");
        let gid = db.create_group("climbers", ada, &[ada, bob]).unwrap();

        // Ada has two sockets open, both joined to the room
        let (ada_a, mut ada_a_rx) = router.dispatcher().register_connection(ada).await;
        let (ada_b, mut ada_b_rx) = router.dispatcher().register_connection(ada).await;
        let (bob_conn, mut bob_rx) = router.dispatcher().register_connection(bob).await;
        router.join(ada_a, ada, join_payload("group", gid)).await;
        router.join(ada_b, ada, join_payload("group", gid)).await;
        router.join(bob_conn, bob, join_payload("group", gid)).await;

        let sent = router.send(bob, send_payload("group", gid, "hi all")).await.unwrap();

        for rx in [&mut ada_a_rx, &mut ada_b_rx, &mut bob_rx] {
            assert_eq!(expect_message(rx.try_recv().unwrap()).id, sent.id);
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_store_error() {
        let (db, router) = setup();
        let bob = seed_user(&db, "bob");

        // Sender id without a user row violates the sender foreign key
        let err = router
            .send(9999, send_payload("private", bob, "ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Store(_)));
        assert_eq!(
            db.count_messages(MessageFilter::Private { a: 9999, b: bob }).unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn send_without_joining_still_persists_and_fans_out() {
        let (db, router) = setup();
        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");

        let (_ada_conn, mut ada_rx) = router.dispatcher().register_connection(ada).await;
        let (bob_conn, mut bob_rx) = router.dispatcher().register_connection(bob).await;
        router.join(bob_conn, bob, join_payload("private", ada)).await;

        // Ada never joined; the message still lands for joined peers
        let sent = router.send(ada, send_payload("private", bob, "hi")).await.unwrap();
        assert_eq!(expect_message(bob_rx.try_recv().unwrap()).id, sent.id);
        assert!(ada_rx.try_recv().is_err());
        assert_eq!(
            db.count_messages(MessageFilter::Private { a: ada, b: bob }).unwrap(),
            1
        );
    }
}
