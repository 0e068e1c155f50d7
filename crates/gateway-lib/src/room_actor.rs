// ============================
// crates/gateway-lib/src/room_actor.rs
// ============================
//! Per-ticket room actor.
//!
//! One task owns one ticket's membership set, typing roster, and the
//! persist-then-broadcast send path. Because the actor processes its
//! command queue sequentially, two concurrent sends to the same ticket
//! can never interleave their store-write and fan-out; different tickets
//! run on independent tasks and never block each other.

use crate::error::AppError;
use crate::store::MessageStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use ticketchat_common::{ActorInfo, Attachment, MessageRecord, ServerEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Outbound event channel of one connection
pub type OutboundSender = mpsc::UnboundedSender<ServerEvent>;

/// Why a send was refused
#[derive(Debug, Error)]
pub enum SendError {
    #[error("sender is not a member of the room")]
    NotMember,

    #[error("message store failure: {0}")]
    Store(String),

    #[error("room is no longer active")]
    RoomClosed,
}

/// Message sent *into* the actor
pub enum RoomCmd {
    Join {
        connection_id: Uuid,
        actor: ActorInfo,
        tx: OutboundSender,
        resp: oneshot::Sender<bool>,
    },
    Leave {
        connection_id: Uuid,
        resp: oneshot::Sender<bool>,
    },
    Send {
        connection_id: Uuid,
        body: String,
        attachments: Vec<Attachment>,
        resp: oneshot::Sender<Result<MessageRecord, SendError>>,
    },
    TypingStart {
        connection_id: Uuid,
    },
    TypingStop {
        connection_id: Uuid,
    },
    Members {
        resp: oneshot::Sender<Vec<ActorInfo>>,
    },
}

/// Handle that other components keep: the actor's command channel
#[derive(Clone)]
pub struct RoomHandle {
    pub cmd_tx: mpsc::UnboundedSender<RoomCmd>,
}

impl RoomHandle {
    pub fn spawn(
        ticket_id: String,
        store: Arc<dyn MessageStore>,
        typing_ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let actor = RoomActor::new(ticket_id, store, typing_ttl, store_timeout);
        tokio::spawn(actor.run(cmd_rx));
        RoomHandle { cmd_tx }
    }
}

struct Member {
    actor: ActorInfo,
    tx: OutboundSender,
}

struct TypingEntry {
    display_name: String,
    last_activity: Instant,
}

pub struct RoomActor {
    ticket_id: String,
    members: HashMap<Uuid, Member>,
    /// Actors currently composing, keyed by actor id
    typing: HashMap<String, TypingEntry>,
    store: Arc<dyn MessageStore>,
    typing_ttl: Duration,
    store_timeout: Duration,
}

impl RoomActor {
    fn new(
        ticket_id: String,
        store: Arc<dyn MessageStore>,
        typing_ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            ticket_id,
            members: HashMap::new(),
            typing: HashMap::new(),
            store,
            typing_ttl,
            store_timeout,
        }
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomCmd>) {
        let sweep_every = (self.typing_ttl / 2).max(Duration::from_millis(250));
        let mut sweep = tokio::time::interval(sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut seen_member = false;
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle(cmd).await;
                    if !self.members.is_empty() {
                        seen_member = true;
                    }
                    // A room with no members is garbage; the manager
                    // respawns on the next join
                    if seen_member && self.members.is_empty() {
                        break;
                    }
                },
                _ = sweep.tick() => self.expire_typing(),
            }
        }
        tracing::debug!(ticket_id = %self.ticket_id, "room actor stopped");
    }

    async fn handle(&mut self, cmd: RoomCmd) {
        match cmd {
            RoomCmd::Join {
                connection_id,
                actor,
                tx,
                resp,
            } => {
                let newly_joined = self.join(connection_id, actor, tx);
                let _ = resp.send(newly_joined);
            },
            RoomCmd::Leave {
                connection_id,
                resp,
            } => {
                let was_member = self.remove_member(connection_id);
                let _ = resp.send(was_member);
            },
            RoomCmd::Send {
                connection_id,
                body,
                attachments,
                resp,
            } => {
                let result = self.send(connection_id, body, attachments).await;
                let _ = resp.send(result);
            },
            RoomCmd::TypingStart { connection_id } => self.typing_start(connection_id),
            RoomCmd::TypingStop { connection_id } => self.typing_stop(connection_id),
            RoomCmd::Members { resp } => {
                let _ = resp.send(self.member_actors());
            },
        }
    }

    /// Returns true when the connection was newly added. Joining twice
    /// is a no-op success and never re-broadcasts.
    fn join(&mut self, connection_id: Uuid, actor: ActorInfo, tx: OutboundSender) -> bool {
        if self.members.contains_key(&connection_id) {
            return false;
        }

        let joined = ServerEvent::UserJoinedTicket {
            ticket_id: self.ticket_id.clone(),
            actor_id: actor.id.clone(),
            display_name: actor.name.clone(),
        };
        self.members.insert(connection_id, Member { actor, tx });
        self.broadcast(joined, Some(connection_id));
        true
    }

    /// Persist first, broadcast second. The actor loop serializes calls,
    /// so fan-out order always matches persistence order for this ticket.
    async fn send(
        &mut self,
        connection_id: Uuid,
        body: String,
        attachments: Vec<Attachment>,
    ) -> Result<MessageRecord, SendError> {
        let sender = self
            .members
            .get(&connection_id)
            .ok_or(SendError::NotMember)?;

        let record = MessageRecord {
            message_id: Uuid::new_v4(),
            ticket_id: self.ticket_id.clone(),
            sender_id: sender.actor.id.clone(),
            sender_role: sender.actor.role,
            body,
            attachments,
            created_at: Utc::now(),
        };

        match tokio::time::timeout(self.store_timeout, self.store.append(&record)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(SendError::Store(e.to_string())),
            Err(_) => return Err(SendError::Store(AppError::Timeout("message store").to_string())),
        }

        metrics::counter!(crate::metrics::MESSAGE_PERSISTED).increment(1);

        // Sender reconciles by echo: include it in the fan-out
        self.broadcast(
            ServerEvent::NewMessage {
                ticket_id: self.ticket_id.clone(),
                data: record.clone(),
            },
            None,
        );
        Ok(record)
    }

    fn typing_start(&mut self, connection_id: Uuid) {
        // Best-effort: non-members are silently ignored
        let Some(member) = self.members.get(&connection_id) else {
            return;
        };
        let actor = member.actor.clone();

        self.typing.insert(
            actor.id.clone(),
            TypingEntry {
                display_name: actor.name.clone(),
                last_activity: Instant::now(),
            },
        );
        self.broadcast(
            ServerEvent::UserTyping {
                ticket_id: self.ticket_id.clone(),
                actor_id: actor.id,
                display_name: actor.name,
            },
            Some(connection_id),
        );
    }

    fn typing_stop(&mut self, connection_id: Uuid) {
        let Some(member) = self.members.get(&connection_id) else {
            return;
        };
        let actor = member.actor.clone();

        if self.typing.remove(&actor.id).is_some() {
            self.broadcast(
                ServerEvent::UserStoppedTyping {
                    ticket_id: self.ticket_id.clone(),
                    actor_id: actor.id,
                    display_name: actor.name,
                },
                Some(connection_id),
            );
        }
    }

    /// Force-expire typing entries whose last activity is older than the
    /// TTL. Covers clients that crash without sending `typing_stop`.
    fn expire_typing(&mut self) {
        let ttl = self.typing_ttl;
        let expired: Vec<(String, String)> = self
            .typing
            .iter()
            .filter(|(_, entry)| entry.last_activity.elapsed() > ttl)
            .map(|(actor_id, entry)| (actor_id.clone(), entry.display_name.clone()))
            .collect();

        for (actor_id, display_name) in expired {
            self.typing.remove(&actor_id);
            self.broadcast(
                ServerEvent::UserStoppedTyping {
                    ticket_id: self.ticket_id.clone(),
                    actor_id,
                    display_name,
                },
                None,
            );
        }
    }

    /// Remove a member (leave, disconnect, or dead channel). Emits the
    /// leave broadcast and clears the actor's typing entry when this was
    /// their last connection in the room.
    fn remove_member(&mut self, connection_id: Uuid) -> bool {
        let Some(member) = self.members.remove(&connection_id) else {
            return false;
        };
        let actor = member.actor;

        let still_present = self
            .members
            .values()
            .any(|m| m.actor.id == actor.id);
        if !still_present && self.typing.remove(&actor.id).is_some() {
            self.broadcast(
                ServerEvent::UserStoppedTyping {
                    ticket_id: self.ticket_id.clone(),
                    actor_id: actor.id.clone(),
                    display_name: actor.name.clone(),
                },
                None,
            );
        }

        self.broadcast(
            ServerEvent::UserLeftTicket {
                ticket_id: self.ticket_id.clone(),
                actor_id: actor.id,
                display_name: actor.name,
            },
            None,
        );
        true
    }

    /// Fan an event out to every member (minus `exclude`). A failed send
    /// means the connection is gone: drop it from membership instead of
    /// failing the broadcast (self-healing membership).
    fn broadcast(&mut self, event: ServerEvent, exclude: Option<Uuid>) {
        let mut dead: Vec<Uuid> = Vec::new();
        for (connection_id, member) in &self.members {
            if Some(*connection_id) == exclude {
                continue;
            }
            if member.tx.send(event.clone()).is_err() {
                dead.push(*connection_id);
            }
        }

        for connection_id in dead {
            tracing::debug!(ticket_id = %self.ticket_id, %connection_id,
                "dropping dead room member");
            self.remove_member(connection_id);
        }
    }

    /// Distinct actors currently in the room
    fn member_actors(&self) -> Vec<ActorInfo> {
        let mut seen = std::collections::HashSet::new();
        self.members
            .values()
            .filter(|m| seen.insert(m.actor.id.clone()))
            .map(|m| m.actor.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FlatFileMessageStore;
    use tempfile::TempDir;
    use ticketchat_common::Role;

    fn actor(id: &str) -> ActorInfo {
        ActorInfo {
            id: id.to_string(),
            name: format!("{id}-name"),
            role: Role::Client,
        }
    }

    fn setup(typing_ttl: Duration) -> (RoomHandle, Arc<dyn MessageStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn MessageStore> =
            Arc::new(FlatFileMessageStore::new(dir.path()).unwrap());
        let handle = RoomHandle::spawn(
            "T-1".to_string(),
            store.clone(),
            typing_ttl,
            Duration::from_secs(5),
        );
        (handle, store, dir)
    }

    async fn join(
        handle: &RoomHandle,
        conn: Uuid,
        who: &str,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (resp, resp_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(RoomCmd::Join {
                connection_id: conn,
                actor: actor(who),
                tx,
                resp,
            })
            .unwrap();
        assert!(resp_rx.await.unwrap());
        rx
    }

    #[tokio::test]
    async fn test_join_broadcasts_to_others_only() {
        let (handle, _store, _dir) = setup(Duration::from_secs(5));

        let mut alice_rx = join(&handle, Uuid::new_v4(), "alice").await;
        let _bob_rx = join(&handle, Uuid::new_v4(), "bob").await;

        match alice_rx.recv().await.unwrap() {
            ServerEvent::UserJoinedTicket { actor_id, .. } => assert_eq!(actor_id, "bob"),
            other => panic!("Expected UserJoinedTicket, got {other:?}"),
        }
        // Alice saw nothing about her own join
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_double_join_is_noop() {
        let (handle, _store, _dir) = setup(Duration::from_secs(5));
        let conn = Uuid::new_v4();

        let mut alice_rx = join(&handle, conn, "alice").await;
        let mut bob_rx = join(&handle, Uuid::new_v4(), "bob").await;
        let _ = alice_rx.recv().await; // bob joined

        // Second join of the same connection: no-op success
        let (tx, _rx2) = mpsc::unbounded_channel();
        let (resp, resp_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(RoomCmd::Join {
                connection_id: conn,
                actor: actor("alice"),
                tx,
                resp,
            })
            .unwrap();
        assert!(!resp_rx.await.unwrap());

        // Bob never saw a duplicate join broadcast
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_persists_then_fans_out_to_all() {
        let (handle, store, _dir) = setup(Duration::from_secs(5));
        let alice = Uuid::new_v4();

        let mut alice_rx = join(&handle, alice, "alice").await;
        let mut bob_rx = join(&handle, Uuid::new_v4(), "bob").await;
        let _ = alice_rx.recv().await; // bob joined

        let (resp, resp_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(RoomCmd::Send {
                connection_id: alice,
                body: "hello".to_string(),
                attachments: vec![],
                resp,
            })
            .unwrap();
        let record = resp_rx.await.unwrap().unwrap();
        assert_eq!(record.body, "hello");
        assert_eq!(record.sender_id, "alice");

        // Both members (sender included) receive the echo
        for rx in [&mut alice_rx, &mut bob_rx] {
            match rx.recv().await.unwrap() {
                ServerEvent::NewMessage { data, .. } => {
                    assert_eq!(data.message_id, record.message_id);
                },
                other => panic!("Expected NewMessage, got {other:?}"),
            }
        }

        // Durable before broadcast: read-back sees it
        let stored = store.list_by_ticket("T-1", 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message_id, record.message_id);
    }

    #[tokio::test]
    async fn test_send_from_non_member_is_refused() {
        let (handle, store, _dir) = setup(Duration::from_secs(5));
        let _alice_rx = join(&handle, Uuid::new_v4(), "alice").await;

        let (resp, resp_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(RoomCmd::Send {
                connection_id: Uuid::new_v4(),
                body: "sneaky".to_string(),
                attachments: vec![],
                resp,
            })
            .unwrap();
        assert!(matches!(
            resp_rx.await.unwrap(),
            Err(SendError::NotMember)
        ));
        assert!(store.list_by_ticket("T-1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sends_keep_order() {
        let (handle, _store, _dir) = setup(Duration::from_secs(5));
        let alice = Uuid::new_v4();

        let mut alice_rx = join(&handle, alice, "alice").await;
        let mut bob_rx = join(&handle, Uuid::new_v4(), "bob").await;
        let _ = alice_rx.recv().await;

        // Enqueue both sends before either completes; the actor
        // serializes persist+broadcast pairs
        let (resp_a, rx_a) = oneshot::channel();
        let (resp_b, rx_b) = oneshot::channel();
        handle
            .cmd_tx
            .send(RoomCmd::Send {
                connection_id: alice,
                body: "A".to_string(),
                attachments: vec![],
                resp: resp_a,
            })
            .unwrap();
        handle
            .cmd_tx
            .send(RoomCmd::Send {
                connection_id: alice,
                body: "B".to_string(),
                attachments: vec![],
                resp: resp_b,
            })
            .unwrap();
        rx_a.await.unwrap().unwrap();
        rx_b.await.unwrap().unwrap();

        for rx in [&mut alice_rx, &mut bob_rx] {
            let bodies: Vec<String> = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()]
                .into_iter()
                .map(|evt| match evt {
                    ServerEvent::NewMessage { data, .. } => data.body,
                    other => panic!("Expected NewMessage, got {other:?}"),
                })
                .collect();
            assert_eq!(bodies, vec!["A".to_string(), "B".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_typing_ttl_expires_without_stop() {
        let (handle, _store, _dir) = setup(Duration::from_millis(100));
        let alice = Uuid::new_v4();

        let mut alice_rx = join(&handle, alice, "alice").await;
        let mut bob_rx = join(&handle, Uuid::new_v4(), "bob").await;
        let _ = alice_rx.recv().await;

        handle
            .cmd_tx
            .send(RoomCmd::TypingStart {
                connection_id: alice,
            })
            .unwrap();

        match bob_rx.recv().await.unwrap() {
            ServerEvent::UserTyping { actor_id, .. } => assert_eq!(actor_id, "alice"),
            other => panic!("Expected UserTyping, got {other:?}"),
        }

        // No typing_stop ever arrives; the sweep must force-expire
        match bob_rx.recv().await.unwrap() {
            ServerEvent::UserStoppedTyping { actor_id, .. } => assert_eq!(actor_id, "alice"),
            other => panic!("Expected UserStoppedTyping, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_leave_clears_typing_and_broadcasts() {
        let (handle, _store, _dir) = setup(Duration::from_secs(60));
        let alice = Uuid::new_v4();

        let mut alice_rx = join(&handle, alice, "alice").await;
        let mut bob_rx = join(&handle, Uuid::new_v4(), "bob").await;
        let _ = alice_rx.recv().await;

        handle
            .cmd_tx
            .send(RoomCmd::TypingStart {
                connection_id: alice,
            })
            .unwrap();
        let _ = bob_rx.recv().await; // user_typing

        let (resp, resp_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(RoomCmd::Leave {
                connection_id: alice,
                resp,
            })
            .unwrap();
        assert!(resp_rx.await.unwrap());

        // Typing is force-stopped before the leave is announced
        match bob_rx.recv().await.unwrap() {
            ServerEvent::UserStoppedTyping { actor_id, .. } => assert_eq!(actor_id, "alice"),
            other => panic!("Expected UserStoppedTyping, got {other:?}"),
        }
        match bob_rx.recv().await.unwrap() {
            ServerEvent::UserLeftTicket { actor_id, .. } => assert_eq!(actor_id, "alice"),
            other => panic!("Expected UserLeftTicket, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dead_member_is_reaped_on_broadcast() {
        let (handle, _store, _dir) = setup(Duration::from_secs(5));
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut alice_rx = join(&handle, alice, "alice").await;
        let bob_rx = join(&handle, bob, "bob").await;
        let _ = alice_rx.recv().await;

        // Bob's receiver goes away without a leave (crash)
        drop(bob_rx);

        let (resp, resp_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(RoomCmd::Send {
                connection_id: alice,
                body: "anyone there?".to_string(),
                attachments: vec![],
                resp,
            })
            .unwrap();
        resp_rx.await.unwrap().unwrap();

        let _ = alice_rx.recv().await; // her own new_message echo
        match alice_rx.recv().await.unwrap() {
            ServerEvent::UserLeftTicket { actor_id, .. } => assert_eq!(actor_id, "bob"),
            other => panic!("Expected UserLeftTicket, got {other:?}"),
        }

        let (resp, resp_rx) = oneshot::channel();
        handle.cmd_tx.send(RoomCmd::Members { resp }).unwrap();
        let members = resp_rx.await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, "alice");
    }

    #[tokio::test]
    async fn test_actor_stops_when_room_empties() {
        let (handle, _store, _dir) = setup(Duration::from_secs(5));
        let alice = Uuid::new_v4();

        let _alice_rx = join(&handle, alice, "alice").await;

        let (resp, resp_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(RoomCmd::Leave {
                connection_id: alice,
                resp,
            })
            .unwrap();
        assert!(resp_rx.await.unwrap());

        // Give the actor a moment to observe the empty room and exit
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.cmd_tx.is_closed());
    }
}
