// ============================
// crates/gateway-lib/src/rooms.rs
// ============================
//! Room manager: ticket id -> live room actor.

use crate::error::AppError;
use crate::room_actor::{OutboundSender, RoomCmd, RoomHandle, SendError};
use crate::store::MessageStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use ticketchat_common::{ActorInfo, Attachment, MessageRecord};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Maps tickets to their room actors. Rooms are created lazily on first
/// join and disappear when the last member leaves; a handle whose actor
/// has exited counts as an absent room.
pub struct RoomManager {
    rooms: DashMap<String, RoomHandle>,
    store: Arc<dyn MessageStore>,
    typing_ttl: Duration,
    store_timeout: Duration,
}

impl RoomManager {
    pub fn new(
        store: Arc<dyn MessageStore>,
        typing_ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            rooms: DashMap::new(),
            store,
            typing_ttl,
            store_timeout,
        }
    }

    fn spawn_handle(&self, ticket_id: &str) -> RoomHandle {
        RoomHandle::spawn(
            ticket_id.to_string(),
            self.store.clone(),
            self.typing_ttl,
            self.store_timeout,
        )
    }

    /// Handle for a room that must exist (joins). Replaces handles whose
    /// actor already exited.
    fn handle_or_spawn(&self, ticket_id: &str) -> RoomHandle {
        loop {
            let handle = self
                .rooms
                .entry(ticket_id.to_string())
                .or_insert_with(|| self.spawn_handle(ticket_id))
                .value()
                .clone();
            if !handle.cmd_tx.is_closed() {
                return handle;
            }
            self.rooms
                .remove_if(ticket_id, |_, h| h.cmd_tx.is_closed());
        }
    }

    /// Handle only if the room currently exists (everything but joins)
    fn live_handle(&self, ticket_id: &str) -> Option<RoomHandle> {
        let handle = self.rooms.get(ticket_id)?.value().clone();
        if handle.cmd_tx.is_closed() {
            self.rooms
                .remove_if(ticket_id, |_, h| h.cmd_tx.is_closed());
            return None;
        }
        Some(handle)
    }

    /// Add a connection to a room. Returns true when newly joined,
    /// false for an idempotent re-join.
    pub async fn join(
        &self,
        ticket_id: &str,
        connection_id: Uuid,
        actor: ActorInfo,
        tx: OutboundSender,
    ) -> Result<bool, AppError> {
        // One retry: the actor may exit between lookup and send when the
        // last member leaves concurrently
        for _ in 0..2 {
            let handle = self.handle_or_spawn(ticket_id);
            let (resp, resp_rx) = oneshot::channel();
            let cmd = RoomCmd::Join {
                connection_id,
                actor: actor.clone(),
                tx: tx.clone(),
                resp,
            };
            if handle.cmd_tx.send(cmd).is_ok() {
                if let Ok(newly_joined) = resp_rx.await {
                    return Ok(newly_joined);
                }
            }
            self.rooms
                .remove_if(ticket_id, |_, h| h.cmd_tx.is_closed());
        }
        Err(AppError::Internal(format!(
            "room {ticket_id} kept shutting down during join"
        )))
    }

    /// Remove a connection from a room. Returns true when it was a
    /// member; a no-op on absent rooms or non-members.
    pub async fn leave(&self, ticket_id: &str, connection_id: Uuid) -> bool {
        let Some(handle) = self.live_handle(ticket_id) else {
            return false;
        };
        let (resp, resp_rx) = oneshot::channel();
        if handle
            .cmd_tx
            .send(RoomCmd::Leave {
                connection_id,
                resp,
            })
            .is_err()
        {
            return false;
        }
        resp_rx.await.unwrap_or(false)
    }

    /// Persist-then-broadcast a message through the room's actor
    pub async fn send_message(
        &self,
        ticket_id: &str,
        connection_id: Uuid,
        body: String,
        attachments: Vec<Attachment>,
    ) -> Result<MessageRecord, SendError> {
        let handle = self.live_handle(ticket_id).ok_or(SendError::NotMember)?;
        let (resp, resp_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(RoomCmd::Send {
                connection_id,
                body,
                attachments,
                resp,
            })
            .map_err(|_| SendError::RoomClosed)?;
        resp_rx.await.map_err(|_| SendError::RoomClosed)?
    }

    /// Best-effort typing signals; dropped for absent rooms
    pub fn typing_start(&self, ticket_id: &str, connection_id: Uuid) {
        if let Some(handle) = self.live_handle(ticket_id) {
            let _ = handle.cmd_tx.send(RoomCmd::TypingStart { connection_id });
        }
    }

    pub fn typing_stop(&self, ticket_id: &str, connection_id: Uuid) {
        if let Some(handle) = self.live_handle(ticket_id) {
            let _ = handle.cmd_tx.send(RoomCmd::TypingStop { connection_id });
        }
    }

    /// Distinct actors currently joined; empty for absent rooms
    pub async fn members(&self, ticket_id: &str) -> Vec<ActorInfo> {
        let Some(handle) = self.live_handle(ticket_id) else {
            return Vec::new();
        };
        let (resp, resp_rx) = oneshot::channel();
        if handle.cmd_tx.send(RoomCmd::Members { resp }).is_err() {
            return Vec::new();
        }
        resp_rx.await.unwrap_or_default()
    }

    /// Number of rooms with a live actor
    pub fn room_count(&self) -> usize {
        self.rooms
            .iter()
            .filter(|entry| !entry.value().cmd_tx.is_closed())
            .count()
    }
}
