// ============================
// crates/gateway-lib/src/registry.rs
// ============================
//! Connection registry: the single source of truth for per-connection
//! authentication state and room membership bookkeeping.

use dashmap::DashMap;
use std::collections::HashSet;
use ticketchat_common::ActorInfo;
use uuid::Uuid;

/// One live transport session
#[derive(Debug, Clone)]
pub struct Connection {
    /// Verified identity; `None` until a successful authenticate
    pub actor: Option<ActorInfo>,
    /// Tickets this connection has joined
    pub joined: HashSet<String>,
}

/// Registry of live connections
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted transport session
    pub fn register(&self) -> Uuid {
        let connection_id = Uuid::new_v4();
        self.connections.insert(
            connection_id,
            Connection {
                actor: None,
                joined: HashSet::new(),
            },
        );
        connection_id
    }

    /// Attach a verified actor to a connection.
    ///
    /// The actor is set exactly once; a repeat call (client retry after
    /// reconnect) is an idempotent success returning the existing actor.
    /// Returns `None` if the connection is gone.
    pub fn set_authenticated(&self, connection_id: Uuid, actor: ActorInfo) -> Option<ActorInfo> {
        let mut conn = self.connections.get_mut(&connection_id)?;
        match &conn.actor {
            Some(existing) => Some(existing.clone()),
            None => {
                conn.actor = Some(actor.clone());
                Some(actor)
            },
        }
    }

    /// Verified actor of a connection, if authenticated
    pub fn actor_of(&self, connection_id: Uuid) -> Option<ActorInfo> {
        self.connections
            .get(&connection_id)
            .and_then(|conn| conn.actor.clone())
    }

    /// Record a successful room join
    pub fn mark_joined(&self, connection_id: Uuid, ticket_id: &str) {
        if let Some(mut conn) = self.connections.get_mut(&connection_id) {
            conn.joined.insert(ticket_id.to_string());
        }
    }

    /// Record a room leave
    pub fn mark_left(&self, connection_id: Uuid, ticket_id: &str) {
        if let Some(mut conn) = self.connections.get_mut(&connection_id) {
            conn.joined.remove(ticket_id);
        }
    }

    /// Is the connection currently joined to this ticket's room?
    pub fn is_member(&self, connection_id: Uuid, ticket_id: &str) -> bool {
        self.connections
            .get(&connection_id)
            .map(|conn| conn.joined.contains(ticket_id))
            .unwrap_or(false)
    }

    /// Rooms a connection is currently joined to
    pub fn joined_rooms(&self, connection_id: Uuid) -> Vec<String> {
        self.connections
            .get(&connection_id)
            .map(|conn| conn.joined.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove a connection; returns the rooms it was in so the caller
    /// can drive room cleanup
    pub fn unregister(&self, connection_id: Uuid) -> Vec<String> {
        self.connections
            .remove(&connection_id)
            .map(|(_, conn)| conn.joined.into_iter().collect())
            .unwrap_or_default()
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
