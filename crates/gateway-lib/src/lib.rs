// ============================
// crates/gateway-lib/src/lib.rs
// ============================
//! Core gateway functionality for the ticketchat real-time chat server.

pub mod access;
pub mod auth;
pub mod blob;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod registry;
pub mod room_actor;
pub mod rooms;
pub mod store;
pub mod validation;
pub mod ws_router;

use crate::access::TicketAccess;
use crate::auth::{AuthRateLimiter, IdentityVerifier};
use crate::blob::BlobStore;
use crate::config::Settings;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomManager;
use crate::store::MessageStore;
use std::sync::Arc;

/// Application state shared across all connections
#[derive(Clone)]
pub struct AppState {
    /// Settings
    pub settings: Arc<Settings>,
    /// Live-connection registry
    pub registry: Arc<ConnectionRegistry>,
    /// Ticket room manager
    pub rooms: Arc<RoomManager>,
    /// Identity verifier collaborator
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Ticket ownership collaborator
    pub access: Arc<dyn TicketAccess>,
    /// Durable message store
    pub store: Arc<dyn MessageStore>,
    /// Attachment blob store
    pub blobs: Arc<dyn BlobStore>,
    /// Failed-authentication limiter
    pub auth_limiter: Arc<AuthRateLimiter>,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        settings: Settings,
        store: Arc<dyn MessageStore>,
        blobs: Arc<dyn BlobStore>,
        verifier: Arc<dyn IdentityVerifier>,
        access: Arc<dyn TicketAccess>,
    ) -> Self {
        let rooms = Arc::new(RoomManager::new(
            store.clone(),
            settings.typing_ttl(),
            settings.store_timeout(),
        ));

        Self {
            settings: Arc::new(settings),
            registry: Arc::new(ConnectionRegistry::new()),
            rooms,
            verifier,
            access,
            store,
            blobs,
            auth_limiter: Arc::new(AuthRateLimiter::default()),
        }
    }
}
