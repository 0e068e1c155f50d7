// ============================
// crates/gateway-lib/src/access.rs
// ============================
//! Ticket ownership checks.
//!
//! The gateway consumes this capability; ticket CRUD and ownership
//! management live in the main application.

use crate::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use ticketchat_common::Role;

#[async_trait]
pub trait TicketAccess: Send + Sync {
    /// May this actor join the ticket's chat room?
    async fn can_access(
        &self,
        actor_id: &str,
        role: Role,
        ticket_id: &str,
    ) -> Result<bool, AppError>;
}

/// In-memory ticket ownership directory.
///
/// Admins may access every ticket; a client only their own. With
/// `claim_unowned` set, the first client to join an unknown ticket
/// becomes its owner (useful for development setups without the main
/// application seeding ownership).
pub struct InMemoryTicketDirectory {
    owners: DashMap<String, String>,
    claim_unowned: bool,
}

impl InMemoryTicketDirectory {
    pub fn new(claim_unowned: bool) -> Self {
        Self {
            owners: DashMap::new(),
            claim_unowned,
        }
    }

    /// Record the owning client of a ticket
    pub fn assign_owner(&self, ticket_id: impl Into<String>, actor_id: impl Into<String>) {
        self.owners.insert(ticket_id.into(), actor_id.into());
    }

    pub fn owner_of(&self, ticket_id: &str) -> Option<String> {
        self.owners.get(ticket_id).map(|entry| entry.clone())
    }
}

#[async_trait]
impl TicketAccess for InMemoryTicketDirectory {
    async fn can_access(
        &self,
        actor_id: &str,
        role: Role,
        ticket_id: &str,
    ) -> Result<bool, AppError> {
        if role == Role::Admin {
            return Ok(true);
        }

        if let Some(owner) = self.owners.get(ticket_id) {
            return Ok(owner.as_str() == actor_id);
        }

        if self.claim_unowned {
            // entry() re-checks under the shard lock so two concurrent
            // claimants cannot both win
            let owner = self
                .owners
                .entry(ticket_id.to_string())
                .or_insert_with(|| actor_id.to_string());
            return Ok(owner.as_str() == actor_id);
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admin_accesses_everything() {
        let dir = InMemoryTicketDirectory::new(false);
        assert!(dir.can_access("staff-1", Role::Admin, "T-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_owner_accesses_own_ticket() {
        let dir = InMemoryTicketDirectory::new(false);
        dir.assign_owner("T-1", "u-1");

        assert!(dir.can_access("u-1", Role::Client, "T-1").await.unwrap());
        assert!(!dir.can_access("u-2", Role::Client, "T-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_ticket_denied_without_claiming() {
        let dir = InMemoryTicketDirectory::new(false);
        assert!(!dir.can_access("u-1", Role::Client, "T-9").await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_unowned() {
        let dir = InMemoryTicketDirectory::new(true);

        assert!(dir.can_access("u-1", Role::Client, "T-9").await.unwrap());
        assert_eq!(dir.owner_of("T-9").as_deref(), Some("u-1"));
        // Second client is now locked out of the claimed ticket
        assert!(!dir.can_access("u-2", Role::Client, "T-9").await.unwrap());
    }
}
