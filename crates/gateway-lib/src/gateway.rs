// ============================
// crates/gateway-lib/src/gateway.rs
// ============================
//! Chat gateway: the per-connection protocol state machine.
//!
//! One `ChatGateway` exists per transport session. It owns the
//! unauthenticated -> authenticated transition (tracked in the
//! connection registry, never cached here), validates and routes every
//! inbound event, and maps failures onto the per-operation `*_error`
//! events. All error events go to the originating connection only;
//! nothing here is fatal to the process.

use crate::room_actor::{OutboundSender, SendError};
use crate::validation;
use crate::AppState;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ticketchat_common::{
    ActorInfo, Attachment, AttachmentUpload, ClientEvent, ServerEvent,
};
use tokio::time::timeout;
use uuid::Uuid;

pub struct ChatGateway {
    state: AppState,
    connection_id: Uuid,
    outbound: OutboundSender,
}

impl ChatGateway {
    /// Register a freshly accepted connection with the registry
    pub fn register(state: AppState, outbound: OutboundSender) -> Self {
        let connection_id = state.registry.register();
        Self {
            state,
            connection_id,
            outbound,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Route one inbound event. The return value is the direct reply to
    /// the caller (room broadcasts travel through the room actor); `None`
    /// means the operation has no direct reply.
    pub async fn handle_event(&self, event: ClientEvent) -> Option<ServerEvent> {
        match event {
            ClientEvent::Authenticate { token } => self.handle_authenticate(&token).await,
            ClientEvent::JoinTicket { ticket_id } => self.handle_join(&ticket_id).await,
            ClientEvent::LeaveTicket { ticket_id } => self.handle_leave(&ticket_id).await,
            ClientEvent::GetMessages { ticket_id } => self.handle_get_messages(&ticket_id).await,
            ClientEvent::SendMessage {
                ticket_id,
                message,
                attachments,
            } => self.handle_send(&ticket_id, message, attachments).await,
            ClientEvent::TypingStart { ticket_id } => {
                self.handle_typing(&ticket_id, true);
                None
            },
            ClientEvent::TypingStop { ticket_id } => {
                self.handle_typing(&ticket_id, false);
                None
            },
            ClientEvent::GetOnlineUsers { ticket_id } => {
                self.handle_get_online_users(&ticket_id).await
            },
        }
    }

    /// Run cleanup after the transport dropped: leave every joined room
    /// (which force-expires typing entries) and forget the connection.
    pub async fn on_disconnect(&self) {
        let joined = self.state.registry.unregister(self.connection_id);
        for ticket_id in joined {
            self.state.rooms.leave(&ticket_id, self.connection_id).await;
        }
        self.state.auth_limiter.forget(self.connection_id);
    }

    fn authenticated_actor(&self) -> Option<ActorInfo> {
        self.state.registry.actor_of(self.connection_id)
    }

    async fn handle_authenticate(&self, token: &str) -> Option<ServerEvent> {
        if !self.state.auth_limiter.check_rate_limit(self.connection_id) {
            return Some(ServerEvent::AuthenticationError {
                message: "Too many authentication attempts, please try again later".to_string(),
            });
        }

        if let Err(e) = validation::validate_token(token) {
            return Some(ServerEvent::AuthenticationError {
                message: e.to_string(),
            });
        }

        let verified = match timeout(
            self.state.settings.verify_timeout(),
            self.state.verifier.verify(token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(connection_id = %self.connection_id,
                    "identity verifier timed out");
                // A dependency failure is not a bad credential; it does
                // not count towards the lockout
                return Some(ServerEvent::AuthenticationError {
                    message: "Authentication service unavailable, please retry".to_string(),
                });
            },
        };

        match verified {
            Ok(actor) => {
                self.state.auth_limiter.record_success(self.connection_id);
                // Set-once: a re-authentication after reconnect echoes
                // the already attached actor
                match self.state.registry.set_authenticated(self.connection_id, actor) {
                    Some(user) => Some(ServerEvent::Authenticated { user }),
                    // Connection raced its own disconnect; nobody is
                    // listening for the reply
                    None => None,
                }
            },
            Err(e) => {
                metrics::counter!(crate::metrics::AUTH_FAILED).increment(1);
                self.state
                    .auth_limiter
                    .record_failed_attempt(self.connection_id);
                tracing::info!(connection_id = %self.connection_id, error = %e,
                    "authentication rejected");
                Some(ServerEvent::AuthenticationError {
                    message: e.sanitized_message(),
                })
            },
        }
    }

    async fn handle_join(&self, ticket_id: &str) -> Option<ServerEvent> {
        let Some(actor) = self.authenticated_actor() else {
            return Some(ServerEvent::JoinTicketError {
                message: "not authenticated".to_string(),
            });
        };

        if let Err(e) = validation::validate_ticket_id(ticket_id) {
            return Some(ServerEvent::JoinTicketError {
                message: e.to_string(),
            });
        }

        let permitted = match timeout(
            self.state.settings.verify_timeout(),
            self.state.access.can_access(&actor.id, actor.role, ticket_id),
        )
        .await
        {
            Ok(Ok(permitted)) => permitted,
            Ok(Err(e)) => {
                tracing::error!(ticket_id, error = %e, "ticket access check failed");
                return Some(ServerEvent::JoinTicketError {
                    message: "Authorization service unavailable, please retry".to_string(),
                });
            },
            Err(_) => {
                tracing::error!(ticket_id, "ticket access check timed out");
                return Some(ServerEvent::JoinTicketError {
                    message: "Authorization service unavailable, please retry".to_string(),
                });
            },
        };

        if !permitted {
            return Some(ServerEvent::JoinTicketError {
                message: "not permitted to access this ticket".to_string(),
            });
        }

        match self
            .state
            .rooms
            .join(ticket_id, self.connection_id, actor, self.outbound.clone())
            .await
        {
            Ok(newly_joined) => {
                self.state.registry.mark_joined(self.connection_id, ticket_id);
                if newly_joined {
                    metrics::counter!(crate::metrics::TICKET_JOINED).increment(1);
                }
                Some(ServerEvent::JoinedTicket {
                    ticket_id: ticket_id.to_string(),
                })
            },
            Err(e) => {
                tracing::error!(ticket_id, error = %e, "room join failed");
                Some(ServerEvent::JoinTicketError {
                    message: e.sanitized_message(),
                })
            },
        }
    }

    async fn handle_leave(&self, ticket_id: &str) -> Option<ServerEvent> {
        // No-op when not a member; the ack is sent either way
        self.state.rooms.leave(ticket_id, self.connection_id).await;
        self.state.registry.mark_left(self.connection_id, ticket_id);
        Some(ServerEvent::LeftTicket {
            ticket_id: ticket_id.to_string(),
        })
    }

    async fn handle_get_messages(&self, ticket_id: &str) -> Option<ServerEvent> {
        // Join-before-read
        if !self.state.registry.is_member(self.connection_id, ticket_id) {
            return Some(ServerEvent::MessagesError {
                message: "join the ticket before reading messages".to_string(),
            });
        }

        let limit = self.state.settings.history_limit;
        match timeout(
            self.state.settings.store_timeout(),
            self.state.store.list_by_ticket(ticket_id, limit),
        )
        .await
        {
            Ok(Ok(messages)) => Some(ServerEvent::MessagesLoaded {
                ticket_id: ticket_id.to_string(),
                messages,
            }),
            Ok(Err(e)) => {
                tracing::error!(ticket_id, error = %e, "history read failed");
                Some(ServerEvent::MessagesError {
                    message: "Message store unavailable, please retry".to_string(),
                })
            },
            Err(_) => {
                tracing::error!(ticket_id, "history read timed out");
                Some(ServerEvent::MessagesError {
                    message: "Message store unavailable, please retry".to_string(),
                })
            },
        }
    }

    async fn handle_send(
        &self,
        ticket_id: &str,
        body: String,
        uploads: Vec<AttachmentUpload>,
    ) -> Option<ServerEvent> {
        if self.authenticated_actor().is_none() {
            return Some(ServerEvent::SendMessageError {
                message: "not authenticated".to_string(),
            });
        }

        if body.trim().is_empty() && uploads.is_empty() {
            return Some(ServerEvent::SendMessageError {
                message: "empty message".to_string(),
            });
        }

        if let Err(e) = validation::validate_body(&body, self.state.settings.max_body_chars) {
            return Some(ServerEvent::SendMessageError {
                message: e.to_string(),
            });
        }

        if uploads.len() > self.state.settings.max_attachments {
            return Some(ServerEvent::SendMessageError {
                message: format!(
                    "a message can carry at most {} attachments",
                    self.state.settings.max_attachments
                ),
            });
        }

        let attachments = match self.store_attachments(uploads).await {
            Ok(attachments) => attachments,
            Err(message) => return Some(ServerEvent::SendMessageError { message }),
        };

        match self
            .state
            .rooms
            .send_message(ticket_id, self.connection_id, body, attachments)
            .await
        {
            // The sender reconciles by the broadcast echo
            Ok(_record) => None,
            Err(SendError::NotMember) => Some(ServerEvent::SendMessageError {
                message: "join the ticket before sending messages".to_string(),
            }),
            Err(e @ (SendError::Store(_) | SendError::RoomClosed)) => {
                tracing::error!(ticket_id, error = %e, "send failed");
                Some(ServerEvent::SendMessageError {
                    message: "Message store unavailable, please retry".to_string(),
                })
            },
        }
    }

    /// Decode and persist uploads, returning stored metadata. Any failure
    /// aborts the whole send; nothing is broadcast.
    async fn store_attachments(
        &self,
        uploads: Vec<AttachmentUpload>,
    ) -> Result<Vec<Attachment>, String> {
        let ceiling = self.state.settings.max_attachment_bytes;
        let mut attachments = Vec::with_capacity(uploads.len());

        for upload in uploads {
            validation::validate_attachment_upload(&upload).map_err(|e| e.to_string())?;

            let bytes = BASE64
                .decode(upload.data.as_bytes())
                .map_err(|_| format!("attachment {} is not valid base64", upload.name))?;

            // Ceiling is inclusive: exactly `ceiling` bytes passes
            if bytes.len() as u64 > ceiling {
                return Err("attachment too large".to_string());
            }

            let stored = timeout(
                self.state.settings.store_timeout(),
                self.state.blobs.store(&bytes, &upload.name, &upload.mime_type),
            )
            .await;
            let storage_ref = match stored {
                Ok(Ok(storage_ref)) => storage_ref,
                Ok(Err(e)) => {
                    tracing::error!(name = %upload.name, error = %e, "blob write failed");
                    return Err("Attachment storage unavailable, please retry".to_string());
                },
                Err(_) => {
                    tracing::error!(name = %upload.name, "blob write timed out");
                    return Err("Attachment storage unavailable, please retry".to_string());
                },
            };

            attachments.push(Attachment {
                name: upload.name,
                mime_type: upload.mime_type,
                size_bytes: bytes.len() as u64,
                storage_ref,
            });
        }

        Ok(attachments)
    }

    fn handle_typing(&self, ticket_id: &str, started: bool) {
        // Typing is best-effort: non-members and the unauthenticated are
        // silently ignored, never an error
        if !self.state.registry.is_member(self.connection_id, ticket_id) {
            return;
        }
        if started {
            self.state.rooms.typing_start(ticket_id, self.connection_id);
        } else {
            self.state.rooms.typing_stop(ticket_id, self.connection_id);
        }
    }

    async fn handle_get_online_users(&self, ticket_id: &str) -> Option<ServerEvent> {
        if self.authenticated_actor().is_none() {
            return Some(ServerEvent::ProtocolError {
                message: "not authenticated".to_string(),
            });
        }

        let users = self.state.rooms.members(ticket_id).await;
        Some(ServerEvent::OnlineUsers {
            ticket_id: ticket_id.to_string(),
            users,
        })
    }
}
