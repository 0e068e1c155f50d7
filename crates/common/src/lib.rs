// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between ticketchat clients and the gateway.
//! This module defines the WebSocket protocol events and supporting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of an authenticated actor
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End customer who owns tickets
    Client,
    /// Support staff; may act on any ticket
    Admin,
}

/// Verified identity attached to a connection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ActorInfo {
    /// Stable actor identifier
    pub id: String,
    /// Display name shown to other room members
    pub name: String,
    /// Actor role
    pub role: Role,
}

/// Attachment as uploaded by a client (bytes still base64-encoded)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AttachmentUpload {
    /// Original file name
    pub name: String,
    /// MIME type reported by the client
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Base64-encoded file contents
    pub data: String,
}

/// Stored attachment metadata; bytes live in the blob store
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Original file name
    pub name: String,
    /// MIME type
    pub mime_type: String,
    /// Decoded size in bytes
    pub size_bytes: u64,
    /// Opaque blob-store reference
    pub storage_ref: String,
}

/// A durable chat message, totally ordered by (`created_at`, `message_id`)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Server-assigned message id
    pub message_id: Uuid,
    /// Ticket this message belongs to
    pub ticket_id: String,
    /// Actor id of the sender
    pub sender_id: String,
    /// Role of the sender at send time
    pub sender_role: Role,
    /// Message text; may be empty when attachments are present
    pub body: String,
    /// Ordered attachment metadata
    pub attachments: Vec<Attachment>,
    /// Server-assigned creation timestamp
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Key for the total per-ticket order
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.message_id)
    }
}

/// Events sent from client to gateway
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Authenticate the connection with an opaque credential
    Authenticate { token: String },
    /// Join the chat room of a ticket
    #[serde(rename_all = "camelCase")]
    JoinTicket { ticket_id: String },
    /// Leave a previously joined room
    #[serde(rename_all = "camelCase")]
    LeaveTicket { ticket_id: String },
    /// Request the ordered message history of a joined room
    #[serde(rename_all = "camelCase")]
    GetMessages { ticket_id: String },
    /// Send a message to a joined room
    #[serde(rename_all = "camelCase")]
    SendMessage {
        ticket_id: String,
        /// Message text; may be empty when attachments are present
        #[serde(default)]
        message: String,
        #[serde(default)]
        attachments: Vec<AttachmentUpload>,
    },
    /// Signal that the actor started composing a message
    #[serde(rename_all = "camelCase")]
    TypingStart { ticket_id: String },
    /// Signal that the actor stopped composing
    #[serde(rename_all = "camelCase")]
    TypingStop { ticket_id: String },
    /// Request the actors currently joined to a room
    #[serde(rename_all = "camelCase")]
    GetOnlineUsers { ticket_id: String },
}

/// Events sent from gateway to client
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Authentication succeeded; echoes the verified identity
    Authenticated { user: ActorInfo },
    /// Authentication failed; the connection stays open for retry
    AuthenticationError { message: String },
    /// Join acknowledged to the caller
    #[serde(rename_all = "camelCase")]
    JoinedTicket { ticket_id: String },
    /// Join refused (unauthenticated or unauthorized)
    JoinTicketError { message: String },
    /// Leave acknowledged to the caller
    #[serde(rename_all = "camelCase")]
    LeftTicket { ticket_id: String },
    /// Broadcast to remaining members when an actor joins
    #[serde(rename_all = "camelCase")]
    UserJoinedTicket {
        ticket_id: String,
        actor_id: String,
        display_name: String,
    },
    /// Broadcast to remaining members when an actor leaves
    #[serde(rename_all = "camelCase")]
    UserLeftTicket {
        ticket_id: String,
        actor_id: String,
        display_name: String,
    },
    /// Ordered history reply
    #[serde(rename_all = "camelCase")]
    MessagesLoaded {
        ticket_id: String,
        messages: Vec<MessageRecord>,
    },
    /// History read failed
    MessagesError { message: String },
    /// Broadcast of a newly persisted message to every room member
    #[serde(rename_all = "camelCase")]
    NewMessage { ticket_id: String, data: MessageRecord },
    /// Send refused or failed; reported to the sender only
    SendMessageError { message: String },
    /// Broadcast while an actor is composing
    #[serde(rename_all = "camelCase")]
    UserTyping {
        ticket_id: String,
        actor_id: String,
        display_name: String,
    },
    /// Broadcast when composing stops (explicit, TTL expiry, or disconnect)
    #[serde(rename_all = "camelCase")]
    UserStoppedTyping {
        ticket_id: String,
        actor_id: String,
        display_name: String,
    },
    /// Reply with the actors currently joined to the room
    #[serde(rename_all = "camelCase")]
    OnlineUsers {
        ticket_id: String,
        users: Vec<ActorInfo>,
    },
    /// The inbound frame could not be parsed or was not permitted
    ProtocolError { message: String },
}
