// ==============
// crates/gateway-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_ACTIVE: &str = "ws.active";
pub const TICKET_JOINED: &str = "ticket.joined";
pub const MESSAGE_PERSISTED: &str = "message.persisted";
pub const AUTH_FAILED: &str = "auth.failed";
