// ============================
// crates/gateway-lib/src/validation.rs
// ============================
//! Inbound event validation.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use ticketchat_common::AttachmentUpload;

// Common validation constants
const MIN_TICKET_ID_LENGTH: usize = 3;
const MAX_TICKET_ID_LENGTH: usize = 64;
const MAX_TOKEN_LENGTH: usize = 512;
const MAX_ATTACHMENT_NAME_LENGTH: usize = 255;

static TICKET_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").unwrap());
static MIME_TYPE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9!#$&^_.+-]+/[a-zA-Z0-9!#$&^_.+-]+$").unwrap());

/// Possible validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid ticket ID: {0}")]
    InvalidTicketId(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a ticket ID
pub fn validate_ticket_id(ticket_id: &str) -> ValidationResult<&str> {
    if ticket_id.is_empty() {
        return Err(ValidationError::InvalidTicketId(
            "Ticket ID must not be empty".to_string(),
        ));
    }

    if ticket_id.len() < MIN_TICKET_ID_LENGTH || ticket_id.len() > MAX_TICKET_ID_LENGTH {
        return Err(ValidationError::InvalidTicketId(format!(
            "Ticket ID must be between {MIN_TICKET_ID_LENGTH} and {MAX_TICKET_ID_LENGTH} characters"
        )));
    }

    if !TICKET_ID_REGEX.is_match(ticket_id) {
        return Err(ValidationError::InvalidTicketId(
            "Ticket ID must contain only alphanumeric characters and hyphens".to_string(),
        ));
    }

    Ok(ticket_id)
}

/// Validate an authentication credential before handing it to the verifier
pub fn validate_token(token: &str) -> ValidationResult<&str> {
    if token.trim().is_empty() {
        return Err(ValidationError::InvalidToken(
            "Token must not be empty".to_string(),
        ));
    }

    if token.len() > MAX_TOKEN_LENGTH {
        return Err(ValidationError::InvalidToken(format!(
            "Token cannot exceed {MAX_TOKEN_LENGTH} characters"
        )));
    }

    Ok(token)
}

/// Validate a message body against the configured ceiling
pub fn validate_body(body: &str, max_chars: usize) -> ValidationResult<&str> {
    if body.chars().count() > max_chars {
        return Err(ValidationError::InvalidMessage(format!(
            "Message body cannot exceed {max_chars} characters"
        )));
    }
    Ok(body)
}

/// Validate attachment metadata; byte-size limits are checked after decoding
pub fn validate_attachment_upload(upload: &AttachmentUpload) -> ValidationResult<()> {
    if upload.name.trim().is_empty() {
        return Err(ValidationError::InvalidAttachment(
            "Attachment name must not be empty".to_string(),
        ));
    }

    if upload.name.len() > MAX_ATTACHMENT_NAME_LENGTH {
        return Err(ValidationError::InvalidAttachment(format!(
            "Attachment name cannot exceed {MAX_ATTACHMENT_NAME_LENGTH} characters"
        )));
    }

    // Path separators would escape the blob directory naming scheme
    if upload.name.contains('/') || upload.name.contains('\\') {
        return Err(ValidationError::InvalidAttachment(
            "Attachment name contains invalid characters".to_string(),
        ));
    }

    if !MIME_TYPE_REGEX.is_match(&upload.mime_type) {
        return Err(ValidationError::InvalidAttachment(format!(
            "Invalid MIME type: {}",
            upload.mime_type
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ticket_id() {
        assert!(validate_ticket_id("valid-ticket-id").is_ok());
        assert!(validate_ticket_id("T-1042").is_ok());

        assert!(matches!(
            validate_ticket_id(""),
            Err(ValidationError::InvalidTicketId(_))
        ));
        assert!(matches!(
            validate_ticket_id("ab"),
            Err(ValidationError::InvalidTicketId(_))
        ));

        let long_id = "a".repeat(65);
        assert!(matches!(
            validate_ticket_id(&long_id),
            Err(ValidationError::InvalidTicketId(_))
        ));

        assert!(matches!(
            validate_ticket_id("ticket@123"),
            Err(ValidationError::InvalidTicketId(_))
        ));
        assert!(matches!(
            validate_ticket_id("ticket_123"),
            Err(ValidationError::InvalidTicketId(_))
        ));
    }

    #[test]
    fn test_validate_token() {
        assert!(validate_token("some-opaque-credential").is_ok());

        assert!(matches!(
            validate_token(""),
            Err(ValidationError::InvalidToken(_))
        ));
        assert!(matches!(
            validate_token("   "),
            Err(ValidationError::InvalidToken(_))
        ));

        let long_token = "t".repeat(513);
        assert!(matches!(
            validate_token(&long_token),
            Err(ValidationError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_validate_body() {
        assert!(validate_body("hello", 10).is_ok());
        assert!(validate_body("", 10).is_ok());
        assert!(matches!(
            validate_body("hello world", 5),
            Err(ValidationError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_validate_attachment_upload() {
        let valid = AttachmentUpload {
            name: "receipt.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            data: "aGVsbG8=".to_string(),
        };
        assert!(validate_attachment_upload(&valid).is_ok());

        let empty_name = AttachmentUpload {
            name: " ".to_string(),
            ..valid.clone()
        };
        assert!(matches!(
            validate_attachment_upload(&empty_name),
            Err(ValidationError::InvalidAttachment(_))
        ));

        let traversal = AttachmentUpload {
            name: "../../etc/passwd".to_string(),
            ..valid.clone()
        };
        assert!(matches!(
            validate_attachment_upload(&traversal),
            Err(ValidationError::InvalidAttachment(_))
        ));

        let bad_mime = AttachmentUpload {
            mime_type: "not a mime".to_string(),
            ..valid
        };
        assert!(matches!(
            validate_attachment_upload(&bad_mime),
            Err(ValidationError::InvalidAttachment(_))
        ));
    }
}
