//! Request id generation for log correlation.

use uuid::Uuid;

/// Generate a new request id (UUID v4). Only recorded on spans.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
