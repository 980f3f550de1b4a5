use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Current time as unix epoch milliseconds. Falls back to 0 on a clock
/// set before the epoch rather than failing a chat turn over it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
