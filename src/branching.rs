//! Version branching for model messages.
//!
//! Every regeneration appends a candidate instead of overwriting, and the
//! single prev/next control doubles as "browse takes" and "another take":
//! stepping past the newest version means the caller should generate a fresh
//! one.

use crate::error::{EngineError, Result};
use crate::types::{Message, Role};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NavigateDirection {
    Prev,
    Next,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NavigateOutcome {
    /// The cursor moved to an existing version.
    Moved,
    /// Already at the oldest version; repeated `Prev` is a no-op.
    AtStart,
    /// `Next` at the newest version: the caller should regenerate.
    NeedsRegeneration,
}

/// Push a new candidate text and select it. Used both for the first settled
/// reply and for every successful regeneration.
pub fn append_version(message: &mut Message, text: String) {
    message.text = text.clone();
    message.versions.push(text);
    message.current_version_index = message.versions.len() - 1;
}

/// Move the version cursor. `Next` past the end asks for a regeneration,
/// unless the cap is already reached, in which case the attempt is rejected
/// with state unchanged.
pub fn navigate(
    message: &mut Message,
    direction: NavigateDirection,
    max_versions: usize,
) -> Result<NavigateOutcome> {
    debug_assert_eq!(message.role, Role::Model);

    match direction {
        NavigateDirection::Prev => {
            if message.current_version_index == 0 {
                return Ok(NavigateOutcome::AtStart);
            }
            message.current_version_index -= 1;
            message.text = message.versions[message.current_version_index].clone();
            Ok(NavigateOutcome::Moved)
        }
        NavigateDirection::Next => {
            if message.current_version_index + 1 < message.versions.len() {
                message.current_version_index += 1;
                message.text = message.versions[message.current_version_index].clone();
                return Ok(NavigateOutcome::Moved);
            }
            if message.versions.len() >= max_versions {
                return Err(EngineError::CapacityReached(max_versions));
            }
            Ok(NavigateOutcome::NeedsRegeneration)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_reply(versions: &[&str]) -> Message {
        let mut msg = Message::model(versions[0]);
        for v in &versions[1..] {
            append_version(&mut msg, v.to_string());
        }
        msg
    }

    #[test]
    fn append_moves_cursor_and_mirrors_text() {
        let mut msg = Message::model("first");
        append_version(&mut msg, "second".into());

        assert_eq!(msg.versions.len(), 2);
        assert_eq!(msg.current_version_index, 1);
        assert_eq!(msg.text, "second");
    }

    #[test]
    fn prev_clamps_at_zero_and_is_idempotent() {
        let mut msg = make_reply(&["a", "b"]);
        assert_eq!(navigate(&mut msg, NavigateDirection::Prev, 100).unwrap(), NavigateOutcome::Moved);
        assert_eq!(msg.current_version_index, 0);
        assert_eq!(msg.text, "a");

        for _ in 0..3 {
            assert_eq!(
                navigate(&mut msg, NavigateDirection::Prev, 100).unwrap(),
                NavigateOutcome::AtStart
            );
            assert_eq!(msg.current_version_index, 0);
        }
    }

    #[test]
    fn next_walks_forward_then_requests_regeneration() {
        let mut msg = make_reply(&["a", "b"]);
        msg.current_version_index = 0;
        msg.text = "a".into();

        assert_eq!(navigate(&mut msg, NavigateDirection::Next, 100).unwrap(), NavigateOutcome::Moved);
        assert_eq!(msg.text, "b");
        assert_eq!(
            navigate(&mut msg, NavigateDirection::Next, 100).unwrap(),
            NavigateOutcome::NeedsRegeneration
        );
        // cursor untouched by the regeneration request itself
        assert_eq!(msg.current_version_index, 1);
    }

    #[test]
    fn next_at_cap_is_rejected_with_state_unchanged() {
        let mut msg = Message::model("v0");
        for i in 1..100 {
            append_version(&mut msg, format!("v{}", i));
        }
        assert_eq!(msg.versions.len(), 100);

        let before_index = msg.current_version_index;
        let before_text = msg.text.clone();
        let err = navigate(&mut msg, NavigateDirection::Next, 100).unwrap_err();
        assert!(matches!(err, EngineError::CapacityReached(100)));
        assert_eq!(msg.current_version_index, before_index);
        assert_eq!(msg.text, before_text);
        assert_eq!(msg.versions.len(), 100);
    }
}
