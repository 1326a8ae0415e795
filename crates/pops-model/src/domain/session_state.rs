use serde::{Deserialize, Serialize};

/// Lifecycle of a task session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Constructed, nothing acquired yet.
    Idle,
    /// Slot held, parameter record written, process being started.
    Spawning,
    /// Process started; output and messages are being drained.
    Running,
    /// Process exited and its outputs were collected.
    Completed,
    /// Process was signalled and the session torn down.
    Aborted,
}

impl SessionState {
    /// Returns `true` once the session will not transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }

    /// Returns `true` while a slot is held.
    pub fn holds_slot(&self) -> bool {
        matches!(self, SessionState::Spawning | SessionState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Aborted.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Running.is_terminal());
    }

    #[test]
    fn slot_holding_states() {
        assert!(SessionState::Spawning.holds_slot());
        assert!(SessionState::Running.holds_slot());
        assert!(!SessionState::Idle.holds_slot());
        assert!(!SessionState::Aborted.holds_slot());
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&SessionState::Running).unwrap();
        assert_eq!(json, r#""running""#);
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SessionState::Running);
    }
}
