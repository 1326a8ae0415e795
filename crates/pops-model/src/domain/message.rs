use serde::{Deserialize, Serialize};

/// Priority carried in the tag of a message-store record.
///
/// Values above the known levels are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u32);

impl Priority {
    pub const INFO: Priority = Priority(0);
    pub const WARNING: Priority = Priority(2);
    pub const ERROR: Priority = Priority(8);

    #[inline]
    pub fn is_error(&self) -> bool {
        self.0 >= Self::ERROR.0
    }
}

/// One formatted line of task progress text, either from the message store
/// or from the task's terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub priority: Priority,
    pub text: String,
}

impl Message {
    pub fn new(priority: Priority, text: impl Into<String>) -> Self {
        Self {
            priority,
            text: text.into(),
        }
    }
}
