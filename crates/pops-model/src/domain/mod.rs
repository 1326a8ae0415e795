mod ehex;
pub use ehex::{EHEX_DIGITS, ehex, ehex_digit};

mod slot;
pub use slot::{MAX_SLOTS, Slot};

mod value;
pub use value::Value;

mod message;
pub use message::{Message, Priority};

mod session_state;
pub use session_state::SessionState;

mod task_env;
pub use task_env::TaskEnv;

/// Name of a task adverb (input or output parameter).
pub type AdverbName = String;

/// Adverb values keyed by adverb name.
pub type Inputs = std::collections::BTreeMap<AdverbName, Value>;

/// Decoded output adverbs keyed by adverb name.
pub type Outputs = std::collections::BTreeMap<AdverbName, Value>;
