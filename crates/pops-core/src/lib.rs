//! Task execution over the shared slot / parameter / message protocol.
//!
//! A [`TaskSession`] claims a slot with [`SlotAllocator`], writes the task's
//! inputs into the [`ParameterFile`], starts the executable on a pty through
//! `pops-exec`, drains console output and the [`MessageStore`] while it
//! runs, then reads the outputs back and frees the slot. [`TaskManager`]
//! puts a handle-keyed API on top of that.

pub mod error;
pub use error::{CoreError, CoreResult};

pub mod slot;
pub use slot::{SlotAllocator, SlotLease};

pub mod codec;
pub use codec::{ParameterFile, WorkspaceHeader};

pub mod message;
pub use message::{MessageChannel, MessageRecord, MessageStore};

pub mod family;

pub mod schema;
pub use schema::{SchemaCache, SchemaSource};

pub mod session;
pub use session::{SessionEvent, TaskRequest, TaskSession};

pub mod manager;
pub use manager::{TaskId, TaskInfo, TaskManager};
