mod adverb;
pub use adverb::{AdverbSpec, AdverbType, ValueRange};

mod task;
pub use task::{TaskSchema, TaskSchemaBuilder};
