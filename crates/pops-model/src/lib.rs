//! Plain data types shared by the POPS task execution crates.
//!
//! Nothing in here touches the filesystem or spawns processes; the types are
//! cheap to clone and serde-friendly so that schemas and inputs can be cached
//! or shipped across a call boundary as-is.

mod error;
pub use error::ModelError;

mod domain;
pub use domain::*;

mod kind;
pub use kind::*;

mod schema;
pub use schema::*;

mod config;
pub use config::{PARAMETER_FILE_NAME, PopsConfig, message_file_name};
