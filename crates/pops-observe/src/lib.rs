//! Logger setup for binaries built on the POPS task crates.
//!
//! Library crates only emit `tracing` events under `pops.*` targets; a
//! binary picks the output format once at startup with [`logger_init`].

mod logger;
pub use logger::*;
