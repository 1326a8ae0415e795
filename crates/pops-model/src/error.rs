use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("slot {0} is outside the pool range 1..={max}", max = crate::MAX_SLOTS)]
    SlotOutOfRange(u32),

    #[error("adverb '{0}' is declared more than once")]
    DuplicateAdverb(String),

    #[error("default for adverb '{adverb}' does not match its declared type")]
    DefaultShape { adverb: String },

    #[error("adverb '{0}' is not declared in the schema")]
    UnknownAdverb(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
