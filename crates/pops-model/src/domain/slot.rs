use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ModelError, ehex_digit};

/// Upper bound of the slot pool: one glyph per extended-hex digit after `0`.
pub const MAX_SLOTS: u32 = 35;

/// Exclusive claim on one row of the parameter area and one message channel.
///
/// Slots are numbered from 1; the zero-based row index is [`Slot::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Slot(u32);

impl Slot {
    pub fn new(n: u32) -> Result<Self, ModelError> {
        if (1..=MAX_SLOTS).contains(&n) {
            Ok(Self(n))
        } else {
            Err(ModelError::SlotOutOfRange(n))
        }
    }

    #[inline]
    pub fn number(&self) -> u32 {
        self.0
    }

    /// Zero-based row in the parameter and message areas.
    #[inline]
    pub fn index(&self) -> u32 {
        self.0 - 1
    }

    /// Single-character name used in marker files, spawn tokens and messages.
    #[inline]
    pub fn glyph(&self) -> char {
        // Range is checked in `new`.
        ehex_digit(self.0).unwrap_or('?')
    }

    /// Parse a slot back from its glyph.
    pub fn from_glyph(c: char) -> Option<Self> {
        let n = crate::EHEX_DIGITS
            .iter()
            .position(|d| *d as char == c.to_ascii_uppercase())? as u32;
        Self::new(n).ok()
    }

    /// All slots `1..=max` in allocation order.
    pub fn pool(max: u32) -> impl Iterator<Item = Slot> {
        (1..=max.min(MAX_SLOTS)).map(Slot)
    }
}

impl TryFrom<u32> for Slot {
    type Error = ModelError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        Slot::new(n)
    }
}

impl From<Slot> for u32 {
    fn from(s: Slot) -> Self {
        s.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glyph())
    }
}
