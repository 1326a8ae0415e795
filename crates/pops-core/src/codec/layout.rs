//! Byte layout of the parameter file.
//!
//! All numeric fields use the host's native byte order.

use pops_model::Slot;

/// Bytes per identity sub-record.
pub const IDENTITY_WIDTH: u64 = 20;
/// Bytes of the task name at the start of an identity sub-record.
pub const NAME_WIDTH: usize = 8;
/// Offset of the return code inside an identity sub-record.
pub const RETURN_CODE_OFFSET: u64 = 8;
/// Return code a task has not overwritten yet.
pub const RETURN_CODE_PENDING: i32 = -999;

/// Start of the first workspace sub-record.
pub const WORKSPACE_BASE: u64 = 1024;
/// Bytes per workspace sub-record.
pub const WORKSPACE_WIDTH: u64 = 4096;
/// Bytes of the fixed header in front of the adverbs.
pub const HEADER_WIDTH: usize = 40;
/// Room left for adverbs in one workspace.
pub const ADVERB_CAPACITY: usize = WORKSPACE_WIDTH as usize - HEADER_WIDTH;

pub fn identity_offset(slot: Slot) -> u64 {
    slot.index() as u64 * IDENTITY_WIDTH
}

pub fn return_code_offset(slot: Slot) -> u64 {
    identity_offset(slot) + RETURN_CODE_OFFSET
}

pub fn workspace_offset(slot: Slot) -> u64 {
    WORKSPACE_BASE + slot.index() as u64 * WORKSPACE_WIDTH
}

/// First adverb byte of `slot`'s workspace.
pub fn adverb_offset(slot: Slot) -> u64 {
    workspace_offset(slot) + HEADER_WIDTH as u64
}

/// Size of a parameter file holding `slots` workspaces.
pub fn file_len(slots: u32) -> u64 {
    WORKSPACE_BASE + slots as u64 * WORKSPACE_WIDTH
}

/// Per-run values written in front of a task's adverbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspaceHeader {
    pub userno: i32,
    pub msgkill: i32,
    pub isbatch: i32,
}

impl WorkspaceHeader {
    pub fn new(userno: i32, msgkill: i32, isbatch: i32) -> Self {
        Self {
            userno,
            msgkill,
            isbatch,
        }
    }

    /// `userno, 0, 0, msgkill, isbatch, 0, 0, 0` as i32, `1.0` as f32,
    /// then four spaces.
    pub fn to_bytes(&self) -> [u8; HEADER_WIDTH] {
        let words = [self.userno, 0, 0, self.msgkill, self.isbatch, 0, 0, 0];

        let mut out = [0u8; HEADER_WIDTH];
        for (chunk, w) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&w.to_ne_bytes());
        }
        out[32..36].copy_from_slice(&1.0f32.to_ne_bytes());
        out[36..40].copy_from_slice(b"    ");
        out
    }
}

/// Identity sub-record: padded upper-case name, pending return code, two
/// reserved zeros.
pub fn identity_bytes(name: &str) -> Option<[u8; IDENTITY_WIDTH as usize]> {
    let name = name.to_ascii_uppercase();
    if name.len() > NAME_WIDTH || !name.is_ascii() {
        return None;
    }

    let mut out = [0u8; IDENTITY_WIDTH as usize];
    out[..NAME_WIDTH].fill(b' ');
    out[..name.len()].copy_from_slice(name.as_bytes());
    out[8..12].copy_from_slice(&RETURN_CODE_PENDING.to_ne_bytes());
    Some(out)
}
