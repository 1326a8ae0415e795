//! Shared message store and per-slot read cursors.
//!
//! The store is a single append-only file: an `i32` counter at offset 0
//! holding the number of records written, then 100-byte records packed ten
//! to a 1024-byte block starting at offset 1024. Every running task appends
//! to the same store; a [`MessageChannel`] picks out the records of one slot.

mod record;
pub use record::{LABEL_WIDTH, MessageRecord, RECORD_WIDTH, TEXT_WIDTH, pack_tag};

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use pops_model::{Message, Priority, Slot};
use tracing::{debug, trace};

use crate::error::{CoreError, CoreResult};

/// Start of the first record block.
pub const RECORD_BASE: u64 = 1024;
pub const BLOCK_WIDTH: u64 = 1024;
pub const RECORDS_PER_BLOCK: u64 = 10;
/// Offset of the first record inside a block.
pub const BLOCK_HEADER: u64 = 8;

pub fn record_offset(index: u32) -> u64 {
    let i = index as u64;
    RECORD_BASE + (i / RECORDS_PER_BLOCK) * BLOCK_WIDTH + BLOCK_HEADER + (i % RECORDS_PER_BLOCK) * RECORD_WIDTH as u64
}

#[derive(Debug, Clone)]
pub struct MessageStore {
    path: PathBuf,
}

impl MessageStore {
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(CoreError::File {
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no message store"),
                path,
            });
        }
        Ok(Self { path })
    }

    /// Create an empty store; an existing one is kept as is.
    pub fn create(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(CoreError::file(&path))?;
        let len = file.metadata().map_err(CoreError::file(&path))?.len();
        if len < RECORD_BASE {
            file.set_len(RECORD_BASE).map_err(CoreError::file(&path))?;
            debug!(target: "pops.core.message", path = %path.display(), "message store created");
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written so far.
    pub fn counter(&self) -> CoreResult<u32> {
        let mut file = self.open_read()?;
        self.read_counter(&mut file)
    }

    pub fn read(&self, index: u32) -> CoreResult<MessageRecord> {
        let mut file = self.open_read()?;
        self.read_record(&mut file, index)
    }

    /// Records `from..to` with their indices, read through one descriptor.
    pub fn read_range(&self, from: u32, to: u32) -> CoreResult<Vec<(u32, MessageRecord)>> {
        if from >= to {
            return Ok(Vec::new());
        }
        let mut file = self.open_read()?;
        (from..to)
            .map(|i| self.read_record(&mut file, i).map(|r| (i, r)))
            .collect()
    }

    /// Write a record at the counter position and bump the counter.
    ///
    /// Appends from concurrent writers are not serialised against each
    /// other; the coordinating layer only appends for slots it holds.
    pub fn append(&self, slot: Slot, priority: Priority, label: &str, text: &str) -> CoreResult<u32> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(CoreError::file(&self.path))?;
        let index = self.read_counter(&mut file)?;

        let record = MessageRecord::new(slot, priority, label, text);
        file.seek(SeekFrom::Start(record_offset(index)))
            .and_then(|_| file.write_all(&record.to_bytes()))
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(&(index as i32 + 1).to_ne_bytes()))
            .map_err(CoreError::file(&self.path))?;

        trace!(target: "pops.core.message", %slot, index, "message appended");
        Ok(index)
    }

    fn open_read(&self) -> CoreResult<File> {
        File::open(&self.path).map_err(CoreError::file(&self.path))
    }

    fn read_counter(&self, file: &mut File) -> CoreResult<u32> {
        let mut word = [0u8; 4];
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_exact(&mut word))
            .map_err(CoreError::file(&self.path))?;
        Ok(i32::from_ne_bytes(word).max(0) as u32)
    }

    fn read_record(&self, file: &mut File, index: u32) -> CoreResult<MessageRecord> {
        let mut raw = [0u8; RECORD_WIDTH];
        file.seek(SeekFrom::Start(record_offset(index)))
            .and_then(|_| file.read_exact(&mut raw))
            .map_err(CoreError::file(&self.path))?;
        Ok(MessageRecord::from_bytes(&raw))
    }
}

/// Read cursor of one slot into a [`MessageStore`].
///
/// The cursor is the index of the next record to look at. Each poll covers
/// every record written since the previous one and moves the cursor to the
/// counter, whether or not any record matched.
#[derive(Debug, Clone)]
pub struct MessageChannel {
    store: MessageStore,
    slot: Slot,
    cursor: u32,
}

impl MessageChannel {
    pub fn new(store: MessageStore, slot: Slot, cursor: u32) -> Self {
        Self {
            store,
            slot,
            cursor,
        }
    }

    /// Channel that only sees records written from now on.
    pub fn from_now(store: MessageStore, slot: Slot) -> CoreResult<Self> {
        let cursor = store.counter()?;
        Ok(Self::new(store, slot, cursor))
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Formatted records of this slot written since the last poll, in store
    /// order.
    pub fn poll(&mut self) -> CoreResult<Vec<Message>> {
        let counter = self.store.counter()?;
        if counter <= self.cursor {
            return Ok(Vec::new());
        }

        let records = self.store.read_range(self.cursor, counter)?;
        self.cursor = counter;

        let out: Vec<Message> = records
            .into_iter()
            .filter(|(_, r)| r.belongs_to(self.slot))
            .map(|(_, r)| Message::new(r.priority(), r.format(self.slot)))
            .collect();
        trace!(target: "pops.core.message", slot = %self.slot, cursor = self.cursor, matched = out.len(), "channel polled");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: u32) -> Slot {
        Slot::new(n).unwrap()
    }

    fn store() -> (tempfile::TempDir, MessageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::create(dir.path().join("MSD001000.000;")).unwrap();
        (dir, store)
    }

    #[test]
    fn record_packing() {
        assert_eq!(record_offset(0), 1024 + 8);
        assert_eq!(record_offset(9), 1024 + 8 + 900);
        assert_eq!(record_offset(10), 2048 + 8);
        assert_eq!(record_offset(23), 1024 + 2 * 1024 + 8 + 300);
    }

    #[test]
    fn append_bumps_counter() {
        let (_dir, store) = store();
        assert_eq!(store.counter().unwrap(), 0);
        assert_eq!(store.append(slot(1), Priority::INFO, "AIPS", "one").unwrap(), 0);
        assert_eq!(store.append(slot(2), Priority::INFO, "AIPS", "two").unwrap(), 1);
        assert_eq!(store.counter().unwrap(), 2);
        assert_eq!(store.read(1).unwrap().text, "two");
    }

    #[test]
    fn create_keeps_existing_store() {
        let (_dir, store) = store();
        store.append(slot(1), Priority::INFO, "AIPS", "kept").unwrap();
        let again = MessageStore::create(store.path()).unwrap();
        assert_eq!(again.counter().unwrap(), 1);
    }

    #[test]
    fn channel_filters_by_slot() {
        let (_dir, store) = store();
        let mut a = MessageChannel::from_now(store.clone(), slot(1)).unwrap();
        let mut b = MessageChannel::from_now(store.clone(), slot(2)).unwrap();

        for i in 0..25 {
            let s = if i % 3 == 0 { slot(2) } else { slot(1) };
            store.append(s, Priority::INFO, "TASK", &format!("m{i}")).unwrap();
        }

        let got_a: Vec<String> = a.poll().unwrap().into_iter().map(|m| m.text).collect();
        let got_b: Vec<String> = b.poll().unwrap().into_iter().map(|m| m.text).collect();

        let want_a: Vec<String> = (0..25).filter(|i| i % 3 != 0).map(|i| format!("TASK 1: m{i}")).collect();
        let want_b: Vec<String> = (0..25).filter(|i| i % 3 == 0).map(|i| format!("TASK 2: m{i}")).collect();
        assert_eq!(got_a, want_a);
        assert_eq!(got_b, want_b);
    }

    #[test]
    fn channel_never_repeats() {
        let (_dir, store) = store();
        store.append(slot(1), Priority::INFO, "OLD", "before").unwrap();

        let mut ch = MessageChannel::from_now(store.clone(), slot(1)).unwrap();
        assert_eq!(ch.cursor(), 1);
        assert!(ch.poll().unwrap().is_empty());

        store.append(slot(1), Priority::WARNING, "IMEAN", "first").unwrap();
        let first = ch.poll().unwrap();
        assert_eq!(first, vec![Message::new(Priority::WARNING, "IMEAN1: first")]);
        assert!(ch.poll().unwrap().is_empty());

        store.append(slot(3), Priority::INFO, "X", "other").unwrap();
        store.append(slot(1), Priority::INFO, "IMEAN", "second").unwrap();
        let second = ch.poll().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].text, "IMEAN1: second");
        assert_eq!(ch.cursor(), 4);
    }

    #[test]
    fn open_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MessageStore::open(dir.path().join("none")).is_err());
    }
}
