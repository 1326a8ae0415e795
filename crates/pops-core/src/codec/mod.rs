//! Parameter file access.
//!
//! The parameter file holds one identity sub-record and one workspace per
//! slot. Inputs are written before a task starts; the return code and
//! outputs are read back after it exits. Only the slot's holder touches
//! its rows, so no file locking is done here.

mod adverb;
pub use adverb::{add_placeholders, decode, encode, strip_placeholders};

pub mod layout;
pub use layout::{RETURN_CODE_PENDING, WorkspaceHeader};

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use pops_model::{Inputs, Outputs, Slot, TaskSchema};
use tracing::{debug, trace};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct ParameterFile {
    path: PathBuf,
}

impl ParameterFile {
    /// Use an existing parameter file.
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(CoreError::File {
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no parameter file"),
                path,
            });
        }
        Ok(Self { path })
    }

    /// Create a parameter file with room for `slots` workspaces.
    ///
    /// An existing file is kept and only grown if it is too short.
    pub fn create(path: impl Into<PathBuf>, slots: u32) -> CoreResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(CoreError::file(&path))?;

        let want = layout::file_len(slots);
        let have = file.metadata().map_err(CoreError::file(&path))?.len();
        if have < want {
            file.set_len(want).map_err(CoreError::file(&path))?;
            debug!(target: "pops.core.codec", path = %path.display(), len = want, "parameter file sized");
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the identity sub-record, workspace header and encoded inputs
    /// for one run of `schema` in `slot`.
    ///
    /// Inputs are encoded before the file is touched, so a protocol
    /// violation leaves the slot's rows as they were.
    pub fn write_inputs(
        &self,
        slot: Slot,
        schema: &TaskSchema,
        header: &WorkspaceHeader,
        inputs: &Inputs,
    ) -> CoreResult<()> {
        let identity = layout::identity_bytes(&schema.name).ok_or_else(|| {
            CoreError::ProtocolViolation(format!(
                "task name '{}' does not fit {} bytes",
                schema.name,
                layout::NAME_WIDTH
            ))
        })?;
        let mut adverbs = Vec::with_capacity(schema.input_width());
        encode(schema, inputs, &mut adverbs)?;

        let mut file = self.open_rw()?;
        self.write_at(&mut file, layout::identity_offset(slot), &identity)?;

        let mut workspace = Vec::with_capacity(layout::HEADER_WIDTH + adverbs.len());
        workspace.extend_from_slice(&header.to_bytes());
        workspace.extend_from_slice(&adverbs);
        self.write_at(&mut file, layout::workspace_offset(slot), &workspace)?;

        trace!(target: "pops.core.codec", %slot, task = %schema.name, bytes = adverbs.len(), "inputs written");
        Ok(())
    }

    /// Return code the task left in `slot`'s identity sub-record.
    pub fn read_return_code(&self, slot: Slot) -> CoreResult<i32> {
        let mut word = [0u8; 4];
        self.read_at(layout::return_code_offset(slot), &mut word)?;
        Ok(i32::from_ne_bytes(word))
    }

    /// Task name recorded in `slot`'s identity sub-record.
    pub fn read_task_name(&self, slot: Slot) -> CoreResult<String> {
        let mut name = [0u8; layout::NAME_WIDTH];
        self.read_at(layout::identity_offset(slot), &mut name)?;
        Ok(String::from_utf8_lossy(&name).trim_end().to_string())
    }

    /// Decode `schema`'s outputs from `slot`'s workspace.
    pub fn read_outputs(&self, slot: Slot, schema: &TaskSchema) -> CoreResult<Outputs> {
        let mut file = File::open(&self.path).map_err(CoreError::file(&self.path))?;
        file.seek(SeekFrom::Start(layout::adverb_offset(slot)))
            .map_err(CoreError::file(&self.path))?;
        decode(schema, &mut file)
    }

    fn open_rw(&self) -> CoreResult<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(CoreError::file(&self.path))
    }

    fn write_at(&self, file: &mut File, offset: u64, bytes: &[u8]) -> CoreResult<()> {
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(bytes))
            .map_err(CoreError::file(&self.path))
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> CoreResult<()> {
        let mut file = File::open(&self.path).map_err(CoreError::file(&self.path))?;
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(buf))
            .map_err(CoreError::file(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use pops_model::{AdverbType, Value};

    use super::*;

    fn slot(n: u32) -> Slot {
        Slot::new(n).unwrap()
    }

    fn sizes() -> TaskSchema {
        TaskSchema::builder("sizes", "NEW")
            .input("size", AdverbType::list(2, AdverbType::Float))
            .output("status", AdverbType::Float)
            .build()
            .unwrap()
    }

    fn scratch() -> (tempfile::TempDir, ParameterFile) {
        let dir = tempfile::tempdir().unwrap();
        let file = ParameterFile::create(dir.path().join("TDD000004;"), 35).unwrap();
        (dir, file)
    }

    #[test]
    fn create_sizes_and_keeps_existing() {
        let (_dir, file) = scratch();
        assert_eq!(std::fs::metadata(file.path()).unwrap().len(), 1024 + 35 * 4096);

        let again = ParameterFile::create(file.path(), 2).unwrap();
        assert_eq!(std::fs::metadata(again.path()).unwrap().len(), 1024 + 35 * 4096);
    }

    #[test]
    fn open_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ParameterFile::open(dir.path().join("missing")),
            Err(CoreError::File { .. })
        ));
    }

    #[test]
    fn inputs_land_in_slot_rows() {
        let (_dir, file) = scratch();
        let s = slot(3);
        let inputs: Inputs = [("size".to_string(), Value::from(vec![512.0f32, 512.0]))].into();
        file.write_inputs(s, &sizes(), &WorkspaceHeader::new(7, 0, 32000), &inputs)
            .unwrap();

        assert_eq!(file.read_task_name(s).unwrap(), "SIZES");
        assert_eq!(file.read_return_code(s).unwrap(), RETURN_CODE_PENDING);

        let raw = std::fs::read(file.path()).unwrap();
        let ws = layout::workspace_offset(s) as usize;
        assert_eq!(&raw[ws..ws + 4], &7i32.to_ne_bytes());
        let adv = layout::adverb_offset(s) as usize;
        assert_eq!(&raw[adv..adv + 4], &512.0f32.to_ne_bytes());
        assert_eq!(&raw[adv + 4..adv + 8], &512.0f32.to_ne_bytes());
        // Neighbouring rows stay untouched.
        assert!(raw[..layout::identity_offset(s) as usize].iter().all(|b| *b == 0));
    }

    #[test]
    fn outputs_read_from_workspace_start() {
        let (_dir, file) = scratch();
        let s = slot(1);
        let mut raw = std::fs::read(file.path()).unwrap();
        let adv = layout::adverb_offset(s) as usize;
        raw[adv..adv + 4].copy_from_slice(&1.0f32.to_ne_bytes());
        std::fs::write(file.path(), &raw).unwrap();

        let out = file.read_outputs(s, &sizes()).unwrap();
        assert_eq!(out["status"], Value::Float(1.0));
    }

    #[test]
    fn violation_leaves_file_untouched() {
        let (_dir, file) = scratch();
        let before = std::fs::read(file.path()).unwrap();
        let inputs: Inputs = [("size".to_string(), Value::from("x"))].into();
        let err = file
            .write_inputs(slot(1), &sizes(), &WorkspaceHeader::new(1, 0, 0), &inputs)
            .unwrap_err();
        assert!(matches!(err, CoreError::ProtocolViolation(_)));
        assert_eq!(std::fs::read(file.path()).unwrap(), before);
    }

    #[test]
    fn long_task_name_is_rejected() {
        let (_dir, file) = scratch();
        let schema = TaskSchema::builder("VERYLONGNAME", "NEW").build().unwrap();
        let err = file
            .write_inputs(slot(1), &schema, &WorkspaceHeader::new(1, 0, 0), &Inputs::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::ProtocolViolation(_)));
    }
}
