#![allow(dead_code)]

use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use pops_core::{MessageStore, ParameterFile, SchemaCache, SlotAllocator};
use pops_model::{AdverbType, PopsConfig, TaskSchema};

pub const VERSION: &str = "31DEC24";
pub const ARCH: &str = "LNX64";
pub const USERNO: u32 = 7;

/// Scratch install: load directory, data areas and lock directory.
pub struct Sandbox {
    pub dir: tempfile::TempDir,
    pub cfg: PopsConfig,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("aips");
        let da00 = dir.path().join("DA00");
        let da01 = dir.path().join("DA01");
        let locks = dir.path().join("locks");
        for d in [&root.join(VERSION).join(ARCH).join("LOAD"), &da00, &da01, &locks] {
            std::fs::create_dir_all(d).unwrap();
        }

        let mut cfg = PopsConfig::default()
            .with_aips_root(&root, ARCH)
            .with_data_dirs(&da00, &da01)
            .with_lock_dir(&locks)
            .with_userno(USERNO)
            .with_poll_timeout(Duration::from_millis(50))
            .with_abort_grace(Duration::from_millis(200));
        cfg.version = VERSION.to_string();

        ParameterFile::create(cfg.parameter_path(), 35).unwrap();
        MessageStore::create(cfg.message_path(USERNO)).unwrap();
        Self { dir, cfg }
    }

    pub fn params(&self) -> ParameterFile {
        ParameterFile::open(self.cfg.parameter_path()).unwrap()
    }

    pub fn store(&self) -> MessageStore {
        MessageStore::open(self.cfg.message_path(USERNO)).unwrap()
    }

    pub fn allocator(&self) -> SlotAllocator {
        SlotAllocator::from_config(&self.cfg)
    }

    pub fn scratch(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Number of slot markers currently present.
    pub fn markers(&self) -> usize {
        std::fs::read_dir(self.cfg.lock_dir()).unwrap().count()
    }

    /// Install `NAME.EXE` running `body` after a prelude that defines:
    /// `IDX` (zero-based slot index), `rc BYTES` (write the return code) and
    /// `out OFFSET BYTES` (write into the workspace after the header).
    /// `BYTES` are printf escapes, e.g. `'\000\000\200\077'` for 1.0.
    pub fn install(&self, name: &str, body: &str) -> PathBuf {
        let path = self
            .cfg
            .aips_root
            .join(VERSION)
            .join(ARCH)
            .join("LOAD")
            .join(format!("{}.EXE", name.to_ascii_uppercase()));
        let script = format!(
            r#"#!/bin/sh
TD='{td}'
SLOT=$(printf '%s' "$1" | tail -c 1)
IDX=$((SLOT - 1))
put() {{ printf "$2" | dd of="$TD" bs=1 seek="$1" conv=notrunc 2>/dev/null; }}
rc() {{ put $((IDX * 20 + 8)) "$1"; }}
out() {{ put $((1024 + IDX * 4096 + 40 + $1)) "$2"; }}
{body}
"#,
            td = self.cfg.parameter_path().display(),
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

/// `size` (two floats) in, `status` (one float) out.
pub fn sizes() -> TaskSchema {
    TaskSchema::builder("SIZES", VERSION)
        .input("size", AdverbType::list(2, AdverbType::Float))
        .output("status", AdverbType::Float)
        .build()
        .unwrap()
}

pub fn schemas(list: impl IntoIterator<Item = TaskSchema>) -> SchemaCache {
    let cache = SchemaCache::empty();
    for s in list {
        cache.insert(s);
    }
    cache
}

pub fn shared(schema: TaskSchema) -> Arc<TaskSchema> {
    Arc::new(schema)
}

pub fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

/// Little-endian bytes of 0 and 1.0f32 as printf escapes.
pub const RC_OK: &str = r"\000\000\000\000";
pub const ONE_F32: &str = r"\000\000\200\077";
