//! Per-family rules for locating and preparing a task.
//!
//! [`TaskFamily`] is a closed set; everything that differs between families
//! is decided here so that a session never branches on the family itself.

use std::path::{Path, PathBuf};

use pops_model::{Inputs, PopsConfig, Slot, TaskEnv, TaskFamily, Value};
use tracing::trace;

use crate::error::{CoreError, CoreResult};

/// Input adverbs whose directory part is exported as a file area.
const FILE_ADVERBS: [&str; 2] = ["infile", "outfile"];

/// Version a request resolves to: the one named, else the family default,
/// else the configured default; aliases map to their installed directory.
pub fn resolve_version(family: TaskFamily, cfg: &PopsConfig, requested: Option<&str>) -> String {
    let name = requested
        .or(family.default_version())
        .unwrap_or(&cfg.version);
    cfg.resolve_version(name)
}

/// User number written into the workspace header.
pub fn effective_userno(family: TaskFamily, cfg: &PopsConfig) -> CoreResult<u32> {
    match (cfg.userno, family.fallback_userno()) {
        (0, Some(fallback)) => Ok(fallback),
        (0, None) => Err(CoreError::UserNumberNotSet {
            package: family.package(),
        }),
        (n, _) => Ok(n),
    }
}

/// Path of the executable for task `name` at `version`.
pub fn executable(family: TaskFamily, cfg: &PopsConfig, name: &str, version: &str) -> PathBuf {
    match (family, &cfg.obit_exec) {
        (TaskFamily::Obit, Some(root)) => root.join("bin").join(name),
        _ => load_path(&cfg.aips_root, version, &cfg.arch, name),
    }
}

/// Single argument handed to the task: upper-case name and slot glyph.
pub fn spawn_token(name: &str, slot: Slot) -> String {
    format!("{}{}", name.to_ascii_uppercase(), slot.glyph())
}

/// Move the directory part of file adverbs into environment areas.
///
/// Each `infile`/`outfile` input holding a path with a directory gets the
/// next free area letter (`a`, `b`, ...): the directory is exported under
/// that name and the value becomes `area:basename`.
pub fn file_areas(inputs: &mut Inputs) -> TaskEnv {
    let mut env = TaskEnv::new();
    let mut areas = 'a'..='z';

    for adverb in FILE_ADVERBS {
        let Some(Value::Str(path)) = inputs.get(adverb) else {
            continue;
        };
        let path = Path::new(path);
        let (Some(dir), Some(base)) = (path.parent(), path.file_name()) else {
            continue;
        };
        if dir.as_os_str().is_empty() {
            continue;
        }
        let Some(area) = areas.next() else { break };

        let rewritten = format!("{area}:{}", base.to_string_lossy());
        trace!(target: "pops.core.family", adverb, area = %area, dir = %dir.display(), "file area");
        env.set(area.to_string(), dir.to_string_lossy());
        inputs.insert(adverb.to_string(), Value::Str(rewritten));
    }
    env
}

fn load_path(root: &Path, version: &str, arch: &str, name: &str) -> PathBuf {
    root.join(version)
        .join(arch)
        .join("LOAD")
        .join(format!("{}.EXE", name.to_ascii_uppercase()))
}
