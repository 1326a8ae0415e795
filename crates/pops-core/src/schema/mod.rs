//! Schema lookup and caching.
//!
//! Schemas come from an external parser of the tasks' help text; this
//! module only defines the seam ([`SchemaSource`]) and memoises what it
//! produces, in memory and optionally as JSON files under
//! `<dir>/<version>/<NAME>.json`. Task names are case-insensitive and kept
//! upper-case, as everywhere else in a session.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use pops_model::TaskSchema;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// Produces the schema of one task version.
pub trait SchemaSource: Send + Sync {
    fn load(&self, name: &str, version: &str) -> CoreResult<TaskSchema>;
}

impl<F> SchemaSource for F
where
    F: Fn(&str, &str) -> CoreResult<TaskSchema> + Send + Sync,
{
    fn load(&self, name: &str, version: &str) -> CoreResult<TaskSchema> {
        self(name, version)
    }
}

type Key = (String, String);

/// Memoising front for a [`SchemaSource`]. Cheap to clone; clones share
/// one cache.
#[derive(Clone, Default)]
pub struct SchemaCache {
    source: Option<Arc<dyn SchemaSource>>,
    dir: Option<PathBuf>,
    memory: Arc<RwLock<HashMap<Key, Arc<TaskSchema>>>>,
}

impl SchemaCache {
    pub fn new(source: impl SchemaSource + 'static) -> Self {
        Self {
            source: Some(Arc::new(source)),
            ..Default::default()
        }
    }

    /// A cache that only knows schemas inserted by hand or found on disk.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Persist schemas as JSON under `dir` and consult it before the source.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn insert(&self, schema: TaskSchema) -> Arc<TaskSchema> {
        let key = (schema.name.to_ascii_uppercase(), schema.version.clone());
        let schema = Arc::new(schema);
        self.memory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, schema.clone());
        schema
    }

    pub fn len(&self) -> usize {
        self.memory.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Schema of `name` at `version`: memory, then disk, then the source.
    pub fn get(&self, name: &str, version: &str) -> CoreResult<Arc<TaskSchema>> {
        let name = name.to_ascii_uppercase();
        let name = name.as_str();
        let key = (name.to_string(), version.to_string());
        if let Some(hit) = self
            .memory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(hit.clone());
        }

        if let Some(schema) = self.read_disk(name, version) {
            debug!(target: "pops.core.schema", name, version, "schema loaded from disk");
            return Ok(self.insert(schema));
        }

        let Some(source) = &self.source else {
            return Err(CoreError::Schema {
                task: name.to_string(),
                reason: format!("no schema for version {version}"),
            });
        };
        let schema = source.load(name, version)?;
        debug!(target: "pops.core.schema", name, version, "schema loaded from source");
        self.write_disk(&schema);
        Ok(self.insert(schema))
    }

    fn path_for(dir: &Path, name: &str, version: &str) -> PathBuf {
        dir.join(version).join(format!("{}.json", name.to_ascii_uppercase()))
    }

    fn read_disk(&self, name: &str, version: &str) -> Option<TaskSchema> {
        let path = Self::path_for(self.dir.as_ref()?, name, version);
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(schema) => Some(schema),
            Err(e) => {
                warn!(target: "pops.core.schema", path = %path.display(), error = %e, "ignoring unreadable cached schema");
                None
            }
        }
    }

    /// Best effort; a failed write only costs a reload later.
    fn write_disk(&self, schema: &TaskSchema) {
        let Some(dir) = &self.dir else { return };
        let path = Self::path_for(dir, &schema.name, &schema.version);
        let tmp = path.with_extension("json.tmp");

        let result = serde_json::to_vec_pretty(schema)
            .map_err(std::io::Error::other)
            .and_then(|bytes| {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&tmp, bytes)?;
                fs::rename(&tmp, &path)
            });
        if let Err(e) = result {
            warn!(target: "pops.core.schema", path = %path.display(), error = %e, "failed to cache schema");
        }
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("dir", &self.dir)
            .field("has_source", &self.source.is_some())
            .field("cached", &self.len())
            .finish()
    }
}
