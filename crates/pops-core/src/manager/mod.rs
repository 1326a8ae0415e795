//! Handle-keyed front for running many sessions from one context.
//!
//! ```text
//! TaskManager
//!     +-- PopsConfig            shared by every session
//!     +-- SchemaCache           (name, version) -> TaskSchema
//!     +-- sessions: TaskId -> Mutex<TaskSession>
//! ```
//!
//! `spawn` registers a session under a fresh [`TaskId`]; `wait` and
//! `abort` finish it and drop the handle. Operations on different handles
//! do not block each other. Operations on the same handle are serialised
//! per call, except `wait`, which takes the session lock once per poll pass
//! so an `abort` from another caller gets through within a poll timeout.

use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use pops_model::{Outputs, PopsConfig, SessionState, Slot};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{CoreError, CoreResult},
    schema::SchemaCache,
    session::{SessionEvent, TaskRequest, TaskSession},
};

/// Opaque handle of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(TaskId)
            .map_err(|_| CoreError::UnknownHandle(s.to_string()))
    }
}

/// Snapshot of one registered session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub id: TaskId,
    pub task: String,
    pub slot: Slot,
    pub state: SessionState,
    pub finished: bool,
}

struct Entry {
    session: Mutex<TaskSession>,
    abort_requested: AtomicBool,
}

impl Entry {
    fn lock(&self) -> MutexGuard<'_, TaskSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type SessionRef = Arc<Entry>;

#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: PopsConfig,
    schemas: SchemaCache,
    sessions: RwLock<HashMap<TaskId, SessionRef>>,
}

impl TaskManager {
    pub fn new(cfg: PopsConfig, schemas: SchemaCache) -> CoreResult<Self> {
        cfg.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                cfg,
                schemas,
                sessions: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &PopsConfig {
        &self.inner.cfg
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.inner.schemas
    }

    /// Run a task to completion without registering a handle.
    pub fn run(&self, request: TaskRequest) -> CoreResult<Outputs> {
        self.run_with(request, |_| {})
    }

    pub fn run_with<F>(&self, request: TaskRequest, on_event: F) -> CoreResult<Outputs>
    where
        F: FnMut(SessionEvent),
    {
        let schema = self.schema_for(&request)?;
        TaskSession::run_with(&self.inner.cfg, schema, request, on_event)
    }

    /// Start a task and return its handle.
    pub fn spawn(&self, request: TaskRequest) -> CoreResult<TaskId> {
        let schema = self.schema_for(&request)?;
        let session = TaskSession::spawn(&self.inner.cfg, schema, request)?;

        let id = TaskId::new();
        debug!(target: "pops.core.manager", %id, task = session.task(), slot = %session.slot(), "registered");
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Arc::new(Entry {
                    session: Mutex::new(session),
                    abort_requested: AtomicBool::new(false),
                }),
            );
        Ok(id)
    }

    /// Console lines and messages produced since the last poll.
    pub fn poll(&self, id: &TaskId) -> CoreResult<Vec<SessionEvent>> {
        self.with_session(id, TaskSession::poll)
    }

    pub fn finished(&self, id: &TaskId) -> CoreResult<bool> {
        self.with_session(id, |s| Ok(s.finished()))
    }

    pub fn feed(&self, id: &TaskId, bytes: &[u8]) -> CoreResult<()> {
        self.with_session(id, |s| s.feed(bytes))
    }

    /// Drain the task until it exits and return its outputs. The handle is
    /// gone afterwards, whatever the outcome.
    ///
    /// Fails with [`CoreError::Aborted`] when another caller aborts the
    /// task in the meantime.
    pub fn wait(&self, id: &TaskId) -> CoreResult<Outputs> {
        self.wait_with(id, |_| {})
    }

    /// Like [`TaskManager::wait`], handing every event to `on_event`.
    pub fn wait_with<F>(&self, id: &TaskId, on_event: F) -> CoreResult<Outputs>
    where
        F: FnMut(SessionEvent),
    {
        let entry = self.lookup(id)?;
        let result = drive(&entry, on_event);
        self.forget(id);
        result
    }

    /// Stop the task and free its slot. The handle is gone afterwards.
    ///
    /// A caller blocked in [`TaskManager::wait`] on the same handle gives
    /// up the session after its current poll pass.
    pub fn abort(&self, id: &TaskId) -> CoreResult<()> {
        let entry = self.lookup(id)?;
        entry.abort_requested.store(true, Ordering::Release);
        let result = entry.lock().abort();
        self.forget(id);
        result
    }

    pub fn info(&self, id: &TaskId) -> CoreResult<TaskInfo> {
        self.with_session(id, |s| Ok(info_of(*id, s)))
    }

    /// Every registered handle, in no particular order.
    pub fn list(&self) -> Vec<TaskInfo> {
        let sessions: Vec<(TaskId, SessionRef)> = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect();
        sessions
            .into_iter()
            .map(|(id, s)| info_of(id, &s.lock()))
            .collect()
    }

    fn schema_for(&self, request: &TaskRequest) -> CoreResult<Arc<pops_model::TaskSchema>> {
        let version = request.resolved_version(&self.inner.cfg);
        self.inner.schemas.get(&request.name, &version)
    }

    fn lookup(&self, id: &TaskId) -> CoreResult<SessionRef> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownHandle(id.to_string()))
    }

    fn with_session<T>(&self, id: &TaskId, f: impl FnOnce(&mut TaskSession) -> CoreResult<T>) -> CoreResult<T> {
        let entry = self.lookup(id)?;
        let mut guard = entry.lock();
        f(&mut guard)
    }

    fn forget(&self, id: &TaskId) {
        if self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
        {
            debug!(target: "pops.core.manager", %id, "handle dropped");
        }
    }
}

/// Drain a registered session pass by pass, then collect it. The lock is
/// dropped between passes so `abort` can claim the session.
fn drive<F>(entry: &Entry, mut on_event: F) -> CoreResult<Outputs>
where
    F: FnMut(SessionEvent),
{
    loop {
        if entry.abort_requested.load(Ordering::Acquire) {
            let task = entry.lock().task().to_string();
            debug!(target: "pops.core.manager", %task, "wait gave way to abort");
            return Err(CoreError::Aborted { task });
        }
        let mut session = entry.lock();
        match session.pump(&mut on_event) {
            Ok(false) => {}
            Ok(true) => return session.complete(Ok(())),
            Err(_) if session.state() == SessionState::Aborted => {
                return Err(CoreError::Aborted {
                    task: session.task().to_string(),
                });
            }
            Err(e) => return session.complete(Err(e)),
        }
    }
}

#[cfg(feature = "async")]
impl TaskManager {
    /// [`TaskManager::run`] on tokio's blocking pool.
    pub async fn run_async(&self, request: TaskRequest) -> CoreResult<Outputs> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.run(request))
            .await
            .map_err(|e| CoreError::InvalidState(format!("task runner failed: {e}")))?
    }

    /// [`TaskManager::wait`] on tokio's blocking pool.
    pub async fn wait_async(&self, id: TaskId) -> CoreResult<Outputs> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.wait(&id))
            .await
            .map_err(|e| CoreError::InvalidState(format!("task runner failed: {e}")))?
    }
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("schemas", &self.inner.schemas)
            .field(
                "sessions",
                &self
                    .inner
                    .sessions
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .finish()
    }
}

fn info_of(id: TaskId, s: &TaskSession) -> TaskInfo {
    TaskInfo {
        id,
        task: s.task().to_string(),
        slot: s.slot(),
        state: s.state(),
        finished: s.finished(),
    }
}
