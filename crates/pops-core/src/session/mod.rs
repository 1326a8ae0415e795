//! One run of one task.
//!
//! ```text
//! Idle -> Spawning -> Running -> Completed
//!                        \-----> Aborted
//! ```
//!
//! [`TaskSession::spawn`] covers Idle and Spawning: it claims a slot,
//! writes the parameter record, opens the message channel and starts the
//! process. The caller then drives the session with the poll operations
//! and finishes it with [`TaskSession::wait`] or [`TaskSession::abort`].
//! The slot is released on every path out of the session, including drop.

mod request;
pub use request::TaskRequest;

use std::{sync::Arc, time::Duration};

use pops_exec::{ProcConfig, ProcessHandle, Signal};
use pops_model::{Message, Outputs, PopsConfig, SessionState, Slot, TaskSchema};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    codec::{self, ParameterFile, RETURN_CODE_PENDING, WorkspaceHeader},
    error::{CoreError, CoreResult},
    family,
    message::{MessageChannel, MessageStore},
    slot::{SlotAllocator, SlotLease},
};

/// Something a running task produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "line")]
pub enum SessionEvent {
    /// A line the task wrote to its terminal.
    Console(String),
    /// A record of this task's slot from the message store.
    Message(Message),
}

pub struct TaskSession {
    task: String,
    schema: Arc<TaskSchema>,
    params: ParameterFile,
    messages: MessageChannel,
    // Declared before `lease`: the process is killed before the slot frees.
    process: Option<ProcessHandle>,
    lease: Option<SlotLease>,
    slot: Slot,
    state: SessionState,
    abort_grace: Duration,
    one_based: bool,
}

impl TaskSession {
    /// Claim a slot, write the inputs and start the task.
    ///
    /// On any failure after the slot is claimed, the slot is released
    /// before the error is returned.
    pub fn spawn(cfg: &PopsConfig, schema: Arc<TaskSchema>, request: TaskRequest) -> CoreResult<Self> {
        cfg.validate()?;
        let version = request.resolved_version(cfg);
        let userno = family::effective_userno(request.family, cfg)?;
        let task = request.name.to_ascii_uppercase();

        let lease = SlotAllocator::from_config(cfg).acquire()?;
        let slot = lease.slot();
        debug!(target: "pops.core.session", task = %task, %slot, state = ?SessionState::Spawning, "slot claimed");

        let one_based = request.one_based;
        let mut inputs = if one_based {
            codec::strip_placeholders(request.inputs)
        } else {
            request.inputs
        };
        let env = family::file_areas(&mut inputs).merged(&request.env);

        let params = ParameterFile::open(cfg.parameter_path())?;
        let header = WorkspaceHeader::new(userno as i32, cfg.msgkill, cfg.isbatch);
        params.write_inputs(slot, &schema, &header, &inputs)?;

        let store = MessageStore::open(cfg.message_path(userno))?;
        let messages = MessageChannel::from_now(store, slot)?;

        let program = family::executable(request.family, cfg, &request.name, &version);
        let proc_cfg = ProcConfig::new(&program)
            .arg(family::spawn_token(&request.name, slot))
            .env(env)
            .poll_timeout(cfg.poll_timeout);
        let process = match ProcessHandle::spawn(&proc_cfg) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "pops.core.session", task = %task, program = %program.display(), error = %e, "spawn failed");
                return Err(CoreError::Spawn(e));
            }
        };

        info!(
            target: "pops.core.session",
            task = %task,
            %version,
            %slot,
            pid = process.pid(),
            cursor = messages.cursor(),
            "task started"
        );
        Ok(Self {
            task,
            schema,
            params,
            messages,
            process: Some(process),
            lease: Some(lease),
            slot,
            state: SessionState::Running,
            abort_grace: cfg.abort_grace,
            one_based,
        })
    }

    /// Spawn, drain until exit, collect outputs.
    pub fn run(cfg: &PopsConfig, schema: Arc<TaskSchema>, request: TaskRequest) -> CoreResult<Outputs> {
        Self::run_with(cfg, schema, request, |_| {})
    }

    /// Like [`TaskSession::run`], handing every event to `on_event`.
    pub fn run_with<F>(cfg: &PopsConfig, schema: Arc<TaskSchema>, request: TaskRequest, on_event: F) -> CoreResult<Outputs>
    where
        F: FnMut(SessionEvent),
    {
        Self::spawn(cfg, schema, request)?.wait_with(on_event)
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn schema(&self) -> &TaskSchema {
        &self.schema
    }

    pub fn pid(&self) -> Option<i32> {
        self.process.as_ref().map(ProcessHandle::pid)
    }

    /// Whether the task process has exited (or the session is over).
    pub fn finished(&self) -> bool {
        match &self.process {
            Some(p) => p.finished(),
            None => true,
        }
    }

    /// Terminal lines written since the last call; waits at most the poll
    /// timeout for the first byte.
    pub fn poll_console(&mut self) -> CoreResult<Vec<String>> {
        let Some(process) = self.process.as_mut() else {
            return Ok(Vec::new());
        };
        let lines = process.poll()?;
        for line in &lines {
            debug!(target: "pops.core.session", task = %self.task, slot = %self.slot, %line, "console");
        }
        Ok(lines)
    }

    /// Message-store records of this slot written since the last call.
    pub fn poll_messages(&mut self) -> CoreResult<Vec<Message>> {
        if self.state.is_terminal() {
            return Ok(Vec::new());
        }
        let msgs = self.messages.poll()?;
        for m in &msgs {
            debug!(target: "pops.core.session", task = %self.task, priority = m.priority.0, text = %m.text, "message");
        }
        Ok(msgs)
    }

    /// Console lines followed by messages.
    pub fn poll(&mut self) -> CoreResult<Vec<SessionEvent>> {
        let mut events: Vec<SessionEvent> = self
            .poll_console()?
            .into_iter()
            .map(SessionEvent::Console)
            .collect();
        events.extend(self.poll_messages()?.into_iter().map(SessionEvent::Message));
        Ok(events)
    }

    /// Type `bytes` into the task's terminal.
    pub fn feed(&mut self, bytes: &[u8]) -> CoreResult<()> {
        if self.state != SessionState::Running || self.finished() {
            return Err(self.not_running("feed"));
        }
        if let Some(p) = self.process.as_mut() {
            p.feed(bytes)?;
        }
        Ok(())
    }

    /// Drain until the task exits, then collect its outputs.
    pub fn wait(&mut self) -> CoreResult<Outputs> {
        self.wait_with(|_| {})
    }

    pub fn wait_with<F>(&mut self, mut on_event: F) -> CoreResult<Outputs>
    where
        F: FnMut(SessionEvent),
    {
        if self.state != SessionState::Running {
            return Err(self.not_running("wait"));
        }
        let drained = self.drain(&mut on_event);
        self.complete(drained)
    }

    /// One poll pass handed to `on_event`. Returns `true` once the task had
    /// exited before the pass, i.e. the tail of both streams has been read.
    pub fn pump<F>(&mut self, on_event: &mut F) -> CoreResult<bool>
    where
        F: FnMut(SessionEvent),
    {
        if self.state != SessionState::Running {
            return Err(self.not_running("wait"));
        }
        let done = self.finished();
        for ev in self.poll()? {
            on_event(ev);
        }
        Ok(done)
    }

    /// Finish a session whose draining ended with `drained`: collect the
    /// outputs, stop the task if it is still up and free the slot.
    pub fn complete(&mut self, drained: CoreResult<()>) -> CoreResult<Outputs> {
        if self.state != SessionState::Running {
            return Err(drained.err().unwrap_or_else(|| self.not_running("wait")));
        }
        let result = drained.and_then(|()| self.collect());
        // Draining failed with the task still up; it must not outlive the slot.
        if let Some(mut p) = self.process.take()
            && !p.finished()
            && let Err(e) = p.abort(Signal::SIGKILL, self.abort_grace)
        {
            warn!(target: "pops.core.session", task = %self.task, error = %e, "failed to stop task");
        }
        self.state = SessionState::Completed;
        self.release();
        result
    }

    /// Stop the task with `SIGTERM` and free the slot.
    pub fn abort(&mut self) -> CoreResult<()> {
        self.abort_with(Signal::SIGTERM)
    }

    /// Stop the task with `signal` and free the slot. No outputs are read.
    ///
    /// The task gets the configured grace period to exit before it is
    /// killed; the slot is released once it is gone or the second grace
    /// period has passed.
    pub fn abort_with(&mut self, signal: Signal) -> CoreResult<()> {
        if self.state.is_terminal() {
            return Err(self.not_running("abort"));
        }
        let outcome = match self.process.as_mut() {
            Some(p) => p.abort(signal, self.abort_grace).map(|_| ()),
            None => Ok(()),
        };
        self.process = None;
        self.state = SessionState::Aborted;
        self.release();
        info!(target: "pops.core.session", task = %self.task, slot = %self.slot, ?signal, "task aborted");
        Ok(outcome?)
    }

    fn drain(&mut self, on_event: &mut impl FnMut(SessionEvent)) -> CoreResult<()> {
        while !self.pump(on_event)? {}
        Ok(())
    }

    fn collect(&mut self) -> CoreResult<Outputs> {
        let exit = match self.process.take() {
            Some(p) => p.join()?,
            None => return Err(self.not_running("collect")),
        };

        let code = self.params.read_return_code(self.slot)?;
        if code == RETURN_CODE_PENDING {
            return Err(CoreError::ProcessVanished {
                task: self.task.clone(),
                reason: format!("exited ({exit:?}) without reporting a result"),
            });
        }
        if code != 0 {
            warn!(target: "pops.core.session", task = %self.task, code, "task reported failure");
            return Err(CoreError::TaskReturnedError {
                task: self.task.clone(),
                code,
            });
        }

        let mut outputs = self.params.read_outputs(self.slot, &self.schema)?;
        if self.one_based {
            outputs = codec::add_placeholders(outputs);
        }
        info!(target: "pops.core.session", task = %self.task, slot = %self.slot, outputs = outputs.len(), "task completed");
        Ok(outputs)
    }

    fn release(&mut self) {
        if let Some(lease) = self.lease.take()
            && let Err(e) = lease.release()
        {
            warn!(target: "pops.core.session", task = %self.task, slot = %self.slot, error = %e, "slot release failed");
        }
    }

    fn not_running(&self, op: &str) -> CoreError {
        CoreError::InvalidState(format!("cannot {op} task {} in state {:?}", self.task, self.state))
    }
}

impl Drop for TaskSession {
    fn drop(&mut self) {
        if self.state == SessionState::Running {
            debug!(target: "pops.core.session", task = %self.task, slot = %self.slot, "session dropped while running");
        }
    }
}

impl std::fmt::Debug for TaskSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSession")
            .field("task", &self.task)
            .field("slot", &self.slot)
            .field("state", &self.state)
            .field("pid", &self.pid())
            .finish()
    }
}
