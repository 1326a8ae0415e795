//! External task processes attached to a pseudo-terminal.
//!
//! Legacy tasks line-buffer their console output only when talking to a
//! terminal, so the child gets the slave side of a fresh pty as its
//! stdin/stdout/stderr and its own session. The parent keeps the master
//! side and drains it with bounded readiness waits; nothing here spawns
//! threads.
//!
//! ```text
//! ProcessHandle
//!     +-- master (File)   poll() / feed()
//!     +-- child  (Child)  try_wait() / signals
//!     +-- pending (LineBuffer)
//! ```

mod lines;

use std::{
    fs::File,
    io::{self, Read, Write},
    os::{
        fd::{AsFd, AsRawFd},
        unix::process::{CommandExt, ExitStatusExt},
    },
    path::PathBuf,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    fcntl::{FcntlArg, FdFlag, fcntl},
    poll::{PollFd, PollFlags, PollTimeout, poll},
    pty::openpty,
    sys::signal::Signal,
};
use pops_model::TaskEnv;
use tracing::{debug, trace, warn};

use crate::{
    error::{ExecError, ExecResult},
    util::signal_session,
};
use lines::LineBuffer;

const READ_BUFFER_SIZE: usize = 1024;

/// Pause between liveness checks while waiting for a child to be reaped.
const REAP_INTERVAL: Duration = Duration::from_millis(5);

/// How long a dropped handle waits for its killed child to be reaped.
const DROP_REAP_LIMIT: Duration = Duration::from_secs(1);

/// How a task process is started.
#[derive(Clone, Debug, Default)]
pub struct ProcConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Added on top of the caller's environment.
    pub env: TaskEnv,
    pub cwd: Option<PathBuf>,
    /// Upper bound for one readiness wait in [`ProcessHandle::poll`].
    pub poll_timeout: Duration,
}

impl ProcConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            poll_timeout: Duration::from_millis(250),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, env: TaskEnv) -> Self {
        self.env = env;
        self
    }

    pub fn poll_timeout(mut self, t: Duration) -> Self {
        self.poll_timeout = t;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Running,
    Exited,
}

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Exited(code) => Some(*code),
            ExitStatus::Signaled(_) => None,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(s: std::process::ExitStatus) -> Self {
        match (s.code(), s.signal()) {
            (Some(code), _) => ExitStatus::Exited(code),
            (None, Some(sig)) => ExitStatus::Signaled(sig),
            (None, None) => ExitStatus::Exited(-1),
        }
    }
}

/// One spawned external process and the master end of its terminal.
pub struct ProcessHandle {
    child: Child,
    master: Option<File>,
    state: HandleState,
    exit: Option<ExitStatus>,
    pending: LineBuffer,
    /// The terminal reported end-of-file; only reaping is left.
    hung_up: bool,
    poll_timeout: Duration,
}

impl ProcessHandle {
    /// Start `cfg.program` with its standard streams on a new pty.
    pub fn spawn(cfg: &ProcConfig) -> ExecResult<Self> {
        if !cfg.program.is_file() {
            return Err(ExecError::MissingProgram(cfg.program.clone()));
        }

        let pty = openpty(None, None).map_err(ExecError::Pty)?;
        // Neither end may leak into tasks spawned later; the child's stdio
        // copies are made by dup2 and do not carry the flag.
        for fd in [pty.master.as_raw_fd(), pty.slave.as_raw_fd()] {
            fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(ExecError::Pty)?;
        }

        let mut cmd = Command::new(&cfg.program);
        cmd.args(&cfg.args);
        for (k, v) in cfg.env.iter() {
            cmd.env(k, v);
        }
        if let Some(cwd) = &cfg.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::from(pty.slave.try_clone()?))
            .stdout(Stdio::from(pty.slave.try_clone()?))
            .stderr(Stdio::from(pty.slave));

        // SAFETY: only async-signal-safe libc calls run between fork and exec.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() < 0 {
                    return Err(io::Error::last_os_error());
                }
                // Best effort; the task still runs without a controlling tty.
                libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0);
                Ok(())
            });
        }

        trace!(target: "pops.exec.pty", program = %cfg.program.display(), args = ?cfg.args, "spawn");
        let child = cmd.spawn().map_err(|e| ExecError::Spawn {
            program: cfg.program.clone(),
            reason: e.to_string(),
        })?;
        // The command still owns slave descriptors; the master only sees
        // end-of-file once every copy outside the child is closed.
        drop(cmd);

        debug!(target: "pops.exec.pty", pid = child.id(), program = %cfg.program.display(), "spawned");
        Ok(Self {
            child,
            master: Some(File::from(pty.master)),
            state: HandleState::Running,
            exit: None,
            pending: LineBuffer::default(),
            hung_up: false,
            poll_timeout: cfg.poll_timeout,
        })
    }

    pub fn pid(&self) -> i32 {
        self.child.id() as i32
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn finished(&self) -> bool {
        self.state == HandleState::Exited
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Drain whatever the task printed, waiting at most the poll timeout.
    ///
    /// Returns complete lines; may be empty. Once the terminal reports
    /// end-of-file or an error, the child is reaped without blocking and the
    /// handle moves to [`HandleState::Exited`] when that succeeds.
    pub fn poll(&mut self) -> ExecResult<Vec<String>> {
        if self.state == HandleState::Exited {
            return Ok(self.pending.flush());
        }
        if self.hung_up {
            self.reap()?;
            if self.state == HandleState::Running {
                thread::sleep(REAP_INTERVAL.min(self.poll_timeout));
            }
            return Ok(self.drain_lines());
        }
        let Some(master) = self.master.as_mut() else {
            return Err(ExecError::NotRunning);
        };

        let ready = {
            let mut fds = [PollFd::new(master.as_fd(), PollFlags::POLLIN)];
            let timeout = u16::try_from(self.poll_timeout.as_millis()).unwrap_or(u16::MAX);
            match poll(&mut fds, PollTimeout::from(timeout)) {
                Ok(n) => n > 0,
                Err(Errno::EINTR) => false,
                Err(e) => return Err(ExecError::Poll(e)),
            }
        };
        if !ready {
            return Ok(Vec::new());
        }

        let mut buf = [0u8; READ_BUFFER_SIZE];
        match master.read(&mut buf) {
            Ok(0) => self.hang_up()?,
            Ok(n) => self.pending.push(&buf[..n]),
            Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => {}
            // Linux reports EIO once the last slave descriptor is closed.
            Err(e) => {
                trace!(target: "pops.exec.pty", error = %e, "terminal read failed");
                self.hang_up()?;
            }
        }
        Ok(self.drain_lines())
    }

    /// Write `bytes` to the task's terminal as if typed.
    pub fn feed(&mut self, bytes: &[u8]) -> ExecResult<()> {
        match (&self.state, self.master.as_mut()) {
            (HandleState::Running, Some(master)) => {
                master.write_all(bytes)?;
                master.flush()?;
                Ok(())
            }
            _ => Err(ExecError::NotRunning),
        }
    }

    /// Signal the task and drop the terminal without collecting output.
    ///
    /// The child gets `grace` to exit; after that it is sent `SIGKILL` and
    /// given another `grace`. Returns the exit status if the child was
    /// reaped within that time.
    pub fn abort(&mut self, signal: Signal, grace: Duration) -> ExecResult<Option<ExitStatus>> {
        if self.state == HandleState::Exited {
            return Ok(self.exit);
        }
        let pid = self.pid();
        debug!(target: "pops.exec.pty", pid, ?signal, "abort");
        signal_session(pid, signal)?;
        self.master = None;

        if !self.reap_within(grace)? && signal != Signal::SIGKILL {
            debug!(target: "pops.exec.pty", pid, "grace exceeded; killing");
            signal_session(pid, Signal::SIGKILL)?;
            self.reap_within(grace)?;
        }
        if self.state == HandleState::Running {
            warn!(target: "pops.exec.pty", pid, "task not reaped after abort");
            self.state = HandleState::Exited;
        }
        self.pending = LineBuffer::default();
        Ok(self.exit)
    }

    /// Release the terminal of an exited task and return how it ended.
    pub fn join(mut self) -> ExecResult<ExitStatus> {
        if self.state == HandleState::Running {
            return Err(ExecError::StillRunning);
        }
        self.master = None;
        self.exit.ok_or(ExecError::NotRunning)
    }

    fn hang_up(&mut self) -> ExecResult<()> {
        self.hung_up = true;
        self.reap()
    }

    fn reap(&mut self) -> ExecResult<()> {
        if let Some(status) = self.child.try_wait()? {
            let status = ExitStatus::from(status);
            debug!(target: "pops.exec.pty", pid = self.pid(), ?status, "exited");
            self.exit = Some(status);
            self.state = HandleState::Exited;
        }
        Ok(())
    }

    fn reap_within(&mut self, limit: Duration) -> ExecResult<bool> {
        let deadline = Instant::now() + limit;
        loop {
            self.reap()?;
            if self.state == HandleState::Exited {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(REAP_INTERVAL);
        }
    }

    fn drain_lines(&mut self) -> Vec<String> {
        if self.state == HandleState::Exited {
            self.pending.flush()
        } else {
            self.pending.take_lines()
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.state != HandleState::Running {
            return;
        }
        let pid = self.pid();
        if let Err(e) = signal_session(pid, Signal::SIGKILL) {
            debug!(target: "pops.exec.pty", pid, error = %e, "kill on drop failed");
        }
        self.master = None;
        match self.reap_within(DROP_REAP_LIMIT) {
            Ok(true) => {}
            Ok(false) => warn!(target: "pops.exec.pty", pid, "task not reaped on drop"),
            Err(e) => warn!(target: "pops.exec.pty", pid, error = %e, "reap on drop failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("TASK.EXE");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn drain(handle: &mut ProcessHandle) -> Vec<String> {
        let mut out = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while !handle.finished() {
            assert!(Instant::now() < deadline, "task did not finish");
            out.extend(handle.poll().unwrap());
        }
        out.extend(handle.poll().unwrap());
        out
    }

    #[test]
    fn captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ProcConfig::new(script(&dir, "echo \"hello $1\"\necho done\nexit 3"))
            .arg("MANDL1")
            .poll_timeout(Duration::from_millis(50));

        let mut handle = ProcessHandle::spawn(&cfg).unwrap();
        let lines = drain(&mut handle);

        assert_eq!(lines, vec!["hello MANDL1", "done"]);
        assert_eq!(handle.join().unwrap(), ExitStatus::Exited(3));
    }

    #[test]
    fn env_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = TaskEnv::new();
        env.set("a", "/data/fits");
        let cfg = ProcConfig::new(script(&dir, "echo \"area=$a\""))
            .env(env)
            .poll_timeout(Duration::from_millis(50));

        let mut handle = ProcessHandle::spawn(&cfg).unwrap();
        assert_eq!(drain(&mut handle), vec!["area=/data/fits"]);
    }

    #[test]
    fn feed_reaches_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ProcConfig::new(script(&dir, "read answer\necho \"got $answer\""))
            .poll_timeout(Duration::from_millis(50));

        let mut handle = ProcessHandle::spawn(&cfg).unwrap();
        handle.feed(b"yes\n").unwrap();
        let lines = drain(&mut handle);
        assert_eq!(lines.last().map(String::as_str), Some("got yes"));
    }

    #[test]
    fn abort_kills_and_reaps() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ProcConfig::new(script(&dir, "sleep 30"));

        let mut handle = ProcessHandle::spawn(&cfg).unwrap();
        let pid = handle.pid();
        let status = handle
            .abort(Signal::SIGTERM, Duration::from_millis(500))
            .unwrap();

        assert!(matches!(status, Some(ExitStatus::Signaled(_))));
        assert!(handle.finished());
        assert!(!crate::probe_alive(pid));
        assert!(matches!(handle.feed(b"x"), Err(ExecError::NotRunning)));
    }

    #[test]
    fn dropped_handle_leaves_no_zombie() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ProcessHandle::spawn(&ProcConfig::new(script(&dir, "sleep 30"))).unwrap();
        let pid = handle.pid();
        drop(handle);
        // kill(pid, 0) still succeeds on an unreaped zombie.
        assert!(!crate::probe_alive(pid));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn terminals_are_not_inherited() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = ProcessHandle::spawn(&ProcConfig::new(script(&dir, "sleep 5"))).unwrap();

        let other = tempfile::tempdir().unwrap();
        let cfg = ProcConfig::new(script(
            &other,
            "for f in /proc/$$/fd/*; do readlink \"$f\"; done | grep -c ptmx",
        ))
        .poll_timeout(Duration::from_millis(50));
        let mut second = ProcessHandle::spawn(&cfg).unwrap();
        assert_eq!(drain(&mut second), vec!["0"]);

        first.abort(Signal::SIGKILL, Duration::from_millis(500)).unwrap();
    }

    #[test]
    fn missing_program_is_reported() {
        let err = ProcessHandle::spawn(&ProcConfig::new("/nonexistent/TASK.EXE")).err();
        assert!(matches!(err, Some(ExecError::MissingProgram(_))));
    }

    #[test]
    fn join_requires_exit() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ProcessHandle::spawn(&ProcConfig::new(script(&dir, "sleep 30"))).unwrap();
        assert!(matches!(handle.join(), Err(ExecError::StillRunning)));
    }
}
