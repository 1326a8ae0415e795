mod error;
pub use error::{ExecError, ExecResult};

mod util;
pub use util::{probe_alive, send_signal, signal_session};

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod pty;
        pub use pty::{ExitStatus, HandleState, ProcConfig, ProcessHandle};
    } else {
        compile_error!("pops-exec needs a POSIX pseudo-terminal");
    }
}

pub use nix::sys::signal::Signal;

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::{ExitStatus, ProcConfig, ProcessHandle, Signal};
}
