//! Single-run process sandbox
//!
//! Stages files into per-run working directories, spawns programs as
//! process-group leaders and tears the whole group down on timeout, stop or
//! exit. There is no resource limiting beyond the wall clock.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::sandbox::command::ProgramCommand;
pub use crate::sandbox::process::run_process;
pub use crate::sandbox::workdir::WorkDir;

mod command;
mod process;
mod workdir;

/// Errors that occur while staging or supervising a process
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create working directory under {root}: {source}")]
    WorkDir {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("empty command")]
    EmptyCommand,

    #[error("run cancelled")]
    Cancelled,
}

const SIGNAL_NAMES: [(libc::c_int, &str); 12] = [
    (libc::SIGSEGV, "SIGSEGV"),
    (libc::SIGABRT, "SIGABRT"),
    (libc::SIGFPE, "SIGFPE"),
    (libc::SIGILL, "SIGILL"),
    (libc::SIGBUS, "SIGBUS"),
    (libc::SIGKILL, "SIGKILL"),
    (libc::SIGTERM, "SIGTERM"),
    (libc::SIGINT, "SIGINT"),
    (libc::SIGPIPE, "SIGPIPE"),
    (libc::SIGALRM, "SIGALRM"),
    (libc::SIGXCPU, "SIGXCPU"),
    (libc::SIGXFSZ, "SIGXFSZ"),
];

/// Resolve a signal number to its conventional name
pub fn signal_name(signal: i32) -> String {
    SIGNAL_NAMES
        .iter()
        .find(|(number, _)| *number == signal)
        .map(|(_, name)| (*name).to_owned())
        .unwrap_or_else(|| format!("SIGNAL {signal}"))
}

/// Send SIGKILL to every process in the group led by `pid`
///
/// Returns false if the group no longer exists or could not be signalled.
pub(crate) fn kill_process_group(pid: u32) -> bool {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // kill(0) and kill(-1) would hit our own group or every process
    if pgid <= 1 {
        return false;
    }
    // SAFETY: kill(2) has no memory-safety preconditions
    unsafe { libc::kill(-pgid, libc::SIGKILL) == 0 }
}
