//! Process spawning and supervision
//!
//! Runs one program against one input under a wall clock budget and
//! classifies how it finished.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::cancel::{self, CancelFlag};
use crate::sandbox::command::ProgramCommand;
use crate::sandbox::{SandboxError, kill_process_group, signal_name};
use crate::types::{ExitKind, RunOutcome};

/// How long to wait for a killed process to be reaped
const KILL_GRACE: Duration = Duration::from_secs(1);

/// How long to wait for output pipes to drain after the process is gone
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Clone, Copy)]
enum Finish {
    Exited,
    TimedOut,
    Cancelled,
}

/// Run a command with the given input and timeout
///
/// The process is started as a process-group leader. On timeout or
/// cancellation the whole group is killed; after a normal exit any leftover
/// members of the group are killed too, so nothing outlives the call.
///
/// A program that cannot be spawned yields an outcome with
/// [`ExitKind::FailedToStart`] rather than an error. Cancellation yields
/// [`SandboxError::Cancelled`].
#[instrument(skip(command, input, cancel), fields(program = command.program()))]
pub async fn run_process(
    command: &ProgramCommand,
    input: &[u8],
    timeout: Duration,
    cancel: Option<&CancelFlag>,
) -> Result<RunOutcome, SandboxError> {
    let mut tokio_command = command.build()?;

    let start = Instant::now();
    let mut child = match tokio_command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "failed to spawn process");
            let program = command.program().unwrap_or_default();
            return Ok(RunOutcome::failed_to_start(format!(
                "failed to start '{program}': {e}"
            )));
        }
    };
    let pid = child.id();

    let stdin_task = feed_stdin(&mut child, input);
    let stdout_reader = child.stdout.take().map(OutputReader::spawn);
    let stderr_reader = child.stderr.take().map(OutputReader::spawn);

    let finish = match pid {
        Some(pid) => {
            tokio::select! {
                exited = wait_for_exit(pid) => {
                    exited?;
                    Finish::Exited
                }
                _ = tokio::time::sleep(timeout) => Finish::TimedOut,
                _ = cancel::cancelled(cancel) => Finish::Cancelled,
            }
        }
        // Only possible once the child has been reaped
        None => Finish::Exited,
    };

    // A deadline that fires right as the process exits must not turn a
    // finished run into a timeout.
    let finish = match finish {
        Finish::Exited => Finish::Exited,
        _ if pid.is_some_and(has_exited) => {
            debug!("process exited at the deadline");
            Finish::Exited
        }
        other => other,
    };

    let elapsed = start.elapsed();
    let status = match finish {
        Finish::Exited => {
            // The leader is an unreaped zombie here, so its group id cannot
            // have been reused yet.
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            Some(child.wait().await?)
        }
        Finish::TimedOut | Finish::Cancelled => {
            terminate(&mut child, pid).await;
            None
        }
    };

    if let Some(task) = stdin_task {
        task.abort();
    }
    let (raw_stdout, stderr_bytes) = tokio::join!(
        OutputReader::drain(stdout_reader),
        OutputReader::drain(stderr_reader)
    );

    let (exit, elapsed_ms) = match (finish, status) {
        (Finish::Cancelled, _) => {
            debug!("run cancelled");
            return Err(SandboxError::Cancelled);
        }
        (Finish::TimedOut, _) => (ExitKind::TimedOut, duration_ms(timeout)),
        (Finish::Exited, Some(status)) => (classify(status), duration_ms(elapsed)),
        (Finish::Exited, None) => (ExitKind::Normal(-1), duration_ms(elapsed)),
    };

    let mut stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
    if let ExitKind::Signaled(ref name) = exit {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(name);
        stderr.push('\n');
    }

    debug!(%exit, elapsed_ms, "process finished");

    Ok(RunOutcome {
        exit,
        stdout: String::from_utf8_lossy(&raw_stdout).into_owned(),
        raw_stdout,
        stderr,
        elapsed_ms,
    })
}

/// Wait until the child `pid` has exited, leaving it unreaped
async fn wait_for_exit(pid: u32) -> io::Result<()> {
    tokio::task::spawn_blocking(move || {
        loop {
            match wait_id(pid, libc::WEXITED | libc::WNOWAIT) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other.map(|_| ()),
            }
        }
    })
    .await
    .map_err(io::Error::other)?
}

/// Check without blocking or reaping whether the child `pid` has exited
fn has_exited(pid: u32) -> bool {
    matches!(
        wait_id(pid, libc::WEXITED | libc::WNOWAIT | libc::WNOHANG),
        Ok(true)
    )
}

/// waitid(2) on a single child; Ok(true) if it has exited
fn wait_id(pid: u32, options: libc::c_int) -> io::Result<bool> {
    // SAFETY: siginfo_t is plain data and all-zero is a valid value
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    // SAFETY: info is a valid, writable siginfo_t
    let rc = unsafe { libc::waitid(libc::P_PID, libc::id_t::from(pid), &mut info, options) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: waitid filled in info; with WNOHANG si_pid stays 0 if nothing changed
    Ok(unsafe { info.si_pid() } != 0)
}

/// Kill the process group (falling back to the leader) and reap the leader
async fn terminate(child: &mut Child, pid: Option<u32>) {
    let group_killed = pid.is_some_and(kill_process_group);
    if !group_killed {
        warn!(?pid, "process group kill failed, killing leader directly");
        if let Err(e) = child.start_kill() {
            warn!(error = %e, "failed to kill process");
        }
    }

    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(?status, "killed process reaped"),
        Ok(Err(e)) => warn!(error = %e, "failed to reap killed process"),
        Err(_) => warn!(?pid, "killed process was not reaped in time"),
    }
}

/// Write the input on a separate task and close stdin
///
/// A program may exit (or close stdin) before reading everything; the
/// resulting broken pipe is expected and ignored.
fn feed_stdin(child: &mut Child, input: &[u8]) -> Option<JoinHandle<()>> {
    let mut stdin = child.stdin.take()?;
    let input = input.to_vec();

    Some(tokio::spawn(async move {
        if let Err(e) = stdin.write_all(&input).await {
            if e.kind() != io::ErrorKind::BrokenPipe {
                debug!(error = %e, "failed to write stdin");
            }
            return;
        }
        if let Err(e) = stdin.shutdown().await {
            debug!(error = %e, "failed to close stdin");
        }
    }))
}

/// Collects one output pipe on its own task
///
/// Bytes land in a shared buffer as they arrive, so whatever was read is
/// kept even if the pipe never closes.
struct OutputReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl OutputReader {
    fn spawn<R>(mut reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        debug!(error = %e, "failed to read process output");
                        break;
                    }
                }
            }
        });
        Self { buffer, task }
    }

    async fn drain(reader: Option<Self>) -> Vec<u8> {
        let Some(Self { buffer, mut task }) = reader else {
            return Vec::new();
        };

        match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "output reader task failed"),
            Err(_) => {
                // A descendant escaped the process group and still holds the pipe
                warn!("output pipe did not close in time, keeping partial output");
                task.abort();
            }
        }

        std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn classify(status: ExitStatus) -> ExitKind {
    if let Some(code) = status.code() {
        ExitKind::Normal(code)
    } else if let Some(signal) = status.signal() {
        ExitKind::Signaled(signal_name(signal))
    } else {
        ExitKind::Normal(-1)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
