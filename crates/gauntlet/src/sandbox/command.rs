//! Command builder for sandboxed programs
//!
//! Builds the tokio command for one program invocation: piped standard
//! streams, a fixed working directory, and a fresh process group.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use crate::sandbox::SandboxError;

/// Builder for one program invocation
#[derive(Debug, Clone)]
pub struct ProgramCommand {
    /// Program followed by its arguments
    argv: Arc<[String]>,
    /// Working directory of the process
    working_dir: Option<PathBuf>,
}

impl ProgramCommand {
    /// Create a new command from a program and its arguments
    pub fn new(argv: impl Into<Arc<[String]>>) -> Self {
        Self {
            argv: argv.into(),
            working_dir: None,
        }
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Program name (first element of argv)
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Build the tokio command
    ///
    /// The child becomes the leader of a new process group so that the
    /// whole subtree it forks can be signalled at once.
    pub(crate) fn build(&self) -> Result<Command, SandboxError> {
        let (program, args) = self.argv.split_first().ok_or(SandboxError::EmptyCommand)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        Ok(command)
    }
}
