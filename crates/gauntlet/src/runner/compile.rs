//! Compilation step for code execution
//!
//! Stages a program's source into a build directory and, for compiled
//! languages, runs the compiler once. The result is reused for every run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::cancel::CancelFlag;
use crate::config::{BuildPlan, Language, ToolchainConfig};
use crate::runner::CompileError;
use crate::runner::execute::RunSnapshot;
use crate::sandbox::{ProgramCommand, SandboxError, WorkDir, run_process};
use crate::types::{ExitKind, RunOutcome};

/// Prefix of the per-batch root directory under the work root
pub(crate) const ROOT_PREFIX: &str = "gauntlet-";

/// Name of the build directory for single-program batches
pub(crate) const BUILD_DIR: &str = "build";

/// A program's source text and the toolchain that builds it
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub toolchain: ToolchainConfig,
    pub source: String,
}

impl ProgramSource {
    pub fn new(toolchain: ToolchainConfig, source: impl Into<String>) -> Self {
        Self {
            toolchain,
            source: source.into(),
        }
    }

    pub fn language(&self) -> Language {
        self.toolchain.language
    }
}

/// Source staged on disk, ready to compile
#[derive(Debug)]
pub struct CompileUnit {
    language: Language,
    plan: BuildPlan,
    build_dir: PathBuf,
    root: Arc<WorkDir>,
}

impl CompileUnit {
    /// Transclude the source and write it into `root/<subdir>`
    #[instrument(skip(program, root), fields(language = %program.toolchain.language))]
    pub async fn stage(
        program: &ProgramSource,
        root: Arc<WorkDir>,
        subdir: &str,
    ) -> Result<Self, SandboxError> {
        let source = program.toolchain.transclude(&program.source);
        let build_dir = root.create_subdir(subdir).await?;
        let plan = program.toolchain.plan(&source, &build_dir);

        root.write_file(
            &format!("{subdir}/{}", plan.source_file_name),
            source.as_bytes(),
        )
        .await?;

        debug!(file = %plan.source_file_name, entry_point = %plan.entry_point, "staged source");

        Ok(Self {
            language: program.toolchain.language,
            plan,
            build_dir,
            root,
        })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Entry point name (Java public type, or the binary stem)
    pub fn entry_point(&self) -> &str {
        &self.plan.entry_point
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn plan(&self) -> &BuildPlan {
        &self.plan
    }

    /// Run the compiler, if the language has one
    ///
    /// The compiler runs in the build directory under `ceiling`. Its stdout
    /// and stderr are combined into the failure output.
    #[instrument(skip(self, cancel), fields(language = %self.language))]
    pub async fn compile(
        self,
        ceiling: Duration,
        cancel: Option<&CancelFlag>,
    ) -> Result<CompiledProgram, CompileError> {
        if let Some(ref argv) = self.plan.compile_command {
            let command = ProgramCommand::new(argv.clone()).working_dir(&self.build_dir);
            let outcome = match run_process(&command, b"", ceiling, cancel).await {
                Ok(outcome) => outcome,
                Err(SandboxError::Cancelled) => return Err(CompileError::Cancelled),
                Err(e) => return Err(e.into()),
            };
            check_compile_outcome(outcome, ceiling)?;
            debug!("compilation succeeded");
        }

        Ok(CompiledProgram {
            run_command: self.plan.run_command.clone().into(),
            unit: self,
        })
    }
}

fn check_compile_outcome(outcome: RunOutcome, ceiling: Duration) -> Result<(), CompileError> {
    let output = combined_output(&outcome);
    match outcome.exit {
        ExitKind::Normal(0) => Ok(()),
        ExitKind::TimedOut => Err(CompileError::TimedOut {
            timeout_ms: u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX),
            output,
        }),
        ExitKind::FailedToStart => Err(CompileError::FailedToStart(outcome.stderr)),
        exit => Err(CompileError::Failed { exit, output }),
    }
}

fn combined_output(outcome: &RunOutcome) -> String {
    match (outcome.stdout.is_empty(), outcome.stderr.is_empty()) {
        (true, _) => outcome.stderr.clone(),
        (false, true) => outcome.stdout.clone(),
        (false, false) => {
            let mut output = outcome.stdout.clone();
            if !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&outcome.stderr);
            output
        }
    }
}

/// A program that compiled (or needs no compiling) and can be run
#[derive(Debug)]
pub struct CompiledProgram {
    unit: CompileUnit,
    run_command: Arc<[String]>,
}

impl CompiledProgram {
    pub fn language(&self) -> Language {
        self.unit.language
    }

    pub fn entry_point(&self) -> &str {
        self.unit.entry_point()
    }

    pub fn run_command(&self) -> &[String] {
        &self.run_command
    }

    pub fn build_dir(&self) -> &Path {
        self.unit.build_dir()
    }

    /// Directory holding the build directory and every run directory
    pub fn root(&self) -> &Path {
        self.unit.root.path()
    }

    /// Everything a single run needs, cheap to clone into tasks
    pub fn snapshot(&self, timeout: Duration) -> RunSnapshot {
        RunSnapshot::new(self.run_command.clone(), self.unit.root.clone(), timeout)
    }
}

/// Compile a program in a fresh directory under `work_root`
///
/// The directory is removed when the returned program and every snapshot
/// taken from it are dropped.
pub async fn compile(
    program: &ProgramSource,
    work_root: &Path,
    ceiling: Duration,
    cancel: Option<&CancelFlag>,
) -> Result<CompiledProgram, CompileError> {
    let root = Arc::new(WorkDir::create(work_root, ROOT_PREFIX)?);
    let unit = CompileUnit::stage(program, root, BUILD_DIR).await?;
    unit.compile(ceiling, cancel).await
}
