//! A library for compiling, running and judging competitive-programming
//! solutions.
//!
//! Gauntlet provides an async Rust API for running a solution against test
//! cases under a wall-clock limit, either one case at a time or in parallel,
//! and for stress testing a candidate against a trusted reference on
//! generated inputs.
//!
//! # Features
//!
//! - **Toolchain recipes** for C++, Python and Java with TOML configuration.
//! - **Template transclusion** of solutions into a per-language harness.
//! - **Process-group sandboxing** with hard kills on timeout and stop.
//! - **Parallel execution** bounded by a configurable number of slots.
//! - **Stress testing** with an empirical time-complexity estimate.

pub use complexity::{ComplexityClass, ComplexityEstimate, RegressionFit};
pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language, ToolchainConfig};
pub use runner::{
    CompileError, EventStream, ExecutionController, ExecutionError, ExecutionEvent,
    ExecutionState, ParallelExecutor, ProgramRole, ProgramSource, Runner, StopHandle,
    StressError, StressEvent, StressMode, StressReport, StressRequest, StressTester,
};
pub use types::{ExitKind, RunOutcome, StressSample, TestCase, TestVerdict, VerdictStatus};

pub mod cancel;
pub mod complexity;
pub mod config;
pub mod normalize;
pub mod runner;
pub mod sandbox;
pub mod transclude;
pub mod types;
