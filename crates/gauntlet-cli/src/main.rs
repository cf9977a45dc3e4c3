//! Gauntlet CLI
//!
//! A command-line tool for testing and stress-testing competitive
//! programming solutions.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gauntlet::{
    Config, EXAMPLE_CONFIG, ExecutionError, ExecutionEvent, Language, ProgramSource, Runner,
    StopHandle, StressError, StressEvent, StressMode, StressRequest, TestCase, TestVerdict,
};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gauntlet")]
#[command(about = "A tool for judging and stress-testing solutions")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: gauntlet.toml)
        #[arg(short, long, default_value = "gauntlet.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a solution against a directory of `*.in` / `*.out` pairs
    Test {
        /// Solution source file
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Directory containing the test cases
        #[arg(value_name = "DIR")]
        tests: PathBuf,

        /// Language (cpp, python, java); guessed from the extension if omitted
        #[arg(short, long)]
        language: Option<String>,

        /// Per-case timeout in milliseconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Run cases concurrently
        #[arg(short, long)]
        parallel: bool,
    },

    /// Compare a candidate against a reference on generated inputs
    Stress {
        /// Program that prints one input per run
        #[arg(value_name = "GENERATOR")]
        generator: PathBuf,

        /// Trusted solution
        #[arg(value_name = "REFERENCE")]
        reference: PathBuf,

        /// Solution under test
        #[arg(value_name = "CANDIDATE")]
        candidate: PathBuf,

        /// Number of iterations (1-10000)
        #[arg(short = 'n', long, default_value = "100")]
        count: usize,

        /// Per-program timeout in milliseconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Run iterations concurrently
        #[arg(short, long)]
        parallel: bool,
    },

    /// List available languages
    Languages,

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Test {
            source,
            tests,
            language,
            timeout,
            parallel,
        } => {
            run_tests(
                config,
                &source,
                &tests,
                language.as_deref(),
                timeout,
                parallel,
            )
            .await
        }
        Commands::Stress {
            generator,
            reference,
            candidate,
            count,
            timeout,
            parallel,
        } => {
            let programs = [generator, reference, candidate];
            run_stress(config, &programs, count, timeout, parallel).await
        }
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

/// Stop the running batch when Ctrl-C is pressed
fn stop_on_ctrl_c(handle: StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping");
            handle.stop();
        }
    });
}

async fn load_program(
    config: &Config,
    path: &Path,
    language: Option<&str>,
) -> Result<ProgramSource> {
    let language = match language {
        Some(tag) => Language::from_tag(tag).with_context(|| format!("unknown language '{tag}'"))?,
        None => path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Language::from_extension)
            .with_context(|| {
                format!(
                    "cannot guess language of '{}', use --language",
                    path.display()
                )
            })?,
    };

    let toolchain = config
        .toolchain(language)
        .with_context(|| format!("no toolchain configured for {language}"))?
        .clone();

    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;

    Ok(ProgramSource::new(toolchain, source))
}

/// Collect `NAME.in` / `NAME.out` pairs, ordered by name
async fn load_cases(dir: &Path) -> Result<Vec<TestCase>> {
    let mut inputs = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read test directory '{}'", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "in") {
            inputs.push(path);
        }
    }
    inputs.sort();

    let mut cases = Vec::with_capacity(inputs.len());
    for (index, input_path) in inputs.iter().enumerate() {
        let output_path = input_path.with_extension("out");
        let input = tokio::fs::read_to_string(input_path)
            .await
            .with_context(|| format!("failed to read '{}'", input_path.display()))?;
        let expected = tokio::fs::read_to_string(&output_path)
            .await
            .with_context(|| format!("failed to read '{}'", output_path.display()))?;
        cases.push(TestCase::new(index, input, expected));
    }

    if cases.is_empty() {
        bail!("no *.in files found in '{}'", dir.display());
    }
    Ok(cases)
}

fn print_verdict(verdict: &TestVerdict) {
    println!(
        "#{:<4} {:<4} {:>6} ms",
        verdict.index,
        verdict.status.code(),
        verdict.elapsed_ms
    );
    if !verdict.error.is_empty() {
        for line in verdict.error.lines() {
            println!("       {line}");
        }
    }
}

async fn run_tests(
    config: Config,
    source: &Path,
    tests: &Path,
    language: Option<&str>,
    timeout: Option<u64>,
    parallel: bool,
) -> Result<()> {
    let program = load_program(&config, source, language).await?;
    let cases = load_cases(tests).await?;
    let timeout = timeout.map_or_else(|| config.timeout(), Duration::from_millis);

    info!(
        language = %program.language(),
        cases = cases.len(),
        parallel,
        "running tests"
    );

    let runner = Runner::new(config);
    let result = if parallel {
        let (executor, events) = runner.parallel_executor();
        stop_on_ctrl_c(executor.stop_handle());
        let printer = tokio::spawn(print_events(events));
        let result = executor.run_all(&program, cases, timeout).await;
        drop(executor);
        printer.await.context("event printer failed")?;
        result
    } else {
        let (controller, events) = runner.controller();
        stop_on_ctrl_c(controller.stop_handle());
        let printer = tokio::spawn(print_events(events));
        let result = controller.run_batch(&program, cases, timeout).await;
        drop(controller);
        printer.await.context("event printer failed")?;
        result
    };

    let verdicts = match result {
        Ok(verdicts) => verdicts,
        // The compiler output was already printed from the event stream
        Err(ExecutionError::Compile(_)) => std::process::exit(1),
        Err(e) => return Err(e).context("test run failed"),
    };

    let accepted = verdicts.iter().filter(|v| v.status.is_accepted()).count();
    println!("\n{accepted}/{} accepted", verdicts.len());

    if accepted != verdicts.len() {
        std::process::exit(1);
    }
    Ok(())
}

async fn print_events(mut events: gauntlet::EventStream<ExecutionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ExecutionEvent::CaseFinished(verdict) => print_verdict(&verdict),
            ExecutionEvent::CompileFailed(output) => {
                eprintln!("Compilation failed:");
                eprintln!("{output}");
            }
            ExecutionEvent::StateChanged(state) => debug!(?state, "state changed"),
            ExecutionEvent::BatchFinished(_) => {}
        }
    }
}

async fn run_stress(
    config: Config,
    programs: &[PathBuf; 3],
    count: usize,
    timeout: Option<u64>,
    parallel: bool,
) -> Result<()> {
    let [generator, reference, candidate] = programs;
    let request = StressRequest {
        generator: load_program(&config, generator, None).await?,
        reference: load_program(&config, reference, None).await?,
        candidate: load_program(&config, candidate, None).await?,
        count,
        mode: if parallel {
            StressMode::Parallel
        } else {
            StressMode::Sequential
        },
        timeout: timeout.map_or_else(|| config.timeout(), Duration::from_millis),
    };

    info!(count, parallel, "starting stress test");

    let runner = Runner::new(config);
    let (tester, mut events) = runner.stress_tester();
    stop_on_ctrl_c(tester.stop_handle());

    let progress = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let StressEvent::IterationFinished {
                index,
                input_size,
                candidate_elapsed_ms,
                matched,
            } = event
            {
                debug!(index, input_size, candidate_elapsed_ms, matched, "iteration");
            }
        }
    });

    let result = tester.run(&request).await;
    drop(tester);
    progress.await.context("progress reporter failed")?;

    let report = match result {
        Ok(report) => report,
        Err(StressError::ProgramFailed {
            role,
            index,
            outcome,
        }) => {
            eprintln!("{role} failed on iteration {index}: {}", outcome.exit);
            if !outcome.stderr.is_empty() {
                eprintln!("{}", outcome.stderr);
            }
            std::process::exit(1);
        }
        Err(StressError::Compile { role, source }) => {
            eprintln!("{role} failed to compile:");
            eprintln!("{}", source.output());
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("stress test failed"),
    };

    println!("Iterations: {}", report.iterations_run);
    println!("Complexity: {}", report.complexity);

    if let Some(index) = report.failed_index {
        println!("\nMismatch on iteration {index}");
        println!("Input:\n{}", report.input);
        println!("Expected:\n{}", report.reference_output);
        println!("Received:\n{}", report.candidate_output);
        if !report.stderr.is_empty() {
            println!("Stderr:\n{}", report.stderr);
        }
        std::process::exit(1);
    }

    println!("All iterations passed");
    Ok(())
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for language in Language::ALL {
        let kind = if language.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        let configured = if config.toolchain(language).is_ok() {
            ""
        } else {
            " [not configured]"
        };
        println!(
            "  {:<8} .{:<5} ({kind}){configured}",
            language.to_string(),
            language.extension()
        );
    }
}

fn show_config(config: &Config) {
    println!("Work root: {}", config.work_root().display());
    println!("Timeout: {} ms", config.timeout_ms);
    println!("Compile timeout: {} ms", config.compile_timeout_ms);
    println!("Parallel slots: {}", config.parallelism());
    println!();
    println!("Toolchains:");
    for toolchain in &config.toolchains {
        let executable = if toolchain.language.is_compiled() {
            toolchain.compiler()
        } else {
            toolchain.interpreter()
        };
        let template = if toolchain.transclude_enabled {
            " (template)"
        } else {
            ""
        };
        println!("  {:<8} {executable}{template}", toolchain.language.to_string());
    }
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
