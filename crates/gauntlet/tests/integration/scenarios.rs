use std::time::Duration;

use gauntlet::config::{Language, ToolchainConfig};
use gauntlet::runner::{ExecutionError, ExecutionEvent, ProgramSource, Runner};
use gauntlet::types::{TestCase, VerdictStatus};

use super::{broken_compiler, compiled_shell, scratch, shell, test_config};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_echo_is_accepted() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (controller, _events) = runner.controller();

    let verdicts = controller
        .run_batch(&compiled_shell("cat"), vec![TestCase::new(0, "5", "5")], TIMEOUT)
        .await
        .expect("Batch failed");

    assert_eq!(verdicts.len(), 1);
    assert_eq!(verdicts[0].status, VerdictStatus::Accepted);
    assert_eq!(verdicts[0].output, "5");
}

#[tokio::test]
async fn test_wrong_output_is_wrong_answer() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (controller, _events) = runner.controller();

    let verdicts = controller
        .run_batch(&shell("echo 4"), vec![TestCase::new(0, "", "5")], TIMEOUT)
        .await
        .expect("Batch failed");

    assert_eq!(verdicts[0].status, VerdictStatus::WrongAnswer);
    assert_eq!(verdicts[0].output, "4\n");
}

#[tokio::test]
async fn test_trailing_whitespace_and_crlf_are_ignored() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (controller, _events) = runner.controller();

    let verdicts = controller
        .run_batch(
            &shell("printf '1 2  \\r\\n3\\t\\r\\n\\r\\n\\n'"),
            vec![TestCase::new(0, "", "1 2\n3")],
            TIMEOUT,
        )
        .await
        .expect("Batch failed");

    assert_eq!(verdicts[0].status, VerdictStatus::Accepted);
}

#[tokio::test]
async fn test_compile_error_fails_whole_batch() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (controller, mut events) = runner.controller();
    let cases = (0..3).map(|i| TestCase::new(i, "", "")).collect();

    let error = controller
        .run_batch(&broken_compiler("sol.cpp:1:24: error: expected semicolon"), cases, TIMEOUT)
        .await
        .expect_err("Batch should fail to compile");

    match error {
        ExecutionError::Compile(e) => {
            assert!(e.output().contains("expected semicolon"));
        }
        other => panic!("Unexpected error: {other:?}"),
    }

    let events = events.drain();
    let compile_failures = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::CompileFailed(_)))
        .count();
    assert_eq!(compile_failures, 1);
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ExecutionEvent::CaseFinished(_)))
    );
}

#[tokio::test]
async fn test_compile_error_fails_parallel_batch() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (executor, mut events) = runner.parallel_executor();
    let cases = (0..3).map(|i| TestCase::new(i, "", "")).collect();

    let error = executor
        .run_all(&broken_compiler("error"), cases, TIMEOUT)
        .await
        .expect_err("Batch should fail to compile");
    assert!(matches!(error, ExecutionError::Compile(_)));

    let compile_failures = events
        .drain()
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::CompileFailed(_)))
        .count();
    assert_eq!(compile_failures, 1);
}

#[tokio::test]
async fn test_crash_is_runtime_error_with_signal() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (controller, _events) = runner.controller();

    let verdicts = controller
        .run_batch(
            &compiled_shell("echo partial; kill -FPE $$"),
            vec![TestCase::new(0, "", "partial")],
            TIMEOUT,
        )
        .await
        .expect("Batch failed");

    assert_eq!(verdicts[0].status, VerdictStatus::RuntimeError);
    assert!(verdicts[0].error.contains("SIGFPE"));
}

#[tokio::test]
async fn test_nonzero_exit_is_runtime_error() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (controller, _events) = runner.controller();

    let verdicts = controller
        .run_batch(
            &shell("cat; exit 1"),
            vec![TestCase::new(0, "5", "5")],
            TIMEOUT,
        )
        .await
        .expect("Batch failed");

    assert_eq!(verdicts[0].status, VerdictStatus::RuntimeError);
}

#[tokio::test]
async fn test_missing_interpreter_fails_to_start() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (controller, _events) = runner.controller();
    let program = ProgramSource::new(
        ToolchainConfig::new(Language::Python)
            .with_interpreter("/nonexistent/python", &[]),
        "print(1)",
    );

    let verdicts = controller
        .run_batch(&program, vec![TestCase::new(0, "", "1")], TIMEOUT)
        .await
        .expect("Batch failed");

    assert_eq!(verdicts[0].status, VerdictStatus::FailedToStart);
    assert!(verdicts[0].error.contains("/nonexistent/python"));
}

#[tokio::test]
async fn test_template_wraps_solution() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (controller, _events) = runner.controller();
    let mut program = shell("echo solved");
    program.toolchain = program
        .toolchain
        .with_template("echo header\n{{solution}}\necho footer\n");

    let verdicts = controller
        .run_batch(
            &program,
            vec![TestCase::new(0, "", "header\nsolved\nfooter")],
            TIMEOUT,
        )
        .await
        .expect("Batch failed");

    assert_eq!(verdicts[0].status, VerdictStatus::Accepted);
}
