use std::time::Duration;

use gauntlet::runner::{
    ExecutionError, Runner, StressError, StressMode, StressRequest,
};
use gauntlet::types::TestCase;

use super::{broken_compiler, compiled_shell, leftovers, scratch, shell, test_config};

#[tokio::test]
async fn test_batch_leaves_nothing_behind() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (controller, _events) = runner.controller();
    let cases = (0..3)
        .map(|i| TestCase::new(i, "x", "x"))
        .collect();

    controller
        .run_batch(&compiled_shell("touch scratch.txt; cat"), cases, Duration::from_secs(5))
        .await
        .expect("Batch failed");

    assert_eq!(leftovers(work_root.path()), 0);
}

#[tokio::test]
async fn test_compile_failure_leaves_nothing_behind() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (executor, _events) = runner.parallel_executor();

    let result = executor
        .run_all(
            &broken_compiler("error"),
            vec![TestCase::new(0, "", "")],
            Duration::from_secs(5),
        )
        .await;

    assert!(matches!(result, Err(ExecutionError::Compile(_))));
    assert_eq!(leftovers(work_root.path()), 0);
}

#[tokio::test]
async fn test_timeout_leaves_nothing_behind() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (executor, _events) = runner.parallel_executor();
    let cases = (0..3).map(|i| TestCase::new(i, "", "")).collect();

    executor
        .run_all(&shell("sleep 10"), cases, Duration::from_millis(200))
        .await
        .expect("Batch failed");

    assert_eq!(leftovers(work_root.path()), 0);
}

#[tokio::test]
async fn test_stop_leaves_nothing_behind() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (controller, _events) = runner.controller();
    let handle = controller.stop_handle();
    let sleeper = shell("sleep 10");

    let (result, _) = tokio::join!(
        controller.run_batch(
            &sleeper,
            vec![TestCase::new(0, "", "")],
            Duration::from_secs(20)
        ),
        async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            handle.stop()
        }
    );

    assert!(matches!(result, Err(ExecutionError::Cancelled)));
    assert_eq!(leftovers(work_root.path()), 0);
}

#[tokio::test]
async fn test_failed_stress_leaves_nothing_behind() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (tester, _events) = runner.stress_tester();

    let request = StressRequest {
        generator: shell("echo 1"),
        reference: shell("cat"),
        candidate: shell("exit 4"),
        count: 5,
        mode: StressMode::Parallel,
        timeout: Duration::from_secs(5),
    };
    let result = tester.run(&request).await;

    assert!(matches!(result, Err(StressError::ProgramFailed { .. })));
    assert_eq!(leftovers(work_root.path()), 0);
}
