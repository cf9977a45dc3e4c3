use std::time::Duration;

use gauntlet::runner::{ExecutionError, ExecutionEvent, ExecutionState, Runner};
use gauntlet::types::{TestCase, VerdictStatus};

use super::{scratch, shell, test_config};

const TIMEOUT: Duration = Duration::from_millis(500);

/// Doubles its input, crashes on 0 and hangs on 9
const MIXED_PROGRAM: &str = "read n
case $n in
  0) exit 3 ;;
  9) sleep 5 ;;
esac
echo $((n * 2))";

/// Cases whose indices are deliberately not their positions
fn mixed_cases() -> Vec<TestCase> {
    [(40, 1, 2), (10, 0, 0), (30, 9, 18), (20, 4, 8), (50, 3, 7)]
        .into_iter()
        .map(|(index, input, expected)| {
            TestCase::new(index, format!("{input}\n"), format!("{expected}\n"))
        })
        .collect()
}

#[tokio::test]
async fn test_sequential_and_parallel_agree() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let program = shell(MIXED_PROGRAM);

    let (controller, _events) = runner.controller();
    let sequential = controller
        .run_batch(&program, mixed_cases(), TIMEOUT)
        .await
        .expect("Sequential batch failed");

    let (executor, _events) = runner.parallel_executor();
    let parallel = executor
        .run_all(&program, mixed_cases(), TIMEOUT)
        .await
        .expect("Parallel batch failed");

    let expected = [
        VerdictStatus::Accepted,
        VerdictStatus::RuntimeError,
        VerdictStatus::TimeLimitExceeded,
        VerdictStatus::Accepted,
        VerdictStatus::WrongAnswer,
    ];
    for verdicts in [&sequential, &parallel] {
        let statuses: Vec<_> = verdicts.iter().map(|v| v.status).collect();
        assert_eq!(statuses, expected);
    }
}

#[tokio::test]
async fn test_aggregate_matches_case_indices() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let program = shell(MIXED_PROGRAM);
    let cases = mixed_cases();

    let (controller, _events) = runner.controller();
    let sequential = controller
        .run_batch(&program, cases.clone(), TIMEOUT)
        .await
        .expect("Sequential batch failed");

    let (executor, _events) = runner.parallel_executor();
    let parallel = executor
        .run_all(&program, cases.clone(), TIMEOUT)
        .await
        .expect("Parallel batch failed");

    for verdicts in [&sequential, &parallel] {
        assert_eq!(verdicts.len(), cases.len());
        for (verdict, case) in verdicts.iter().zip(&cases) {
            assert_eq!(verdict.index, case.index);
        }
    }
}

#[tokio::test]
async fn test_events_report_each_case_once() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (executor, mut events) = runner.parallel_executor();

    executor
        .run_all(&shell(MIXED_PROGRAM), mixed_cases(), TIMEOUT)
        .await
        .expect("Parallel batch failed");

    let mut finished: Vec<usize> = Vec::new();
    let mut batches = 0;
    let mut states = Vec::new();
    for event in events.drain() {
        match event {
            ExecutionEvent::CaseFinished(verdict) => finished.push(verdict.index),
            ExecutionEvent::BatchFinished(verdicts) => {
                batches += 1;
                assert_eq!(verdicts.len(), 5);
            }
            ExecutionEvent::StateChanged(state) => states.push(state),
            ExecutionEvent::CompileFailed(output) => panic!("Unexpected compile failure: {output}"),
        }
    }
    finished.sort_unstable();
    assert_eq!(finished, [10, 20, 30, 40, 50]);
    assert_eq!(batches, 1);
    assert_eq!(
        states,
        [
            ExecutionState::Compiling,
            ExecutionState::Running,
            ExecutionState::Idle
        ]
    );
}

#[tokio::test]
async fn test_empty_batch() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));

    let (controller, _events) = runner.controller();
    let verdicts = controller
        .run_batch(&shell("cat"), Vec::new(), TIMEOUT)
        .await
        .expect("Empty batch failed");
    assert!(verdicts.is_empty());

    let (executor, _events) = runner.parallel_executor();
    let verdicts = executor
        .run_all(&shell("cat"), Vec::new(), TIMEOUT)
        .await
        .expect("Empty batch failed");
    assert!(verdicts.is_empty());
}

#[tokio::test]
async fn test_controller_reusable_after_stop() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (controller, _events) = runner.controller();
    let handle = controller.stop_handle();
    let sleeper = shell("sleep 10");

    let (stopped, _) = tokio::join!(
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
    assert!(matches!(stopped, Err(ExecutionError::Cancelled)));

    let verdicts = controller
        .run_batch(&shell("cat"), vec![TestCase::new(0, "ok", "ok")], TIMEOUT)
        .await
        .expect("Batch after stop failed");
    assert_eq!(verdicts[0].status, VerdictStatus::Accepted);
}
