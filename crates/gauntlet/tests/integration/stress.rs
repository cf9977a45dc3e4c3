use std::time::Duration;

use gauntlet::runner::{ProgramRole, Runner, StressError, StressEvent, StressMode, StressRequest};

use super::{compiled_shell, scratch, shell, test_config};

/// Prints the iteration index, taken from the iteration directory name
const INDEX_GENERATOR: &str = "pwd | sed -n 's/.*\\/iter-\\([0-9]*\\)-.*/\\1/p'";

fn request(candidate: &str, count: usize, mode: StressMode) -> StressRequest {
    StressRequest {
        generator: shell(INDEX_GENERATOR),
        reference: shell("cat"),
        candidate: shell(candidate),
        count,
        mode,
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_mismatch_at_iteration_nine() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (tester, mut events) = runner.stress_tester();
    let candidate = "read n; [ \"$n\" -eq 9 ] && echo 10 || echo $n";

    let report = tester
        .run(&request(candidate, 50, StressMode::Sequential))
        .await
        .expect("Stress run failed");

    assert!(!report.passed);
    assert_eq!(report.failed_index, Some(9));
    assert_eq!(report.input, "9\n");
    assert_eq!(report.reference_output, "9\n");
    assert_eq!(report.candidate_output, "10\n");
    assert_eq!(report.samples.len(), 9);
    assert_eq!(report.complexity.fit.sample_count, 9);

    let finished = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            StressEvent::Finished(report) => Some(report.failed_index),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(finished, [Some(9)]);
}

#[tokio::test]
async fn test_parallel_mismatch_matches_sequential() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (tester, _events) = runner.stress_tester();
    let candidate = "read n; [ $((n % 7)) -eq 6 ] && echo x || echo $n";

    let sequential = tester
        .run(&request(candidate, 30, StressMode::Sequential))
        .await
        .expect("Sequential stress failed");
    let parallel = tester
        .run(&request(candidate, 30, StressMode::Parallel))
        .await
        .expect("Parallel stress failed");

    assert_eq!(sequential.failed_index, Some(6));
    assert_eq!(parallel.failed_index, Some(6));
    assert_eq!(parallel.input, sequential.input);
    assert_eq!(parallel.candidate_output, sequential.candidate_output);
}

#[tokio::test]
async fn test_constant_input_size_has_no_estimate() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (tester, _events) = runner.stress_tester();

    // Indices 0-9 all produce two-byte inputs
    let report = tester
        .run(&request("cat", 10, StressMode::Parallel))
        .await
        .expect("Stress run failed");

    assert!(report.passed);
    assert_eq!(report.samples.len(), 10);
    assert!(report.samples.iter().all(|s| s.input_size == 2));
    assert!(report.complexity.class.is_none());
    assert_eq!(report.complexity.to_string(), "insufficient timing data");
}

#[tokio::test]
async fn test_growing_inputs_give_an_estimate() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (tester, _events) = runner.stress_tester();

    // Input size grows with the iteration index
    let generator = format!(
        "n=$({INDEX_GENERATOR}); head -c $(( (n + 1) * 1000 )) /dev/zero | tr '\\0' 'a'; echo"
    );
    let report = tester
        .run(&StressRequest {
            generator: shell(&generator),
            reference: shell("wc -c"),
            candidate: compiled_shell("wc -c"),
            count: 6,
            mode: StressMode::Sequential,
            timeout: Duration::from_secs(5),
        })
        .await
        .expect("Stress run failed");

    assert!(report.passed);
    assert!(report.complexity.fit.valid);
    assert!(report.complexity.class.is_some());
    assert_eq!(report.samples[0].input_size, 1001);
    assert_eq!(report.samples[5].input_size, 6001);
}

#[tokio::test]
async fn test_reference_timeout_is_fatal() {
    let work_root = scratch();
    let runner = Runner::new(test_config(work_root.path()));
    let (tester, _events) = runner.stress_tester();
    let mut request = request("cat", 3, StressMode::Sequential);
    request.reference = shell("sleep 10");
    request.timeout = Duration::from_millis(200);

    let error = tester.run(&request).await.expect_err("Stress should fail");
    assert!(matches!(
        error,
        StressError::ProgramFailed {
            role: ProgramRole::Reference,
            index: 0,
            ..
        }
    ));
}
