use cpmor::status::LoadStepStatus;
use std::thread;

#[test]
fn status_retains_first_failure_message() {
    let status = LoadStepStatus::new();
    assert!(!status.reduction_requested());
    assert_eq!(status.first_message(), None);

    status.force_load_step_reduction("first");
    status.force_load_step_reduction("second");
    assert!(status.reduction_requested());
    assert_eq!(status.failure_count(), 2);
    assert_eq!(status.first_message().as_deref(), Some("first"));

    status.reset();
    assert!(!status.reduction_requested());
    assert_eq!(status.failure_count(), 0);
    assert_eq!(status.first_message(), None);
}

#[test]
fn status_counts_concurrent_failures() {
    let status = LoadStepStatus::new();
    thread::scope(|scope| {
        for i in 0..8 {
            let status = &status;
            scope.spawn(move || status.force_load_step_reduction(format!("point {}", i)));
        }
    });
    assert!(status.reduction_requested());
    assert_eq!(status.failure_count(), 8);
    assert!(status.first_message().unwrap().starts_with("point "));
}
