//! Test helpers for actor integration tests.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::actor::message::{IndexJob, JobReport};

/// Generous upper bound for anything that goes through notify
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive reports until one matches `pred`, failing the test after [`EVENT_TIMEOUT`].
pub async fn wait_for_report(rx: &mut mpsc::Receiver<JobReport>, pred: impl Fn(&JobReport) -> bool) -> JobReport {
  let result = tokio::time::timeout(EVENT_TIMEOUT, async {
    while let Some(report) = rx.recv().await {
      if pred(&report) {
        return Some(report);
      }
    }
    None
  })
  .await;

  match result {
    Ok(Some(report)) => report,
    Ok(None) => panic!("report channel closed before a matching report arrived"),
    Err(_) => panic!("timed out waiting for a matching report"),
  }
}

/// Next job sent by a watcher, failing the test after [`EVENT_TIMEOUT`]
pub async fn next_job(rx: &mut mpsc::Receiver<IndexJob>) -> IndexJob {
  tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
    .await
    .expect("timed out waiting for a job")
    .expect("job channel closed")
}

/// Assert that no job arrives within `quiet`
pub async fn assert_no_job(rx: &mut mpsc::Receiver<IndexJob>, quiet: Duration) {
  if let Ok(Some(job)) = tokio::time::timeout(quiet, rx.recv()).await {
    panic!("unexpected job: {job:?}");
  }
}
