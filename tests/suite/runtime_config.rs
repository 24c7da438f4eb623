//! Configuration file feeding the event loop.

use std::io::Write;

use deferred_config::{ConfigError, RuntimeConfig};
use deferred_core::{DeferredPromise, MicrotaskQueue, Promise};
use deferred_engine::{EventLoop, RejectionLog, drive_microtasks};
use tempfile::NamedTempFile;
use tokio::task::LocalSet;

use crate::common::Reason;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loop_runs_with_budget_from_file() {
    let file = write_config("[runtime]\ncheckpoint_budget = 2\n");
    let config = RuntimeConfig::load_from(file.path()).unwrap();
    assert_eq!(config.checkpoint_budget(), 2);

    let ev = EventLoop::with_config(config).unwrap();
    let mut promise = Promise::<u32, Reason>::resolved(ev.queue(), 0);
    for _ in 0..25 {
        promise = promise.then(|v| Ok(v + 2), Err);
    }
    assert_eq!(ev.block_on(promise.into_future()), Ok(50));
    assert_eq!(ev.config().checkpoint_budget(), 2);
}

#[test]
fn malformed_file_reports_path() {
    let file = write_config("[runtime]\ncheckpoint_budget = -\n");
    let err = RuntimeConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert_eq!(err.path(), file.path());
}

#[tokio::test]
async fn driver_runs_inside_caller_runtime() {
    let queue = MicrotaskQueue::new();
    let config = RuntimeConfig::from_toml_str("[runtime]\ncheckpoint_budget = 1\n").unwrap();
    let log = RejectionLog::default();
    let local = LocalSet::new();

    let value = local
        .run_until(async {
            let driver = tokio::task::spawn_local(drive_microtasks(queue.clone(), &config, log.clone()));
            let dp = DeferredPromise::<u8, Reason>::new(&queue, |resolver| {
                resolver.resolve(11);
                Ok(())
            });
            let value = dp.deferred_then(|v| Ok(v * 2), Err).await;
            driver.abort();
            value
        })
        .await;

    assert_eq!(value, Ok(22));
    assert!(log.snapshot().is_empty());
}
