//! Integration tests for the core-async facade.

use core_async::{sync, task, time};
use std::sync::Arc;

#[core_async::test]
async fn test_task_spawn() {
    let handle = task::spawn(async { 42 });
    let result = handle.await.unwrap();
    assert_eq!(result, 42);
}

#[core_async::test]
async fn test_timeout_failure() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(200)).await;
        42
    })
    .await;

    assert!(result.is_err());
}

#[core_async::test]
async fn test_cancellation_token_wakes_waiter() {
    let token = sync::CancellationToken::new();
    let waiter = token.clone();

    let handle = task::spawn(async move {
        waiter.cancelled().await;
        "cancelled"
    });

    time::sleep(time::Duration::from_millis(5)).await;
    token.cancel();

    assert_eq!(handle.await.unwrap(), "cancelled");
}

#[core_async::test]
async fn test_bounded_mpsc_applies_backpressure() {
    let (tx, mut rx) = sync::mpsc::channel::<u32>(1);
    tx.send(1).await.unwrap();

    let blocked = time::timeout(time::Duration::from_millis(20), tx.send(2)).await;
    assert!(blocked.is_err(), "second send should wait for capacity");

    assert_eq!(rx.recv().await, Some(1));
    tx.send(3).await.unwrap();
    assert_eq!(rx.recv().await, Some(3));
}

#[core_async::test]
async fn test_watch_latecomer_sees_latest_value() {
    let (tx, _rx) = sync::watch::channel(0u32);
    tx.send_replace(1);
    tx.send_replace(2);

    let late = tx.subscribe();
    assert_eq!(*late.borrow(), 2);
}

#[core_async::test]
async fn test_semaphore_limits_concurrency() {
    let semaphore = Arc::new(sync::Semaphore::new(1));
    let first = semaphore.clone().acquire_owned().await.unwrap();

    assert!(semaphore.try_acquire().is_err());
    drop(first);
    assert!(semaphore.try_acquire().is_ok());
}

#[core_async::test(multi_thread)]
async fn test_multi_thread_runtime_runs_tasks() {
    let counter = Arc::new(sync::Mutex::new(0));
    let mut handles = Vec::new();

    for _ in 0..8 {
        let counter = counter.clone();
        handles.push(task::spawn(async move {
            *counter.lock().await += 1;
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*counter.lock().await, 8);
}
