//! Task spawning and execution abstractions.
//!
//! Sync runs and batch flush workers are spawned through this module. Each
//! spawned task may run on any worker thread, so futures must be `Send`.
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//!
//! async fn example() {
//!     let handle = task::spawn(async { 42 });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub use tokio::task::{JoinError, JoinHandle};

/// Spawns a new asynchronous task on the current runtime.
///
/// The returned [`JoinHandle`] resolves to the task's output, or to a
/// [`JoinError`] if the task panicked or was aborted.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
