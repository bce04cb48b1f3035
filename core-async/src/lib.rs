//! Async runtime facade for the catalog sync engine.
//!
//! Every engine crate goes through this crate instead of naming Tokio
//! directly, so the executor, timers and synchronization primitives are
//! chosen in exactly one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and join handles
//! - `time`: Sleep, timeouts, instants and backoff arithmetic
//! - `sync`: Locks, channels, semaphores and cancellation tokens
//! - `runtime`: Building runtimes and blocking on futures
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

/// Waits on several futures, running the branch of the first to complete.
pub use tokio::select;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
