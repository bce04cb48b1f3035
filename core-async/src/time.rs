//! Time-related abstractions.
//!
//! Sleep, timeouts and deadlines come from `tokio::time`; durations and
//! instants are the standard library types so they can cross crate
//! boundaries without conversion.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(5)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(5));
//! }
//! ```

pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, MissedTickBehavior, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Error returned by [`timeout`] when the deadline elapses first.
pub use tokio::time::error::Elapsed;

/// Sleeps until a standard-library [`Instant`].
///
/// Deadlines in the engine are computed with `std::time::Instant`; this
/// converts them for the Tokio timer.
pub fn sleep_until_instant(deadline: Instant) -> Sleep {
    sleep_until(deadline.into())
}

/// Computes the delay before retry number `attempt` (1-based) using
/// exponential backoff: `base * 2^(attempt - 1)`, capped at `cap`.
///
/// # Examples
///
/// ```rust
/// use core_async::time::{exponential_backoff, Duration};
///
/// let base = Duration::from_millis(100);
/// let cap = Duration::from_secs(1);
///
/// assert_eq!(exponential_backoff(base, 1, cap), Duration::from_millis(100));
/// assert_eq!(exponential_backoff(base, 3, cap), Duration::from_millis(400));
/// assert_eq!(exponential_backoff(base, 10, cap), cap);
/// ```
pub fn exponential_backoff(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map(|delay| delay.min(cap))
        .unwrap_or(cap)
}
