//! # Incremental Sync Decider
//!
//! Chooses how a run treats the remote catalog by comparing the fingerprint
//! committed by the last completed run with a freshly computed one.
//!
//! | previous | fresh vs previous | diff support | strategy |
//! |----------|-------------------|--------------|----------|
//! | none     | -                 | -            | `Full`   |
//! | some     | equal             | -            | `Skip`   |
//! | some     | different         | yes          | `Incremental` |
//! | some     | different         | no           | `Full`   |

use bridge_traits::catalog::{Fingerprint, SyncStrategy};

/// Decides the strategy for one run. Pure and total.
pub fn decide(
    previous: Option<&Fingerprint>,
    fresh: &Fingerprint,
    source_supports_diff: bool,
) -> SyncStrategy {
    match previous {
        None => SyncStrategy::Full,
        Some(previous) if previous == fresh => SyncStrategy::Skip,
        Some(_) if source_supports_diff => SyncStrategy::Incremental,
        Some(_) => SyncStrategy::Full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(value: &str) -> Fingerprint {
        Fingerprint::new(value)
    }

    #[test]
    fn test_first_run_is_full() {
        assert_eq!(decide(None, &fp("a"), true), SyncStrategy::Full);
        assert_eq!(decide(None, &fp("a"), false), SyncStrategy::Full);
    }

    #[test]
    fn test_unchanged_fingerprint_skips() {
        assert_eq!(decide(Some(&fp("a")), &fp("a"), false), SyncStrategy::Skip);
        assert_eq!(decide(Some(&fp("a")), &fp("a"), true), SyncStrategy::Skip);
    }

    #[test]
    fn test_changed_fingerprint_depends_on_diff_support() {
        assert_eq!(
            decide(Some(&fp("a")), &fp("b"), true),
            SyncStrategy::Incremental
        );
        assert_eq!(decide(Some(&fp("a")), &fp("b"), false), SyncStrategy::Full);
    }
}
