//! Server version tracking.

/// Outcome of checking an envelope's version against the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionCheck {
    /// Unversioned envelope, dispatch as is.
    Unversioned,
    /// Next version in sequence; the tracker has advanced to it.
    Advanced(u64),
    /// Already seen; discard.
    Duplicate { current: u64, received: u64 },
    /// Versions were skipped; resync before dispatching anything else.
    Gap { current: u64, received: u64 },
}

impl VersionCheck {
    /// Whether the envelope should reach the dispatcher.
    pub fn should_dispatch(&self) -> bool {
        matches!(self, Self::Unversioned | Self::Advanced(_))
    }
}

/// Last version seen on a channel.
///
/// The version only moves forward one step at a time through [`observe`];
/// [`reset`] is the single way to jump (after a resync).
///
/// [`observe`]: VersionTracker::observe
/// [`reset`]: VersionTracker::reset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionTracker {
    current: u64,
}

impl VersionTracker {
    pub fn new(initial: u64) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn observe(&mut self, version: Option<u64>) -> VersionCheck {
        let Some(received) = version else {
            return VersionCheck::Unversioned;
        };
        let current = self.current;

        if received <= current {
            VersionCheck::Duplicate { current, received }
        } else if received == current + 1 {
            self.current = received;
            VersionCheck::Advanced(received)
        } else {
            VersionCheck::Gap { current, received }
        }
    }

    pub fn reset(&mut self, version: u64) {
        self.current = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_versions_advance() {
        let mut tracker = VersionTracker::new(5);
        for v in 6..=10 {
            assert_eq!(tracker.observe(Some(v)), VersionCheck::Advanced(v));
        }
        assert_eq!(tracker.current(), 10);
    }

    #[test]
    fn stale_versions_are_duplicates() {
        let mut tracker = VersionTracker::new(6);
        assert_eq!(
            tracker.observe(Some(6)),
            VersionCheck::Duplicate {
                current: 6,
                received: 6
            }
        );
        assert_eq!(
            tracker.observe(Some(2)),
            VersionCheck::Duplicate {
                current: 6,
                received: 2
            }
        );
        assert_eq!(tracker.current(), 6);
    }

    #[test]
    fn skipped_versions_are_gaps_and_do_not_advance() {
        let mut tracker = VersionTracker::new(6);
        let check = tracker.observe(Some(9));
        assert_eq!(
            check,
            VersionCheck::Gap {
                current: 6,
                received: 9
            }
        );
        assert!(!check.should_dispatch());
        assert_eq!(tracker.current(), 6);
    }

    #[test]
    fn unversioned_envelopes_pass_through() {
        let mut tracker = VersionTracker::new(3);
        let check = tracker.observe(None);
        assert!(check.should_dispatch());
        assert_eq!(tracker.current(), 3);
    }

    #[test]
    fn reset_moves_baseline_in_both_directions() {
        let mut tracker = VersionTracker::new(6);
        tracker.reset(9);
        assert_eq!(tracker.observe(Some(10)), VersionCheck::Advanced(10));
        tracker.reset(4);
        assert_eq!(tracker.observe(Some(5)), VersionCheck::Advanced(5));
    }

    #[test]
    fn version_zero_start() {
        let mut tracker = VersionTracker::new(0);
        assert!(matches!(
            tracker.observe(Some(0)),
            VersionCheck::Duplicate { .. }
        ));
        assert_eq!(tracker.observe(Some(1)), VersionCheck::Advanced(1));
    }
}
