//! Timeframe: a causal marker over a set of feeds.
//!
//! A timeframe maps each feed key to the highest sequence number consumed
//! from that feed, inclusive. Consumers use it to deduplicate redelivered
//! entries and to express "everything up to here" without naming
//! individual entries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::crypto::FeedKey;

/// Partial-order relationship between two timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeframeOrd {
    /// Both timeframes cover exactly the same positions.
    Equal,
    /// Self covers strictly less than other.
    Before,
    /// Self covers strictly more than other.
    After,
    /// Each covers positions the other does not.
    Concurrent,
}

/// Per-feed highest-consumed-sequence marker (inclusive).
///
/// Invariant: for any one consumer the value per feed is monotonically
/// non-decreasing across the consumer's lifetime. `advance` enforces this
/// by taking the per-key maximum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    frames: BTreeMap<FeedKey, u64>,
}

impl Timeframe {
    /// Create an empty timeframe (nothing consumed from any feed).
    pub fn new() -> Self {
        Self::default()
    }

    /// True if nothing has been consumed.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of feeds with a recorded position.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// The highest consumed seq for a feed, if any.
    pub fn get(&self, feed: &FeedKey) -> Option<u64> {
        self.frames.get(feed).copied()
    }

    /// The next unconsumed seq for a feed (0 for an unseen feed).
    pub fn next_seq(&self, feed: &FeedKey) -> u64 {
        self.frames.get(feed).map(|s| s + 1).unwrap_or(0)
    }

    /// Whether `(feed, seq)` has already been consumed.
    pub fn includes(&self, feed: &FeedKey, seq: u64) -> bool {
        self.frames.get(feed).is_some_and(|&high| seq <= high)
    }

    /// Record that `seq` has been consumed from `feed`.
    ///
    /// Takes the per-key maximum, so replaying an older position is a
    /// no-op. Returns true if the frame actually moved forward.
    pub fn advance(&mut self, feed: FeedKey, seq: u64) -> bool {
        match self.frames.get_mut(&feed) {
            Some(high) if *high >= seq => false,
            Some(high) => {
                *high = seq;
                true
            }
            None => {
                self.frames.insert(feed, seq);
                true
            }
        }
    }

    /// Merge another timeframe into this one (per-key maximum).
    pub fn merge(&mut self, other: &Timeframe) {
        for (feed, &seq) in &other.frames {
            self.advance(*feed, seq);
        }
    }

    /// Compare two timeframes under the per-key partial order.
    pub fn compare(&self, other: &Timeframe) -> TimeframeOrd {
        let mut self_ahead = false;
        let mut other_ahead = false;

        for (feed, &seq) in &self.frames {
            match other.frames.get(feed) {
                Some(&o) if o > seq => other_ahead = true,
                Some(&o) if o < seq => self_ahead = true,
                Some(_) => {}
                None => self_ahead = true,
            }
        }
        for feed in other.frames.keys() {
            if !self.frames.contains_key(feed) {
                other_ahead = true;
            }
        }

        match (self_ahead, other_ahead) {
            (false, false) => TimeframeOrd::Equal,
            (false, true) => TimeframeOrd::Before,
            (true, false) => TimeframeOrd::After,
            (true, true) => TimeframeOrd::Concurrent,
        }
    }

    /// Iterate over `(feed, highest_seq)` pairs in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&FeedKey, u64)> {
        self.frames.iter().map(|(k, &v)| (k, v))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timeframe{{")?;
        for (i, (feed, seq)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", feed, seq)?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(FeedKey, u64)> for Timeframe {
    fn from_iter<I: IntoIterator<Item = (FeedKey, u64)>>(iter: I) -> Self {
        let mut tf = Timeframe::new();
        for (feed, seq) in iter {
            tf.advance(feed, seq);
        }
        tf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> FeedKey {
        FeedKey::from_bytes([b; 32])
    }

    #[test]
    fn test_advance_and_includes() {
        let mut tf = Timeframe::new();
        let a = key(1);

        assert!(!tf.includes(&a, 0));
        assert_eq!(tf.next_seq(&a), 0);

        assert!(tf.advance(a, 0));
        assert!(tf.includes(&a, 0));
        assert!(!tf.includes(&a, 1));
        assert_eq!(tf.next_seq(&a), 1);

        assert!(tf.advance(a, 4));
        assert!(tf.includes(&a, 3));
        assert!(tf.includes(&a, 4));
        assert!(!tf.includes(&a, 5));
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut tf = Timeframe::new();
        let a = key(1);

        tf.advance(a, 7);
        // Going backwards is a no-op
        assert!(!tf.advance(a, 3));
        assert_eq!(tf.get(&a), Some(7));
    }

    #[test]
    fn test_merge_takes_per_key_max() {
        let a = key(1);
        let b = key(2);
        let c = key(3);

        let mut left: Timeframe = [(a, 5), (b, 2)].into_iter().collect();
        let right: Timeframe = [(b, 9), (c, 1)].into_iter().collect();

        left.merge(&right);

        assert_eq!(left.get(&a), Some(5));
        assert_eq!(left.get(&b), Some(9));
        assert_eq!(left.get(&c), Some(1));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let a = key(1);
        let mut tf: Timeframe = [(a, 5)].into_iter().collect();
        let snapshot = tf.clone();
        tf.merge(&snapshot);
        assert_eq!(tf, snapshot);
    }

    #[test]
    fn test_compare() {
        let a = key(1);
        let b = key(2);

        let empty = Timeframe::new();
        let one: Timeframe = [(a, 3)].into_iter().collect();
        let two: Timeframe = [(a, 5)].into_iter().collect();
        let other: Timeframe = [(b, 1)].into_iter().collect();

        assert_eq!(empty.compare(&empty), TimeframeOrd::Equal);
        assert_eq!(one.compare(&one.clone()), TimeframeOrd::Equal);
        assert_eq!(empty.compare(&one), TimeframeOrd::Before);
        assert_eq!(two.compare(&one), TimeframeOrd::After);
        assert_eq!(one.compare(&other), TimeframeOrd::Concurrent);
    }

    #[test]
    fn test_deterministic_iteration_order() {
        let tf: Timeframe = [(key(9), 1), (key(1), 2), (key(5), 3)]
            .into_iter()
            .collect();
        let keys: Vec<_> = tf.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![key(1), key(5), key(9)]);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_advance_never_decreases(seqs in prop::collection::vec(0u64..1_000, 1..50)) {
                let mut tf = Timeframe::new();
                let feed = key(1);
                let mut high: Option<u64> = None;

                for seq in seqs {
                    tf.advance(feed, seq);
                    high = Some(high.map_or(seq, |h| h.max(seq)));
                    prop_assert_eq!(tf.get(&feed), high);
                }
            }

            #[test]
            fn prop_includes_matches_get(seq in 0u64..1_000, probe in 0u64..2_000) {
                let mut tf = Timeframe::new();
                let feed = key(2);
                tf.advance(feed, seq);
                prop_assert_eq!(tf.includes(&feed, probe), probe <= seq);
            }
        }
    }
}
