//! Disjoint set of half-open intervals.
//!
//! The map stores interval endpoints as `(point, Marker)` entries in a
//! [`SkipList`] ordered by point. `[Start, next Stop)` is covered; everything
//! else is not. Adding an interval merges it with every interval it overlaps
//! or touches, so the entries always alternate.
//!
//! Points are opaque: like the skip list, the map takes the point order as a
//! closure on every call, so points can reference bytes stored elsewhere.
//!
//! # Invariants
//!
//! - Adjacent entries never share a marker; the first is a `Start`, the last a
//!   `Stop`
//! - For adjacent `Start(a), Stop(b)`: `a < b`
//!
//! Removing intervals is not supported.

use std::cmp::Ordering;

use crate::skiplist::SkipList;

/// Endpoint kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Inclusive lower bound.
    Start,
    /// Exclusive upper bound.
    Stop,
}

/// Set of disjoint half-open intervals over points of type `P`.
#[derive(Debug)]
pub struct IntervalMap<P> {
    list: SkipList<(P, Marker)>,
}

impl<P: Clone> IntervalMap<P> {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            list: SkipList::new(seed),
        }
    }

    /// Number of stored endpoints (twice the number of intervals).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.list.memory_usage()
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// Add `[from, to)` to the set.
    ///
    /// Adding an interval that is already covered leaves the map unchanged.
    ///
    /// # Pre-conditions
    /// - `cmp(from, to) == Less`
    pub fn add_interval(&mut self, from: P, to: P, cmp: impl Fn(&P, &P) -> Ordering) {
        debug_assert_eq!(cmp(&from, &to), Ordering::Less, "empty interval");
        let entry_cmp = |a: &(P, Marker), b: &(P, Marker)| cmp(&a.0, &b.0);
        let probe_cmp = |a: &(P, Marker), p: &P| cmp(&a.0, p);

        // Lower endpoint: reuse a covering Start, or join an interval ending at `from`.
        match self.list.seek_for_prev(&from, probe_cmp) {
            Some(n) if self.list.entry(n).1 == Marker::Start => {}
            Some(n) if cmp(&self.list.entry(n).0, &from) == Ordering::Equal => {
                self.list.remove(n, entry_cmp);
            }
            _ => {
                self.list.insert((from.clone(), Marker::Start), entry_cmp);
            }
        }

        // Upper endpoint: reuse a covering Stop, or join an interval starting at `to`.
        match self.list.seek(&to, probe_cmp) {
            Some(n) if self.list.entry(n).1 == Marker::Stop => {}
            Some(n) if cmp(&self.list.entry(n).0, &to) == Ordering::Equal => {
                self.list.remove(n, entry_cmp);
            }
            _ => {
                self.list.insert((to.clone(), Marker::Stop), entry_cmp);
            }
        }

        // Drop every endpoint swallowed by the merged interval.
        let mut node = match self.list.seek_for_prev(&from, probe_cmp) {
            Some(start) => self.list.next(start),
            None => self.list.first(),
        };
        let mut swallowed = 0usize;
        while let Some(n) = node {
            if cmp(&self.list.entry(n).0, &to) != Ordering::Less {
                break;
            }
            node = self.list.remove(n, entry_cmp);
            swallowed += 1;
        }
        tracing::trace!(
            "interval map: added interval, swallowed {swallowed} endpoints, {} remain",
            self.list.len()
        );
    }

    /// Whether `key` lies inside a stored interval.
    #[must_use]
    pub fn is_in_interval<Q: ?Sized>(&self, key: &Q, cmp: impl Fn(&P, &Q) -> Ordering) -> bool {
        let Some(n) = self.list.seek(key, |e, k| cmp(&e.0, k)) else {
            return false;
        };
        let (point, marker) = self.list.entry(n);
        if cmp(point, key) == Ordering::Equal {
            *marker == Marker::Start
        } else {
            *marker == Marker::Stop
        }
    }

    /// Endpoints in order.
    pub fn endpoints(&self) -> impl Iterator<Item = &(P, Marker)> + '_ {
        self.list.entries()
    }

    /// Stored intervals as `(start, stop)` pairs, in order.
    ///
    /// An unmatched trailing `Start` (which would violate the alternation
    /// invariant) is dropped.
    #[must_use]
    pub fn intervals(&self) -> Vec<(&P, &P)> {
        let mut out = Vec::with_capacity(self.list.len() / 2);
        let mut open: Option<&P> = None;
        for (point, marker) in self.list.entries() {
            match (marker, open.take()) {
                (Marker::Start, _) => open = Some(point),
                (Marker::Stop, Some(start)) => out.push((start, point)),
                (Marker::Stop, None) => {}
            }
        }
        out
    }

    /// Verify the alternation invariant.
    #[must_use]
    pub fn check_alternation(&self, cmp: impl Fn(&P, &P) -> Ordering) -> bool {
        let mut expected = Marker::Start;
        let mut previous: Option<&P> = None;
        for (point, marker) in self.list.entries() {
            if *marker != expected {
                return false;
            }
            if previous.is_some_and(|prev| cmp(prev, point) != Ordering::Less) {
                return false;
            }
            expected = match marker {
                Marker::Start => Marker::Stop,
                Marker::Stop => Marker::Start,
            };
            previous = Some(point);
        }
        expected == Marker::Start
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::skiplist::DEFAULT_SEED;

    fn ord(a: &Vec<u8>, b: &Vec<u8>) -> Ordering {
        a.cmp(b)
    }

    fn probe(a: &Vec<u8>, k: &[u8]) -> Ordering {
        a.as_slice().cmp(k)
    }

    fn add(map: &mut IntervalMap<Vec<u8>>, from: &str, to: &str) {
        map.add_interval(from.as_bytes().to_vec(), to.as_bytes().to_vec(), ord);
    }

    fn contains(map: &IntervalMap<Vec<u8>>, key: &str) -> bool {
        map.is_in_interval(key.as_bytes(), probe)
    }

    fn render(map: &IntervalMap<Vec<u8>>) -> Vec<(String, String)> {
        map.intervals()
            .into_iter()
            .map(|(a, b)| {
                (
                    String::from_utf8_lossy(a).into_owned(),
                    String::from_utf8_lossy(b).into_owned(),
                )
            })
            .collect()
    }

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn test_empty_map() {
        let map: IntervalMap<Vec<u8>> = IntervalMap::new(DEFAULT_SEED);
        assert!(map.is_empty());
        assert!(!contains(&map, "a"));
        assert!(map.check_alternation(ord));
        assert_eq!(map.endpoints().count(), 0);
    }

    #[test]
    fn test_overlapping_intervals_merge() {
        let mut map = IntervalMap::new(DEFAULT_SEED);
        add(&mut map, "a", "c");
        add(&mut map, "b", "d");

        assert_eq!(render(&map), vec![pair("a", "d")]);
        assert!(contains(&map, "a"));
        assert!(contains(&map, "c"));
        assert!(!contains(&map, "d"));
        assert!(!contains(&map, "0"));
    }

    #[test]
    fn test_abutting_intervals_merge() {
        let mut map = IntervalMap::new(DEFAULT_SEED);
        add(&mut map, "a", "b");
        add(&mut map, "b", "c");
        assert_eq!(render(&map), vec![pair("a", "c")]);
        assert_eq!(map.len(), 2);

        // Abutting from the other side.
        let mut map = IntervalMap::new(DEFAULT_SEED);
        add(&mut map, "m", "p");
        add(&mut map, "k", "m");
        assert_eq!(render(&map), vec![pair("k", "p")]);
        assert!(contains(&map, "m"));
    }

    #[test]
    fn test_interval_swallows_others() {
        let mut map = IntervalMap::new(DEFAULT_SEED);
        add(&mut map, "b", "c");
        add(&mut map, "d", "e");
        add(&mut map, "f", "g");
        assert_eq!(map.len(), 6);

        add(&mut map, "a", "z");
        assert_eq!(render(&map), vec![pair("a", "z")]);
        assert!(map.check_alternation(ord));
    }

    #[test]
    fn test_nested_interval_is_noop() {
        let mut map = IntervalMap::new(DEFAULT_SEED);
        add(&mut map, "a", "z");
        add(&mut map, "c", "d");
        assert_eq!(render(&map), vec![pair("a", "z")]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_disjoint_intervals() {
        let mut map = IntervalMap::new(DEFAULT_SEED);
        add(&mut map, "e", "g");
        add(&mut map, "a", "c");

        assert_eq!(render(&map), vec![pair("a", "c"), pair("e", "g")]);
        assert!(contains(&map, "b"));
        assert!(!contains(&map, "c"));
        assert!(!contains(&map, "d"));
        assert!(contains(&map, "e"));
        assert!(contains(&map, "f"));
        assert!(!contains(&map, "g"));
        assert!(!contains(&map, "h"));
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut once = IntervalMap::new(DEFAULT_SEED);
        add(&mut once, "b", "f");

        let mut twice = IntervalMap::new(DEFAULT_SEED);
        add(&mut twice, "b", "f");
        add(&mut twice, "b", "f");

        let endpoints = |m: &IntervalMap<Vec<u8>>| m.endpoints().cloned().collect::<Vec<_>>();
        assert_eq!(endpoints(&once), endpoints(&twice));
    }

    #[test]
    fn test_clear() {
        let mut map = IntervalMap::new(DEFAULT_SEED);
        add(&mut map, "a", "b");
        map.clear();
        assert!(map.is_empty());
        assert!(!contains(&map, "a"));
    }

    #[test]
    fn test_random_intervals_match_naive_model() {
        let mut rng = StdRng::seed_from_u64(0x1f2e);
        for round in 0..50 {
            let mut map = IntervalMap::new(round);
            let mut covered = [false; 64];

            for _ in 0..rng.random_range(1..20) {
                let from: u8 = rng.random_range(0..63);
                let to: u8 = rng.random_range(from + 1..64);
                map.add_interval(vec![from], vec![to], ord);
                for slot in &mut covered[usize::from(from)..usize::from(to)] {
                    *slot = true;
                }
                assert!(map.check_alternation(ord), "round {round}");
            }

            for (k, expected) in covered.iter().enumerate() {
                let key = [u8::try_from(k).unwrap()];
                assert_eq!(
                    map.is_in_interval(&key[..], probe),
                    *expected,
                    "round {round}, key {k}"
                );
            }
        }
    }
}
