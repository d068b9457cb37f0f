//! Ordered skip list backed by arenas.
//!
//! Nodes and their forward links live in two [`Arena`]s and are addressed by
//! [`NodeId`]. The list never owns a comparator: every ordering operation takes a
//! closure, so entries can be ordered against data they only reference (index
//! entries compare keys stored in the batch's record buffer).
//!
//! # Structure
//!
//! - Up to `MAX_HEIGHT` levels, each node promoted with probability 1/`BRANCHING`
//! - Level 0 is doubly linked (`prev` back link), so `prev()` is O(1)
//! - Unlinked nodes keep their arena slot until `clear()`
//!
//! # Concurrency
//!
//! Readers share `&SkipList` and the single writer holds `&mut SkipList`, so a
//! reader never sees a node whose links are half published.
//!
//! # Invariants
//!
//! - For adjacent nodes `a, b` at level 0: `cmp(a, b) == Less`
//! - Every node of height `h` is linked at levels `0..h`
//! - `tail` is the last node at level 0, `None` iff the list is empty

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::arena::{Arena, ArenaId};

/// Maximum number of levels.
pub const MAX_HEIGHT: usize = 12;

/// Inverse of the probability that a node is promoted one level.
const BRANCHING: u32 = 4;

/// Seed used when the caller does not supply one.
pub const DEFAULT_SEED: u64 = 0xdead_beef;

/// Handle to a node of a [`SkipList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(ArenaId);

#[derive(Debug)]
struct Node<T> {
    entry: T,
    height: usize,
    /// First of `height` consecutive slots in the link arena.
    links: ArenaId,
    prev: Option<NodeId>,
}

/// A single-writer ordered set of `T`.
#[derive(Debug)]
pub struct SkipList<T> {
    nodes: Arena<Node<T>>,
    links: Arena<Option<NodeId>>,
    head: [Option<NodeId>; MAX_HEIGHT],
    tail: Option<NodeId>,
    height: usize,
    len: usize,
    rng: StdRng,
    seed: u64,
}

impl<T> SkipList<T> {
    /// Create an empty list whose node heights are drawn from `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: Arena::new(),
            links: Arena::new(),
            head: [None; MAX_HEIGHT],
            tail: None,
            height: 1,
            len: 0,
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Number of linked entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes held by the node and link arenas.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.nodes.allocated_bytes() + self.links.allocated_bytes()
    }

    /// Borrow the entry stored at `node`.
    #[must_use]
    pub fn entry(&self, node: NodeId) -> &T {
        &self.nodes.get(node.0).entry
    }

    /// Mutably borrow the entry stored at `node`.
    ///
    /// The caller must not change the entry's position under the list's order.
    pub fn entry_mut(&mut self, node: NodeId) -> &mut T {
        &mut self.nodes.get_mut(node.0).entry
    }

    /// First node in order.
    #[must_use]
    pub const fn first(&self) -> Option<NodeId> {
        self.head[0]
    }

    /// Last node in order.
    #[must_use]
    pub const fn last(&self) -> Option<NodeId> {
        self.tail
    }

    /// Successor of `node`.
    #[must_use]
    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        self.next_at(Some(node), 0)
    }

    /// Predecessor of `node`.
    #[must_use]
    pub fn prev(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).prev
    }

    /// Least node whose entry is `>= probe`.
    #[must_use]
    pub fn seek<Q: ?Sized>(&self, probe: &Q, cmp: impl Fn(&T, &Q) -> Ordering) -> Option<NodeId> {
        let mut x = None;
        let mut level = self.height - 1;
        loop {
            let next = self.next_at(x, level);
            match next {
                Some(n) if cmp(self.entry(n), probe) == Ordering::Less => x = Some(n),
                _ if level == 0 => return next,
                _ => level -= 1,
            }
        }
    }

    /// Greatest node whose entry is `<= probe`.
    #[must_use]
    pub fn seek_for_prev<Q: ?Sized>(
        &self,
        probe: &Q,
        cmp: impl Fn(&T, &Q) -> Ordering,
    ) -> Option<NodeId> {
        let mut x = None;
        let mut level = self.height - 1;
        loop {
            match self.next_at(x, level) {
                Some(n) if cmp(self.entry(n), probe) != Ordering::Greater => x = Some(n),
                _ if level == 0 => return x,
                _ => level -= 1,
            }
        }
    }

    /// Link `entry` at its ordered position and return its node.
    ///
    /// # Pre-conditions
    /// - No linked entry compares equal to `entry`
    pub fn insert(&mut self, entry: T, cmp: impl Fn(&T, &T) -> Ordering) -> NodeId {
        let preds = self.predecessors(&entry, &cmp);
        debug_assert!(
            self.next_at(preds[0], 0)
                .is_none_or(|n| cmp(self.entry(n), &entry) != Ordering::Equal),
            "skip list entries must be unique under their order"
        );

        let height = self.random_height();
        // Levels above the current height start at the head, which `preds` already holds.
        self.height = self.height.max(height);

        let mut successors = [None; MAX_HEIGHT];
        for (level, successor) in successors.iter_mut().enumerate().take(height) {
            *successor = self.next_at(preds[level], level);
        }
        let links = self
            .links
            .alloc_extend(successors.iter().copied().take(height));
        let id = NodeId(self.nodes.alloc(Node {
            entry,
            height,
            links,
            prev: preds[0],
        }));

        for (level, pred) in preds.iter().enumerate().take(height) {
            self.set_next(*pred, level, Some(id));
        }
        match successors[0] {
            Some(next) => self.nodes.get_mut(next.0).prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
        id
    }

    /// Unlink `node` and return its successor.
    ///
    /// The node's arena slot is not reclaimed; its id must not be used again.
    ///
    /// # Pre-conditions
    /// - `node` is linked
    /// - No other linked entry compares equal to it
    pub fn remove(&mut self, node: NodeId, cmp: impl Fn(&T, &T) -> Ordering) -> Option<NodeId> {
        let preds = self.predecessors(self.entry(node), &cmp);
        let (height, prev) = {
            let n = self.nodes.get(node.0);
            (n.height, n.prev)
        };

        for (level, pred) in preds.iter().enumerate().take(height) {
            debug_assert_eq!(self.next_at(*pred, level), Some(node));
            let after = self.next_at(Some(node), level);
            self.set_next(*pred, level, after);
        }

        let successor = self.next_at(Some(node), 0);
        match successor {
            Some(next) => self.nodes.get_mut(next.0).prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
        successor
    }

    /// Drop every entry and release both arenas.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.head = [None; MAX_HEIGHT];
        self.tail = None;
        self.height = 1;
        self.len = 0;
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    /// Cursor over the list, initially unpositioned.
    #[must_use]
    pub const fn iter(&self) -> SkipListIter<'_, T> {
        SkipListIter {
            list: self,
            node: None,
        }
    }

    /// Entries in order.
    pub fn entries(&self) -> impl Iterator<Item = &T> + '_ {
        std::iter::successors(self.first(), |&n| self.next(n)).map(|n| self.entry(n))
    }

    fn next_at(&self, node: Option<NodeId>, level: usize) -> Option<NodeId> {
        match node {
            None => self.head[level],
            Some(n) => *self.links.get(self.nodes.get(n.0).links.offset(level)),
        }
    }

    fn set_next(&mut self, node: Option<NodeId>, level: usize, target: Option<NodeId>) {
        match node {
            None => self.head[level] = target,
            Some(n) => {
                let link = self.nodes.get(n.0).links.offset(level);
                *self.links.get_mut(link) = target;
            }
        }
    }

    /// For every level, the last node strictly less than `target` (`None` is the head).
    fn predecessors(
        &self,
        target: &T,
        cmp: &impl Fn(&T, &T) -> Ordering,
    ) -> [Option<NodeId>; MAX_HEIGHT] {
        let mut preds = [None; MAX_HEIGHT];
        let mut x = None;
        let mut level = self.height - 1;
        loop {
            match self.next_at(x, level) {
                Some(n) if cmp(self.entry(n), target) == Ordering::Less => x = Some(n),
                _ => {
                    preds[level] = x;
                    if level == 0 {
                        return preds;
                    }
                    level -= 1;
                }
            }
        }
    }

    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.random_range(0..BRANCHING) == 0 {
            height += 1;
        }
        height
    }
}

/// Read cursor over a [`SkipList`].
///
/// Moving an invalid cursor with `next`/`prev` leaves it invalid.
#[derive(Debug)]
pub struct SkipListIter<'a, T> {
    list: &'a SkipList<T>,
    node: Option<NodeId>,
}

impl<T> Clone for SkipListIter<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SkipListIter<'_, T> {}

impl<'a, T> SkipListIter<'a, T> {
    #[must_use]
    pub const fn valid(&self) -> bool {
        self.node.is_some()
    }

    /// Node under the cursor.
    #[must_use]
    pub const fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Entry under the cursor.
    #[must_use]
    pub fn entry(&self) -> Option<&'a T> {
        let list = self.list;
        self.node.map(|n| list.entry(n))
    }

    pub fn seek<Q: ?Sized>(&mut self, probe: &Q, cmp: impl Fn(&T, &Q) -> Ordering) {
        self.node = self.list.seek(probe, cmp);
    }

    pub fn seek_for_prev<Q: ?Sized>(&mut self, probe: &Q, cmp: impl Fn(&T, &Q) -> Ordering) {
        self.node = self.list.seek_for_prev(probe, cmp);
    }

    pub const fn seek_to_first(&mut self) {
        self.node = self.list.first();
    }

    pub const fn seek_to_last(&mut self) {
        self.node = self.list.last();
    }

    pub fn next(&mut self) {
        self.node = self.node.and_then(|n| self.list.next(n));
    }

    pub fn prev(&mut self) {
        self.node = self.node.and_then(|n| self.list.prev(n));
    }
}
