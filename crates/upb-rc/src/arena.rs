#[cfg(debug_assertions)]
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use crate::{GroupId, NodeId, RcError};

/// Identifies the caller holding a [`Arena::ref`]/[`Arena::unref`] pair.
///
/// Debug builds use this to detect leaks and double-unrefs (spec §4.1:
/// "on owner tracking builds, a per-owner multiset is maintained").
/// Release builds still take the argument (so call sites don't change)
/// but only use it in panic/error messages, never for bookkeeping.
pub type Owner = &'static str;

struct Node<T> {
    payload: Option<T>,
    group: GroupId,
    individual_count: usize,
    frozen: bool,
    out_edges: Vec<NodeId>,
    #[cfg(debug_assertions)]
    owners: HashMap<Owner, usize>,
}

struct Group {
    counter: AtomicUsize,
    members: Vec<NodeId>,
}

impl Group {
    fn new() -> Self {
        Group { counter: AtomicUsize::new(0), members: Vec::new() }
    }

    fn count(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }

    fn add(&mut self, n: usize) {
        self.counter.fetch_add(n, Ordering::Relaxed);
    }

    fn sub(&mut self, n: usize) {
        self.counter.fetch_sub(n, Ordering::Relaxed);
    }
}

/// Statistics returned by a successful [`Arena::freeze`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreezeStats {
    /// Number of nodes transitioned from mutable to frozen.
    pub nodes_frozen: usize,
    /// Number of new groups (SCCs) created.
    pub groups_created: usize,
    /// Number of previously-mutable groups fully swept (emptied).
    pub groups_swept: usize,
}

/// A refcounted arena of `T`-payload nodes, grouped for cycle-tolerant
/// freezing. See the module docs for the overall design.
pub struct Arena<T> {
    nodes: Vec<Node<T>>,
    groups: Vec<Option<Group>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena, pre-seeded with the sentinel group
    /// (spec §3, I3) at index 0.
    pub fn new() -> Self {
        let groups = vec![Some(Group::new())];
        Arena { nodes: Vec::new(), groups }
    }

    fn group(&self, id: GroupId) -> &Group {
        self.groups[id.0 as usize]
            .as_ref()
            .expect("group handle outlived its group")
    }

    fn group_mut(&mut self, id: GroupId) -> &mut Group {
        self.groups[id.0 as usize]
            .as_mut()
            .expect("group handle outlived its group")
    }

    fn alloc_group(&mut self) -> Result<GroupId, RcError> {
        let idx = self.groups.len();
        let id = u32::try_from(idx).map_err(|_| RcError::AllocFailure)?;
        self.groups.push(Some(Group::new()));
        Ok(GroupId(id))
    }

    /// Creates a new mutable node in a fresh group of size one, with
    /// one external reference attributed to `owner` (spec §4.1 `init`).
    pub fn init(&mut self, payload: T, owner: Owner) -> Result<NodeId, RcError> {
        let group_id = self.alloc_group()?;
        let idx = self.nodes.len();
        let node_id = NodeId(u32::try_from(idx).map_err(|_| RcError::AllocFailure)?);

        #[cfg(debug_assertions)]
        let owners = {
            let mut m = HashMap::new();
            m.insert(owner, 1usize);
            m
        };
        let _ = owner;

        self.nodes.push(Node {
            payload: Some(payload),
            group: group_id,
            individual_count: 1,
            frozen: false,
            out_edges: Vec::new(),
            #[cfg(debug_assertions)]
            owners,
        });
        self.group_mut(group_id).members.push(node_id);
        self.group_mut(group_id).add(1);
        trace!(node = node_id.0, group = group_id.0, "rc::init");
        Ok(node_id)
    }

    /// Returns a reference to the payload of `id`.
    pub fn payload(&self, id: NodeId) -> &T {
        self.nodes[id.index()]
            .payload
            .as_ref()
            .expect("use-after-free of a node payload")
    }

    /// Returns a mutable reference to the payload of `id`. Panics if
    /// the node is frozen; frozen payloads are only read, never
    /// mutated (the immutability contract freezing establishes).
    pub fn payload_mut(&mut self, id: NodeId) -> &mut T {
        let node = &mut self.nodes[id.index()];
        assert!(!node.frozen, "attempted to mutate a frozen node");
        node.payload.as_mut().expect("use-after-free of a node payload")
    }

    /// True once `freeze` has committed this node into an immutable group.
    pub fn is_frozen(&self, id: NodeId) -> bool {
        self.nodes[id.index()].frozen
    }

    pub fn group_of(&self, id: NodeId) -> GroupId {
        self.nodes[id.index()].group
    }

    fn is_sentinel(&self, group: GroupId) -> bool {
        group == GroupId::SENTINEL
    }

    /// Adds one externally-held reference to `id` on behalf of `owner`.
    pub fn ref_(&mut self, id: NodeId, owner: Owner) {
        let group = self.nodes[id.index()].group;
        if self.is_sentinel(group) {
            return;
        }
        if !self.nodes[id.index()].frozen {
            self.nodes[id.index()].individual_count += 1;
        }
        #[cfg(debug_assertions)]
        {
            *self.nodes[id.index()].owners.entry(owner).or_insert(0) += 1;
        }
        self.group_mut(group).add(1);
        trace!(node = id.0, %owner, "rc::ref");
    }

    /// Removes one externally-held reference to `id` on behalf of
    /// `owner`. If the owning group's counter drops to zero the whole
    /// group is released (payloads dropped, outgoing ref2s walked).
    pub fn unref(&mut self, id: NodeId, owner: Owner) -> Result<(), RcError> {
        let group = self.nodes[id.index()].group;
        if self.is_sentinel(group) {
            return Ok(());
        }

        #[cfg(debug_assertions)]
        {
            let entry = self.nodes[id.index()].owners.get_mut(&owner);
            match entry {
                Some(count) if *count > 0 => *count -= 1,
                _ => return Err(RcError::DoubleUnref { node: id, owner }),
            }
        }

        if !self.nodes[id.index()].frozen {
            self.nodes[id.index()].individual_count -= 1;
        }
        self.group_mut(group).sub(1);
        trace!(node = id.0, %owner, "rc::unref");

        if self.group(group).count() == 0 {
            self.release_group(group);
        }
        Ok(())
    }

    /// Records an edge `from -> to` (spec §4.1 `ref2`). `from` must be
    /// mutable. If both endpoints are mutable their groups are merged
    /// (the cycle-tolerance mechanism); if `to` is already frozen this
    /// behaves like a plain group ref on `to`'s group.
    pub fn ref2(&mut self, to: NodeId, from: NodeId) -> Result<(), RcError> {
        if self.nodes[from.index()].frozen {
            return Err(RcError::SourceNotMutable);
        }
        self.nodes[from.index()].out_edges.push(to);

        let to_group = self.nodes[to.index()].group;
        if self.is_sentinel(to_group) {
            return Ok(());
        }

        if self.nodes[to.index()].frozen {
            self.group_mut(to_group).add(1);
            return Ok(());
        }

        let from_group = self.nodes[from.index()].group;
        if from_group != to_group {
            self.merge_groups(from_group, to_group);
        }
        Ok(())
    }

    /// Removes one `from -> to` edge previously recorded by `ref2`.
    pub fn unref2(&mut self, to: NodeId, from: NodeId) -> Result<(), RcError> {
        let edges = &mut self.nodes[from.index()].out_edges;
        if let Some(pos) = edges.iter().position(|&e| e == to) {
            edges.remove(pos);
        }
        let to_group = self.nodes[to.index()].group;
        if self.is_sentinel(to_group) {
            return Ok(());
        }
        if self.nodes[to.index()].frozen {
            self.group_mut(to_group).sub(1);
            if self.group(to_group).count() == 0 {
                self.release_group(to_group);
            }
        }
        Ok(())
    }

    /// Merges the group of `g2` into the group of `g1`: sums counters,
    /// rewrites every `g2` member's group pointer, appends member
    /// lists, and frees the `g2` counter cell. O(|g2|), acceptable
    /// because merges only happen during mutable-phase construction
    /// (spec §4.1 "Group merge").
    fn merge_groups(&mut self, g1: GroupId, g2: GroupId) {
        if g1 == g2 {
            return;
        }
        let g2_members = std::mem::take(&mut self.group_mut(g2).members);
        let g2_count = self.group(g2).count();

        for &member in &g2_members {
            self.nodes[member.index()].group = g1;
        }
        {
            let dst = self.group_mut(g1);
            dst.members.extend_from_slice(&g2_members);
            dst.add(g2_count);
        }
        self.groups[g2.0 as usize] = None;
        trace!(into = g1.0, from = g2.0, "rc::merge_groups");
    }

    /// Drops every member of `group`, cascading `unref2` along their
    /// recorded out-edges, then frees the group record itself.
    fn release_group(&mut self, group: GroupId) {
        if self.is_sentinel(group) {
            return;
        }
        let members = match &mut self.groups[group.0 as usize] {
            Some(g) => std::mem::take(&mut g.members),
            None => return,
        };
        self.groups[group.0 as usize] = None;
        trace!(group = group.0, count = members.len(), "rc::release_group");

        for member in members {
            let out_edges = std::mem::take(&mut self.nodes[member.index()].out_edges);
            self.nodes[member.index()].payload = None;
            for target in out_edges {
                // Best-effort: the edge owner is gone, so this is a
                // teardown-time decrement, not a checked unref.
                let target_group = self.nodes[target.index()].group;
                if self.is_sentinel(target_group) {
                    continue;
                }
                if self.groups[target_group.0 as usize].is_some() {
                    self.group_mut(target_group).sub(1);
                    if self.group(target_group).count() == 0 {
                        self.release_group(target_group);
                    }
                }
            }
        }
    }

    /// Recorded `ref2` targets for `id`, in insertion order.
    pub fn out_edges(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].out_edges
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every live node id, in allocation order. Used by callers needing
    /// a full-graph sweep (e.g. reverse-reachability for dup-on-demand).
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter_map(move |idx| {
            let id = NodeId(idx as u32);
            self.nodes[idx].payload.is_some().then_some(id)
        })
    }

    pub(crate) fn individual_count(&self, id: NodeId) -> usize {
        self.nodes[id.index()].individual_count
    }

    pub(crate) fn set_frozen_group(&mut self, id: NodeId, group: GroupId) {
        self.nodes[id.index()].group = group;
        self.nodes[id.index()].frozen = true;
    }

    pub(crate) fn remove_from_group(&mut self, id: NodeId, group: GroupId) {
        if self.is_sentinel(group) {
            return;
        }
        let count = self.individual_count(id);
        let g = self.group_mut(group);
        if let Some(pos) = g.members.iter().position(|&m| m == id) {
            g.members.remove(pos);
        }
        g.sub(count);
    }

    pub(crate) fn group_count_raw(&self, group: GroupId) -> usize {
        self.group(group).count()
    }

    pub(crate) fn group_exists(&self, group: GroupId) -> bool {
        self.groups[group.0 as usize].is_some()
    }

    pub(crate) fn alloc_frozen_group(&mut self) -> Result<GroupId, RcError> {
        self.alloc_group()
    }

    pub(crate) fn push_member_to_group(&mut self, group: GroupId, id: NodeId) {
        self.group_mut(group).members.push(id);
    }

    pub(crate) fn add_to_group_counter(&mut self, group: GroupId, n: usize) {
        self.group_mut(group).add(n);
    }

    pub(crate) fn release_group_cascade(&mut self, group: GroupId) {
        self.release_group(group);
    }

    /// Debug-build leak check: every node whose owner multiset still
    /// sums to a positive count has an unbalanced `ref`/`unref` pair
    /// (spec §4.1 "on owner tracking builds, a per-owner multiset is
    /// maintained for leak ... detection").
    #[cfg(debug_assertions)]
    pub fn check_leaks(&self) -> Result<(), RcError> {
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.payload.is_none() {
                continue;
            }
            let held: usize = node.owners.values().sum();
            if held > 0 {
                return Err(RcError::Leaked(NodeId(idx as u32)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_singleton_group() {
        let mut arena: Arena<&'static str> = Arena::new();
        let n = arena.init("a", "test").unwrap();
        assert_eq!(arena.group_count_raw(arena.group_of(n)), 1);
        assert!(!arena.is_frozen(n));
    }

    #[test]
    fn ref2_merges_mutable_groups() {
        let mut arena: Arena<&'static str> = Arena::new();
        let a = arena.init("a", "test").unwrap();
        let b = arena.init("b", "test").unwrap();
        assert_ne!(arena.group_of(a), arena.group_of(b));
        arena.ref2(b, a).unwrap();
        assert_eq!(arena.group_of(a), arena.group_of(b));
    }

    #[test]
    fn unref_to_zero_releases_group() {
        let mut arena: Arena<&'static str> = Arena::new();
        let a = arena.init("a", "test").unwrap();
        let g = arena.group_of(a);
        arena.unref(a, "test").unwrap();
        assert!(!arena.group_exists(g));
    }

    #[test]
    fn double_unref_is_detected_in_debug() {
        let mut arena: Arena<&'static str> = Arena::new();
        let a = arena.init("a", "test").unwrap();
        arena.unref(a, "test").unwrap();
        #[cfg(debug_assertions)]
        assert!(arena.unref(a, "test").is_err());
    }

    #[test]
    fn sentinel_group_reserved_at_zero() {
        assert_eq!(GroupId::SENTINEL.0, 0);
    }
}
