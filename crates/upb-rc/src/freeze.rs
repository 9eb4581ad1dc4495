use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::arena::{Arena, FreezeStats};
use crate::{GroupId, NodeId, RcError};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Black, // unseen
    Gray,  // reachable from a root, scheduled
    Green, // on the Tarjan stack
    White, // assigned to an SCC
}

struct TarjanState {
    color: HashMap<NodeId, Color>,
    index: HashMap<NodeId, usize>,
    lowlink: HashMap<NodeId, usize>,
    next_index: usize,
    stack: Vec<NodeId>,
    on_stack: HashSet<NodeId>,
    sccs: Vec<Vec<NodeId>>,
}

impl TarjanState {
    fn new() -> Self {
        TarjanState {
            color: HashMap::new(),
            index: HashMap::new(),
            lowlink: HashMap::new(),
            next_index: 0,
            stack: Vec::new(),
            on_stack: HashSet::new(),
            sccs: Vec::new(),
        }
    }
}

/// Explicit call-frame for the iterative Tarjan walk, replacing the
/// source's recursion (and its `setjmp`/`longjmp` depth bailout) with
/// a plain `Vec`-backed stack and an explicit depth check (spec §9:
/// "a systems-language port should use explicit result types").
struct Frame {
    node: NodeId,
    child_idx: usize,
}

/// Phase 1 of freeze: discover strongly-connected components among
/// mutable nodes reachable from `roots`, without mutating any node's
/// group pointer yet (spec §4.1 "allocation-first, idempotent under
/// failure").
fn tarjan<T>(arena: &Arena<T>, roots: &[NodeId], max_depth: usize) -> Result<Vec<Vec<NodeId>>, RcError> {
    let mut st = TarjanState::new();

    for &root in roots {
        if arena.is_frozen(root) {
            continue;
        }
        if st.color.get(&root).copied().unwrap_or(Color::Black) != Color::Black {
            continue;
        }
        run_from(arena, root, &mut st, max_depth)?;
    }

    Ok(st.sccs)
}

fn run_from<T>(
    arena: &Arena<T>,
    start: NodeId,
    st: &mut TarjanState,
    max_depth: usize,
) -> Result<(), RcError> {
    let mut frames: Vec<Frame> = vec![Frame { node: start, child_idx: 0 }];
    st.color.insert(start, Color::Gray);
    start_visit(start, st);

    while let Some(frame) = frames.last_mut() {
        if frames.len() > max_depth {
            return Err(RcError::DepthExceeded { max_depth });
        }
        let node = frame.node;
        let children = arena.out_edges(node);

        if frame.child_idx < children.len() {
            let child = children[frame.child_idx];
            frame.child_idx += 1;

            if arena.is_frozen(child) {
                // Already frozen: a leaf w.r.t. this SCC computation,
                // handled by the crossref pass instead.
                continue;
            }

            match st.color.get(&child).copied().unwrap_or(Color::Black) {
                Color::Black => {
                    st.color.insert(child, Color::Gray);
                    start_visit(child, st);
                    frames.push(Frame { node: child, child_idx: 0 });
                }
                Color::Green => {
                    let child_index = st.index[&child];
                    let lower = st.lowlink[&node].min(child_index);
                    st.lowlink.insert(node, lower);
                }
                Color::Gray | Color::White => {}
            }
            continue;
        }

        // All children visited; pop and finalize this node.
        frames.pop();
        if let Some(parent) = frames.last() {
            let parent_low = st.lowlink[&parent.node];
            let node_low = st.lowlink[&node];
            st.lowlink.insert(parent.node, parent_low.min(node_low));
        }

        if st.lowlink[&node] == st.index[&node] {
            let mut scc = Vec::new();
            loop {
                let w = st.stack.pop().expect("Tarjan stack underflow");
                st.on_stack.remove(&w);
                st.color.insert(w, Color::White);
                scc.push(w);
                if w == node {
                    break;
                }
            }
            st.sccs.push(scc);
        }
    }
    Ok(())
}

fn start_visit(node: NodeId, st: &mut TarjanState) {
    st.index.insert(node, st.next_index);
    st.lowlink.insert(node, st.next_index);
    st.next_index += 1;
    st.stack.push(node);
    st.on_stack.insert(node);
    st.color.insert(node, Color::Green);
}

impl<T> Arena<T> {
    /// Transitions the transitive closure of `roots` from mutable to
    /// frozen, per spec §4.1's four-pass algorithm:
    ///
    /// 1. Tarjan SCC discovery (no mutation).
    /// 2. Commit: move each node into its new frozen group.
    /// 3. Crossref: account for edges that now cross group boundaries.
    /// 4. Sweep: free any old mutable group left with a zero counter.
    ///
    /// On failure (depth exceeded, or the group table cannot grow) the
    /// graph is left exactly as it was: phase 1 performs no mutation,
    /// so a failure there is automatically a no-op.
    pub fn freeze(&mut self, roots: &[NodeId], max_depth: usize) -> Result<FreezeStats, RcError> {
        let sccs = tarjan(self, roots, max_depth)?;

        // Phase 1b: pre-allocate every new group before mutating
        // anything, so phase 2 cannot fail (spec: "allocation-first").
        let mut new_groups = Vec::with_capacity(sccs.len());
        for _ in &sccs {
            new_groups.push(self.alloc_frozen_group()?);
        }

        let mut node_to_new_group: HashMap<NodeId, GroupId> = HashMap::new();
        for (scc, &group) in sccs.iter().zip(&new_groups) {
            for &node in scc {
                node_to_new_group.insert(node, group);
            }
        }

        // Phase 2: commit.
        let mut touched_old_groups: HashSet<GroupId> = HashSet::new();
        for (scc, &new_group) in sccs.iter().zip(&new_groups) {
            for &node in scc {
                let old_group = self.group_of(node);
                touched_old_groups.insert(old_group);
                let weight = self.individual_count(node);
                self.remove_from_group(node, old_group);
                self.set_frozen_group(node, new_group);
                self.push_member_to_group(new_group, node);
                self.add_to_group_counter(new_group, weight);
            }
        }

        // Phase 3: crossref. Any edge from a node we just froze to a
        // node in a *different* new group needs its target's counter
        // bumped exactly once per distinct source group (spec I2).
        let mut counted: HashSet<(GroupId, GroupId)> = HashSet::new();
        for (scc, &from_group) in sccs.iter().zip(&new_groups) {
            for &node in scc {
                let edges: Vec<NodeId> = self.out_edges(node).to_vec();
                for target in edges {
                    let to_group = self.group_of(target);
                    if to_group == from_group {
                        continue;
                    }
                    if counted.insert((from_group, to_group)) {
                        self.add_to_group_counter(to_group, 1);
                    }
                }
            }
        }

        // Phase 4: sweep old mutable groups whose counter dropped to zero.
        let mut groups_swept = 0;
        for old_group in touched_old_groups {
            if old_group == GroupId::SENTINEL {
                continue;
            }
            if self.group_exists(old_group) && self.group_count_raw(old_group) == 0 {
                self.release_group_cascade(old_group);
                groups_swept += 1;
            }
        }

        let stats = FreezeStats {
            nodes_frozen: sccs.iter().map(Vec::len).sum(),
            groups_created: new_groups.len(),
            groups_swept,
        };
        debug!(?stats, "rc::freeze complete");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_single_node_creates_one_group() {
        let mut arena: Arena<&'static str> = Arena::new();
        let a = arena.init("a", "t").unwrap();
        let stats = arena.freeze(&[a], 64).unwrap();
        assert_eq!(stats.nodes_frozen, 1);
        assert_eq!(stats.groups_created, 1);
        assert!(arena.is_frozen(a));
    }

    #[test]
    fn freeze_isolates_cycle_into_one_group() {
        let mut arena: Arena<&'static str> = Arena::new();
        let a = arena.init("a", "t").unwrap();
        let b = arena.init("b", "t").unwrap();
        arena.ref2(b, a).unwrap();
        arena.ref2(a, b).unwrap();
        let stats = arena.freeze(&[a], 64).unwrap();
        assert_eq!(stats.groups_created, 1);
        assert_eq!(arena.group_of(a), arena.group_of(b));
    }

    #[test]
    fn freeze_splits_unrelated_nodes_into_distinct_groups() {
        let mut arena: Arena<&'static str> = Arena::new();
        let a = arena.init("a", "t").unwrap();
        let b = arena.init("b", "t").unwrap();
        arena.ref2(b, a).unwrap(); // a -> b, no back edge: not a cycle
        let stats = arena.freeze(&[a], 64).unwrap();
        assert_eq!(stats.groups_created, 2);
        assert_ne!(arena.group_of(a), arena.group_of(b));
    }

    #[test]
    fn freeze_depth_exceeded_leaves_graph_untouched() {
        let mut arena: Arena<&'static str> = Arena::new();
        let mut prev = arena.init("0", "t").unwrap();
        for i in 1..10 {
            let n = arena.init(Box::leak(i.to_string().into_boxed_str()), "t").unwrap();
            arena.ref2(n, prev).unwrap();
            prev = n;
        }
        let root = NodeId(0);
        let before_groups = (0..arena.node_count())
            .map(|i| arena.group_of(NodeId(i as u32)))
            .collect::<Vec<_>>();
        let err = arena.freeze(&[root], 3).unwrap_err();
        assert_eq!(err, RcError::DepthExceeded { max_depth: 3 });
        for i in 0..arena.node_count() {
            assert!(!arena.is_frozen(NodeId(i as u32)));
            assert_eq!(arena.group_of(NodeId(i as u32)), before_groups[i]);
        }
    }

    #[test]
    fn crossref_bumps_target_group_once_per_source() {
        let mut arena: Arena<&'static str> = Arena::new();
        let a = arena.init("a", "t").unwrap();
        let b = arena.init("b", "t").unwrap();
        arena.ref2(b, a).unwrap();
        arena.freeze(&[a, b], 64).unwrap();
        // b is referenced once externally (its own init) plus once
        // crossref from a's group.
        assert_eq!(arena.group_count_raw(arena.group_of(b)), 2);
    }
}
