//! Refcounted, cycle-tolerant node/group arena with a freeze primitive.
//!
//! This is Component A of the runtime (see the workspace-level design
//! notes): a reference-counted object graph that can be mutated freely
//! while "mutable" and then atomically transitioned ("frozen") into an
//! immutable, concurrently-shareable form. Cycles are tolerated by
//! merging any two nodes joined by a [`Arena::ref2`] edge into one
//! group while both are mutable; freezing runs Tarjan's algorithm to
//! split each merged blob back into its true strongly-connected
//! components and gives each one its own group refcount.
//!
//! The source this is modeled on represents a group as a circular
//! linked list of nodes sharing a counter cell. Here the group is
//! represented as an index into an arena-owned table instead, per the
//! "arena-or-index" mapping suggested for a systems-language port:
//! nodes live in a flat `Vec`, referenced by [`NodeId`], and a group is
//! a `(counter, member list)` pair referenced by [`GroupId`].

mod arena;
mod error;
mod freeze;

pub use arena::{Arena, FreezeStats, Owner};
pub use error::RcError;

/// Opaque handle to a node stored in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw dense index backing this handle.
    ///
    /// Exposed so that callers (e.g. `upb-def`) can use it as a key
    /// into their own side tables without needing a `HashMap<NodeId, _>`.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque handle to a refcount group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub(crate) u32);

impl GroupId {
    /// The sentinel group that static/compile-time-constant nodes live
    /// in (spec §3, invariant I3). `ref`/`unref`/`ref2` against it are
    /// no-ops and it is never swept.
    pub const SENTINEL: GroupId = GroupId(0);
}
