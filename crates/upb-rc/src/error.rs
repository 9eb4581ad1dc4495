use thiserror::Error;

/// Failure modes of the refcount core (spec §7: AllocFailure, DepthExceeded
/// during freeze, plus the owner-tracking checks debug builds add).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RcError {
    #[error("allocation failed while growing the group table")]
    AllocFailure,
    #[error("freeze exceeded max depth {max_depth} while visiting the graph")]
    DepthExceeded { max_depth: usize },
    #[error("ref2 source node is not mutable (already frozen)")]
    SourceNotMutable,
    #[error("owner {owner:?} double-released node {node:?} (no matching ref held)")]
    DoubleUnref { node: crate::NodeId, owner: &'static str },
    #[error("node {0:?} has outstanding owner refs at process exit (leak)")]
    Leaked(crate::NodeId),
}
