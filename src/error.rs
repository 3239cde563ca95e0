//! GridScatterError: unified error type for the grid-scatter public APIs.
//!
//! Every fallible operation in this crate reports through this enum; there is
//! no panicking path outside of tests. Failures that can leave other ranks
//! stuck in a collective call are never raised locally alone — the detecting
//! rank broadcasts an `ok` flag first, then every rank raises (the root with
//! the descriptive variant, the others with [`GridScatterError::RemoteAbort`]).

use thiserror::Error;

/// Unified error type for grid-scatter operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridScatterError {
    /// A face references a cell index outside the active cell range.
    #[error("face {face} references cell {cell}, but the grid has {num_cells} cells")]
    FaceCellOutOfRange {
        face: usize,
        cell: usize,
        num_cells: usize,
    },
    /// `global_cell` must map every compressed cell to a Cartesian index.
    #[error("global_cell has {got} entries, expected one per active cell ({expected})")]
    GlobalCellLength { expected: usize, got: usize },
    /// A Cartesian index in `global_cell` exceeds the declared Cartesian box.
    #[error("cell {cell} has Cartesian index {cartesian}, but the box holds {capacity}")]
    CartesianIndexOutOfRange {
        cell: usize,
        cartesian: usize,
        capacity: usize,
    },
    /// The transmissibility array must hold one value per face.
    #[error("transmissibility array has {got} entries, expected one per face ({expected})")]
    TransmissibilityLength { expected: usize, got: usize },
    /// The grid has no active cells at all.
    #[error("grid has no active cells")]
    EmptyGrid,
    /// The root rank was asked to partition but holds no grid topology.
    #[error("no grid topology present on root rank {root}")]
    MissingRootTopology { root: usize },
    /// The partition oracle failed to initialize or to produce an assignment.
    #[error("graph partitioner failed: {0}")]
    Partitioner(String),
    /// The oracle assigned a cell to a rank outside the communicator.
    #[error("partitioner sent a cell to rank {destination}, but only {n_ranks} ranks exist")]
    InvalidPartition { destination: usize, n_ranks: usize },
    /// Degenerate partitioning detected on the rank holding the assignment.
    #[error("rank {rank} would own zero cells after partitioning")]
    ZeroOwnedCells { rank: usize },
    /// A well still spans several owning ranks after repair (debug invariant).
    #[error("well `{well}` still spans several ranks after repair")]
    DistributedWell { well: String },
    /// Point-to-point or collective communication with a peer failed.
    #[error("communication with rank {neighbor} failed: {reason}")]
    CommError { neighbor: usize, reason: String },
    /// A peer sent a payload whose size disagrees with the declared count.
    #[error("rank {neighbor} sent {got} bytes, expected {expected}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// Another rank reported a fatal condition; this rank aborts uniformly.
    #[error("aborted: a failure was reported by another rank")]
    RemoteAbort,
}
