#![cfg_attr(docsrs, feature(doc_cfg))]
//! # grid-scatter
//!
//! grid-scatter decomposes a corner-point simulation grid across the ranks
//! of a distributed-memory run. The serial grid lives on one root rank; a
//! pluggable partition oracle assigns every cell a destination, well
//! perforations are kept together on a single rank, and each rank ends up
//! with its owned cells, a configurable overlap of read-only copies, and
//! the pairwise interface lists needed for later halo updates.
//!
//! ## Features
//! - Connectivity graph construction with optional transmissibility-based
//!   edge weights
//! - Pluggable partition oracles (built-in greedy grower, METIS via the
//!   `metis-support` feature)
//! - Well-aware repair so no well is split across ranks
//! - Overlap layers with transmissibility gating and optional corner cells
//! - Pluggable communication backends (serial, in-process threads, MPI via
//!   the `mpi-support` feature)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! grid-scatter = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "metis-support"]
//! ```
//!
//! A serial run is the degenerate one-rank case of the same pipeline:
//!
//! ```
//! use grid_scatter::prelude::*;
//!
//! let topo = GridTopology::cartesian([4, 4, 2])?;
//! let dist = scatter_grid(
//!     &NoComm,
//!     Some(&topo),
//!     None,
//!     &[],
//!     &GreedyGrowPartitioner,
//!     &ScatterOptions::default(),
//! )?;
//! assert_eq!(dist.num_owned, 32);
//! # Ok::<(), grid_scatter::error::GridScatterError>(())
//! ```

pub mod comm;
pub mod distribute;
pub mod error;
pub mod partition;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{CommTag, Communicator, LocalComm, NoComm, ScatterTags, Wait};
    pub use crate::distribute::{Distribution, InterfaceMap, ScatterOptions, scatter_grid};
    pub use crate::error::GridScatterError;
    #[cfg(feature = "metis-support")]
    pub use crate::partition::oracle::MetisPartitioner;
    pub use crate::partition::{
        CellAttribute, ExportEntry, GreedyGrowPartitioner, ImportEntry, OverlapOptions,
        PartitionMode, Partitioner, Rank, Well, WellConnections,
    };
    pub use crate::topology::{ConnectivityGraph, EdgeWeightMethod, GridTopology};
}
