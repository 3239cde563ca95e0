//! Partition assignment, export/import list representation and the stages
//! that transform one into the other.
//!
//! The raw C-style parallel arrays of a graph partitioner become one record
//! per entry here ([`ExportEntry`], [`ImportEntry`]); every stage of the
//! pipeline consumes and augments the same two sorted lists.

pub mod lists;
pub mod oracle;
pub mod overlap;
pub mod plan;
pub mod wells;

use serde::{Deserialize, Serialize};

/// One participating process.
pub type Rank = usize;

/// Role of a cell on the rank that holds it.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CellAttribute {
    /// Authoritatively resident.
    Owner = 0,
    /// Read-only halo replica.
    Copy = 1,
}

/// A cell that moves (or is replicated) to a destination rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    /// Stable, process-independent cell id.
    pub global: usize,
    /// Destination rank.
    pub to: Rank,
    /// Role the cell takes on the destination.
    pub attr: CellAttribute,
}

impl ExportEntry {
    pub fn owner(global: usize, to: Rank) -> Self {
        Self {
            global,
            to,
            attr: CellAttribute::Owner,
        }
    }
    pub fn copy(global: usize, to: Rank) -> Self {
        Self {
            global,
            to,
            attr: CellAttribute::Copy,
        }
    }
}

/// A cell this rank will hold, and where its data comes from.
///
/// `local` stays unresolved until the local grid is materialized; after
/// [`crate::distribute::resolve_local_indices`] the resolved indices form a
/// dense 0-based range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEntry {
    pub global: usize,
    /// Rank the cell's data is sourced from (the owner, for halo entries).
    pub from: Rank,
    pub attr: CellAttribute,
    pub local: Option<usize>,
}

impl ImportEntry {
    pub fn owner(global: usize, from: Rank) -> Self {
        Self {
            global,
            from,
            attr: CellAttribute::Owner,
            local: None,
        }
    }
    pub fn copy(global: usize, from: Rank) -> Self {
        Self {
            global,
            from,
            attr: CellAttribute::Copy,
            local: None,
        }
    }
}

pub use lists::make_import_export_lists;
pub use oracle::{GreedyGrowPartitioner, Partitioner};
pub use overlap::{HaloExchange, OverlapOptions, add_overlap_layers, exchange_overlap};
pub use plan::{PartitionMode, PartitionPlan, RawLists, scatter_assignment, validate_assignment};
pub use wells::{Well, WellConnections, defunct_well_names, repair_well_partitions};
