//! The end-to-end distribution pipeline.
//!
//! [`scatter_grid`] is the one entry point a simulator calls: it runs the
//! oracle on the root, repairs well placement, scatters the assignment,
//! attaches the overlap and hands every rank a [`Distribution`] describing
//! the cells it holds and the interfaces it shares with its neighbours.
//!
//! The call is collective. Every rank passes the same options; only the
//! root passes the grid topology, transmissibilities and wells.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::comm::{Communicator, ScatterTags};
use crate::error::GridScatterError;
use crate::partition::{
    CellAttribute, ExportEntry, ImportEntry, OverlapOptions, PartitionMode, Partitioner, Rank,
    Well, WellConnections, defunct_well_names, exchange_overlap, repair_well_partitions,
    scatter_assignment,
};
use crate::topology::{ConnectivityGraph, EdgeWeightMethod, GridTopology};

/// Knobs for one [`scatter_grid`] run. Identical on every rank.
#[derive(Clone, Copy, Debug)]
pub struct ScatterOptions {
    /// Rank holding the serial grid.
    pub root: usize,
    pub mode: PartitionMode,
    pub edge_weights: EdgeWeightMethod,
    pub overlap: OverlapOptions,
    /// Chain each well's cells in the oracle graph so the oracle itself
    /// tends to keep wells whole; the explicit repair still runs either way.
    pub wire_well_edges: bool,
    pub tags: ScatterTags,
}

impl Default for ScatterOptions {
    fn default() -> Self {
        Self {
            root: 0,
            mode: PartitionMode::default(),
            edge_weights: EdgeWeightMethod::default(),
            overlap: OverlapOptions::default(),
            wire_well_edges: true,
            tags: ScatterTags::default(),
        }
    }
}

/// Pairwise communication pattern with neighbouring ranks.
///
/// For each neighbour, `send` holds the local indices of owned cells served
/// to it and `recv` the local indices of the copies received from it, both
/// ordered by the cells' global ids. The two sides of one link list the
/// same cells in the same order, so packing with the send list on rank A
/// and unpacking with the receive list on rank B lines the data up.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceMap {
    send: BTreeMap<Rank, Vec<usize>>,
    recv: BTreeMap<Rank, Vec<usize>>,
}

impl InterfaceMap {
    /// Local indices of the owned cells to pack for `peer`.
    pub fn send_to(&self, peer: Rank) -> &[usize] {
        self.send.get(&peer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Local indices of the copies to unpack from `peer`.
    pub fn recv_from(&self, peer: Rank) -> &[usize] {
        self.recv.get(&peer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ranks this rank exchanges halo data with, ascending.
    pub fn neighbors(&self) -> Vec<Rank> {
        let mut out: Vec<Rank> = self.send.keys().chain(self.recv.keys()).copied().collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.send.is_empty() && self.recv.is_empty()
    }
}

/// Everything one rank needs to build its local grid view.
#[derive(Clone, Debug)]
pub struct Distribution {
    pub rank: Rank,
    /// Cells this rank handed off, sorted by global id. Root only, in
    /// practice; receiving ranks export nothing.
    pub exports: Vec<ExportEntry>,
    /// Cells this rank holds: owners first, then copies, each segment
    /// sorted by global id, `local` resolved to a dense 0-based range.
    pub imports: Vec<ImportEntry>,
    /// Length of the owner prefix of `imports`.
    pub num_owned: usize,
    pub interface: InterfaceMap,
    /// Wells with no perforation owned by this rank.
    pub defunct_wells: Vec<String>,
}

impl Distribution {
    /// Owned plus copied cells on this rank.
    pub fn num_cells(&self) -> usize {
        self.imports.len()
    }

    pub fn is_owned(&self, local: usize) -> bool {
        local < self.num_owned
    }

    pub fn local_to_global(&self, local: usize) -> usize {
        self.imports[local].global
    }

    pub fn global_to_local(&self, global: usize) -> Option<usize> {
        let owners = &self.imports[..self.num_owned];
        let copies = &self.imports[self.num_owned..];
        if let Ok(i) = owners.binary_search_by_key(&global, |e| e.global) {
            return Some(i);
        }
        copies
            .binary_search_by_key(&global, |e| e.global)
            .ok()
            .map(|i| self.num_owned + i)
    }
}

/// Sort the inventory (owners first, then copies, by global id within each
/// segment), assign dense local indices and return the owner count.
pub fn resolve_local_indices(imports: &mut [ImportEntry]) -> usize {
    imports.sort_by_key(|e| (e.attr, e.global));
    for (local, entry) in imports.iter_mut().enumerate() {
        entry.local = Some(local);
    }
    imports
        .iter()
        .filter(|e| e.attr == CellAttribute::Owner)
        .count()
}

/// Partition and distribute the root's grid across all ranks. Collective.
pub fn scatter_grid<C, P>(
    comm: &C,
    topo: Option<&GridTopology>,
    trans: Option<&[f64]>,
    wells: &[Well],
    oracle: &P,
    opts: &ScatterOptions,
) -> Result<Distribution, GridScatterError>
where
    C: Communicator,
    P: Partitioner,
{
    let me = comm.rank();
    let root = opts.root;

    // Root-side preparation: oracle, then well repair, as one fallible unit
    // whose failure the assignment stage broadcasts to everyone.
    let mut well_owners: Option<Vec<(String, Rank)>> = None;
    let parts_on_root = if me == root {
        Some(prepare_assignment(
            comm.size(),
            topo,
            trans,
            wells,
            oracle,
            opts,
            &mut well_owners,
        ))
    } else {
        None
    };

    let plan = scatter_assignment(comm, root, parts_on_root, opts.mode, &opts.tags)?;

    if me == root {
        if let Some(parts) = &plan.parts {
            log_balance(comm.size(), parts);
        }
    }

    let root_data = match (me == root, topo, &plan.parts) {
        (true, Some(topo), Some(parts)) => Some((topo, parts.as_slice(), trans)),
        _ => None,
    };
    let halo = exchange_overlap(comm, root, root_data, &opts.overlap, &opts.tags)?;

    let defunct_wells = defunct_well_names(comm, root, well_owners.as_deref(), &opts.tags)?;

    let mut imports = plan.imports;
    imports.extend(halo.copies.iter().copied());
    let num_owned = resolve_local_indices(&mut imports);

    // Interface lists hold local indices; both segments of `imports` are
    // sorted by global id, so per-peer order stays global-id order.
    let mut interface = InterfaceMap::default();
    for (offset, entry) in imports[num_owned..].iter().enumerate() {
        interface
            .recv
            .entry(entry.from)
            .or_default()
            .push(num_owned + offset);
    }
    let owners = &imports[..num_owned];
    for &(global, peer) in &halo.duties {
        let local = owners
            .binary_search_by_key(&global, |e| e.global)
            .map_err(|_| GridScatterError::CommError {
                neighbor: peer,
                reason: format!("asked to serve cell {global} this rank does not own"),
            })?;
        interface.send.entry(peer).or_default().push(local);
    }

    log::debug!(
        "rank {me}: {num_owned} owned cells, {} copies, {} defunct wells",
        imports.len() - num_owned,
        defunct_wells.len()
    );

    Ok(Distribution {
        rank: me,
        exports: plan.exports,
        imports,
        num_owned,
        interface,
        defunct_wells,
    })
}

fn prepare_assignment<P: Partitioner>(
    n_ranks: usize,
    topo: Option<&GridTopology>,
    trans: Option<&[f64]>,
    wells: &[Well],
    oracle: &P,
    opts: &ScatterOptions,
    well_owners: &mut Option<Vec<(String, Rank)>>,
) -> Result<Vec<Rank>, GridScatterError> {
    let topo = topo.ok_or(GridScatterError::MissingRootTopology { root: opts.root })?;
    let connections = WellConnections::new(wells, topo);

    let graph = if opts.wire_well_edges && !connections.is_empty() {
        ConnectivityGraph::with_well_edges(topo, trans, opts.edge_weights, &connections)?
    } else {
        ConnectivityGraph::from_topology(topo, trans, opts.edge_weights)?
    };

    let mut parts = oracle.partition(&graph, n_ranks)?;
    let owners = repair_well_partitions(&connections, &mut parts)?;
    *well_owners = Some(owners);
    Ok(parts)
}

fn log_balance(n_ranks: usize, parts: &[Rank]) {
    let mut counts = vec![0usize; n_ranks];
    for &p in parts {
        if p < n_ranks {
            counts[p] += 1;
        }
    }
    let (min, max) = counts
        .iter()
        .minmax()
        .into_option()
        .unwrap_or((&0, &0));
    log::info!(
        "distributing {} cells over {n_ranks} ranks (min {min}, max {max})",
        parts.len()
    );
    for (rank, count) in counts.iter().enumerate() {
        log::info!("  rank {rank}: {count} owned cells");
    }
}
