//! Overlap (halo) layer construction and distribution.
//!
//! After ownership is fixed, each rank receives read-only copies of the
//! cells within `layers` face-hops of its owned region. A face with zero
//! transmissibility does not spread overlap when a transmissibility array is
//! given; the corner-cell option additionally admits the 26-point Cartesian
//! neighbourhood, which has no connecting face and is therefore never gated.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::comm::wire::{WireCellRec, cast_slice, cast_slice_mut};
use crate::comm::{Communicator, ScatterTags, broadcast_flag, scatter_counts, scatterv};
use crate::error::GridScatterError;
use crate::partition::{ImportEntry, Rank};
use crate::topology::GridTopology;

/// Shape of the overlap region around each rank's owned cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapOptions {
    /// Number of face-hop layers. Zero disables the overlap entirely.
    pub layers: usize,
    /// Also replicate edge- and vertex-adjacent Cartesian neighbours.
    pub add_corner_cells: bool,
}

impl Default for OverlapOptions {
    fn default() -> Self {
        Self {
            layers: 1,
            add_corner_cells: false,
        }
    }
}

/// Per destination rank, the `(global cell, owner rank)` copies it receives.
/// Each inner list is sorted by global id.
pub fn add_overlap_layers(
    topo: &GridTopology,
    parts: &[Rank],
    trans: Option<&[f64]>,
    n_ranks: usize,
    opts: &OverlapOptions,
) -> Result<Vec<Vec<(usize, Rank)>>, GridScatterError> {
    if let Some(t) = trans {
        if t.len() != topo.num_faces() {
            return Err(GridScatterError::TransmissibilityLength {
                expected: topo.num_faces(),
                got: t.len(),
            });
        }
    }
    debug_assert_eq!(parts.len(), topo.num_cells());

    let cart_to_comp = opts.add_corner_cells.then(|| topo.cartesian_to_compressed());
    let mut halos: Vec<Vec<(usize, Rank)>> = vec![Vec::new(); n_ranks];

    for (rank, halo) in halos.iter_mut().enumerate() {
        let mut in_halo: HashSet<usize> = HashSet::new();
        let mut frontier: Vec<usize> = (0..topo.num_cells())
            .filter(|&c| parts[c] == rank)
            .collect();

        for _ in 0..opts.layers {
            let mut next = Vec::new();
            for &cell in &frontier {
                let mut admit = |candidate: usize, next: &mut Vec<usize>| {
                    if parts[candidate] != rank && in_halo.insert(candidate) {
                        next.push(candidate);
                    }
                };
                for (nbr, face) in topo.neighbors(cell) {
                    if let Some(t) = trans {
                        if t[face] == 0.0 {
                            continue;
                        }
                    }
                    admit(nbr, &mut next);
                }
                if let Some(map) = &cart_to_comp {
                    for nbr in topo.corner_neighbors(cell, map) {
                        admit(nbr, &mut next);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        let mut cells: Vec<usize> = in_halo.into_iter().collect();
        cells.sort_unstable();
        halo.extend(cells.into_iter().map(|c| (c, parts[c])));
    }
    Ok(halos)
}

/// What the overlap stage leaves on one rank.
#[derive(Clone, Debug, Default)]
pub struct HaloExchange {
    /// Copy entries this rank imports, sorted by global id.
    pub copies: Vec<ImportEntry>,
    /// `(owned global cell, peer rank)` pairs this rank must serve.
    pub duties: Vec<(usize, Rank)>,
}

/// Compute the overlap on the root and deliver each rank its copies and
/// serving duties. Collective; every rank must call it.
pub fn exchange_overlap<C: Communicator>(
    comm: &C,
    root: usize,
    root_data: Option<(&GridTopology, &[Rank], Option<&[f64]>)>,
    opts: &OverlapOptions,
    tags: &ScatterTags,
) -> Result<HaloExchange, GridScatterError> {
    let me = comm.rank();
    let n_ranks = comm.size();

    let halos = match root_data {
        Some((topo, parts, trans)) => {
            Some(add_overlap_layers(topo, parts, trans, n_ranks, opts))
        }
        None if me == root => Some(Err(GridScatterError::MissingRootTopology { root })),
        None => None,
    };

    let ok = broadcast_flag(
        comm,
        root,
        halos.as_ref().map(|h| h.is_ok()).unwrap_or(true),
        tags.halo_ok,
    )?;
    let halos = match halos {
        Some(result) => Some(result?),
        None => None,
    };
    if !ok {
        return Err(GridScatterError::RemoteAbort);
    }

    if let (Some(halos), Some((_, parts, _))) = (&halos, root_data) {
        for (rank, halo) in halos.iter().enumerate() {
            let owned = parts.iter().filter(|&&p| p == rank).count();
            log::info!(
                "rank {rank}: {owned} owned, {} overlap, {} total cells",
                halo.len(),
                owned + halo.len()
            );
        }
    }

    // Duties are the transpose of the copies: if rank r copies cell g from
    // its owner, the owner must serve (g, r).
    let (import_payloads, duty_payloads) = match &halos {
        Some(halos) => {
            let mut duties: Vec<Vec<WireCellRec>> = vec![Vec::new(); n_ranks];
            for (rank, halo) in halos.iter().enumerate() {
                for &(cell, owner) in halo {
                    duties[owner].push(WireCellRec::new(cell, rank));
                }
            }
            let imports: Vec<Vec<u8>> = halos
                .iter()
                .map(|halo| {
                    let recs: Vec<WireCellRec> = halo
                        .iter()
                        .map(|&(cell, owner)| WireCellRec::new(cell, owner))
                        .collect();
                    cast_slice(&recs).to_vec()
                })
                .collect();
            let duties: Vec<Vec<u8>> = duties.iter().map(|v| cast_slice(v).to_vec()).collect();
            (Some(imports), Some(duties))
        }
        None => (None, None),
    };

    let copies = scatter_cell_recs(
        comm,
        root,
        import_payloads.as_deref(),
        tags.halo_import_sizes,
        tags.halo_imports,
    )?;
    let duties = scatter_cell_recs(
        comm,
        root,
        duty_payloads.as_deref(),
        tags.halo_duty_sizes,
        tags.halo_duties,
    )?;

    Ok(HaloExchange {
        copies: copies
            .into_iter()
            .map(|(global, from)| ImportEntry::copy(global, from))
            .collect(),
        duties,
    })
}

fn scatter_cell_recs<C: Communicator>(
    comm: &C,
    root: usize,
    payloads: Option<&[Vec<u8>]>,
    size_tag: crate::comm::CommTag,
    payload_tag: crate::comm::CommTag,
) -> Result<Vec<(usize, Rank)>, GridScatterError> {
    let counts: Option<Vec<u64>> = payloads.map(|ps| {
        ps.iter()
            .map(|p| (p.len() / WireCellRec::SIZE) as u64)
            .collect()
    });
    let my_count = scatter_counts(comm, root, counts.as_deref(), size_tag)? as usize;
    let bytes = scatterv(
        comm,
        root,
        payloads,
        my_count * WireCellRec::SIZE,
        payload_tag,
    )?;
    let mut recs = vec![WireCellRec::new(0, 0); my_count];
    cast_slice_mut(&mut recs).copy_from_slice(&bytes);
    Ok(recs.iter().map(|r| (r.global(), r.rank())).collect())
}
