//! Turning the root-resident oracle assignment into per-rank lists.
//!
//! The protocol is fail-safe in the collective sense: the root broadcasts an
//! `ok` flag before every data stage, so a root-side failure (oracle error,
//! out-of-range destination, a rank left with zero cells) aborts every rank
//! instead of deadlocking the ones already waiting in a receive.

use serde::{Deserialize, Serialize};

use crate::comm::wire::{WireCellRec, cast_slice, cast_slice_mut};
use crate::comm::{
    Communicator, ScatterTags, broadcast_bytes, broadcast_flag, scatter_counts, scatterv,
};
use crate::error::GridScatterError;
use crate::partition::lists::make_import_export_lists;
use crate::partition::{ExportEntry, ImportEntry, Rank};

/// How the root distributes the assignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionMode {
    /// Scatter each rank only its own records. Cheapest on the wire; the
    /// full assignment stays on the root.
    #[default]
    RootScatter,
    /// Broadcast the full assignment to every rank. More traffic, but every
    /// rank can afterwards answer "who owns cell g" without asking the root.
    RootBroadcast,
}

/// Outcome of the assignment stage on one rank.
#[derive(Clone, Debug)]
pub struct PartitionPlan {
    pub exports: Vec<ExportEntry>,
    pub imports: Vec<ImportEntry>,
    /// Full cell-to-rank assignment. Always present on the root; present on
    /// every rank in [`PartitionMode::RootBroadcast`].
    pub parts: Option<Vec<Rank>>,
}

/// Raw per-rank move records, before list assembly.
#[derive(Clone, Debug, Default)]
pub struct RawLists {
    /// `(global id, destination)` for every cell resident on this rank.
    pub resident: Vec<(usize, Rank)>,
    /// `(global id, source rank)` records delivered by the scatter.
    pub received: Vec<(usize, Rank)>,
}

/// Root-side sanity check of the oracle output.
pub fn validate_assignment(parts: &[Rank], n_ranks: usize) -> Result<(), GridScatterError> {
    let mut counts = vec![0usize; n_ranks];
    for &dest in parts {
        if dest >= n_ranks {
            return Err(GridScatterError::InvalidPartition {
                destination: dest,
                n_ranks,
            });
        }
        counts[dest] += 1;
    }
    for (rank, &count) in counts.iter().enumerate() {
        if count == 0 {
            return Err(GridScatterError::ZeroOwnedCells { rank });
        }
    }
    Ok(())
}

/// Distribute the root's (possibly failed) assignment and build the
/// export/import lists on every rank. Collective; every rank must call it.
///
/// On the root, `parts_on_root` carries the oracle result; on every other
/// rank it must be `None`.
pub fn scatter_assignment<C: Communicator>(
    comm: &C,
    root: usize,
    parts_on_root: Option<Result<Vec<Rank>, GridScatterError>>,
    mode: PartitionMode,
    tags: &ScatterTags,
) -> Result<PartitionPlan, GridScatterError> {
    let me = comm.rank();
    let n_ranks = comm.size();

    // Stage 1: did the oracle produce anything at all?
    let (parts, oracle_err) = if me == root {
        match parts_on_root {
            Some(Ok(parts)) => (Some(parts), None),
            Some(Err(e)) => (None, Some(e)),
            None => (None, Some(GridScatterError::MissingRootTopology { root })),
        }
    } else {
        (None, None)
    };
    let ok = broadcast_flag(comm, root, oracle_err.is_none(), tags.oracle_ok)?;
    if let Some(e) = oracle_err {
        return Err(e);
    }
    if !ok {
        return Err(GridScatterError::RemoteAbort);
    }

    // Stage 2: is the assignment usable?
    let check = match &parts {
        Some(p) => validate_assignment(p, n_ranks),
        None => Ok(()),
    };
    let ok = broadcast_flag(comm, root, check.is_ok(), tags.lists_ok)?;
    check?;
    if !ok {
        return Err(GridScatterError::RemoteAbort);
    }

    // Stage 3: data.
    let raw = match mode {
        PartitionMode::RootScatter => scatter_records(comm, root, parts.as_deref(), tags)?,
        PartitionMode::RootBroadcast => {
            return broadcast_records(comm, root, parts, tags);
        }
    };

    let (exports, imports) = make_import_export_lists(me, &raw.resident, &raw.received);
    Ok(PartitionPlan {
        exports,
        imports,
        parts,
    })
}

fn scatter_records<C: Communicator>(
    comm: &C,
    root: usize,
    parts: Option<&[Rank]>,
    tags: &ScatterTags,
) -> Result<RawLists, GridScatterError> {
    let me = comm.rank();
    let n_ranks = comm.size();

    let (counts, payloads, resident) = if let Some(parts) = parts {
        let mut per_rank: Vec<Vec<WireCellRec>> = vec![Vec::new(); n_ranks];
        for (global, &dest) in parts.iter().enumerate() {
            if dest != root {
                per_rank[dest].push(WireCellRec::new(global, root));
            }
        }
        let counts: Vec<u64> = per_rank.iter().map(|v| v.len() as u64).collect();
        let payloads: Vec<Vec<u8>> = per_rank.iter().map(|v| cast_slice(v).to_vec()).collect();
        let resident: Vec<(usize, Rank)> =
            parts.iter().enumerate().map(|(g, &d)| (g, d)).collect();
        (Some(counts), Some(payloads), resident)
    } else {
        (None, None, Vec::new())
    };

    let my_count = scatter_counts(comm, root, counts.as_deref(), tags.part_counts)? as usize;
    let bytes = scatterv(
        comm,
        root,
        payloads.as_deref(),
        my_count * WireCellRec::SIZE,
        tags.part_payload,
    )?;

    let mut recs = vec![WireCellRec::new(0, 0); my_count];
    cast_slice_mut(&mut recs).copy_from_slice(&bytes);
    let received: Vec<(usize, Rank)> = recs.iter().map(|r| (r.global(), r.rank())).collect();
    debug_assert!(me != root || received.is_empty());

    Ok(RawLists { resident, received })
}

fn broadcast_records<C: Communicator>(
    comm: &C,
    root: usize,
    parts: Option<Vec<Rank>>,
    tags: &ScatterTags,
) -> Result<PartitionPlan, GridScatterError> {
    let me = comm.rank();

    let payload = parts.as_ref().map(|parts| {
        let recs: Vec<WireCellRec> = parts
            .iter()
            .enumerate()
            .map(|(g, &d)| WireCellRec::new(g, d))
            .collect();
        cast_slice(&recs).to_vec()
    });
    let bytes = broadcast_bytes(comm, root, payload.as_deref(), tags.parts_bcast)?;
    if bytes.len() % WireCellRec::SIZE != 0 {
        return Err(GridScatterError::BufferSizeMismatch {
            neighbor: root,
            expected: bytes.len().next_multiple_of(WireCellRec::SIZE),
            got: bytes.len(),
        });
    }
    let n = bytes.len() / WireCellRec::SIZE;
    let mut recs = vec![WireCellRec::new(0, 0); n];
    cast_slice_mut(&mut recs).copy_from_slice(&bytes);

    let mut parts = vec![0usize; n];
    for r in &recs {
        parts[r.global()] = r.rank();
    }

    let resident: Vec<(usize, Rank)> = if me == root {
        parts.iter().enumerate().map(|(g, &d)| (g, d)).collect()
    } else {
        Vec::new()
    };
    let received: Vec<(usize, Rank)> = if me == root {
        Vec::new()
    } else {
        parts
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == me)
            .map(|(g, _)| (g, root))
            .collect()
    };

    let (exports, imports) = make_import_export_lists(me, &resident, &received);
    Ok(PartitionPlan {
        exports,
        imports,
        parts: Some(parts),
    })
}
