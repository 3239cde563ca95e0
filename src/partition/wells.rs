//! Well-aware partition repair.
//!
//! A well perforates a column of cells; the simulator requires all of them
//! on one rank. The oracle knows nothing about wells, so after it runs the
//! root reassigns every well's cells to a single winner rank: the rank that
//! already owns strictly the most of them, ties broken towards the lowest
//! rank id. Wells sharing a cell are repaired together as one group, since
//! moving one would otherwise split the other.

use std::collections::{BTreeMap, BTreeSet};

use crate::comm::{Communicator, ScatterTags, broadcast_bytes};
use crate::error::GridScatterError;
use crate::partition::Rank;
use crate::topology::GridTopology;

/// A well as the input deck describes it: a name and IJK perforations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Well {
    pub name: String,
    pub perforations: Vec<[usize; 3]>,
}

/// Per-well sets of perforated *active* cells, in compressed indices.
/// Perforations landing on inactive cells are dropped here; a well may end
/// up with no cells at all.
#[derive(Clone, Debug, Default)]
pub struct WellConnections {
    names: Vec<String>,
    cells: Vec<BTreeSet<usize>>,
}

impl WellConnections {
    pub fn new(wells: &[Well], topo: &GridTopology) -> Self {
        let [nx, ny, nz] = topo.cartesian_dims();
        let map = topo.cartesian_to_compressed();
        let mut names = Vec::with_capacity(wells.len());
        let mut cells = Vec::with_capacity(wells.len());
        for well in wells {
            let mut set = BTreeSet::new();
            for &[i, j, k] in &well.perforations {
                if i >= nx || j >= ny || k >= nz {
                    continue;
                }
                let compressed = map[i + nx * (j + ny * k)];
                if compressed >= 0 {
                    set.insert(compressed as usize);
                }
            }
            names.push(well.name.clone());
            cells.push(set);
        }
        Self { names, cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn name(&self, well: usize) -> &str {
        &self.names[well]
    }

    pub fn cells(&self, well: usize) -> &BTreeSet<usize> {
        &self.cells[well]
    }

    pub fn iter(&self) -> impl Iterator<Item = &BTreeSet<usize>> {
        self.cells.iter()
    }
}

/// Collapse every well (group) onto a single rank, editing `parts` in place.
///
/// Returns the owner rank per well, in well order. Wells without active
/// cells are pinned to rank 0. Runs on the rank holding the full assignment.
pub fn repair_well_partitions(
    connections: &WellConnections,
    parts: &mut [Rank],
) -> Result<Vec<(String, Rank)>, GridScatterError> {
    let groups = well_groups(connections);
    let mut owner = vec![0 as Rank; connections.len()];

    for group in &groups {
        let mut group_cells: BTreeSet<usize> = BTreeSet::new();
        for &well in group {
            group_cells.extend(connections.cells(well).iter().copied());
        }
        if group_cells.is_empty() {
            continue;
        }
        // Ascending map iteration makes the lowest rank win ties.
        let mut tally: BTreeMap<Rank, usize> = BTreeMap::new();
        for &cell in &group_cells {
            *tally.entry(parts[cell]).or_insert(0) += 1;
        }
        let mut winner = 0;
        let mut best = 0usize;
        for (&rank, &count) in &tally {
            if count > best {
                best = count;
                winner = rank;
            }
        }
        if tally.len() > 1 {
            for &well in group {
                log::warn!(
                    "moving well {} to rank {winner} to keep it on one rank",
                    connections.name(well)
                );
            }
        }
        for &cell in &group_cells {
            parts[cell] = winner;
        }
        for &well in group {
            owner[well] = winner;
        }
    }

    for well in 0..connections.len() {
        let mut ranks = connections.cells(well).iter().map(|&c| parts[c]);
        if let Some(first) = ranks.next() {
            if ranks.any(|r| r != first) {
                return Err(GridScatterError::DistributedWell {
                    well: connections.name(well).to_string(),
                });
            }
        }
    }

    Ok(connections
        .names
        .iter()
        .cloned()
        .zip(owner)
        .collect())
}

/// Wells connected through shared cells, as index groups.
fn well_groups(connections: &WellConnections) -> Vec<Vec<usize>> {
    let n = connections.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let mut cell_owner: BTreeMap<usize, usize> = BTreeMap::new();
    for well in 0..n {
        for &cell in connections.cells(well) {
            match cell_owner.get(&cell) {
                Some(&other) => {
                    let (a, b) = (find(&mut parent, well), find(&mut parent, other));
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
                None => {
                    cell_owner.insert(cell, well);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for well in 0..n {
        let root = find(&mut parent, well);
        groups.entry(root).or_default().push(well);
    }
    groups.into_values().collect()
}

/// Broadcast the well ownership table from `root` and return the names of
/// the wells that are *not* resident on this rank. Collective.
pub fn defunct_well_names<C: Communicator>(
    comm: &C,
    root: usize,
    owners_on_root: Option<&[(String, Rank)]>,
    tags: &ScatterTags,
) -> Result<Vec<String>, GridScatterError> {
    let me = comm.rank();

    let (names_blob, owners_blob) = match owners_on_root {
        Some(owners) => {
            let names = owners
                .iter()
                .map(|(n, _)| n.as_str())
                .collect::<Vec<_>>()
                .join("\0")
                .into_bytes();
            let ranks: Vec<u8> = owners
                .iter()
                .flat_map(|&(_, r)| (r as u64).to_le_bytes())
                .collect();
            (Some(names), Some(ranks))
        }
        None => (None, None),
    };
    let names = broadcast_bytes(comm, root, names_blob.as_deref(), tags.well_names)?;
    let owners = broadcast_bytes(comm, root, owners_blob.as_deref(), tags.well_owners)?;

    if names.is_empty() {
        return Ok(Vec::new());
    }
    let names = String::from_utf8(names).map_err(|e| GridScatterError::CommError {
        neighbor: root,
        reason: format!("well name table is not UTF-8: {e}"),
    })?;
    let names: Vec<&str> = names.split('\0').collect();
    if owners.len() != names.len() * 8 {
        return Err(GridScatterError::BufferSizeMismatch {
            neighbor: root,
            expected: names.len() * 8,
            got: owners.len(),
        });
    }

    let mut defunct = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&owners[i * 8..(i + 1) * 8]);
        let rank = u64::from_le_bytes(raw) as usize;
        if rank != me {
            defunct.push((*name).to_string());
        }
    }
    Ok(defunct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{CommTag, LocalComm, NoComm};

    fn strip_well(name: &str, is: &[usize]) -> Well {
        Well {
            name: name.into(),
            perforations: is.iter().map(|&i| [i, 0, 0]).collect(),
        }
    }

    #[test]
    fn connections_skip_inactive_cells() {
        // 3 active cells in a 2x2x1 box; Cartesian slot 2 is inactive.
        let topo = GridTopology::new(
            vec![[Some(0), Some(1)], [Some(1), Some(2)]],
            [2, 2, 1],
            vec![0, 1, 3],
        )
        .unwrap();
        let wells = vec![Well {
            name: "W".into(),
            perforations: vec![[0, 0, 0], [0, 1, 0], [1, 1, 0]],
        }];
        let conns = WellConnections::new(&wells, &topo);
        // [0,1,0] is Cartesian slot 2, inactive, dropped.
        assert_eq!(
            conns.cells(0).iter().copied().collect::<Vec<_>>(),
            vec![0, 2]
        );
    }

    #[test]
    fn majority_rank_wins() {
        let topo = GridTopology::cartesian([5, 1, 1]).unwrap();
        let conns = WellConnections::new(&[strip_well("W", &[0, 1, 2, 3, 4])], &topo);
        let mut parts = vec![1, 1, 1, 1, 0];
        let owners = repair_well_partitions(&conns, &mut parts).unwrap();
        assert_eq!(parts, vec![1, 1, 1, 1, 1]);
        assert_eq!(owners, vec![("W".to_string(), 1)]);
    }

    #[test]
    fn tie_goes_to_lowest_rank() {
        let topo = GridTopology::cartesian([4, 1, 1]).unwrap();
        let conns = WellConnections::new(&[strip_well("W", &[0, 1, 2, 3])], &topo);
        let mut parts = vec![2, 2, 1, 1];
        repair_well_partitions(&conns, &mut parts).unwrap();
        assert_eq!(parts, vec![1, 1, 1, 1]);
    }

    #[test]
    fn overlapping_wells_move_together() {
        let topo = GridTopology::cartesian([6, 1, 1]).unwrap();
        // W1 and W2 share cell 2; repaired as one group.
        let conns = WellConnections::new(
            &[strip_well("W1", &[0, 1, 2]), strip_well("W2", &[2, 3, 4])],
            &topo,
        );
        let mut parts = vec![0, 0, 0, 1, 1, 1];
        let owners = repair_well_partitions(&conns, &mut parts).unwrap();
        assert_eq!(parts[..5], [0, 0, 0, 0, 0]);
        assert_eq!(parts[5], 1);
        assert_eq!(owners[0].1, 0);
        assert_eq!(owners[1].1, 0);
    }

    #[test]
    fn well_without_active_cells_pins_to_rank_zero() {
        let topo = GridTopology::cartesian([2, 1, 1]).unwrap();
        let conns = WellConnections::new(&[strip_well("DRY", &[])], &topo);
        let mut parts = vec![1, 1];
        let owners = repair_well_partitions(&conns, &mut parts).unwrap();
        assert_eq!(owners, vec![("DRY".to_string(), 0)]);
        assert_eq!(parts, vec![1, 1]);
    }

    #[test]
    fn defunct_names_serial() {
        let comm = NoComm;
        let owners = vec![("A".to_string(), 0), ("B".to_string(), 0)];
        let tags = ScatterTags::from_base(CommTag::new(0x4000));
        let defunct = defunct_well_names(&comm, 0, Some(&owners), &tags).unwrap();
        assert!(defunct.is_empty());
    }

    #[test]
    fn defunct_names_two_ranks() {
        let comms = LocalComm::group(2);
        let tags = ScatterTags::from_base(CommTag::new(0x4100));
        let mut handles = Vec::new();
        for comm in comms {
            handles.push(std::thread::spawn(move || {
                let owners = (comm.rank() == 0).then(|| {
                    vec![
                        ("INJ1".to_string(), 0),
                        ("PROD1".to_string(), 1),
                        ("PROD2".to_string(), 1),
                    ]
                });
                defunct_well_names(&comm, 0, owners.as_deref(), &tags).unwrap()
            }));
        }
        let out: Vec<Vec<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(out[0], vec!["PROD1".to_string(), "PROD2".to_string()]);
        assert_eq!(out[1], vec!["INJ1".to_string()]);
    }

    #[test]
    fn no_wells_means_no_defunct_names() {
        let comm = NoComm;
        let tags = ScatterTags::from_base(CommTag::new(0x4200));
        let defunct = defunct_well_names(&comm, 0, Some(&[]), &tags).unwrap();
        assert!(defunct.is_empty());
    }
}
