//! The partition oracle: a pluggable strategy that maps graph vertices to
//! ranks. Runs on the root rank only; the rest of the pipeline treats the
//! assignment as opaque.

use crate::error::GridScatterError;
use crate::partition::Rank;
use crate::topology::ConnectivityGraph;

/// Maps every vertex of the connectivity graph to a destination rank.
pub trait Partitioner {
    fn partition(
        &self,
        graph: &ConnectivityGraph,
        n_parts: usize,
    ) -> Result<Vec<Rank>, GridScatterError>;
}

/// Deterministic fallback oracle: grows `n_parts` contiguous blocks of
/// near-equal size by breadth-first search from the lowest unassigned
/// vertex. No quality guarantees beyond connectedness per block (where the
/// graph permits it), but it needs no external library and its output is
/// reproducible, which the tests rely on.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreedyGrowPartitioner;

impl Partitioner for GreedyGrowPartitioner {
    fn partition(
        &self,
        graph: &ConnectivityGraph,
        n_parts: usize,
    ) -> Result<Vec<Rank>, GridScatterError> {
        let n = graph.num_vertices();
        if n_parts == 0 {
            return Err(GridScatterError::Partitioner(
                "cannot partition into zero parts".into(),
            ));
        }
        let mut parts = vec![usize::MAX; n];
        let target = n.div_ceil(n_parts);
        let mut assigned = 0usize;
        let mut next_seed = 0usize;

        for part in 0..n_parts {
            // Remaining vertices over remaining parts, so the last parts do
            // not starve when earlier blocks ran over target.
            let remaining_parts = n_parts - part;
            let quota = ((n - assigned).div_ceil(remaining_parts)).min(target.max(1));
            if quota == 0 {
                break;
            }
            let mut taken = 0usize;
            let mut queue = std::collections::VecDeque::new();
            while taken < quota && assigned < n {
                if queue.is_empty() {
                    while next_seed < n && parts[next_seed] != usize::MAX {
                        next_seed += 1;
                    }
                    if next_seed == n {
                        break;
                    }
                    queue.push_back(next_seed);
                    parts[next_seed] = part;
                    assigned += 1;
                    taken += 1;
                }
                if let Some(v) = queue.pop_front() {
                    for &nbr in graph.neighbors(v) {
                        if taken < quota && parts[nbr] == usize::MAX {
                            parts[nbr] = part;
                            assigned += 1;
                            taken += 1;
                            queue.push_back(nbr);
                        }
                    }
                }
            }
        }
        // Any leftovers (disconnected tail) go to the last part.
        for p in parts.iter_mut() {
            if *p == usize::MAX {
                *p = n_parts - 1;
            }
        }
        Ok(parts)
    }
}

/// METIS k-way oracle (feature `metis-support`).
#[cfg(feature = "metis-support")]
pub use metis_oracle::MetisPartitioner;

#[cfg(feature = "metis-support")]
mod metis_oracle {
    use super::{Partitioner, Rank};
    use crate::error::GridScatterError;
    use crate::topology::ConnectivityGraph;
    use metis::Idx;

    /// Multilevel k-way partitioning via the `metis` crate. Edge weights, when
    /// the graph carries them, are rounded into METIS's integer range.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct MetisPartitioner {
        /// Allowed load imbalance in 1/1000, METIS's `ufactor`. Zero keeps
        /// the library default.
        pub ufactor: i32,
    }

    impl Partitioner for MetisPartitioner {
        fn partition(
            &self,
            graph: &ConnectivityGraph,
            n_parts: usize,
        ) -> Result<Vec<Rank>, GridScatterError> {
            let n = graph.num_vertices();
            if n_parts <= 1 {
                return Ok(vec![0; n]);
            }
            let mut xadj: Vec<Idx> = graph.xadj().iter().map(|&x| x as Idx).collect();
            let mut adjncy: Vec<Idx> = graph.adjncy().iter().map(|&x| x as Idx).collect();

            let mut g = metis::Graph::new(1, n_parts as Idx, &mut xadj, &mut adjncy)
                .map_err(|e| GridScatterError::Partitioner(e.to_string()))?;
            let mut adjwgt: Vec<Idx>;
            if let Some(max_w) = max_edge_weight(graph) {
                adjwgt = Vec::with_capacity(adjncy.len());
                for v in 0..n {
                    if let Some(ws) = graph.edge_weights(v) {
                        for &w in ws {
                            // Scale into [1, 1000]; METIS rejects zero weights.
                            let scaled = (w / max_w * 999.0).round() as Idx + 1;
                            adjwgt.push(scaled);
                        }
                    }
                }
                g = g.set_adjwgt(&mut adjwgt);
            }
            if self.ufactor > 0 {
                g = g.set_option(metis::option::UFactor(self.ufactor));
            }

            let mut part = vec![0 as Idx; n];
            g.part_kway(&mut part)
                .map_err(|e| GridScatterError::Partitioner(e.to_string()))?;
            Ok(part.into_iter().map(|p| p as Rank).collect())
        }
    }

    fn max_edge_weight(graph: &ConnectivityGraph) -> Option<f64> {
        let mut max_w = f64::NEG_INFINITY;
        let mut any = false;
        for v in 0..graph.num_vertices() {
            if let Some(ws) = graph.edge_weights(v) {
                for &w in ws {
                    any = true;
                    max_w = max_w.max(w);
                }
            }
        }
        (any && max_w > 0.0).then_some(max_w)
    }
}
