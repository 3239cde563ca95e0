//! Connectivity graph handed to the partition oracle.
//!
//! Vertices are active cells, edges are face neighbourships, and the
//! optional edge weight is a transmissibility-derived score. A zero
//! transmissibility keeps its edge in this graph — it only gates the overlap
//! search and the well traversal, not the partitioning itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::GridScatterError;
use crate::partition::wells::WellConnections;
use crate::topology::grid::GridTopology;

/// How face transmissibilities become edge weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeWeightMethod {
    /// Every edge weighs the same.
    #[default]
    Uniform,
    /// Weight equals the face transmissibility.
    Transmissibility,
    /// Weight equals `ln(1 + t)`; compresses the dynamic range.
    LogTransmissibility,
}

/// CSR adjacency of the active cells.
#[derive(Clone, Debug, Default)]
pub struct ConnectivityGraph {
    xadj: Vec<usize>,
    adjncy: Vec<usize>,
    weights: Option<Vec<f64>>,
}

impl ConnectivityGraph {
    /// Pure transformation of the topology (plus optional transmissibility
    /// array) into partitioner input.
    pub fn from_topology(
        topo: &GridTopology,
        trans: Option<&[f64]>,
        method: EdgeWeightMethod,
    ) -> Result<Self, GridScatterError> {
        let adj = adjacency_map(topo, trans, method)?;
        Ok(Self::flatten(
            adj,
            trans.is_some() && method != EdgeWeightMethod::Uniform,
        ))
    }

    /// Same as [`Self::from_topology`], but additionally chains every well's
    /// cells together with maximal-weight edges so the oracle tends to keep
    /// a well on one rank even before the explicit repair step.
    pub fn with_well_edges(
        topo: &GridTopology,
        trans: Option<&[f64]>,
        method: EdgeWeightMethod,
        connections: &WellConnections,
    ) -> Result<Self, GridScatterError> {
        let mut adj = adjacency_map(topo, trans, method)?;
        let max_w = adj
            .iter()
            .flat_map(|m| m.values())
            .fold(1.0f64, |acc, &w| acc.max(w));
        for well in connections.iter() {
            let cells: Vec<usize> = well.iter().copied().collect();
            for pair in cells.windows(2) {
                adj[pair[0]].insert(pair[1], max_w);
                adj[pair[1]].insert(pair[0], max_w);
            }
        }
        Ok(Self::flatten(
            adj,
            trans.is_some() && method != EdgeWeightMethod::Uniform,
        ))
    }

    fn flatten(adj: Vec<BTreeMap<usize, f64>>, weighted: bool) -> Self {
        let n = adj.len();
        let mut xadj = Vec::with_capacity(n + 1);
        let mut adjncy = Vec::new();
        let mut weights = weighted.then(Vec::new);
        xadj.push(0);
        for nbrs in adj {
            for (nbr, w) in nbrs {
                adjncy.push(nbr);
                if let Some(ws) = weights.as_mut() {
                    ws.push(w);
                }
            }
            xadj.push(adjncy.len());
        }
        Self {
            xadj,
            adjncy,
            weights,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.xadj.len().saturating_sub(1)
    }

    pub fn neighbors(&self, v: usize) -> &[usize] {
        &self.adjncy[self.xadj[v]..self.xadj[v + 1]]
    }

    pub fn degree(&self, v: usize) -> usize {
        self.xadj[v + 1] - self.xadj[v]
    }

    pub fn edge_weights(&self, v: usize) -> Option<&[f64]> {
        self.weights
            .as_ref()
            .map(|w| &w[self.xadj[v]..self.xadj[v + 1]])
    }

    pub fn xadj(&self) -> &[usize] {
        &self.xadj
    }

    pub fn adjncy(&self) -> &[usize] {
        &self.adjncy
    }
}

fn adjacency_map(
    topo: &GridTopology,
    trans: Option<&[f64]>,
    method: EdgeWeightMethod,
) -> Result<Vec<BTreeMap<usize, f64>>, GridScatterError> {
    if let Some(t) = trans {
        if t.len() != topo.num_faces() {
            return Err(GridScatterError::TransmissibilityLength {
                expected: topo.num_faces(),
                got: t.len(),
            });
        }
    }
    let mut adj = vec![BTreeMap::new(); topo.num_cells()];
    for face in 0..topo.num_faces() {
        let [a, b] = topo.face_cells(face);
        let (Some(a), Some(b)) = (a, b) else { continue };
        let w = match (method, trans) {
            (EdgeWeightMethod::Uniform, _) | (_, None) => 1.0,
            (EdgeWeightMethod::Transmissibility, Some(t)) => t[face],
            (EdgeWeightMethod::LogTransmissibility, Some(t)) => (1.0 + t[face]).ln(),
        };
        adj[a].insert(b, w);
        adj[b].insert(a, w);
    }
    Ok(adj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::wells::Well;

    #[test]
    fn cube_graph_degrees() {
        let topo = GridTopology::cartesian([2, 2, 2]).unwrap();
        let g = ConnectivityGraph::from_topology(&topo, None, EdgeWeightMethod::Uniform).unwrap();
        assert_eq!(g.num_vertices(), 8);
        for v in 0..8 {
            assert_eq!(g.degree(v), 3);
        }
        assert_eq!(g.neighbors(0), &[1, 2, 4]);
    }

    #[test]
    fn zero_transmissibility_keeps_the_edge() {
        let topo = GridTopology::cartesian([3, 1, 1]).unwrap();
        let trans = vec![0.0, 2.0];
        let g =
            ConnectivityGraph::from_topology(&topo, Some(&trans), EdgeWeightMethod::Transmissibility)
                .unwrap();
        assert_eq!(g.neighbors(1), &[0, 2]);
        assert_eq!(g.edge_weights(1).unwrap(), &[0.0, 2.0]);
    }

    #[test]
    fn transmissibility_length_checked() {
        let topo = GridTopology::cartesian([3, 1, 1]).unwrap();
        let err =
            ConnectivityGraph::from_topology(&topo, Some(&[1.0]), EdgeWeightMethod::Transmissibility)
                .unwrap_err();
        assert!(matches!(
            err,
            GridScatterError::TransmissibilityLength { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn well_edges_connect_perforations() {
        let topo = GridTopology::cartesian([4, 1, 1]).unwrap();
        let wells = vec![Well {
            name: "W1".into(),
            perforations: vec![[0, 0, 0], [3, 0, 0]],
        }];
        let conns = WellConnections::new(&wells, &topo);
        let g = ConnectivityGraph::with_well_edges(&topo, None, EdgeWeightMethod::Uniform, &conns)
            .unwrap();
        // 0 and 3 are not face neighbours but the well links them.
        assert!(g.neighbors(0).contains(&3));
        assert!(g.neighbors(3).contains(&0));
    }
}
