//! Grid topology input and the connectivity graph derived from it.

pub mod graph;
pub mod grid;

pub use graph::{ConnectivityGraph, EdgeWeightMethod};
pub use grid::GridTopology;
