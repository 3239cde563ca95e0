#![allow(dead_code)]

use grid_scatter::error::GridScatterError;
use grid_scatter::prelude::*;

/// Run `f` once per rank on its own thread, over a private mailbox group.
pub fn run_ranks<F, T>(n: usize, f: F) -> Vec<T>
where
    F: Fn(LocalComm) -> T + Send + Sync + Clone + 'static,
    T: Send + 'static,
{
    let comms = LocalComm::group(n);
    let mut handles = Vec::new();
    for comm in comms {
        let f = f.clone();
        handles.push(std::thread::spawn(move || f(comm)));
    }
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// Oracle returning a predetermined assignment; lets tests pin the layout.
#[derive(Clone, Debug)]
pub struct FixedPartitioner(pub Vec<Rank>);

impl Partitioner for FixedPartitioner {
    fn partition(
        &self,
        _graph: &ConnectivityGraph,
        _n_parts: usize,
    ) -> Result<Vec<Rank>, GridScatterError> {
        Ok(self.0.clone())
    }
}

/// Oracle that always fails; exercises the abort protocol.
#[derive(Clone, Copy, Debug)]
pub struct FailingPartitioner;

impl Partitioner for FailingPartitioner {
    fn partition(
        &self,
        _graph: &ConnectivityGraph,
        _n_parts: usize,
    ) -> Result<Vec<Rank>, GridScatterError> {
        Err(GridScatterError::Partitioner("synthetic failure".into()))
    }
}
