//! Message passing between ranks: point-to-point façade, wire records and
//! the collective helpers the distribution protocol is built from.

pub mod collective;
pub mod communicator;
pub mod wire;

pub use collective::{allgather_counts, broadcast_bytes, broadcast_flag, scatter_counts, scatterv};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
pub use communicator::{CommTag, Communicator, LocalComm, NoComm, ScatterTags, Wait};
