//! Thin façade over in-process or inter-process (MPI) message passing.
//!
//! Messages are contiguous byte slices. All handles are waitable:
//! the collective helpers in [`crate::comm::collective`] call `.wait()`
//! before they trust that a buffer is ready. The distribution pipeline never
//! talks to a backend directly — it only sees this trait.

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::Arc;

/// Non-blocking point-to-point communication interface (minimal by design).
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// This process's rank in `0..size()`.
    fn rank(&self) -> usize;
    /// Number of participating ranks.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Typed message tag; each protocol stage reserves its own value so that
/// mismatched call sequences surface as missing messages, not silent
/// cross-talk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(v: u16) -> Self {
        Self(v)
    }
    pub fn as_u16(self) -> u16 {
        self.0
    }
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0 + n)
    }
}

/// The tag block used by one run of the distribution pipeline.
///
/// Two consecutive slots are reserved where a helper exchanges a size header
/// before the payload (`parts_bcast`, `well_owners`, `well_names`).
#[derive(Clone, Copy, Debug)]
pub struct ScatterTags {
    pub oracle_ok: CommTag,
    pub lists_ok: CommTag,
    pub part_counts: CommTag,
    pub part_payload: CommTag,
    pub parts_bcast: CommTag,
    pub well_owners: CommTag,
    pub well_names: CommTag,
    pub halo_ok: CommTag,
    pub halo_import_sizes: CommTag,
    pub halo_imports: CommTag,
    pub halo_duty_sizes: CommTag,
    pub halo_duties: CommTag,
}

impl ScatterTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            oracle_ok: base,
            lists_ok: base.offset(1),
            part_counts: base.offset(2),
            part_payload: base.offset(3),
            parts_bcast: base.offset(4), // also uses offset(5) for the payload
            well_owners: base.offset(6), // also uses offset(7)
            well_names: base.offset(8),  // also uses offset(9)
            halo_ok: base.offset(10),
            halo_import_sizes: base.offset(11),
            halo_imports: base.offset(12),
            halo_duty_sizes: base.offset(13),
            halo_duties: base.offset(14),
        }
    }
}

impl Default for ScatterTags {
    fn default() -> Self {
        Self::from_base(CommTag::new(0x5C00))
    }
}

/// Compile-time no-op comm for pure serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
}

// --- LocalComm: in-process mailbox, one instance per simulated rank ---

type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = DashMap<Key, VecDeque<Bytes>>;

static GLOBAL_MAILBOX: Lazy<Arc<Mailbox>> = Lazy::new(|| Arc::new(DashMap::new()));

/// In-process communicator backed by a FIFO mailbox.
///
/// [`LocalComm::group`] hands out a set of ranks sharing a private mailbox,
/// which is what the multi-rank tests use (one thread per rank).
/// [`LocalComm::new`] attaches to a process-global mailbox instead; tests
/// using it must not run concurrently with each other on the same tags.
#[derive(Clone, Debug)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl LocalComm {
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            mailbox: Arc::clone(&GLOBAL_MAILBOX),
        }
    }

    /// A fresh group of `size` ranks wired to a private mailbox.
    pub fn group(size: usize) -> Vec<Self> {
        let mailbox: Arc<Mailbox> = Arc::new(DashMap::new());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

pub struct LocalRecv {
    mailbox: Arc<Mailbox>,
    key: Key,
    max_len: usize,
}

impl Wait for LocalRecv {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(mut queue) = self.mailbox.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    let n = bytes.len().min(self.max_len);
                    return Some(bytes[..n].to_vec());
                }
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalRecv;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        self.mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> LocalRecv {
        LocalRecv {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            max_len: buf.len(),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::topology::{Communicator as MpiTopology, SimpleCommunicator};
    use mpi::traits::*;

    /// MPI-backed communicator over the world communicator.
    ///
    /// Point-to-point operations are blocking underneath; the distribution
    /// protocol is two-phase (sizes, then payloads) and posts receives
    /// before matching sends, so eager buffering of the small headers is all
    /// that is required.
    pub struct MpiComm {
        _universe: mpi::environment::Universe,
        world: SimpleCommunicator,
    }

    impl MpiComm {
        pub fn new() -> Self {
            let universe = mpi::initialize().expect("MPI already initialized");
            let world = universe.world();
            Self {
                _universe: universe,
                world,
            }
        }
    }

    pub struct MpiHandle {
        data: Option<Vec<u8>>,
    }

    impl Wait for MpiHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.data
        }
    }

    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.world.rank() as usize
        }
        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
            MpiHandle { data: None }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiHandle {
            let (msg, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            let n = buf.len().min(msg.len());
            buf[..n].copy_from_slice(&msg[..n]);
            MpiHandle { data: Some(msg) }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_roundtrip_two_ranks() {
        let group = LocalComm::group(2);
        let tag = CommTag::new(0x1000);

        let msg = b"hello";
        group[0].isend(1, tag.as_u16(), msg);

        let mut buf = [0u8; 5];
        let h = group[1].irecv(0, tag.as_u16(), &mut buf);
        let got = h.wait().unwrap();
        assert_eq!(&got, msg);
    }

    #[test]
    fn local_fifo_order() {
        let group = LocalComm::group(2);
        let tag = CommTag::new(0x1001);

        for i in 0..10u8 {
            group[0].isend(1, tag.as_u16(), &[i]);
        }
        let mut out = Vec::new();
        for _ in 0..10 {
            let mut b = [0u8; 1];
            let h = group[1].irecv(0, tag.as_u16(), &mut b);
            out.push(h.wait().unwrap()[0]);
        }
        assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
    }

    #[test]
    fn truncation_to_posted_buffer() {
        let group = LocalComm::group(2);
        let tag = CommTag::new(0x1002);

        group[0].isend(1, tag.as_u16(), &[1, 2, 3, 4, 5, 6]);
        let mut b = [0u8; 4];
        let h = group[1].irecv(0, tag.as_u16(), &mut b);
        assert_eq!(h.wait().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    #[serial_test::serial]
    fn global_mailbox_roundtrip() {
        let c0 = LocalComm::new(0, 2);
        let c1 = LocalComm::new(1, 2);
        let tag = CommTag::new(0x1003);

        c0.isend(1, tag.as_u16(), &[42]);
        let mut b = [0u8; 1];
        assert_eq!(c1.irecv(0, tag.as_u16(), &mut b).wait().unwrap(), vec![42]);
    }

    #[test]
    fn tag_block_is_disjoint() {
        let tags = ScatterTags::from_base(CommTag::new(100));
        let all = [
            tags.oracle_ok,
            tags.lists_ok,
            tags.part_counts,
            tags.part_payload,
            tags.parts_bcast,
            tags.parts_bcast.offset(1),
            tags.well_owners,
            tags.well_owners.offset(1),
            tags.well_names,
            tags.well_names.offset(1),
            tags.halo_ok,
            tags.halo_import_sizes,
            tags.halo_imports,
            tags.halo_duty_sizes,
            tags.halo_duties,
        ];
        let mut seen = std::collections::HashSet::new();
        for t in all {
            assert!(seen.insert(t.as_u16()), "tag {} reused", t.as_u16());
        }
    }
}
