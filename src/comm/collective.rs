//! Collective operations built on the point-to-point façade.
//!
//! Every rank must call the same sequence of collectives in the same order;
//! a mismatched sequence deadlocks, which is the documented contract of the
//! distribution pipeline. Payload sizes that are not known a priori are
//! always exchanged in two phases: a size header first, then the payload
//! sized by it.

use crate::comm::communicator::{CommTag, Communicator, Wait};
use crate::comm::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::error::GridScatterError;

fn comm_err(neighbor: usize, what: &str) -> GridScatterError {
    GridScatterError::CommError {
        neighbor,
        reason: what.to_string(),
    }
}

/// Broadcast a single `ok`/`abort` flag from `root`; returns the flag on
/// every rank. This is the primitive behind every globally synchronized
/// abort: broadcast the flag, then raise locally if it is false.
pub fn broadcast_flag<C: Communicator>(
    comm: &C,
    root: usize,
    flag_on_root: bool,
    tag: CommTag,
) -> Result<bool, GridScatterError> {
    if comm.rank() == root {
        let byte = [flag_on_root as u8];
        for peer in 0..comm.size() {
            if peer != root {
                comm.isend(peer, tag.as_u16(), &byte).wait();
            }
        }
        Ok(flag_on_root)
    } else {
        let mut buf = [0u8; 1];
        let data = comm
            .irecv(root, tag.as_u16(), &mut buf)
            .wait()
            .ok_or_else(|| comm_err(root, "no flag received"))?;
        if data.len() != 1 {
            return Err(GridScatterError::BufferSizeMismatch {
                neighbor: root,
                expected: 1,
                got: data.len(),
            });
        }
        Ok(data[0] != 0)
    }
}

/// Broadcast an arbitrary byte buffer from `root`. Uses `tag` for the size
/// header and `tag + 1` for the payload.
pub fn broadcast_bytes<C: Communicator>(
    comm: &C,
    root: usize,
    payload_on_root: Option<&[u8]>,
    tag: CommTag,
) -> Result<Vec<u8>, GridScatterError> {
    if comm.rank() == root {
        let payload = payload_on_root.unwrap_or(&[]);
        let count = WireCount::new(payload.len());
        for peer in 0..comm.size() {
            if peer == root {
                continue;
            }
            comm.isend(peer, tag.as_u16(), cast_slice(std::slice::from_ref(&count)))
                .wait();
            comm.isend(peer, tag.offset(1).as_u16(), payload).wait();
        }
        Ok(payload.to_vec())
    } else {
        let mut count = WireCount::new(0);
        let data = comm
            .irecv(
                root,
                tag.as_u16(),
                cast_slice_mut(std::slice::from_mut(&mut count)),
            )
            .wait()
            .ok_or_else(|| comm_err(root, "no size header received"))?;
        if data.len() != std::mem::size_of::<WireCount>() {
            return Err(GridScatterError::BufferSizeMismatch {
                neighbor: root,
                expected: std::mem::size_of::<WireCount>(),
                got: data.len(),
            });
        }
        cast_slice_mut(std::slice::from_mut(&mut count)).copy_from_slice(&data);

        let mut payload = vec![0u8; count.get()];
        let data = comm
            .irecv(root, tag.offset(1).as_u16(), &mut payload)
            .wait()
            .ok_or_else(|| comm_err(root, "no payload received"))?;
        if data.len() != payload.len() {
            return Err(GridScatterError::BufferSizeMismatch {
                neighbor: root,
                expected: payload.len(),
                got: data.len(),
            });
        }
        payload.copy_from_slice(&data);
        Ok(payload)
    }
}

/// Scatter one `u64` per rank from `root`; returns this rank's value.
pub fn scatter_counts<C: Communicator>(
    comm: &C,
    root: usize,
    counts_on_root: Option<&[u64]>,
    tag: CommTag,
) -> Result<u64, GridScatterError> {
    if comm.rank() == root {
        let counts = counts_on_root.ok_or_else(|| comm_err(root, "root has no counts"))?;
        debug_assert_eq!(counts.len(), comm.size());
        for peer in 0..comm.size() {
            if peer == root {
                continue;
            }
            let c = WireCount::new(counts[peer] as usize);
            comm.isend(peer, tag.as_u16(), cast_slice(std::slice::from_ref(&c)))
                .wait();
        }
        Ok(counts[root])
    } else {
        let mut c = WireCount::new(0);
        let data = comm
            .irecv(
                root,
                tag.as_u16(),
                cast_slice_mut(std::slice::from_mut(&mut c)),
            )
            .wait()
            .ok_or_else(|| comm_err(root, "no count received"))?;
        if data.len() != std::mem::size_of::<WireCount>() {
            return Err(GridScatterError::BufferSizeMismatch {
                neighbor: root,
                expected: std::mem::size_of::<WireCount>(),
                got: data.len(),
            });
        }
        cast_slice_mut(std::slice::from_mut(&mut c)).copy_from_slice(&data);
        Ok(c.get() as u64)
    }
}

/// Scatter per-rank byte payloads from `root`. `my_len` is the expected
/// payload size on this rank (agreed beforehand via [`scatter_counts`]).
pub fn scatterv<C: Communicator>(
    comm: &C,
    root: usize,
    payloads_on_root: Option<&[Vec<u8>]>,
    my_len: usize,
    tag: CommTag,
) -> Result<Vec<u8>, GridScatterError> {
    if comm.rank() == root {
        let payloads = payloads_on_root.ok_or_else(|| comm_err(root, "root has no payloads"))?;
        debug_assert_eq!(payloads.len(), comm.size());
        for peer in 0..comm.size() {
            if peer == root {
                continue;
            }
            comm.isend(peer, tag.as_u16(), &payloads[peer]).wait();
        }
        Ok(payloads[root].clone())
    } else {
        let mut buf = vec![0u8; my_len];
        let data = comm
            .irecv(root, tag.as_u16(), &mut buf)
            .wait()
            .ok_or_else(|| comm_err(root, "no payload received"))?;
        if data.len() != my_len {
            return Err(GridScatterError::BufferSizeMismatch {
                neighbor: root,
                expected: my_len,
                got: data.len(),
            });
        }
        buf.copy_from_slice(&data);
        Ok(buf)
    }
}

/// All ranks exchange one `u64`; returns the full table indexed by rank.
pub fn allgather_counts<C: Communicator>(
    comm: &C,
    mine: u64,
    tag: CommTag,
) -> Result<Vec<u64>, GridScatterError> {
    let me = comm.rank();
    let n = comm.size();
    let mut table = vec![0u64; n];
    table[me] = mine;

    // Send everything first; the eight-byte headers are eagerly buffered by
    // the mailbox/MPI layer, so no rank blocks before its peers have sent.
    let mine_wire = WireCount::new(mine as usize);
    for peer in 0..n {
        if peer != me {
            comm.isend(peer, tag.as_u16(), cast_slice(std::slice::from_ref(&mine_wire)))
                .wait();
        }
    }
    for peer in 0..n {
        if peer == me {
            continue;
        }
        let mut buf = WireCount::new(0);
        let data = comm
            .irecv(
                peer,
                tag.as_u16(),
                cast_slice_mut(std::slice::from_mut(&mut buf)),
            )
            .wait()
            .ok_or_else(|| comm_err(peer, "no count received"))?;
        if data.len() != std::mem::size_of::<WireCount>() {
            return Err(GridScatterError::BufferSizeMismatch {
                neighbor: peer,
                expected: std::mem::size_of::<WireCount>(),
                got: data.len(),
            });
        }
        let mut c = WireCount::new(0);
        cast_slice_mut(std::slice::from_mut(&mut c)).copy_from_slice(&data);
        table[peer] = c.get() as u64;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::communicator::{LocalComm, NoComm};

    fn run_group<F, T>(n: usize, f: F) -> Vec<T>
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

    #[test]
    fn broadcast_flag_serial() {
        let comm = NoComm;
        assert!(broadcast_flag(&comm, 0, true, CommTag::new(1)).unwrap());
        assert!(!broadcast_flag(&comm, 0, false, CommTag::new(1)).unwrap());
    }

    #[test]
    fn broadcast_flag_three_ranks() {
        let out = run_group(3, |comm| {
            broadcast_flag(&comm, 0, comm.rank() == 0, CommTag::new(0x2000)).unwrap()
        });
        assert_eq!(out, vec![true, true, true]);
    }

    #[test]
    fn broadcast_bytes_three_ranks() {
        let out = run_group(3, |comm| {
            let payload = if comm.rank() == 1 {
                Some(&b"abc"[..])
            } else {
                None
            };
            broadcast_bytes(&comm, 1, payload, CommTag::new(0x2010)).unwrap()
        });
        assert!(out.iter().all(|v| v == b"abc"));
    }

    #[test]
    fn scatter_counts_and_payloads() {
        let out = run_group(3, |comm| {
            let counts = [1u64, 2, 3];
            let mine = scatter_counts(
                &comm,
                0,
                (comm.rank() == 0).then_some(&counts[..]),
                CommTag::new(0x2020),
            )
            .unwrap();
            let payloads: Vec<Vec<u8>> = vec![vec![9u8; 1], vec![8u8; 2], vec![7u8; 3]];
            let buf = scatterv(
                &comm,
                0,
                (comm.rank() == 0).then_some(&payloads[..]),
                mine as usize,
                CommTag::new(0x2021),
            )
            .unwrap();
            (mine, buf)
        });
        assert_eq!(out[0], (1, vec![9u8; 1]));
        assert_eq!(out[1], (2, vec![8u8; 2]));
        assert_eq!(out[2], (3, vec![7u8; 3]));
    }

    #[test]
    fn allgather_counts_three_ranks() {
        let out = run_group(3, |comm| {
            allgather_counts(&comm, (comm.rank() * 10) as u64, CommTag::new(0x2030)).unwrap()
        });
        for table in out {
            assert_eq!(table, vec![0, 10, 20]);
        }
    }
}
