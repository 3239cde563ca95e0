//! Fixed, little-endian wire records for the distribution protocol.
//!
//! Everything that crosses a rank boundary is one of these `#[repr(C)]`
//! `Pod` structs; multi-byte integers are stored pre-LE with `.to_le()` and
//! decoded with `from_le()`, so heterogeneous launches cannot disagree on
//! byte order.

use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Count of following records, or a scalar size.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// A `(global id, rank)` record used for assignment scatter, halo imports
/// and halo duties.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCellRec {
    pub global_le: u64,
    pub rank_le: u32,
    pub _pad: u32,
}

impl WireCellRec {
    pub const SIZE: usize = 16;

    pub fn new(global: usize, rank: usize) -> Self {
        Self {
            global_le: (global as u64).to_le(),
            rank_le: (rank as u32).to_le(),
            _pad: 0,
        }
    }
    pub fn global(&self) -> usize {
        u64::from_le(self.global_le) as usize
    }
    pub fn rank(&self) -> usize {
        u32::from_le(self.rank_le) as usize
    }
}

const _: () = {
    assert!(size_of::<WireCount>() == 8);
    assert!(size_of::<WireCellRec>() == WireCellRec::SIZE);
    assert!(align_of::<WireCellRec>() == 8);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_cell_rec() {
        let v = vec![WireCellRec::new(7, 2), WireCellRec::new(11, 0)];
        let bytes: Vec<u8> = cast_slice(&v).to_vec();
        let mut out = vec![WireCellRec::zeroed(); v.len()];
        cast_slice_mut(&mut out).copy_from_slice(&bytes);
        assert_eq!(out[0].global(), 7);
        assert_eq!(out[0].rank(), 2);
        assert_eq!(out[1].global(), 11);
        assert_eq!(out[1].rank(), 0);
    }

    #[test]
    fn roundtrip_count() {
        let c = WireCount::new(123_456);
        let bytes: Vec<u8> = cast_slice(std::slice::from_ref(&c)).to_vec();
        let mut out = WireCount::zeroed();
        cast_slice_mut(std::slice::from_mut(&mut out)).copy_from_slice(&bytes);
        assert_eq!(out.get(), 123_456);
    }
}
