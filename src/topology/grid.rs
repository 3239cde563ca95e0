//! Process-local view of the corner-point grid topology.
//!
//! The distribution subsystem never builds this itself — it is handed in by
//! the serial grid constructor — but it validates the invariants it depends
//! on: dense 0-based cell ids, a face table whose entries stay in range, and
//! a Cartesian index per active cell (inactive cells simply have no
//! compressed id).

use crate::error::GridScatterError;

/// Immutable cell/face topology of the serial (pre-partition) grid.
#[derive(Clone, Debug)]
pub struct GridTopology {
    num_cells: usize,
    /// Per face, the two adjacent cells; boundary faces hold one `None`.
    face_cells: Vec<[Option<usize>; 2]>,
    cartesian_dims: [usize; 3],
    /// Compressed cell index -> linearized Cartesian index.
    global_cell: Vec<usize>,
    // CSR: cell -> incident faces
    cell_face_offsets: Vec<usize>,
    cell_face_ids: Vec<usize>,
}

impl GridTopology {
    /// Validate the raw tables and derive the cell-to-face adjacency.
    pub fn new(
        face_cells: Vec<[Option<usize>; 2]>,
        cartesian_dims: [usize; 3],
        global_cell: Vec<usize>,
    ) -> Result<Self, GridScatterError> {
        let num_cells = global_cell.len();
        if num_cells == 0 {
            return Err(GridScatterError::EmptyGrid);
        }
        let capacity = cartesian_dims[0] * cartesian_dims[1] * cartesian_dims[2];
        for (cell, &cart) in global_cell.iter().enumerate() {
            if cart >= capacity {
                return Err(GridScatterError::CartesianIndexOutOfRange {
                    cell,
                    cartesian: cart,
                    capacity,
                });
            }
        }
        for (face, cells) in face_cells.iter().enumerate() {
            for cell in cells.iter().flatten() {
                if *cell >= num_cells {
                    return Err(GridScatterError::FaceCellOutOfRange {
                        face,
                        cell: *cell,
                        num_cells,
                    });
                }
            }
        }

        // Count, then fill: the usual two-pass CSR build.
        let mut counts = vec![0usize; num_cells];
        for cells in &face_cells {
            for &cell in cells.iter().flatten() {
                counts[cell] += 1;
            }
        }
        let mut cell_face_offsets = vec![0usize; num_cells + 1];
        for c in 0..num_cells {
            cell_face_offsets[c + 1] = cell_face_offsets[c] + counts[c];
        }
        let mut next = cell_face_offsets.clone();
        let mut cell_face_ids = vec![0usize; cell_face_offsets[num_cells]];
        for (face, cells) in face_cells.iter().enumerate() {
            for &cell in cells.iter().flatten() {
                cell_face_ids[next[cell]] = face;
                next[cell] += 1;
            }
        }

        Ok(Self {
            num_cells,
            face_cells,
            cartesian_dims,
            global_cell,
            cell_face_offsets,
            cell_face_ids,
        })
    }

    /// Fully active `nx * ny * nz` box; the standard test fixture.
    pub fn cartesian(dims: [usize; 3]) -> Result<Self, GridScatterError> {
        let [nx, ny, nz] = dims;
        let idx = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);
        let mut face_cells = Vec::new();
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    if i + 1 < nx {
                        face_cells.push([Some(idx(i, j, k)), Some(idx(i + 1, j, k))]);
                    }
                    if j + 1 < ny {
                        face_cells.push([Some(idx(i, j, k)), Some(idx(i, j + 1, k))]);
                    }
                    if k + 1 < nz {
                        face_cells.push([Some(idx(i, j, k)), Some(idx(i, j, k + 1))]);
                    }
                }
            }
        }
        let global_cell = (0..nx * ny * nz).collect();
        Self::new(face_cells, dims, global_cell)
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    pub fn num_faces(&self) -> usize {
        self.face_cells.len()
    }

    pub fn cartesian_dims(&self) -> [usize; 3] {
        self.cartesian_dims
    }

    pub fn global_cell(&self) -> &[usize] {
        &self.global_cell
    }

    pub fn face_cells(&self, face: usize) -> [Option<usize>; 2] {
        self.face_cells[face]
    }

    /// Faces incident to `cell`.
    pub fn faces_of(&self, cell: usize) -> &[usize] {
        &self.cell_face_ids[self.cell_face_offsets[cell]..self.cell_face_offsets[cell + 1]]
    }

    /// Face neighbours of `cell`, as `(neighbour, connecting face)`.
    pub fn neighbors(&self, cell: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.faces_of(cell).iter().filter_map(move |&face| {
            let [a, b] = self.face_cells[face];
            match (a, b) {
                (Some(x), Some(y)) if x == cell => Some((y, face)),
                (Some(x), Some(y)) if y == cell => Some((x, face)),
                _ => None,
            }
        })
    }

    /// Cartesian index -> compressed index map; `-1` marks inactive cells.
    pub fn cartesian_to_compressed(&self) -> Vec<i64> {
        let capacity = self.cartesian_dims[0] * self.cartesian_dims[1] * self.cartesian_dims[2];
        let mut map = vec![-1i64; capacity];
        for (compressed, &cart) in self.global_cell.iter().enumerate() {
            map[cart] = compressed as i64;
        }
        map
    }

    /// IJK coordinates of a compressed cell.
    pub fn cartesian_coords(&self, cell: usize) -> [usize; 3] {
        let [nx, ny, _] = self.cartesian_dims;
        let cart = self.global_cell[cell];
        [cart % nx, (cart / nx) % ny, cart / (nx * ny)]
    }

    /// Active cells in the 26-point Cartesian neighbourhood of `cell` that do
    /// **not** share a face with it — the extra candidates admitted by the
    /// corner-cell overlap option.
    pub fn corner_neighbors(&self, cell: usize, cart_to_comp: &[i64]) -> Vec<usize> {
        let [nx, ny, nz] = self.cartesian_dims;
        let [i, j, k] = self.cartesian_coords(cell);
        let face_nbrs: Vec<usize> = self.neighbors(cell).map(|(n, _)| n).collect();
        let mut out = Vec::new();
        for dk in -1i64..=1 {
            for dj in -1i64..=1 {
                for di in -1i64..=1 {
                    if di == 0 && dj == 0 && dk == 0 {
                        continue;
                    }
                    let (ni, nj, nk) = (i as i64 + di, j as i64 + dj, k as i64 + dk);
                    if ni < 0
                        || nj < 0
                        || nk < 0
                        || ni >= nx as i64
                        || nj >= ny as i64
                        || nk >= nz as i64
                    {
                        continue;
                    }
                    let cart = ni as usize + nx * (nj as usize + ny * nk as usize);
                    let comp = cart_to_comp[cart];
                    if comp < 0 {
                        continue;
                    }
                    let comp = comp as usize;
                    if comp != cell && !face_nbrs.contains(&comp) {
                        out.push(comp);
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}
