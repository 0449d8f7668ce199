//! Mesh geometry and the optional spatial attributes of a particle set.

use drizzle_core::Stack;
use smallvec::SmallVec;

/// Regular grid of cells, row-major, with the vertical axis last.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mesh {
    grid: SmallVec<[usize; 3]>,
}

impl Mesh {
    /// A mesh with the given cell counts per dimension.
    ///
    /// Returns `None` if `grid` is empty or any dimension is zero.
    pub fn new(grid: &[usize]) -> Option<Self> {
        if grid.is_empty() || grid.contains(&0) {
            return None;
        }
        Some(Self {
            grid: SmallVec::from_slice(grid),
        })
    }

    /// A single well-mixed box.
    pub fn zero_dimensional() -> Self {
        Self {
            grid: SmallVec::from_slice(&[1]),
        }
    }

    /// Cells per dimension.
    pub fn grid(&self) -> &[usize] {
        &self.grid
    }

    /// Number of dimensions.
    pub fn dims(&self) -> usize {
        self.grid.len()
    }

    /// Total number of cells.
    pub fn n_cells(&self) -> usize {
        self.grid.iter().product()
    }

    /// Row-major strides: the last dimension is contiguous.
    pub fn strides(&self) -> SmallVec<[usize; 3]> {
        let mut strides: SmallVec<[usize; 3]> = SmallVec::from_elem(1, self.grid.len());
        for d in (0..self.grid.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * self.grid[d + 1];
        }
        strides
    }
}

/// Per-particle location within a [`Mesh`].
///
/// Both stacks have one row per mesh dimension and one column per slot.
/// The mesh is fixed once the set is built; only the per-particle stacks
/// are writable.
#[derive(Clone, Debug, PartialEq)]
pub struct Spatial {
    mesh: Mesh,
    /// Integer index of the cell corner along each dimension.
    pub cell_origin: Stack<i64>,
    /// Fractional offset within the cell along each dimension, in `[0, 1)`.
    pub position_in_cell: Stack<f64>,
}

impl Spatial {
    /// Pair per-particle stacks with their mesh. Returns `None` unless both
    /// stacks have one row per mesh dimension and the same column count.
    pub fn new(
        mesh: Mesh,
        cell_origin: Stack<i64>,
        position_in_cell: Stack<f64>,
    ) -> Option<Self> {
        let dims = mesh.dims();
        if cell_origin.rows() != dims
            || position_in_cell.rows() != dims
            || cell_origin.cols() != position_in_cell.cols()
        {
            return None;
        }
        Some(Self {
            mesh,
            cell_origin,
            position_in_cell,
        })
    }

    /// Grid the particles live in.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Vertical coordinate of `slot` in cell units: origin plus offset
    /// along the last dimension.
    pub fn height(&self, slot: usize) -> f64 {
        let z = self.mesh.dims() - 1;
        self.cell_origin.get(z, slot) as f64 + self.position_in_cell.get(z, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_are_row_major() {
        let mesh = Mesh::new(&[4, 3, 5]).unwrap();
        assert_eq!(mesh.strides().as_slice(), &[15, 5, 1]);
        assert_eq!(mesh.n_cells(), 60);
    }

    #[test]
    fn degenerate_grids_are_rejected() {
        assert!(Mesh::new(&[]).is_none());
        assert!(Mesh::new(&[3, 0]).is_none());
    }

    #[test]
    fn zero_dimensional_box_has_one_cell() {
        let mesh = Mesh::zero_dimensional();
        assert_eq!(mesh.n_cells(), 1);
        assert_eq!(mesh.strides().as_slice(), &[1]);
    }

    #[test]
    fn height_uses_last_dimension() {
        let spatial = Spatial::new(
            Mesh::new(&[2, 2]).unwrap(),
            Stack::from_rows(2, vec![vec![1, 0], vec![0, -1]]).unwrap(),
            Stack::from_rows(2, vec![vec![0.5, 0.5], vec![0.25, 0.75]]).unwrap(),
        )
        .unwrap();
        assert_eq!(spatial.height(0), 0.25);
        assert_eq!(spatial.height(1), -0.25);
        assert_eq!(spatial.mesh().n_cells(), 4);
    }

    #[test]
    fn stacks_must_match_mesh_dimensions() {
        let origin = Stack::from_rows(2, vec![vec![0, 1]]).unwrap();
        let position = Stack::from_rows(2, vec![vec![0.5, 0.5]]).unwrap();
        let square = Mesh::new(&[2, 2]).unwrap();
        assert!(Spatial::new(square, origin.clone(), position.clone()).is_none());
        assert!(Spatial::new(Mesh::new(&[2]).unwrap(), origin, position).is_some());
    }
}
