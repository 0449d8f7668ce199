//! Row-major 2-D buffer for grouped per-particle data.

/// A contiguous `rows × cols` buffer stored row by row.
///
/// Each row holds one attribute (or one spatial dimension) for every
/// particle slot, so kernels can walk a whole attribute group without
/// per-attribute dispatch. Moment outputs reuse the same layout with one
/// row per requested moment and one column per cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Stack<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Copy + Default> Stack<T> {
    /// A `rows × cols` stack filled with `T::default()`.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![T::default(); rows * cols],
            rows,
            cols,
        }
    }

    /// Stack the given rows. Returns `None` if any row length differs
    /// from `cols`.
    pub fn from_rows<I>(cols: usize, rows: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec<T>>,
    {
        let mut data = Vec::new();
        let mut count = 0;
        for row in rows {
            if row.len() != cols {
                return None;
            }
            data.extend_from_slice(&row);
            count += 1;
        }
        Some(Self {
            data,
            rows: count,
            cols,
        })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (particle slots or cells).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Whether the stack holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Borrow row `r`.
    ///
    /// # Panics
    ///
    /// Panics if `r >= self.rows()`.
    pub fn row(&self, r: usize) -> &[T] {
        assert!(r < self.rows, "row {r} out of range ({} rows)", self.rows);
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Mutably borrow row `r`.
    ///
    /// # Panics
    ///
    /// Panics if `r >= self.rows()`.
    pub fn row_mut(&mut self, r: usize) -> &mut [T] {
        assert!(r < self.rows, "row {r} out of range ({} rows)", self.rows);
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Value at `(r, c)`.
    pub fn get(&self, r: usize, c: usize) -> T {
        self.data[r * self.cols + c]
    }

    /// Overwrite the value at `(r, c)`.
    pub fn set(&mut self, r: usize, c: usize, value: T) {
        self.data[r * self.cols + c] = value;
    }

    /// Iterate over rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.rows).map(move |r| self.row(r))
    }

    /// The whole buffer, row-major.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The whole buffer, row-major, mutably. Split with `cols()` to get
    /// disjoint rows.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Overwrite every element with `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_rejects_ragged_input() {
        assert!(Stack::from_rows(3, vec![vec![1.0, 2.0, 3.0], vec![4.0]]).is_none());
    }

    #[test]
    fn rows_are_contiguous() {
        let s = Stack::from_rows(2, vec![vec![1, 2], vec![3, 4], vec![5, 6]]).unwrap();
        assert_eq!(s.rows(), 3);
        assert_eq!(s.row(1), &[3, 4]);
        assert_eq!(s.as_slice(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(s.get(2, 0), 5);
    }

    #[test]
    fn empty_stack_has_no_rows() {
        let s: Stack<f64> = Stack::from_rows(4, Vec::new()).unwrap();
        assert!(s.is_empty());
        assert_eq!(s.iter_rows().count(), 0);
    }

    #[test]
    fn row_mut_writes_through() {
        let mut s = Stack::<f64>::zeros(2, 3);
        s.row_mut(1)[2] = 7.5;
        s.set(0, 0, 1.5);
        assert_eq!(s.get(1, 2), 7.5);
        assert_eq!(s.row(0), &[1.5, 0.0, 0.0]);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn rows() -> impl Strategy<Value = (usize, Vec<Vec<i64>>)> {
            (1usize..8).prop_flat_map(|cols| {
                (
                    Just(cols),
                    proptest::collection::vec(proptest::collection::vec(any::<i64>(), cols), 0..6),
                )
            })
        }

        proptest! {
            #[test]
            fn rows_read_back_in_order((cols, input) in rows()) {
                let s = Stack::from_rows(cols, input.clone()).unwrap();
                prop_assert_eq!(s.rows(), input.len());
                prop_assert_eq!(s.as_slice().len(), input.len() * cols);
                for (r, row) in input.iter().enumerate() {
                    prop_assert_eq!(s.row(r), row.as_slice());
                }
                prop_assert_eq!(s.iter_rows().count(), input.len());
            }

            #[test]
            fn row_writes_stay_in_their_row(
                (cols, input) in rows().prop_filter("needs a row", |(_, r)| !r.is_empty()),
                pick in any::<prop::sample::Index>(),
                value in any::<i64>(),
            ) {
                let mut s = Stack::from_rows(cols, input.clone()).unwrap();
                let target = pick.index(input.len());
                s.row_mut(target).fill(value);
                for (r, row) in input.iter().enumerate() {
                    if r == target {
                        prop_assert!(s.row(r).iter().all(|&v| v == value));
                    } else {
                        prop_assert_eq!(s.row(r), row.as_slice());
                    }
                }
            }
        }
    }
}
