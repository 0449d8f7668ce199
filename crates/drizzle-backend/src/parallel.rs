//! Rayon-parallel backend.
//!
//! Cell-scoped reductions (moments) run one task per cell; coalescence is
//! planned serially and then applied one task per attribute row, which
//! keeps every write disjoint without any synchronisation. Sorting and
//! shuffling stay sequential because their output depends on visit order.

use rayon::prelude::*;

use drizzle_core::{
    Backend, CoalescenceArgs, CoalescenceOutcome, MomentArgs, ParticleError, PrecipitationArgs,
    PrecipitationOutcome, SortKey, Stack,
};

use crate::kernels;

/// Data-parallel CPU backend on the global rayon pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParallelBackend;

impl ParallelBackend {
    /// Create a parallel backend.
    pub fn new() -> Self {
        Self
    }
}

impl Backend for ParallelBackend {
    fn name(&self) -> &str {
        "parallel"
    }

    fn sort_by_cell_id(
        &self,
        idx: &mut [usize],
        cell_id: &[usize],
        cell_start: &mut [usize],
        scratch: &mut Vec<usize>,
    ) -> Result<(), ParticleError> {
        kernels::counting_sort(idx, cell_id, cell_start, scratch)
    }

    fn shuffle_global(&self, idx: &mut [usize], u01: &[f64]) -> Result<(), ParticleError> {
        kernels::check_u01("shuffle_global", u01, idx.len())?;
        let len = idx.len();
        kernels::shuffle_range(idx, u01, 0, len);
        Ok(())
    }

    fn shuffle_local(
        &self,
        idx: &mut [usize],
        u01: &[f64],
        cell_start: &[usize],
    ) -> Result<(), ParticleError> {
        kernels::check_u01("shuffle_local", u01, idx.len())?;
        kernels::check_partition("shuffle_local", cell_start, idx.len())?;
        // Cells are disjoint ranges of the index; split it into one slice
        // per cell and shuffle them independently.
        let mut cells: Vec<(usize, &mut [usize])> = Vec::with_capacity(cell_start.len());
        let mut rest = idx;
        for w in cell_start.windows(2) {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(w[1] - w[0]);
            cells.push((w[0], head));
            rest = tail;
        }
        cells.into_par_iter().for_each(|(start, cell)| {
            let len = cell.len();
            kernels::shuffle_range(cell, &u01[start..start + len], 0, len);
        });
        Ok(())
    }

    fn remove_zeros(&self, idx: &mut [usize], n: &[u64], scratch: &mut Vec<usize>) -> usize {
        kernels::remove_zeros(idx, n, scratch)
    }

    fn find_pairs(
        &self,
        is_first_in_pair: &mut [bool],
        cell_start: &[usize],
    ) -> Result<(), ParticleError> {
        kernels::find_pairs(is_first_in_pair, cell_start)
    }

    fn sort_within_pairs(
        &self,
        idx: &mut [usize],
        is_first_in_pair: &[bool],
        key: SortKey<'_>,
    ) -> Result<(), ParticleError> {
        kernels::sort_within_pairs(idx, is_first_in_pair, key)
    }

    fn coalesce(&self, args: CoalescenceArgs<'_>) -> Result<CoalescenceOutcome, ParticleError> {
        kernels::check_rules(args.intensive_rules, args.intensive, args.extensive)?;
        let plan = kernels::plan_coalescence(args.n, args.idx, args.gamma, args.is_first_in_pair)?;

        let cols = args.extensive.cols();
        if cols > 0 {
            let extensive: &Stack<f64> = args.extensive;
            let rules = args.intensive_rules;
            args.intensive
                .as_mut_slice()
                .par_chunks_mut(cols)
                .zip(rules.par_iter())
                .for_each(|(row, rule)| {
                    if let Some(weight) = rule.weight() {
                        kernels::blend_intensive_row(row, extensive.row(weight), &plan);
                    }
                });
            args.extensive
                .as_mut_slice()
                .par_chunks_mut(cols)
                .for_each(|row| kernels::accumulate_extensive_row(row, &plan));
        }
        let zeroed = kernels::apply_multiplicities(args.n, &plan);

        Ok(CoalescenceOutcome {
            pairs_merged: plan.len(),
            zeroed,
        })
    }

    fn moments(
        &self,
        args: MomentArgs<'_>,
        moment_0: &mut [f64],
        moments: &mut Stack<f64>,
    ) -> Result<(), ParticleError> {
        let n_cells = kernels::check_moment_shapes(&args, moment_0, moments)?;
        let per_cell: Vec<kernels::CellMoments> = (0..n_cells)
            .into_par_iter()
            .map(|c| kernels::cell_moments(&args, c))
            .collect();
        for (c, cell) in per_cell.iter().enumerate() {
            kernels::store_cell_moments(c, cell, moment_0, moments);
        }
        Ok(())
    }

    fn flag_precipitated(
        &self,
        args: PrecipitationArgs<'_>,
    ) -> Result<PrecipitationOutcome, ParticleError> {
        kernels::check_precipitation(&args)?;
        let below: Vec<usize> = args
            .idx
            .par_iter()
            .copied()
            .filter(|&i| kernels::below_floor(&args, i))
            .collect();
        let (flux, removed) = kernels::apply_precipitation(args.n, args.volume, below);
        Ok(PrecipitationOutcome { flux, removed })
    }

    fn cell_id(
        &self,
        cell_id: &mut [usize],
        idx: &[usize],
        cell_origin: &Stack<i64>,
        strides: &[usize],
        grid: &[usize],
    ) -> Result<(), ParticleError> {
        kernels::check_cell_id_shapes(cell_id, idx, cell_origin, strides, grid)?;
        let ids = idx
            .par_iter()
            .map(|&slot| kernels::cell_id_of(slot, cell_origin, strides, grid))
            .collect::<Result<Vec<_>, _>>()?;
        for (&slot, id) in idx.iter().zip(ids) {
            cell_id[slot] = id;
        }
        Ok(())
    }

    fn adaptive_sdm_end(
        &self,
        dt_left: &[f64],
        cell_start: &[usize],
    ) -> Result<usize, ParticleError> {
        kernels::check_dt_left(dt_left, cell_start)?;
        let last_active = dt_left.par_iter().position_last(|&dt| dt != 0.0);
        Ok(kernels::sdm_end(last_active, cell_start))
    }
}
