//! Single-threaded reference backend.

use drizzle_core::{
    Backend, CoalescenceArgs, CoalescenceOutcome, MomentArgs, ParticleError, PrecipitationArgs,
    PrecipitationOutcome, SortKey, Stack,
};

use crate::kernels;

/// Straight-line loops over the working range.
///
/// This is the reference every other backend is checked against.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialBackend;

impl SerialBackend {
    /// Create a serial backend.
    pub fn new() -> Self {
        Self
    }
}

impl Backend for SerialBackend {
    fn name(&self) -> &str {
        "serial"
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
        for w in cell_start.windows(2) {
            kernels::shuffle_range(idx, u01, w[0], w[1]);
        }
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

        kernels::blend_intensive_stack(args.intensive, args.extensive, args.intensive_rules, &plan);
        for r in 0..args.extensive.rows() {
            kernels::accumulate_extensive_row(args.extensive.row_mut(r), &plan);
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
        for c in 0..n_cells {
            let cell = kernels::cell_moments(&args, c);
            kernels::store_cell_moments(c, &cell, moment_0, moments);
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
            .iter()
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
            .iter()
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
        let last_active = dt_left.iter().rposition(|&dt| dt != 0.0);
        Ok(kernels::sdm_end(last_active, cell_start))
    }
}
