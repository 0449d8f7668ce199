//! Validation and per-element logic shared by every backend.
//!
//! Each check runs before any buffer is written, so a rejected call leaves
//! the particle set exactly as it was.

use drizzle_core::{
    AttrGroup, MomentArgs, ParticleError, PrecipitationArgs, SlotRule, SortKey, Stack,
    EMPTY_CELL_MOMENT,
};
use smallvec::SmallVec;

/// One pair scheduled for merging: `first` donates `gamma` copies of
/// itself to each droplet of `second`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Merge {
    pub first: usize,
    pub second: usize,
    pub gamma: u64,
}

/// Per-cell moment sums: zeroth moment plus one value per term.
pub(crate) type CellMoments = (f64, SmallVec<[f64; 8]>);

pub(crate) fn check_u01(op: &'static str, u01: &[f64], len: usize) -> Result<(), ParticleError> {
    if u01.len() < len {
        return Err(ParticleError::invariant(
            op,
            format!("{} random values for {len} positions", u01.len()),
        ));
    }
    Ok(())
}

pub(crate) fn check_partition(
    op: &'static str,
    cell_start: &[usize],
    len: usize,
) -> Result<(), ParticleError> {
    match cell_start.last() {
        Some(&end) if end == len && cell_start.windows(2).all(|w| w[0] <= w[1]) => Ok(()),
        _ => Err(ParticleError::invariant(
            op,
            format!("cell partition does not cover {len} working positions"),
        )),
    }
}

pub(crate) fn check_dt_left(dt_left: &[f64], cell_start: &[usize]) -> Result<(), ParticleError> {
    if dt_left.len() + 1 != cell_start.len() {
        return Err(ParticleError::invariant(
            "adaptive_sdm_end",
            format!(
                "{} dt_left values for {} cells",
                dt_left.len(),
                cell_start.len().saturating_sub(1)
            ),
        ));
    }
    Ok(())
}

/// Working-range end given the last still-active cell, if any.
pub(crate) fn sdm_end(last_active: Option<usize>, cell_start: &[usize]) -> usize {
    last_active.map_or(0, |c| cell_start[c + 1])
}

/// Fisher–Yates over `idx[start..end]`, reading `u01` at each position.
pub(crate) fn shuffle_range(idx: &mut [usize], u01: &[f64], start: usize, end: usize) {
    for i in (start + 1..end).rev() {
        let span = (i - start + 1) as f64;
        let j = (start + (u01[i] * span) as usize).min(i);
        idx.swap(i, j);
    }
}

pub(crate) fn counting_sort(
    idx: &mut [usize],
    cell_id: &[usize],
    cell_start: &mut [usize],
    scratch: &mut Vec<usize>,
) -> Result<(), ParticleError> {
    let n_cells = cell_start.len().checked_sub(1).ok_or_else(|| {
        ParticleError::invariant("sort_by_cell_id", "cell_start must hold n_cells + 1 entries")
    })?;
    if let Some(&bad) = idx.iter().find(|&&i| cell_id[i] >= n_cells) {
        return Err(ParticleError::invariant(
            "sort_by_cell_id",
            format!("slot {bad} has cell id {} of {n_cells}", cell_id[bad]),
        ));
    }

    cell_start.fill(0);
    for &i in idx.iter() {
        cell_start[cell_id[i]] += 1;
    }
    let mut total = 0;
    for start in cell_start[..n_cells].iter_mut() {
        let count = *start;
        *start = total;
        total += count;
    }
    cell_start[n_cells] = total;

    scratch.clear();
    scratch.resize(idx.len(), 0);
    for &i in idx.iter() {
        let cursor = &mut cell_start[cell_id[i]];
        scratch[*cursor] = i;
        *cursor += 1;
    }
    // Each cursor now sits at the start of the next cell.
    for c in (1..n_cells).rev() {
        cell_start[c] = cell_start[c - 1];
    }
    if n_cells > 0 {
        cell_start[0] = 0;
    }
    idx.copy_from_slice(scratch);
    Ok(())
}

pub(crate) fn remove_zeros(idx: &mut [usize], n: &[u64], scratch: &mut Vec<usize>) -> usize {
    scratch.clear();
    scratch.extend(idx.iter().copied().filter(|&i| n[i] != 0));
    let kept = scratch.len();
    scratch.extend(idx.iter().copied().filter(|&i| n[i] == 0));
    idx.copy_from_slice(scratch);
    kept
}

pub(crate) fn find_pairs(
    is_first_in_pair: &mut [bool],
    cell_start: &[usize],
) -> Result<(), ParticleError> {
    let len = cell_start.last().copied().unwrap_or(0);
    if is_first_in_pair.len() < len {
        return Err(ParticleError::invariant(
            "find_pairs",
            format!("mask of {} for {len} positions", is_first_in_pair.len()),
        ));
    }
    is_first_in_pair.fill(false);
    for w in cell_start.windows(2) {
        let (start, end) = (w[0], w[1]);
        for p in (start..end).step_by(2) {
            is_first_in_pair[p] = p + 1 < end;
        }
    }
    Ok(())
}

/// Check the pair mask and return the first-in-pair positions.
pub(crate) fn pair_positions(
    op: &'static str,
    is_first_in_pair: &[bool],
    len: usize,
) -> Result<Vec<usize>, ParticleError> {
    if is_first_in_pair.len() < len {
        return Err(ParticleError::invariant(
            op,
            format!("mask of {} for {len} positions", is_first_in_pair.len()),
        ));
    }
    let mut firsts = Vec::with_capacity(len / 2);
    let mut p = 0;
    while p < len {
        if is_first_in_pair[p] {
            if p + 1 >= len {
                return Err(ParticleError::invariant(
                    op,
                    format!("pair at {p} extends past the working range"),
                ));
            }
            if is_first_in_pair[p + 1] {
                return Err(ParticleError::invariant(
                    op,
                    format!("pairs at {p} and {} overlap", p + 1),
                ));
            }
            firsts.push(p);
            p += 2;
        } else {
            p += 1;
        }
    }
    Ok(firsts)
}

pub(crate) fn sort_within_pairs(
    idx: &mut [usize],
    is_first_in_pair: &[bool],
    key: SortKey<'_>,
) -> Result<(), ParticleError> {
    for p in pair_positions("sort_within_pairs", is_first_in_pair, idx.len())? {
        if key.less(idx[p], idx[p + 1]) {
            idx.swap(p, p + 1);
        }
    }
    Ok(())
}

/// Validate every pair and compute its effective gamma.
///
/// `gamma_eff = min(floor(gamma), floor(n_i / n_j))`; pairs with
/// `gamma_eff == 0` are dropped from the plan.
pub(crate) fn plan_coalescence(
    n: &[u64],
    idx: &[usize],
    gamma: &[f64],
    is_first_in_pair: &[bool],
) -> Result<Vec<Merge>, ParticleError> {
    const OP: &str = "coalesce";
    if gamma.len() < idx.len() {
        return Err(ParticleError::invariant(
            OP,
            format!("{} gamma values for {} positions", gamma.len(), idx.len()),
        ));
    }
    let mut plan = Vec::new();
    for p in pair_positions(OP, is_first_in_pair, idx.len())? {
        let g = gamma[p];
        if g.is_nan() || g < 0.0 {
            return Err(ParticleError::invariant(OP, format!("gamma {g} at position {p}")));
        }
        let (first, second) = (idx[p], idx[p + 1]);
        let (n_i, n_j) = (n[first], n[second]);
        if n_j == 0 {
            return Err(ParticleError::invariant(
                OP,
                format!("slot {second} has zero multiplicity; sanitize first"),
            ));
        }
        if n_i < n_j {
            return Err(ParticleError::invariant(
                OP,
                format!("pair ({first}, {second}) not ordered: {n_i} < {n_j}"),
            ));
        }
        let gamma = (g.floor() as u64).min(n_i / n_j);
        if gamma > 0 {
            plan.push(Merge {
                first,
                second,
                gamma,
            });
        }
    }
    Ok(plan)
}

/// Blend one weighted-mean intensive row. Must run before the extensive
/// rows are accumulated, since the weights are pre-merge values.
pub(crate) fn blend_intensive_row(row: &mut [f64], weight: &[f64], plan: &[Merge]) {
    for m in plan {
        let w_i = m.gamma as f64 * weight[m.first];
        let w_j = weight[m.second];
        let total = w_i + w_j;
        if total > 0.0 {
            row[m.second] = (w_i * row[m.first] + w_j * row[m.second]) / total;
        }
    }
}

pub(crate) fn accumulate_extensive_row(row: &mut [f64], plan: &[Merge]) {
    for m in plan {
        row[m.second] += m.gamma as f64 * row[m.first];
    }
}

/// Subtract the merged droplets from each first member. Returns how many
/// multiplicities reached zero.
pub(crate) fn apply_multiplicities(n: &mut [u64], plan: &[Merge]) -> usize {
    let mut zeroed = 0;
    for m in plan {
        n[m.first] -= m.gamma * n[m.second];
        if n[m.first] == 0 {
            zeroed += 1;
        }
    }
    zeroed
}

/// Blend every weighted-mean row of `intensive` using `extensive` weights.
pub(crate) fn blend_intensive_stack(
    intensive: &mut Stack<f64>,
    extensive: &Stack<f64>,
    rules: &[SlotRule],
    plan: &[Merge],
) {
    for (r, rule) in rules.iter().enumerate() {
        if let Some(weight) = rule.weight() {
            blend_intensive_row(intensive.row_mut(r), extensive.row(weight), plan);
        }
    }
}

pub(crate) fn check_rules(
    rules: &[SlotRule],
    intensive: &Stack<f64>,
    extensive: &Stack<f64>,
) -> Result<(), ParticleError> {
    if rules.len() != intensive.rows() {
        return Err(ParticleError::invariant(
            "coalesce",
            format!("{} rules for {} intensive rows", rules.len(), intensive.rows()),
        ));
    }
    let out_of_range = rules.iter().any(|rule| match *rule {
        SlotRule::WeightedMean { weight } => weight >= extensive.rows(),
        SlotRule::Ratio {
            numerator,
            denominator,
        } => numerator >= extensive.rows() || denominator >= extensive.rows(),
    });
    if out_of_range {
        return Err(ParticleError::invariant(
            "coalesce",
            "merge rule refers to a missing extensive row",
        ));
    }
    Ok(())
}

pub(crate) fn check_moment_shapes(
    args: &MomentArgs<'_>,
    moment_0: &[f64],
    moments: &Stack<f64>,
) -> Result<usize, ParticleError> {
    const OP: &str = "moments";
    check_partition(OP, args.cell_start, args.idx.len())?;
    let n_cells = args.cell_start.len() - 1;
    if moment_0.len() != n_cells {
        return Err(ParticleError::invariant(
            OP,
            format!("moment_0 has {} entries for {n_cells} cells", moment_0.len()),
        ));
    }
    if moments.rows() != args.terms.len() || (!args.terms.is_empty() && moments.cols() != n_cells)
    {
        return Err(ParticleError::invariant(
            OP,
            format!(
                "moments buffer is {}x{}, expected {}x{n_cells}",
                moments.rows(),
                moments.cols(),
                args.terms.len()
            ),
        ));
    }
    let missing = args.terms.iter().any(|t| match t.group {
        AttrGroup::Extensive => t.row >= args.extensive.rows(),
        AttrGroup::Intensive => t.row >= args.intensive.rows(),
    });
    if missing {
        return Err(ParticleError::invariant(OP, "moment term refers to a missing row"));
    }
    Ok(n_cells)
}

/// Moments of one cell, already divided by the zeroth moment.
pub(crate) fn cell_moments(args: &MomentArgs<'_>, c: usize) -> CellMoments {
    let (lo, hi) = args.range;
    let mut m0 = 0.0;
    let mut sums: SmallVec<[f64; 8]> = SmallVec::from_elem(0.0, args.terms.len());
    for &i in &args.idx[args.cell_start[c]..args.cell_start[c + 1]] {
        let w = args.weighting[i];
        if !(lo <= w && w < hi) {
            continue;
        }
        let n = args.n[i] as f64;
        m0 += n;
        for (sum, term) in sums.iter_mut().zip(args.terms) {
            let value = match term.group {
                AttrGroup::Extensive => args.extensive.get(term.row, i),
                AttrGroup::Intensive => args.intensive.get(term.row, i),
            };
            *sum += n * value.powi(term.rank);
        }
    }
    if m0 == 0.0 {
        sums.fill(EMPTY_CELL_MOMENT);
    } else {
        for sum in sums.iter_mut() {
            *sum /= m0;
        }
    }
    (m0, sums)
}

pub(crate) fn store_cell_moments(
    c: usize,
    (m0, values): &CellMoments,
    moment_0: &mut [f64],
    moments: &mut Stack<f64>,
) {
    moment_0[c] = *m0;
    for (k, &v) in values.iter().enumerate() {
        moments.set(k, c, v);
    }
}

pub(crate) fn check_precipitation(args: &PrecipitationArgs<'_>) -> Result<(), ParticleError> {
    let n_sd = args.n.len();
    if args.cell_origin.is_empty()
        || args.cell_origin.rows() != args.position_in_cell.rows()
        || args.cell_origin.cols() != n_sd
        || args.position_in_cell.cols() != n_sd
        || args.volume.len() != n_sd
    {
        return Err(ParticleError::invariant(
            "flag_precipitated",
            "spatial buffers do not match the particle count",
        ));
    }
    Ok(())
}

pub(crate) fn below_floor(args: &PrecipitationArgs<'_>, slot: usize) -> bool {
    let z = args.cell_origin.rows() - 1;
    (args.cell_origin.get(z, slot) as f64 + args.position_in_cell.get(z, slot)) < 0.0
}

/// Zero the given slots and return `(flux, removed)`.
pub(crate) fn apply_precipitation(
    n: &mut [u64],
    volume: &[f64],
    slots: impl IntoIterator<Item = usize>,
) -> (f64, usize) {
    let mut flux = 0.0;
    let mut removed = 0;
    for i in slots {
        flux += n[i] as f64 * volume[i];
        n[i] = 0;
        removed += 1;
    }
    (flux, removed)
}

pub(crate) fn check_cell_id_shapes(
    cell_id: &[usize],
    idx: &[usize],
    cell_origin: &Stack<i64>,
    strides: &[usize],
    grid: &[usize],
) -> Result<(), ParticleError> {
    if strides.len() != grid.len()
        || cell_origin.rows() != grid.len()
        || cell_origin.cols() != cell_id.len()
    {
        return Err(ParticleError::invariant(
            "cell_id",
            format!(
                "{}-d origins, {} strides, {}-d grid",
                cell_origin.rows(),
                strides.len(),
                grid.len()
            ),
        ));
    }
    if let Some(&slot) = idx.iter().find(|&&slot| slot >= cell_id.len()) {
        return Err(ParticleError::invariant(
            "cell_id",
            format!("slot {slot} past {} particles", cell_id.len()),
        ));
    }
    Ok(())
}

pub(crate) fn cell_id_of(
    slot: usize,
    cell_origin: &Stack<i64>,
    strides: &[usize],
    grid: &[usize],
) -> Result<usize, ParticleError> {
    let mut id = 0;
    for (d, (&stride, &size)) in strides.iter().zip(grid).enumerate() {
        let o = cell_origin.get(d, slot);
        if o < 0 || o as usize >= size {
            return Err(ParticleError::invariant(
                "cell_id",
                format!("slot {slot} has origin {o} outside 0..{size} in dimension {d}"),
            ));
        }
        id += o as usize * stride;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_partner_stays_in_range_for_unit_values() {
        let mut idx = vec![0, 1, 2, 3];
        shuffle_range(&mut idx, &[1.0, 1.0, 1.0, 1.0], 0, 4);
        let mut sorted = idx.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn gamma_is_capped_by_multiplicity_ratio() {
        let n = [7, 3];
        let plan = plan_coalescence(&n, &[0, 1], &[5.0, 0.0], &[true, false]).unwrap();
        assert_eq!(
            plan,
            vec![Merge {
                first: 0,
                second: 1,
                gamma: 2
            }]
        );
    }

    #[test]
    fn fractional_gamma_is_floored() {
        let plan = plan_coalescence(&[4, 4], &[0, 1], &[0.9, 0.0], &[true, false]).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn overlapping_pairs_are_rejected() {
        let err = pair_positions("coalesce", &[true, true, false], 3).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn pair_past_working_range_is_rejected() {
        assert!(pair_positions("coalesce", &[false, true, true], 2).is_err());
    }

    #[test]
    fn nan_gamma_is_rejected() {
        assert!(plan_coalescence(&[2, 1], &[0, 1], &[f64::NAN, 0.0], &[true, false]).is_err());
    }

    #[test]
    fn weighted_blend_uses_pre_merge_weights() {
        let mut row = vec![300.0, 270.0];
        let weight = [1.0, 2.0];
        let plan = [Merge {
            first: 0,
            second: 1,
            gamma: 2,
        }];
        blend_intensive_row(&mut row, &weight, &plan);
        // weights 2*1 and 2 → plain mean
        assert_eq!(row[1], 285.0);
        assert_eq!(row[0], 300.0);
    }

    #[test]
    fn origin_outside_grid_is_rejected() {
        let origin = Stack::from_rows(1, vec![vec![0], vec![3]]).unwrap();
        assert!(cell_id_of(0, &origin, &[3, 1], &[2, 3]).is_err());
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn planned_merges_never_underflow(
                pairs in proptest::collection::vec((1u64..1_000, 1u64..1_000, 0.0f64..10.0), 1..40),
            ) {
                let mut n = Vec::new();
                let mut gamma = Vec::new();
                let mut mask = Vec::new();
                for &(a, b, g) in &pairs {
                    n.extend([a.max(b), a.min(b)]);
                    gamma.extend([g, 0.0]);
                    mask.extend([true, false]);
                }
                let idx: Vec<usize> = (0..n.len()).collect();
                let plan = plan_coalescence(&n, &idx, &gamma, &mask).unwrap();
                for m in &plan {
                    prop_assert!(m.gamma <= n[m.first] / n[m.second]);
                    prop_assert!(m.gamma as f64 <= gamma[m.first]);
                }
                let before: u64 = n.iter().sum();
                let zeroed = apply_multiplicities(&mut n, &plan);
                prop_assert_eq!(zeroed, n.iter().filter(|&&x| x == 0).count());
                prop_assert!(n.iter().sum::<u64>() <= before);
            }

            #[test]
            fn sdm_end_lands_on_a_cell_boundary(
                dt_left in proptest::collection::vec(prop_oneof![Just(0.0f64), 0.1f64..1.0], 1..20),
            ) {
                let cell_start: Vec<usize> = (0..=dt_left.len()).map(|c| 3 * c).collect();
                check_dt_left(&dt_left, &cell_start).unwrap();
                let end = sdm_end(dt_left.iter().rposition(|&dt| dt != 0.0), &cell_start);
                prop_assert!(cell_start.contains(&end));
                prop_assert!(dt_left[end / 3..].iter().all(|&dt| dt == 0.0));
            }
        }
    }
}
