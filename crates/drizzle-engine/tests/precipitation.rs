//! Integration test: sedimentation out of a vertical column.
//!
//! Droplets fall a fixed distance per step; those leaving the bottom are
//! removed and their volume reported as flux. Volume in the domain plus
//! accumulated flux must stay constant.

use drizzle_backend::SerialBackend;
use drizzle_engine::{MomentRequest, Moments};
use drizzle_test_utils::conformance::assert_backends_agree;
use drizzle_test_utils::fixtures::{fall, rain_column};
use drizzle_test_utils::total_extensive;

#[test]
fn column_drains_with_mass_balance() {
    let mut p = rain_column(21, 400, 10, Box::new(SerialBackend::new()));
    let initial = total_extensive(&p, "volume");
    let mut flux = 0.0;
    for _ in 0..30 {
        fall(&mut p, 0.45);
        flux += p.remove_precipitated().unwrap();
        p.sanitize();
        p.recalculate_cell_id().unwrap();
        let remaining = total_extensive(&p, "volume");
        assert!((remaining + flux - initial).abs() < 1e-9 * initial);
    }
    assert_eq!(p.sd_num().unwrap(), 0);
    assert!((flux - initial).abs() < 1e-9 * initial);
    let m = p.metrics();
    assert_eq!(m.precipitated_particles, 400);
    assert!((m.precipitated_volume - flux).abs() < 1e-9 * initial);
}

#[test]
fn remaining_droplets_stay_in_their_cells() {
    let mut p = rain_column(4, 200, 8, Box::new(SerialBackend::new()));
    fall(&mut p, 2.5);
    p.remove_precipitated().unwrap();
    p.sanitize();
    p.recalculate_cell_id().unwrap();
    let cell_start = p.cell_start().unwrap().to_vec();
    let spatial = p.spatial().unwrap();
    for c in 0..p.n_cells() {
        for k in cell_start[c]..cell_start[c + 1] {
            let slot = p.index()[k];
            assert_eq!(spatial.cell_origin.get(0, slot), c as i64);
            assert!(spatial.height(slot) >= 0.0);
        }
    }
}

#[test]
fn backends_agree_on_a_draining_column() {
    assert_backends_agree(|backend| {
        let mut p = rain_column(9, 256, 6, backend);
        let request = MomentRequest::new().ranks("volume", &[0, 1, 2]);
        let mut out = Moments::for_request(&request, p.n_cells());
        let mut fluxes = Vec::new();
        for _ in 0..5 {
            fall(&mut p, 0.7);
            fluxes.push(p.remove_precipitated().unwrap());
            p.sanitize();
            p.recalculate_cell_id().unwrap();
        }
        p.moments(&mut out, &request, "volume", (0.0, f64::INFINITY))
            .unwrap();
        (fluxes, p.index().to_vec(), out)
    });
}
