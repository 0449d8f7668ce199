//! Backend conformance: run one workload on every backend and compare.

use std::fmt::Debug;

use drizzle_backend::{default_backend, SerialBackend};
use drizzle_core::Backend;

/// Every backend this build provides, by label. The serial backend is
/// always first.
pub fn backends() -> Vec<(&'static str, Box<dyn Backend>)> {
    vec![
        ("serial", Box::new(SerialBackend::new())),
        ("default", default_backend()),
    ]
}

/// Run `workload` once per backend and assert every result equals the
/// serial one.
pub fn assert_backends_agree<T, F>(mut workload: F)
where
    T: PartialEq + Debug,
    F: FnMut(Box<dyn Backend>) -> T,
{
    let mut runs = backends()
        .into_iter()
        .map(|(label, backend)| (label, workload(backend)));
    let (reference_label, reference) = runs.next().expect("serial backend");
    for (label, result) in runs {
        assert_eq!(reference, result, "{label} disagrees with {reference_label}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_comes_first() {
        let all = backends();
        assert_eq!(all[0].0, "serial");
        assert_eq!(all[0].1.name(), SerialBackend::new().name());
    }

    #[test]
    fn identical_workloads_agree() {
        assert_backends_agree(|backend| !backend.name().is_empty());
    }
}
