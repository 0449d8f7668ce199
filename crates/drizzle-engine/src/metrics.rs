//! Cumulative counters for a particle set.
//!
//! [`EngineMetrics`] is a snapshot returned by
//! [`ParticleSet::metrics`](crate::ParticleSet::metrics). Counters only
//! grow over the lifetime of the set; callers that want per-step figures
//! diff two snapshots.

/// Cumulative counters collected by a [`ParticleSet`](crate::ParticleSet).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineMetrics {
    /// Number of times the cell partition was rebuilt.
    pub partition_rebuilds: u64,
    /// Number of `sanitize` calls that compacted the index.
    pub sanitize_compactions: u64,
    /// Index entries dropped by `sanitize`.
    pub particles_removed: u64,
    /// Coalescence calls executed.
    pub coalescence_calls: u64,
    /// Pairs merged with a non-zero effective gamma.
    pub pairs_merged: u64,
    /// Particles removed below the domain floor.
    pub precipitated_particles: u64,
    /// Volume carried out of the domain, summed over calls.
    pub precipitated_volume: f64,
}

impl EngineMetrics {
    /// Counter-wise difference `self - earlier`.
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            partition_rebuilds: self.partition_rebuilds - earlier.partition_rebuilds,
            sanitize_compactions: self.sanitize_compactions - earlier.sanitize_compactions,
            particles_removed: self.particles_removed - earlier.particles_removed,
            coalescence_calls: self.coalescence_calls - earlier.coalescence_calls,
            pairs_merged: self.pairs_merged - earlier.pairs_merged,
            precipitated_particles: self.precipitated_particles - earlier.precipitated_particles,
            precipitated_volume: self.precipitated_volume - earlier.precipitated_volume,
        }
    }
}
