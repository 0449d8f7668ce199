//! Removal of dead particles: compaction and precipitation.

use drizzle_core::attribute::MULTIPLICITY;
use drizzle_core::ParticleError;

use crate::particles::ParticleSet;

impl ParticleSet {
    /// Drop zero-multiplicity entries from the index and restore health.
    ///
    /// Widens the working range to the valid range first, so a cut
    /// working length is forgotten. Returns the number of entries
    /// removed; a healthy set is left untouched and returns 0.
    pub fn sanitize(&mut self) -> usize {
        if self.healthy {
            return 0;
        }
        self.index.reset_working_length();
        let removed = self
            .index
            .compact_remove_zero_weight(self.backend.as_ref(), self.store.multiplicity());
        self.healthy = true;
        self.cells.invalidate();
        self.metrics.sanitize_compactions += 1;
        self.metrics.particles_removed += removed as u64;
        tracing::debug!(removed, valid = self.index.valid_len(), "sanitized");
        removed
    }

    /// Zero the multiplicity of every particle below the domain floor and
    /// return the volume they carried out, `Σ n · volume`.
    ///
    /// The set becomes unhealthy if anything was removed.
    ///
    /// # Errors
    ///
    /// [`ParticleError::UnknownAttribute`] without spatial attributes or a
    /// `"volume"` attribute; [`ParticleError::InvariantViolation`] on an
    /// unhealthy set.
    pub fn remove_precipitated(&mut self) -> Result<f64, ParticleError> {
        self.require_healthy("remove_precipitated")?;
        let args = self.store.precipitation_args(self.index.as_slice())?;
        let outcome = self.backend.flag_precipitated(args)?;
        if outcome.removed > 0 {
            self.healthy = false;
            self.store.mark_updated(MULTIPLICITY)?;
            self.cells.invalidate();
        }
        self.metrics.precipitated_particles += outcome.removed as u64;
        self.metrics.precipitated_volume += outcome.flux;
        tracing::debug!(
            removed = outcome.removed,
            flux = outcome.flux,
            "precipitation"
        );
        Ok(outcome.flux)
    }
}
