//! Particle-set construction, validation, and error types.
//!
//! [`ParticlesBuilder`] collects multiplicities, attribute buffers, cell
//! geometry, and the backend. [`build()`](ParticlesBuilder::build) checks
//! every structural invariant before any buffer is handed to the engine,
//! so a [`ParticleSet`] is never observed half-initialised.

use std::error::Error;
use std::fmt;

use indexmap::IndexMap;

use drizzle_backend::default_backend;
use drizzle_core::attribute::{CELL_ID, CELL_ORIGIN, POSITION_IN_CELL, RESERVED, VOLUME};
use drizzle_core::{AttrDef, AttrGroup, AttrKind, Backend, MergeRule, ParticleError, Stack};
use drizzle_store::{AttributeStore, Mesh, Spatial};

use crate::particles::ParticleSet;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`ParticlesBuilder::build()`].
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// No multiplicities were supplied, or the population is empty.
    EmptyPopulation,
    /// A per-particle buffer does not have one entry per particle.
    LengthMismatch {
        /// The attribute whose buffer is mis-sized.
        name: String,
        /// The particle count.
        expected: usize,
        /// The buffer length supplied.
        got: usize,
    },
    /// An attribute was declared twice.
    DuplicateAttribute {
        /// The repeated name.
        name: String,
    },
    /// An attribute uses a name the engine manages itself.
    ReservedName {
        /// The offending name.
        name: String,
    },
    /// A merge rule names an attribute that is not extensive.
    UnresolvedRule {
        /// The intensive attribute carrying the rule.
        attribute: String,
        /// The name the rule depends on.
        dependency: String,
    },
    /// `"volume"` was declared intensive.
    VolumeNotExtensive,
    /// The particle set would have zero cells.
    NoCells,
    /// A cell id is not below the cell count.
    CellIdOutOfRange {
        /// Slot carrying the id.
        slot: usize,
        /// The id supplied.
        cell: usize,
        /// Number of cells.
        n_cells: usize,
    },
    /// Explicit cell ids or a cell count were given alongside a mesh.
    ConflictingGeometry,
    /// Spatial attributes do not have one row per mesh dimension.
    InvalidMesh {
        /// Mesh dimensionality.
        dims: usize,
        /// Rows supplied.
        rows: usize,
    },
    /// Building the store or computing cell ids failed.
    Particle(ParticleError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPopulation => write!(f, "particle set has no particles"),
            Self::LengthMismatch {
                name,
                expected,
                got,
            } => write!(f, "'{name}' has {got} entries, expected {expected}"),
            Self::DuplicateAttribute { name } => write!(f, "attribute '{name}' declared twice"),
            Self::ReservedName { name } => write!(f, "'{name}' is a reserved attribute name"),
            Self::UnresolvedRule {
                attribute,
                dependency,
            } => write!(
                f,
                "'{attribute}' depends on '{dependency}', which is not an extensive attribute"
            ),
            Self::VolumeNotExtensive => write!(f, "'volume' must be extensive"),
            Self::NoCells => write!(f, "particle set has zero cells"),
            Self::CellIdOutOfRange {
                slot,
                cell,
                n_cells,
            } => write!(f, "slot {slot} has cell id {cell}, only {n_cells} cells"),
            Self::ConflictingGeometry => {
                write!(f, "explicit cell ids or cell count given alongside a mesh")
            }
            Self::InvalidMesh { dims, rows } => {
                write!(f, "{rows} spatial rows for a {dims}-d mesh")
            }
            Self::Particle(e) => write!(f, "particle set: {e}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Particle(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParticleError> for ConfigError {
    fn from(e: ParticleError) -> Self {
        Self::Particle(e)
    }
}

// ── ParticlesBuilder ───────────────────────────────────────────────

struct MeshInit {
    mesh: Mesh,
    cell_origin: Vec<Vec<i64>>,
    position_in_cell: Vec<Vec<f64>>,
}

/// Builder for [`ParticleSet`].
///
/// Geometry is given either as a [`Mesh`] with per-particle spatial
/// attributes (cell ids are then computed), or as explicit cell ids plus a
/// cell count. With neither, every particle sits in a single cell.
///
/// ```
/// use drizzle_engine::{MergeRule, ParticleSet};
///
/// let particles = ParticleSet::builder()
///     .multiplicity(vec![100, 40])
///     .extensive("volume", vec![1.0, 2.0])
///     .intensive("temperature", MergeRule::weighted_mean("volume"), vec![280.0, 290.0])
///     .build()
///     .unwrap();
/// assert_eq!(particles.n_sd(), 2);
/// assert_eq!(particles.n_cells(), 1);
/// ```
#[derive(Default)]
pub struct ParticlesBuilder {
    multiplicity: Option<Vec<u64>>,
    attributes: Vec<(AttrDef, Vec<f64>)>,
    cell_id: Option<Vec<usize>>,
    n_cells: Option<usize>,
    mesh: Option<MeshInit>,
    backend: Option<Box<dyn Backend>>,
}

impl ParticlesBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-particle multiplicities. Fixes the particle count.
    pub fn multiplicity(mut self, n: Vec<u64>) -> Self {
        self.multiplicity = Some(n);
        self
    }

    /// Declare an attribute with its initial values.
    pub fn attribute(mut self, def: AttrDef, values: Vec<f64>) -> Self {
        self.attributes.push((def, values));
        self
    }

    /// Declare an extensive attribute.
    pub fn extensive(self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.attribute(AttrDef::extensive(name), values)
    }

    /// Declare an intensive attribute with its merge rule.
    pub fn intensive(self, name: impl Into<String>, rule: MergeRule, values: Vec<f64>) -> Self {
        self.attribute(AttrDef::intensive(name, rule), values)
    }

    /// Explicit cell ids, one per particle.
    pub fn cell_id(mut self, cell_id: Vec<usize>) -> Self {
        self.cell_id = Some(cell_id);
        self
    }

    /// Number of cells when no mesh is given. Defaults to 1.
    pub fn n_cells(mut self, n_cells: usize) -> Self {
        self.n_cells = Some(n_cells);
        self
    }

    /// Place particles on `mesh`. Both attribute sets are given as one
    /// row per mesh dimension, one entry per particle.
    pub fn mesh(
        mut self,
        mesh: Mesh,
        cell_origin: Vec<Vec<i64>>,
        position_in_cell: Vec<Vec<f64>>,
    ) -> Self {
        self.mesh = Some(MeshInit {
            mesh,
            cell_origin,
            position_in_cell,
        });
        self
    }

    /// Kernel backend. Defaults to [`default_backend()`].
    pub fn backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Validate and construct the particle set.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] variant; nothing is constructed on failure.
    pub fn build(self) -> Result<ParticleSet, ConfigError> {
        let n = match self.multiplicity {
            Some(n) if !n.is_empty() => n,
            _ => return Err(ConfigError::EmptyPopulation),
        };
        let n_sd = n.len();
        check_attributes(&self.attributes, n_sd)?;

        let backend = self.backend.unwrap_or_else(default_backend);
        let (cell_id, n_cells, spatial) = match self.mesh {
            Some(init) => {
                if self.cell_id.is_some() || self.n_cells.is_some() {
                    return Err(ConfigError::ConflictingGeometry);
                }
                let spatial = spatial_from(init, n_sd)?;
                let mut cell_id = vec![0; n_sd];
                let every_slot: Vec<usize> = (0..n_sd).collect();
                backend.cell_id(
                    &mut cell_id,
                    &every_slot,
                    &spatial.cell_origin,
                    &spatial.mesh().strides(),
                    spatial.mesh().grid(),
                )?;
                (cell_id, spatial.mesh().n_cells(), Some(spatial))
            }
            None => {
                let n_cells = self.n_cells.unwrap_or(1);
                if n_cells == 0 {
                    return Err(ConfigError::NoCells);
                }
                let cell_id = self.cell_id.unwrap_or_else(|| vec![0; n_sd]);
                check_len(CELL_ID, n_sd, cell_id.len())?;
                if let Some((slot, &cell)) = cell_id.iter().enumerate().find(|(_, &c)| c >= n_cells)
                {
                    return Err(ConfigError::CellIdOutOfRange {
                        slot,
                        cell,
                        n_cells,
                    });
                }
                (cell_id, n_cells, None)
            }
        };

        let store = AttributeStore::new(n, cell_id, self.attributes, spatial)?;
        Ok(ParticleSet::from_parts(backend, store, n_cells))
    }
}

fn check_len(name: &str, expected: usize, got: usize) -> Result<(), ConfigError> {
    if expected != got {
        return Err(ConfigError::LengthMismatch {
            name: name.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

fn check_attributes(attributes: &[(AttrDef, Vec<f64>)], n_sd: usize) -> Result<(), ConfigError> {
    let mut groups: IndexMap<&str, AttrGroup> = IndexMap::new();
    for (def, values) in attributes {
        let name = def.name.as_str();
        if RESERVED.contains(&name) {
            return Err(ConfigError::ReservedName {
                name: name.to_string(),
            });
        }
        if groups.insert(name, def.group()).is_some() {
            return Err(ConfigError::DuplicateAttribute {
                name: name.to_string(),
            });
        }
        check_len(name, n_sd, values.len())?;
    }
    if groups.get(VOLUME) == Some(&AttrGroup::Intensive) {
        return Err(ConfigError::VolumeNotExtensive);
    }
    for (def, _) in attributes {
        let AttrKind::Intensive(rule) = &def.kind else {
            continue;
        };
        for dep in rule.dependencies() {
            if groups.get(dep) != Some(&AttrGroup::Extensive) {
                return Err(ConfigError::UnresolvedRule {
                    attribute: def.name.clone(),
                    dependency: dep.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn spatial_from(init: MeshInit, n_sd: usize) -> Result<Spatial, ConfigError> {
    let dims = init.mesh.dims();
    for rows in [init.cell_origin.len(), init.position_in_cell.len()] {
        if rows != dims {
            return Err(ConfigError::InvalidMesh { dims, rows });
        }
    }
    for row in &init.cell_origin {
        check_len(CELL_ORIGIN, n_sd, row.len())?;
    }
    for row in &init.position_in_cell {
        check_len(POSITION_IN_CELL, n_sd, row.len())?;
    }
    let cell_origin = Stack::from_rows(n_sd, init.cell_origin).ok_or(ConfigError::InvalidMesh {
        dims,
        rows: 0,
    })?;
    let position_in_cell =
        Stack::from_rows(n_sd, init.position_in_cell).ok_or(ConfigError::InvalidMesh {
            dims,
            rows: 0,
        })?;
    Spatial::new(init.mesh, cell_origin, position_in_cell)
        .ok_or(ConfigError::InvalidMesh { dims, rows: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drizzle_backend::SerialBackend;

    fn base() -> ParticlesBuilder {
        ParticleSet::builder()
            .multiplicity(vec![3, 2, 1])
            .backend(Box::new(SerialBackend::new()))
    }

    #[test]
    fn minimal_set_builds() {
        let p = base().build().unwrap();
        assert_eq!(p.n_sd(), 3);
        assert_eq!(p.n_cells(), 1);
        assert_eq!(p.cell_id(), &[0, 0, 0]);
        assert!(p.is_healthy());
    }

    #[test]
    fn empty_population_rejected() {
        let err = ParticleSet::builder().build().unwrap_err();
        assert_eq!(err, ConfigError::EmptyPopulation);
        let err = ParticleSet::builder().multiplicity(vec![]).build().unwrap_err();
        assert_eq!(err, ConfigError::EmptyPopulation);
    }

    #[test]
    fn length_mismatch_rejected() {
        let err = base().extensive("volume", vec![1.0]).build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::LengthMismatch {
                name: "volume".into(),
                expected: 3,
                got: 1
            }
        );
    }

    #[test]
    fn reserved_and_duplicate_names_rejected() {
        let err = base().extensive("n", vec![0.0; 3]).build().unwrap_err();
        assert_eq!(err, ConfigError::ReservedName { name: "n".into() });

        let err = base()
            .extensive("volume", vec![1.0; 3])
            .extensive("volume", vec![1.0; 3])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateAttribute {
                name: "volume".into()
            }
        );
    }

    #[test]
    fn rules_must_resolve_to_extensive_attributes() {
        let err = base()
            .intensive("temperature", MergeRule::weighted_mean("volume"), vec![0.0; 3])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnresolvedRule {
                attribute: "temperature".into(),
                dependency: "volume".into()
            }
        );
    }

    #[test]
    fn intensive_volume_rejected() {
        let err = base()
            .extensive("mass", vec![1.0; 3])
            .intensive("volume", MergeRule::weighted_mean("mass"), vec![1.0; 3])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::VolumeNotExtensive);
    }

    #[test]
    fn cell_geometry_is_validated() {
        let err = base().n_cells(0).build().unwrap_err();
        assert_eq!(err, ConfigError::NoCells);

        let err = base().n_cells(2).cell_id(vec![0, 2, 1]).build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::CellIdOutOfRange {
                slot: 1,
                cell: 2,
                n_cells: 2
            }
        );

        let err = base().cell_id(vec![0, 0]).build().unwrap_err();
        assert!(matches!(err, ConfigError::LengthMismatch { .. }));
    }

    #[test]
    fn mesh_computes_cell_ids() {
        let mesh = Mesh::new(&[2, 3]).unwrap();
        let p = base()
            .mesh(
                mesh,
                vec![vec![0, 1, 1], vec![2, 0, 1]],
                vec![vec![0.5; 3], vec![0.25; 3]],
            )
            .build()
            .unwrap();
        assert_eq!(p.n_cells(), 6);
        assert_eq!(p.cell_id(), &[2, 3, 4]);
    }

    #[test]
    fn mesh_shape_and_conflicts_rejected() {
        let mesh = Mesh::new(&[2, 3]).unwrap();
        let err = base()
            .mesh(mesh.clone(), vec![vec![0; 3]], vec![vec![0.0; 3]])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidMesh { dims: 2, rows: 1 });

        let err = base()
            .n_cells(6)
            .mesh(mesh.clone(), vec![vec![0; 3]; 2], vec![vec![0.0; 3]; 2])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ConflictingGeometry);

        let err = base()
            .mesh(mesh, vec![vec![0, 0, 2], vec![0; 3]], vec![vec![0.0; 3]; 2])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Particle(ref e) if e.is_fatal()));
        assert!(err.source().is_some());
    }

    #[test]
    fn display_names_the_attribute() {
        let err = ConfigError::UnresolvedRule {
            attribute: "conc".into(),
            dependency: "moles".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("conc"));
        assert!(msg.contains("moles"));
    }
}
