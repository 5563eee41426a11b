//! Setup and configuration errors of the medium system.

use thiserror::Error;

use crate::sim::materials::MaterialType;

/// Result type for medium system setup and configuration.
pub type Result<T> = std::result::Result<T, MediumError>;

/// Fatal configuration inconsistencies detected during setup.
///
/// Out-of-range cell or component indices are programming defects and are
/// reported through panics instead.
#[derive(Debug, Error)]
pub enum MediumError {
    #[error("the medium system has no media")]
    NoMedia,

    #[error(
        "medium component {component} has material type {found:?} in cell {cell}, \
         but {expected:?} elsewhere"
    )]
    MixedMaterialTypes {
        component: usize,
        cell: usize,
        expected: MaterialType,
        found: MaterialType,
    },

    #[error(
        "medium component {component} does not match the polarization support of \
         medium component 0; all media must either support polarization or not"
    )]
    MixedPolarization { component: usize },

    #[error("media {first} and {second} both define a magnetic field; at most one is allowed")]
    MultipleMagneticFields { first: usize, second: usize },

    #[error("medium dimension {found} exceeds the spatial grid dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("invalid dynamic state iteration bounds: min={min}, max={max}")]
    InvalidIterationBounds { min: usize, max: usize },

    #[error("invalid wavelength grid: {0}")]
    InvalidWavelengthGrid(String),

    #[error("medium {medium} declares no material mix")]
    NoMixes { medium: usize },

    #[error("medium {medium} selects mix {index} in cell {cell}, which it does not declare")]
    UndeclaredMix {
        medium: usize,
        cell: usize,
        index: usize,
    },

    #[error("medium {medium} refers to mix {index}, but only {available} mixes are registered")]
    UnknownMix {
        medium: usize,
        index: usize,
        available: usize,
    },
}
