//! Physical constants in SI units.

/// Speed of light in vacuum [m/s].
pub const SPEED_OF_LIGHT: f64 = 2.997_924_58e8;

/// Stefan-Boltzmann constant [W/(m^2 K^4)].
pub const STEFAN_BOLTZMANN: f64 = 5.670_374_419e-8;

/// Thomson cross section [m^2].
pub const THOMSON_SECTION: f64 = 6.652_458_732_1e-29;

/// Electron mass [kg].
pub const ELECTRON_MASS: f64 = 9.109_383_701_5e-31;

/// Proton mass [kg].
pub const PROTON_MASS: f64 = 1.672_621_923_69e-27;
