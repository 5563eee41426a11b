use std::f64::consts::PI;

use tracing::{info, warn};

use crate::sim::medium::Medium;
use crate::{Point, Vector};

/// Imported particle with a uniform-sphere smoothing kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedParticle {
    pub center: Point,
    /// Smoothing length (kernel radius) [m].
    pub radius: f64,
    /// Mass [kg]. Individual masses may be negative.
    pub mass: f64,
    pub velocity: Vector,
}

impl SmoothedParticle {
    pub fn new(center: Point, radius: f64, mass: f64) -> Self {
        Self {
            center,
            radius,
            mass,
            velocity: Vector::zero(),
        }
    }

    fn kernel_density(&self, pos: Point) -> f64 {
        let u = pos.distance(self.center) / self.radius;
        if u < 1.0 {
            3.0 * self.mass / (4.0 * PI * self.radius.powi(3))
        } else {
            0.0
        }
    }
}

/// Medium imported from a set of smoothed particles.
///
/// If the total imported mass is negative, the complete mass distribution is
/// suppressed: the medium then has zero density everywhere and
/// [`SmoothedParticleMedium::is_suppressed`] returns true.
#[derive(Debug, Clone)]
pub struct SmoothedParticleMedium {
    name: String,
    particles: Vec<SmoothedParticle>,
    mix: usize,
    mass_per_entity: f64,
    total_mass: f64,
    suppressed: bool,
}

impl SmoothedParticleMedium {
    /// `mass_per_entity` converts mass density into number density and must
    /// match the mass of the mix with index `mix`.
    pub fn new(
        name: &str,
        particles: Vec<SmoothedParticle>,
        mix: usize,
        mass_per_entity: f64,
    ) -> Self {
        let total_mass: f64 = particles.iter().map(|p| p.mass).sum();
        info!(
            medium = name,
            num_particles = particles.len(),
            total_mass,
            "imported smoothed particles"
        );

        let mut medium = Self {
            name: name.to_string(),
            particles,
            mix,
            mass_per_entity,
            total_mass,
            suppressed: false,
        };
        if total_mass < 0.0 {
            warn!(
                medium = name,
                total_mass, "total imported mass is negative; suppressing the complete mass distribution"
            );
            medium.particles.clear();
            medium.total_mass = 0.0;
            medium.suppressed = true;
        }
        medium
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// Total retained mass [kg].
    pub fn total_mass(&self) -> f64 {
        self.total_mass
    }

    pub fn mass_density(&self, pos: Point) -> f64 {
        let rho: f64 = self.particles.iter().map(|p| p.kernel_density(pos)).sum();
        // Overlapping negative particles may produce a locally negative sum
        rho.max(0.0)
    }
}

impl Medium for SmoothedParticleMedium {
    fn name(&self) -> &str {
        &self.name
    }

    fn number_density(&self, pos: Point) -> f64 {
        self.mass_density(pos) / self.mass_per_entity
    }

    /// Mass-weighted velocity of the particles covering `pos`.
    fn bulk_velocity(&self, pos: Point) -> Vector {
        let mut weight = 0.0;
        let mut sum = Vector::zero();
        for p in &self.particles {
            let w = p.kernel_density(pos);
            if w > 0.0 {
                weight += w;
                sum = sum + p.velocity * w;
            }
        }
        if weight > 0.0 {
            sum * (1.0 / weight)
        } else {
            Vector::zero()
        }
    }

    fn mix_index(&self, _pos: Point) -> usize {
        self.mix
    }

    fn mix_indices(&self) -> Vec<usize> {
        vec![self.mix]
    }
}
