//! Photon packets and the optical depth breakdown recorded along their path.

use crate::sim::constants::SPEED_OF_LIGHT;
use crate::{Point, Vector};

/// Optical depth contribution of one cell crossed by a photon packet path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpticalDepthSegment {
    pub cell: usize,
    /// Path length inside the cell [m].
    pub ds: f64,
    /// Path length from the packet position to the exit boundary of the cell [m].
    pub s: f64,
    /// Optical depth contributed by this cell.
    pub dtau: f64,
    /// Cumulative optical depth up to the entry boundary of this cell.
    pub tau_near: f64,
}

impl OpticalDepthSegment {
    /// Cumulative optical depth up to the exit boundary of this cell.
    pub fn tau_far(&self) -> f64 {
        self.tau_near + self.dtau
    }
}

/// A monochromatic packet of photons travelling through the medium.
#[derive(Debug, Clone)]
pub struct PhotonPacket {
    position: Point,
    direction: Vector,
    wavelength: f64,
    luminosity: f64,
    path: Vec<OpticalDepthSegment>,
}

impl PhotonPacket {
    /// Creates a packet. Returns `None` if the direction has zero length.
    pub fn new(position: Point, direction: Vector, wavelength: f64, luminosity: f64) -> Option<Self> {
        let direction = direction.normalize()?;
        Some(Self {
            position,
            direction,
            wavelength,
            luminosity,
            path: Vec::new(),
        })
    }

    pub fn position(&self) -> Point {
        self.position
    }

    /// Unit propagation direction.
    pub fn direction(&self) -> Vector {
        self.direction
    }

    /// Wavelength in the frame of the source [m].
    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    /// Luminosity carried by the packet [W].
    pub fn luminosity(&self) -> f64 {
        self.luminosity
    }

    /// Wavelength perceived by a medium moving at `velocity`, after the packet
    /// travelled through an expanding space with relative expansion `expansion`
    /// (expansion rate times path length).
    ///
    /// Uses the first-order Doppler shift.
    pub fn perceived_wavelength(&self, velocity: Vector, expansion: f64) -> f64 {
        self.wavelength * (1.0 + self.direction.dot(velocity) / SPEED_OF_LIGHT + expansion)
    }

    /// Moves the packet along its direction and forgets the recorded path.
    pub fn propagate(&mut self, distance: f64) {
        self.position = self.position + self.direction * distance;
        self.path.clear();
    }

    pub fn set_optical_depth_path(&mut self, path: Vec<OpticalDepthSegment>) {
        self.path = path;
    }

    /// Optical depth breakdown recorded by the last optical depth fill.
    pub fn optical_depth_path(&self) -> &[OpticalDepthSegment] {
        &self.path
    }

    /// Optical depth over the complete recorded path.
    pub fn total_optical_depth(&self) -> f64 {
        self.path.last().map_or(0.0, |seg| seg.tau_far())
    }

    /// Distance along the recorded path at which the cumulative optical depth
    /// reaches `tau`, or `None` if the path is not that optically thick.
    pub fn interaction_point(&self, tau: f64) -> Option<f64> {
        let seg = self.path.iter().find(|seg| seg.tau_far() >= tau)?;
        let entry = seg.s - seg.ds;
        if seg.dtau > 0.0 {
            let fraction = ((tau - seg.tau_near) / seg.dtau).clamp(0.0, 1.0);
            Some(entry + fraction * seg.ds)
        } else {
            Some(entry)
        }
    }
}
