//! Machine profiles and build volumes
//!
//! Placement, validation, and grid layout all need bed facts. They receive an
//! explicit [`MachineProfile`] value instead of reading module-level config so
//! concurrent requests for different machines cannot interfere.

use serde::Serialize;

/// Build volume in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BuildVolume {
    /// Bed width (X) in millimeters
    pub x: f64,
    /// Bed depth (Y) in millimeters
    pub y: f64,
    /// Maximum height (Z) in millimeters
    pub z: f64,
}

/// A machine profile: the bed/volume facts placement logic needs
#[derive(Debug, Clone, PartialEq)]
pub struct MachineProfile {
    /// Profile identifier (e.g. "snapmaker_u1")
    pub name: String,
    /// Build volume in millimeters
    pub build_volume: BuildVolume,
    /// Number of extruders/toolheads
    pub extruder_count: u32,
}

impl MachineProfile {
    /// The Snapmaker U1 profile: 270x270x270mm, 4 toolheads
    pub fn snapmaker_u1() -> Self {
        Self {
            name: "snapmaker_u1".to_string(),
            build_volume: BuildVolume {
                x: 270.0,
                y: 270.0,
                z: 270.0,
            },
            extruder_count: 4,
        }
    }

    /// Bed center in bed-local XY millimeters
    pub fn bed_center_xy(&self) -> (f64, f64) {
        (self.build_volume.x / 2.0, self.build_volume.y / 2.0)
    }
}
