//! # plate3mf
//!
//! 3MF placement, transform editing, and plate extraction for slicer
//! pipelines.
//!
//! A 3MF file is a ZIP container holding XML model data plus optional
//! vendor metadata (packed multi-plate projects, assemble transforms,
//! per-plate descriptors). This crate parses that container once and then
//! answers the questions a placement UI and a slicing pipeline ask of it:
//!
//! - where each object sits, in one canonical bed-local frame with an
//!   explicit trust level ([`placement`])
//! - whether the layout fits the machine, before the slicer is ever
//!   invoked ([`validate`])
//! - what the viewer should draw, bounded per detail level ([`bounds`],
//!   [`api`])
//! - how to move, rotate, scale, or duplicate objects by patching
//!   transform attributes in place, leaving every other byte of the
//!   vendor file untouched ([`editor`], [`grid`], [`scale`])
//!
//! ## Example
//!
//! ```no_run
//! use plate3mf::{Container, MachineProfile};
//! use std::fs::File;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("project.3mf")?;
//! let container = Container::from_reader(file)?;
//! let profile = MachineProfile::snapmaker_u1();
//!
//! let layout = plate3mf::api::layout_response(&container, None, &profile)?;
//! println!("{} objects, fits: {}", layout.objects.len(), layout.validation.fits);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aabb;
pub mod api;
pub mod bounds;
pub mod editor;
pub mod error;
pub mod grid;
pub mod machine;
pub mod model;
pub mod parser;
pub mod patch;
pub mod placement;
pub mod scale;
pub mod slicer;
pub mod transform;
pub mod validate;

pub use aabb::Aabb;
pub use bounds::LevelOfDetail;
pub use editor::{EditOutcome, ObjectTransformEdit, apply_object_transforms};
pub use error::{Error, Result};
pub use grid::{CopyOutcome, GridPlan, apply_copies, plan_grid};
pub use machine::{BuildVolume, MachineProfile};
pub use model::Container;
pub use placement::{PlacementFrame, collect_layout_items, resolve_placement};
pub use scale::{ScaleOutcome, apply_uniform_scale};
pub use slicer::SlicerDirectives;
pub use transform::Transform3x4;
pub use validate::{ValidationReport, enforce_transformed_bounds, validate_plate_bounds};

use std::io::{Read, Seek};

impl Container {
    /// Parse a 3MF container from a reader
    ///
    /// # Example
    ///
    /// ```no_run
    /// use plate3mf::Container;
    /// use std::fs::File;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let file = File::open("project.3mf")?;
    /// let container = Container::from_reader(file)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        parser::parse_container(reader)
    }

    /// Parse a 3MF container from in-memory bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        parser::parse_container_bytes(bytes)
    }
}
