//! External slicer interop: invocation directives and failure triage
//!
//! The crate never launches the slicer binary itself; callers do. What it
//! owns is the policy around that launch: which engine flags an edited file
//! requires, and which known failure signatures justify an automatic retry.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Flags a caller must pass through to the slicer invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SlicerDirectives {
    /// Suppress engine auto-arrange so applied placements survive
    pub disable_arrange: bool,
    /// Suppress engine auto-orient so applied rotations survive
    pub disable_orient: bool,
    /// Force the prime tower on (multi-material copy grids)
    pub enable_prime_tower: bool,
}

impl SlicerDirectives {
    /// Directives for a file whose transforms were explicitly edited
    pub fn for_applied_edits() -> Self {
        Self {
            disable_arrange: true,
            disable_orient: true,
            enable_prime_tower: false,
        }
    }

    /// Merge another set of directives into this one
    pub fn merge(&mut self, other: &SlicerDirectives) {
        self.disable_arrange |= other.disable_arrange;
        self.disable_orient |= other.disable_orient;
        self.enable_prime_tower |= other.enable_prime_tower;
    }
}

/// Whether slicer output matches a known wipe-tower conflict failure
///
/// These failures are worth one automatic retry with the prime tower
/// disabled; anything else is surfaced to the caller unchanged.
pub fn is_wipe_tower_conflict(stdout: &str, stderr: &str) -> bool {
    let combined = format!("{}\n{}", stdout, stderr).to_lowercase();
    if combined.contains("gcode path conflicts found between wipetower") {
        return true;
    }
    if combined.contains("found slicing result conflict") {
        return true;
    }
    // Older builds report the conflict indirectly: the exclude-triangle pass
    // eats the whole plate and slicing ends with nothing.
    combined.contains("calc_exclude_triangles") && combined.contains("nothing to be sliced")
}

/// Triage a failed slicer invocation
///
/// A wipe-tower conflict on a run that had the prime tower forced on earns
/// exactly one retry with the tower disabled. Every other failure, and a
/// conflict on a retry that already ran without the tower, surfaces as
/// [`Error::ExternalSlicer`] carrying the binary's own diagnostic text.
pub fn retry_directives(
    directives: &SlicerDirectives,
    stdout: &str,
    stderr: &str,
) -> Result<SlicerDirectives> {
    if directives.enable_prime_tower && is_wipe_tower_conflict(stdout, stderr) {
        warn!("wipe tower conflict, retrying once with the prime tower disabled");
        let mut retried = *directives;
        retried.enable_prime_tower = false;
        return Ok(retried);
    }
    let detail = if stderr.trim().is_empty() { stdout } else { stderr };
    Err(Error::ExternalSlicer(detail.trim().to_string()))
}

/// Pick the plate id to pass to the slicer
///
/// Engines renumber plates when vendor `plate_N.json` metadata is absent, so
/// a routing hint derived from object lookup is only trusted when that
/// evidence exists for the hinted plate. Otherwise the requested id is
/// preserved.
pub fn resolve_plate_route(
    requested: Option<usize>,
    vendor_hint: Option<usize>,
    plate_json_ids: &std::collections::BTreeSet<u32>,
) -> Option<usize> {
    match (requested, vendor_hint) {
        (Some(req), Some(hint)) if hint != req => {
            if plate_json_ids.contains(&(hint as u32)) {
                info!(requested = req, routed = hint, "rerouting slice to vendor plate");
                Some(hint)
            } else {
                Some(req)
            }
        }
        (Some(req), _) => Some(req),
        (None, hint) => hint,
    }
}
