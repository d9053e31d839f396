//! Grid layout engine for multi-copy requests
//!
//! Duplicates the first printable build item into a non-overlapping grid.
//! The footprint comes from the full assembly bounds (component transforms
//! composed), not a single mesh; cell size is footprint plus spacing. The
//! grid is centered on the bed and written back as additional `<item>` tags
//! patched into the core model part.

use std::collections::HashMap;

use tracing::info;

use crate::bounds::build_item_local_bounds;
use crate::editor::write_archive;
use crate::error::{Error, Result};
use crate::machine::MachineProfile;
use crate::model::{Container, MODEL_PATH};
use crate::patch::{build_item_spans, get_attr, set_attr, splice_spans};
use crate::slicer::SlicerDirectives;
use crate::transform::Transform3x4;

/// A computed copy-grid arrangement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPlan {
    /// Grid columns
    pub cols: usize,
    /// Grid rows
    pub rows: usize,
    /// Whether the grid fits the bed
    pub fits_bed: bool,
    /// Maximum copies that would fit at this footprint and spacing
    pub max_copies: usize,
    /// Object footprint in millimeters
    pub object_dimensions: [f64; 3],
}

/// Result of a copy duplication
#[derive(Debug, Clone)]
pub struct CopyOutcome {
    /// New 3MF archive bytes
    pub archive: Vec<u8>,
    /// The grid that was laid out
    pub plan: GridPlan,
    /// Invocation flags the duplication implies
    pub directives: SlicerDirectives,
}

/// Compute a grid arrangement for `copies` objects of the given footprint
///
/// Cell size is footprint plus spacing; the last cell in each axis drops
/// the trailing spacing, so the span is `cols*(w+s)-s`.
pub fn plan_grid(
    object_dimensions: [f64; 3],
    copies: usize,
    spacing_mm: f64,
    profile: &MachineProfile,
) -> GridPlan {
    let [w, d, _] = object_dimensions;
    let spacing = spacing_mm.max(0.0);
    let bed_x = profile.build_volume.x;
    let bed_y = profile.build_volume.y;

    let per_axis = |size: f64, bed: f64| -> usize {
        if size <= 0.0 {
            return 0;
        }
        (((bed + spacing) / (size + spacing)).floor() as isize).max(0) as usize
    };
    let max_cols = per_axis(w, bed_x);
    let max_rows = per_axis(d, bed_y);
    let max_copies = max_cols * max_rows;

    let copies = copies.max(1);
    let mut cols = (copies as f64).sqrt().ceil() as usize;
    cols = cols.clamp(1, max_cols.max(1));
    let rows = copies.div_ceil(cols);

    GridPlan {
        cols,
        rows,
        fits_bed: max_cols >= 1 && cols <= max_cols && rows <= max_rows,
        max_copies,
        object_dimensions,
    }
}

/// Duplicate the first printable build item into a centered copy grid
///
/// Writes `copies - 1` additional build items and repositions the original
/// so the whole grid is centered on the bed. Errors when the grid cannot
/// fit or the container has no printable item with geometry.
pub fn apply_copies(
    container: &Container,
    copies: usize,
    spacing_mm: f64,
    profile: &MachineProfile,
) -> Result<CopyOutcome> {
    let (source_index, source_item) = container
        .build
        .items
        .iter()
        .enumerate()
        .find(|(_, item)| item.printable)
        .ok_or_else(|| Error::InvalidModel("no printable build item to duplicate".to_string()))?;

    let local = build_item_local_bounds(container, source_item)?;
    if local.is_empty() {
        return Err(Error::InvalidModel(
            "printable build item has no geometry to duplicate".to_string(),
        ));
    }
    let transform = source_item.effective_transform();
    let world = transform.apply_aabb(&local);
    let dims = world.size();

    let plan = plan_grid(dims, copies, spacing_mm, profile);
    if copies > 1 && !plan.fits_bed {
        return Err(Error::Validation(format!(
            "{} copies do not fit build plate. Reduce copies or scale.",
            copies
        )));
    }

    if copies <= 1 {
        return Ok(CopyOutcome {
            archive: write_archive(container, &HashMap::new())?,
            plan,
            directives: SlicerDirectives::default(),
        });
    }

    let model_bytes = container
        .raw_part(MODEL_PATH)
        .ok_or_else(|| Error::MissingFile(MODEL_PATH.to_string()))?;
    let model_xml = std::str::from_utf8(model_bytes)
        .map_err(|_| Error::InvalidFormat("3D model XML is not valid UTF-8".to_string()))?;
    let spans = build_item_spans(model_xml)?;
    let span = *spans
        .get(source_index)
        .ok_or_else(|| Error::InvalidModel("build item list out of sync with model XML".to_string()))?;
    let source_tag = span.text(model_xml);

    let spacing = spacing_mm.max(0.0);
    let [w, d, _] = dims;
    let span_x = plan.cols as f64 * (w + spacing) - spacing;
    let span_y = plan.rows as f64 * (d + spacing) - spacing;
    let (bed_cx, bed_cy) = profile.bed_center_xy();
    let grid_min_x = bed_cx - span_x / 2.0;
    let grid_min_y = bed_cy - span_y / 2.0;

    // Offset from the item's translation to its world-bounds corner stays
    // constant across copies, so each cell's corner fixes its translation.
    let corner_dx = world.min[0] - transform.0[9];
    let corner_dy = world.min[1] - transform.0[10];

    // Patch from the raw tag text: its translation columns are in document
    // units, while all grid math above is millimeters.
    let raw = get_attr(source_tag, "transform")
        .and_then(|v| Transform3x4::parse(&v))
        .unwrap_or_default();
    let unit = if container.unit_scale > 0.0 {
        container.unit_scale
    } else {
        1.0
    };

    let mut tags: Vec<String> = Vec::with_capacity(copies);
    for k in 0..copies {
        let col = k % plan.cols;
        let row = k / plan.cols;
        let tx = grid_min_x + col as f64 * (w + spacing) - corner_dx;
        let ty = grid_min_y + row as f64 * (d + spacing) - corner_dy;
        let placed = raw.with_translation(tx / unit, ty / unit, raw.0[11]);
        tags.push(set_attr(source_tag, "transform", &placed.format()));
    }

    let replacement = tags.join("");
    let patched = splice_spans(model_xml, &[(span, replacement)]);

    let mut replaced_parts = HashMap::new();
    replaced_parts.insert(MODEL_PATH.to_string(), patched.into_bytes());

    let directives = SlicerDirectives {
        disable_arrange: true,
        disable_orient: true,
        // Without the prime tower, multi-material copy grids fail in the
        // engine's conflict checker.
        enable_prime_tower: profile.extruder_count > 1,
    };
    info!(
        copies,
        cols = plan.cols,
        rows = plan.rows,
        "applied copy grid"
    );

    Ok(CopyOutcome {
        archive: write_archive(container, &replaced_parts)?,
        plan,
        directives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_grid_square_layout() {
        let profile = MachineProfile::snapmaker_u1();
        let plan = plan_grid([50.0, 50.0, 20.0], 4, 5.0, &profile);
        assert_eq!((plan.cols, plan.rows), (2, 2));
        assert!(plan.fits_bed);
        // 270mm bed, 55mm cell: floor(275/55) = 5 per axis
        assert_eq!(plan.max_copies, 25);
    }

    #[test]
    fn test_plan_grid_span_within_bed() {
        let profile = MachineProfile::snapmaker_u1();
        let plan = plan_grid([80.0, 80.0, 20.0], 9, 10.0, &profile);
        assert_eq!((plan.cols, plan.rows), (3, 3));
        let span = plan.cols as f64 * 90.0 - 10.0;
        assert!(span <= profile.build_volume.x);
        assert!(plan.fits_bed);
    }

    #[test]
    fn test_plan_grid_overflow_not_fitting() {
        let profile = MachineProfile::snapmaker_u1();
        let plan = plan_grid([200.0, 200.0, 20.0], 4, 5.0, &profile);
        assert!(!plan.fits_bed);
        assert_eq!(plan.max_copies, 1);
    }

    #[test]
    fn test_plan_grid_degenerate_footprint() {
        let profile = MachineProfile::snapmaker_u1();
        let plan = plan_grid([0.0, 0.0, 0.0], 2, 5.0, &profile);
        assert_eq!(plan.max_copies, 0);
        assert!(!plan.fits_bed);
    }
}
