//! Plate bounds validation
//!
//! Two layers of defense before a file reaches the slicer. The scene check
//! compares overall layout dimensions against the build volume. The
//! transformed-bounds check runs after object edits and requires at least
//! one printable object fully inside the print volume, normalizing packed
//! or bed-center coordinates first so legitimate layouts are not rejected
//! for living in a different frame.

use tracing::{info, warn};

use crate::aabb::Aabb;
use crate::error::{Error, Result};
use crate::machine::MachineProfile;
use crate::model::Container;
use crate::placement::{
    LayoutItem, collect_layout_items, detect_origin_offset_xy,
};

/// Inside-volume tolerance in millimeters
const INSIDE_TOL: f64 = 1e-6;

/// Result of a scene bounds check
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Whether the layout fits the build volume with no warnings
    pub fits: bool,
    /// Blocking dimension overruns
    pub build_volume_warnings: Vec<String>,
    /// All warnings, blocking and informational
    pub warnings: Vec<String>,
    /// Combined scene bounds, when any geometry resolved
    pub bounds: Option<Aabb>,
}

/// Validate overall scene bounds against the build volume
///
/// `plate_id` restricts the check to one plate's build item; `None` checks
/// the whole scene.
pub fn validate_plate_bounds(
    container: &Container,
    plate_id: Option<usize>,
    profile: &MachineProfile,
) -> Result<ValidationReport> {
    let items = collect_layout_items(container, plate_id)?;

    let mut scene = Aabb::empty();
    for item in &items {
        if let Some(wb) = item.world_bounds.as_ref() {
            scene.expand(wb);
        }
    }

    if scene.is_empty() {
        return Ok(ValidationReport {
            fits: true,
            ..Default::default()
        });
    }

    let [width, depth, height] = scene.size();
    let vol = &profile.build_volume;
    let mut build_volume_warnings = Vec::new();
    if width > vol.x {
        build_volume_warnings.push(format!(
            "Width exceeds build volume: {:.1}mm > {:.1}mm (X-axis)",
            width, vol.x
        ));
    }
    if depth > vol.y {
        build_volume_warnings.push(format!(
            "Depth exceeds build volume: {:.1}mm > {:.1}mm (Y-axis)",
            depth, vol.y
        ));
    }
    if height > vol.z {
        build_volume_warnings.push(format!(
            "Height exceeds build volume: {:.1}mm > {:.1}mm (Z-axis)",
            height, vol.z
        ));
    }

    let mut warnings = build_volume_warnings.clone();
    if scene.min[2] < -0.001 {
        warnings.push(format!(
            "Warning: Objects extend below bed (Z_min = {:.1}mm). This may cause printing issues.",
            scene.min[2]
        ));
    }

    Ok(ValidationReport {
        fits: warnings.is_empty(),
        build_volume_warnings,
        warnings,
        bounds: Some(scene),
    })
}

/// Reject an edited layout that leaves no printable object on the bed
///
/// Runs after transform edits, before slicer invocation. `baseline` is the
/// pre-edit container; its placement anchors the coordinate normalization
/// so the check measures the edit's effect, not the source file's frame.
pub fn enforce_transformed_bounds(
    edited: &Container,
    baseline: Option<&Container>,
    plate_id: Option<usize>,
    profile: &MachineProfile,
) -> Result<()> {
    let validation = validate_plate_bounds(edited, plate_id, profile)?;
    if !validation.build_volume_warnings.is_empty() {
        let detail = validation.build_volume_warnings.join("; ");
        return Err(Error::Validation(match plate_id {
            Some(pid) => format!(
                "Object transforms place plate {} outside build volume: {}",
                pid, detail
            ),
            None => format!("Object transforms place model outside build volume: {}", detail),
        }));
    }
    if !validation.warnings.is_empty() {
        info!(warnings = ?validation.warnings, "post-transform layout warnings");
    }

    let items = match collect_layout_items(edited, plate_id) {
        Ok(items) => items,
        Err(err) => {
            warn!(error = %err, "skipping transformed item-inside-volume validation");
            return Ok(());
        }
    };
    let items_with_bounds: Vec<&LayoutItem> = items
        .iter()
        .filter(|it| it.printable && it.world_bounds.is_some())
        .collect();
    if items_with_bounds.is_empty() {
        return Ok(());
    }

    let vendor = edited.vendor.as_ref();
    let assemble_by_index = vendor
        .map(|v| v.assemble_transforms_by_index())
        .unwrap_or_default();
    let assemble_by_object = vendor
        .map(|v| v.assemble_transforms_by_object_id())
        .unwrap_or_default();
    let assemble_oids_by_index = vendor
        .map(|v| v.assemble_object_ids_by_index())
        .unwrap_or_default();

    // Positional assemble metadata can disagree with build items after
    // upstream re-exports. Without an object-keyed assemble transform there
    // is no trustworthy pose to check against, so the strict precheck is
    // skipped rather than risking a false rejection.
    if let Some(pid) = plate_id {
        let selected_oid = items_with_bounds
            .iter()
            .find(|it| it.build_item_index == pid)
            .map(|it| it.object_id.to_string());
        if let (Some(sel), Some(indexed)) = (selected_oid.as_deref(), assemble_oids_by_index.get(&pid))
        {
            if sel != indexed && !assemble_by_object.contains_key(sel) {
                warn!(
                    plate_id = pid,
                    assemble_object_id = %indexed,
                    build_object_id = %sel,
                    "skipping strict transformed precheck: assemble metadata mismatch"
                );
                return Ok(());
            }
        }
    }

    let vol = &profile.build_volume;
    let offset = normalization_offset(edited, baseline, plate_id, &items_with_bounds, profile);
    if let (Some((ox, oy)), Some(pid)) = (offset, plate_id) {
        info!(
            plate_id = pid,
            offset_x = ox,
            offset_y = oy,
            "using normalization offset for transformed precheck"
        );
    }

    let inside = |aabb: &Aabb| -> bool {
        aabb.min[0] >= -INSIDE_TOL
            && aabb.min[1] >= -INSIDE_TOL
            && aabb.min[2] >= -INSIDE_TOL
            && aabb.max[0] <= vol.x + INSIDE_TOL
            && aabb.max[1] <= vol.y + INSIDE_TOL
            && aabb.max[2] <= vol.z + INSIDE_TOL
    };

    let fully_inside = |it: &LayoutItem| -> bool {
        let mut wb = it.world_bounds.unwrap_or_else(Aabb::empty);

        // Prefer the assemble pose when it carries packed coordinates; a
        // normal-range assemble transform often has a stale Z and must not
        // override the core world bounds.
        let assemble = assemble_by_object
            .get(&it.object_id.to_string())
            .or_else(|| assemble_by_index.get(&it.build_item_index));
        if let (Some(t3), Some(local)) = (assemble, it.local_bounds.as_ref()) {
            let [tx, ty, _] = t3.translation_array();
            let normal_range = tx.abs() <= vol.x + 10.0 && ty.abs() <= vol.y + 10.0;
            if !normal_range {
                wb = t3.apply_aabb(local);
            }
        }

        if inside(&wb) {
            return true;
        }
        if let Some((ox, oy)) = offset {
            return inside(&wb.offset_xy(ox, oy));
        }
        false
    };

    if items_with_bounds.iter().any(|it| fully_inside(it)) {
        return Ok(());
    }

    let first = items_with_bounds[0];
    let detail = first
        .world_bounds
        .map(|wb| format!(" first printable item bounds={:?}..{:?}", wb.min, wb.max))
        .unwrap_or_default();
    Err(Error::Validation(match plate_id {
        Some(pid) => format!(
            "Object transforms place plate {} so no printable object is fully inside the print volume.{}",
            pid, detail
        ),
        None => format!(
            "Object transforms place model so no printable object is fully inside the print volume.{}",
            detail
        ),
    }))
}

/// Normalization offset for the inside-volume check, first source wins:
/// baseline plate translation, baseline assemble-bounds centering, baseline
/// core-bounds centering, then origin-convention detection.
fn normalization_offset(
    edited: &Container,
    baseline: Option<&Container>,
    plate_id: Option<usize>,
    items_with_bounds: &[&LayoutItem],
    profile: &MachineProfile,
) -> Option<(f64, f64)> {
    let (bed_cx, bed_cy) = profile.bed_center_xy();
    let anchor = baseline.unwrap_or(edited);

    if let Some(pid) = plate_id {
        let plate_translations = anchor.plate_translations();
        if let Some(pt) = plate_translations.get(&pid) {
            return Some((bed_cx - pt[0], bed_cy - pt[1]));
        }
    }

    if let (Some(_), Some(base)) = (plate_id, baseline) {
        if let Some(vendor) = base.vendor.as_ref() {
            let by_object = vendor.assemble_transforms_by_object_id();
            let by_index = vendor.assemble_transforms_by_index();
            if !by_index.is_empty() {
                let mut union = Aabb::empty();
                for it in items_with_bounds {
                    let t0 = by_object
                        .get(&it.object_id.to_string())
                        .or_else(|| by_index.get(&it.build_item_index));
                    if let (Some(t0), Some(local)) = (t0, it.local_bounds.as_ref()) {
                        union.expand(&t0.apply_aabb(local));
                    }
                }
                if !union.is_empty() {
                    let (cx, cy) = union.center_xy();
                    return Some((bed_cx - cx, bed_cy - cy));
                }
            }
        }
    }

    if let (Some(pid), Some(base)) = (plate_id, baseline) {
        let baseline_items = collect_layout_items(base, Some(pid)).unwrap_or_default();
        let mut union = Aabb::empty();
        for it in baseline_items
            .iter()
            .filter(|it| it.printable && it.world_bounds.is_some())
        {
            union.expand(it.world_bounds.as_ref().unwrap_or(&Aabb::empty()));
        }
        if !union.is_empty() {
            let (cx, cy) = union.center_xy();
            return Some((bed_cx - cx, bed_cy - cy));
        }
    }

    let owned: Vec<LayoutItem> = items_with_bounds.iter().map(|it| (*it).clone()).collect();
    let (ox, oy) = detect_origin_offset_xy(&owned, profile.build_volume.x, profile.build_volume.y);
    if ox.abs() > 1e-6 || oy.abs() > 1e-6 {
        return Some((ox, oy));
    }
    None
}
