//! Placement frame resolution
//!
//! The viewer works in one canonical frame: bed-local XY millimeters with
//! the origin at the bed's lower-left corner. Source files arrive in
//! several conventions (bed-center origin, bed-corner origin, Bambu packed
//! multi-plate project space), so layout responses carry an explicit
//! placement frame describing which mapping produced the per-item UI poses
//! and how trustworthy it is. Transform editing is only offered at `exact`
//! confidence.
//!
//! Adapters are tried in a fixed order, most deterministic first:
//!
//! 1. direct (single-plate files)
//! 2. plate translation offset (packed multi-plate, per-plate baseline)
//! 3. packed grid fold (inferred plate-grid spacing, approximate)
//! 4. centered preview offset (last-resort centering, approximate)

use serde::Serialize;
use tracing::debug;

use crate::aabb::Aabb;
use crate::bounds::build_item_local_bounds;
use crate::error::{Error, Result};
use crate::machine::MachineProfile;
use crate::model::{Container, PROJECT_SETTINGS_PATH};
use crate::transform::Transform3x4;

/// Placement frame schema version
pub const PLACEMENT_FRAME_VERSION: u32 = 2;

/// Canonical viewer frame identifier
pub const CANONICAL_FRAME: &str = "bed_local_xy_mm";

/// Which adapter produced the UI poses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mapping {
    /// Bed-local coordinates used as-is (plus origin normalization)
    Direct,
    /// Packed coordinates shifted by the plate's own packed translation
    BambuPlateTranslationOffset,
    /// Packed coordinates folded by inferred plate-grid spacing
    BambuPackedGridFold,
    /// Scene centered on the bed as a last resort
    CenteredPreviewOffset,
}

/// How trustworthy the mapping is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Poses are authoritative; edits may be offered
    Exact,
    /// Poses are heuristic; edits must stay disabled
    Approximate,
}

/// Detected source-file origin convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginMode {
    /// (0,0) at bed center (OrcaSlicer, BambuStudio, PrusaSlicer)
    BedCenter,
    /// (0,0) at the lower-left bed corner (Cura, some exporters)
    BedCorner,
}

/// What the frontend may let the user do under this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Object move/rotate editing
    pub object_transform_edit: bool,
    /// Prime tower position editing
    pub prime_tower_edit: bool,
}

/// Canonical placement frame metadata for one layout response
#[derive(Debug, Clone, Serialize)]
pub struct PlacementFrame {
    /// Schema version
    pub version: u32,
    /// Canonical frame identifier (always [`CANONICAL_FRAME`])
    pub canonical: &'static str,
    /// Adapter that produced the poses
    pub mapping: Mapping,
    /// Trustworthiness of the poses
    pub confidence: Confidence,
    /// Residual XY offset already applied to every pose
    pub offset_xy: [f64; 2],
    /// Allowed UI interactions
    pub capabilities: Capabilities,
    /// Human-readable caveats
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Detected origin convention (direct mapping only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_detected: Option<OriginMode>,
    /// Packed translation of the selected plate, when a single plate is mapped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate_translation_mm: Option<[f64; 3]>,
    /// Inferred packed grid spacing on X (grid-fold mapping only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packed_grid_step_x_mm: Option<f64>,
    /// Inferred packed grid spacing on Y (grid-fold mapping only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packed_grid_step_y_mm: Option<f64>,
}

impl PlacementFrame {
    fn base(is_multi_plate: bool) -> Self {
        Self {
            version: PLACEMENT_FRAME_VERSION,
            canonical: CANONICAL_FRAME,
            mapping: Mapping::Direct,
            confidence: if is_multi_plate {
                Confidence::Approximate
            } else {
                Confidence::Exact
            },
            offset_xy: [0.0, 0.0],
            capabilities: Capabilities {
                object_transform_edit: !is_multi_plate,
                prime_tower_edit: true,
            },
            notes: Vec::new(),
            origin_detected: None,
            plate_translation_mm: None,
            packed_grid_step_x_mm: None,
            packed_grid_step_y_mm: None,
        }
    }
}

/// Base UI pose of one item in the canonical frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UiPose {
    /// Bed-local X in millimeters
    pub x: f64,
    /// Bed-local Y in millimeters
    pub y: f64,
    /// Z in millimeters
    pub z: f64,
    /// Planar rotation already reflected in the pose
    pub rotate_z_deg: f64,
}

/// One editable top-level build item with its derived layout facts
#[derive(Debug, Clone)]
pub struct LayoutItem {
    /// 1-based index into the build item list
    pub build_item_index: usize,
    /// Plate id (equal to the build-item index in the packed convention)
    pub plate_id: usize,
    /// Referenced object id
    pub object_id: usize,
    /// Display name
    pub name: String,
    /// Whether the item prints
    pub printable: bool,
    /// Core build-item placement transform
    pub transform: Transform3x4,
    /// Translation column of the core transform
    pub translation: [f64; 3],
    /// Translation of the vendor assemble transform, when uniquely known
    pub assemble_translation: Option<[f64; 3]>,
    /// Planar rotation estimate from the core transform
    pub rotation_z_deg: f64,
    /// Object-local bounds, when geometry resolved
    pub local_bounds: Option<Aabb>,
    /// Bounds under the core transform
    pub world_bounds: Option<Aabb>,
    /// Bounds under the vendor assemble transform
    pub assemble_world_bounds: Option<Aabb>,
    /// Canonical-frame pose, filled by [`resolve_placement`]
    pub ui_base_pose: Option<UiPose>,
}

/// Collect editable top-level build items, optionally filtered to one plate
///
/// `plate_id` is 1-based; out-of-range ids error with the item count so the
/// caller can report what the file actually contains.
pub fn collect_layout_items(
    container: &Container,
    plate_id: Option<usize>,
) -> Result<Vec<LayoutItem>> {
    let item_count = container.build.items.len();
    if let Some(pid) = plate_id {
        if pid < 1 || pid > item_count {
            return Err(Error::InvalidModel(format!(
                "Plate {} not found (file has {} items)",
                pid, item_count
            )));
        }
    }

    let assemble_by_object = container
        .vendor
        .as_ref()
        .map(|v| v.assemble_transforms_by_object_id())
        .unwrap_or_default();

    let indices: Vec<usize> = match plate_id {
        Some(pid) => vec![pid],
        None => (1..=item_count).collect(),
    };

    let mut results = Vec::with_capacity(indices.len());
    for idx in indices {
        let item = &container.build.items[idx - 1];
        let transform = item.effective_transform();
        let translation = transform.translation_array();

        let local = build_item_local_bounds(container, item)?;
        let (local_bounds, world_bounds) = if local.is_empty() {
            (None, None)
        } else {
            (Some(local), Some(transform.apply_aabb(&local)))
        };

        let assemble = assemble_by_object.get(&item.objectid.to_string()).copied();
        let assemble_translation = assemble.map(|t| t.translation_array());
        let assemble_world_bounds = match (assemble, local_bounds.as_ref()) {
            (Some(at), Some(lb)) => Some(at.apply_aabb(lb)),
            _ => None,
        };

        let name = container
            .main_object(item.objectid)
            .and_then(|o| o.name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Object {}", item.objectid));

        results.push(LayoutItem {
            build_item_index: idx,
            plate_id: idx,
            object_id: item.objectid,
            name,
            printable: item.printable,
            transform,
            translation,
            assemble_translation,
            rotation_z_deg: transform.rotation_z_estimate_deg(),
            local_bounds,
            world_bounds,
            assemble_world_bounds,
            ui_base_pose: None,
        });
    }

    Ok(results)
}

/// Resolve the placement frame and fill every item's canonical-frame pose
pub fn resolve_placement(
    container: &Container,
    items: &mut [LayoutItem],
    plate_id: Option<usize>,
    profile: &MachineProfile,
    validation_bounds: Option<&Aabb>,
) -> PlacementFrame {
    let is_multi_plate = container.is_multi_plate();
    let mut frame = PlacementFrame::base(is_multi_plate);
    if items.is_empty() {
        return frame;
    }

    let bed_x = profile.build_volume.x;
    let bed_y = profile.build_volume.y;

    if !is_multi_plate {
        apply_direct_mapping(&mut frame, items, container, bed_x, bed_y);
        return frame;
    }

    let plate_translations = container.plate_translations();
    if !plate_translations.is_empty() {
        let allow_object_edit = plate_id.is_some() && items.len() == 1;
        if apply_plate_translation_offset_mapping(
            &mut frame,
            items,
            &plate_translations,
            bed_x,
            bed_y,
            allow_object_edit,
        ) {
            return frame;
        }
    }

    let (step_x, step_y) = infer_packed_grid_steps(container, bed_x, bed_y);
    if let (Some(sx), Some(sy)) = (step_x, step_y) {
        if sx > 0.0 && sy > 0.0 {
            apply_packed_grid_fold_mapping(&mut frame, items, sx, sy, bed_x, bed_y);
            return frame;
        }
    }

    apply_centered_preview_offset_mapping(
        &mut frame,
        items,
        is_multi_plate,
        bed_x,
        bed_y,
        validation_bounds,
    );
    frame
}

/// Preview base pose source for a layout item before frame normalization
///
/// Multi-plate files prefer the assemble XY when known; Z always comes from
/// the core transform because Bambu assemble Z can be project-space.
fn item_base_xyz(item: &LayoutItem, is_multi_plate: bool) -> (f64, f64, f64) {
    let core = item.translation;
    if is_multi_plate {
        if let Some(asm) = item.assemble_translation {
            return (asm[0], asm[1], core[2]);
        }
    }
    (core[0], core[1], core[2])
}

fn apply_direct_mapping(
    frame: &mut PlacementFrame,
    items: &mut [LayoutItem],
    container: &Container,
    bed_x: f64,
    bed_y: f64,
) {
    let (mut offset_x, mut offset_y) = bed_recenter_offset(container, bed_x, bed_y);
    if offset_x.abs() < 0.01 && offset_y.abs() < 0.01 {
        // No printable_area info or same bed, fall back to bounds detection
        (offset_x, offset_y) = detect_origin_offset_xy(items, bed_x, bed_y);
    }
    frame.mapping = Mapping::Direct;
    frame.confidence = Confidence::Exact;
    frame.offset_xy = [0.0, 0.0];
    frame.origin_detected = Some(if offset_x.abs() > 1.0 {
        OriginMode::BedCenter
    } else {
        OriginMode::BedCorner
    });
    frame.capabilities = Capabilities {
        object_transform_edit: true,
        prime_tower_edit: true,
    };
    for item in items {
        let (x, y, z) = item_base_xyz(item, false);
        item.ui_base_pose = Some(UiPose {
            x: x + offset_x,
            y: y + offset_y,
            z,
            rotate_z_deg: 0.0,
        });
    }
    debug!(offset_x, offset_y, "direct placement mapping");
}

/// Packed multi-plate mapping via per-plate baseline translation
///
/// `ui_xy = core_xy - packed_plate_xy + bed_center_xy`. Exact only when a
/// single selected plate is being mapped; returns false (leaving the frame
/// untouched) when any item lacks a plate translation.
fn apply_plate_translation_offset_mapping(
    frame: &mut PlacementFrame,
    items: &mut [LayoutItem],
    plate_translations: &std::collections::HashMap<usize, [f64; 3]>,
    bed_x: f64,
    bed_y: f64,
    allow_object_edit: bool,
) -> bool {
    for item in items.iter() {
        if !plate_translations.contains_key(&item.build_item_index) {
            return false;
        }
    }

    let bed_cx = bed_x / 2.0;
    let bed_cy = bed_y / 2.0;

    frame.mapping = Mapping::BambuPlateTranslationOffset;
    frame.confidence = if allow_object_edit {
        Confidence::Exact
    } else {
        Confidence::Approximate
    };
    frame.offset_xy = [0.0, 0.0];
    frame.capabilities = Capabilities {
        object_transform_edit: allow_object_edit,
        prime_tower_edit: true,
    };
    frame.notes = vec![if allow_object_edit {
        "Packed multi-plate layout mapped via plate translation offset (exact for selected-plate object editing path).".to_string()
    } else {
        "Packed multi-plate layout normalized via plate translation offset; object move/rotate remains disabled until exact selected-plate mapping is available.".to_string()
    }];
    if items.len() == 1 {
        if let Some(pt) = plate_translations.get(&items[0].build_item_index) {
            frame.plate_translation_mm = Some([round6(pt[0]), round6(pt[1]), round6(pt[2])]);
        }
    }

    for item in items {
        let pt = plate_translations[&item.build_item_index];
        // Core build-item translation, NOT assemble_translation: plate
        // translations are derived from build items, and assemble
        // coordinates live in a different space.
        let [x, y, z] = item.translation;
        item.ui_base_pose = Some(UiPose {
            x: (x - pt[0]) + bed_cx,
            y: (y - pt[1]) + bed_cy,
            z,
            rotate_z_deg: 0.0,
        });
    }
    true
}

fn apply_packed_grid_fold_mapping(
    frame: &mut PlacementFrame,
    items: &mut [LayoutItem],
    step_x: f64,
    step_y: f64,
    bed_x: f64,
    bed_y: f64,
) {
    frame.mapping = Mapping::BambuPackedGridFold;
    frame.confidence = Confidence::Approximate;
    frame.packed_grid_step_x_mm = Some(round6(step_x));
    frame.packed_grid_step_y_mm = Some(round6(step_y));
    frame.capabilities = Capabilities {
        object_transform_edit: false,
        prime_tower_edit: true,
    };
    frame.notes = vec![
        "Packed multi-plate layout normalized with inferred grid folding; object move/rotate disabled until exact mapping is available.".to_string(),
    ];
    for item in items {
        let (x, y, z) = item_base_xyz(item, true);
        item.ui_base_pose = Some(UiPose {
            x: fold_packed_coord(x, step_x, bed_x),
            y: fold_packed_coord(y, step_y, bed_y),
            z,
            rotate_z_deg: 0.0,
        });
    }
}

fn apply_centered_preview_offset_mapping(
    frame: &mut PlacementFrame,
    items: &mut [LayoutItem],
    is_multi_plate: bool,
    bed_x: f64,
    bed_y: f64,
    validation_bounds: Option<&Aabb>,
) {
    // Center source priority: assemble bounds union, then validation
    // bounds, then the mean of item base positions.
    let mut center: Option<(f64, f64)> = None;
    let mut assemble_union = Aabb::empty();
    for item in items.iter() {
        if let Some(b) = item.assemble_world_bounds.as_ref() {
            assemble_union.expand(b);
        }
    }
    if !assemble_union.is_empty() {
        center = Some(assemble_union.center_xy());
    } else if let Some(vb) = validation_bounds {
        if !vb.is_empty() {
            center = Some(vb.center_xy());
        }
    }
    let (center_x, center_y) = center.unwrap_or_else(|| {
        let n = items.len().max(1) as f64;
        let (sum_x, sum_y) = items.iter().fold((0.0, 0.0), |(sx, sy), item| {
            let (x, y, _) = item_base_xyz(item, is_multi_plate);
            (sx + x, sy + y)
        });
        (sum_x / n, sum_y / n)
    });

    let off_x = bed_x / 2.0 - center_x;
    let off_y = bed_y / 2.0 - center_y;
    frame.mapping = Mapping::CenteredPreviewOffset;
    frame.confidence = if is_multi_plate {
        Confidence::Approximate
    } else {
        Confidence::Exact
    };
    frame.offset_xy = [off_x, off_y];
    frame.capabilities = Capabilities {
        object_transform_edit: !is_multi_plate,
        prime_tower_edit: true,
    };
    if is_multi_plate {
        frame.notes = vec![
            "Multi-plate preview uses centered normalization; object move/rotate disabled until exact plate-local mapping is available.".to_string(),
        ];
    }

    for item in items {
        let (x, y, z) = item_base_xyz(item, is_multi_plate);
        item.ui_base_pose = Some(UiPose {
            x: x + off_x,
            y: y + off_y,
            z,
            rotate_z_deg: 0.0,
        });
    }
}

/// Fold a packed plate-grid coordinate back into an approximate bed range
pub fn fold_packed_coord(value: f64, step: f64, bed_size: f64) -> f64 {
    let bed = bed_size.max(1.0);
    if !(step > 0.0) {
        return value;
    }
    let mut v = value;
    for _ in 0..8 {
        if v >= 0.0 {
            break;
        }
        v += step;
    }
    for _ in 0..8 {
        if v <= bed {
            break;
        }
        v -= step;
    }
    v
}

/// Infer packed plate-grid spacing from plate translations
///
/// Packed Bambu exports space plates roughly one bed apart (about 307mm on
/// a 256mm bed); only neighbor gaps above 0.9x the bed dimension count as
/// grid steps.
pub fn infer_packed_grid_steps(
    container: &Container,
    bed_x: f64,
    bed_y: f64,
) -> (Option<f64>, Option<f64>) {
    let plates = container.plates();
    if plates.len() < 2 {
        return (None, None);
    }

    let mut xs: Vec<f64> = plates.iter().map(|p| p.translation()[0]).collect();
    let mut ys: Vec<f64> = plates.iter().map(|p| p.translation()[1]).collect();
    xs.sort_by(|a, b| a.total_cmp(b));
    xs.dedup();
    ys.sort_by(|a, b| a.total_cmp(b));
    ys.dedup();

    let axis_step = |vals: &[f64], bed_dim: f64| -> Option<f64> {
        let threshold = bed_dim * 0.9;
        vals.windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .filter(|d| *d > threshold)
            .min_by(|a, b| a.total_cmp(b))
    };

    (axis_step(&xs, bed_x), axis_step(&ys, bed_y))
}

/// Detect bed-center vs bed-corner origin from item world bounds
///
/// Returns the XY offset to add to source coordinates to land in the
/// canonical frame. When both interpretations fit on the bed, no offset is
/// preferred: applying a bed-center offset as a second chance would weaken
/// off-bed rejection later.
pub fn detect_origin_offset_xy(items: &[LayoutItem], bed_x: f64, bed_y: f64) -> (f64, f64) {
    let bed_cx = bed_x / 2.0;
    let bed_cy = bed_y / 2.0;

    let mut union = Aabb::empty();
    for item in items {
        if let Some(wb) = item.world_bounds.as_ref() {
            union.expand(wb);
        }
    }
    if union.is_empty() {
        return (bed_cx, bed_cy);
    }

    // 2mm tolerance for rounding and slight overhangs
    let margin = 2.0;
    let shifted_fits = union.min[0] + bed_cx >= -margin
        && union.max[0] + bed_cx <= bed_x + margin
        && union.min[1] + bed_cy >= -margin
        && union.max[1] + bed_cy <= bed_y + margin;
    let raw_fits = union.min[0] >= -margin
        && union.max[0] <= bed_x + margin
        && union.min[1] >= -margin
        && union.max[1] <= bed_y + margin;

    match (raw_fits, shifted_fits) {
        (true, _) => (0.0, 0.0),
        (false, true) => (bed_cx, bed_cy),
        (false, false) => (bed_cx, bed_cy),
    }
}

/// Offset from the source file's bed center to the target bed center
///
/// Reads `printable_area` from the vendor project settings ("WxH" corner
/// strings); zero when absent, unparseable, or under half a millimeter.
pub fn bed_recenter_offset(container: &Container, bed_x: f64, bed_y: f64) -> (f64, f64) {
    let Some(bytes) = container.raw_part(PROJECT_SETTINGS_PATH) else {
        return (0.0, 0.0);
    };
    let Ok(config) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return (0.0, 0.0);
    };
    let Some(points) = config.get("printable_area").and_then(|v| v.as_array()) else {
        return (0.0, 0.0);
    };
    if points.len() < 3 {
        return (0.0, 0.0);
    }

    let mut xs: Vec<f64> = Vec::new();
    let mut ys: Vec<f64> = Vec::new();
    for point in points {
        let Some(s) = point.as_str() else { continue };
        let mut parts = s.split('x');
        if let (Some(xs_str), Some(ys_str), None) = (parts.next(), parts.next(), parts.next()) {
            if let (Ok(x), Ok(y)) = (xs_str.trim().parse::<f64>(), ys_str.trim().parse::<f64>()) {
                xs.push(x);
                ys.push(y);
            }
        }
    }
    if xs.is_empty() {
        return (0.0, 0.0);
    }

    let src_cx = (xs.iter().cloned().fold(f64::INFINITY, f64::min)
        + xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
        / 2.0;
    let src_cy = (ys.iter().cloned().fold(f64::INFINITY, f64::min)
        + ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
        / 2.0;
    let dx = bed_x / 2.0 - src_cx;
    let dy = bed_y / 2.0 - src_cy;
    if dx.abs() < 0.5 && dy.abs() < 0.5 {
        return (0.0, 0.0);
    }
    (dx, dy)
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}
