//! JSON response assembly for layout and geometry requests
//!
//! Field names here are load-bearing: the viewer frontend and its tests
//! address them literally, so renames are breaking changes. The layout
//! response is the cheap first request (bounds, poses, placement frame);
//! geometry is the expensive second request and is fetched per detail
//! level. Geometry extraction failures degrade to `has_mesh: false`
//! instead of failing the whole response.

use std::time::Instant;

use serde::Serialize;
use tracing::warn;

use crate::aabb::Aabb;
use crate::bounds::{LevelOfDetail, extract_item_geometry};
use crate::error::Result;
use crate::machine::{BuildVolume, MachineProfile};
use crate::model::Container;
use crate::placement::{PlacementFrame, UiPose, collect_layout_items, resolve_placement};
use crate::validate::{ValidationReport, validate_plate_bounds};

/// Axis-aligned bounds in response form
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BoundsJson {
    /// Minimum corner
    pub min: [f64; 3],
    /// Maximum corner
    pub max: [f64; 3],
    /// Extent per axis
    pub size: [f64; 3],
}

impl From<&Aabb> for BoundsJson {
    fn from(aabb: &Aabb) -> Self {
        Self {
            min: aabb.min,
            max: aabb.max,
            size: aabb.size(),
        }
    }
}

/// Scene validation in response form
#[derive(Debug, Clone, Serialize)]
pub struct ValidationJson {
    /// Whether the layout fits with no warnings
    pub fits: bool,
    /// All warnings, blocking and informational
    pub warnings: Vec<String>,
    /// Blocking dimension overruns only
    pub build_volume_warnings: Vec<String>,
    /// Combined scene bounds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundsJson>,
}

impl From<&ValidationReport> for ValidationJson {
    fn from(report: &ValidationReport) -> Self {
        Self {
            fits: report.fits,
            warnings: report.warnings.clone(),
            build_volume_warnings: report.build_volume_warnings.clone(),
            bounds: report.bounds.as_ref().map(BoundsJson::from),
        }
    }
}

/// One build item in the layout response
#[derive(Debug, Clone, Serialize)]
pub struct LayoutObject {
    /// 1-based index into the build item list
    pub build_item_index: usize,
    /// Plate id in the packed convention
    pub plate_id: usize,
    /// Referenced object id
    pub object_id: usize,
    /// Display name
    pub name: String,
    /// Whether the item prints
    pub printable: bool,
    /// Placement transform as 16 values, translation row last
    pub transform: [f64; 16],
    /// Placement transform in the native 3x4 form
    pub transform_3x4: [f64; 12],
    /// Translation column
    pub translation: [f64; 3],
    /// Vendor assemble translation, when uniquely known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assemble_translation: Option<[f64; 3]>,
    /// Planar rotation estimate in degrees
    pub rotation_z_deg: f64,
    /// Object-local bounds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_bounds: Option<BoundsJson>,
    /// Bounds under the placement transform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_bounds: Option<BoundsJson>,
    /// Bounds under the vendor assemble transform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assemble_world_bounds: Option<BoundsJson>,
    /// Canonical-frame base pose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_base_pose: Option<UiPose>,
}

/// Layout response: everything the viewer needs except triangle data
#[derive(Debug, Clone, Serialize)]
pub struct LayoutResponse {
    /// Whether the file follows the packed multi-plate convention
    pub is_multi_plate: bool,
    /// Plate the response is restricted to, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_plate_id: Option<usize>,
    /// Target machine build volume
    pub build_volume: BuildVolume,
    /// Scene bounds check
    pub validation: ValidationJson,
    /// Canonical placement frame the poses are expressed in
    pub placement_frame: PlacementFrame,
    /// Build items in document order
    pub objects: Vec<LayoutObject>,
    /// Server-side assembly time in milliseconds
    pub timing_ms: u64,
}

/// Assemble the layout response for a parsed container
pub fn layout_response(
    container: &Container,
    plate_id: Option<usize>,
    profile: &MachineProfile,
) -> Result<LayoutResponse> {
    let started = Instant::now();

    let report = validate_plate_bounds(container, plate_id, profile)?;
    let mut items = collect_layout_items(container, plate_id)?;
    let frame = resolve_placement(
        container,
        &mut items,
        plate_id,
        profile,
        report.bounds.as_ref(),
    );

    let objects = items
        .into_iter()
        .map(|item| LayoutObject {
            build_item_index: item.build_item_index,
            plate_id: item.plate_id,
            object_id: item.object_id,
            name: item.name,
            printable: item.printable,
            transform: item.transform.to_4x4(),
            transform_3x4: item.transform.0,
            translation: item.translation,
            assemble_translation: item.assemble_translation,
            rotation_z_deg: item.rotation_z_deg,
            local_bounds: item.local_bounds.as_ref().map(BoundsJson::from),
            world_bounds: item.world_bounds.as_ref().map(BoundsJson::from),
            assemble_world_bounds: item.assemble_world_bounds.as_ref().map(BoundsJson::from),
            ui_base_pose: item.ui_base_pose,
        })
        .collect();

    Ok(LayoutResponse {
        is_multi_plate: container.is_multi_plate(),
        selected_plate_id: plate_id,
        build_volume: profile.build_volume,
        validation: ValidationJson::from(&report),
        placement_frame: frame,
        objects,
        timing_ms: started.elapsed().as_millis() as u64,
    })
}

/// One build item's triangle data in the geometry response
#[derive(Debug, Clone, Serialize)]
pub struct GeometryObject {
    /// 1-based index into the build item list
    pub build_item_index: usize,
    /// Referenced object id
    pub object_id: usize,
    /// Whether any renderable geometry was extracted
    pub has_mesh: bool,
    /// Whether the source exceeded the per-object triangle budget
    pub mesh_too_large: bool,
    /// Whether stride decimation ran
    pub mesh_decimated: bool,
    /// Delivered vertex count
    pub vertex_count: usize,
    /// Delivered triangle count
    pub triangle_count: usize,
    /// Vertex count before decimation
    pub original_vertex_count: usize,
    /// Triangle count before decimation
    pub original_triangle_count: usize,
    /// Vertices with item rotation/scale baked in, translation zeroed
    pub vertices: Vec<[f64; 3]>,
    /// Triangle vertex indices
    pub triangles: Vec<[usize; 3]>,
}

/// Geometry response for one detail level
#[derive(Debug, Clone, Serialize)]
pub struct GeometryResponse {
    /// Per-item triangle data
    pub objects: Vec<GeometryObject>,
    /// Detail level that produced this response
    pub lod: &'static str,
    /// Per-object triangle budget at that level
    pub max_triangles_per_object: usize,
    /// Whether modifier/support parts were included
    pub include_modifiers: bool,
    /// Server-side extraction time in milliseconds
    pub timing_ms: u64,
}

/// Assemble the geometry response for a parsed container
///
/// Per-item extraction failures are logged and delivered as
/// `has_mesh: false`; the response itself only fails when the plate id is
/// out of range.
pub fn geometry_response(
    container: &Container,
    plate_id: Option<usize>,
    lod: LevelOfDetail,
    include_modifiers: bool,
) -> Result<GeometryResponse> {
    let started = Instant::now();
    let budget = lod.triangle_budget();
    let items = collect_layout_items(container, plate_id)?;

    let mut objects = Vec::with_capacity(items.len());
    for item in &items {
        let build_item = &container.build.items[item.build_item_index - 1];
        let extraction = match extract_item_geometry(container, build_item, budget, include_modifiers)
        {
            Ok(extraction) => extraction,
            Err(err) => {
                warn!(
                    build_item_index = item.build_item_index,
                    error = %err,
                    "geometry extraction failed, delivering item without mesh"
                );
                Default::default()
            }
        };

        objects.push(GeometryObject {
            build_item_index: item.build_item_index,
            object_id: item.object_id,
            has_mesh: extraction.has_mesh(),
            mesh_too_large: extraction.too_large,
            mesh_decimated: extraction.decimated,
            vertex_count: extraction.vertices.len(),
            triangle_count: extraction.triangles.len(),
            original_vertex_count: extraction.original_vertex_count,
            original_triangle_count: extraction.original_triangle_count,
            vertices: extraction.vertices,
            triangles: extraction.triangles,
        });
    }

    Ok(GeometryResponse {
        objects,
        lod: lod.as_query(),
        max_triangles_per_object: budget,
        include_modifiers,
        timing_ms: started.elapsed().as_millis() as u64,
    })
}
