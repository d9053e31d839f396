//! Bounds and viewer-geometry extraction
//!
//! Walks the object/component graph of a parsed container, composing 3x4
//! transforms down the tree, and produces either axis-aligned bounds (for
//! layout and validation) or flattened triangle soup (for the placement
//! viewer). Component recursion follows Production-extension `p:path`
//! references into sub-model parts and is depth-limited.

use std::collections::HashMap;

use tracing::debug;

use crate::aabb::Aabb;
use crate::error::{Error, Result};
use crate::model::{BuildItem, Container, MODEL_PATH, Mesh};
use crate::transform::Transform3x4;

/// Maximum component nesting depth before the walk errors out
pub const MAX_COMPONENT_DEPTH: usize = 12;

/// Detail level for viewer geometry extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelOfDetail {
    /// Placement preview quality
    #[default]
    Low,
    /// Detail preview quality
    High,
    /// Near-full geometry
    Full,
}

impl LevelOfDetail {
    /// Per-object triangle budget for this detail level
    pub fn triangle_budget(&self) -> usize {
        match self {
            LevelOfDetail::Low => 5_000,
            LevelOfDetail::High => 15_000,
            LevelOfDetail::Full => 50_000,
        }
    }

    /// The query form of this detail level, as echoed back in responses
    pub fn as_query(&self) -> &'static str {
        match self {
            LevelOfDetail::Low => "low",
            LevelOfDetail::High => "high",
            LevelOfDetail::Full => "full",
        }
    }

    /// Parse the API query form of a detail level
    ///
    /// Accepts the aliases UI clients send; unknown values fold to `Low`.
    pub fn from_query(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "placement_high" | "detail" => LevelOfDetail::High,
            "full" => LevelOfDetail::Full,
            _ => LevelOfDetail::Low,
        }
    }
}

/// Flattened, possibly decimated mesh for one build item
#[derive(Debug, Clone, Default)]
pub struct MeshExtraction {
    /// Vertices after item rotation/scale (translation zeroed)
    pub vertices: Vec<[f64; 3]>,
    /// Triangle vertex indices
    pub triangles: Vec<[usize; 3]>,
    /// Vertex count before decimation
    pub original_vertex_count: usize,
    /// Triangle count before decimation
    pub original_triangle_count: usize,
    /// Whether stride decimation ran
    pub decimated: bool,
    /// Whether the source exceeded the triangle budget
    pub too_large: bool,
}

impl MeshExtraction {
    /// Whether any renderable geometry was extracted
    pub fn has_mesh(&self) -> bool {
        !self.vertices.is_empty() && !self.triangles.is_empty()
    }
}

/// Local-space bounds of an object, components fully composed
pub fn object_local_bounds(
    container: &Container,
    model_path: &str,
    object_id: usize,
    include_modifiers: bool,
) -> Result<Aabb> {
    let mut aabb = Aabb::empty();
    walk_object(
        container,
        model_path,
        object_id,
        Transform3x4::identity(),
        include_modifiers,
        0,
        &mut |transform, mesh| {
            for v in &mesh.vertices {
                aabb.expand_point(transform.apply_point([v.x, v.y, v.z]));
            }
        },
    )?;
    Ok(aabb)
}

/// Local-space bounds of the object a build item references
pub fn build_item_local_bounds(container: &Container, item: &BuildItem) -> Result<Aabb> {
    object_local_bounds(container, MODEL_PATH, item.objectid, false)
}

/// World bounds of a build item under an explicit placement transform
pub fn build_item_world_bounds(
    container: &Container,
    item: &BuildItem,
    placement: &Transform3x4,
) -> Result<Aabb> {
    let local = build_item_local_bounds(container, item)?;
    if local.is_empty() {
        return Ok(local);
    }
    Ok(placement.apply_aabb(&local))
}

/// Extract viewer geometry for one build item
///
/// The item's rotation and scale are baked into the vertices so the viewer
/// shows correct orientation; translation is zeroed because placement is
/// delivered separately as a UI pose.
pub fn extract_item_geometry(
    container: &Container,
    item: &BuildItem,
    max_triangles: usize,
    include_modifiers: bool,
) -> Result<MeshExtraction> {
    let rotscale = item
        .effective_transform()
        .with_translation(0.0, 0.0, 0.0);

    let mut vertices: Vec<[f64; 3]> = Vec::new();
    let mut triangles: Vec<[usize; 3]> = Vec::new();
    walk_object(
        container,
        MODEL_PATH,
        item.objectid,
        rotscale,
        include_modifiers,
        0,
        &mut |transform, mesh| {
            let base_index = vertices.len();
            let local_count = mesh.vertices.len();
            for v in &mesh.vertices {
                vertices.push(transform.apply_point([v.x, v.y, v.z]));
            }
            for tri in &mesh.triangles {
                // Malformed index references are dropped, not fatal
                if tri.v1 >= local_count || tri.v2 >= local_count || tri.v3 >= local_count {
                    continue;
                }
                triangles.push([
                    base_index + tri.v1,
                    base_index + tri.v2,
                    base_index + tri.v3,
                ]);
            }
        },
    )?;

    let original_vertex_count = vertices.len();
    let original_triangle_count = triangles.len();
    let too_large = max_triangles > 0 && original_triangle_count > max_triangles;

    let mut extraction = MeshExtraction {
        vertices,
        triangles,
        original_vertex_count,
        original_triangle_count,
        decimated: false,
        too_large,
    };

    if too_large {
        decimate(&mut extraction, max_triangles);
        debug!(
            objectid = item.objectid,
            original = original_triangle_count,
            decimated_to = extraction.triangles.len(),
            "decimated item geometry"
        );
    }

    Ok(extraction)
}

/// Recursive object walk, invoking `visit` with the composed transform for
/// every mesh reached
fn walk_object(
    container: &Container,
    model_path: &str,
    object_id: usize,
    transform: Transform3x4,
    include_modifiers: bool,
    depth: usize,
    visit: &mut dyn FnMut(&Transform3x4, &Mesh),
) -> Result<()> {
    if depth > MAX_COMPONENT_DEPTH {
        return Err(Error::InvalidModel(
            "3MF component nesting too deep".to_string(),
        ));
    }

    // Unknown references yield empty geometry, matching the tolerant
    // handling of missing sub-model parts at parse time.
    let Some(object) = container.object(model_path, object_id) else {
        return Ok(());
    };

    if !include_modifiers && !object.part_type.is_printable() {
        return Ok(());
    }

    if let Some(mesh) = object.mesh.as_ref() {
        visit(&transform, mesh);
        return Ok(());
    }

    for component in &object.components {
        let ref_model_path = component
            .path
            .as_deref()
            .map(|p| p.trim_start_matches('/'))
            .unwrap_or(model_path);
        let child_transform = transform.compose(&component.transform.unwrap_or_default());
        walk_object(
            container,
            ref_model_path,
            component.objectid,
            child_transform,
            include_modifiers,
            depth + 1,
            visit,
        )?;
    }

    Ok(())
}

/// Stride-sample triangles down to the budget, remapping vertices
fn decimate(extraction: &mut MeshExtraction, max_triangles: usize) {
    if max_triangles == 0 || extraction.triangles.len() <= max_triangles {
        return;
    }

    let step = extraction.triangles.len().div_ceil(max_triangles).max(1);
    let sampled: Vec<[usize; 3]> = extraction
        .triangles
        .iter()
        .step_by(step)
        .take(max_triangles)
        .copied()
        .collect();

    let mut used: HashMap<usize, usize> = HashMap::new();
    let mut vertices_out: Vec<[f64; 3]> = Vec::new();
    let mut triangles_out: Vec<[usize; 3]> = Vec::with_capacity(sampled.len());
    for tri in sampled {
        let mut remapped = [0usize; 3];
        for (slot, old_idx) in tri.iter().enumerate() {
            let new_idx = *used.entry(*old_idx).or_insert_with(|| {
                vertices_out.push(extraction.vertices[*old_idx]);
                vertices_out.len() - 1
            });
            remapped[slot] = new_idx;
        }
        triangles_out.push(remapped);
    }

    extraction.vertices = vertices_out;
    extraction.triangles = triangles_out;
    extraction.decimated = true;
}
