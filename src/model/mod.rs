//! Parsed 3MF container graph
//!
//! The [`Container`] keeps two views of the same archive: a semantic object
//! graph (objects, meshes, components, build items, vendor plate metadata)
//! used for layout and bounds math, and the raw bytes of every part in
//! original order. Edits never reserialize the graph; they patch attribute
//! spans inside the raw bytes (see [`crate::patch`]) because full
//! reserialization of vendor-specific XML has been observed to produce files
//! some slicer binaries reject with a misleading "empty file" diagnostic.

use std::collections::{BTreeSet, HashMap};

use crate::transform::Transform3x4;

/// Path of the required core model part inside the archive
pub const MODEL_PATH: &str = "3D/3dmodel.model";

/// Path of the vendor assemble/plate metadata part (Bambu/Orca style)
pub const MODEL_SETTINGS_PATH: &str = "Metadata/model_settings.config";

/// Path of the vendor project settings part (printable_area source)
pub const PROJECT_SETTINGS_PATH: &str = "Metadata/project_settings.config";

/// A 3D vertex with x, y, z coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Vertex {
    /// Create a new vertex
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A triangle defined by three vertex indices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// Index of first vertex
    pub v1: usize,
    /// Index of second vertex
    pub v2: usize,
    /// Index of third vertex
    pub v3: usize,
}

impl Triangle {
    /// Create a new triangle
    pub fn new(v1: usize, v2: usize, v3: usize) -> Self {
        Self { v1, v2, v3 }
    }
}

/// A triangle mesh
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// List of vertices
    pub vertices: Vec<Vertex>,
    /// List of triangles
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new mesh with pre-allocated capacity
    pub fn with_capacity(vertices: usize, triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            triangles: Vec::with_capacity(triangles),
        }
    }
}

/// Object part type per the 3MF core spec `type` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartType {
    /// A printable model part
    #[default]
    Model,
    /// Support geometry
    Support,
    /// Solid support geometry
    SolidSupport,
    /// Surface/texture helper
    Surface,
    /// Non-printable auxiliary part (modifiers, paint helpers)
    Other,
}

impl PartType {
    /// Whether this part prints (modifier/helper parts do not)
    pub fn is_printable(&self) -> bool {
        matches!(self, PartType::Model)
    }

    /// Parse the 3MF `type` attribute value, defaulting to `model`
    pub fn from_attr(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "support" => PartType::Support,
            "solidsupport" => PartType::SolidSupport,
            "surface" => PartType::Surface,
            "other" => PartType::Other,
            _ => PartType::Model,
        }
    }
}

/// A component reference inside an object (assembly member)
#[derive(Debug, Clone)]
pub struct Component {
    /// ID of the referenced object
    pub objectid: usize,
    /// Optional 3x4 transform positioning this member within the assembly
    pub transform: Option<Transform3x4>,
    /// Optional external model part path (Production extension `p:path`)
    pub path: Option<String>,
}

impl Component {
    /// Create a new component reference
    pub fn new(objectid: usize) -> Self {
        Self {
            objectid,
            transform: None,
            path: None,
        }
    }
}

/// An object resource: either an inline mesh or a component assembly
#[derive(Debug, Clone)]
pub struct Object {
    /// Resource ID (unique within its model part)
    pub id: usize,
    /// Optional display name
    pub name: Option<String>,
    /// Part type (printable vs. modifier/support)
    pub part_type: PartType,
    /// Inline mesh, if this is a mesh object
    pub mesh: Option<Mesh>,
    /// Component references, if this is an assembly object
    pub components: Vec<Component>,
}

impl Object {
    /// Create a new object resource
    pub fn new(id: usize) -> Self {
        Self {
            id,
            name: None,
            part_type: PartType::Model,
            mesh: None,
            components: Vec::new(),
        }
    }
}

/// An item in the build list: one placeable object instance
#[derive(Debug, Clone)]
pub struct BuildItem {
    /// Reference to object ID
    pub objectid: usize,
    /// Optional 3x4 placement transform (identity when absent)
    pub transform: Option<Transform3x4>,
    /// Whether this item prints (`printable="0"` marks parked plates)
    pub printable: bool,
}

impl BuildItem {
    /// Create a new build item
    pub fn new(objectid: usize) -> Self {
        Self {
            objectid,
            transform: None,
            printable: true,
        }
    }

    /// The item's placement transform, identity when absent
    pub fn effective_transform(&self) -> Transform3x4 {
        self.transform.unwrap_or_default()
    }
}

/// Build section: the ordered list of placeable instances
#[derive(Debug, Clone, Default)]
pub struct Build {
    /// Items in document order; `build_item_index` is 1-based into this list
    pub items: Vec<BuildItem>,
}

/// A vendor assemble-item record from `model_settings.config`
///
/// Bambu-style exports carry a parallel placement per object here; some
/// slicer binaries prefer it over the core build-item transform, so edits
/// must write through both (see [`crate::editor`]).
#[derive(Debug, Clone)]
pub struct AssembleItem {
    /// Referenced object id (vendor metadata keeps these as strings)
    pub object_id: String,
    /// Optional instance id
    pub instance_id: Option<String>,
    /// Parallel 3x4 placement transform
    pub transform: Option<Transform3x4>,
}

/// Vendor plate metadata from `model_settings.config`
#[derive(Debug, Clone, Default)]
pub struct PlateSettings {
    /// Vendor plate id (`plater_id`)
    pub plater_id: Option<u32>,
    /// Vendor plate name (`plater_name`)
    pub plater_name: Option<String>,
    /// Object ids assigned to this plate via `model_instance` entries
    pub object_ids: Vec<String>,
}

/// Parsed vendor settings (`Metadata/model_settings.config`)
#[derive(Debug, Clone, Default)]
pub struct VendorSettings {
    /// Assemble items in document order
    pub assemble_items: Vec<AssembleItem>,
    /// Plate definitions
    pub plates: Vec<PlateSettings>,
    /// Object display names keyed by object id
    pub object_names: HashMap<String, String>,
}

impl VendorSettings {
    /// Assemble transforms keyed 1-based by document position
    pub fn assemble_transforms_by_index(&self) -> HashMap<usize, Transform3x4> {
        self.assemble_items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.transform.map(|t| (i + 1, t)))
            .collect()
    }

    /// Assemble transforms keyed by object id, dropping ambiguous duplicates
    pub fn assemble_transforms_by_object_id(&self) -> HashMap<String, Transform3x4> {
        let mut result: HashMap<String, Transform3x4> = HashMap::new();
        let mut duplicates: BTreeSet<String> = BTreeSet::new();
        for item in &self.assemble_items {
            let Some(t) = item.transform else { continue };
            if result.contains_key(&item.object_id) {
                duplicates.insert(item.object_id.clone());
            } else {
                result.insert(item.object_id.clone(), t);
            }
        }
        for oid in duplicates {
            result.remove(&oid);
        }
        result
    }

    /// Assemble-item object ids keyed 1-based by document position
    pub fn assemble_object_ids_by_index(&self) -> HashMap<usize, String> {
        self.assemble_items
            .iter()
            .enumerate()
            .map(|(i, item)| (i + 1, item.object_id.clone()))
            .collect()
    }

    /// Vendor plate names keyed by `plater_id`
    pub fn plate_names(&self) -> HashMap<u32, String> {
        self.plates
            .iter()
            .filter_map(|p| match (p.plater_id, p.plater_name.as_deref()) {
                (Some(id), Some(name)) if !name.is_empty() => Some((id, name.to_string())),
                _ => None,
            })
            .collect()
    }

    /// Look up the vendor `plater_id` that contains the given object id
    pub fn plate_for_object(&self, object_id: &str) -> Option<u32> {
        self.plates
            .iter()
            .find(|p| p.object_ids.iter().any(|oid| oid == object_id))
            .and_then(|p| p.plater_id)
    }
}

/// One plate of a multi-plate container
///
/// In the vendor multi-plate convention every top-level build item is one
/// packed plate; `plate_id` is therefore the 1-based build-item index.
#[derive(Debug, Clone)]
pub struct Plate {
    /// 1-based plate id (build-item index)
    pub plate_id: usize,
    /// Referenced object id
    pub object_id: usize,
    /// Resolved display name
    pub plate_name: String,
    /// Whether the plate is printable
    pub printable: bool,
    /// Packed project-space placement transform
    pub transform: Transform3x4,
}

impl Plate {
    /// Packed project-space translation of this plate
    pub fn translation(&self) -> [f64; 3] {
        self.transform.translation_array()
    }
}

/// A fully parsed 3MF container
#[derive(Debug, Clone)]
pub struct Container {
    /// Unit scale applied at parse time (1.0 for millimeter files)
    pub unit_scale: f64,
    /// Object resources per model part path (`3D/3dmodel.model` plus any
    /// external sub-model parts referenced via `p:path`)
    pub resources: HashMap<String, HashMap<usize, Object>>,
    /// Build section of the main model part
    pub build: Build,
    /// Vendor assemble/plate metadata, when present and parseable
    pub vendor: Option<VendorSettings>,
    /// Plate ids present as `Metadata/plate_N.json` parts
    pub plate_json_ids: BTreeSet<u32>,
    /// Raw part bytes in original archive order
    pub parts: Vec<(String, Vec<u8>)>,
}

impl Container {
    /// Raw bytes of a named part
    pub fn raw_part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(part_name, _)| part_name == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// Look up an object resource in a model part
    pub fn object(&self, model_path: &str, object_id: usize) -> Option<&Object> {
        self.resources.get(model_path)?.get(&object_id)
    }

    /// Look up an object in the main model part
    pub fn main_object(&self, object_id: usize) -> Option<&Object> {
        self.object(MODEL_PATH, object_id)
    }

    /// Whether this is a multi-plate container (vendor packed convention:
    /// more than one top-level build item)
    pub fn is_multi_plate(&self) -> bool {
        self.build.items.len() > 1
    }

    /// Plates of a multi-plate container; empty for single-plate files
    ///
    /// Name priority follows the vendor convention: Bambu plate name, then
    /// Bambu object name, then core object name, then `Plate N`.
    pub fn plates(&self) -> Vec<Plate> {
        if !self.is_multi_plate() {
            return Vec::new();
        }

        let plate_names = self
            .vendor
            .as_ref()
            .map(VendorSettings::plate_names)
            .unwrap_or_default();

        self.build
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let plate_id = i + 1;
                let oid_str = item.objectid.to_string();
                let vendor_object_name = self
                    .vendor
                    .as_ref()
                    .and_then(|v| v.object_names.get(&oid_str))
                    .cloned();
                let core_object_name = self
                    .main_object(item.objectid)
                    .and_then(|o| o.name.clone())
                    .filter(|n| !n.trim().is_empty());
                let plate_name = plate_names
                    .get(&(plate_id as u32))
                    .cloned()
                    .or(vendor_object_name)
                    .or(core_object_name)
                    .unwrap_or_else(|| format!("Plate {}", plate_id));
                Plate {
                    plate_id,
                    object_id: item.objectid,
                    plate_name,
                    printable: item.printable,
                    transform: item.effective_transform(),
                }
            })
            .collect()
    }

    /// Packed plate translations keyed by plate id
    pub fn plate_translations(&self) -> HashMap<usize, [f64; 3]> {
        self.plates()
            .iter()
            .map(|p| (p.plate_id, p.translation()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_type_parsing() {
        assert_eq!(PartType::from_attr("model"), PartType::Model);
        assert_eq!(PartType::from_attr("OTHER"), PartType::Other);
        assert_eq!(PartType::from_attr(" support "), PartType::Support);
        assert_eq!(PartType::from_attr("unknown"), PartType::Model);
        assert!(PartType::Model.is_printable());
        assert!(!PartType::Other.is_printable());
    }

    #[test]
    fn test_assemble_duplicate_object_ids_dropped() {
        let settings = VendorSettings {
            assemble_items: vec![
                AssembleItem {
                    object_id: "2".to_string(),
                    instance_id: None,
                    transform: Some(Transform3x4::translation_xyz(1.0, 0.0, 0.0)),
                },
                AssembleItem {
                    object_id: "2".to_string(),
                    instance_id: None,
                    transform: Some(Transform3x4::translation_xyz(9.0, 0.0, 0.0)),
                },
                AssembleItem {
                    object_id: "4".to_string(),
                    instance_id: None,
                    transform: Some(Transform3x4::translation_xyz(5.0, 0.0, 0.0)),
                },
            ],
            ..Default::default()
        };

        let by_object = settings.assemble_transforms_by_object_id();
        assert!(!by_object.contains_key("2"));
        assert!(by_object.contains_key("4"));

        let by_index = settings.assemble_transforms_by_index();
        assert_eq!(by_index.len(), 3);
    }

    #[test]
    fn test_plate_for_object() {
        let settings = VendorSettings {
            plates: vec![
                PlateSettings {
                    plater_id: Some(1),
                    plater_name: Some("Front".to_string()),
                    object_ids: vec!["2".to_string()],
                },
                PlateSettings {
                    plater_id: Some(6),
                    plater_name: None,
                    object_ids: vec!["8".to_string(), "9".to_string()],
                },
            ],
            ..Default::default()
        };
        assert_eq!(settings.plate_for_object("9"), Some(6));
        assert_eq!(settings.plate_for_object("404"), None);
        assert_eq!(settings.plate_names().get(&1).map(String::as_str), Some("Front"));
    }
}
