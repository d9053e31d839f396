//! Build-item transform editing
//!
//! Applies per-item translate/rotate deltas to a container and produces a
//! new archive. Two placement layers are written through: the core
//! `<build><item>` transforms and, when present, the vendor
//! `<assemble_item>` transforms in `model_settings.config` (some slicer
//! builds prioritize the latter for Bambu-style exports). Both parts are
//! patched at the byte level so untouched content survives exactly.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{Error, Result};
use crate::model::{Container, MODEL_PATH, MODEL_SETTINGS_PATH};
use crate::patch::{assemble_item_spans, build_item_spans, get_attr, set_attr, splice_spans};
use crate::slicer::SlicerDirectives;
use crate::transform::Transform3x4;

/// Magnitude below which a delta component is treated as zero
const NOOP_EPSILON: f64 = 1e-9;

/// One requested transform delta for a build item
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectTransformEdit {
    /// 1-based index into the build item list
    pub build_item_index: usize,
    /// Optional cross-check against the item's `objectid`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// X translation delta in millimeters
    #[serde(default)]
    pub translate_x_mm: f64,
    /// Y translation delta in millimeters
    #[serde(default)]
    pub translate_y_mm: f64,
    /// Z rotation delta in degrees
    #[serde(default)]
    pub rotate_z_deg: f64,
}

impl ObjectTransformEdit {
    /// Whether this edit changes nothing
    pub fn is_noop(&self) -> bool {
        self.translate_x_mm.abs() < NOOP_EPSILON
            && self.translate_y_mm.abs() < NOOP_EPSILON
            && self.rotate_z_deg.abs() < NOOP_EPSILON
    }

    /// The edited transform: rotation composed first, then translation added
    fn apply_to(&self, current: &Transform3x4) -> Transform3x4 {
        let mut t = *current;
        if self.rotate_z_deg.abs() > NOOP_EPSILON {
            t = t.compose(&Transform3x4::rotation_z(self.rotate_z_deg));
        }
        let mut values = t.0;
        values[9] += self.translate_x_mm;
        values[10] += self.translate_y_mm;
        Transform3x4(values)
    }
}

/// Record of one edit that was applied
#[derive(Debug, Clone, Serialize)]
pub struct AppliedEdit {
    /// 1-based build item index
    pub build_item_index: usize,
    /// The item's `objectid`, when present
    pub object_id: Option<String>,
    /// X translation delta applied
    pub translate_x_mm: f64,
    /// Y translation delta applied
    pub translate_y_mm: f64,
    /// Z rotation delta applied
    pub rotate_z_deg: f64,
    /// Final formatted transform written to the item
    pub transform: String,
}

/// Result of a transform edit: the rewritten archive plus bookkeeping
#[derive(Debug, Clone)]
pub struct EditOutcome {
    /// New 3MF archive bytes
    pub archive: Vec<u8>,
    /// Edits that were applied, in build-item order
    pub applied: Vec<AppliedEdit>,
    /// Invocation flags the edit implies
    pub directives: SlicerDirectives,
}

/// Apply build-item transform deltas and rewrite the archive
///
/// No-op deltas are accepted and skipped; duplicate or out-of-range indices
/// reject the whole request so a partial edit never reaches the slicer.
pub fn apply_object_transforms(
    container: &Container,
    edits: &[ObjectTransformEdit],
) -> Result<EditOutcome> {
    if edits.is_empty() {
        return Err(Error::InvalidEdit(
            "object_transforms cannot be empty".to_string(),
        ));
    }

    let mut normalized: HashMap<usize, &ObjectTransformEdit> = HashMap::new();
    for edit in edits {
        if edit.build_item_index < 1 {
            return Err(Error::InvalidEdit(
                "build_item_index must be >= 1".to_string(),
            ));
        }
        if normalized.insert(edit.build_item_index, edit).is_some() {
            return Err(Error::InvalidEdit(format!(
                "Duplicate build_item_index in object_transforms: {}",
                edit.build_item_index
            )));
        }
    }

    let model_bytes = container
        .raw_part(MODEL_PATH)
        .ok_or_else(|| Error::MissingFile(MODEL_PATH.to_string()))?;
    let model_xml = std::str::from_utf8(model_bytes)
        .map_err(|_| Error::InvalidFormat("3D model XML is not valid UTF-8".to_string()))?;

    let spans = build_item_spans(model_xml)?;
    let mut applied: Vec<AppliedEdit> = Vec::new();
    let mut replacements: Vec<(crate::patch::TagSpan, String)> = Vec::new();

    for (i, span) in spans.iter().enumerate() {
        let idx = i + 1;
        let Some(edit) = normalized.get(&idx) else {
            continue;
        };

        let tag = span.text(model_xml);
        let actual_object_id = get_attr(tag, "objectid");
        if let (Some(expected), Some(actual)) = (edit.object_id.as_deref(), actual_object_id.as_deref())
        {
            if expected != actual {
                return Err(Error::InvalidEdit(format!(
                    "build_item_index {} object_id mismatch (expected {}, got {})",
                    idx, expected, actual
                )));
            }
        }

        if edit.is_noop() {
            debug!(build_item_index = idx, "skipping no-op transform edit");
            continue;
        }

        let current = Transform3x4::parse_or_identity(get_attr(tag, "transform").as_deref());
        let updated = edit.apply_to(&current);
        let formatted = updated.format();
        replacements.push((*span, set_attr(tag, "transform", &formatted)));
        applied.push(AppliedEdit {
            build_item_index: idx,
            object_id: actual_object_id,
            translate_x_mm: edit.translate_x_mm,
            translate_y_mm: edit.translate_y_mm,
            rotate_z_deg: edit.rotate_z_deg,
            transform: formatted,
        });
    }

    let reachable: HashSet<usize> = (1..=spans.len()).collect();
    let mut missing: Vec<usize> = normalized
        .keys()
        .filter(|idx| !reachable.contains(idx))
        .copied()
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(Error::InvalidEdit(format!(
            "Invalid build_item_index values: {:?}",
            missing
        )));
    }

    if applied.is_empty() {
        // Every edit was a no-op: hand back the archive unchanged
        return Ok(EditOutcome {
            archive: write_archive(container, &HashMap::new())?,
            applied,
            directives: SlicerDirectives::default(),
        });
    }

    let patched_model = splice_spans(model_xml, &replacements);

    let mut replaced_parts: HashMap<String, Vec<u8>> = HashMap::new();
    replaced_parts.insert(MODEL_PATH.to_string(), patched_model.into_bytes());

    if let Some(settings_bytes) = container.raw_part(MODEL_SETTINGS_PATH) {
        if let Ok(settings_xml) = std::str::from_utf8(settings_bytes) {
            if let Some(patched) = patch_assemble_transforms(settings_xml, &normalized, &applied) {
                replaced_parts.insert(MODEL_SETTINGS_PATH.to_string(), patched.into_bytes());
            }
        }
    }

    info!(applied = applied.len(), "applied object transform edits");
    Ok(EditOutcome {
        archive: write_archive(container, &replaced_parts)?,
        applied,
        directives: SlicerDirectives::for_applied_edits(),
    })
}

/// Patch vendor `<assemble_item>` transforms with the same deltas
///
/// Edits are matched to assemble items by object id when that id is unique
/// among the applied edits, else by document position. Items without a
/// transform attribute are left alone. Returns `None` when nothing changed
/// or the part is unusable.
fn patch_assemble_transforms(
    settings_xml: &str,
    normalized: &HashMap<usize, &ObjectTransformEdit>,
    applied: &[AppliedEdit],
) -> Option<String> {
    let spans = assemble_item_spans(settings_xml).ok()?;
    if spans.is_empty() {
        return None;
    }

    let mut spec_by_object_id: HashMap<&str, &ObjectTransformEdit> = HashMap::new();
    let mut duplicates: HashSet<&str> = HashSet::new();
    for a in applied {
        let Some(oid) = a.object_id.as_deref() else {
            continue;
        };
        if spec_by_object_id.contains_key(oid) {
            duplicates.insert(oid);
        } else if let Some(edit) = normalized.get(&a.build_item_index) {
            spec_by_object_id.insert(oid, edit);
        }
    }
    for oid in duplicates {
        spec_by_object_id.remove(oid);
    }

    let mut replacements: Vec<(crate::patch::TagSpan, String)> = Vec::new();
    for (i, span) in spans.iter().enumerate() {
        let position = i + 1;
        let tag = span.text(settings_xml);

        let by_object = get_attr(tag, "object_id")
            .and_then(|oid| spec_by_object_id.get(oid.as_str()).copied());
        let edit = by_object.or_else(|| normalized.get(&position).copied());
        let Some(edit) = edit else { continue };
        if edit.is_noop() {
            continue;
        }

        let Some(current_str) = get_attr(tag, "transform") else {
            continue;
        };
        let current = Transform3x4::parse_or_identity(Some(&current_str));
        let updated = edit.apply_to(&current);
        replacements.push((*span, set_attr(tag, "transform", &updated.format())));
    }

    if replacements.is_empty() {
        return None;
    }
    Some(splice_spans(settings_xml, &replacements))
}

/// Rewrite the archive from the container's parts, substituting any patched
/// ones, preserving original part order
pub(crate) fn write_archive(
    container: &Container,
    replaced_parts: &HashMap<String, Vec<u8>>,
) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, bytes) in &container.parts {
        writer.start_file(name.as_str(), options)?;
        match replaced_parts.get(name) {
            Some(replacement) => writer.write_all(replacement)?,
            None => writer.write_all(bytes)?,
        }
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(idx: usize, dx: f64, dy: f64, rot: f64) -> ObjectTransformEdit {
        ObjectTransformEdit {
            build_item_index: idx,
            object_id: None,
            translate_x_mm: dx,
            translate_y_mm: dy,
            rotate_z_deg: rot,
        }
    }

    #[test]
    fn test_noop_detection() {
        assert!(edit(1, 0.0, 0.0, 0.0).is_noop());
        assert!(edit(1, 1e-12, -1e-12, 1e-10).is_noop());
        assert!(!edit(1, 0.5, 0.0, 0.0).is_noop());
    }

    #[test]
    fn test_apply_translation_delta() {
        let current = Transform3x4::translation_xyz(100.0, 100.0, 5.0);
        let updated = edit(1, 10.0, -20.0, 0.0).apply_to(&current);
        assert_eq!(updated.translation_array(), [110.0, 80.0, 5.0]);
    }

    #[test]
    fn test_apply_rotation_composes_before_translation() {
        let current = Transform3x4::translation_xyz(100.0, 100.0, 0.0);
        let updated = edit(1, 10.0, 0.0, 90.0).apply_to(&current);
        // Rotation composes into the linear part, translation adds directly
        assert!((updated.0[0] - 0.0).abs() < 1e-12);
        assert!((updated.0[3] - 1.0).abs() < 1e-12);
        assert_eq!(updated.translation_array(), [110.0, 100.0, 0.0]);
    }

    #[test]
    fn test_serde_defaults_for_omitted_deltas() {
        let deserialized: ObjectTransformEdit =
            serde_json::from_str(r#"{"build_item_index": 2, "translate_x_mm": 3.5}"#).unwrap();
        assert_eq!(deserialized.build_item_index, 2);
        assert_eq!(deserialized.translate_y_mm, 0.0);
        assert_eq!(deserialized.rotate_z_deg, 0.0);
        assert!(deserialized.object_id.is_none());
    }

    fn test_container() -> Container {
        let model = r#"<?xml version="1.0"?>
<model unit="millimeter" xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02">
  <resources><object id="1"/></resources>
  <build>
    <item objectid="1" transform="1 0 0 0 1 0 0 0 1 100 100 0"/>
  </build>
</model>"#;
        Container {
            unit_scale: 1.0,
            resources: std::collections::HashMap::new(),
            build: crate::model::Build::default(),
            vendor: None,
            plate_json_ids: std::collections::BTreeSet::new(),
            parts: vec![(MODEL_PATH.to_string(), model.as_bytes().to_vec())],
        }
    }

    #[test]
    fn test_empty_request_rejected() {
        let err = apply_object_transforms(&test_container(), &[]).unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let err = apply_object_transforms(
            &test_container(),
            &[edit(1, 1.0, 0.0, 0.0), edit(1, 2.0, 0.0, 0.0)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate build_item_index"));
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let err =
            apply_object_transforms(&test_container(), &[edit(3, 1.0, 0.0, 0.0)]).unwrap_err();
        assert!(err.to_string().contains("Invalid build_item_index values: [3]"));
    }

    #[test]
    fn test_object_id_mismatch_rejected() {
        let mut e = edit(1, 1.0, 0.0, 0.0);
        e.object_id = Some("9".to_string());
        let err = apply_object_transforms(&test_container(), &[e]).unwrap_err();
        assert!(err.to_string().contains("object_id mismatch"));
    }
}
