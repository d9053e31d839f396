//! Uniform scale engine
//!
//! Rescales every placed object by a percentage without moving it. Scale is
//! applied where each build item's geometry is rooted: items referencing a
//! mesh object get the factor folded into their linear columns, items
//! referencing an assembly get every root component transform rescaled in
//! both its linear and translation columns. Rescaling root component
//! translations keeps assembly-internal spacing proportional; deeper nesting
//! levels inherit the factor through the composed linear parts.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::editor::write_archive;
use crate::error::{Error, Result};
use crate::machine::MachineProfile;
use crate::model::{Container, MODEL_PATH};
use crate::parser::parse_container_bytes;
use crate::patch::{
    TagSpan, build_item_spans, component_spans_by_object, get_attr, set_attr, splice_spans,
};
use crate::slicer::SlicerDirectives;
use crate::transform::Transform3x4;
use crate::validate::{ValidationReport, validate_plate_bounds};

/// Scale factors this close to 1.0 leave the container untouched
const SCALE_NOOP_EPSILON: f64 = 1e-5;

/// Result of a uniform scale
#[derive(Debug, Clone)]
pub struct ScaleOutcome {
    /// New 3MF archive bytes
    pub archive: Vec<u8>,
    /// Bounds check of the rescaled container
    pub report: ValidationReport,
    /// Invocation flags the scale implies
    pub directives: SlicerDirectives,
}

/// Rescale all placed objects by `percent` of their current size
///
/// Placement translations are preserved; only object size and
/// assembly-internal offsets change. The returned report re-checks the
/// rescaled container against the build volume, it does not reject.
///
/// **Error Code**
/// - `E3003`: percentage is not a positive finite number
pub fn apply_uniform_scale(
    container: &Container,
    percent: f64,
    profile: &MachineProfile,
) -> Result<ScaleOutcome> {
    if !percent.is_finite() || percent <= 0.0 {
        return Err(Error::InvalidEdit(format!(
            "scale percent must be positive, got {}",
            percent
        )));
    }

    let factor = percent / 100.0;
    if (factor - 1.0).abs() < SCALE_NOOP_EPSILON {
        return Ok(ScaleOutcome {
            archive: write_archive(container, &HashMap::new())?,
            report: validate_plate_bounds(container, None, profile)?,
            directives: SlicerDirectives::default(),
        });
    }

    let model_bytes = container
        .raw_part(MODEL_PATH)
        .ok_or_else(|| Error::MissingFile(MODEL_PATH.to_string()))?;
    let model_xml = std::str::from_utf8(model_bytes)
        .map_err(|_| Error::InvalidFormat("3D model XML is not valid UTF-8".to_string()))?;

    let item_spans = build_item_spans(model_xml)?;
    let mut replacements: Vec<(TagSpan, String)> = Vec::new();
    let mut assembly_objects: HashSet<usize> = HashSet::new();

    for (index, item) in container.build.items.iter().enumerate() {
        let object = container.object(MODEL_PATH, item.objectid);
        let has_direct_mesh = object.is_some_and(|o| o.mesh.is_some());
        if has_direct_mesh {
            let span = *item_spans.get(index).ok_or_else(|| {
                Error::InvalidModel("build item list out of sync with model XML".to_string())
            })?;
            // Patch from the raw tag text, not the parsed item: parsed
            // translations may carry a unit conversion the document does not.
            let tag = span.text(model_xml);
            let current = get_attr(tag, "transform")
                .and_then(|v| Transform3x4::parse(&v))
                .unwrap_or_default();
            let scaled = current.scale_linear(factor);
            replacements.push((span, set_attr(tag, "transform", &scaled.format())));
        } else if object.is_some_and(|o| !o.components.is_empty()) {
            assembly_objects.insert(item.objectid);
        }
    }

    if !assembly_objects.is_empty() {
        for (object_id, span) in component_spans_by_object(model_xml)? {
            if !assembly_objects.contains(&object_id) {
                continue;
            }
            let tag = span.text(model_xml);
            let current = get_attr(tag, "transform")
                .and_then(|v| Transform3x4::parse(&v))
                .unwrap_or_default();
            let scaled = current.scale_linear(factor).scale_translation(factor);
            replacements.push((span, set_attr(tag, "transform", &scaled.format())));
        }
    }

    let patched = splice_spans(model_xml, &replacements);
    let mut replaced_parts = HashMap::new();
    replaced_parts.insert(MODEL_PATH.to_string(), patched.into_bytes());
    let archive = write_archive(container, &replaced_parts)?;

    let rescaled = parse_container_bytes(&archive)?;
    let report = validate_plate_bounds(&rescaled, None, profile)?;
    info!(percent, fits = report.fits, "applied uniform scale");

    Ok(ScaleOutcome {
        archive,
        report,
        directives: SlicerDirectives::for_applied_edits(),
    })
}
