//! 3MF container parsing
//!
//! A container parse reads every archive part into memory in original order
//! (edits later rewrite the archive from these bytes), then builds the
//! semantic graph: the required core model part, any external sub-model
//! parts referenced through Production-extension `p:path` components, and
//! the optional vendor metadata parts. Vendor parts are best-effort; a file
//! with broken `model_settings.config` still parses as a core-only
//! container.

mod core;
mod settings;

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};

use quick_xml::Reader;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::model::{Container, MODEL_PATH, MODEL_SETTINGS_PATH, Object};

pub use core::{
    ModelPart, parse_build_item, parse_component, parse_model_part, parse_object, parse_triangle,
    parse_vertex, unit_scale_for,
};
pub use settings::parse_model_settings;

/// Parse a 3MF container from a reader
pub fn parse_container<R: Read + Seek>(reader: R) -> Result<Container> {
    let mut archive = ZipArchive::new(reader)?;

    // Keep every part's raw bytes in archive order. The editor patches these
    // bytes in place and rewrites the zip, so order and content of untouched
    // parts must survive exactly.
    let mut parts: Vec<(String, Vec<u8>)> = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        parts.push((name, bytes));
    }

    parse_container_parts(parts)
}

/// Parse a 3MF container from an in-memory byte buffer
pub fn parse_container_bytes(bytes: &[u8]) -> Result<Container> {
    parse_container(Cursor::new(bytes))
}

fn parse_container_parts(parts: Vec<(String, Vec<u8>)>) -> Result<Container> {
    let main_bytes = parts
        .iter()
        .find(|(name, _)| name == MODEL_PATH)
        .map(|(_, bytes)| bytes.clone())
        .ok_or_else(|| Error::MissingFile(MODEL_PATH.to_string()))?;

    let main_xml = String::from_utf8(main_bytes)
        .map_err(|_| Error::InvalidFormat("model part is not valid UTF-8".to_string()))?;

    let mut main_part = parse_model_part(&main_xml)?;
    let build = main_part
        .build
        .take()
        .ok_or_else(|| Error::InvalidXml("3MF missing build section".to_string()))?;

    let unit_scale = main_part.unit_scale;
    let mut resources: HashMap<String, HashMap<usize, Object>> = HashMap::new();

    scale_part_objects(&mut main_part.objects, unit_scale);

    // Pull in external sub-model parts referenced by components. Missing or
    // broken sub-parts degrade to empty component geometry rather than
    // failing the parse.
    let mut pending: Vec<String> = referenced_model_paths(&main_part.objects);
    resources.insert(MODEL_PATH.to_string(), main_part.objects);
    while let Some(path) = pending.pop() {
        if resources.contains_key(&path) {
            continue;
        }
        let Some((_, bytes)) = parts.iter().find(|(name, _)| *name == path) else {
            warn!(part = %path, "referenced sub-model part not found in archive");
            resources.insert(path, HashMap::new());
            continue;
        };
        let parsed = std::str::from_utf8(bytes)
            .ok()
            .and_then(|xml| parse_model_part(xml).ok());
        match parsed {
            Some(mut sub_part) => {
                scale_part_objects(&mut sub_part.objects, sub_part.unit_scale);
                pending.extend(referenced_model_paths(&sub_part.objects));
                resources.insert(path, sub_part.objects);
            }
            None => {
                warn!(part = %path, "failed to parse referenced sub-model part");
                resources.insert(path, HashMap::new());
            }
        }
    }

    let mut build = build;
    if (unit_scale - 1.0).abs() > f64::EPSILON {
        for item in &mut build.items {
            if let Some(t) = item.transform.as_mut() {
                *t = t.with_translation(
                    t.0[9] * unit_scale,
                    t.0[10] * unit_scale,
                    t.0[11] * unit_scale,
                );
            }
        }
    }

    let vendor = parts
        .iter()
        .find(|(name, _)| name == MODEL_SETTINGS_PATH)
        .and_then(|(_, bytes)| std::str::from_utf8(bytes).ok())
        .and_then(|xml| match parse_model_settings(xml) {
            Ok(settings) => Some(settings),
            Err(err) => {
                warn!(error = %err, "vendor settings part unparseable, continuing core-only");
                None
            }
        });

    let plate_json_ids = parts
        .iter()
        .filter_map(|(name, _)| plate_json_id(name))
        .collect();

    let container = Container {
        unit_scale,
        resources,
        build,
        vendor,
        plate_json_ids,
        parts,
    };
    debug!(
        build_items = container.build.items.len(),
        multi_plate = container.is_multi_plate(),
        has_vendor = container.vendor.is_some(),
        "parsed 3MF container"
    );
    Ok(container)
}

/// Model part paths referenced by components, normalized to archive names
fn referenced_model_paths(objects: &HashMap<usize, Object>) -> Vec<String> {
    let mut paths = Vec::new();
    for object in objects.values() {
        for component in &object.components {
            if let Some(path) = component.path.as_deref() {
                let normalized = path.trim_start_matches('/').to_string();
                if !paths.contains(&normalized) {
                    paths.push(normalized);
                }
            }
        }
    }
    paths
}

/// Scale mesh vertices and component translation columns to millimeters
///
/// The editor patches raw attribute text and never sees units, so all
/// unit conversion happens here, once, at parse time.
fn scale_part_objects(objects: &mut HashMap<usize, Object>, scale: f64) {
    if (scale - 1.0).abs() <= f64::EPSILON {
        return;
    }
    for object in objects.values_mut() {
        if let Some(mesh) = object.mesh.as_mut() {
            for v in &mut mesh.vertices {
                v.x *= scale;
                v.y *= scale;
                v.z *= scale;
            }
        }
        for component in &mut object.components {
            if let Some(t) = component.transform.as_mut() {
                *t = t.with_translation(t.0[9] * scale, t.0[10] * scale, t.0[11] * scale);
            }
        }
    }
}

/// Extract N from a `Metadata/plate_N.json` part name
fn plate_json_id(name: &str) -> Option<u32> {
    let digits = name
        .strip_prefix("Metadata/plate_")?
        .strip_suffix(".json")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Strip an optional namespace prefix from an XML name
pub(crate) fn get_local_name(name_str: &str) -> &str {
    if let Some(pos) = name_str.rfind(':') {
        &name_str[pos + 1..]
    } else {
        name_str
    }
}

/// Get an attribute value by its local name, regardless of namespace prefix
///
/// Extension attributes can appear under different prefixes (`p:path`,
/// `y:path`); lookups by local name accept them all.
pub(crate) fn get_attr_by_local_name(
    attrs: &HashMap<String, String>,
    local_name: &str,
) -> Option<String> {
    attrs.iter().find_map(|(key, value)| {
        if get_local_name(key) == local_name {
            Some(value.clone())
        } else {
            None
        }
    })
}

/// Parse attributes from an XML element
pub(crate) fn parse_attributes<R: std::io::BufRead>(
    _reader: &Reader<R>,
    e: &quick_xml::events::BytesStart,
) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::with_capacity(8);

    for attr in e.attributes() {
        let attr = attr?;
        let key =
            std::str::from_utf8(attr.key.as_ref()).map_err(|e| Error::InvalidXml(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| Error::InvalidXml(e.to_string()))?;

        attrs.insert(key.to_string(), value.into_owned());
    }

    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plate_json_id_pattern() {
        assert_eq!(plate_json_id("Metadata/plate_1.json"), Some(1));
        assert_eq!(plate_json_id("Metadata/plate_12.json"), Some(12));
        assert_eq!(plate_json_id("Metadata/plate_1_small.json"), None);
        assert_eq!(plate_json_id("Metadata/plate_.json"), None);
        assert_eq!(plate_json_id("Metadata/plate_1.png"), None);
        assert_eq!(plate_json_id("Other/plate_1.json"), None);
    }

    #[test]
    fn test_get_local_name() {
        assert_eq!(get_local_name("p:path"), "path");
        assert_eq!(get_local_name("objectid"), "objectid");
    }
}
