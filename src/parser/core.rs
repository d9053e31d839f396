//! Core 3MF model-part parsing
//!
//! Handles the `3D/3dmodel.model` XML (and any external sub-model parts):
//! objects, meshes, vertices, triangles, components, and the build section.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};
use crate::model::{Build, BuildItem, Component, Mesh, Object, PartType, Triangle, Vertex};
use crate::transform::Transform3x4;

use super::{get_attr_by_local_name, parse_attributes};

/// Default buffer capacity for XML parsing (4KB)
const XML_BUFFER_CAPACITY: usize = 4096;

/// A parsed model part: resources plus an optional build section
///
/// The main part must carry a `<build>`; external sub-model parts referenced
/// via `p:path` usually carry only resources.
#[derive(Debug, Clone)]
pub struct ModelPart {
    /// Unit scale to millimeters declared by the `unit` attribute
    pub unit_scale: f64,
    /// Object resources keyed by id
    pub objects: HashMap<usize, Object>,
    /// Build section, when present
    pub build: Option<Build>,
}

/// Millimeter scale factor for a 3MF `unit` attribute value
pub fn unit_scale_for(unit: &str) -> f64 {
    match unit {
        "micron" => 0.001,
        "centimeter" => 10.0,
        "inch" => 25.4,
        "foot" => 304.8,
        "meter" => 1000.0,
        _ => 1.0,
    }
}

/// Parse one model part's XML
pub fn parse_model_part(xml: &str) -> Result<ModelPart> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut part = ModelPart {
        unit_scale: 1.0,
        objects: HashMap::new(),
        build: None,
    };

    let mut current_object: Option<Object> = None;
    let mut current_mesh: Option<Mesh> = None;
    let mut buf = Vec::with_capacity(XML_BUFFER_CAPACITY);

    loop {
        let event = reader.read_event_into(&mut buf).map_err(Error::Xml)?;
        let self_closing = matches!(event, Event::Empty(_));
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                match e.local_name().as_ref() {
                    b"model" => {
                        let attrs = parse_attributes(&reader, e)?;
                        if let Some(unit) = attrs.get("unit") {
                            part.unit_scale = unit_scale_for(unit);
                        }
                    }
                    b"object" => {
                        let object = parse_object(&reader, e)?;
                        if self_closing {
                            part.objects.insert(object.id, object);
                        } else {
                            current_object = Some(object);
                        }
                    }
                    b"mesh" => {
                        current_mesh = Some(Mesh::new());
                    }
                    b"vertex" => {
                        if let Some(mesh) = current_mesh.as_mut() {
                            mesh.vertices.push(parse_vertex(&reader, e)?);
                        }
                    }
                    b"triangle" => {
                        if let Some(mesh) = current_mesh.as_mut() {
                            mesh.triangles.push(parse_triangle(&reader, e)?);
                        }
                    }
                    b"component" => {
                        if let Some(object) = current_object.as_mut() {
                            object.components.push(parse_component(&reader, e)?);
                        }
                    }
                    b"build" => {
                        part.build.get_or_insert_with(Build::default);
                    }
                    b"item" => {
                        let build = part.build.get_or_insert_with(Build::default);
                        build.items.push(parse_build_item(&reader, e)?);
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"mesh" => {
                    if let (Some(object), Some(mesh)) =
                        (current_object.as_mut(), current_mesh.take())
                    {
                        object.mesh = Some(mesh);
                    }
                }
                b"object" => {
                    if let Some(object) = current_object.take() {
                        part.objects.insert(object.id, object);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(part)
}

/// Parse object element attributes
pub fn parse_object<R: std::io::BufRead>(
    reader: &Reader<R>,
    e: &quick_xml::events::BytesStart,
) -> Result<Object> {
    let attrs = parse_attributes(reader, e)?;

    let id = attrs
        .get("id")
        .ok_or_else(|| Error::missing_attribute("object", "id"))?
        .parse::<usize>()?;

    let mut object = Object::new(id);
    object.name = attrs.get("name").cloned().filter(|n| !n.is_empty());
    if let Some(type_str) = attrs.get("type") {
        object.part_type = PartType::from_attr(type_str);
    }

    Ok(object)
}

/// Parse vertex element attributes
///
/// Parses x/y/z directly from the attribute bytes rather than through the
/// HashMap helper; vertex counts dominate parse time on dense meshes.
pub fn parse_vertex<R: std::io::BufRead>(
    _reader: &Reader<R>,
    e: &quick_xml::events::BytesStart,
) -> Result<Vertex> {
    let mut x_opt: Option<f64> = None;
    let mut y_opt: Option<f64> = None;
    let mut z_opt: Option<f64> = None;

    let parse_f64 = |value: &[u8]| -> Result<f64> {
        let value_str = std::str::from_utf8(value).map_err(|e| Error::InvalidXml(e.to_string()))?;
        Ok(value_str.parse::<f64>()?)
    };

    for attr_result in e.attributes() {
        let attr = attr_result?;
        match attr.key.as_ref() {
            b"x" => x_opt = Some(parse_f64(&attr.value)?),
            b"y" => y_opt = Some(parse_f64(&attr.value)?),
            b"z" => z_opt = Some(parse_f64(&attr.value)?),
            _ => {}
        }
    }

    let x = x_opt.ok_or_else(|| Error::missing_attribute("vertex", "x"))?;
    let y = y_opt.ok_or_else(|| Error::missing_attribute("vertex", "y"))?;
    let z = z_opt.ok_or_else(|| Error::missing_attribute("vertex", "z"))?;

    if !x.is_finite() || !y.is_finite() || !z.is_finite() {
        return Err(Error::invalid_xml_element(
            "vertex",
            "coordinates must be finite",
        ));
    }

    Ok(Vertex::new(x, y, z))
}

/// Parse triangle element attributes
pub fn parse_triangle<R: std::io::BufRead>(
    _reader: &Reader<R>,
    e: &quick_xml::events::BytesStart,
) -> Result<Triangle> {
    let mut v1_opt: Option<usize> = None;
    let mut v2_opt: Option<usize> = None;
    let mut v3_opt: Option<usize> = None;

    let parse_usize = |value: &[u8]| -> Result<usize> {
        let value_str = std::str::from_utf8(value).map_err(|e| Error::InvalidXml(e.to_string()))?;
        Ok(value_str.parse::<usize>()?)
    };

    for attr_result in e.attributes() {
        let attr = attr_result?;
        match attr.key.as_ref() {
            b"v1" => v1_opt = Some(parse_usize(&attr.value)?),
            b"v2" => v2_opt = Some(parse_usize(&attr.value)?),
            b"v3" => v3_opt = Some(parse_usize(&attr.value)?),
            _ => {}
        }
    }

    let v1 = v1_opt.ok_or_else(|| Error::missing_attribute("triangle", "v1"))?;
    let v2 = v2_opt.ok_or_else(|| Error::missing_attribute("triangle", "v2"))?;
    let v3 = v3_opt.ok_or_else(|| Error::missing_attribute("triangle", "v3"))?;

    Ok(Triangle::new(v1, v2, v3))
}

/// Parse component element attributes
pub fn parse_component<R: std::io::BufRead>(
    reader: &Reader<R>,
    e: &quick_xml::events::BytesStart,
) -> Result<Component> {
    let attrs = parse_attributes(reader, e)?;

    let objectid = attrs
        .get("objectid")
        .ok_or_else(|| Error::missing_attribute("component", "objectid"))?
        .parse::<usize>()?;

    let mut component = Component::new(objectid);
    component.transform = attrs.get("transform").and_then(|t| Transform3x4::parse(t));
    component.path = get_attr_by_local_name(&attrs, "path").filter(|p| !p.is_empty());

    Ok(component)
}

/// Parse build item element attributes
pub fn parse_build_item<R: std::io::BufRead>(
    reader: &Reader<R>,
    e: &quick_xml::events::BytesStart,
) -> Result<BuildItem> {
    let attrs = parse_attributes(reader, e)?;

    let objectid = attrs
        .get("objectid")
        .ok_or_else(|| Error::missing_attribute("item", "objectid"))?
        .parse::<usize>()?;

    let mut item = BuildItem::new(objectid);
    item.transform = attrs.get("transform").and_then(|t| Transform3x4::parse(t));
    // Bambu-style parked plates are marked printable="0"
    item.printable = attrs
        .get("printable")
        .map(|v| v.trim() != "0")
        .unwrap_or(true);

    Ok(item)
}
