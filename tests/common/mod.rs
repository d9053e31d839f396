//! Shared fixture builders for integration tests
//!
//! All archives are built in memory: a ZIP with the core model part plus
//! whatever vendor metadata a test needs. The cube objects carry all eight
//! corner vertices so bounds checks see the full footprint.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const MODEL_PATH: &str = "3D/3dmodel.model";
pub const MODEL_SETTINGS_PATH: &str = "Metadata/model_settings.config";

/// Build an in-memory ZIP archive from named parts
pub fn build_archive(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in parts {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A mesh object: an axis-aligned cube of the given size at the local origin
pub fn cube_object(id: usize, size: f64, name: Option<&str>) -> String {
    let name_attr = name
        .map(|n| format!(" name=\"{}\"", n))
        .unwrap_or_default();
    let s = size;
    format!(
        r#"<object id="{id}" type="model"{name_attr}>
  <mesh>
    <vertices>
      <vertex x="0" y="0" z="0"/>
      <vertex x="{s}" y="0" z="0"/>
      <vertex x="{s}" y="{s}" z="0"/>
      <vertex x="0" y="{s}" z="0"/>
      <vertex x="0" y="0" z="{s}"/>
      <vertex x="{s}" y="0" z="{s}"/>
      <vertex x="{s}" y="{s}" z="{s}"/>
      <vertex x="0" y="{s}" z="{s}"/>
    </vertices>
    <triangles>
      <triangle v1="0" v2="1" v3="2"/>
      <triangle v1="4" v2="5" v3="6"/>
    </triangles>
  </mesh>
</object>"#
    )
}

/// An assembly object referencing components with offsets
pub fn assembly_object(id: usize, components: &[(usize, &str)]) -> String {
    let body: Vec<String> = components
        .iter()
        .map(|(oid, transform)| {
            format!(r#"      <component objectid="{oid}" transform="{transform}"/>"#)
        })
        .collect();
    format!(
        "<object id=\"{id}\" type=\"model\">\n    <components>\n{}\n    </components>\n  </object>",
        body.join("\n")
    )
}

/// A build item tag
pub fn build_item(objectid: usize, transform: &str) -> String {
    if transform.is_empty() {
        format!(r#"<item objectid="{objectid}"/>"#)
    } else {
        format!(r#"<item objectid="{objectid}" transform="{transform}"/>"#)
    }
}

/// The core model part XML
pub fn model_xml(unit: &str, objects: &[String], items: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<model unit="{unit}" xml:lang="en-US" xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02">
  <resources>
  {}
  </resources>
  <build>
    {}
  </build>
</model>"#,
        objects.join("\n  "),
        items.join("\n    ")
    )
}

/// Translation-only 3MF transform string
pub fn translation(x: f64, y: f64, z: f64) -> String {
    format!("1 0 0 0 1 0 0 0 1 {x} {y} {z}")
}

/// A single-plate archive: one 20mm cube placed at (125, 125)
pub fn single_plate_archive() -> Vec<u8> {
    let model = model_xml(
        "millimeter",
        &[cube_object(1, 20.0, Some("Widget"))],
        &[build_item(1, &translation(125.0, 125.0, 0.0))],
    );
    build_archive(&[(MODEL_PATH, &model)])
}

/// A packed multi-plate archive: two 20mm cubes one bed-grid step apart,
/// with vendor plate metadata, assemble transforms, and plate JSON parts
pub fn multi_plate_archive() -> Vec<u8> {
    let model = model_xml(
        "millimeter",
        &[
            cube_object(1, 20.0, Some("Bracket")),
            cube_object(2, 20.0, Some("Lid")),
        ],
        &[
            build_item(1, &translation(125.0, 125.0, 0.0)),
            build_item(2, &translation(432.2, 125.0, 0.0)),
        ],
    );
    let settings = r#"<?xml version="1.0" encoding="UTF-8"?>
<config>
  <object id="1">
    <metadata key="name" value="Bracket.stl"/>
  </object>
  <object id="2">
    <metadata key="name" value="Lid.stl"/>
  </object>
  <plate>
    <metadata key="plater_id" value="1"/>
    <metadata key="plater_name" value="Front Plate"/>
    <model_instance>
      <metadata key="object_id" value="1"/>
      <metadata key="instance_id" value="0"/>
    </model_instance>
  </plate>
  <plate>
    <metadata key="plater_id" value="2"/>
    <model_instance>
      <metadata key="object_id" value="2"/>
      <metadata key="instance_id" value="0"/>
    </model_instance>
  </plate>
  <assemble>
    <assemble_item object_id="1" instance_id="0" transform="1 0 0 0 1 0 0 0 1 125 125 0" offset="0 0 0"/>
    <assemble_item object_id="2" instance_id="0" transform="1 0 0 0 1 0 0 0 1 432.2 125 0" offset="0 0 0"/>
  </assemble>
</config>"#;
    build_archive(&[
        (MODEL_PATH, &model),
        (MODEL_SETTINGS_PATH, settings),
        ("Metadata/plate_1.json", "{}"),
        ("Metadata/plate_2.json", "{}"),
    ])
}

/// An archive whose single build item is an assembly of two cubes, the
/// second offset 30mm on X
pub fn assembly_archive() -> Vec<u8> {
    let model = model_xml(
        "millimeter",
        &[
            cube_object(1, 10.0, None),
            cube_object(2, 10.0, None),
            assembly_object(3, &[(1, "1 0 0 0 1 0 0 0 1 0 0 0"), (2, "1 0 0 0 1 0 0 0 1 30 0 0")]),
        ],
        &[build_item(3, &translation(100.0, 100.0, 0.0))],
    );
    build_archive(&[(MODEL_PATH, &model)])
}
