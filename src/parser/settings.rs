//! Vendor settings parsing (`Metadata/model_settings.config`)
//!
//! Bambu/Orca exports keep a second placement layer here: `assemble_item`
//! records mirror the core build transforms, and `plate` blocks carry plate
//! ids, names, and object assignments. This part is optional; parse failures
//! degrade the container to core-only data instead of failing the whole
//! parse.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};
use crate::model::{AssembleItem, PlateSettings, VendorSettings};
use crate::transform::Transform3x4;

use super::parse_attributes;

/// Parse the vendor settings XML
pub fn parse_model_settings(xml: &str) -> Result<VendorSettings> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut settings = VendorSettings::default();
    let mut current_plate: Option<PlateSettings> = None;
    let mut in_model_instance = false;
    let mut current_object_id: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(Error::Xml)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"plate" => {
                    current_plate = Some(PlateSettings::default());
                }
                b"model_instance" => {
                    in_model_instance = true;
                }
                b"assemble_item" => {
                    let attrs = parse_attributes(&reader, e)?;
                    if let Some(object_id) = attrs.get("object_id") {
                        settings.assemble_items.push(AssembleItem {
                            object_id: object_id.clone(),
                            instance_id: attrs.get("instance_id").cloned(),
                            transform: attrs.get("transform").and_then(|t| Transform3x4::parse(t)),
                        });
                    }
                }
                b"object" => {
                    let attrs = parse_attributes(&reader, e)?;
                    current_object_id = attrs.get("id").cloned();
                    if let (Some(id), Some(name)) = (attrs.get("id"), attrs.get("name")) {
                        if !name.is_empty() {
                            settings.object_names.insert(id.clone(), name.clone());
                        }
                    }
                }
                b"metadata" => {
                    let attrs = parse_attributes(&reader, e)?;
                    if let (Some(key), Some(value)) = (attrs.get("key"), attrs.get("value")) {
                        if in_model_instance {
                            if key == "object_id" {
                                if let Some(plate) = current_plate.as_mut() {
                                    plate.object_ids.push(value.clone());
                                }
                            }
                        } else if let Some(plate) = current_plate.as_mut() {
                            match key.as_str() {
                                "plater_id" => plate.plater_id = value.trim().parse().ok(),
                                "plater_name" => {
                                    if !value.is_empty() {
                                        plate.plater_name = Some(value.clone());
                                    }
                                }
                                _ => {}
                            }
                        } else if key == "name" {
                            if let Some(id) = current_object_id.as_ref() {
                                if !value.is_empty() {
                                    settings.object_names.insert(id.clone(), value.clone());
                                }
                            }
                        }
                    }
                }
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"plate" => {
                    if let Some(plate) = current_plate.take() {
                        settings.plates.push(plate);
                    }
                }
                b"model_instance" => {
                    in_model_instance = false;
                }
                b"object" => {
                    current_object_id = None;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<config>
  <object id="2" name="Bracket.stl">
    <metadata key="name" value="Bracket.stl"/>
  </object>
  <object id="4">
    <metadata key="name" value="Lid"/>
  </object>
  <plate>
    <metadata key="plater_id" value="1"/>
    <metadata key="plater_name" value="Main Plate"/>
    <model_instance>
      <metadata key="object_id" value="2"/>
      <metadata key="instance_id" value="0"/>
    </model_instance>
  </plate>
  <plate>
    <metadata key="plater_id" value="2"/>
    <model_instance>
      <metadata key="object_id" value="4"/>
    </model_instance>
  </plate>
  <assemble>
    <assemble_item object_id="2" instance_id="0" transform="1 0 0 0 1 0 0 0 1 135 135 10" offset="0 0 0"/>
    <assemble_item object_id="4" instance_id="0" transform="1 0 0 0 1 0 0 0 1 400 135 10" offset="0 0 0"/>
  </assemble>
</config>"#;

    #[test]
    fn test_parse_full_settings() {
        let settings = parse_model_settings(SETTINGS).unwrap();

        assert_eq!(settings.assemble_items.len(), 2);
        assert_eq!(settings.assemble_items[0].object_id, "2");
        assert_eq!(
            settings.assemble_items[1].transform.unwrap().translation_array(),
            [400.0, 135.0, 10.0]
        );

        assert_eq!(settings.plates.len(), 2);
        assert_eq!(settings.plates[0].plater_id, Some(1));
        assert_eq!(settings.plates[0].plater_name.as_deref(), Some("Main Plate"));
        assert_eq!(settings.plates[0].object_ids, vec!["2".to_string()]);
        assert_eq!(settings.plates[1].plater_name, None);

        assert_eq!(
            settings.object_names.get("2").map(String::as_str),
            Some("Bracket.stl")
        );
        assert_eq!(settings.object_names.get("4").map(String::as_str), Some("Lid"));

        assert_eq!(settings.plate_for_object("4"), Some(2));
    }

    #[test]
    fn test_instance_object_id_not_misread_as_plate_metadata() {
        // `object_id` inside model_instance must land in the plate's
        // object list, never overwrite plate-level keys.
        let settings = parse_model_settings(SETTINGS).unwrap();
        assert_eq!(settings.plates[0].plater_id, Some(1));
        assert_eq!(settings.plates[1].object_ids, vec!["4".to_string()]);
    }

    #[test]
    fn test_assemble_item_without_transform() {
        let xml = r#"<config><assemble><assemble_item object_id="7"/></assemble></config>"#;
        let settings = parse_model_settings(xml).unwrap();
        assert_eq!(settings.assemble_items.len(), 1);
        assert!(settings.assemble_items[0].transform.is_none());
    }
}
