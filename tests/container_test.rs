//! Container parsing integration tests

mod common;

use common::*;
use plate3mf::Container;

#[test]
fn test_parse_single_plate() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();

    assert_eq!(container.unit_scale, 1.0);
    assert!(!container.is_multi_plate());
    assert_eq!(container.build.items.len(), 1);

    let object = container.main_object(1).unwrap();
    assert_eq!(object.name.as_deref(), Some("Widget"));
    let mesh = object.mesh.as_ref().unwrap();
    assert_eq!(mesh.vertices.len(), 8);
    assert_eq!(mesh.triangles.len(), 2);

    let item = &container.build.items[0];
    assert_eq!(item.objectid, 1);
    assert_eq!(
        item.effective_transform().translation_array(),
        [125.0, 125.0, 0.0]
    );
    assert!(container.plates().is_empty());
}

#[test]
fn test_parse_multi_plate_with_vendor_metadata() {
    let container = Container::from_bytes(&multi_plate_archive()).unwrap();

    assert!(container.is_multi_plate());
    let plates = container.plates();
    assert_eq!(plates.len(), 2);

    // Plate 1 has a vendor plate name, plate 2 falls back to the vendor
    // object name
    assert_eq!(plates[0].plate_name, "Front Plate");
    assert_eq!(plates[1].plate_name, "Lid.stl");
    assert_eq!(plates[1].translation(), [432.2, 125.0, 0.0]);

    // Assemble transforms survive with their object ids
    let vendor = container.vendor.as_ref().unwrap();
    let by_object = vendor.assemble_transforms_by_object_id();
    assert_eq!(by_object["2"].translation_array(), [432.2, 125.0, 0.0]);
    assert_eq!(vendor.plate_for_object("2"), Some(2));

    // plate_N.json evidence is indexed
    assert!(container.plate_json_ids.contains(&1));
    assert!(container.plate_json_ids.contains(&2));
    assert_eq!(container.plate_json_ids.len(), 2);
}

#[test]
fn test_unit_scale_applied_to_vertices_and_items() {
    let model = model_xml(
        "inch",
        &[cube_object(1, 1.0, None)],
        &[build_item(1, &translation(2.0, 0.0, 0.0))],
    );
    let archive = build_archive(&[(MODEL_PATH, &model)]);
    let container = Container::from_bytes(&archive).unwrap();

    assert_eq!(container.unit_scale, 25.4);
    let mesh = container.main_object(1).unwrap().mesh.as_ref().unwrap();
    let max_x = mesh
        .vertices
        .iter()
        .map(|v| v.x)
        .fold(f64::NEG_INFINITY, f64::max);
    assert!((max_x - 25.4).abs() < 1e-9);

    let t = container.build.items[0].effective_transform();
    assert!((t.translation_array()[0] - 50.8).abs() < 1e-9);
}

#[test]
fn test_parse_from_file_on_disk() {
    let mut file = tempfile::tempfile().unwrap();
    std::io::Write::write_all(&mut file, &single_plate_archive()).unwrap();
    std::io::Seek::rewind(&mut file).unwrap();

    let container = Container::from_reader(file).unwrap();
    assert_eq!(container.build.items.len(), 1);
    assert_eq!(
        container.main_object(1).unwrap().name.as_deref(),
        Some("Widget")
    );
}

#[test]
fn test_missing_model_part_is_error() {
    let archive = build_archive(&[("Metadata/whatever.txt", "hi")]);
    let err = Container::from_bytes(&archive).unwrap_err();
    assert!(err.to_string().contains("3D/3dmodel.model"));
}

#[test]
fn test_missing_build_section_is_error() {
    let model = r#"<?xml version="1.0"?>
<model unit="millimeter" xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02">
  <resources/>
</model>"#;
    let archive = build_archive(&[(MODEL_PATH, model)]);
    let err = Container::from_bytes(&archive).unwrap_err();
    assert!(err.to_string().contains("missing build section"));
}

#[test]
fn test_garbage_bytes_are_zip_error() {
    let err = Container::from_bytes(b"not a zip at all").unwrap_err();
    assert!(err.to_string().contains("E1002"));
}

#[test]
fn test_raw_parts_preserved_in_order() {
    let container = Container::from_bytes(&multi_plate_archive()).unwrap();
    let names: Vec<&str> = container.parts.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "3D/3dmodel.model",
            "Metadata/model_settings.config",
            "Metadata/plate_1.json",
            "Metadata/plate_2.json",
        ]
    );
    assert_eq!(container.raw_part("Metadata/plate_1.json"), Some("{}".as_bytes()));
}
