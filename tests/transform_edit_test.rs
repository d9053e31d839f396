//! Transform edit and bounds-enforcement integration tests

mod common;

use common::*;
use plate3mf::validate::enforce_transformed_bounds;
use plate3mf::{Container, MachineProfile, ObjectTransformEdit, apply_object_transforms};

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
fn test_translate_rewrites_item_transform() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();
    let outcome = apply_object_transforms(&container, &[edit(1, 10.0, -5.0, 0.0)]).unwrap();

    assert_eq!(outcome.applied.len(), 1);
    assert!(outcome.directives.disable_arrange);
    assert!(outcome.directives.disable_orient);

    let edited = Container::from_bytes(&outcome.archive).unwrap();
    assert_eq!(
        edited.build.items[0].effective_transform().translation_array(),
        [135.0, 120.0, 0.0]
    );
}

#[test]
fn test_rotation_composes_into_linear_part() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();
    let outcome = apply_object_transforms(&container, &[edit(1, 0.0, 0.0, 90.0)]).unwrap();

    let edited = Container::from_bytes(&outcome.archive).unwrap();
    let t = edited.build.items[0].effective_transform();
    assert!((t.rotation_z_estimate_deg() - 90.0).abs() < 1e-6);
    // Translation untouched by pure rotation
    assert_eq!(t.translation_array(), [125.0, 125.0, 0.0]);
}

#[test]
fn test_untouched_parts_survive_byte_identical() {
    let container = Container::from_bytes(&multi_plate_archive()).unwrap();
    let outcome = apply_object_transforms(&container, &[edit(1, 3.0, 0.0, 0.0)]).unwrap();
    let edited = Container::from_bytes(&outcome.archive).unwrap();

    for name in ["Metadata/plate_1.json", "Metadata/plate_2.json"] {
        assert_eq!(edited.raw_part(name), container.raw_part(name));
    }

    // The other build item's tag is untouched text
    let model = std::str::from_utf8(edited.raw_part(MODEL_PATH).unwrap()).unwrap();
    assert!(model.contains(r#"<item objectid="2" transform="1 0 0 0 1 0 0 0 1 432.2 125 0"/>"#));
}

#[test]
fn test_assemble_transforms_patched_with_same_delta() {
    let container = Container::from_bytes(&multi_plate_archive()).unwrap();
    let outcome = apply_object_transforms(&container, &[edit(2, 5.0, 0.0, 0.0)]).unwrap();
    let edited = Container::from_bytes(&outcome.archive).unwrap();

    let vendor = edited.vendor.as_ref().unwrap();
    let by_object = vendor.assemble_transforms_by_object_id();
    assert!((by_object["2"].translation_array()[0] - 437.2).abs() < 1e-6);
    // The other assemble item keeps its translation
    assert_eq!(by_object["1"].translation_array(), [125.0, 125.0, 0.0]);
}

#[test]
fn test_all_noop_edits_return_unchanged_archive() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();
    let outcome = apply_object_transforms(&container, &[edit(1, 0.0, 0.0, 0.0)]).unwrap();

    assert!(outcome.applied.is_empty());
    assert!(!outcome.directives.disable_arrange);
    let edited = Container::from_bytes(&outcome.archive).unwrap();
    assert_eq!(
        edited.build.items[0].effective_transform().translation_array(),
        [125.0, 125.0, 0.0]
    );
}

#[test]
fn test_on_bed_move_passes_enforcement() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();
    let outcome = apply_object_transforms(&container, &[edit(1, 20.0, 20.0, 0.0)]).unwrap();
    let edited = Container::from_bytes(&outcome.archive).unwrap();
    let profile = MachineProfile::snapmaker_u1();

    enforce_transformed_bounds(&edited, Some(&container), None, &profile).unwrap();
}

#[test]
fn test_off_bed_move_is_rejected() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();
    let outcome = apply_object_transforms(&container, &[edit(1, 5000.0, 0.0, 0.0)]).unwrap();
    let edited = Container::from_bytes(&outcome.archive).unwrap();
    let profile = MachineProfile::snapmaker_u1();

    let err = enforce_transformed_bounds(&edited, Some(&container), None, &profile).unwrap_err();
    assert!(err.to_string().contains("fully inside the print volume"));
}

#[test]
fn test_packed_plate_edit_passes_enforcement() {
    // Plate 2 lives far off the bed in packed project space; a small move
    // must still be accepted because enforcement normalizes against the
    // baseline plate translation.
    let container = Container::from_bytes(&multi_plate_archive()).unwrap();
    let outcome = apply_object_transforms(&container, &[edit(2, 5.0, 0.0, 0.0)]).unwrap();
    let edited = Container::from_bytes(&outcome.archive).unwrap();
    let profile = MachineProfile::snapmaker_u1();

    enforce_transformed_bounds(&edited, Some(&container), Some(2), &profile).unwrap();
}

#[test]
fn test_edit_object_id_crosscheck() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();
    let mut e = edit(1, 1.0, 0.0, 0.0);
    e.object_id = Some("1".to_string());
    apply_object_transforms(&container, std::slice::from_ref(&e)).unwrap();

    e.object_id = Some("2".to_string());
    let err = apply_object_transforms(&container, &[e]).unwrap_err();
    assert!(err.to_string().contains("object_id mismatch"));
}
