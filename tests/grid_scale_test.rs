//! Copy-grid and uniform-scale integration tests

mod common;

use common::*;
use plate3mf::{Container, MachineProfile, apply_copies, apply_uniform_scale};

#[test]
fn test_apply_copies_builds_centered_grid() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();
    let profile = MachineProfile::snapmaker_u1();

    let outcome = apply_copies(&container, 4, 5.0, &profile).unwrap();
    assert_eq!((outcome.plan.cols, outcome.plan.rows), (2, 2));
    assert!(outcome.plan.fits_bed);
    assert!(outcome.directives.disable_arrange);
    assert!(outcome.directives.disable_orient);
    // Four toolheads: prime tower comes on for copy grids
    assert!(outcome.directives.enable_prime_tower);

    let copied = Container::from_bytes(&outcome.archive).unwrap();
    assert_eq!(copied.build.items.len(), 4);

    // All copies reference the same object and sit fully on the bed
    let mut xs: Vec<f64> = Vec::new();
    let mut ys: Vec<f64> = Vec::new();
    for item in &copied.build.items {
        assert_eq!(item.objectid, 1);
        let [x, y, _] = item.effective_transform().translation_array();
        assert!(x >= 0.0 && x + 20.0 <= 270.0);
        assert!(y >= 0.0 && y + 20.0 <= 270.0);
        xs.push(x);
        ys.push(y);
    }

    // 20mm cube + 5mm spacing: neighboring cells are 25mm apart and the
    // 45mm grid is centered on the 270mm bed
    xs.sort_by(|a, b| a.total_cmp(b));
    ys.sort_by(|a, b| a.total_cmp(b));
    assert!((xs[2] - xs[0] - 25.0).abs() < 1e-6);
    assert!((ys[2] - ys[0] - 25.0).abs() < 1e-6);
    assert!((xs[0] - 112.5).abs() < 1e-6);
    assert!((ys[0] - 112.5).abs() < 1e-6);
}

#[test]
fn test_apply_copies_rejects_overflow() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();
    let profile = MachineProfile::snapmaker_u1();

    // 20mm cube, 5mm spacing: 11 columns x 11 rows fit a 270mm bed
    let err = apply_copies(&container, 122, 5.0, &profile).unwrap_err();
    assert!(err.to_string().contains("do not fit build plate"));
    assert!(err.to_string().contains("Reduce copies or scale"));
}

#[test]
fn test_single_copy_is_passthrough() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();
    let profile = MachineProfile::snapmaker_u1();

    let outcome = apply_copies(&container, 1, 5.0, &profile).unwrap();
    assert!(!outcome.directives.disable_arrange);
    let copied = Container::from_bytes(&outcome.archive).unwrap();
    assert_eq!(copied.build.items.len(), 1);
    assert_eq!(
        copied.build.items[0].effective_transform().translation_array(),
        [125.0, 125.0, 0.0]
    );
}

#[test]
fn test_uniform_scale_on_mesh_item() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();
    let profile = MachineProfile::snapmaker_u1();

    let outcome = apply_uniform_scale(&container, 200.0, &profile).unwrap();
    assert!(outcome.report.fits);

    let scaled = Container::from_bytes(&outcome.archive).unwrap();
    let t = scaled.build.items[0].effective_transform();
    // Linear part doubled, placement translation untouched
    assert_eq!(t.0[0], 2.0);
    assert_eq!(t.translation_array(), [125.0, 125.0, 0.0]);

    let report = &outcome.report;
    let bounds = report.bounds.as_ref().unwrap();
    assert!((bounds.size()[0] - 40.0).abs() < 1e-9);
}

#[test]
fn test_uniform_scale_grows_assembly_offsets() {
    let container = Container::from_bytes(&assembly_archive()).unwrap();
    let profile = MachineProfile::snapmaker_u1();

    let outcome = apply_uniform_scale(&container, 200.0, &profile).unwrap();
    let scaled = Container::from_bytes(&outcome.archive).unwrap();

    // Component offset doubled along with component geometry
    let assembly = scaled.main_object(3).unwrap();
    let offsets: Vec<[f64; 3]> = assembly
        .components
        .iter()
        .map(|c| c.transform.unwrap().translation_array())
        .collect();
    assert!(offsets.contains(&[60.0, 0.0, 0.0]));

    // Item placement unchanged; footprint 40mm -> 80mm
    let t = scaled.build.items[0].effective_transform();
    assert_eq!(t.translation_array(), [100.0, 100.0, 0.0]);
    let bounds = outcome.report.bounds.as_ref().unwrap();
    assert!((bounds.size()[0] - 80.0).abs() < 1e-9);
    assert_eq!(bounds.min[0], 100.0);
}

#[test]
fn test_scale_100_percent_is_noop() {
    let container = Container::from_bytes(&assembly_archive()).unwrap();
    let profile = MachineProfile::snapmaker_u1();

    let outcome = apply_uniform_scale(&container, 100.0, &profile).unwrap();
    let unscaled = Container::from_bytes(&outcome.archive).unwrap();
    let assembly = unscaled.main_object(3).unwrap();
    assert!(
        assembly
            .components
            .iter()
            .any(|c| c.transform.unwrap().translation_array() == [30.0, 0.0, 0.0])
    );
}

#[test]
fn test_scale_rejects_nonpositive_percent() {
    let container = Container::from_bytes(&single_plate_archive()).unwrap();
    let profile = MachineProfile::snapmaker_u1();
    let err = apply_uniform_scale(&container, 0.0, &profile).unwrap_err();
    assert!(err.to_string().contains("must be positive"));
}
