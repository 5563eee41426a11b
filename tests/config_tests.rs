use std::io::Write;

use radmedium::SimulationConfig;
use radmedium::sim::wavelength::GridSpacing;

#[test]
fn test_config_file_roundtrip() {
    let mut config = SimulationConfig::new();
    config.max_dynamic_state_iterations = 25;
    config.has_moving_media = true;
    config.radiation_field_wlg.num_bins = 40;
    config.radiation_field_wlg.spacing = GridSpacing::Linear;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(config.to_json_string().unwrap().as_bytes())
        .unwrap();

    let loaded = SimulationConfig::from_json_file(file.path()).unwrap();
    assert_eq!(loaded.max_dynamic_state_iterations, 25);
    assert!(loaded.has_moving_media);
    assert!(!loaded.has_constant_perceived_wavelength());
    assert_eq!(loaded.radiation_field_wlg().unwrap().num_bins(), 40);
    assert_eq!(loaded.radiation_field_wlg.spacing, GridSpacing::Linear);
}

#[test]
fn test_partial_config_file_uses_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "hubble_expansion_rate": 2.3e-27, "radiation_field_wlg": {{ "num_bins": 5 }} }}"#)
        .unwrap();

    let loaded = SimulationConfig::from_json_file(file.path()).unwrap();
    assert_eq!(loaded.min_dynamic_state_iterations, 1);
    assert_eq!(loaded.max_dynamic_state_iterations, 10);
    assert_eq!(loaded.radiation_field_wlg.num_bins, 5);
    assert!(!loaded.has_constant_perceived_wavelength());
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "min_dynamic_state_iterations": 5, "max_dynamic_state_iterations": 2 }}"#
    )
    .unwrap();
    let err = SimulationConfig::from_json_file(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("min=5, max=2"));
}

#[test]
fn test_missing_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");
    let err = SimulationConfig::from_json_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to open file"));
}
