//! Config Validation Tests
//!
//! Typo detection and full-document validation of the service config,
//! exercised independently from the monitors and the pipeline.

use engine_room::config::validation::{known_config_keys, suggest_correction, validate_unknown_keys};
use engine_room::config::{ConfigError, ServiceConfig};

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_engine_threshold_warns_with_suggestion() {
    let toml_str = r#"
[[engines]]
id = "gs1"
rpm_sensor = "gs1_rpm"
oil_sensor = "gs1_oil"

[engines.rpm]
too_fats = 2600.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("too_fats"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("engines.rpm.too_fast"));
    assert!(warnings[0].to_string().contains("did you mean 'engines.rpm.too_fast'?"));
}

#[test]
fn typo_in_timing_section_warns() {
    let toml_str = r#"
[timing]
sweep_interval_sec = 5
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].suggestion.as_deref(), Some("timing.sweep_interval_secs"));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[service]
name = "mv-aurora"
data_dir = "/var/lib/engine-room"
state_retention_days = 14

[timing]
sweep_interval_secs = 5
snapshot_interval_secs = 30

[debounce]
stability_threshold = 4

[[engines]]
id = "gs1"
rpm_sensor = "gs1_rpm"
oil_sensor = "gs1_oil"
pressure_when_closed = false
run_grace_secs = 15

[[pumps]]
id = "pmp_bilge"
switch_sensor = "pmp_bilge_switch"
off_too_long_secs = 86400

[[tanks]]
id = "ft1"
level_sensor = "ft1_level"
group = "fuel"

[tanks.levels]
very_low = 5.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
}

#[test]
fn retention_defaults_and_zero_keeps_snapshots() {
    let config = ServiceConfig::from_toml_str("[service]\nname = \"mv-aurora\"\n").unwrap();
    assert_eq!(
        config.service.state_retention(),
        Some(std::time::Duration::from_secs(30 * 86_400))
    );

    let config = ServiceConfig::from_toml_str("[service]\nstate_retention_days = 0\n").unwrap();
    assert!(config.service.state_retention().is_none());
}

#[test]
fn far_off_key_gets_no_suggestion() {
    let known = known_config_keys();
    assert!(suggest_correction("completely_unrelated", &known).is_none());
    assert_eq!(
        suggest_correction("pumps.switch_senor", &known).as_deref(),
        Some("pumps.switch_sensor")
    );
}

// ============================================================================
// Document Validation
// ============================================================================

#[test]
fn partial_document_keeps_defaults_for_missing_fields() {
    let config = ServiceConfig::from_toml_str(
        r#"
[[pumps]]
id = "pmp_fw"
switch_sensor = "pmp_fw_switch"
"#,
    )
    .unwrap();

    assert_eq!(config.pumps.len(), 1);
    assert_eq!(config.pumps[0].on_too_long_secs, 300);
    assert!(config.pumps[0].off_too_long_secs.is_none());
    assert_eq!(config.debounce.stability_threshold, 5);
    assert!(!config.engines.is_empty(), "engines fall back to the defaults");
}

#[test]
fn duplicate_sensor_across_equipment_is_rejected() {
    let err = ServiceConfig::from_toml_str(
        r#"
[[engines]]
id = "gs1"
rpm_sensor = "shared"
oil_sensor = "gs1_oil"

[[pumps]]
id = "pmp_fw"
switch_sensor = "shared"
"#,
    )
    .unwrap_err();

    match err {
        ConfigError::Validation(errors) => {
            assert_eq!(errors.len(), 1, "errors: {:?}", errors);
            assert!(errors[0].contains("duplicate device id 'shared'"));
        }
        other => panic!("expected validation error, got {}", other),
    }
}

#[test]
fn non_increasing_thresholds_and_zero_durations_are_all_reported() {
    let err = ServiceConfig::from_toml_str(
        r#"
[timing]
sweep_interval_secs = 0

[[engines]]
id = "gs1"
rpm_sensor = "gs1_rpm"
oil_sensor = "gs1_oil"
stop_grace_secs = 0

[engines.temperature]
hot = 95.0
too_hot = 90.0

[[tanks]]
id = "wt1"
level_sensor = "wt1_level"
min_distance = 300.0
max_distance = 100.0
"#,
    )
    .unwrap_err();

    let ConfigError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.len(), 4, "errors: {:?}", errors);
    assert!(errors.iter().any(|e| e.contains("timing.sweep_interval_secs")));
    assert!(errors.iter().any(|e| e.contains("engines.gs1.temperature")));
    assert!(errors.iter().any(|e| e.contains("engines.gs1.stop_grace_secs")));
    assert!(errors.iter().any(|e| e.contains("min_distance")));
}

#[test]
fn malformed_document_is_a_parse_error() {
    let err = ServiceConfig::from_toml_str("[[engines]]\nid = 7\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ServiceConfig::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}

#[test]
fn serialized_default_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine_room.toml");
    let original = ServiceConfig::default();
    std::fs::write(&path, original.to_toml().unwrap()).unwrap();

    let loaded = ServiceConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded.engines.len(), original.engines.len());
    assert_eq!(loaded.tanks[0].group, original.tanks[0].group);
}
