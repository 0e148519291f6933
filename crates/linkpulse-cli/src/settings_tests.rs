use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use linkpulse_core::ConfigError;

use crate::settings::Settings;

fn make_temp_dir(name: &str) -> PathBuf {
    let mut path = env::temp_dir();
    let uniq = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("unix epoch")
        .as_nanos();
    path.push(format!("linkpulse-tests-{name}-{uniq}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

#[test]
fn saved_settings_load_back() {
    // Arrange
    let dir = make_temp_dir("round-trip");
    let path = dir.join("nested").join("settings.json");
    let mut settings = Settings::default();
    settings
        .update(Some("8.8.8.8".to_string()), Some(45))
        .expect("in range");

    // Act
    settings.save(&path).expect("save");
    let loaded = Settings::load(&path).expect("load");

    // Assert
    assert_eq!(loaded, settings);
    assert_eq!(loaded.speed_test_interval, Some(45));
    let raw = fs::read_to_string(&path).expect("read back");
    assert!(raw.contains("\"ping_target\": \"8.8.8.8\""));
}

#[test]
fn missing_file_means_nothing_stored() {
    let dir = make_temp_dir("missing");

    let loaded = Settings::load(&dir.join("settings.json")).expect("load");

    assert_eq!(loaded, Settings::default());
}

#[test]
fn partial_update_keeps_other_values() {
    // Arrange
    let mut settings = Settings {
        ping_target: Some("1.0.0.1".to_string()),
        speed_test_interval: Some(30),
    };

    // Act
    let changed = settings.update(None, Some(120)).expect("in range");
    let unchanged = settings.update(None, None).expect("nothing given");

    // Assert
    assert!(changed);
    assert!(!unchanged);
    assert_eq!(settings.ping_target.as_deref(), Some("1.0.0.1"));
    assert_eq!(settings.speed_test_interval, Some(120));
}

#[test]
fn interval_outside_five_to_1440_minutes_is_rejected() {
    // Arrange
    let mut settings = Settings::default();

    // Act
    let too_short = settings.update(Some("8.8.8.8".to_string()), Some(4));
    let too_long = settings.update(None, Some(1441));
    let lower_edge = settings.clone().update(None, Some(5));
    let upper_edge = settings.clone().update(None, Some(1440));

    // Assert
    assert_eq!(too_short, Err(ConfigError::ThroughputIntervalRange(4)));
    assert_eq!(too_long, Err(ConfigError::ThroughputIntervalRange(1441)));
    assert_eq!(settings, Settings::default(), "rejected update changes nothing");
    assert_eq!(lower_edge, Ok(true));
    assert_eq!(upper_edge, Ok(true));
}

#[test]
fn out_of_range_file_fails_to_load() {
    let dir = make_temp_dir("out-of-range");
    let path = dir.join("settings.json");
    fs::write(&path, r#"{"speed_test_interval": 2}"#).expect("write settings");

    assert!(Settings::load(&path).is_err());
}

#[test]
fn describe_lists_unset_values() {
    let settings = Settings {
        ping_target: None,
        speed_test_interval: Some(30),
    };

    let text = settings.describe(&PathBuf::from("/tmp/settings.json"));

    assert!(text.contains("ping target          : not set"));
    assert!(text.contains("speed test interval  : 30 minutes"));
}
