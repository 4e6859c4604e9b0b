//! Calibration resource handling as seen from a session.

use field_logger::calibration::{
    CalibrationSettings, CalibrationStore, SessionPlan, DIVISION_FACTOR, FOLDER_ID, LOG_INTERVAL,
};
use field_logger::transform::ValueTransform;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn hand_edited_file_with_bad_line() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("calibration_settings.txt");
    std::fs::write(&path, "log_interval:5\nfolder_id:abc\nbadline\ndivision_factor:2\n").unwrap();

    let settings = CalibrationStore::new(&path).load_required().unwrap();
    assert_eq!(settings.len(), 3);
    assert_eq!(settings.get(LOG_INTERVAL), Some("5"));
    assert_eq!(settings.get(FOLDER_ID), Some("abc"));
    assert_eq!(settings.get(DIVISION_FACTOR), Some("2"));

    let plan = SessionPlan::from_settings(&settings).unwrap();
    assert!(!plan.is_bounded());
    assert_eq!(plan.log_interval, Duration::from_secs(5));
    assert_eq!(plan.transform, ValueTransform::Scaled { factor: 2.0 });
}

#[test]
fn saved_file_is_plain_key_value_lines() {
    let tmp = TempDir::new().unwrap();
    let store = CalibrationStore::new(tmp.path().join("nested").join("calibration_settings.txt"));
    store
        .save(
            &CalibrationSettings::continuous(5, "abc")
                .with_window("01-06-2024", "10:00:00", "01-06-2024", "10:00:10"),
        )
        .unwrap();

    let text = std::fs::read_to_string(store.path()).unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    lines.sort_unstable();
    assert_eq!(
        lines,
        vec![
            "folder_id:abc",
            "log_interval:5",
            "start_date:01-06-2024",
            "start_time:10:00:00",
            "stop_date:01-06-2024",
            "stop_time:10:00:10",
        ]
    );
}

#[test]
fn windows_lines_and_blank_lines_are_tolerated() {
    let settings = CalibrationSettings::parse("log_interval:5\r\n\r\nfolder_id:abc\r\n");
    let plan = SessionPlan::from_settings(&settings).unwrap();
    assert_eq!(plan.folder_id, "abc");
    assert_eq!(plan.log_interval, Duration::from_secs(5));
}
