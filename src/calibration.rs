//! Calibration settings persistence.
//!
//! The calibration resource is plain text, one `key:value` pair per line,
//! overwritten wholesale on every calibration run. Lines are split on the
//! first colon only, so values such as `10:00:00` survive intact. Keys are
//! trimmed; values are kept as written and trimmed when typed.
//!
//! [`SessionPlan`] is the validated, typed view the scheduler runs from.

use crate::error::CalibrationError;
use crate::transform::ValueTransform;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Window start time, `HH:MM:SS`.
pub const START_TIME: &str = "start_time";
/// Window start date, `DD-MM-YYYY`.
pub const START_DATE: &str = "start_date";
/// Window stop time, `HH:MM:SS`.
pub const STOP_TIME: &str = "stop_time";
/// Window stop date, `DD-MM-YYYY`.
pub const STOP_DATE: &str = "stop_date";
/// Seconds between readings.
pub const LOG_INTERVAL: &str = "log_interval";
/// Remote folder receiving the log files.
pub const FOLDER_ID: &str = "folder_id";
/// Optional divisor applied to raw register values.
pub const DIVISION_FACTOR: &str = "division_factor";

/// Format of a window bound once date and time are joined.
pub const WINDOW_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Flat key/value calibration settings, kept in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalibrationSettings {
    entries: BTreeMap<String, String>,
}

impl CalibrationSettings {
    /// Empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for a continuous (unbounded) session.
    pub fn continuous(log_interval_secs: u64, folder_id: impl Into<String>) -> Self {
        Self::new()
            .with(LOG_INTERVAL, log_interval_secs.to_string())
            .with(FOLDER_ID, folder_id)
    }

    /// Add a bounded window, dates as `DD-MM-YYYY` and times as `HH:MM:SS`.
    pub fn with_window(
        self,
        start_date: impl Into<String>,
        start_time: impl Into<String>,
        stop_date: impl Into<String>,
        stop_time: impl Into<String>,
    ) -> Self {
        self.with(START_DATE, start_date)
            .with(START_TIME, start_time)
            .with(STOP_DATE, stop_date)
            .with(STOP_TIME, stop_time)
    }

    /// Add a division factor.
    pub fn with_division_factor(self, factor: impl Into<String>) -> Self {
        self.with(DIVISION_FACTOR, factor)
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Raw value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Whether `key` is set.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as the on-disk `key:value` text.
    pub fn to_text(&self) -> String {
        self.iter().map(|(k, v)| format!("{k}:{v}\n")).collect()
    }

    /// Parse `key:value` text. Lines without a colon are skipped with a
    /// warning; blank lines are ignored. Surrounding whitespace is dropped
    /// from keys only.
    pub fn parse(text: &str) -> Self {
        let mut settings = Self::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((key, value)) => settings.insert(key.trim(), value),
                None => tracing::warn!(
                    line = index + 1,
                    content = %line,
                    "Skipping malformed line in calibration settings"
                ),
            }
        }
        settings
    }
}

/// File-backed calibration resource.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    /// Resource stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the resource.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the resource with `settings`. Prior content is discarded.
    pub fn save(&self, settings: &CalibrationSettings) -> Result<(), CalibrationError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, settings.to_text())?;
        tracing::info!(path = %self.path.display(), keys = settings.len(), "Calibration settings saved");
        Ok(())
    }

    /// Load the settings; `Ok(None)` when the resource does not exist yet.
    pub fn load(&self) -> Result<Option<CalibrationSettings>, CalibrationError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(CalibrationSettings::parse(&text))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Calibration settings not found. Run 'calibrate' first"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load and require the settings to exist.
    pub fn load_required(&self) -> Result<CalibrationSettings, CalibrationError> {
        self.load()?
            .ok_or_else(|| CalibrationError::Missing(self.path.clone()))
    }
}

/// Inclusive logging window of a bounded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// First instant at which readings are taken
    pub start: NaiveDateTime,
    /// Last instant at which readings are taken
    pub stop: NaiveDateTime,
}

/// Validated session parameters derived from [`CalibrationSettings`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    /// Time between readings
    pub log_interval: Duration,
    /// Remote folder receiving the log files
    pub folder_id: String,
    /// Present for bounded sessions.
    pub window: Option<Window>,
    /// Raw `start_date` value; names the single file of a bounded session.
    pub start_date_key: Option<String>,
    /// Applied to every raw register value
    pub transform: ValueTransform,
}

impl SessionPlan {
    /// Validate `settings` into a plan.
    pub fn from_settings(settings: &CalibrationSettings) -> Result<Self, CalibrationError> {
        let log_interval = parse_interval(required(settings, LOG_INTERVAL)?)?;

        let folder_id = required(settings, FOLDER_ID)?.trim().to_string();
        if folder_id.is_empty() {
            return Err(malformed(FOLDER_ID, "must not be empty"));
        }

        let window = parse_window(settings)?;
        let start_date_key = window
            .and(settings.get(START_DATE))
            .map(|d| d.trim().to_string());

        let factor = settings
            .get(DIVISION_FACTOR)
            .map(parse_factor)
            .transpose()?;

        Ok(Self {
            log_interval,
            folder_id,
            window,
            start_date_key,
            transform: ValueTransform::from_factor(factor),
        })
    }

    /// Whether the session runs within a window.
    pub fn is_bounded(&self) -> bool {
        self.window.is_some()
    }
}

fn required<'a>(
    settings: &'a CalibrationSettings,
    key: &'static str,
) -> Result<&'a str, CalibrationError> {
    settings.get(key).ok_or(CalibrationError::MissingKey(key))
}

fn malformed(key: &str, reason: impl Into<String>) -> CalibrationError {
    CalibrationError::Malformed {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_interval(raw: &str) -> Result<Duration, CalibrationError> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| malformed(LOG_INTERVAL, format!("'{raw}' is not a positive integer")))?;
    if secs == 0 {
        return Err(malformed(LOG_INTERVAL, "must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_factor(raw: &str) -> Result<f64, CalibrationError> {
    let factor: f64 = raw
        .trim()
        .parse()
        .map_err(|_| malformed(DIVISION_FACTOR, format!("'{raw}' is not a number")))?;
    if !factor.is_finite() || factor == 0.0 {
        return Err(malformed(DIVISION_FACTOR, "must be a finite, non-zero number"));
    }
    Ok(factor)
}

fn parse_window(settings: &CalibrationSettings) -> Result<Option<Window>, CalibrationError> {
    let keys = [START_DATE, START_TIME, STOP_DATE, STOP_TIME];
    if keys.iter().all(|k| !settings.contains(k)) {
        return Ok(None);
    }
    if let Some(missing) = keys.iter().find(|k| !settings.contains(k)) {
        return Err(CalibrationError::MissingKey(*missing));
    }

    let bound = |date_key: &'static str, time_key: &'static str| {
        let joined = format!(
            "{} {}",
            required(settings, date_key)?.trim(),
            required(settings, time_key)?.trim()
        );
        NaiveDateTime::parse_from_str(&joined, WINDOW_FORMAT).map_err(|e| {
            malformed(date_key, format!("'{joined}' does not match {WINDOW_FORMAT}: {e}"))
        })
    };
    let start = bound(START_DATE, START_TIME)?;
    let stop = bound(STOP_DATE, STOP_TIME)?;
    if stop < start {
        return Err(malformed(STOP_DATE, "stop must not be earlier than start"));
    }
    Ok(Some(Window { start, stop }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn malformed_lines_are_skipped_with_warning() {
        let settings =
            CalibrationSettings::parse("log_interval:5\nfolder_id:abc\nbadline\ndivision_factor:2");
        assert_eq!(settings.len(), 3);
        assert_eq!(settings.get(LOG_INTERVAL), Some("5"));
        assert_eq!(settings.get(FOLDER_ID), Some("abc"));
        assert_eq!(settings.get(DIVISION_FACTOR), Some("2"));
        assert!(logs_contain("Skipping malformed line"));
    }

    #[test]
    fn splits_on_first_colon_only() {
        let settings = CalibrationSettings::parse("start_time:10:00:00\n");
        assert_eq!(settings.get(START_TIME), Some("10:00:00"));
    }

    #[test]
    fn keys_are_trimmed_values_kept_raw() {
        let settings = CalibrationSettings::parse(" log_interval:5\n folder_id : abc\n");
        assert_eq!(settings.get(LOG_INTERVAL), Some("5"));
        assert_eq!(settings.get(FOLDER_ID), Some(" abc"));

        let plan = SessionPlan::from_settings(&settings).unwrap();
        assert_eq!(plan.log_interval, Duration::from_secs(5));
        assert_eq!(plan.folder_id, "abc");
    }

    #[test]
    fn round_trip_through_file() {
        let tmp = TempDir::new().unwrap();
        let store = CalibrationStore::new(tmp.path().join("calibration_settings.txt"));
        let settings = CalibrationSettings::continuous(5, "folder-1")
            .with_window("01-06-2024", "10:00:00", "01-06-2024", "10:00:10")
            .with_division_factor("10")
            .with("operator note", " spaced value ");

        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), Some(settings));
    }

    #[test]
    fn save_replaces_previous_content() {
        let tmp = TempDir::new().unwrap();
        let store = CalibrationStore::new(tmp.path().join("calibration_settings.txt"));
        store
            .save(&CalibrationSettings::continuous(5, "a").with_division_factor("2"))
            .unwrap();
        store.save(&CalibrationSettings::continuous(9, "b")).unwrap();

        let loaded = store.load_required().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(!loaded.contains(DIVISION_FACTOR));
        assert_eq!(loaded.get(LOG_INTERVAL), Some("9"));
    }

    #[test]
    fn missing_resource_is_absent_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = CalibrationStore::new(tmp.path().join("nope.txt"));
        assert_eq!(store.load().unwrap(), None);
        assert!(matches!(
            store.load_required(),
            Err(CalibrationError::Missing(_))
        ));
    }

    #[test]
    fn continuous_plan_uses_identity_without_factor() {
        let plan = SessionPlan::from_settings(&CalibrationSettings::continuous(5, "abc")).unwrap();
        assert_eq!(plan.log_interval, Duration::from_secs(5));
        assert_eq!(plan.folder_id, "abc");
        assert!(!plan.is_bounded());
        assert_eq!(plan.transform, ValueTransform::Identity);
    }

    #[test]
    fn bounded_plan_parses_window_and_factor() {
        let settings = CalibrationSettings::continuous(5, "abc")
            .with_window("01-06-2024", "10:00:00", "01-06-2024", "10:00:10")
            .with_division_factor("10");
        let plan = SessionPlan::from_settings(&settings).unwrap();
        let window = plan.window.unwrap();
        assert_eq!(window.start.to_string(), "2024-06-01 10:00:00");
        assert_eq!(window.stop.to_string(), "2024-06-01 10:00:10");
        assert_eq!(plan.start_date_key.as_deref(), Some("01-06-2024"));
        assert_eq!(plan.transform, ValueTransform::Scaled { factor: 10.0 });
    }

    #[test]
    fn rejects_invalid_interval() {
        for raw in ["0", "-5", "five", "2.5", ""] {
            let settings = CalibrationSettings::new()
                .with(LOG_INTERVAL, raw)
                .with(FOLDER_ID, "abc");
            assert!(
                SessionPlan::from_settings(&settings).is_err(),
                "accepted interval {raw:?}"
            );
        }
    }

    #[test]
    fn rejects_partial_or_inverted_window() {
        let partial = CalibrationSettings::continuous(5, "abc").with(START_DATE, "01-06-2024");
        assert!(matches!(
            SessionPlan::from_settings(&partial),
            Err(CalibrationError::MissingKey(START_TIME))
        ));

        let inverted = CalibrationSettings::continuous(5, "abc").with_window(
            "02-06-2024",
            "10:00:00",
            "01-06-2024",
            "10:00:00",
        );
        assert!(SessionPlan::from_settings(&inverted).is_err());

        let garbage = CalibrationSettings::continuous(5, "abc").with_window(
            "2024-06-01",
            "10:00:00",
            "01-06-2024",
            "10:00:00",
        );
        assert!(SessionPlan::from_settings(&garbage).is_err());
    }

    #[test]
    fn rejects_zero_division_factor() {
        let settings = CalibrationSettings::continuous(5, "abc").with_division_factor("0");
        assert!(SessionPlan::from_settings(&settings).is_err());
    }

    #[test]
    fn missing_required_keys_are_named() {
        let settings = CalibrationSettings::new().with(LOG_INTERVAL, "5");
        assert!(matches!(
            SessionPlan::from_settings(&settings),
            Err(CalibrationError::MissingKey(FOLDER_ID))
        ));
    }
}
