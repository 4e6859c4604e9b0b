//! Session entry points shared by the CLI and the interactive console.
//!
//! - **`calibrate`**: validates a set of calibration settings and saves them,
//!   replacing whatever was stored before.
//! - **`start_logging`**: loads the stored calibration, builds a
//!   [`Scheduler`] from it and runs one session to completion.
//! - **`serial_reader` / `directory_remote`**: the production collaborators
//!   described by an [`AppConfig`].
//!
//! Collaborators are passed in as trait objects so the same entry points run
//! against the serial sensor and the directory store in the field, and against
//! scripted readers and the in-memory store in tests and dry runs.

use crate::calibration::{CalibrationSettings, CalibrationStore, SessionPlan};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::remote::{CredentialCache, DirectoryStore, RemoteStore};
use crate::scheduler::{Scheduler, SessionReport};
use crate::store::LocalStore;
use crate::transport::{ModbusRtuReader, RegisterReader};
use std::sync::Arc;
use tokio::sync::watch;

/// Validate `settings` and persist them as the current calibration.
pub fn calibrate(config: &AppConfig, settings: &CalibrationSettings) -> AppResult<SessionPlan> {
    let plan = SessionPlan::from_settings(settings)?;
    CalibrationStore::new(&config.calibration.path).save(settings)?;
    Ok(plan)
}

/// Run one logging session from the stored calibration.
pub async fn start_logging(
    config: &AppConfig,
    reader: Arc<dyn RegisterReader>,
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
) -> AppResult<SessionReport> {
    let settings = CalibrationStore::new(&config.calibration.path).load_required()?;
    let plan = SessionPlan::from_settings(&settings)?;

    let mut scheduler = Scheduler::new(
        plan,
        reader,
        LocalStore::new(&config.storage.root_dir),
        remote,
        config.remote.naming,
        clock,
        shutdown,
    );
    scheduler.run().await
}

/// Modbus reader on the configured serial port.
pub fn serial_reader(config: &AppConfig) -> Arc<dyn RegisterReader> {
    Arc::new(ModbusRtuReader::new(config.serial.settings()))
}

/// Directory-backed remote store with the configured credential cache.
pub fn directory_remote(config: &AppConfig) -> Arc<dyn RemoteStore> {
    let credentials =
        CredentialCache::new(&config.remote.credentials_path, config.remote.token_ttl());
    Arc::new(DirectoryStore::new(&config.remote.root_dir, credentials))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{FOLDER_ID, LOG_INTERVAL};
    use crate::clock::SystemClock;
    use crate::error::{CalibrationError, LoggerError};
    use crate::remote::MemoryStore;
    use crate::transport::ScriptedReader;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.calibration.path = tmp.path().join("calibration_settings.txt");
        config.storage.root_dir = tmp.path().join("Scanner_Files");
        config
    }

    #[test]
    fn calibrate_refuses_invalid_settings_without_saving() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let invalid = CalibrationSettings::new()
            .with(LOG_INTERVAL, "0")
            .with(FOLDER_ID, "f");

        assert!(calibrate(&config, &invalid).is_err());
        assert!(!config.calibration.path.exists());

        let plan = calibrate(&config, &CalibrationSettings::continuous(5, "f")).unwrap();
        assert!(!plan.is_bounded());
        assert!(config.calibration.path.exists());
    }

    #[tokio::test]
    async fn start_without_calibration_aborts() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let reader = Arc::new(ScriptedReader::constant([0; 8]));
        let remote = Arc::new(MemoryStore::new());
        let (_tx, rx) = watch::channel(false);

        let err = start_logging(&config, reader.clone(), remote.clone(), Arc::new(SystemClock), rx)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoggerError::Calibration(CalibrationError::Missing(_))
        ));
        assert_eq!(reader.calls(), 0);
        assert!(remote.operations().is_empty());
    }
}
