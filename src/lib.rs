//! # Field Logger Core Library
//!
//! This crate is the core of the `field-logger` application: it polls an
//! eight-channel sensor over Modbus RTU at a fixed interval, appends the
//! transformed readings to dated CSV files, and publishes those files to a
//! folder in a remote object store. The binary (`main.rs`) only parses
//! arguments and wires production collaborators into [`session`].
//!
//! ## Crate Structure
//!
//! - **`transport`**: The `RegisterReader` trait, the Modbus RTU serial reader,
//!   and scripted/simulated readers for tests and dry runs.
//! - **`transform`**: `ValueTransform`, the saturation clamp and division
//!   factor applied to raw registers.
//! - **`reading`**: One timestamped row of eight channel values and the CSV
//!   header.
//! - **`store`**: `LocalStore`, append-only CSV files laid out by period.
//! - **`remote`**: `RemoteStore` trait, `RemoteSync` publishing policies, the
//!   directory-backed and in-memory stores, and the credential cache.
//! - **`calibration`**: The `key:value` calibration resource and the validated
//!   `SessionPlan` derived from it.
//! - **`scheduler`**: The acquisition state machine for bounded and continuous
//!   sessions.
//! - **`clock`**: Wall-clock abstraction so sessions can run on manual time.
//! - **`session`**: Entry points that load calibration and run a scheduler.
//! - **`console`**: The interactive `calibrate` / `start` / `quit` loop.
//! - **`config`**: Figment-based application configuration.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: Component error enums and the aggregate `LoggerError`.

pub mod calibration;
pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod logging;
pub mod reading;
pub mod remote;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod transform;
pub mod transport;
