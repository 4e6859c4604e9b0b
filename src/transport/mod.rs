//! Sensor transport.
//!
//! The scheduler only sees the [`RegisterReader`] capability: one call, one
//! register block or a [`ReadFailure`]. Retry policy lives in the scheduler,
//! never here.
//!
//! - [`modbus`]: Modbus RTU over a serial line, a fresh connection per read.
//! - [`mock`]: scripted and simulated readers for tests and dry runs.

use crate::error::ReadFailure;
use crate::reading::RegisterBlock;
use async_trait::async_trait;

pub mod mock;
pub mod modbus;

pub use mock::{ScriptedReader, SimulatedReader};
pub use modbus::{ModbusRtuReader, SerialSettings};

/// Capability: read one block of channel registers from the sensor.
///
/// # Contract
/// - Exactly one request/response exchange per call
/// - A partial response is a failure, never a short block
/// - No retries inside the implementation
#[async_trait]
pub trait RegisterReader: Send + Sync {
    /// Read all channel registers once.
    async fn read(&self) -> Result<RegisterBlock, ReadFailure>;
}
