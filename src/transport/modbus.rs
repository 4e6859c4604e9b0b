//! Modbus RTU register reader.
//!
//! Protocol Overview:
//! - Serial line: 9600 baud, 8N1, no flow control (configurable port/baud)
//! - Request: function 0x03 (read holding registers)
//!   `[unit, 0x03, start_hi, start_lo, count_hi, count_lo, crc_lo, crc_hi]`
//! - Response: `[unit, 0x03, byte_count, data.., crc_lo, crc_hi]`
//! - Exception: `[unit, 0x83, code, crc_lo, crc_hi]`
//! - CRC-16/MODBUS over everything before the CRC, little-endian on the wire
//!
//! Every [`RegisterReader::read`] opens the port, performs one exchange bounded
//! by the configured timeout, and drops the port before returning.

use crate::error::ReadFailure;
use crate::reading::{RegisterBlock, CHANNEL_COUNT};
use crate::transport::RegisterReader;
use async_trait::async_trait;
use crc::{Crc, CRC_16_MODBUS};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::spawn_blocking;
use tokio_serial::SerialPortBuilderExt;
use tracing::instrument;

const MODBUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

const READ_HOLDING_REGISTERS: u8 = 0x03;
const EXCEPTION_FLAG: u8 = 0x80;

/// Connection parameters for the sensor's serial line.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Line speed
    pub baud_rate: u32,
    /// Bound on the whole request/response exchange
    pub timeout: Duration,
    /// Modbus unit (slave) id
    pub unit_id: u8,
    /// First register of the channel block
    pub start_register: u16,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            timeout: Duration::from_secs(2),
            unit_id: 1,
            start_register: 0,
        }
    }
}

/// Build a "read holding registers" request frame.
pub fn read_request(unit_id: u8, start: u16, count: u16) -> [u8; 8] {
    let mut frame = [0u8; 8];
    frame[0] = unit_id;
    frame[1] = READ_HOLDING_REGISTERS;
    frame[2..4].copy_from_slice(&start.to_be_bytes());
    frame[4..6].copy_from_slice(&count.to_be_bytes());
    let crc = MODBUS_CRC.checksum(&frame[..6]);
    frame[6..8].copy_from_slice(&crc.to_le_bytes());
    frame
}

fn check_crc(body: &[u8], trailer: [u8; 2]) -> Result<(), ReadFailure> {
    let expected = MODBUS_CRC.checksum(body);
    let actual = u16::from_le_bytes(trailer);
    if expected != actual {
        return Err(ReadFailure::Crc { expected, actual });
    }
    Ok(())
}

fn truncated(err: std::io::Error) -> ReadFailure {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ReadFailure::Malformed("partial response".to_string())
    } else {
        ReadFailure::Io(err)
    }
}

/// Send one read request over `port` and decode the register block.
///
/// The caller bounds this with a timeout; a response that stops early surfaces
/// either as a timeout there or as a `Malformed` partial response here.
pub async fn exchange<P>(
    port: &mut P,
    unit_id: u8,
    start_register: u16,
) -> Result<RegisterBlock, ReadFailure>
where
    P: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let request = read_request(unit_id, start_register, CHANNEL_COUNT as u16);
    tracing::trace!(frame = ?request, "Modbus: sending request");
    port.write_all(&request).await?;
    port.flush().await?;

    let mut head = [0u8; 3];
    port.read_exact(&mut head).await.map_err(truncated)?;
    let [unit, function, third] = head;

    if function == READ_HOLDING_REGISTERS | EXCEPTION_FLAG {
        let mut trailer = [0u8; 2];
        port.read_exact(&mut trailer).await.map_err(truncated)?;
        check_crc(&head, trailer)?;
        return Err(ReadFailure::Exception { code: third });
    }
    if unit != unit_id {
        return Err(ReadFailure::Malformed(format!(
            "response from unit {unit}, expected {unit_id}"
        )));
    }
    if function != READ_HOLDING_REGISTERS {
        return Err(ReadFailure::Malformed(format!(
            "unexpected function code {function:#04x}"
        )));
    }

    let byte_count = usize::from(third);
    if byte_count != CHANNEL_COUNT * 2 {
        return Err(ReadFailure::Malformed(format!(
            "byte count {byte_count}, expected {}",
            CHANNEL_COUNT * 2
        )));
    }

    let mut frame = Vec::with_capacity(3 + byte_count + 2);
    frame.extend_from_slice(&head);
    frame.resize(3 + byte_count + 2, 0);
    port.read_exact(&mut frame[3..]).await.map_err(truncated)?;

    let (body, trailer) = frame.split_at(3 + byte_count);
    check_crc(body, [trailer[0], trailer[1]])?;

    let mut registers = [0u16; CHANNEL_COUNT];
    for (reg, chunk) in registers.iter_mut().zip(body[3..].chunks_exact(2)) {
        *reg = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    Ok(registers)
}

/// Production reader: one non-pooled serial connection per read.
pub struct ModbusRtuReader {
    settings: SerialSettings,
}

impl ModbusRtuReader {
    /// Reader using `settings` for every exchange.
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }

    /// Link settings.
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    async fn open(&self) -> Result<tokio_serial::SerialStream, ReadFailure> {
        let port = self.settings.port.clone();
        let baud_rate = self.settings.baud_rate;
        let timeout = self.settings.timeout;

        // Use spawn_blocking to avoid blocking the async runtime
        spawn_blocking(move || {
            tokio_serial::new(&port, baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .timeout(timeout)
                .open_native_async()
                .map_err(|source| ReadFailure::Open { port, source })
        })
        .await
        .map_err(|e| ReadFailure::Io(std::io::Error::other(e)))?
    }
}

#[async_trait]
impl RegisterReader for ModbusRtuReader {
    #[instrument(skip(self), fields(port = %self.settings.port), err)]
    async fn read(&self) -> Result<RegisterBlock, ReadFailure> {
        let mut port = self.open().await?;
        let timeout = self.settings.timeout;
        let result = tokio::time::timeout(
            timeout,
            exchange(&mut port, self.settings.unit_id, self.settings.start_register),
        )
        .await;
        drop(port);

        match result {
            Ok(block) => block,
            Err(_) => Err(ReadFailure::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
