//! Serial driver for the Nova SDS011 sensor
//!
//! The sensor talks 9600 baud 8N1. In active reporting mode (the factory
//! default) it sends one 10 byte data frame per second while awake:
//!
//! ```text
//! AA C0 pm25_lo pm25_hi pm10_lo pm10_hi id_lo id_hi chk AB
//! ```
//!
//! Values are tenths of µg/m³ and `chk` is the low byte of the sum of
//! bytes 2..=7. Commands are 19 byte frames (`AA B4 cmd d1..d12 id id chk
//! AB`) answered by 10 byte reply frames starting `AA C5 cmd`.

use crate::device::{Device, Reading};
use crate::error::{DeviceError, Error, Result};
use chrono::Utc;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Serial line speed
pub const BAUD_RATE: u32 = 9600;

/// Default read timeout on the serial line
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const HEAD: u8 = 0xAA;
const TAIL: u8 = 0xAB;
const COMMAND_ID: u8 = 0xB4;
const DATA_ID: u8 = 0xC0;
const REPLY_ID: u8 = 0xC5;

const CMD_SLEEP_WORK: u8 = 0x06;
const MODE_QUERY: u8 = 0x00;
const MODE_SET: u8 = 0x01;
const STATE_SLEEP: u8 = 0x00;
const STATE_WORK: u8 = 0x01;

/// Frame length of data and reply frames
pub const FRAME_LEN: usize = 10;
/// Frame length of command frames
pub const COMMAND_LEN: usize = 19;

// Bytes discarded while hunting for a frame header before giving up
const MAX_STRAY_BYTES: usize = 64;
// Data frames tolerated while waiting for a command reply
const MAX_SKIPPED_FRAMES: usize = 8;

/// Addresses every sensor on the line
pub const BROADCAST_ID: u16 = 0xFFFF;

/// Low byte of the sum of `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Build a command frame for `device_id` with up to 12 data bytes
pub fn command_frame(command: u8, data: &[u8], device_id: u16) -> [u8; COMMAND_LEN] {
    let mut frame = [0u8; COMMAND_LEN];
    frame[0] = HEAD;
    frame[1] = COMMAND_ID;
    frame[2] = command;
    let len = data.len().min(12);
    frame[3..3 + len].copy_from_slice(&data[..len]);
    frame[15..17].copy_from_slice(&device_id.to_le_bytes());
    frame[17] = checksum(&frame[2..17]);
    frame[18] = TAIL;
    frame
}

fn validate_frame(frame: &[u8; FRAME_LEN]) -> std::result::Result<(), DeviceError> {
    if frame[0] != HEAD || frame[9] != TAIL {
        return Err(DeviceError::MalformedFrame(format!(
            "bad framing bytes 0x{:02x}..0x{:02x}",
            frame[0], frame[9]
        )));
    }
    let expected = checksum(&frame[2..8]);
    if expected != frame[8] {
        return Err(DeviceError::InvalidChecksum {
            expected,
            actual: frame[8],
        });
    }
    Ok(())
}

/// Decoded data frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataFrame {
    /// PM2.5 in µg/m³
    pub pm25: f64,
    /// PM10 in µg/m³
    pub pm10: f64,
    /// Sensor id
    pub device_id: u16,
}

/// Decode a data frame
pub fn parse_data_frame(frame: &[u8; FRAME_LEN]) -> std::result::Result<DataFrame, DeviceError> {
    validate_frame(frame)?;
    if frame[1] != DATA_ID {
        return Err(DeviceError::MalformedFrame(format!(
            "expected data frame, got id 0x{:02x}",
            frame[1]
        )));
    }
    Ok(DataFrame {
        pm25: f64::from(u16::from_le_bytes([frame[2], frame[3]])) / 10.0,
        pm10: f64::from(u16::from_le_bytes([frame[4], frame[5]])) / 10.0,
        device_id: u16::from_le_bytes([frame[6], frame[7]]),
    })
}

/// SDS011 on a serial transport
///
/// The transport is released when the driver is dropped.
pub struct Sds011<P = Box<dyn SerialPort>> {
    port: P,
    timeout: Duration,
    device_id: u16,
}

impl Sds011 {
    /// Open the sensor on the serial port at `path`
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_TIMEOUT)
    }

    /// Open the sensor with a custom read timeout on the serial line
    pub fn open_with_timeout(path: &str, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| Error::DeviceOpen {
                path: path.to_string(),
                source: e.into(),
            })?;

        info!(
            port = path,
            baud = BAUD_RATE,
            timeout_ms = timeout.as_millis() as u64,
            "Opened SDS011"
        );
        Ok(Self::new(port).with_reported_timeout(timeout))
    }

    /// Change the read timeout of the open serial port
    pub fn set_timeout(&mut self, timeout: Duration) -> std::result::Result<(), DeviceError> {
        self.port.set_timeout(timeout)?;
        self.timeout = timeout;
        Ok(())
    }
}

impl<P: Read + Write> Sds011<P> {
    /// Wrap an already open transport
    pub fn new(port: P) -> Self {
        Self {
            port,
            timeout: DEFAULT_TIMEOUT,
            device_id: BROADCAST_ID,
        }
    }

    /// Set the timeout quoted in [`DeviceError::Timeout`]. This does not
    /// reconfigure the transport, whose own timeout decides when reads give up.
    pub fn with_reported_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Id reported in the last data frame, or the broadcast id before one
    /// arrives. Commands are always broadcast.
    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    /// Flush pending output and release the transport
    pub fn close(mut self) -> Result<()> {
        self.port
            .flush()
            .map_err(|e| Error::DeviceClose(e.into()))?;
        debug!("Closed SDS011");
        Ok(())
    }

    /// Give back the underlying transport
    pub fn into_inner(self) -> P {
        self.port
    }

    fn map_io(&self, err: io::Error) -> DeviceError {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DeviceError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            },
            _ => DeviceError::Io(err),
        }
    }

    fn read_byte(&mut self) -> std::result::Result<u8, DeviceError> {
        let mut byte = [0u8; 1];
        self.port.read_exact(&mut byte).map_err(|e| self.map_io(e))?;
        Ok(byte[0])
    }

    /// Read the next complete frame, resynchronising on the header byte
    fn read_frame(&mut self) -> std::result::Result<[u8; FRAME_LEN], DeviceError> {
        let mut skipped = 0;
        while self.read_byte()? != HEAD {
            skipped += 1;
            if skipped > MAX_STRAY_BYTES {
                return Err(DeviceError::MalformedFrame(format!(
                    "no frame header in {MAX_STRAY_BYTES} bytes"
                )));
            }
        }
        if skipped > 0 {
            trace!(skipped, "Discarded stray bytes before frame");
        }

        let mut frame = [0u8; FRAME_LEN];
        frame[0] = HEAD;
        self.port
            .read_exact(&mut frame[1..])
            .map_err(|e| self.map_io(e))?;
        validate_frame(&frame)?;
        Ok(frame)
    }

    fn send(&mut self, command: u8, data: &[u8]) -> std::result::Result<(), DeviceError> {
        let frame = command_frame(command, data, BROADCAST_ID);
        self.port.write_all(&frame).map_err(|e| self.map_io(e))?;
        self.port.flush().map_err(|e| self.map_io(e))?;
        Ok(())
    }

    /// Wait for the reply to `command`, skipping interleaved data frames
    fn reply(&mut self, command: u8) -> std::result::Result<[u8; FRAME_LEN], DeviceError> {
        for _ in 0..=MAX_SKIPPED_FRAMES {
            let frame = self.read_frame()?;
            match frame[1] {
                REPLY_ID if frame[2] == command => return Ok(frame),
                REPLY_ID => {
                    return Err(DeviceError::UnexpectedReply {
                        expected: command,
                        actual: frame[2],
                    })
                }
                _ => trace!("Skipping data frame while waiting for reply"),
            }
        }
        Err(DeviceError::MalformedFrame(format!(
            "no reply to command 0x{command:02x}"
        )))
    }

    fn set_working(&mut self, working: bool) -> std::result::Result<(), DeviceError> {
        let state = if working { STATE_WORK } else { STATE_SLEEP };
        self.send(CMD_SLEEP_WORK, &[MODE_SET, state])?;
        let reply = self.reply(CMD_SLEEP_WORK)?;
        debug!(working = reply[4] == STATE_WORK, "Sleep/work command acknowledged");
        Ok(())
    }
}

impl<P: Read + Write> Device for Sds011<P> {
    fn is_awake(&mut self) -> std::result::Result<bool, DeviceError> {
        self.send(CMD_SLEEP_WORK, &[MODE_QUERY])?;
        let reply = self.reply(CMD_SLEEP_WORK)?;
        Ok(reply[4] == STATE_WORK)
    }

    fn wake(&mut self) -> std::result::Result<(), DeviceError> {
        self.set_working(true)
    }

    fn sleep(&mut self) -> std::result::Result<(), DeviceError> {
        self.set_working(false)
    }

    fn read(&mut self) -> std::result::Result<Reading, DeviceError> {
        loop {
            let frame = self.read_frame()?;
            if frame[1] == REPLY_ID {
                trace!(command = frame[2], "Ignoring late command reply");
                continue;
            }
            let data = parse_data_frame(&frame)?;
            self.device_id = data.device_id;
            return Ok(Reading::new(data.pm25, data.pm10, Utc::now()));
        }
    }
}
