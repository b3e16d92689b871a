//! LSM330 register access over SPI.
//!
//! Every read clocks a command byte followed by one zero byte per requested
//! register; the device answers on the inbound line while the zeros go out.
//! There is no framing check, so a garbled transfer is returned as-is.

pub mod registers;

use core::fmt::Write;

use embedded_hal::spi::{Operation, SpiDevice};

use crate::error::{Error, Result};
use crate::poll::Sensor;
use crate::report::{emit, Report};

use self::registers::{
    AccessMode,
    Command,
    Ctrl1,
    Status,
    EXPECTED_WHO_AM_I_G,
    MAX_ADDRESS,
    REG_CTRL1_A,
    REG_OUT_X_L_A,
    REG_STATUS_A,
    REG_WHO_AM_I_G,
};

/// Longest register burst the driver will probe in one poll.
pub const MAX_PROBE_LEN: usize = 16;
// Bytes spanning OUT_X_L_A..=OUT_Z_H_A.
const RAW_AXIS_BYTES: usize = 6;
// Burst length observed on the reference board.
const DEFAULT_PROBE_LEN: usize = 5;

/// Packs a read command: mode in bits 7:6, register address in bits 5:0.
///
/// `build_read_command(0x20, true)` yields `0xA0`.
pub fn build_read_command(address: u8, auto_increment: bool) -> u8 {
    Command::new()
        .with_address(address & MAX_ADDRESS)
        .with_mode(AccessMode::read(auto_increment))
        .into()
}

/// Packs a write command for `address`.
pub fn build_write_command(address: u8, auto_increment: bool) -> u8 {
    Command::new()
        .with_address(address & MAX_ADDRESS)
        .with_mode(AccessMode::write(auto_increment))
        .into()
}

/// Raw acceleration sample, one signed 16-bit count per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Acceleration {
    /// X-axis counts (`OUT_X_H_A:OUT_X_L_A`).
    pub x: i16,
    /// Y-axis counts (`OUT_Y_H_A:OUT_Y_L_A`).
    pub y: i16,
    /// Z-axis counts (`OUT_Z_H_A:OUT_Z_L_A`).
    pub z: i16,
}

impl Acceleration {
    /// Decodes `OUT_X_L_A..=OUT_Z_H_A` (low byte first per axis).
    pub fn from_bytes(raw: [u8; RAW_AXIS_BYTES]) -> Self {
        Self {
            x: i16::from_le_bytes([raw[0], raw[1]]),
            y: i16::from_le_bytes([raw[2], raw[3]]),
            z: i16::from_le_bytes([raw[4], raw[5]]),
        }
    }
}

impl Report for Acceleration {
    fn report<W: Write>(&self, sink: &mut W) -> core::fmt::Result {
        writeln!(sink, "Accel: x={} y={} z={}", self.x, self.y, self.z)
    }
}

/// Consecutive register values starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDump<'a> {
    /// Address of `values[0]`.
    pub start: u8,
    /// Register contents in address order.
    pub values: &'a [u8],
}

impl Report for RegisterDump<'_> {
    fn report<W: Write>(&self, sink: &mut W) -> core::fmt::Result {
        for (offset, value) in self.values.iter().enumerate() {
            let address = self.start.wrapping_add(offset as u8);
            writeln!(sink, "Register {:#04x}: {:#04x}", address, value)?;
        }
        Ok(())
    }
}

/// Synchronous LSM330 driver over an [`SpiDevice`].
///
/// The device is expected to be bound to one chip-select line: the
/// accelerometer for the `*_A` registers, the gyroscope for `WHO_AM_I_G`.
pub struct Lsm330<SPI> {
    spi: SPI,
    probe_start: u8,
    probe_len: usize,
}

impl<SPI> Lsm330<SPI> {
    /// Creates a driver that probes five registers from `CTRL_REG1_A` per poll.
    pub fn new(spi: SPI) -> Self {
        Self {
            spi,
            probe_start: REG_CTRL1_A,
            probe_len: DEFAULT_PROBE_LEN,
        }
    }

    /// Consumes the driver and returns the owned SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }

    /// Provides mutable access to the wrapped SPI device.
    pub fn spi_mut(&mut self) -> &mut SPI {
        &mut self.spi
    }
}

impl<SPI> Lsm330<SPI>
where
    SPI: SpiDevice,
{
    /// Changes the register burst reported on every poll.
    pub fn with_probe(mut self, start: u8, len: usize) -> Result<Self, SPI::Error> {
        if len == 0 || len > MAX_PROBE_LEN || start > MAX_ADDRESS {
            return Err(Error::InvalidConfig);
        }
        self.probe_start = start;
        self.probe_len = len;
        Ok(self)
    }

    /// Reads `buf.len()` consecutive registers starting at `start`.
    ///
    /// Addresses above `MAX_ADDRESS` are rejected with [`Error::InvalidConfig`].
    pub fn read_registers(&mut self, start: u8, buf: &mut [u8]) -> Result<(), SPI::Error> {
        if start > MAX_ADDRESS {
            return Err(Error::InvalidConfig);
        }
        if buf.is_empty() {
            return Ok(());
        }

        let command = [build_read_command(start, true)];
        buf.fill(0x00);
        let mut operations = [Operation::Write(&command), Operation::TransferInPlace(buf)];
        self.spi.transaction(&mut operations).map_err(Error::from)
    }

    /// Reads a single register.
    pub fn read_register(&mut self, address: u8) -> Result<u8, SPI::Error> {
        let mut value = [0u8; 1];
        self.read_registers(address, &mut value)?;
        Ok(value[0])
    }

    /// Writes a single register.
    pub fn write_register(&mut self, address: u8, value: u8) -> Result<(), SPI::Error> {
        if address > MAX_ADDRESS {
            return Err(Error::InvalidConfig);
        }
        let frame = [build_write_command(address, false), value];
        self.spi
            .transaction(&mut [Operation::Write(&frame)])
            .map_err(Error::from)
    }

    /// Reads `CTRL_REG1_A`.
    pub fn read_ctrl1(&mut self) -> Result<Ctrl1, SPI::Error> {
        self.read_register(REG_CTRL1_A).map(Ctrl1::from)
    }

    /// Writes `CTRL_REG1_A`.
    pub fn write_ctrl1(&mut self, ctrl: Ctrl1) -> Result<(), SPI::Error> {
        self.write_register(REG_CTRL1_A, ctrl.into())
    }

    /// Reads `STATUS_REG_A`.
    pub fn read_status(&mut self) -> Result<Status, SPI::Error> {
        self.read_register(REG_STATUS_A).map(Status::from)
    }

    /// Reads `WHO_AM_I_G`.
    pub fn who_am_i(&mut self) -> Result<u8, SPI::Error> {
        self.read_register(REG_WHO_AM_I_G)
    }

    /// Verifies `WHO_AM_I_G` against the LSM330 gyroscope identity.
    pub fn check_gyro_id(&mut self) -> Result<(), SPI::Error> {
        let id = self.who_am_i()?;
        if id != EXPECTED_WHO_AM_I_G {
            warn!("unexpected WHO_AM_I_G {=u8:#x}", id);
            return Err(Error::DeviceIdMismatch);
        }
        Ok(())
    }

    /// Reads the three acceleration axes in one burst.
    pub fn read_acceleration_raw(&mut self) -> Result<Acceleration, SPI::Error> {
        let mut raw = [0u8; RAW_AXIS_BYTES];
        self.read_registers(REG_OUT_X_L_A, &mut raw)?;
        Ok(Acceleration::from_bytes(raw))
    }
}

impl<SPI> Sensor for Lsm330<SPI>
where
    SPI: SpiDevice,
{
    type Error = Error<SPI::Error>;

    fn sample_and_report<W: Write>(&mut self, sink: &mut W) -> core::result::Result<(), Self::Error> {
        let mut buf = [0u8; MAX_PROBE_LEN];
        let len = self.probe_len;
        let start = self.probe_start;
        self.read_registers(start, &mut buf[..len])?;
        emit(&RegisterDump { start, values: &buf[..len] }, sink);
        Ok(())
    }
}
