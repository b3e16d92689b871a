//! MAX31855 thermocouple-to-digital converter.
//!
//! The converter is read-only: it shifts out a 32-bit frame while the master
//! clocks four zero bytes. Decoding is a pure function of the frame so it can
//! be exercised without a bus.
//!
//! Frame layout (byte index, MSB first):
//!
//! | byte | bits | field |
//! |------|------|-------|
//! | 0    | 7    | thermocouple sign |
//! | 0..1 | 6..2 | thermocouple magnitude, 0.25 °C per LSB |
//! | 1    | 0    | fault |
//! | 2    | 7    | cold-junction sign |
//! | 2..3 | 6..4 | cold-junction magnitude, 0.0625 °C per LSB |
//! | 3    | 2..0 | fault cause (short to Vcc, short to GND, open circuit) |
//!
//! Negative readings are clamped to zero instead of being sign-extended.

#![allow(unused_parens)]

use core::fmt::Write;

use embedded_hal::spi::{Operation, SpiDevice};
use modular_bitfield::prelude::*;

use crate::error::{Error, Result};
use crate::poll::Sensor;
use crate::report::{emit, Report};

/// Bytes clocked per conversion read.
pub const FRAME_LEN: usize = 4;

const SIGN_BIT: u8 = 0x80;
const FAULT_BIT: u8 = 0x01;
const FAULT_CAUSE_MASK: u8 = 0b0000_0111;

/// Bitfield representation of the fault cause bits (low bits of byte 3).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultFlags {
    // Thermocouple not connected (bit 0).
    pub open_circuit: bool,
    // Thermocouple shorted to GND (bit 1).
    pub short_to_gnd: bool,
    // Thermocouple shorted to Vcc (bit 2).
    pub short_to_vcc: bool,
    #[skip]
    __: B5,
}

impl FaultFlags {
    /// Raw three-bit cause field.
    pub fn cause(self) -> u8 {
        self.into_bytes()[0] & FAULT_CAUSE_MASK
    }
}

impl From<u8> for FaultFlags {
    fn from(value: u8) -> Self {
        Self::from_bytes([value & FAULT_CAUSE_MASK])
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FaultFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "FaultFlags {{ OC: {}, SCG: {}, SCV: {} }}",
            self.open_circuit(),
            self.short_to_gnd(),
            self.short_to_vcc()
        );
    }
}

/// One raw conversion frame as clocked off the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame(pub [u8; FRAME_LEN]);

impl Frame {
    /// Thermocouple temperature in whole °C.
    ///
    /// Bits 31:18 hold a 14-bit field; the two fractional bits are dropped.
    /// A set sign bit yields 0.
    pub fn thermocouple_celsius(&self) -> u16 {
        let [b0, b1, _, _] = self.0;
        if b0 & SIGN_BIT != 0 {
            return 0;
        }
        ((u16::from(b0) << 6) | (u16::from(b1) >> 2)) >> 2
    }

    /// Cold-junction ("room") temperature in whole °C.
    ///
    /// Bits 15:4 hold a 12-bit field; the four fractional bits are dropped.
    /// A set sign bit yields 0.
    pub fn room_celsius(&self) -> u16 {
        let [_, _, b2, b3] = self.0;
        if b2 & SIGN_BIT != 0 {
            return 0;
        }
        ((u16::from(b2) << 4) | (u16::from(b3) >> 4)) >> 4
    }

    /// Fault summary bit (bit 16).
    pub fn is_faulted(&self) -> bool {
        self.0[1] & FAULT_BIT != 0
    }

    /// Fault cause bits, present only when the summary bit is set.
    pub fn fault(&self) -> Option<FaultFlags> {
        self.is_faulted().then(|| FaultFlags::from(self.0[3]))
    }

    /// Decodes every field of the frame.
    pub fn decode(&self) -> Reading {
        Reading {
            thermocouple_c: self.thermocouple_celsius(),
            room_c: self.room_celsius(),
            fault: self.fault(),
        }
    }
}

/// Decoded conversion result.
///
/// When `fault` is `Some`, both temperatures are unreliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    /// Thermocouple temperature, °C.
    pub thermocouple_c: u16,
    /// Cold-junction temperature, °C.
    pub room_c: u16,
    /// Fault cause when the converter flagged a fault.
    pub fault: Option<FaultFlags>,
}

impl Report for Reading {
    fn report<W: Write>(&self, sink: &mut W) -> core::fmt::Result {
        writeln!(sink, "Thermocouple: {} C", self.thermocouple_c)?;
        writeln!(sink, "Room: {} C", self.room_c)?;
        if let Some(fault) = self.fault {
            write!(sink, "Fault: {:#04x}", fault.cause())?;
            if fault.open_circuit() {
                sink.write_str(" open-circuit")?;
            }
            if fault.short_to_gnd() {
                sink.write_str(" short-to-gnd")?;
            }
            if fault.short_to_vcc() {
                sink.write_str(" short-to-vcc")?;
            }
            sink.write_str("\n")?;
        }
        Ok(())
    }
}

/// Synchronous MAX31855 driver over an [`SpiDevice`].
pub struct Max31855<SPI> {
    spi: SPI,
}

impl<SPI> Max31855<SPI> {
    /// Creates a new driver from the provided SPI device.
    pub const fn new(spi: SPI) -> Self {
        Self { spi }
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

impl<SPI> Max31855<SPI>
where
    SPI: SpiDevice,
{
    /// Clocks four zero bytes and returns the bytes sampled in reply.
    pub fn read_frame(&mut self) -> Result<Frame, SPI::Error> {
        let mut raw = [0u8; FRAME_LEN];
        self.spi
            .transaction(&mut [Operation::TransferInPlace(&mut raw)])
            .map_err(Error::from)?;
        Ok(Frame(raw))
    }

    /// Reads and decodes one conversion.
    ///
    /// A flagged fault does not fail the read; it is carried in [`Reading::fault`].
    pub fn read_sensor(&mut self) -> Result<Reading, SPI::Error> {
        let reading = self.read_frame()?.decode();
        if reading.fault.is_some() {
            warn!("thermocouple fault {}", reading.fault);
        }
        Ok(reading)
    }
}

impl<SPI> Sensor for Max31855<SPI>
where
    SPI: SpiDevice,
{
    type Error = Error<SPI::Error>;

    fn sample_and_report<W: Write>(&mut self, sink: &mut W) -> core::result::Result<(), Self::Error> {
        let reading = self.read_sensor()?;
        emit(&reading, sink);
        Ok(())
    }
}
