//! Register map definitions for the LSM330 accelerometer/gyroscope.
#![allow(unused_parens)]

use modular_bitfield::prelude::*;

/// Register address of `CTRL_REG1_A`.
pub const REG_CTRL1_A: u8 = 0x20;
/// Register address of `STATUS_REG_A`.
pub const REG_STATUS_A: u8 = 0x27;
/// Register address of `OUT_X_L_A`.
pub const REG_OUT_X_L_A: u8 = 0x28;
/// Register address of `OUT_X_H_A`.
pub const REG_OUT_X_H_A: u8 = 0x29;
/// Register address of `OUT_Y_L_A`.
pub const REG_OUT_Y_L_A: u8 = 0x2A;
/// Register address of `OUT_Y_H_A`.
pub const REG_OUT_Y_H_A: u8 = 0x2B;
/// Register address of `OUT_Z_L_A`.
pub const REG_OUT_Z_L_A: u8 = 0x2C;
/// Register address of `OUT_Z_H_A`.
pub const REG_OUT_Z_H_A: u8 = 0x2D;
/// Register address of `WHO_AM_I_G`.
pub const REG_WHO_AM_I_G: u8 = 0x0F;

/// Value reported by `WHO_AM_I_G`.
pub const EXPECTED_WHO_AM_I_G: u8 = 0xD4;

/// Largest register address encodable in a command byte.
pub const MAX_ADDRESS: u8 = 0x3F;

/// Access mode carried in the top two bits of a command byte.
///
/// `ReadIncrement = 0b10` is the mode the reference firmware uses for its
/// auto-incrementing reads. The hold variants are inferred from it by setting
/// bit 6 and have not been confirmed against hardware; the firmware's own
/// comment describes bit 6 as the auto-increment bit instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Specifier)]
#[repr(u8)]
#[bits = 2]
pub enum AccessMode {
    /// Write, advancing the register pointer after each byte.
    WriteIncrement = 0b00,
    /// Write, keeping the register pointer fixed.
    WriteHold = 0b01,
    /// Read, advancing the register pointer after each byte.
    ReadIncrement = 0b10,
    /// Read, keeping the register pointer fixed.
    ReadHold = 0b11,
}

impl AccessMode {
    /// Selects the read mode for the requested pointer behaviour.
    pub const fn read(auto_increment: bool) -> Self {
        if auto_increment {
            Self::ReadIncrement
        } else {
            Self::ReadHold
        }
    }

    /// Selects the write mode for the requested pointer behaviour.
    pub const fn write(auto_increment: bool) -> Self {
        if auto_increment {
            Self::WriteIncrement
        } else {
            Self::WriteHold
        }
    }
}

/// Bitfield representation of the first byte clocked out in every transaction.
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    // Register address (bits 5:0).
    pub address: B6,
    // Access mode (bits 7:6).
    pub mode: AccessMode,
}

impl From<u8> for Command {
    fn from(value: u8) -> Self {
        Self::from_bytes([value])
    }
}

impl From<Command> for u8 {
    fn from(value: Command) -> Self {
        value.into_bytes()[0]
    }
}

/// Bitfield representation of the `STATUS_REG_A` register (address `0x27`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    // X-axis new data available (bit 0).
    pub x_data_available: bool,
    // Y-axis new data available (bit 1).
    pub y_data_available: bool,
    // Z-axis new data available (bit 2).
    pub z_data_available: bool,
    // New data available on all axes (bit 3).
    pub xyz_data_available: bool,
    // X-axis data overrun (bit 4).
    pub x_overrun: bool,
    // Y-axis data overrun (bit 5).
    pub y_overrun: bool,
    // Z-axis data overrun (bit 6).
    pub z_overrun: bool,
    // Overrun on any axis (bit 7).
    pub xyz_overrun: bool,
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        Self::from_bytes([value])
    }
}

impl From<Status> for u8 {
    fn from(value: Status) -> Self {
        value.into_bytes()[0]
    }
}

/// Bitfield representation of the `CTRL_REG1_A` register (address `0x20`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ctrl1 {
    // X-axis enable (bit 0).
    pub x_enable: bool,
    // Y-axis enable (bit 1).
    pub y_enable: bool,
    // Z-axis enable (bit 2).
    pub z_enable: bool,
    // Low-power mode enable (bit 3).
    pub low_power: bool,
    // Output data rate selection (bits 7:4).
    pub data_rate: B4,
}

impl From<u8> for Ctrl1 {
    fn from(value: u8) -> Self {
        Self::from_bytes([value])
    }
}

impl From<Ctrl1> for u8 {
    fn from(value: Ctrl1) -> Self {
        value.into_bytes()[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_places_mode_above_address() {
        let command = Command::new()
            .with_address(REG_CTRL1_A)
            .with_mode(AccessMode::ReadIncrement);
        assert_eq!(u8::from(command), 0xA0);

        let decoded = Command::from(0xE7);
        assert_eq!(decoded.address(), REG_STATUS_A);
        assert_eq!(decoded.mode(), AccessMode::ReadHold);
    }

    #[test]
    fn status_layout_matches_datasheet() {
        let status = Status::from(0b1000_1001);
        assert!(status.x_data_available());
        assert!(!status.y_data_available());
        assert!(!status.z_data_available());
        assert!(status.xyz_data_available());
        assert!(!status.x_overrun());
        assert!(status.xyz_overrun());
    }

    #[test]
    fn ctrl1_splits_rate_and_axis_enables() {
        let ctrl = Ctrl1::from(0x57);
        assert!(ctrl.x_enable());
        assert!(ctrl.y_enable());
        assert!(ctrl.z_enable());
        assert!(!ctrl.low_power());
        assert_eq!(ctrl.data_rate(), 0x5);
    }
}
