//! Configuration primitives for the SPI transport and poller.

use embedded_hal::spi::{Mode, MODE_0, MODE_3};

// Upper bound on completion-flag polls per byte before a transfer is abandoned.
const DEFAULT_TIMEOUT_POLLS: u32 = 10_000;

/// Serial clock rate expressed as an integer divisor of the system clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDivisor {
    /// f/2.
    Div2,
    /// f/4.
    Div4,
    /// f/8.
    Div8,
    /// f/16.
    Div16,
    /// f/32.
    Div32,
    /// f/64.
    Div64,
    /// f/128.
    Div128,
}

impl ClockDivisor {
    /// Returns the numeric divisor.
    pub const fn divisor(self) -> u16 {
        match self {
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
            Self::Div32 => 32,
            Self::Div64 => 64,
            Self::Div128 => 128,
        }
    }

    /// Returns the two clock-rate select bits (`SPR1:SPR0`).
    pub const fn rate_bits(self) -> u8 {
        match self {
            Self::Div4 | Self::Div2 => 0b00,
            Self::Div16 | Self::Div8 => 0b01,
            Self::Div64 | Self::Div32 => 0b10,
            Self::Div128 => 0b11,
        }
    }

    /// Returns `true` when the rate requires the double-speed flag (`SPI2X`).
    pub const fn double_speed(self) -> bool {
        matches!(self, Self::Div2 | Self::Div8 | Self::Div32)
    }
}

/// Order in which the bits of each byte are shifted onto the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    /// Most significant bit first.
    MsbFirst,
    /// Least significant bit first.
    LsbFirst,
}

/// Bus parameters applied once when the transport is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Serial clock divisor.
    pub clock_divisor: ClockDivisor,
    /// Clock polarity and phase.
    pub mode: Mode,
    /// Bit order of every transferred byte.
    pub bit_order: BitOrder,
    /// Number of completion-flag polls allowed per byte.
    pub timeout_polls: u32,
}

impl BusConfig {
    /// Begins building a [`BusConfig`] using the builder pattern.
    pub fn new() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Settings for the MAX31855: idle-low clock, leading-edge sampling.
    pub fn max31855() -> Self {
        Self {
            mode: MODE_0,
            ..Self::default()
        }
    }

    /// Settings for the LSM330: idle-high clock, trailing-edge sampling.
    pub fn lsm330() -> Self {
        Self {
            mode: MODE_3,
            ..Self::default()
        }
    }

    /// Checks whether this configuration can be applied to the bus.
    pub fn validate(&self) -> core::result::Result<(), ConfigError> {
        if self.timeout_polls == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }
}

/// Builder for [`BusConfig`] allowing piecemeal construction.
#[derive(Debug, Clone, Copy)]
pub struct ConfigBuilder {
    config: BusConfig,
}

impl ConfigBuilder {
    /// Creates a new builder seeded with [`BusConfig::default()`].
    pub fn new() -> Self {
        Self {
            config: BusConfig::default(),
        }
    }

    /// Overrides the clock divisor.
    pub fn clock_divisor(mut self, divisor: ClockDivisor) -> Self {
        self.config.clock_divisor = divisor;
        self
    }

    /// Overrides clock polarity and phase.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Overrides the bit order.
    pub fn bit_order(mut self, bit_order: BitOrder) -> Self {
        self.config.bit_order = bit_order;
        self
    }

    /// Sets how many completion polls a single byte may take.
    pub fn timeout_polls(mut self, polls: u32) -> Self {
        self.config.timeout_polls = polls;
        self
    }

    /// Finalizes the builder and returns the [`BusConfig`].
    pub fn build(self) -> BusConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            clock_divisor: ClockDivisor::Div4,
            mode: MODE_0,
            bit_order: BitOrder::MsbFirst,
            timeout_polls: DEFAULT_TIMEOUT_POLLS,
        }
    }
}

/// Validation errors generated while verifying a [`BusConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A zero poll bound would fail every transfer.
    ZeroTimeout,
    /// A zero polling period would never sample.
    ZeroPeriod,
}
