//! Fixed-cadence polling.
//!
//! The loop owner calls [`Poller::poll`] once per iteration (between servicing
//! whatever else shares the loop); every `period` iterations the sensor is
//! sampled and its reading reported. The cadence is a software counter, not a
//! timer.

use core::fmt::Write;

use crate::config::ConfigError;

/// A sensor that can take one sample and describe it to a sink.
pub trait Sensor {
    /// Error produced by a failed sample.
    type Error;

    /// Reads the sensor once and reports the decoded values to `sink`.
    fn sample_and_report<W: Write>(&mut self, sink: &mut W) -> Result<(), Self::Error>;
}

/// Iteration counter that fires every `period` ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Poller {
    period: u32,
    counter: u32,
}

impl Poller {
    /// Creates a poller firing on every `period`-th tick.
    pub fn new(period: u32) -> Result<Self, ConfigError> {
        if period == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        Ok(Self { period, counter: 0 })
    }

    /// Number of ticks between samples.
    pub fn period(&self) -> u32 {
        self.period
    }

    /// Advances the counter; returns `true` when a sample is due.
    pub fn tick(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.period {
            self.counter = 0;
            true
        } else {
            false
        }
    }

    /// Ticks and, when due, samples `sensor` into `sink`.
    ///
    /// Returns whether a sample was taken. Errors are passed through untouched;
    /// the next due tick simply tries again.
    pub fn poll<S, W>(&mut self, sensor: &mut S, sink: &mut W) -> Result<bool, S::Error>
    where
        S: Sensor,
        W: Write,
    {
        if !self.tick() {
            return Ok(false);
        }
        sensor.sample_and_report(sink)?;
        Ok(true)
    }
}
