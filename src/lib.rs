#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;
mod error;

pub mod bus;
pub mod config;
pub mod lsm330;
pub mod max31855;
pub mod poll;
pub mod report;

pub use crate::bus::{BusError, Transport};
pub use crate::config::BusConfig;
pub use crate::error::{Error, Result};
pub use crate::lsm330::Lsm330;
pub use crate::max31855::Max31855;
