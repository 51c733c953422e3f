//! PLX bridge driver core
//!
//! Interrupt service and deferred work, wait-object notifications, the DMA
//! channel engine with its scatter-gather builder, and the physical memory
//! allocator, for the 6000, 8000 and 9000 chip families.

#![no_std]

extern crate alloc;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod chip;
pub mod config;
pub mod dev;
mod error;

pub use self::config::DriverConfig;
pub use self::error::*;
