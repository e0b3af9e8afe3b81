#![cfg_attr(not(test), no_std)]
//! Virtual I2C buses behind bus multiplexers and switches.
//!
//! A [`MuxAdapter`] owns the controller of one mux chip and exposes each of
//! its channels as a [`VirtualBus`], a regular
//! [`embedded_hal_async::i2c::I2c`] implementation. Every transaction on a
//! virtual bus locks the parent bus, selects the channel through the
//! chip-specific [`ChannelSelect`] implementation, forwards the operations
//! and deselects again, so devices behind the mux are addressed as if their
//! channel were a bus of its own.
//!
//! Buses are tracked by a [`BusRegistry`]; [`Discovery`] probes registered
//! buses for mux chips and never probes buses the mux layer created.

// Must come first so the macros are visible to the other modules.
mod fmt;

mod adapter;
mod discovery;
mod error;
mod registry;
mod select;
mod virtual_bus;

pub use adapter::{AttachReport, MuxAdapter, MAX_CHANNELS};
pub use discovery::{Discovery, DiscoveryState, MuxDetect};
pub use error::{Error, RegistryError};
pub use registry::{BusDescriptor, BusId, BusRegistry, MuxId};
pub use select::{BusArbiter, ChannelSelect, NoArbiter};
pub use virtual_bus::VirtualBus;
