#![cfg_attr(not(test), no_std)]
//! Channel control for the NXP PCA954x I2C multiplexers and switches.
//!
//! Multiplexers (PCA9540, PCA9542, PCA9544, PCA9547) connect one downstream
//! channel at a time through an enable bit plus a channel index; switches
//! (PCA9543, PCA9545, PCA9546, PCA9548) connect any subset, one register bit
//! per channel. [`MuxController`] hides the difference behind
//! [`i2c_virt::ChannelSelect`], and [`probe`] detects a chip and exposes its
//! channels as virtual buses.
//!
//! ```ignore
//! let controller = MuxController::new(&MuxConfig::for_part(Part::Pca9548, 0x70))?;
//! if let Some((mux, report)) =
//!     pca954x::probe(&mut discovery, root_id, &root_bus, controller, NoArbiter).await?
//! {
//!     let mut sensor_bus = mux.channel(3)?;
//!     sensor_bus.write_read(0x48, &[0x00], &mut temp).await?;
//! }
//! ```

// Must come first so the macros are visible to the other modules.
mod fmt;

mod chip;
mod config;
mod controller;
mod mask;

pub use chip::{ChipFamily, ChipKind, Part};
pub use config::{ConfigError, MuxConfig};
pub use controller::MuxController;
pub use mask::ChannelMask;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::I2c;
use i2c_virt::{
    AttachReport, BusArbiter, BusId, Discovery, Error, MuxAdapter, NoArbiter,
};

/// An attached PCA954x and its virtual buses.
pub type Pca954x<'a, M, P, const N: usize, A = NoArbiter> =
    MuxAdapter<'a, M, P, MuxController, N, A>;

/// Look for the chip described by `controller` on `parent` and, if it
/// answers, expose its channels.
///
/// Returns `Ok(None)` when nothing answers, or when `parent_id` is itself a
/// bus created by the mux layer.
pub async fn probe<'r, M, P, A, const N: usize>(
    discovery: &mut Discovery<'r, M, N>,
    parent_id: BusId,
    parent: &'r Mutex<M, P>,
    controller: MuxController,
    arbiter: A,
) -> Result<Option<(Pca954x<'r, M, P, N, A>, AttachReport)>, Error<P::Error>>
where
    M: RawMutex,
    P: I2c,
    A: BusArbiter,
{
    let family = controller.family();
    let address = controller.address();
    let found = discovery
        .probe(parent_id, parent, &arbiter, address, &family)
        .await?;
    if !found {
        return Ok(None);
    }
    Ok(Some(discovery.attach(parent_id, parent, address, controller, arbiter)))
}
