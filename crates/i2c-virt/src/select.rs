use embedded_hal_async::i2c::I2c;

use crate::error::Error;

/// Capability to steer a mux or switch chip between its channels.
///
/// Implemented once per chip family. Every method is called with the parent
/// bus already locked, so implementors may keep their cached register state
/// without any locking of their own.
#[allow(async_fn_in_trait)]
pub trait ChannelSelect {
    /// Number of downstream channels.
    fn channel_count(&self) -> u8;

    /// Route the parent bus to `channel` before a transfer.
    async fn select<B: I2c>(
        &mut self,
        bus: &mut B,
        channel: u8,
    ) -> Result<(), Error<B::Error>>;

    /// Return the chip to its default selection after a transfer on
    /// `channel`.
    async fn deselect<B: I2c>(
        &mut self,
        bus: &mut B,
        channel: u8,
    ) -> Result<(), Error<B::Error>>;

    /// Forget any cached register state.
    ///
    /// Called when a transfer was abandoned between select and deselect, so
    /// the hardware state is no longer known.
    fn invalidate(&mut self) {}

    /// Check the chip against the cached state. Chips that cannot be read
    /// back accept anything.
    async fn verify<B: I2c>(
        &mut self,
        _bus: &mut B,
    ) -> Result<(), Error<B::Error>> {
        Ok(())
    }

    /// Drop the cached state and put the chip back in its default
    /// selection.
    async fn reinit<B: I2c>(
        &mut self,
        bus: &mut B,
    ) -> Result<(), Error<B::Error>> {
        self.invalidate();
        self.deselect(bus, 0).await
    }
}

/// Exclusive arbitration for a physical bus shared with other hosts.
///
/// Acquired before the local parent lock and released after it.
#[allow(async_fn_in_trait)]
pub trait BusArbiter {
    /// Wait until this host owns the bus.
    async fn acquire(&self);

    /// Give the bus back to the other hosts.
    fn release(&self);
}

/// Arbiter for buses with a single host.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoArbiter;

impl BusArbiter for NoArbiter {
    async fn acquire(&self) {}

    fn release(&self) {}
}

/// Releases the arbiter on drop, including when the transfer is cancelled.
pub(crate) struct Arbitration<'a, A: BusArbiter> {
    arbiter: &'a A,
}

impl<'a, A: BusArbiter> Arbitration<'a, A> {
    pub(crate) async fn acquire(arbiter: &'a A) -> Self {
        arbiter.acquire().await;
        Self { arbiter }
    }
}

impl<A: BusArbiter> Drop for Arbitration<'_, A> {
    fn drop(&mut self) {
        self.arbiter.release();
    }
}
