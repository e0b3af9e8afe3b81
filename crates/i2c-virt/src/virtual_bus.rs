use core::ops::{Deref, DerefMut};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embedded_hal::i2c::Error as _;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

use crate::error::Error;
use crate::registry::BusId;
use crate::select::{Arbitration, BusArbiter, ChannelSelect};

/// A logical bus fronting one channel of a mux chip.
///
/// Every transaction locks the parent bus, selects the channel, forwards the
/// operations unchanged and deselects again before the parent is released.
/// Exclusive access to the handle (`&mut self`) is the child lock; share a
/// `VirtualBus` by putting it behind its own [`Mutex`], which is also how
/// a second mux is stacked behind this channel.
///
/// Dropping a transaction future between select and deselect cannot run the
/// deselect. The chip then stays on this channel until the next transaction
/// through the same mux; only the controller's cached register state is
/// dropped, so that transaction rewrites the register. Call
/// [`MuxAdapter::reinit`](crate::MuxAdapter::reinit) to park the chip
/// right away.
pub struct VirtualBus<'a, M: RawMutex, P: ErrorType, S, A> {
    parent: &'a Mutex<M, P>,
    selector: &'a Mutex<M, S>,
    arbiter: &'a A,
    channel: u8,
    id: BusId,
    advisory: Option<Error<P::Error>>,
}

impl<'a, M, P, S, A> VirtualBus<'a, M, P, S, A>
where
    M: RawMutex,
    P: ErrorType,
{
    pub(crate) fn new(
        parent: &'a Mutex<M, P>,
        selector: &'a Mutex<M, S>,
        arbiter: &'a A,
        channel: u8,
        id: BusId,
    ) -> Self {
        Self { parent, selector, arbiter, channel, id, advisory: None }
    }

    /// Registry id of this bus.
    pub fn id(&self) -> BusId {
        self.id
    }

    /// Mux channel this bus fronts.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Take the deselect error recorded by the last transaction that
    /// otherwise succeeded.
    pub fn take_advisory(&mut self) -> Option<Error<P::Error>> {
        self.advisory.take()
    }
}

/// Controller lock that invalidates the cached register state if dropped
/// while armed, i.e. when a transfer is abandoned mid-selection.
struct Selection<'g, M: RawMutex, S: ChannelSelect> {
    selector: MutexGuard<'g, M, S>,
    armed: bool,
}

impl<M: RawMutex, S: ChannelSelect> Deref for Selection<'_, M, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.selector
    }
}

impl<M: RawMutex, S: ChannelSelect> DerefMut for Selection<'_, M, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.selector
    }
}

impl<M: RawMutex, S: ChannelSelect> Drop for Selection<'_, M, S> {
    fn drop(&mut self) {
        if self.armed {
            warn!("transfer abandoned mid-selection, dropping mux cache");
            self.selector.invalidate();
        }
    }
}

impl<M, P, S, A> ErrorType for VirtualBus<'_, M, P, S, A>
where
    M: RawMutex,
    P: ErrorType,
{
    type Error = Error<P::Error>;
}

impl<M, P, S, A> I2c<SevenBitAddress> for VirtualBus<'_, M, P, S, A>
where
    M: RawMutex,
    P: I2c,
    S: ChannelSelect,
    A: BusArbiter,
{
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        // Drop order releases the controller, then the parent, then the
        // arbiter.
        let _arbitration = Arbitration::acquire(self.arbiter).await;
        let mut bus = self.parent.lock().await;
        let mut selection =
            Selection { selector: self.selector.lock().await, armed: true };

        if let Err(err) = selection.select(&mut *bus, self.channel).await {
            selection.armed = false;
            return Err(err);
        }

        let result = bus
            .transaction(address, operations)
            .await
            .map_err(Error::Transport);
        let deselected = selection.deselect(&mut *bus, self.channel).await;
        selection.armed = false;

        match (result, deselected) {
            (Ok(()), Err(err)) => {
                warn!(
                    "deselect after transfer on channel {} failed: {:?}",
                    self.channel,
                    err.kind()
                );
                self.advisory = Some(err);
                Ok(())
            }
            (Err(err), Err(secondary)) => {
                warn!(
                    "deselect after failed transfer on channel {} failed: {:?}",
                    self.channel,
                    secondary.kind()
                );
                Err(err)
            }
            (result, Ok(())) => result,
        }
    }
}
