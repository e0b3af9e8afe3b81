use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::I2c;
use heapless::Vec;

use crate::error::{Error, RegistryError};
use crate::registry::{BusId, BusRegistry, MuxId};
use crate::select::{Arbitration, BusArbiter, ChannelSelect, NoArbiter};
use crate::virtual_bus::VirtualBus;

/// Most channels any supported chip has.
pub const MAX_CHANNELS: usize = 8;

/// Outcome of exposing the channels of a mux.
///
/// Attaching never fails as a whole: channels the registry refused are
/// listed in `failures` and the remaining ones stay usable.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttachReport {
    pub created: u8,
    pub failures: Vec<(u8, RegistryError), MAX_CHANNELS>,
}

impl AttachReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// An attached mux chip and the virtual buses of its channels.
///
/// Owns the controller; virtual-bus handles borrow from the adapter, so the
/// adapter cannot go away while any of them is alive. Dropping the adapter
/// unregisters every channel it exposed.
pub struct MuxAdapter<'a, M, P, S, const N: usize, A = NoArbiter>
where
    M: RawMutex,
{
    registry: &'a BusRegistry<M, N>,
    parent: &'a Mutex<M, P>,
    selector: Mutex<M, S>,
    arbiter: A,
    mux: MuxId,
    channels: Vec<Option<BusId>, MAX_CHANNELS>,
}

impl<'a, M, P, S, const N: usize, A> MuxAdapter<'a, M, P, S, N, A>
where
    M: RawMutex,
    S: ChannelSelect,
{
    /// Register one virtual bus per channel of `selector`.
    ///
    /// `parent_id` is the registry id of `parent`, which may itself be a
    /// virtual bus.
    pub fn attach(
        registry: &'a BusRegistry<M, N>,
        parent_id: BusId,
        parent: &'a Mutex<M, P>,
        address: u8,
        selector: S,
        arbiter: A,
    ) -> (Self, AttachReport) {
        let mux = MuxId { parent: parent_id, address };
        let count = usize::from(selector.channel_count()).min(MAX_CHANNELS);

        let mut channels = Vec::new();
        let mut report = AttachReport { created: 0, failures: Vec::new() };
        for ch in 0..count as u8 {
            let slot = match registry.register_virtual(mux, ch) {
                Ok(id) => {
                    debug!(
                        "mux 0x{:02x} channel {} is bus {}",
                        address,
                        ch,
                        id.raw()
                    );
                    report.created += 1;
                    Some(id)
                }
                Err(err) => {
                    let _ = report.failures.push((ch, err));
                    None
                }
            };
            // `count` is capped at the capacity.
            let _ = channels.push(slot);
        }

        if report.is_complete() {
            info!(
                "mux 0x{:02x} on bus {}: {} channels",
                address,
                parent_id.raw(),
                report.created
            );
        } else {
            warn!(
                "mux 0x{:02x} on bus {}: exposed {} of {} channels",
                address,
                parent_id.raw(),
                report.created,
                count
            );
        }

        let adapter = Self {
            registry,
            parent,
            selector: Mutex::new(selector),
            arbiter,
            mux,
            channels,
        };
        (adapter, report)
    }

    pub fn mux_id(&self) -> MuxId {
        self.mux
    }

    pub fn channel_count(&self) -> u8 {
        self.channels.len() as u8
    }

    /// Registry id of the virtual bus on `channel`, if it was registered.
    pub fn bus_id(&self, channel: u8) -> Option<BusId> {
        self.channels.get(usize::from(channel)).copied().flatten()
    }
}

impl<'a, M, P, S, const N: usize, A> MuxAdapter<'a, M, P, S, N, A>
where
    M: RawMutex,
    P: I2c,
    S: ChannelSelect,
    A: BusArbiter,
{
    /// Handle for the virtual bus on `channel`.
    pub fn channel(
        &self,
        channel: u8,
    ) -> Result<VirtualBus<'_, M, P, S, A>, Error<P::Error>> {
        let slot = self
            .channels
            .get(usize::from(channel))
            .ok_or(Error::<P::Error>::InvalidChannel(channel))?;
        let id = slot.ok_or(Error::<P::Error>::Registration(
            RegistryError::Unregistered,
        ))?;
        Ok(VirtualBus::new(
            self.parent,
            &self.selector,
            &self.arbiter,
            channel,
            id,
        ))
    }

    /// Unregister the virtual bus of one channel.
    pub fn remove_channel(
        &mut self,
        channel: u8,
    ) -> Result<(), Error<P::Error>> {
        let slot = self
            .channels
            .get_mut(usize::from(channel))
            .ok_or(Error::<P::Error>::InvalidChannel(channel))?;
        let id = slot.ok_or(Error::<P::Error>::Registration(
            RegistryError::Unregistered,
        ))?;
        self.registry
            .unregister(id)
            .map_err(Error::<P::Error>::Registration)?;
        *slot = None;
        Ok(())
    }

    /// Run `f` on the controller with the parent bus locked, e.g. to change
    /// its default selection between transfers.
    pub async fn configure<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let _bus = self.parent.lock().await;
        let mut selector = self.selector.lock().await;
        f(&mut selector)
    }

    /// Read the chip back and check it against the controller's view.
    ///
    /// A controller that finds the hardware inconsistent may refuse further
    /// selections until [`reinit`](Self::reinit).
    pub async fn verify(&self) -> Result<(), Error<P::Error>> {
        let _arbitration = Arbitration::acquire(&self.arbiter).await;
        let mut bus = self.parent.lock().await;
        let mut selector = self.selector.lock().await;
        selector.verify(&mut *bus).await
    }

    /// Force the controller and the chip back into the default selection.
    pub async fn reinit(&self) -> Result<(), Error<P::Error>> {
        let _arbitration = Arbitration::acquire(&self.arbiter).await;
        let mut bus = self.parent.lock().await;
        let mut selector = self.selector.lock().await;
        selector.reinit(&mut *bus).await
    }

    /// Restore the default selection, then unregister every channel.
    pub async fn detach(self) -> Result<(), Error<P::Error>> {
        {
            let _arbitration = Arbitration::acquire(&self.arbiter).await;
            let mut bus = self.parent.lock().await;
            let mut selector = self.selector.lock().await;
            selector.deselect(&mut *bus, 0).await?;
        }
        Ok(())
    }
}

impl<M, P, S, const N: usize, A> Drop for MuxAdapter<'_, M, P, S, N, A>
where
    M: RawMutex,
{
    fn drop(&mut self) {
        for (ch, slot) in self.channels.iter_mut().enumerate() {
            if let Some(id) = slot.take() {
                if let Err(err) = self.registry.unregister(id) {
                    warn!(
                        "channel {} of mux 0x{:02x}: {:?}",
                        ch,
                        self.mux.address,
                        err
                    );
                }
            }
        }
    }
}
