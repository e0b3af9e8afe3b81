use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::I2c;

use crate::adapter::{AttachReport, MuxAdapter};
use crate::error::Error;
use crate::registry::{BusDescriptor, BusId, BusRegistry};
use crate::select::{Arbitration, BusArbiter, ChannelSelect};

/// Chip-specific presence check run against a candidate address.
#[allow(async_fn_in_trait)]
pub trait MuxDetect {
    /// `Ok(true)` if a supported chip answers at `address`.
    async fn detect<B: I2c>(
        &self,
        bus: &mut B,
        address: u8,
    ) -> Result<bool, B::Error>;
}

/// Where a discovery pass currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryState {
    Idle,
    ProbingPhysical,
    CreatingVirtualBuses,
}

/// Drives mux detection over the buses of a registry.
///
/// Registering a virtual bus queues it for discovery like any other bus.
/// Probing a bus the mux layer created itself would look for the mux behind
/// its own channels, so such buses are short-circuited as "not present"
/// before any lock is taken or any byte hits the wire.
pub struct Discovery<'r, M: RawMutex, const N: usize> {
    registry: &'r BusRegistry<M, N>,
    state: DiscoveryState,
    attempts: u32,
    skipped: u32,
}

impl<'r, M: RawMutex, const N: usize> Discovery<'r, M, N> {
    pub const fn new(registry: &'r BusRegistry<M, N>) -> Self {
        Self {
            registry,
            state: DiscoveryState::Idle,
            attempts: 0,
            skipped: 0,
        }
    }

    pub fn registry(&self) -> &'r BusRegistry<M, N> {
        self.registry
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Detection attempts that actually reached a bus.
    pub fn detection_attempts(&self) -> u32 {
        self.attempts
    }

    /// Probes refused because the bus is mux-owned.
    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    fn guard(&mut self, id: BusId) -> bool {
        if self.registry.is_mux_owned(id) {
            debug!("bus {} is behind a mux, not probing", id.raw());
            self.skipped += 1;
            return true;
        }
        false
    }

    /// Next queued bus that may be probed, skipping mux-owned ones.
    pub fn next_pending(&mut self) -> Option<BusDescriptor> {
        while let Some(desc) = self.registry.take_pending() {
            if !self.guard(desc.id) {
                return Some(desc);
            }
        }
        None
    }

    /// Look for a mux at `address` on the bus `bus_id`.
    ///
    /// `arbiter` is held around the detection read, as for any other
    /// transfer on `bus`.
    pub async fn probe<P, D, A>(
        &mut self,
        bus_id: BusId,
        bus: &Mutex<M, P>,
        arbiter: &A,
        address: u8,
        detector: &D,
    ) -> Result<bool, Error<P::Error>>
    where
        P: I2c,
        D: MuxDetect,
        A: BusArbiter,
    {
        if self.guard(bus_id) {
            return Ok(false);
        }

        self.state = DiscoveryState::ProbingPhysical;
        self.attempts += 1;
        let found = {
            let _arbitration = Arbitration::acquire(arbiter).await;
            let mut bus = bus.lock().await;
            detector.detect(&mut *bus, address).await
        };
        self.state = DiscoveryState::Idle;

        let found = found?;
        if found {
            debug!("mux found at 0x{:02x} on bus {}", address, bus_id.raw());
        }
        Ok(found)
    }

    /// Expose the channels of a detected mux.
    pub fn attach<P, S, A>(
        &mut self,
        parent_id: BusId,
        parent: &'r Mutex<M, P>,
        address: u8,
        selector: S,
        arbiter: A,
    ) -> (MuxAdapter<'r, M, P, S, N, A>, AttachReport)
    where
        S: ChannelSelect,
    {
        self.state = DiscoveryState::CreatingVirtualBuses;
        let attached = MuxAdapter::attach(
            self.registry,
            parent_id,
            parent,
            address,
            selector,
            arbiter,
        );
        self.state = DiscoveryState::Idle;
        attached
    }
}
