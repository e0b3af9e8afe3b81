use embedded_hal_async::i2c::I2c;
use i2c_virt::{ChannelSelect, Error};

use crate::chip::{ChipFamily, ChipKind};
use crate::config::{ConfigError, MuxConfig};
use crate::mask::ChannelMask;

/// Driver state for one PCA954x chip.
///
/// The chip has a single control register; the controller keeps a
/// write-through copy of the last value written so repeated selections do not
/// generate bus traffic. It is only ever used with the parent bus locked.
#[derive(Debug)]
pub struct MuxController {
    address: u8,
    family: ChipFamily,
    /// Last value written, `None` when the hardware state is unknown.
    cached: Option<u8>,
    active: ChannelMask,
    default_mask: ChannelMask,
    degraded: bool,
}

impl MuxController {
    pub fn new(config: &MuxConfig) -> Result<Self, ConfigError> {
        let family = config.validate()?;
        Ok(Self {
            address: config.address,
            family,
            cached: None,
            active: ChannelMask::empty(),
            default_mask: config.default_mask(),
            degraded: false,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn family(&self) -> ChipFamily {
        self.family
    }

    /// Channels connected by the last register write.
    pub fn active_mask(&self) -> ChannelMask {
        self.active
    }

    pub fn default_mask(&self) -> ChannelMask {
        self.default_mask
    }

    pub fn cached_register(&self) -> Option<u8> {
        self.cached
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Channels to leave connected between transfers. Takes effect on the
    /// next select or deselect; nothing is written here.
    pub fn set_default_mask(&mut self, mask: ChannelMask) {
        self.default_mask = mask.intersection(self.family.full_mask());
    }

    pub fn channel_to_register(&self, mask: ChannelMask) -> u8 {
        self.family.channel_to_register(mask)
    }

    pub fn register_to_mask(&self, reg: u8) -> ChannelMask {
        self.family.register_to_mask(reg)
    }

    /// Write `reg` unless the chip already holds it. Zero is always written.
    async fn write<B: I2c>(
        &mut self,
        bus: &mut B,
        reg: u8,
    ) -> Result<(), Error<B::Error>> {
        if reg != 0 && self.cached == Some(reg) {
            trace!("mux 0x{:02x} already at 0x{:02x}", self.address, reg);
            return Ok(());
        }

        trace!("mux 0x{:02x} <- 0x{:02x}", self.address, reg);
        bus.write(self.address, &[reg]).await?;
        self.cached = Some(reg);
        self.active = self.family.register_to_mask(reg);
        Ok(())
    }

    /// Read the control register back and check it is something this chip
    /// can produce.
    ///
    /// A multiplexer reporting an impossible value marks the controller
    /// degraded; it then refuses to select until [`reinit`](Self::reinit).
    pub async fn verify<B: I2c>(
        &mut self,
        bus: &mut B,
    ) -> Result<ChannelMask, Error<B::Error>> {
        let mut reg = [0u8];
        bus.read(self.address, &mut reg).await?;
        let reg = reg[0];

        if !self.family.is_consistent(reg) {
            error!("mux 0x{:02x} reads back 0x{:02x}", self.address, reg);
            self.degraded = true;
            return Err(Error::HardwareInconsistency(reg));
        }
        Ok(self.family.register_to_mask(reg))
    }

    /// Clear the degraded state and force the default selection onto the
    /// chip.
    pub async fn reinit<B: I2c>(
        &mut self,
        bus: &mut B,
    ) -> Result<(), Error<B::Error>> {
        self.cached = None;
        let reg = self.family.channel_to_register(self.default_mask);
        self.write(bus, reg).await?;
        self.degraded = false;
        Ok(())
    }
}

impl ChannelSelect for MuxController {
    fn channel_count(&self) -> u8 {
        self.family.channels()
    }

    async fn select<B: I2c>(
        &mut self,
        bus: &mut B,
        channel: u8,
    ) -> Result<(), Error<B::Error>> {
        if channel >= self.family.channels() {
            return Err(Error::InvalidChannel(channel));
        }
        if self.degraded {
            return Err(Error::Degraded);
        }

        // A multiplexer parked on this channel by its default selection is
        // left alone.
        if self.family.kind() == ChipKind::Multiplexer
            && self.cached.is_some()
            && self.active.has_channel(channel)
            && self.active.intersects(self.default_mask)
        {
            return Ok(());
        }

        let reg =
            self.family.channel_to_register(ChannelMask::channel(channel));
        self.write(bus, reg).await
    }

    async fn deselect<B: I2c>(
        &mut self,
        bus: &mut B,
        channel: u8,
    ) -> Result<(), Error<B::Error>> {
        if channel >= self.family.channels() {
            return Err(Error::InvalidChannel(channel));
        }
        let reg = self.family.channel_to_register(self.default_mask);
        self.write(bus, reg).await
    }

    fn invalidate(&mut self) {
        self.cached = None;
    }

    async fn verify<B: I2c>(
        &mut self,
        bus: &mut B,
    ) -> Result<(), Error<B::Error>> {
        MuxController::verify(self, bus).await.map(|_| ())
    }

    async fn reinit<B: I2c>(
        &mut self,
        bus: &mut B,
    ) -> Result<(), Error<B::Error>> {
        MuxController::reinit(self, bus).await
    }
}
