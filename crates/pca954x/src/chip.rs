use embedded_hal::i2c::{Error as _, ErrorKind};
use embedded_hal_async::i2c::I2c;
use i2c_virt::MuxDetect;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::mask::ChannelMask;

/// How a chip routes its channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipKind {
    /// At most one channel is connected at a time.
    Multiplexer,
    /// Any subset of channels may be connected at once.
    Switch,
}

/// Members of the PCA954x family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Part {
    Pca9540,
    Pca9542,
    Pca9543,
    Pca9544,
    Pca9545,
    Pca9546,
    Pca9547,
    Pca9548,
}

impl Part {
    pub const fn family(self) -> ChipFamily {
        let (kind, channels) = match self {
            Part::Pca9540 | Part::Pca9542 => (ChipKind::Multiplexer, 2),
            Part::Pca9543 => (ChipKind::Switch, 2),
            Part::Pca9544 => (ChipKind::Multiplexer, 4),
            Part::Pca9545 | Part::Pca9546 => (ChipKind::Switch, 4),
            Part::Pca9547 => (ChipKind::Multiplexer, 8),
            Part::Pca9548 => (ChipKind::Switch, 8),
        };
        ChipFamily { kind, channels }
    }
}

/// Register layout of a chip: its kind and channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipFamily {
    kind: ChipKind,
    channels: u8,
}

impl ChipFamily {
    /// `channels` must be 2, 4 or 8.
    pub const fn new(kind: ChipKind, channels: u8) -> Result<Self, ConfigError> {
        match channels {
            2 | 4 | 8 => Ok(Self { kind, channels }),
            _ => Err(ConfigError::InvalidChannelCount(channels)),
        }
    }

    pub const fn kind(&self) -> ChipKind {
        self.kind
    }

    pub const fn channels(&self) -> u8 {
        self.channels
    }

    pub const fn full_mask(&self) -> ChannelMask {
        ChannelMask::full(self.channels)
    }

    /// Multiplexer enable bit; sits just above the channel index bits, and
    /// never below bit 2.
    pub const fn enable_bit(&self) -> u8 {
        if self.channels > 4 {
            self.channels
        } else {
            0x04
        }
    }

    /// Register value that connects `mask`.
    ///
    /// A multiplexer can connect only one channel, so it gets the lowest one
    /// in `mask`. Bits past the channel count are ignored.
    pub const fn channel_to_register(&self, mask: ChannelMask) -> u8 {
        let mask = mask.intersection(self.full_mask());
        match self.kind {
            ChipKind::Switch => mask.bits(),
            ChipKind::Multiplexer => match mask.lowest() {
                Some(ch) => self.enable_bit() | ch,
                None => 0,
            },
        }
    }

    /// Channels connected by register value `reg`.
    pub const fn register_to_mask(&self, reg: u8) -> ChannelMask {
        match self.kind {
            ChipKind::Switch => {
                ChannelMask::from_bits_retain(reg).intersection(self.full_mask())
            }
            ChipKind::Multiplexer => {
                if reg & self.enable_bit() == 0 {
                    ChannelMask::empty()
                } else {
                    ChannelMask::channel(reg & (self.channels - 1))
                }
            }
        }
    }

    /// `false` if `reg` is not something this chip can report.
    ///
    /// Switch registers are always accepted: some parts report interrupt
    /// status in the bits above the channels.
    pub const fn is_consistent(&self, reg: u8) -> bool {
        match self.kind {
            ChipKind::Switch => true,
            ChipKind::Multiplexer => {
                let index = self.channels - 1;
                let enable = self.enable_bit();
                reg & !(enable | index) == 0
                    && (reg & enable != 0 || reg & index == 0)
            }
        }
    }
}

impl MuxDetect for ChipFamily {
    async fn detect<B: I2c>(
        &self,
        bus: &mut B,
        address: u8,
    ) -> Result<bool, B::Error> {
        let mut reg = [0u8];
        match bus.read(address, &mut reg).await {
            Ok(()) => {
                let ok = self.is_consistent(reg[0]);
                if !ok {
                    debug!(
                        "0x{:02x} answered with 0x{:02x}, not a {:?}",
                        address,
                        reg[0],
                        self.kind
                    );
                }
                Ok(ok)
            }
            Err(err) if matches!(err.kind(), ErrorKind::NoAcknowledge(_)) => {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}
