use serde::{Deserialize, Serialize};

use crate::chip::{ChipFamily, ChipKind, Part};
use crate::mask::ChannelMask;

/// Invalid mux configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Only 2, 4 and 8 channel chips exist.
    InvalidChannelCount(u8),
    /// Not a 7-bit I2C address.
    InvalidAddress(u8),
    /// The default mask names channels the chip does not have.
    DefaultMaskOutOfRange(u8),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::InvalidChannelCount(n) => {
                write!(f, "invalid channel count: {}", n)
            }
            ConfigError::InvalidAddress(addr) => {
                write!(f, "invalid I2C address: 0x{:02x}", addr)
            }
            ConfigError::DefaultMaskOutOfRange(mask) => {
                write!(f, "default mask out of range: 0b{:08b}", mask)
            }
        }
    }
}

/// Per-chip configuration.
///
/// Plain data so it can come from any serde format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MuxConfig {
    /// 7-bit address of the chip on its parent bus.
    pub address: u8,
    pub chip_kind: ChipKind,
    pub channel_count: u8,
    /// Channels to leave connected between transfers.
    #[serde(default)]
    pub default_channel_mask: u8,
}

impl MuxConfig {
    /// Configuration for a known part with nothing connected between
    /// transfers.
    pub const fn for_part(part: Part, address: u8) -> Self {
        let family = part.family();
        Self {
            address,
            chip_kind: family.kind(),
            channel_count: family.channels(),
            default_channel_mask: 0,
        }
    }

    pub const fn with_default_mask(mut self, mask: ChannelMask) -> Self {
        self.default_channel_mask = mask.bits();
        self
    }

    pub fn validate(&self) -> Result<ChipFamily, ConfigError> {
        let family = ChipFamily::new(self.chip_kind, self.channel_count)?;
        if self.address > 0x7f {
            return Err(ConfigError::InvalidAddress(self.address));
        }
        if self.default_channel_mask & !family.full_mask().bits() != 0 {
            return Err(ConfigError::DefaultMaskOutOfRange(
                self.default_channel_mask,
            ));
        }
        Ok(family)
    }

    pub const fn default_mask(&self) -> ChannelMask {
        ChannelMask::from_bits_retain(self.default_channel_mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_config_is_valid() {
        let config = MuxConfig::for_part(Part::Pca9548, 0x70);
        let family = config.validate().unwrap();
        assert_eq!(family.kind(), ChipKind::Switch);
        assert_eq!(family.channels(), 8);
    }

    #[test]
    fn rejects_bad_address() {
        let config = MuxConfig::for_part(Part::Pca9545, 0x80);
        assert_eq!(config.validate(), Err(ConfigError::InvalidAddress(0x80)));
    }

    #[test]
    fn rejects_default_mask_past_channel_count() {
        let config = MuxConfig::for_part(Part::Pca9544, 0x70)
            .with_default_mask(ChannelMask::CH4);
        assert_eq!(
            config.validate(),
            Err(ConfigError::DefaultMaskOutOfRange(0x10))
        );
    }

    #[test]
    fn rejects_bad_channel_count() {
        let config = MuxConfig {
            address: 0x70,
            chip_kind: ChipKind::Multiplexer,
            channel_count: 16,
            default_channel_mask: 0,
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidChannelCount(16))
        );
    }

    #[test]
    fn postcard_config() {
        let config = MuxConfig::for_part(Part::Pca9547, 0x71)
            .with_default_mask(ChannelMask::CH2);
        let mut buf = [0u8; 16];
        let bytes = postcard::to_slice(&config, &mut buf).unwrap();
        let back: MuxConfig = postcard::from_bytes(bytes).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.default_mask(), ChannelMask::CH2);
    }
}
