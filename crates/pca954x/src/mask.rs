use bitflags::bitflags;

bitflags! {
    /// Set of mux channels, bit `n` standing for channel `n`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelMask: u8 {
        const CH0 = 1 << 0;
        const CH1 = 1 << 1;
        const CH2 = 1 << 2;
        const CH3 = 1 << 3;
        const CH4 = 1 << 4;
        const CH5 = 1 << 5;
        const CH6 = 1 << 6;
        const CH7 = 1 << 7;
    }
}

impl ChannelMask {
    /// All channels of a chip with `count` channels.
    pub const fn full(count: u8) -> Self {
        Self::from_bits_retain(((1u16 << count) - 1) as u8)
    }

    /// Just `channel`. Channels past 7 give an empty mask.
    pub const fn channel(channel: u8) -> Self {
        if channel < 8 {
            Self::from_bits_retain(1 << channel)
        } else {
            Self::empty()
        }
    }

    /// Lowest channel in the set.
    pub const fn lowest(self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.bits().trailing_zeros() as u8)
        }
    }

    pub const fn has_channel(self, channel: u8) -> bool {
        self.intersects(Self::channel(channel))
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ChannelMask {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "ChannelMask({=u8:08b})", self.bits())
    }
}
