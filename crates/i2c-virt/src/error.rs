use embedded_hal::i2c::ErrorKind;

/// Errors reported by the bus registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// The registry has no free slot left.
    Full,
    /// The channel is already exposed by a registered virtual bus.
    DuplicateChannel,
    /// No bus with this id is registered.
    UnknownBus,
    /// The parent of a virtual bus is not registered.
    UnknownParent,
    /// The bus still has `n` registered children and cannot be removed.
    InUse(usize),
    /// The channel has no registered virtual bus.
    Unregistered,
}

impl core::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RegistryError::Full => write!(f, "bus registry is full"),
            RegistryError::DuplicateChannel => {
                write!(f, "channel already has a virtual bus")
            }
            RegistryError::UnknownBus => write!(f, "unknown bus"),
            RegistryError::UnknownParent => write!(f, "unknown parent bus"),
            RegistryError::InUse(n) => {
                write!(f, "bus still has {} registered children", n)
            }
            RegistryError::Unregistered => {
                write!(f, "channel has no registered virtual bus")
            }
        }
    }
}

/// Errors that can occur while routing a transfer through a mux channel.
///
/// `E` is the error type of the parent bus.
#[derive(derive_more::From, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Channel index outside `[0, channel_count)`.
    InvalidChannel(u8),
    /// The parent bus failed the transfer.
    #[from]
    Transport(E),
    /// A multiplexer read back a register value it cannot produce.
    HardwareInconsistency(u8),
    /// The controller saw an inconsistency and refuses to select until
    /// it is re-initialized.
    Degraded,
    /// The registry rejected creating or removing a virtual bus.
    Registration(RegistryError),
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidChannel(ch) => write!(f, "invalid channel {}", ch),
            Error::Transport(err) => write!(f, "transport error: {:?}", err),
            Error::HardwareInconsistency(reg) => {
                write!(f, "inconsistent mux register 0x{:02x}", reg)
            }
            Error::Degraded => write!(f, "mux controller is degraded"),
            Error::Registration(err) => write!(f, "registration error: {}", err),
        }
    }
}

impl<E: embedded_hal::i2c::Error> embedded_hal::i2c::Error for Error<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(err) => err.kind(),
            _ => ErrorKind::Other,
        }
    }
}
