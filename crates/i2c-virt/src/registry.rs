use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::{Deque, Vec};
use portable_atomic::{AtomicU32, Ordering};

use crate::error::RegistryError;

/// Identity of a registered bus, unique for the lifetime of its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusId(u32);

impl BusId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Identity of a mux chip: the bus it sits on and its address there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MuxId {
    pub parent: BusId,
    pub address: u8,
}

/// A registered bus.
///
/// Physical buses have neither `parent` nor `created_by`. Virtual buses have
/// both, plus the channel of the mux they front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusDescriptor {
    pub id: BusId,
    pub parent: Option<BusId>,
    pub created_by: Option<MuxId>,
    pub channel: Option<u8>,
}

impl BusDescriptor {
    /// `true` for buses created by the mux layer.
    pub fn is_mux_owned(&self) -> bool {
        self.created_by.is_some()
    }
}

struct Inner<const N: usize> {
    buses: Vec<BusDescriptor, N>,
    pending: Deque<BusId, N>,
}

impl<const N: usize> Inner<N> {
    fn find(&self, id: BusId) -> Option<&BusDescriptor> {
        self.buses.iter().find(|b| b.id == id)
    }

    fn children(&self, id: BusId) -> usize {
        self.buses.iter().filter(|b| b.parent == Some(id)).count()
    }
}

/// Tracks every live bus, physical or virtual, with room for `N` of them.
///
/// Registering a bus also queues it for discovery; see
/// [`Discovery`](crate::Discovery).
pub struct BusRegistry<M: RawMutex, const N: usize> {
    inner: Mutex<M, RefCell<Inner<N>>>,
    next_id: AtomicU32,
}

impl<M: RawMutex, const N: usize> BusRegistry<M, N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                buses: Vec::new(),
                pending: Deque::new(),
            })),
            next_id: AtomicU32::new(0),
        }
    }

    /// Register a physical bus.
    pub fn register_physical(&self) -> Result<BusId, RegistryError> {
        self.register(None, None, None)
    }

    /// Register the virtual bus fronting `channel` of `mux`.
    pub fn register_virtual(
        &self,
        mux: MuxId,
        channel: u8,
    ) -> Result<BusId, RegistryError> {
        self.register(Some(mux.parent), Some(mux), Some(channel))
    }

    fn register(
        &self,
        parent: Option<BusId>,
        created_by: Option<MuxId>,
        channel: Option<u8>,
    ) -> Result<BusId, RegistryError> {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();

            if let Some(parent) = parent {
                if inner.find(parent).is_none() {
                    return Err(RegistryError::UnknownParent);
                }
            }
            if created_by.is_some()
                && inner.buses.iter().any(|b| {
                    b.created_by == created_by && b.channel == channel
                })
            {
                return Err(RegistryError::DuplicateChannel);
            }
            if inner.buses.is_full() {
                return Err(RegistryError::Full);
            }

            let id = BusId(self.next_id.fetch_add(1, Ordering::Relaxed));
            let desc = BusDescriptor { id, parent, created_by, channel };
            inner.buses.push(desc).map_err(|_| RegistryError::Full)?;
            // Pending never outgrows `buses`, so this cannot fail.
            let _ = inner.pending.push_back(id);
            Ok(id)
        })
    }

    /// Remove a bus. Fails while the bus still has registered children.
    pub fn unregister(
        &self,
        id: BusId,
    ) -> Result<BusDescriptor, RegistryError> {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();

            let pos = inner
                .buses
                .iter()
                .position(|b| b.id == id)
                .ok_or(RegistryError::UnknownBus)?;
            let n = inner.children(id);
            if n > 0 {
                return Err(RegistryError::InUse(n));
            }

            let desc = inner.buses.swap_remove(pos);
            let mut pending = Deque::new();
            while let Some(queued) = inner.pending.pop_front() {
                if queued != id {
                    let _ = pending.push_back(queued);
                }
            }
            inner.pending = pending;
            Ok(desc)
        })
    }

    pub fn get(&self, id: BusId) -> Option<BusDescriptor> {
        self.inner.lock(|inner| inner.borrow().find(id).copied())
    }

    /// `true` if `id` is a virtual bus created by the mux layer.
    ///
    /// Unknown ids are not mux-owned.
    pub fn is_mux_owned(&self, id: BusId) -> bool {
        self.get(id).is_some_and(|b| b.is_mux_owned())
    }

    /// Number of registered buses whose parent is `id`.
    pub fn child_count(&self, id: BusId) -> usize {
        self.inner.lock(|inner| inner.borrow().children(id))
    }

    /// Registered children of `id`, in registration order.
    pub fn children(&self, id: BusId) -> Vec<BusDescriptor, N> {
        self.inner.lock(|inner| {
            let inner = inner.borrow();
            let mut out: Vec<BusDescriptor, N> = inner
                .buses
                .iter()
                .filter(|b| b.parent == Some(id))
                .copied()
                .collect();
            out.sort_unstable_by_key(|b| b.id);
            out
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().buses.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pop the oldest bus still waiting for discovery.
    pub(crate) fn take_pending(&self) -> Option<BusDescriptor> {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            while let Some(id) = inner.pending.pop_front() {
                if let Some(desc) = inner.find(id) {
                    return Some(*desc);
                }
            }
            None
        })
    }
}

impl<M: RawMutex, const N: usize> Default for BusRegistry<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;

    #[test]
    fn ids_are_not_reused() {
        let registry = BusRegistry::<NoopRawMutex, 4>::new();
        let a = registry.register_physical().unwrap();
        registry.unregister(a).unwrap();
        let b = registry.register_physical().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn full_registry_rejects() {
        let registry = BusRegistry::<NoopRawMutex, 2>::new();
        registry.register_physical().unwrap();
        registry.register_physical().unwrap();
        assert_eq!(registry.register_physical(), Err(RegistryError::Full));
    }

    #[test]
    fn duplicate_channel_rejected() {
        let registry = BusRegistry::<NoopRawMutex, 4>::new();
        let root = registry.register_physical().unwrap();
        let mux = MuxId { parent: root, address: 0x70 };
        registry.register_virtual(mux, 1).unwrap();
        assert_eq!(
            registry.register_virtual(mux, 1),
            Err(RegistryError::DuplicateChannel)
        );
        // Same channel on another chip is fine.
        let other = MuxId { parent: root, address: 0x71 };
        assert!(registry.register_virtual(other, 1).is_ok());
    }

    #[test]
    fn unknown_parent_rejected() {
        let registry = BusRegistry::<NoopRawMutex, 4>::new();
        let mux = MuxId { parent: BusId(9), address: 0x70 };
        assert_eq!(
            registry.register_virtual(mux, 0),
            Err(RegistryError::UnknownParent)
        );
    }

    #[test]
    fn parent_with_children_is_in_use() {
        let registry = BusRegistry::<NoopRawMutex, 4>::new();
        let root = registry.register_physical().unwrap();
        let mux = MuxId { parent: root, address: 0x70 };
        let ch0 = registry.register_virtual(mux, 0).unwrap();
        registry.register_virtual(mux, 1).unwrap();

        assert_eq!(registry.unregister(root), Err(RegistryError::InUse(2)));
        registry.unregister(ch0).unwrap();
        assert_eq!(registry.child_count(root), 1);
        assert!(registry.is_mux_owned(registry.children(root)[0].id));
        assert!(!registry.is_mux_owned(root));
    }

    #[test]
    fn unregister_drops_pending_entry() {
        let registry = BusRegistry::<NoopRawMutex, 4>::new();
        let a = registry.register_physical().unwrap();
        let b = registry.register_physical().unwrap();
        registry.unregister(a).unwrap();
        assert_eq!(registry.take_pending().map(|d| d.id), Some(b));
        assert_eq!(registry.take_pending(), None);
    }
}
