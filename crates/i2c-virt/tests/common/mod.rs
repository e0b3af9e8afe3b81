#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};
use i2c_virt::{BusArbiter, ChannelSelect, Error, MuxDetect};

// ---------------------------------------------------------------------------
// Shared log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write(u8, Vec<u8>),
    Read(u8, usize),
    Acquire,
    Release,
}

#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<Event>>>);

impl Log {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

// ---------------------------------------------------------------------------
// Mock parent bus
// ---------------------------------------------------------------------------

/// Records every operation; NACKs addresses listed in `nack`.
pub struct MockBus {
    pub log: Log,
    pub nack: Arc<Mutex<Vec<u8>>>,
}

impl MockBus {
    pub fn new(log: &Log) -> Self {
        Self { log: log.clone(), nack: Arc::default() }
    }

    pub fn nack_handle(&self) -> Arc<Mutex<Vec<u8>>> {
        self.nack.clone()
    }
}

impl ErrorType for MockBus {
    type Error = ErrorKind;
}

impl I2c for MockBus {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    self.log.push(Event::Write(address, bytes.to_vec()))
                }
                Operation::Read(buf) => {
                    self.log.push(Event::Read(address, buf.len()));
                    buf.fill(0);
                }
            }
        }
        // Give other tasks a chance to run in the middle of a transfer.
        embassy_futures::yield_now().await;
        if self.nack.lock().unwrap().contains(&address) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock controller
// ---------------------------------------------------------------------------

/// Switch-like selector writing `1 << channel` on select and `0` on
/// deselect, with injectable failures.
pub struct MockSelector {
    pub address: u8,
    pub channels: u8,
    pub fail_select: bool,
    pub fail_deselect: bool,
    pub deselects: Arc<AtomicUsize>,
    pub invalidations: Arc<AtomicUsize>,
}

impl MockSelector {
    pub fn new(address: u8, channels: u8) -> Self {
        Self {
            address,
            channels,
            fail_select: false,
            fail_deselect: false,
            deselects: Arc::default(),
            invalidations: Arc::default(),
        }
    }
}

impl ChannelSelect for MockSelector {
    fn channel_count(&self) -> u8 {
        self.channels
    }

    async fn select<B: I2c>(
        &mut self,
        bus: &mut B,
        channel: u8,
    ) -> Result<(), Error<B::Error>> {
        if channel >= self.channels {
            return Err(Error::InvalidChannel(channel));
        }
        if self.fail_select {
            return Err(Error::Degraded);
        }
        bus.write(self.address, &[1 << channel]).await?;
        Ok(())
    }

    async fn deselect<B: I2c>(
        &mut self,
        bus: &mut B,
        _channel: u8,
    ) -> Result<(), Error<B::Error>> {
        self.deselects.fetch_add(1, Ordering::SeqCst);
        if self.fail_deselect {
            return Err(Error::HardwareInconsistency(0xff));
        }
        bus.write(self.address, &[0]).await?;
        Ok(())
    }

    fn invalidate(&mut self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Mock arbiter and detector
// ---------------------------------------------------------------------------

pub struct MockArbiter {
    pub log: Log,
}

impl BusArbiter for MockArbiter {
    async fn acquire(&self) {
        self.log.push(Event::Acquire);
    }

    fn release(&self) {
        self.log.push(Event::Release);
    }
}

/// Reports a mux at `present`, counting every call.
#[derive(Default)]
pub struct MockDetect {
    pub present: Option<u8>,
    pub calls: AtomicUsize,
}

impl MuxDetect for MockDetect {
    async fn detect<B: I2c>(
        &self,
        bus: &mut B,
        address: u8,
    ) -> Result<bool, B::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut reg = [0u8];
        bus.read(address, &mut reg).await?;
        Ok(self.present == Some(address))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Checks that every select on a mux is followed by the device traffic and a
/// deselect of that same mux before any other channel is selected.
pub fn assert_no_interleaving(events: &[Event], mux: u8) {
    let mut open: Option<u8> = None;
    for event in events {
        if let Event::Write(addr, bytes) = event {
            if *addr != mux {
                assert!(open.is_some(), "device traffic outside a selection");
                continue;
            }
            match (open, bytes[0]) {
                (None, 0) => panic!("deselect without select"),
                (None, reg) => open = Some(reg),
                (Some(_), 0) => open = None,
                (Some(reg), other) => {
                    panic!("selected 0x{other:02x} while 0x{reg:02x} was open")
                }
            }
        }
    }
    assert_eq!(open, None);
}
