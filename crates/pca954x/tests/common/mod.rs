#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Write(u8, Vec<u8>),
    Read(u8),
}

/// A bus with one PCA954x-like chip at `mux`.
///
/// Single-byte writes to the chip land in its register, reads return it.
/// Everything is recorded.
#[derive(Clone)]
pub struct MockBus {
    pub mux: u8,
    pub ops: Arc<Mutex<Vec<Op>>>,
    pub register: Arc<AtomicU8>,
    pub fail_writes: Arc<AtomicBool>,
    pub absent: Arc<AtomicBool>,
}

impl MockBus {
    pub fn new(mux: u8) -> Self {
        Self {
            mux,
            ops: Arc::default(),
            register: Arc::default(),
            fail_writes: Arc::default(),
            absent: Arc::default(),
        }
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    /// Values written to the chip, in order.
    pub fn register_writes(&self) -> Vec<u8> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Write(addr, bytes) if addr == self.mux => Some(bytes[0]),
                _ => None,
            })
            .collect()
    }

    pub fn reads(&self) -> usize {
        self.ops().iter().filter(|op| matches!(op, Op::Read(_))).count()
    }

    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
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
        embassy_futures::yield_now().await;
        if address == self.mux && self.absent.load(Ordering::SeqCst) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    if self.fail_writes.load(Ordering::SeqCst) {
                        return Err(ErrorKind::Bus);
                    }
                    self.ops
                        .lock()
                        .unwrap()
                        .push(Op::Write(address, bytes.to_vec()));
                    if address == self.mux {
                        self.register.store(bytes[0], Ordering::SeqCst);
                    }
                }
                Operation::Read(buf) => {
                    self.ops.lock().unwrap().push(Op::Read(address));
                    let value = if address == self.mux {
                        self.register.load(Ordering::SeqCst)
                    } else {
                        0
                    };
                    buf.fill(value);
                }
            }
        }
        Ok(())
    }
}
