//! The actor flags bitset.
//!
//! Only the owning actor ever writes these bits, and the handful that are
//! read cross-thread (`hidden`, `detached`) never change after launch, so
//! every access uses `Ordering::Relaxed`.

use std::sync::atomic::{AtomicU8, Ordering};

const HIDDEN: u8 = 1 << 0;
const REGISTERED: u8 = 1 << 1;
const INITIALIZED: u8 = 1 << 2;
const BLOCKING: u8 = 1 << 3;
const DETACHED: u8 = 1 << 4;
const TERMINATED: u8 = 1 << 5;
const SHUTTING_DOWN: u8 = 1 << 6;
const INACTIVE: u8 = 1 << 7;

#[derive(Debug, Default)]
pub struct ActorFlags(AtomicU8);

impl ActorFlags {
    pub fn new() -> ActorFlags {
        ActorFlags(AtomicU8::new(0))
    }

    fn test(&self, bit: u8) -> bool {
        self.0.load(Ordering::Relaxed) & bit != 0
    }

    fn set(&self, bit: u8, value: bool) {
        if value {
            self.0.fetch_or(bit, Ordering::Relaxed);
        } else {
            self.0.fetch_and(!bit, Ordering::Relaxed);
        }
    }

    pub fn hidden(&self) -> bool {
        self.test(HIDDEN)
    }
    pub fn set_hidden(&self, v: bool) {
        self.set(HIDDEN, v)
    }

    pub fn registered(&self) -> bool {
        self.test(REGISTERED)
    }
    pub fn set_registered(&self, v: bool) {
        self.set(REGISTERED, v)
    }

    pub fn initialized(&self) -> bool {
        self.test(INITIALIZED)
    }
    pub fn set_initialized(&self, v: bool) {
        self.set(INITIALIZED, v)
    }

    pub fn blocking(&self) -> bool {
        self.test(BLOCKING)
    }
    pub fn set_blocking(&self, v: bool) {
        self.set(BLOCKING, v)
    }

    pub fn detached(&self) -> bool {
        self.test(DETACHED)
    }
    pub fn set_detached(&self, v: bool) {
        self.set(DETACHED, v)
    }

    pub fn terminated(&self) -> bool {
        self.test(TERMINATED)
    }
    pub fn set_terminated(&self, v: bool) {
        self.set(TERMINATED, v)
    }

    pub fn shutting_down(&self) -> bool {
        self.test(SHUTTING_DOWN)
    }
    pub fn set_shutting_down(&self, v: bool) {
        self.set(SHUTTING_DOWN, v)
    }

    pub fn inactive(&self) -> bool {
        self.test(INACTIVE)
    }
    pub fn set_inactive(&self, v: bool) {
        self.set(INACTIVE, v)
    }
}
