use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

///
/// Clock
///
/// Wall-clock seam for TTL evaluation. The runtime only ever needs
/// epoch seconds; tests install a `FixedClock`.
///

pub trait Clock: Send + Sync {
    fn now_epoch_seconds(&self) -> i64;
}

///
/// SystemClock
///

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> i64 {
        Utc::now().timestamp()
    }
}

///
/// FixedClock
///

#[derive(Debug)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    #[must_use]
    pub const fn new(epoch_seconds: i64) -> Self {
        Self(AtomicI64::new(epoch_seconds))
    }

    pub fn set(&self, epoch_seconds: i64) {
        self.0.store(epoch_seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_epoch_seconds(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
