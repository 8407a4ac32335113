//! Lock-indicator cache.
//!
//! The remote host owns the real Num/Caps/Scroll Lock state; the chip reports
//! it back on request.  Between refreshes the cache is flipped optimistically
//! whenever a lock key is tapped locally.

use serde::{Deserialize, Serialize};

use crate::keymap::hid::LockKey;

/// Indicator state as reported by the chip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorReport {
    pub usb_connected: bool,
    pub num_lock: bool,
    pub caps_lock: bool,
    pub scroll_lock: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndicatorBuffer {
    state: IndicatorReport,
}

impl IndicatorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole cache with a fresh report.
    pub fn apply(&mut self, report: IndicatorReport) {
        self.state = report;
    }

    /// Flips one lock indicator.
    pub fn toggle(&mut self, lock: LockKey) {
        let flag = self.flag_mut(lock);
        *flag = !*flag;
    }

    pub fn is_on(&self, lock: LockKey) -> bool {
        match lock {
            LockKey::NumLock => self.state.num_lock,
            LockKey::CapsLock => self.state.caps_lock,
            LockKey::ScrollLock => self.state.scroll_lock,
        }
    }

    pub fn usb_connected(&self) -> bool {
        self.state.usb_connected
    }

    pub fn report(&self) -> IndicatorReport {
        self.state
    }

    fn flag_mut(&mut self, lock: LockKey) -> &mut bool {
        match lock {
            LockKey::NumLock => &mut self.state.num_lock,
            LockKey::CapsLock => &mut self.state.caps_lock,
            LockKey::ScrollLock => &mut self.state.scroll_lock,
        }
    }
}
