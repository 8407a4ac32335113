//! IndicatorSync: keeps the local lock-indicator cache in step with the chip.
//!
//! Refreshes are fire-and-forget: [`IndicatorSync::request_refresh`] queues a
//! `keyboard_read`, and the matching reply later arrives through
//! [`IndicatorSync::apply_reply`].  A failed read leaves the cache as it was;
//! the next refresh (after the next successful open) tries again.

use tracing::debug;
use usbkvm_core::{
    Command, CommandName, CommandReply, IndicatorBuffer, IndicatorReport, LockKey, ReplyData,
};

use crate::application::dispatcher::{DispatchError, DispatcherHandle};

pub struct IndicatorSync {
    cache: IndicatorBuffer,
    dispatcher: DispatcherHandle,
}

impl IndicatorSync {
    pub fn new(dispatcher: DispatcherHandle) -> Self {
        Self {
            cache: IndicatorBuffer::new(),
            dispatcher,
        }
    }

    /// Queues a `keyboard_read`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn request_refresh(&self) -> Result<(), DispatchError> {
        self.dispatcher.submit(Command::KeyboardRead)
    }

    /// Applies a `keyboard_read` reply and returns `true` if the cache was
    /// replaced.  Replies to other commands are ignored.
    pub fn apply_reply(&mut self, reply: &CommandReply) -> bool {
        if reply.command != CommandName::KeyboardRead {
            return false;
        }
        match (&reply.data, reply.is_success()) {
            (ReplyData::Indicators(report), true) => {
                debug!(
                    usb = report.usb_connected,
                    num = report.num_lock,
                    caps = report.caps_lock,
                    scroll = report.scroll_lock,
                    "indicators refreshed"
                );
                self.cache.apply(*report);
                true
            }
            _ => {
                debug!(status = ?reply.status, "indicator read failed, keeping cache");
                false
            }
        }
    }

    /// Flips one indicator locally, ahead of the chip confirming it.
    pub fn toggle(&mut self, lock: LockKey) {
        self.cache.toggle(lock);
    }

    pub fn is_on(&self, lock: LockKey) -> bool {
        self.cache.is_on(lock)
    }

    pub fn indicators(&self) -> IndicatorReport {
        self.cache.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use usbkvm_core::Status;

    fn sync_with_queue() -> (IndicatorSync, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (IndicatorSync::new(DispatcherHandle::detached(tx)), rx)
    }

    #[test]
    fn test_request_refresh_queues_keyboard_read() {
        let (sync, mut queue) = sync_with_queue();
        sync.request_refresh().unwrap();
        assert_eq!(queue.try_recv().unwrap(), Command::KeyboardRead);
    }

    #[test]
    fn test_success_reply_replaces_cache() {
        // Arrange
        let (mut sync, _queue) = sync_with_queue();
        sync.toggle(LockKey::ScrollLock);
        let report = IndicatorReport {
            usb_connected: true,
            num_lock: true,
            caps_lock: true,
            scroll_lock: false,
        };

        // Act
        let applied = sync.apply_reply(&CommandReply::success(
            CommandName::KeyboardRead,
            ReplyData::Indicators(report),
        ));

        // Assert
        assert!(applied);
        assert_eq!(sync.indicators(), report);
    }

    #[test]
    fn test_failed_reply_keeps_cache() {
        let (mut sync, _queue) = sync_with_queue();
        sync.toggle(LockKey::CapsLock);

        let applied = sync.apply_reply(&CommandReply::new(
            CommandName::KeyboardRead,
            Status::Failure,
            ReplyData::None,
        ));

        assert!(!applied);
        assert!(sync.is_on(LockKey::CapsLock));
    }

    #[test]
    fn test_other_replies_are_ignored() {
        let (mut sync, _queue) = sync_with_queue();
        let applied = sync.apply_reply(&CommandReply::success(
            CommandName::DeviceOpen,
            ReplyData::Flag(true),
        ));
        assert!(!applied);
    }
}
