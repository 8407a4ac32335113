//! ControllerSession: connection lifecycle, timers and the reply policy.
//!
//! # What does the session do? (for beginners)
//!
//! The dispatcher runs commands but has no opinion about their results.  The
//! session is the one place that reacts to replies:
//!
//! - a successful `device_open` marks the session connected and asks the chip
//!   for its lock indicators;
//! - a failed `device_check` tears the link down and opens it again, so an
//!   unplugged adapter is picked up again once it comes back;
//! - `keyboard_read` replies feed the indicator cache.
//!
//! [`ControllerSession::run`] drives two timers next to the reply channel:
//! the device check (every second) and the mouse flush (every report
//! interval).

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use usbkvm_core::{Command, CommandName, CommandReply, ReleaseTarget};

use crate::application::dispatcher::{DispatchError, DispatcherHandle};
use crate::application::input_translator::InputTranslator;

/// How often the link health is checked.
pub const CHECK_INTERVAL: Duration = Duration::from_millis(1000);

/// Mouse report interval when neither a report rate nor a refresh rate is
/// configured.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(10);

/// Picks the mouse flush period.
///
/// An explicit `report_freq` (Hz) wins; otherwise the display refresh rate is
/// used when known.  Both are ignored when zero.
pub fn report_interval(report_freq: u32, refresh_rate: f64) -> Duration {
    if report_freq > 0 {
        return Duration::from_millis(u64::from((1000 / report_freq).max(1)));
    }
    if refresh_rate.is_finite() && refresh_rate > 0.0 {
        let millis = (1000.0 / refresh_rate).floor().max(1.0);
        return Duration::from_millis(millis as u64);
    }
    DEFAULT_REPORT_INTERVAL
}

pub struct ControllerSession {
    dispatcher: DispatcherHandle,
    translator: InputTranslator,
    report_interval: Duration,
    connected: bool,
}

impl ControllerSession {
    pub fn new(
        dispatcher: DispatcherHandle,
        translator: InputTranslator,
        report_interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            translator,
            report_interval,
            connected: false,
        }
    }

    /// Queues `device_open`.  The session counts as connected once the reply
    /// arrives.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn connect(&mut self) -> Result<(), DispatchError> {
        info!("connecting to controller");
        self.dispatcher.submit(Command::DeviceOpen)
    }

    /// Queues `device_close`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn disconnect(&mut self) -> Result<(), DispatchError> {
        info!("disconnecting from controller");
        self.dispatcher.submit(Command::DeviceClose)
    }

    /// Queues `device_check`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn check(&mut self) -> Result<(), DispatchError> {
        self.dispatcher.submit(Command::DeviceCheck)
    }

    /// Queues `device_info`; the reply carries the chip's product string.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn request_info(&mut self) -> Result<(), DispatchError> {
        self.dispatcher.submit(Command::DeviceInfo)
    }

    /// Releases everything covered by `target` on the chip and clears the
    /// matching local buffers.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn release(&mut self, target: ReleaseTarget) -> Result<(), DispatchError> {
        debug!(%target, "releasing");
        self.dispatcher.submit(Command::DeviceRelease(target))?;
        if target.includes_keyboard() {
            self.translator.clear_keyboard()?;
        }
        if target.includes_mouse() {
            self.translator.clear_buffers(ReleaseTarget::Mouse);
        }
        Ok(())
    }

    /// Release, close and open again.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn reload(&mut self, target: ReleaseTarget) -> Result<(), DispatchError> {
        info!(%target, "reloading controller");
        self.release(target)?;
        self.disconnect()?;
        self.connect()
    }

    /// Soft-resets the chip and clears both local buffers.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn reset(&mut self) -> Result<(), DispatchError> {
        info!("resetting controller chip");
        self.dispatcher.submit(Command::DeviceReset)?;
        self.translator.clear_buffers(ReleaseTarget::All);
        Ok(())
    }

    /// Called when the capture surface loses focus, so nothing stays held on
    /// the remote host.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn focus_lost(&mut self) -> Result<(), DispatchError> {
        if self.connected {
            self.release(ReleaseTarget::All)?;
        }
        Ok(())
    }

    /// Applies the reply policy to one dispatcher reply.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if a follow-up command could not be
    /// queued.
    pub fn handle_reply(&mut self, reply: &CommandReply) -> Result<(), DispatchError> {
        match reply.command {
            CommandName::DeviceOpen => {
                if reply.is_success() {
                    info!("controller connected");
                    self.connected = true;
                    self.translator.indicators().request_refresh()?;
                } else {
                    warn!(status = ?reply.status, "could not open controller");
                    self.connected = false;
                }
            }
            CommandName::DeviceClose => {
                self.connected = false;
            }
            CommandName::DeviceCheck => {
                if !reply.is_success() {
                    debug!("controller check failed, reloading");
                    self.connected = false;
                    self.reload(ReleaseTarget::All)?;
                }
            }
            CommandName::KeyboardRead => {
                self.translator.indicators_mut().apply_reply(reply);
            }
            CommandName::KeyboardWrite
            | CommandName::MouseAbsoluteWrite
            | CommandName::MouseRelativeWrite
            | CommandName::DeviceRelease
            | CommandName::DeviceReset => {}
            other => {
                debug!(command = %other, status = ?reply.status, "unhandled reply");
            }
        }
        Ok(())
    }

    /// Drives the session until `shutdown` resolves or the reply channel
    /// closes.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher stops while the
    /// session is still running.
    pub async fn run<F>(
        &mut self,
        replies: &mut mpsc::UnboundedReceiver<CommandReply>,
        shutdown: F,
    ) -> Result<(), DispatchError>
    where
        F: Future<Output = ()>,
    {
        let mut check_timer = interval_at(Instant::now() + CHECK_INTERVAL, CHECK_INTERVAL);
        check_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flush_timer = interval(self.report_interval);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        debug!(report_interval = ?self.report_interval, "session loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("session shutting down");
                    break;
                }
                _ = check_timer.tick() => {
                    self.check()?;
                }
                _ = flush_timer.tick() => {
                    self.translator.flush_mouse()?;
                }
                reply = replies.recv() => match reply {
                    Some(reply) => self.handle_reply(&reply)?,
                    None => {
                        debug!("reply channel closed");
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn translator(&self) -> &InputTranslator {
        &self.translator
    }

    pub fn translator_mut(&mut self) -> &mut InputTranslator {
        &mut self.translator
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::input_translator::{DetachedCursor, TranslatorSettings};
    use std::sync::Arc;
    use usbkvm_core::{
        ButtonState, HidKeyCode, IndicatorReport, LockKey, MouseButton, ReplyData, Status,
    };

    fn session() -> (ControllerSession, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = DispatcherHandle::detached(tx);
        let translator = InputTranslator::new(
            handle.clone(),
            Arc::new(DetachedCursor),
            TranslatorSettings::default(),
        );
        (
            ControllerSession::new(handle, translator, DEFAULT_REPORT_INTERVAL),
            rx,
        )
    }

    fn drain(queue: &mut mpsc::UnboundedReceiver<Command>) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(command) = queue.try_recv() {
            out.push(command);
        }
        out
    }

    #[test]
    fn test_report_interval_prefers_report_freq() {
        assert_eq!(report_interval(100, 60.0), Duration::from_millis(10));
        assert_eq!(report_interval(0, 60.0), Duration::from_millis(16));
        assert_eq!(report_interval(0, 0.0), DEFAULT_REPORT_INTERVAL);
        assert_eq!(report_interval(5000, 0.0), Duration::from_millis(1));
    }

    #[test]
    fn test_open_success_connects_and_refreshes_indicators() {
        // Arrange
        let (mut session, mut queue) = session();

        // Act
        session
            .handle_reply(&CommandReply::success(
                CommandName::DeviceOpen,
                ReplyData::Flag(true),
            ))
            .unwrap();

        // Assert
        assert!(session.is_connected());
        assert_eq!(drain(&mut queue), vec![Command::KeyboardRead]);
    }

    #[test]
    fn test_open_failure_stays_disconnected() {
        let (mut session, mut queue) = session();
        session
            .handle_reply(&CommandReply::failure(
                CommandName::DeviceOpen,
                ReplyData::Flag(false),
            ))
            .unwrap();
        assert!(!session.is_connected());
        assert!(drain(&mut queue).is_empty());
    }

    #[test]
    fn test_failed_check_reloads_everything() {
        // Arrange: something is held when the link drops
        let (mut session, mut queue) = session();
        session.translator_mut().key_press(HidKeyCode::KeyA).unwrap();
        session
            .translator_mut()
            .mouse_button(MouseButton::Left, ButtonState::Pressed)
            .unwrap();
        drain(&mut queue);

        // Act
        session
            .handle_reply(&CommandReply::failure(
                CommandName::DeviceCheck,
                ReplyData::Flag(false),
            ))
            .unwrap();

        // Assert
        let names: Vec<CommandName> = drain(&mut queue).iter().map(Command::name).collect();
        assert_eq!(
            names,
            vec![
                CommandName::DeviceRelease,
                CommandName::KeyboardWrite,
                CommandName::DeviceClose,
                CommandName::DeviceOpen,
            ]
        );
        assert!(session.translator().keyboard().is_empty());
        assert_eq!(session.translator().mouse().buttons().bits(), 0);
    }

    #[test]
    fn test_healthy_check_does_nothing() {
        let (mut session, mut queue) = session();
        session
            .handle_reply(&CommandReply::success(
                CommandName::DeviceCheck,
                ReplyData::Flag(true),
            ))
            .unwrap();
        assert!(drain(&mut queue).is_empty());
    }

    #[test]
    fn test_keyboard_read_updates_indicators() {
        let (mut session, _queue) = session();
        session
            .handle_reply(&CommandReply::success(
                CommandName::KeyboardRead,
                ReplyData::Indicators(IndicatorReport {
                    num_lock: true,
                    ..IndicatorReport::default()
                }),
            ))
            .unwrap();
        assert!(session.translator().indicators().is_on(LockKey::NumLock));
    }

    #[test]
    fn test_focus_lost_only_releases_when_connected() {
        // Arrange
        let (mut session, mut queue) = session();

        // Act + Assert: not connected yet
        session.focus_lost().unwrap();
        assert!(drain(&mut queue).is_empty());

        session
            .handle_reply(&CommandReply::success(
                CommandName::DeviceOpen,
                ReplyData::Flag(true),
            ))
            .unwrap();
        drain(&mut queue);
        session.focus_lost().unwrap();

        let commands = drain(&mut queue);
        assert_eq!(commands[0], Command::DeviceRelease(ReleaseTarget::All));
    }

    #[test]
    fn test_close_reply_disconnects() {
        let (mut session, _queue) = session();
        session
            .handle_reply(&CommandReply::success(
                CommandName::DeviceOpen,
                ReplyData::Flag(true),
            ))
            .unwrap();
        session
            .handle_reply(&CommandReply::new(
                CommandName::DeviceClose,
                Status::Success,
                ReplyData::None,
            ))
            .unwrap();
        assert!(!session.is_connected());
    }

    #[test]
    fn test_reset_clears_buffers() {
        let (mut session, mut queue) = session();
        session.translator_mut().key_press(HidKeyCode::KeyZ).unwrap();
        drain(&mut queue);

        session.reset().unwrap();

        assert_eq!(drain(&mut queue), vec![Command::DeviceReset]);
        assert!(session.translator().keyboard().is_empty());
    }

    #[tokio::test]
    async fn test_run_processes_replies_until_shutdown() {
        // Arrange
        let (mut session, mut queue) = session();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
        reply_tx
            .send(CommandReply::success(
                CommandName::DeviceOpen,
                ReplyData::Flag(true),
            ))
            .unwrap();

        // Act
        session
            .run(&mut reply_rx, tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();

        // Assert
        assert!(session.is_connected());
        assert!(drain(&mut queue).contains(&Command::KeyboardRead));
    }

    #[tokio::test]
    async fn test_run_stops_when_reply_channel_closes() {
        let (mut session, _queue) = session();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<CommandReply>();
        drop(reply_tx);

        session
            .run(&mut reply_rx, std::future::pending::<()>())
            .await
            .unwrap();
    }
}
