//! CommandDispatcher: the single worker that owns device I/O order.
//!
//! # Why a dedicated thread? (for beginners)
//!
//! Serial I/O blocks: a query can wait up to the read timeout for the chip to
//! answer.  Running it on the async runtime would stall timers and input
//! handling, so the dispatcher runs on its own OS thread:
//!
//! ```text
//!  translator ─┐                         ┌─> reply channel ─> session
//!  session ────┼─> command channel ─> [hid-dispatch thread] ─> Controller
//!  CLI ────────┘        (FIFO)
//! ```
//!
//! Any number of [`DispatcherHandle`] clones can submit commands.  The worker
//! takes them one at a time in arrival order, so two commands never touch the
//! link at once, and posts exactly one [`CommandReply`] per command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use usbkvm_core::{
    Command, CommandName, CommandReply, PointerMode, ProtocolError, ReplyData, Status,
};

use crate::application::controller::{Controller, ControllerError};

/// Product string reported when the chip's reply is not valid text.
pub const PRODUCT_INVALID: &str = "invalid";
/// Product string reported when the product could not be read at all.
pub const PRODUCT_UNKNOWN: &str = "unknown";

/// Error type for dispatcher operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The worker has stopped; the command was not queued.
    #[error("dispatcher is no longer running")]
    Closed,

    /// The worker thread could not be started.
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Whether the worker is currently running a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Executing,
}

/// Cloneable submission side of the dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<Command>,
    executing: Arc<AtomicBool>,
}

impl DispatcherHandle {
    /// Queues `command`.  Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the worker has exited.
    pub fn submit(&self, command: Command) -> Result<(), DispatchError> {
        self.tx.send(command).map_err(|_| DispatchError::Closed)
    }

    /// Queues a command given by wire name, see [`Command::from_raw`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the worker has exited.
    pub fn submit_raw(&self, name: &str, arg: Option<&str>) -> Result<(), DispatchError> {
        self.submit(Command::from_raw(name, arg))
    }

    pub fn state(&self) -> DispatcherState {
        if self.executing.load(Ordering::Acquire) {
            DispatcherState::Executing
        } else {
            DispatcherState::Idle
        }
    }

    /// Builds a handle whose commands go straight into `tx`, with no worker.
    /// Lets tests inspect exactly what a component submits.
    pub fn detached(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            tx,
            executing: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Owner of the worker thread.
pub struct CommandDispatcher {
    handle: DispatcherHandle,
    worker: JoinHandle<()>,
}

impl CommandDispatcher {
    /// Starts the worker thread.
    ///
    /// Returns the dispatcher and the receiving end of the reply channel.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Spawn`] if the OS refuses to create the thread.
    pub fn spawn(
        controller: Arc<dyn Controller>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CommandReply>), DispatchError> {
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<Command>();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel::<CommandReply>();
        let executing = Arc::new(AtomicBool::new(false));
        let worker_flag = Arc::clone(&executing);

        let worker = std::thread::Builder::new()
            .name("hid-dispatch".into())
            .spawn(move || {
                debug!("dispatcher worker started");
                while let Some(command) = command_rx.blocking_recv() {
                    worker_flag.store(true, Ordering::Release);
                    let reply = execute(controller.as_ref(), command);
                    worker_flag.store(false, Ordering::Release);
                    if reply_tx.send(reply).is_err() {
                        debug!("reply receiver dropped; continuing without replies");
                    }
                }
                info!("dispatcher worker stopped");
            })
            .map_err(DispatchError::Spawn)?;

        let handle = DispatcherHandle {
            tx: command_tx,
            executing,
        };
        Ok((Self { handle, worker }, reply_rx))
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Drops this dispatcher's own sender and waits for the worker to drain
    /// the queue.  The worker only exits once every [`DispatcherHandle`]
    /// clone has been dropped too.
    pub fn join(self) {
        let Self { handle, worker } = self;
        drop(handle);
        if worker.join().is_err() {
            warn!("dispatcher worker panicked");
        }
    }
}

/// Runs one command against `controller` and builds its reply.
///
/// Never panics and never propagates: every outcome is a [`Status`].
pub fn execute(controller: &dyn Controller, command: Command) -> CommandReply {
    let name = command.name();

    if let Command::Unrecognized(raw) = &command {
        warn!(command = %raw, "unknown command");
        return CommandReply::unknown_command();
    }
    if name.requires_connection() && !controller.check() {
        debug!(command = %name, "connection unavailable, skipping");
        return CommandReply::unavailable(name);
    }

    match command {
        Command::DeviceOpen => {
            let ok = controller.open();
            flag_reply(name, ok)
        }
        Command::DeviceClose => {
            controller.close();
            CommandReply::success(name, ReplyData::None)
        }
        Command::DeviceCheck => {
            let healthy = controller.check();
            flag_reply(name, healthy)
        }
        Command::DeviceRelease(target) => unit_reply(name, controller.release(target)),
        Command::DeviceReset => unit_reply(name, controller.reset_chip()),
        Command::DeviceInfo => match controller.product() {
            Ok(product) => CommandReply::success(name, ReplyData::Text(product)),
            Err(err) => {
                warn!(error = %err, "could not read product string");
                let sentinel = match &err {
                    ControllerError::Decoding(ProtocolError::InvalidStringEncoding) => {
                        PRODUCT_INVALID
                    }
                    _ => PRODUCT_UNKNOWN,
                };
                CommandReply::new(name, status_for(&err), ReplyData::Text(sentinel.to_string()))
            }
        },
        Command::KeyboardRead => match controller.read_indicators() {
            Ok(report) => CommandReply::success(name, ReplyData::Indicators(report)),
            Err(err) => {
                debug!(error = %err, "indicator read failed");
                CommandReply::new(name, status_for(&err), ReplyData::None)
            }
        },
        Command::KeyboardWrite(snapshot) => write_reply(name, controller.send_keyboard(&snapshot)),
        Command::MouseAbsoluteWrite(snapshot) => {
            write_reply(name, controller.send_mouse(&snapshot, PointerMode::Absolute))
        }
        Command::MouseRelativeWrite(snapshot) => {
            write_reply(name, controller.send_mouse(&snapshot, PointerMode::Relative))
        }
        // Handled above.
        Command::Unrecognized(_) => CommandReply::unknown_command(),
    }
}

fn status_for(err: &ControllerError) -> Status {
    match err {
        ControllerError::ConnectionUnavailable => Status::Unavailable,
        ControllerError::Transport(_) | ControllerError::Decoding(_) => Status::Failure,
    }
}

fn flag_reply(name: CommandName, ok: bool) -> CommandReply {
    let status = if ok { Status::Success } else { Status::Failure };
    CommandReply::new(name, status, ReplyData::Flag(ok))
}

fn unit_reply(name: CommandName, result: Result<(), ControllerError>) -> CommandReply {
    match result {
        Ok(()) => CommandReply::success(name, ReplyData::None),
        Err(err) => {
            warn!(command = %name, error = %err, "command failed");
            CommandReply::new(name, status_for(&err), ReplyData::None)
        }
    }
}

fn write_reply(name: CommandName, result: Result<(), ControllerError>) -> CommandReply {
    match result {
        Ok(()) => flag_reply(name, true),
        Err(err) => {
            warn!(command = %name, error = %err, "write failed");
            CommandReply::new(name, status_for(&err), ReplyData::Flag(false))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
