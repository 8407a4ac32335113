//! usbkvm-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does usbkvm-client do? (for beginners)
//!
//! The client turns local keyboard and mouse activity into reports for a
//! CH9329 chip plugged into the remote computer.  Only one thing may talk to
//! the serial line at a time, so every request becomes a [`Command`] on a
//! queue:
//!
//! 1. The **input translator** updates the key/mouse buffers and queues
//!    snapshots of them.
//! 2. The **command dispatcher** runs queued commands one by one on its own
//!    thread, through the **connection manager** that owns the serial port.
//! 3. Each command produces a reply.  The **session** reads the replies and
//!    reacts: marking the link connected, refreshing the lock indicators, or
//!    reconnecting after a failed health check.
//!
//! [`Command`]: usbkvm_core::Command

/// Application layer: dispatcher, translator, indicator sync and session.
pub mod application;

/// Infrastructure layer: serial link, connection manager and config file.
pub mod infrastructure;
