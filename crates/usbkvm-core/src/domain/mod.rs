//! Input state that sits between local events and outgoing reports.
//!
//! # What lives here? (for beginners)
//!
//! Everything in this module is plain data plus the rules that mutate it.
//! Nothing here opens a port, spawns a thread or sleeps, so every rule can be
//! unit-tested on its own:
//!
//! - **`keyboard`**: the six-slot key buffer and its modifier byte.
//! - **`mouse`**: button bits, the one-shot wheel and the pointer position.
//! - **`indicator`**: the Num/Caps/Scroll Lock cache.
//! - **`geometry`**: viewport letterboxing and relative-motion tracking.
//!
//! The input layer owns these buffers and hands *snapshots* (copies) to the
//! command dispatcher, never references.

pub mod geometry;
pub mod indicator;
pub mod keyboard;
pub mod mouse;
