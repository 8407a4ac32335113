//! Application layer: queueing, translating and reacting to device commands.

pub mod controller;
pub mod dispatcher;
pub mod indicator_sync;
pub mod input_translator;
pub mod session;
