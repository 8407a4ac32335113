//! Infrastructure layer: adapters for the serial port and the config file.

pub mod connection_manager;
pub mod serial;
pub mod storage;
