//! Commands exchanged with the dispatcher and the CH9329 wire codec.

pub mod ch9329;
pub mod command;

pub use ch9329::{FrameDecoder, ProtocolError};
pub use command::{
    Command, CommandName, CommandReply, PointerMode, ReleaseTarget, ReplyData, Status,
};
