//! The line-delimited wire protocol: outbound command encoding and inbound
//! reply framing.

mod commands;
mod receive;

pub use commands::OutboundCommand;
pub use receive::{CompletedReply, Need, ReceiveMachine, ReplyKind};
