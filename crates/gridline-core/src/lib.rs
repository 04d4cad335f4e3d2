//! gridline-core - the collaborative session layer built on top of
//! `gridline-engine`'s pure computation: connection configuration, the
//! line-delimited wire protocol, the event bus, and local XML save/load.

mod config;
mod error;
mod events;
mod net;
mod protocol;
mod session;
mod xml;

pub use config::{ConnectConfig, DEFAULT_PORT, PROTOCOL_VERSION};
pub use error::{CoreError, Result};
pub use events::{EventBus, SpreadsheetEvent};
pub use net::Engine;
pub use protocol::{CompletedReply, Need, OutboundCommand, ReceiveMachine, ReplyKind};
pub use session::{PendingChange, SessionState};
pub use xml::get_saved_version;

pub use gridline_engine::{
    Cell, CellContents, CellName, CellValue, DefaultNameRules, DependencyGraph, EngineError,
    Formula, NameRules,
};
