//! Session state shared between the caller's thread and the background
//! socket-reader thread, guarded by a single mutex (see [`crate::net::Engine`]).

use std::sync::Arc;

use gridline_engine::{CellStore, NameRules};

/// Lifecycle of a session from the moment a socket is opened to the moment
/// it is torn down. `Creating`/`Joining` are transient: a `CREATE OK` reply
/// immediately issues a `JOIN` and advances to `Joining`, so from the
/// caller's perspective only `Connecting`, `Joined`, and `Closed` are ever
/// observed for long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Creating,
    Joining,
    Joined,
    Leaving,
    Closed,
}

/// The single change a caller may have in flight at once. A second call to
/// [`crate::net::Engine::change`] while one is already pending is a no-op:
/// the new input is dropped rather than queued or overwriting the pending one.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub cell: String,
    pub content: String,
}

pub struct Session {
    pub state: SessionState,
    pub store: CellStore,
    /// Server-confirmed file name, set on `JOIN OK`.
    pub name: Option<String>,
    /// Latest version token the server has confirmed.
    pub version: Option<String>,
    pub pending: Option<PendingChange>,
}

impl Session {
    pub fn new(rules: Arc<dyn NameRules>) -> Self {
        Session {
            state: SessionState::Connecting,
            store: CellStore::new(rules),
            name: None,
            version: None,
            pending: None,
        }
    }
}
