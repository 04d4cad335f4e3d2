//! Event bus: the one-way channel from session state changes to callers.
//!
//! Subscribers run synchronously, inline in whichever thread drove the
//! change (the caller's thread for a local pre-validation failure, the
//! background reader thread for anything that arrived over the wire). A
//! subscriber that calls back into [`crate::net::Engine`] re-entrantly will
//! deadlock against the same session mutex it is being invoked under; that
//! is a usage error, not something the bus guards against.

use std::fmt;
use std::sync::Mutex;

use gridline_engine::CellName;

/// Something a caller may want to react to, fired for both server-confirmed
/// changes and locally-observed connection problems.
#[derive(Debug, Clone)]
pub enum SpreadsheetEvent {
    /// `JOIN OK` was received; the session is now live.
    Joined,
    /// These cells were recomputed, by a local change, an `UPDATE` from
    /// another client, or an `UNDO OK` payload.
    Updated(Vec<CellName>),
    /// A request was rejected by the server; `lines` is the full
    /// accumulated reply, last line first readable as the reason.
    Failed(Vec<String>),
    /// `UNDO END`: there was nothing left to undo.
    UndoEnd,
    /// The socket was closed, locally or by the peer.
    ConnectionClosed,
    /// The socket failed outside of an orderly close.
    SocketError(String),
    /// A bare `ERROR` reply, or a reply this client could not parse.
    GenericError,
}

impl fmt::Display for SpreadsheetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpreadsheetEvent::Joined => write!(f, "joined"),
            SpreadsheetEvent::Updated(cells) => write!(f, "updated {} cell(s)", cells.len()),
            SpreadsheetEvent::Failed(lines) => {
                write!(f, "failed: {}", lines.last().map(String::as_str).unwrap_or(""))
            }
            SpreadsheetEvent::UndoEnd => write!(f, "nothing left to undo"),
            SpreadsheetEvent::ConnectionClosed => write!(f, "connection closed"),
            SpreadsheetEvent::SocketError(reason) => write!(f, "socket error: {reason}"),
            SpreadsheetEvent::GenericError => write!(f, "generic error"),
        }
    }
}

type Handler = Box<dyn Fn(&SpreadsheetEvent) + Send>;

/// Synchronous fan-out to every subscriber, in subscription order.
pub struct EventBus {
    subscribers: Mutex<Vec<Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus { subscribers: Mutex::new(Vec::new()) }
    }

    pub fn subscribe(&self, handler: impl Fn(&SpreadsheetEvent) + Send + 'static) {
        self.subscribers.lock().unwrap().push(Box::new(handler));
    }

    pub fn publish(&self, event: SpreadsheetEvent) {
        for handler in self.subscribers.lock().unwrap().iter() {
            handler(&event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn publish_reaches_every_subscriber_in_order() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c1 = calls.clone();
        bus.subscribe(move |e| c1.lock().unwrap().push(format!("a:{e}")));
        let c2 = calls.clone();
        bus.subscribe(move |e| c2.lock().unwrap().push(format!("b:{e}")));

        bus.publish(SpreadsheetEvent::Joined);

        let seen = calls.lock().unwrap();
        assert_eq!(*seen, vec!["a:joined".to_string(), "b:joined".to_string()]);
    }

    #[test]
    fn publish_with_no_subscribers_does_nothing() {
        let bus = EventBus::new();
        bus.publish(SpreadsheetEvent::UndoEnd);
    }

    #[test]
    fn each_publish_invokes_subscriber_once() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(SpreadsheetEvent::GenericError);
        bus.publish(SpreadsheetEvent::GenericError);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
