//! The public [`Engine`]: owns the socket, the background reader thread,
//! and the session it drives. One mutex (inside [`Session`]) guards all
//! shared state; the writer half of the socket is a second, independent
//! mutex so a blocking write never contends with the reader thread.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use gridline_engine::{CellContents, CellName, CellValue, NameRules};

use crate::config::ConnectConfig;
use crate::error::{CoreError, Result};
use crate::events::{EventBus, SpreadsheetEvent};
use crate::protocol::{CompletedReply, Need, OutboundCommand, ReceiveMachine, ReplyKind};
use crate::session::{PendingChange, Session, SessionState};
use crate::xml;

/// A live (or once-live) connection to a Gridline server.
///
/// `connect` is non-blocking: it opens the socket, starts the background
/// reader thread, and sends the initial `CREATE`/`JOIN` request, returning
/// immediately. Success or failure surfaces asynchronously as a
/// [`SpreadsheetEvent::Joined`] or [`SpreadsheetEvent::Failed`].
pub struct Engine {
    session: Mutex<Session>,
    events: EventBus,
    writer: Mutex<Option<BufWriter<TcpStream>>>,
    file: String,
}

impl Engine {
    pub fn connect(config: ConnectConfig, rules: Arc<dyn NameRules>) -> Result<Arc<Engine>> {
        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .map_err(|e| CoreError::SocketError(e.to_string()))?;
        let reader_stream = stream.try_clone().map_err(|e| CoreError::SocketError(e.to_string()))?;

        let engine = Arc::new(Engine {
            session: Mutex::new(Session::new(rules)),
            events: EventBus::new(),
            writer: Mutex::new(Some(BufWriter::new(stream))),
            file: config.file.clone(),
        });

        {
            let mut session = engine.session.lock().unwrap();
            session.state =
                if config.create_new { SessionState::Creating } else { SessionState::Joining };
        }

        let reader_engine = engine.clone();
        thread::spawn(move || {
            run_receive_loop(reader_engine, BufReader::new(reader_stream));
        });

        let first = if config.create_new {
            OutboundCommand::Create { name: config.file.clone(), password: config.password.clone() }
        } else {
            OutboundCommand::Join { name: config.file.clone(), password: config.password.clone() }
        };
        engine.send_frame(&first.encode())?;

        Ok(engine)
    }

    pub fn subscribe(&self, handler: impl Fn(&SpreadsheetEvent) + Send + 'static) {
        self.events.subscribe(handler);
    }

    pub fn get_cell_contents(&self, name: &str) -> CellContents {
        self.session.lock().unwrap().store.get_cell_contents(name)
    }

    pub fn get_cell_value(&self, name: &str) -> CellValue {
        self.session.lock().unwrap().store.get_cell_value(name)
    }

    pub fn names_of_all_nonempty_cells(&self) -> Vec<CellName> {
        self.session.lock().unwrap().store.names_of_all_nonempty_cells()
    }

    /// Pre-validates `content` locally (name shape, formula grammar,
    /// circularity) and, if it passes, sends a `CHANGE` request. A second
    /// call while one change is already in flight is a silent no-op.
    pub fn change(&self, cell: &str, content: &str) -> Result<()> {
        let frame = {
            let mut session = self.session.lock().unwrap();
            if session.state != SessionState::Joined {
                return Err(CoreError::NotConnected);
            }
            if session.pending.is_some() {
                return Ok(());
            }
            session.store.check_contents(cell, content).map_err(CoreError::Engine)?;

            let version = session.version.clone().unwrap_or_default();
            session.pending =
                Some(PendingChange { cell: cell.to_string(), content: content.to_string() });
            OutboundCommand::Change {
                name: self.file.clone(),
                version,
                cell: cell.to_string(),
                content: content.to_string(),
            }
        };
        self.send_frame(&frame.encode())
    }

    pub fn undo(&self) -> Result<()> {
        let frame = {
            let session = self.session.lock().unwrap();
            if session.state != SessionState::Joined {
                return Err(CoreError::NotConnected);
            }
            OutboundCommand::Undo {
                name: self.file.clone(),
                version: session.version.clone().unwrap_or_default(),
            }
        };
        self.send_frame(&frame.encode())
    }

    pub fn save(&self) -> Result<()> {
        {
            let session = self.session.lock().unwrap();
            if session.state != SessionState::Joined {
                return Err(CoreError::NotConnected);
            }
        }
        self.send_frame(&OutboundCommand::Save { name: self.file.clone() }.encode())
    }

    /// Writes the current store to `path` as local XML, independent of the
    /// server (no network round-trip).
    pub fn save_local(&self, path: &Path) -> Result<()> {
        let session = self.session.lock().unwrap();
        let version = session.version.clone().unwrap_or_default();
        let bytes = xml::write_xml(&session.store, &version)?;
        drop(session);
        std::fs::write(path, bytes).map_err(|e| CoreError::ReadWriteError(e.to_string()))
    }

    pub fn leave(&self) -> Result<()> {
        let (name, already_closed) = {
            let mut session = self.session.lock().unwrap();
            let already_closed = session.state == SessionState::Closed;
            session.state = SessionState::Leaving;
            (session.name.clone().unwrap_or_else(|| self.file.clone()), already_closed)
        };
        if !already_closed {
            let _ = self.send_frame(&OutboundCommand::Leave { name }.encode());
        }
        self.session.lock().unwrap().state = SessionState::Closed;
        self.shutdown_socket();
        Ok(())
    }

    fn send_frame(&self, frame: &str) -> Result<()> {
        let mut guard = self.writer.lock().unwrap();
        match guard.as_mut() {
            Some(w) => match w.write_all(frame.as_bytes()).and_then(|_| w.flush()) {
                Ok(()) => Ok(()),
                Err(e) => {
                    *guard = None;
                    drop(guard);
                    self.mark_closed();
                    self.events.publish(SpreadsheetEvent::SocketError(e.to_string()));
                    Err(CoreError::SocketError(e.to_string()))
                }
            },
            // Already closed: sends are silently dropped.
            None => Ok(()),
        }
    }

    fn shutdown_socket(&self) {
        if let Some(w) = self.writer.lock().unwrap().take() {
            if let Ok(stream) = w.into_inner() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    fn mark_closed(&self) {
        self.session.lock().unwrap().state = SessionState::Closed;
    }

    fn on_connection_closed(&self) {
        self.mark_closed();
        self.events.publish(SpreadsheetEvent::ConnectionClosed);
    }

    fn on_io_error(&self, err: io::Error) {
        self.mark_closed();
        self.events.publish(SpreadsheetEvent::SocketError(err.to_string()));
    }

    fn on_reply(&self, reply: CompletedReply) {
        let mut resend: Option<OutboundCommand> = None;

        {
            let mut session = self.session.lock().unwrap();
            match reply.kind {
                ReplyKind::CreateOk => {
                    let name = reply.headers.get("Name").cloned().unwrap_or_else(|| self.file.clone());
                    let password = reply.headers.get("Password").cloned().unwrap_or_default();
                    session.state = SessionState::Joining;
                    resend = Some(OutboundCommand::Join { name, password });
                }
                ReplyKind::CreateFail => {
                    session.state = SessionState::Closed;
                    self.events.publish(SpreadsheetEvent::Failed(reply.lines));
                }
                ReplyKind::JoinOk => {
                    session.name = Some(reply.headers.get("Name").cloned().unwrap_or_else(|| self.file.clone()));
                    session.version = reply.headers.get("Version").cloned();
                    if let Some(payload) = &reply.payload {
                        if let Err(e) = xml::populate_from_xml(&mut session.store, payload) {
                            tracing::warn!("failed to parse JOIN payload: {e}");
                        }
                    }
                    session.state = SessionState::Joined;
                    self.events.publish(SpreadsheetEvent::Joined);
                }
                ReplyKind::JoinFail => {
                    session.state = SessionState::Closed;
                    self.events.publish(SpreadsheetEvent::Failed(reply.lines));
                }
                ReplyKind::ChangeOk => {
                    session.version = reply.headers.get("Version").cloned();
                    if let Some(pending) = session.pending.take() {
                        match session.store.set_contents(&pending.cell, &pending.content) {
                            Ok(changed) => {
                                self.events.publish(SpreadsheetEvent::Updated(
                                    changed.into_iter().collect(),
                                ));
                            }
                            Err(e) => {
                                tracing::warn!("CHANGE OK applied against a stale graph: {e}");
                                self.events.publish(SpreadsheetEvent::GenericError);
                            }
                        }
                    }
                }
                ReplyKind::ChangeWait => {
                    let server_version = reply.headers.get("Version").cloned();
                    if server_version == session.version {
                        if let Some(pending) = session.pending.clone() {
                            resend = Some(OutboundCommand::Change {
                                name: self.file.clone(),
                                version: session.version.clone().unwrap_or_default(),
                                cell: pending.cell,
                                content: pending.content,
                            });
                        }
                    } else {
                        session.pending = None;
                    }
                }
                ReplyKind::ChangeFail => {
                    session.pending = None;
                    self.events.publish(SpreadsheetEvent::Failed(reply.lines));
                }
                ReplyKind::UndoOk => {
                    session.version = reply.headers.get("Version").cloned();
                    let cell = reply.headers.get("Cell").cloned();
                    let payload = reply.payload.as_deref().map(String::from_utf8_lossy);
                    if let (Some(cell), Some(payload)) = (cell, payload) {
                        match session.store.set_contents(&cell, payload.as_ref()) {
                            Ok(changed) => {
                                self.events.publish(SpreadsheetEvent::Updated(
                                    changed.into_iter().collect(),
                                ));
                            }
                            Err(e) => {
                                tracing::warn!("UNDO OK applied against a stale graph: {e}");
                                self.events.publish(SpreadsheetEvent::GenericError);
                            }
                        }
                    }
                }
                ReplyKind::UndoEnd => {
                    session.version = reply.headers.get("Version").cloned();
                    self.events.publish(SpreadsheetEvent::UndoEnd);
                }
                ReplyKind::UndoWait => {
                    let server_version = reply.headers.get("Version").cloned();
                    if server_version == session.version {
                        resend = Some(OutboundCommand::Undo {
                            name: self.file.clone(),
                            version: session.version.clone().unwrap_or_default(),
                        });
                    }
                }
                ReplyKind::UndoFail => {
                    self.events.publish(SpreadsheetEvent::Failed(reply.lines));
                }
                ReplyKind::SaveOk => {}
                ReplyKind::SaveFail => {
                    self.events.publish(SpreadsheetEvent::Failed(reply.lines));
                }
                ReplyKind::Update => {
                    session.version = reply.headers.get("Version").cloned();
                    let cell = reply.headers.get("Cell").cloned();
                    let payload = reply.payload.as_deref().map(String::from_utf8_lossy);
                    if let (Some(cell), Some(payload)) = (cell, payload) {
                        match session.store.set_contents(&cell, payload.as_ref()) {
                            Ok(changed) => {
                                self.events.publish(SpreadsheetEvent::Updated(
                                    changed.into_iter().collect(),
                                ));
                            }
                            Err(e) => {
                                tracing::warn!("UPDATE applied against a stale graph: {e}");
                                self.events.publish(SpreadsheetEvent::GenericError);
                            }
                        }
                    }
                }
                ReplyKind::Error => {
                    self.events.publish(SpreadsheetEvent::GenericError);
                }
                ReplyKind::Unknown => {
                    tracing::warn!("unparseable server reply: {:?}", reply.lines);
                    self.events.publish(SpreadsheetEvent::GenericError);
                }
            }
        }

        if let Some(cmd) = resend {
            let _ = self.send_frame(&cmd.encode());
        }
    }
}

fn run_receive_loop(engine: Arc<Engine>, mut reader: BufReader<TcpStream>) {
    let mut machine = ReceiveMachine::new();
    loop {
        match machine.need() {
            Need::Line => {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => {
                        engine.on_connection_closed();
                        return;
                    }
                    Ok(_) => {
                        let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
                        if let Some(reply) = machine.feed_line(trimmed) {
                            engine.on_reply(reply);
                        }
                    }
                    Err(e) => {
                        engine.on_io_error(e);
                        return;
                    }
                }
            }
            Need::Bytes(n) => {
                let mut buf = vec![0u8; n];
                match reader.read_exact(&mut buf) {
                    Ok(()) => {
                        if let Some(reply) = machine.feed_bytes(buf) {
                            engine.on_reply(reply);
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        engine.on_connection_closed();
                        return;
                    }
                    Err(e) => {
                        engine.on_io_error(e);
                        return;
                    }
                }
            }
        }
    }
}

