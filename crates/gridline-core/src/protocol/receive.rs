//! Inbound reply framing: a small state machine that turns a stream of
//! lines (and, once a payload is expected, raw byte chunks) into complete
//! [`CompletedReply`] values.
//!
//! A reply's first line names its kind (`"CREATE OK"`, `"UPDATE"`, ...).
//! Zero or more `Key:Value` header lines follow, in any order. A reply whose
//! kind carries a free-form message (`*FAIL`) only completes once that
//! message line arrives, however many of its headers are already in —
//! `Name:` alone is never enough to end it. Replies carrying a payload
//! (`JOIN OK`, `UNDO OK`, `UPDATE`) only decide how to read that payload
//! once their other required headers are in *and* either a `Length:` header
//! has shown up (read exactly that many bytes) or a non-header line arrives
//! first (that line is the payload verbatim, for a server that omits
//! `Length:`). Until then the machine keeps reading lines as headers.

use std::collections::HashMap;

const KNOWN_HEADERS: &[&str] = &["Name", "Password", "Version", "Cell", "Length"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    CreateOk,
    CreateFail,
    JoinOk,
    JoinFail,
    ChangeOk,
    ChangeWait,
    ChangeFail,
    UndoOk,
    UndoEnd,
    UndoWait,
    UndoFail,
    SaveOk,
    SaveFail,
    Update,
    Error,
    /// First line didn't match a known reply, or a reply was missing a
    /// required field when it otherwise looked complete.
    Unknown,
}

impl ReplyKind {
    fn parse(line: &str) -> ReplyKind {
        match line.trim() {
            "CREATE OK" => ReplyKind::CreateOk,
            "CREATE FAIL" => ReplyKind::CreateFail,
            "JOIN OK" => ReplyKind::JoinOk,
            "JOIN FAIL" => ReplyKind::JoinFail,
            "CHANGE OK" => ReplyKind::ChangeOk,
            "CHANGE WAIT" => ReplyKind::ChangeWait,
            "CHANGE FAIL" => ReplyKind::ChangeFail,
            "UNDO OK" => ReplyKind::UndoOk,
            "UNDO END" => ReplyKind::UndoEnd,
            "UNDO WAIT" => ReplyKind::UndoWait,
            "UNDO FAIL" => ReplyKind::UndoFail,
            "SAVE OK" => ReplyKind::SaveOk,
            "SAVE FAIL" => ReplyKind::SaveFail,
            "UPDATE" => ReplyKind::Update,
            "ERROR" => ReplyKind::Error,
            _ => ReplyKind::Unknown,
        }
    }

    /// Header keys (other than `Length`, handled separately) that must all
    /// be present before this reply is considered complete.
    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ReplyKind::CreateOk => &["Name", "Password"],
            ReplyKind::CreateFail => &["Name"],
            ReplyKind::JoinOk => &["Name", "Version"],
            ReplyKind::JoinFail => &["Name"],
            ReplyKind::ChangeOk => &["Name", "Version"],
            ReplyKind::ChangeWait => &["Name", "Version"],
            ReplyKind::ChangeFail => &["Name"],
            ReplyKind::UndoOk => &["Name", "Version", "Cell"],
            ReplyKind::UndoEnd => &["Name", "Version"],
            ReplyKind::UndoWait => &["Name", "Version"],
            ReplyKind::UndoFail => &["Name"],
            ReplyKind::SaveOk | ReplyKind::SaveFail => &[],
            ReplyKind::Update => &["Name", "Version", "Cell"],
            ReplyKind::Error | ReplyKind::Unknown => &[],
        }
    }

    fn has_payload(&self) -> bool {
        matches!(self, ReplyKind::JoinOk | ReplyKind::UndoOk | ReplyKind::Update)
    }

    fn has_message(&self) -> bool {
        matches!(
            self,
            ReplyKind::CreateFail
                | ReplyKind::JoinFail
                | ReplyKind::ChangeFail
                | ReplyKind::UndoFail
                | ReplyKind::SaveFail
        )
    }

    fn completes_with_no_fields(&self) -> bool {
        matches!(self, ReplyKind::SaveOk | ReplyKind::Error | ReplyKind::Unknown)
    }
}

/// A fully-received reply, ready to be dispatched against the session.
#[derive(Debug, Clone)]
pub struct CompletedReply {
    pub kind: ReplyKind,
    pub headers: HashMap<String, String>,
    /// Every raw line seen for this reply, in order, including the first
    /// selector line; used verbatim for `Failed` events.
    pub lines: Vec<String>,
    pub payload: Option<Vec<u8>>,
}

/// What the I/O loop driving this machine should read next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Need {
    Line,
    Bytes(usize),
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    InMessage { kind: ReplyKind, headers: HashMap<String, String>, lines: Vec<String> },
    AwaitingPayloadBytes {
        kind: ReplyKind,
        headers: HashMap<String, String>,
        lines: Vec<String>,
        remaining: usize,
    },
}

#[derive(Debug, Default)]
pub struct ReceiveMachine {
    state: State,
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

fn parse_header(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if KNOWN_HEADERS.contains(&key) {
        Some((key.to_string(), value.trim().to_string()))
    } else {
        None
    }
}

fn fields_present(headers: &HashMap<String, String>, required: &[&str]) -> bool {
    required.iter().all(|f| headers.contains_key(*f))
}

impl ReceiveMachine {
    pub fn new() -> Self {
        ReceiveMachine { state: State::Idle }
    }

    pub fn need(&self) -> Need {
        match &self.state {
            State::Idle | State::InMessage { .. } => Need::Line,
            State::AwaitingPayloadBytes { remaining, .. } => Need::Bytes(*remaining),
        }
    }

    /// Feed one text line (terminator already stripped).
    pub fn feed_line(&mut self, line: String) -> Option<CompletedReply> {
        match std::mem::take(&mut self.state) {
            State::Idle => {
                let kind = ReplyKind::parse(&line);
                let lines = vec![line];
                if kind.completes_with_no_fields() {
                    self.state = State::Idle;
                    return Some(CompletedReply { kind, headers: HashMap::new(), lines, payload: None });
                }
                self.state = State::InMessage { kind, headers: HashMap::new(), lines };
                None
            }
            State::InMessage { kind, mut headers, mut lines } => {
                lines.push(line.clone());

                if let Some((key, value)) = parse_header(&line) {
                    headers.insert(key, value);

                    // A message-bearing reply never completes on a header
                    // alone, no matter how many required fields are in —
                    // only the free-form line after them ends it.
                    if kind.has_message() {
                        self.state = State::InMessage { kind, headers, lines };
                        return None;
                    }

                    if !fields_present(&headers, kind.required_fields()) {
                        self.state = State::InMessage { kind, headers, lines };
                        return None;
                    }

                    if kind.has_payload() {
                        return match headers
                            .get("Length")
                            .and_then(|s| s.trim().parse::<usize>().ok())
                        {
                            Some(n) => {
                                self.state =
                                    State::AwaitingPayloadBytes { kind, headers, lines, remaining: n };
                                None
                            }
                            // Required fields are in, but it isn't yet known
                            // whether a `Length:` header is still coming or
                            // the next line is the payload itself: keep
                            // reading lines as headers until one resolves it.
                            None => {
                                self.state = State::InMessage { kind, headers, lines };
                                None
                            }
                        };
                    }

                    self.state = State::Idle;
                    return Some(CompletedReply { kind, headers, lines, payload: None });
                }

                // Not a recognized header line.
                if kind.has_message() {
                    self.state = State::Idle;
                    return Some(CompletedReply { kind, headers, lines, payload: None });
                }

                if kind.has_payload() && fields_present(&headers, kind.required_fields()) {
                    self.state = State::Idle;
                    return Some(CompletedReply {
                        kind,
                        headers,
                        lines,
                        payload: Some(line.into_bytes()),
                    });
                }

                // Neither a recognized header, an expected message line, nor
                // (for a payload-bearing kind whose fields are already in) a
                // fallback payload line: this reply is malformed.
                self.state = State::Idle;
                Some(CompletedReply { kind: ReplyKind::Unknown, headers, lines, payload: None })
            }
            awaiting @ State::AwaitingPayloadBytes { .. } => {
                // A line arrived while we expected raw bytes; the caller
                // drove the machine incorrectly. Put the state back and
                // ignore the line rather than lose the accumulated reply.
                self.state = awaiting;
                None
            }
        }
    }

    /// Feed exactly the number of bytes [`Need::Bytes`] last asked for.
    pub fn feed_bytes(&mut self, bytes: Vec<u8>) -> Option<CompletedReply> {
        match std::mem::take(&mut self.state) {
            State::AwaitingPayloadBytes { kind, headers, mut lines, .. } => {
                lines.push(String::from_utf8_lossy(&bytes).into_owned());
                self.state = State::Idle;
                Some(CompletedReply { kind, headers, lines, payload: Some(bytes) })
            }
            other => {
                self.state = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive_lines(m: &mut ReceiveMachine, lines: &[&str]) -> Option<CompletedReply> {
        let mut last = None;
        for line in lines {
            last = m.feed_line(line.to_string());
        }
        last
    }

    #[test]
    fn create_ok_completes_once_both_headers_arrive() {
        let mut m = ReceiveMachine::new();
        let reply = drive_lines(&mut m, &["CREATE OK", "Name:sheet", "Password:pw"]).unwrap();
        assert_eq!(reply.kind, ReplyKind::CreateOk);
        assert_eq!(reply.headers.get("Name").unwrap(), "sheet");
        assert_eq!(reply.headers.get("Password").unwrap(), "pw");
    }

    #[test]
    fn headers_may_arrive_out_of_order() {
        let mut m = ReceiveMachine::new();
        let reply = drive_lines(&mut m, &["CHANGE OK", "Version:3", "Name:sheet"]).unwrap();
        assert_eq!(reply.kind, ReplyKind::ChangeOk);
        assert_eq!(reply.headers.get("Version").unwrap(), "3");
    }

    #[test]
    fn create_fail_ends_on_the_free_form_message_line() {
        let mut m = ReceiveMachine::new();
        let reply =
            drive_lines(&mut m, &["CREATE FAIL", "Name:sheet", "file already exists"]).unwrap();
        assert_eq!(reply.kind, ReplyKind::CreateFail);
        assert_eq!(reply.lines.last().unwrap(), "file already exists");
    }

    #[test]
    fn save_ok_completes_immediately_with_no_fields() {
        let mut m = ReceiveMachine::new();
        let reply = m.feed_line("SAVE OK".to_string()).unwrap();
        assert_eq!(reply.kind, ReplyKind::SaveOk);
    }

    #[test]
    fn bare_error_completes_immediately() {
        let mut m = ReceiveMachine::new();
        let reply = m.feed_line("ERROR".to_string()).unwrap();
        assert_eq!(reply.kind, ReplyKind::Error);
    }

    #[test]
    fn join_ok_with_length_header_asks_for_exact_bytes() {
        let mut m = ReceiveMachine::new();
        assert!(m.feed_line("JOIN OK".to_string()).is_none());
        assert!(m.feed_line("Name:sheet".to_string()).is_none());
        assert!(m.feed_line("Version:1".to_string()).is_none());
        assert!(m.feed_line("Length:11".to_string()).is_none());
        assert_eq!(m.need(), Need::Bytes(11));
        let reply = m.feed_bytes(b"<sheet/>xyz".to_vec()).unwrap();
        assert_eq!(reply.kind, ReplyKind::JoinOk);
        assert_eq!(reply.payload.unwrap(), b"<sheet/>xyz".to_vec());
    }

    #[test]
    fn join_ok_without_length_falls_back_to_next_line_as_payload() {
        let mut m = ReceiveMachine::new();
        m.feed_line("JOIN OK".to_string());
        m.feed_line("Name:sheet".to_string());
        m.feed_line("Version:1".to_string());
        assert_eq!(m.need(), Need::Line);
        let reply = m.feed_line("<sheet/>".to_string()).unwrap();
        assert_eq!(reply.payload.unwrap(), b"<sheet/>".to_vec());
    }

    #[test]
    fn unrecognized_first_line_is_reported_as_unknown() {
        let mut m = ReceiveMachine::new();
        let reply = m.feed_line("GARBAGE".to_string()).unwrap();
        assert_eq!(reply.kind, ReplyKind::Unknown);
    }

    #[test]
    fn update_carries_cell_and_payload() {
        let mut m = ReceiveMachine::new();
        m.feed_line("UPDATE".to_string());
        m.feed_line("Name:sheet".to_string());
        m.feed_line("Version:9".to_string());
        m.feed_line("Cell:A1".to_string());
        m.feed_line("Length:2".to_string());
        let reply = m.feed_bytes(b"42".to_vec()).unwrap();
        assert_eq!(reply.kind, ReplyKind::Update);
        assert_eq!(reply.headers.get("Cell").unwrap(), "A1");
        assert_eq!(reply.payload.unwrap(), b"42".to_vec());
    }
}
