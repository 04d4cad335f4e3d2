//! End-to-end tests against a loopback `TcpListener` standing in for a
//! Gridline server, exercising the full `Engine::connect` -> wire protocol
//! -> `SpreadsheetEvent` path.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use gridline_core::{ConnectConfig, Engine, SpreadsheetEvent};
use gridline_engine::DefaultNameRules;

fn spawn_fake_server(script: impl FnOnce(TcpStream) + Send + 'static) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            script(stream);
        }
    });
    port
}

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line.trim_end_matches(['\r', '\n']).to_string()
}

fn wait_for<F: Fn() -> bool>(pred: F) {
    for _ in 0..200 {
        if pred() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("condition never became true");
}

type EventLog = Arc<Mutex<Vec<SpreadsheetEvent>>>;

fn subscribe_log(engine: &Engine) -> EventLog {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();
    engine.subscribe(move |e| log_clone.lock().unwrap().push(e.clone()));
    log
}

#[test]
fn join_ok_with_payload_populates_the_store_and_fires_joined() {
    let port = spawn_fake_server(|stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;

        assert_eq!(read_line(&mut reader), "JOIN");
        // consume the rest of the request frame
        let _ = read_line(&mut reader); // Name
        let _ = read_line(&mut reader); // Password

        // Give the caller time to subscribe before any reply can arrive.
        thread::sleep(Duration::from_millis(50));

        let payload =
            b"<spreadsheet version=\"1\"><cell><name>A1</name><contents>5</contents></cell></spreadsheet>";
        writer
            .write_all(
                format!(
                    "JOIN OK\nName:sheet\nVersion:1\nLength:{}\n",
                    payload.len()
                )
                .as_bytes(),
            )
            .unwrap();
        writer.write_all(payload).unwrap();
        writer.write_all(b"\n").unwrap();
        writer.flush().unwrap();

        thread::sleep(Duration::from_millis(200));
    });

    let config = ConnectConfig::new("127.0.0.1", port, "sheet", "", false);
    let engine = Engine::connect(config, Arc::new(DefaultNameRules)).unwrap();
    let log = subscribe_log(&engine);

    wait_for(|| log.lock().unwrap().iter().any(|e| matches!(e, SpreadsheetEvent::Joined)));

    assert_eq!(engine.get_cell_value("A1").to_string(), "5");
}

#[test]
fn join_fail_closes_the_session_and_fires_failed() {
    let port = spawn_fake_server(|stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        assert_eq!(read_line(&mut reader), "JOIN");
        let _ = read_line(&mut reader);
        let _ = read_line(&mut reader);

        thread::sleep(Duration::from_millis(50));
        writer.write_all(b"JOIN FAIL\nName:sheet\nwrong password\n").unwrap();
        writer.flush().unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let config = ConnectConfig::new("127.0.0.1", port, "sheet", "bad", false);
    let engine = Engine::connect(config, Arc::new(DefaultNameRules)).unwrap();
    let log = subscribe_log(&engine);

    wait_for(|| !log.lock().unwrap().is_empty());

    let log = log.lock().unwrap();
    assert!(matches!(log[0], SpreadsheetEvent::Failed(_)));
}

#[test]
fn change_ok_applies_locally_and_fires_updated() {
    let port = spawn_fake_server(|stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;

        assert_eq!(read_line(&mut reader), "JOIN");
        let _ = read_line(&mut reader);
        let _ = read_line(&mut reader);
        thread::sleep(Duration::from_millis(50));
        writer.write_all(b"JOIN OK\nName:sheet\nVersion:1\nLength:0\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(read_line(&mut reader), "CHANGE");
        let _ = read_line(&mut reader); // Name
        let _ = read_line(&mut reader); // Version
        let _ = read_line(&mut reader); // Cell
        let length_line = read_line(&mut reader); // Length:n
        let n: usize = length_line.trim_start_matches("Length:").parse().unwrap();
        let mut buf = vec![0u8; n];
        std::io::Read::read_exact(&mut reader, &mut buf).unwrap();
        assert_eq!(buf, b"5");

        writer.write_all(b"CHANGE OK\nName:sheet\nVersion:2\n").unwrap();
        writer.flush().unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let config = ConnectConfig::new("127.0.0.1", port, "sheet", "", false);
    let engine = Engine::connect(config, Arc::new(DefaultNameRules)).unwrap();
    let log = subscribe_log(&engine);

    wait_for(|| log.lock().unwrap().iter().any(|e| matches!(e, SpreadsheetEvent::Joined)));
    engine.change("A1", "5").unwrap();

    wait_for(|| log.lock().unwrap().iter().any(|e| matches!(e, SpreadsheetEvent::Updated(_))));
    assert_eq!(engine.get_cell_value("A1").to_string(), "5");
}

#[test]
fn a_second_change_while_one_is_pending_is_a_silent_no_op() {
    let port = spawn_fake_server(|stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;

        assert_eq!(read_line(&mut reader), "JOIN");
        let _ = read_line(&mut reader);
        let _ = read_line(&mut reader);
        thread::sleep(Duration::from_millis(50));
        writer.write_all(b"JOIN OK\nName:sheet\nVersion:1\nLength:0\n").unwrap();
        writer.flush().unwrap();

        // Only one CHANGE request should ever arrive.
        assert_eq!(read_line(&mut reader), "CHANGE");
        let _ = read_line(&mut reader);
        let _ = read_line(&mut reader);
        let _ = read_line(&mut reader);
        let length_line = read_line(&mut reader);
        let n: usize = length_line.trim_start_matches("Length:").parse().unwrap();
        let mut buf = vec![0u8; n];
        std::io::Read::read_exact(&mut reader, &mut buf).unwrap();

        writer.write_all(b"CHANGE OK\nName:sheet\nVersion:2\n").unwrap();
        writer.flush().unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let config = ConnectConfig::new("127.0.0.1", port, "sheet", "", false);
    let engine = Engine::connect(config, Arc::new(DefaultNameRules)).unwrap();
    let log = subscribe_log(&engine);
    wait_for(|| log.lock().unwrap().iter().any(|e| matches!(e, SpreadsheetEvent::Joined)));

    engine.change("A1", "5").unwrap();
    engine.change("A1", "999").unwrap(); // dropped: a change is already pending

    wait_for(|| log.lock().unwrap().iter().any(|e| matches!(e, SpreadsheetEvent::Updated(_))));
    assert_eq!(engine.get_cell_value("A1").to_string(), "5");
}

#[test]
fn a_circular_change_is_rejected_before_anything_is_sent() {
    let port = spawn_fake_server(|stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        assert_eq!(read_line(&mut reader), "JOIN");
        let _ = read_line(&mut reader);
        let _ = read_line(&mut reader);
        thread::sleep(Duration::from_millis(50));
        writer.write_all(b"JOIN OK\nName:sheet\nVersion:1\nLength:0\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(read_line(&mut reader), "CHANGE");
        let _ = read_line(&mut reader); // Name
        let _ = read_line(&mut reader); // Version
        let _ = read_line(&mut reader); // Cell
        let length_line = read_line(&mut reader);
        let n: usize = length_line.trim_start_matches("Length:").parse().unwrap();
        let mut buf = vec![0u8; n];
        std::io::Read::read_exact(&mut reader, &mut buf).unwrap();

        writer.write_all(b"CHANGE OK\nName:sheet\nVersion:2\n").unwrap();
        writer.flush().unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let config = ConnectConfig::new("127.0.0.1", port, "sheet", "", false);
    let engine = Engine::connect(config, Arc::new(DefaultNameRules)).unwrap();
    let log = subscribe_log(&engine);
    wait_for(|| log.lock().unwrap().iter().any(|e| matches!(e, SpreadsheetEvent::Joined)));

    // A1 = B1+1 is accepted (B1 is still empty) and applied once CHANGE OK
    // arrives, wiring a real B1 -> A1 dependency edge into the store.
    engine.change("A1", "=B1+1").unwrap();
    wait_for(|| log.lock().unwrap().iter().any(|e| matches!(e, SpreadsheetEvent::Updated(_))));

    // B1 = A1+1 would close the cycle; rejected locally, nothing sent.
    assert!(engine.change("B1", "=A1+1").is_err());
}

#[test]
fn server_disconnect_fires_connection_closed() {
    let port = spawn_fake_server(|stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let writer = stream;
        assert_eq!(read_line(&mut reader), "JOIN");
        let _ = read_line(&mut reader);
        let _ = read_line(&mut reader);
        drop(writer);
        drop(reader);
    });

    let config = ConnectConfig::new("127.0.0.1", port, "sheet", "", false);
    let engine = Engine::connect(config, Arc::new(DefaultNameRules)).unwrap();
    let log = subscribe_log(&engine);

    wait_for(|| {
        log.lock().unwrap().iter().any(|e| matches!(e, SpreadsheetEvent::ConnectionClosed))
    });
}
