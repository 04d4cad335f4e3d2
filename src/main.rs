//! Gridline - collaborative spreadsheet client REPL.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use gridline_core::{ConnectConfig, Engine, SpreadsheetEvent, DEFAULT_PORT};
use gridline_engine::DefaultNameRules;

fn print_usage() {
    eprintln!("Usage: gridline [OPTIONS] <FILE>");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <FILE>                  Name of the shared spreadsheet on the server");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --host <HOST>           Server host (default: localhost)");
    eprintln!("  --port <PORT>           Server port (default: {DEFAULT_PORT})");
    eprintln!("  --password <PASSWORD>   Password for the file (default: empty)");
    eprintln!("  --create                Create <FILE> instead of joining it");
    eprintln!("  -h, --help              Print help");
}

struct Args {
    file: String,
    host: String,
    port: u16,
    password: String,
    create_new: bool,
}

fn parse_args() -> Result<Args, ()> {
    let argv: Vec<String> = std::env::args().collect();

    let mut file: Option<String> = None;
    let mut host = "localhost".to_string();
    let mut port = DEFAULT_PORT;
    let mut password = String::new();
    let mut create_new = false;

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return Err(());
            }
            "--host" => {
                i += 1;
                if i >= argv.len() {
                    eprintln!("Error: --host requires a value");
                    return Err(());
                }
                host = argv[i].clone();
            }
            "--port" => {
                i += 1;
                if i >= argv.len() {
                    eprintln!("Error: --port requires a value");
                    return Err(());
                }
                port = match argv[i].parse() {
                    Ok(p) => p,
                    Err(_) => {
                        eprintln!("Error: --port expects a number, got {}", argv[i]);
                        return Err(());
                    }
                };
            }
            "--password" => {
                i += 1;
                if i >= argv.len() {
                    eprintln!("Error: --password requires a value");
                    return Err(());
                }
                password = argv[i].clone();
            }
            "--create" => create_new = true,
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option: {arg}");
                print_usage();
                return Err(());
            }
            _ => {
                if file.is_none() {
                    file = Some(argv[i].clone());
                } else {
                    eprintln!("Error: Unexpected argument: {}", argv[i]);
                    return Err(());
                }
            }
        }
        i += 1;
    }

    match file {
        Some(file) => Ok(Args { file, host, port, password, create_new }),
        None => {
            eprintln!("Error: a FILE argument is required");
            print_usage();
            Err(())
        }
    }
}

fn print_event(event: &SpreadsheetEvent) {
    match event {
        SpreadsheetEvent::Joined => println!("-- joined --"),
        SpreadsheetEvent::Updated(cells) => {
            for cell in cells {
                println!("{cell} updated");
            }
        }
        SpreadsheetEvent::Failed(lines) => {
            eprintln!("server rejected request: {}", lines.last().map(String::as_str).unwrap_or(""));
        }
        SpreadsheetEvent::UndoEnd => println!("-- nothing left to undo --"),
        SpreadsheetEvent::ConnectionClosed => println!("-- connection closed --"),
        SpreadsheetEvent::SocketError(reason) => eprintln!("socket error: {reason}"),
        SpreadsheetEvent::GenericError => eprintln!("server sent an error"),
    }
}

fn run_repl(engine: Arc<Engine>) {
    let stdin = io::stdin();
    print!("> ");
    let _ = io::stdout().flush();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("").trim();

        match command {
            "" => {}
            "get" => println!("{}", engine.get_cell_value(rest)),
            "set" => {
                let mut kv = rest.splitn(2, char::is_whitespace);
                let cell = kv.next().unwrap_or("");
                let content = kv.next().unwrap_or("");
                if let Err(e) = engine.change(cell, content) {
                    eprintln!("Error: {e}");
                }
            }
            "names" => {
                for name in engine.names_of_all_nonempty_cells() {
                    println!("{name}");
                }
            }
            "undo" => {
                if let Err(e) = engine.undo() {
                    eprintln!("Error: {e}");
                }
            }
            "save" => {
                if let Err(e) = engine.save() {
                    eprintln!("Error: {e}");
                }
            }
            "save-local" => {
                if let Err(e) = engine.save_local(&PathBuf::from(rest)) {
                    eprintln!("Error: {e}");
                }
            }
            "quit" | "leave" => {
                let _ = engine.leave();
                break;
            }
            other => eprintln!("Error: unknown command: {other}"),
        }
        print!("> ");
        let _ = io::stdout().flush();
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(()) => std::process::exit(1),
    };

    let config = ConnectConfig::new(args.host, args.port, args.file, args.password, args.create_new);
    let engine = match Engine::connect(config, Arc::new(DefaultNameRules)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    engine.subscribe(print_event);

    run_repl(engine);
}
