//! Interactive shell over two in-process store sessions
//!
//! Accepts the same commands as scripts, one per line, and prints results

use rbvault::{parse_line, AbortSignal, Interpreter, Outcome, SessionId, Sessions};
use std::io::{self, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rbvault=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let sessions = Sessions::new();
    let abort = AbortSignal::new();
    let interpreter = Interpreter::new(&sessions, &abort);

    println!("RbVault shell with sessions 1 and 2. Type 'help' for available commands or 'quit' to exit.");

    let mut line_no = 0;
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        line_no += 1;
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                print_help();
            }
            "dump" => {
                dump(&sessions);
            }
            _ => {
                if let Err(e) = handle_command(&interpreter, line_no, input) {
                    println!("Error: {}", e);
                }
            }
        }
    }

    let drained = sessions.drain_all();
    println!("Released {} and {} entries", drained[0], drained[1]);
    Ok(())
}

fn handle_command(interpreter: &Interpreter<'_>, line_no: usize, input: &str) -> rbvault::Result<()> {
    let Some(command) = parse_line(line_no, input)? else {
        return Ok(());
    };

    match interpreter.execute(&command)? {
        Outcome::Written => println!("OK"),
        Outcome::Extracted(entry) => println!("{}: {}", entry.key, entry.payload),
        Outcome::Empty => println!("No nodes in tree"),
        Outcome::Slept(duration) => println!("Slept {:?}", duration),
        Outcome::Interrupted => println!("Interrupted"),
        Outcome::ModeSet => println!("OK"),
        Outcome::ModeRejected(flag) => println!("Invalid mode: {} (expected 0 or 1)", flag),
    }
    Ok(())
}

fn dump(sessions: &Sessions) {
    for id in [SessionId::FIRST, SessionId::SECOND] {
        let session = sessions.lock(id);
        let entries: Vec<String> = session
            .entries()
            .iter()
            .map(|entry| format!("{}: {}", entry.key, entry.payload))
            .collect();
        println!("session {} ({:?}, {} entries): [{}]", id, session.mode(), session.len(), entries.join(", "));
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  w <session> <key> <data>  - Insert or replace a key (first 4 bytes of data)");
    println!("  w <session> <key>         - Delete a key");
    println!("  r <session>               - Extract the max (or min) entry");
    println!("  s <session> <0|1>         - Extract max (0) or min (1) on reads");
    println!("  d <microseconds>          - Sleep");
    println!("  dump                      - Show both sessions without extracting");
    println!("  help                      - Show this help message");
    println!("  quit                      - Exit the shell");
}
