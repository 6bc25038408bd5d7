//! Operator console control
//!
//! Line-oriented: `t` (or an empty line / space) triggers one detection,
//! `c` toggles continuous mode, `q` quits. Commands go to the detection loop
//! over an unbounded channel so the reader thread never waits on it.

use crate::detection::Command;
use std::io::BufRead;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Parse one console line; `None` for anything unrecognised
pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "t" | "trigger" => Some(Command::TriggerOnce),
        "c" | "continuous" => Some(Command::ToggleContinuous),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

pub const USAGE: &str = "Controls: [Enter]/t = detect once, c = toggle continuous, q = quit";

/// Read commands from `input` until EOF, quit, or the loop goes away
pub fn read_commands<B: BufRead>(input: B, tx: &UnboundedSender<Command>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Console read failed: {}", e);
                return;
            }
        };
        let Some(command) = parse_command(&line) else {
            println!("Unknown command '{}'. {}", line.trim(), USAGE);
            continue;
        };
        if tx.send(command).is_err() {
            debug!("Detection loop gone, console control exiting");
            return;
        }
        if command == Command::Quit {
            return;
        }
    }
    debug!("Console input closed");
}

/// Spawn a detached thread feeding stdin lines to the loop
pub fn spawn_console_control(tx: UnboundedSender<Command>) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("console-control".to_string())
        .spawn(move || {
            println!("{}", USAGE);
            let stdin = std::io::stdin();
            read_commands(stdin.lock(), &tx);
        })
}
