//! Script parsing and execution
//!
//! A script is line oriented, one command per line:
//!
//! | line | effect |
//! |---|---|
//! | `w <session> <key> <payload>` | upsert `key` with the first four bytes of `payload` |
//! | `w <session> <key>` | delete `key` |
//! | `r <session>` | extract one entry and emit `"<key>: <payload>"` |
//! | `d <microseconds>` | suspend the issuing worker |
//! | `s <session> <flag>` | `0` extracts the maximum, `1` the minimum |
//!
//! Anything else is a parse failure, which aborts the whole run.

use crate::error::{RbVaultError, Result};
use crate::protocol::{decode, Packet};
use crate::session::{Device, SessionId, Sessions};
use crate::store::{Entry, Payload};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::{i32 as key_number, i64 as signed_number, multispace1, u64 as micros},
    combinator::{eof, map, map_res, opt, peek},
    sequence::{preceded, terminated, tuple},
    IResult,
};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// One parsed script line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptCommand {
    /// Upsert when a payload is present, delete otherwise.
    Write {
        session: SessionId,
        key: i32,
        payload: Option<Payload>,
    },
    Read { session: SessionId },
    Delay(Duration),
    SetMode { session: SessionId, flag: i64 },
}

impl ScriptCommand {
    /// Session the command targets, if any
    pub fn session(&self) -> Option<SessionId> {
        match *self {
            ScriptCommand::Write { session, .. }
            | ScriptCommand::Read { session }
            | ScriptCommand::SetMode { session, .. } => Some(session),
            ScriptCommand::Delay(_) => None,
        }
    }
}

/// Parse one script line. Blank lines yield `None`.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<ScriptCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    match command_parser(line) {
        Ok((_, command)) => Ok(Some(command)),
        Err(_) => Err(RbVaultError::ScriptParse {
            line: line_no,
            reason: describe_failure(line),
        }),
    }
}

fn describe_failure(line: &str) -> String {
    let verb = line.split_whitespace().next().unwrap_or_default();
    let usage = match verb {
        "w" => "w <session> <key> [<payload>]",
        "r" => "r <session>",
        "d" => "d <microseconds>",
        "s" => "s <session> <mode>",
        other => return format!("unknown command '{}'", other),
    };
    format!("malformed arguments, expected `{}`", usage)
}

fn command_parser(input: &str) -> IResult<&str, ScriptCommand> {
    alt((write_command, read_command, delay_command, mode_command))(input)
}

/// A numeric token must be followed by whitespace or end of line.
fn end_of_token(input: &str) -> IResult<&str, &str> {
    peek(alt((multispace1, eof)))(input)
}

fn session_arg(input: &str) -> IResult<&str, SessionId> {
    map_res(
        preceded(multispace1, terminated(signed_number, end_of_token)),
        SessionId::new,
    )(input)
}

/// Parse write command: w <session> <key> [<payload>]
fn write_command(input: &str) -> IResult<&str, ScriptCommand> {
    map(
        tuple((
            tag("w"),
            session_arg,
            preceded(multispace1, terminated(key_number, end_of_token)),
            opt(preceded(multispace1, take_till1(char::is_whitespace))),
        )),
        |(_, session, key, payload)| ScriptCommand::Write {
            session,
            key,
            payload: payload.map(Payload::from_token),
        },
    )(input)
}

/// Parse read command: r <session>
fn read_command(input: &str) -> IResult<&str, ScriptCommand> {
    map(preceded(tag("r"), session_arg), |session| ScriptCommand::Read { session })(input)
}

/// Parse delay command: d <microseconds>
fn delay_command(input: &str) -> IResult<&str, ScriptCommand> {
    map(
        preceded(tag("d"), preceded(multispace1, terminated(micros, end_of_token))),
        |us| ScriptCommand::Delay(Duration::from_micros(us)),
    )(input)
}

/// Parse mode command: s <session> <mode>
fn mode_command(input: &str) -> IResult<&str, ScriptCommand> {
    map(
        tuple((
            tag("s"),
            session_arg,
            preceded(multispace1, terminated(signed_number, end_of_token)),
        )),
        |(_, session, flag)| ScriptCommand::SetMode { session, flag },
    )(input)
}

/// Run-wide abort flag. Raising it also wakes workers suspended in a delay.
#[derive(Debug, Default)]
pub struct AbortSignal {
    raised: Mutex<bool>,
    wake: Condvar,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every sleeping worker
    pub fn raise(&self) {
        *self.raised.lock() = true;
        self.wake.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.raised.lock()
    }

    /// Sleep for `duration` unless the flag is raised first.
    ///
    /// Returns `false` when the sleep was cut short by [`AbortSignal::raise`].
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut raised = self.raised.lock();
        while !*raised {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut raised, deadline).timed_out() {
                        return !*raised;
                    }
                }
                None => self.wake.wait(&mut raised),
            }
        }
        false
    }
}

/// Result of executing one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Written,
    Extracted(Entry),
    /// Read on a session holding no entries.
    Empty,
    Slept(Duration),
    /// Delay cut short because the run was aborted.
    Interrupted,
    ModeSet,
    /// Mode flag outside `{0, 1}`; the session keeps its mode.
    ModeRejected(i64),
}

/// Executes commands against the sessions through their packet surface
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'a> {
    sessions: &'a Sessions,
    abort: &'a AbortSignal,
}

impl<'a> Interpreter<'a> {
    pub fn new(sessions: &'a Sessions, abort: &'a AbortSignal) -> Self {
        Self { sessions, abort }
    }

    pub fn execute(&self, command: &ScriptCommand) -> Result<Outcome> {
        match *command {
            ScriptCommand::Write { session, key, payload } => {
                let packet = match payload {
                    Some(payload) => Packet::upsert(key, payload),
                    None => Packet::delete(key),
                };
                self.sessions.lock(session).submit_write(&packet.to_bytes())?;
                Ok(Outcome::Written)
            }
            ScriptCommand::Read { session } => {
                let read = self.sessions.lock(session).submit_read();
                match read {
                    Ok(bytes) => Ok(Outcome::Extracted(decode(&bytes)?.entry())),
                    Err(RbVaultError::Empty) => Ok(Outcome::Empty),
                    Err(e) => Err(e),
                }
            }
            ScriptCommand::Delay(duration) => {
                if self.abort.sleep(duration) {
                    Ok(Outcome::Slept(duration))
                } else {
                    Ok(Outcome::Interrupted)
                }
            }
            ScriptCommand::SetMode { session, flag } => {
                let control = self.sessions.lock(session).submit_control(flag);
                match control {
                    Ok(()) => Ok(Outcome::ModeSet),
                    Err(RbVaultError::InvalidMode(flag)) => Ok(Outcome::ModeRejected(flag)),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

/// Per-worker counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub lines: usize,
    pub writes: usize,
    pub reads: usize,
    pub empty_reads: usize,
    pub delays: usize,
    pub mode_changes: usize,
    pub rejected_modes: usize,
}

impl WorkerReport {
    pub fn new(worker: usize) -> Self {
        Self { worker, ..Self::default() }
    }
}

/// Runs one script to completion, writing read results to `output`
pub struct ScriptWorker<'a, R, W> {
    worker: usize,
    interpreter: Interpreter<'a>,
    abort: &'a AbortSignal,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: Write> ScriptWorker<'a, R, W> {
    pub fn new(worker: usize, sessions: &'a Sessions, abort: &'a AbortSignal, input: R, output: W) -> Self {
        Self {
            worker,
            interpreter: Interpreter::new(sessions, abort),
            abort,
            input,
            output,
        }
    }

    /// Execute every line in order. A fatal error raises the shared abort
    /// signal so the other worker stops before its next line, or wakes early
    /// from a delay.
    pub fn run(mut self) -> Result<WorkerReport> {
        let worker = self.worker;
        let result = self.run_lines();
        if let Err(e) = &result {
            self.abort.raise();
            error!(worker, "aborting run: {}", e);
        }
        self.output.flush()?;
        result
    }

    fn run_lines(&mut self) -> Result<WorkerReport> {
        let mut report = WorkerReport::new(self.worker);
        let mut line = String::new();
        let mut line_no = 0;

        loop {
            if self.abort.is_raised() {
                warn!(worker = self.worker, line = line_no, "stopping: run aborted");
                break;
            }

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                break;
            }
            line_no += 1;
            report.lines += 1;

            let Some(command) = parse_line(line_no, &line)? else {
                continue;
            };
            debug!(worker = self.worker, line = line_no, ?command, "executing");

            match self.interpreter.execute(&command)? {
                Outcome::Written => report.writes += 1,
                Outcome::Extracted(entry) => {
                    report.reads += 1;
                    writeln!(self.output, "{}: {}", entry.key, entry.payload)?;
                }
                Outcome::Empty => {
                    report.empty_reads += 1;
                    let session = command.session().map(|s| s.number()).unwrap_or_default();
                    warn!(worker = self.worker, session, "No nodes in tree");
                }
                Outcome::Slept(_) => report.delays += 1,
                Outcome::Interrupted => {}
                Outcome::ModeSet => report.mode_changes += 1,
                Outcome::ModeRejected(flag) => {
                    report.rejected_modes += 1;
                    warn!(worker = self.worker, line = line_no, flag, "rejected extraction mode");
                }
            }
        }

        Ok(report)
    }
}
