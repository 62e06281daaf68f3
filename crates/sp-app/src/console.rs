//! Line-oriented operator commands read from stdin.

use std::io::BufRead;

use serde::Serialize;
use sp_actuator::Action;
use sp_detect::{ControlError, DetectionOrchestrator};

pub const HELP: &str = "\
commands:
  capture                  one background capture and classification
  auto on|off              start or stop automatic detection
  delay <1-60>             pause after a detection, minutes
  channel <1|2> on|off     pump and valve together
  valve <1|2> on|off       valve only
  pillow <1|2|3>           deflate, then inflate to a level
  deflate                  run the deflation channel
  cancel                   stop the running sequence, outputs off
  status | info | settings
  history [n]              most recent detections first
  log                      activity log
  quit";

const DEFAULT_HISTORY: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    Capture,
    Auto(bool),
    Delay(u32),
    Channel(u8, Action),
    Valve(u8, Action),
    Pillow(u8),
    Deflate,
    Cancel,
    Status,
    Info,
    Settings,
    History(usize),
    Log,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
///
/// # Errors
/// Returns a usage message for unknown commands or bad arguments.
pub fn parse(line: &str) -> Result<Option<Request>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let request = match (command.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("capture", []) => Request::Capture,
        ("auto", [state]) => Request::Auto(switch(state)?.is_on()),
        ("delay", [minutes]) => Request::Delay(number(minutes)?),
        ("channel", [ch, state]) => Request::Channel(number(ch)?, switch(state)?),
        ("valve", [ch, state]) => Request::Valve(number(ch)?, switch(state)?),
        ("pillow", [level]) => Request::Pillow(number(level)?),
        ("deflate", []) => Request::Deflate,
        ("cancel", []) => Request::Cancel,
        ("status", []) => Request::Status,
        ("info", []) => Request::Info,
        ("settings", []) => Request::Settings,
        ("history", []) => Request::History(DEFAULT_HISTORY),
        ("history", [n]) => Request::History(number(n)?),
        ("log", []) => Request::Log,
        ("help" | "?", _) => Request::Help,
        ("quit" | "exit", []) => Request::Quit,
        _ => return Err(format!("unrecognized command '{}'; type 'help'", line.trim())),
    };
    Ok(Some(request))
}

fn switch(word: &str) -> Result<Action, String> {
    word.parse().map_err(|e: sp_actuator::ActuatorError| e.to_string())
}

fn number<T: std::str::FromStr>(word: &str) -> Result<T, String> {
    word.parse().map_err(|_| format!("'{word}' is not a valid number"))
}

/// Run one request; the returned text is what the operator sees.
///
/// # Errors
/// Whatever the orchestrator rejected the request with.
pub fn execute(orchestrator: &DetectionOrchestrator, request: Request) -> Result<String, ControlError> {
    match request {
        Request::Capture => orchestrator.trigger_capture(None),
        Request::Auto(enabled) => orchestrator.set_auto_run(enabled),
        Request::Delay(minutes) => orchestrator.set_detection_delay(minutes),
        Request::Channel(ch, action) => orchestrator.control_actuator(ch, action),
        Request::Valve(ch, action) => orchestrator.control_valve(ch, action),
        Request::Pillow(level) => orchestrator.adjust_pillow_level(level),
        Request::Deflate => orchestrator.deflate(),
        Request::Cancel => orchestrator.cancel_sequence(),
        Request::Status => Ok(json(&orchestrator.status())),
        Request::Info => Ok(json(&orchestrator.info())),
        Request::Settings => Ok(json(&orchestrator.settings())),
        Request::History(limit) => Ok(json(&orchestrator.history(limit))),
        Request::Log => Ok(json(&orchestrator.activity_log())),
        Request::Help | Request::Quit => Ok(HELP.to_string()),
    }
}

pub fn json(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

/// Serve commands from `input` until `quit` or end of input.
///
/// Returns `true` when the operator asked to quit.
pub fn serve(orchestrator: &DetectionOrchestrator, input: impl BufRead) -> bool {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Console input closed: {e}");
                return false;
            }
        };
        match parse(&line) {
            Ok(None) => {}
            Ok(Some(Request::Quit)) => return true,
            Ok(Some(request)) => match execute(orchestrator, request) {
                Ok(text) => println!("{text}"),
                Err(e) => println!("error: {e}"),
            },
            Err(usage) => println!("{usage}"),
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(parse("capture"), Ok(Some(Request::Capture)));
        assert_eq!(parse("AUTO on"), Ok(Some(Request::Auto(true))));
        assert_eq!(parse("delay 15"), Ok(Some(Request::Delay(15))));
        assert_eq!(parse("channel 2 OFF"), Ok(Some(Request::Channel(2, Action::Off))));
        assert_eq!(parse("valve 1 on"), Ok(Some(Request::Valve(1, Action::On))));
        assert_eq!(parse("history"), Ok(Some(Request::History(DEFAULT_HISTORY))));
        assert_eq!(parse("history 3"), Ok(Some(Request::History(3))));
        assert_eq!(parse("exit"), Ok(Some(Request::Quit)));
    }

    #[test]
    fn range_checks_are_left_to_the_orchestrator() {
        assert_eq!(parse("delay 0"), Ok(Some(Request::Delay(0))));
        assert_eq!(parse("pillow 7"), Ok(Some(Request::Pillow(7))));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse("channel 1 maybe").is_err());
        assert!(parse("delay soon").is_err());
        assert!(parse("delay -1").is_err());
        assert!(parse("capture now").is_err());
        assert!(parse("inflate").is_err());
    }
}
