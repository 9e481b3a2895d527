//! Command dispatcher
//!
//! Turns a raw input line into an [`Input`]: nothing, a chat message, or one
//! of the slash commands. Parsing is pure; executing happens in the session.

use thiserror::Error;

/// Prefix that marks a line as a command
pub const COMMAND_PREFIX: char = '/';

/// Turns shown by `/history` when no count is given
pub const DEFAULT_HISTORY_COUNT: usize = 10;

/// A recognized slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    Save(Option<String>),
    Load(String),
    List,
    Stats,
    History(usize),
    Quit,
}

/// What a line of input means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Blank line, re-prompt
    Empty,
    Chat(String),
    Command(Command),
}

/// Bad user input; reported and the user is prompted again
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: /{0}")]
    UnknownCommand(String),
    #[error("Invalid argument for /{command}: '{value}' ({expected})")]
    InvalidArgument {
        command: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("/{command} needs an argument: {usage}")]
    MissingArgument {
        command: &'static str,
        usage: &'static str,
    },
}

/// Classify one line of input
pub fn parse_input(line: &str) -> Result<Input, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Input::Empty);
    }

    let Some(body) = trimmed.strip_prefix(COMMAND_PREFIX) else {
        return Ok(Input::Chat(trimmed.to_string()));
    };

    let (name, argument) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim()).filter(|a| !a.is_empty())),
        None => (body, None),
    };

    parse_command(&name.to_lowercase(), argument).map(Input::Command)
}

fn parse_command(name: &str, argument: Option<&str>) -> Result<Command, CommandError> {
    let command = match name {
        "help" | "?" => Command::Help,
        "clear" => Command::Clear,
        "save" => Command::Save(argument.map(str::to_string)),
        "load" => match argument {
            Some(name) => Command::Load(name.to_string()),
            None => {
                return Err(CommandError::MissingArgument {
                    command: "load",
                    usage: "/load <name>",
                })
            }
        },
        "list" => Command::List,
        "stats" => Command::Stats,
        "history" => match argument {
            None => Command::History(DEFAULT_HISTORY_COUNT),
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) => Command::History(n),
                Err(_) => {
                    return Err(CommandError::InvalidArgument {
                        command: "history",
                        value: raw.to_string(),
                        expected: "a whole number, e.g. /history 5",
                    })
                }
            },
        },
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(line: &str) -> Command {
        match parse_input(line) {
            Ok(Input::Command(c)) => c,
            other => panic!("expected a command for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_lines_are_empty() {
        assert_eq!(parse_input(""), Ok(Input::Empty));
        assert_eq!(parse_input("   \t "), Ok(Input::Empty));
    }

    #[test]
    fn test_plain_text_is_chat() {
        assert_eq!(parse_input("  Hello there  "), Ok(Input::Chat("Hello there".into())));
        assert_eq!(
            parse_input("what does a/b mean?"),
            Ok(Input::Chat("what does a/b mean?".into()))
        );
    }

    #[test]
    fn test_every_command() {
        assert_eq!(command("/help"), Command::Help);
        assert_eq!(command("/?"), Command::Help);
        assert_eq!(command("/clear"), Command::Clear);
        assert_eq!(command("/save"), Command::Save(None));
        assert_eq!(command("/save myChat"), Command::Save(Some("myChat".into())));
        assert_eq!(command("/load myChat"), Command::Load("myChat".into()));
        assert_eq!(command("/list"), Command::List);
        assert_eq!(command("/stats"), Command::Stats);
        assert_eq!(command("/history"), Command::History(DEFAULT_HISTORY_COUNT));
        assert_eq!(command("/history 2"), Command::History(2));
        assert_eq!(command("/history 0"), Command::History(0));
        assert_eq!(command("/quit"), Command::Quit);
        assert_eq!(command("/exit"), Command::Quit);
        assert_eq!(command("/q"), Command::Quit);
    }

    #[test]
    fn test_commands_are_case_insensitive_and_trimmed() {
        assert_eq!(command("  /SAVE   notes  "), Command::Save(Some("notes".into())));
        assert_eq!(command("/Quit"), Command::Quit);
        assert_eq!(command("/save\tmy notes"), Command::Save(Some("my notes".into())));
    }

    #[test]
    fn test_surplus_argument_is_ignored() {
        assert_eq!(command("/clear everything"), Command::Clear);
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        assert_eq!(
            parse_input("/frobnicate now"),
            Err(CommandError::UnknownCommand("frobnicate".into()))
        );
        assert_eq!(parse_input("/"), Err(CommandError::UnknownCommand(String::new())));
    }

    #[test]
    fn test_history_rejects_non_numeric() {
        let err = parse_input("/history lots").unwrap_err();
        assert!(matches!(
            err,
            CommandError::InvalidArgument { command: "history", ref value, .. } if value == "lots"
        ));
        assert!(parse_input("/history -3").is_err());
    }

    #[test]
    fn test_load_requires_name() {
        assert!(matches!(
            parse_input("/load"),
            Err(CommandError::MissingArgument { command: "load", .. })
        ));
    }
}
