//! Interactive shell command grammar.
//!
//! Each command performs one one-shot frame-state mutation (or a short
//! fixed sequence) and returns; `monitor` is the one exclusive mode.
//! Parse errors fail the single command and never the shell.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    Rgb { board: u8, r: u8, g: u8, b: u8 },
    Led { board: u8, index: u8, on: bool },
    Off { board: Option<u8> },
    Monitor,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid number `{0}`")]
    BadNumber(String),
    #[error("invalid switch `{0}` (expected 0, 1, on or off)")]
    BadSwitch(String),
    #[error("led index {0} out of range (0-3)")]
    BadLedIndex(u8),
}

pub const HELP_TEXT: &str = "\
commands:
  rgb <board> <r> <g> <b>    set a board's RGB output (0-255 each)
  led <board> <index> <0|1>  set one of a board's four LEDs
  off [board]                zero every output signal (all boards if omitted)
  monitor                    drain and print bus traffic until interrupted
  status                     print master statistics
  help                       this text
  quit                       leave the shell";

fn number(token: &str) -> Result<u8, CommandError> {
    token
        .parse()
        .map_err(|_| CommandError::BadNumber(token.to_string()))
}

fn switch(token: &str) -> Result<bool, CommandError> {
    match token {
        "1" | "on" => Ok(true),
        "0" | "off" => Ok(false),
        other => Err(CommandError::BadSwitch(other.to_string())),
    }
}

impl ShellCommand {
    /// Parse one input line. Blank lines parse to `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&word, args)) = tokens.split_first() else {
            return Ok(None);
        };
        let command = match word {
            "rgb" => match args {
                [board, r, g, b] => ShellCommand::Rgb {
                    board: number(board)?,
                    r: number(r)?,
                    g: number(g)?,
                    b: number(b)?,
                },
                _ => return Err(CommandError::Usage("rgb <board> <r> <g> <b>")),
            },
            "led" => match args {
                [board, index, state] => {
                    let index = number(index)?;
                    if index > 3 {
                        return Err(CommandError::BadLedIndex(index));
                    }
                    ShellCommand::Led {
                        board: number(board)?,
                        index,
                        on: switch(state)?,
                    }
                }
                _ => return Err(CommandError::Usage("led <board> <index> <0|1>")),
            },
            "off" => match args {
                [] => ShellCommand::Off { board: None },
                [board] => ShellCommand::Off {
                    board: Some(number(board)?),
                },
                _ => return Err(CommandError::Usage("off [board]")),
            },
            "monitor" => ShellCommand::Monitor,
            "status" => ShellCommand::Status,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" => ShellCommand::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rgb() {
        assert_eq!(
            ShellCommand::parse("rgb 0 255 128 0"),
            Ok(Some(ShellCommand::Rgb {
                board: 0,
                r: 255,
                g: 128,
                b: 0
            }))
        );
    }

    #[test]
    fn test_parse_led_switch_forms() {
        assert_eq!(
            ShellCommand::parse("led 1 3 1"),
            Ok(Some(ShellCommand::Led {
                board: 1,
                index: 3,
                on: true
            }))
        );
        assert_eq!(
            ShellCommand::parse("led 1 0 off"),
            Ok(Some(ShellCommand::Led {
                board: 1,
                index: 0,
                on: false
            }))
        );
    }

    #[test]
    fn test_parse_off_with_and_without_board() {
        assert_eq!(
            ShellCommand::parse("off"),
            Ok(Some(ShellCommand::Off { board: None }))
        );
        assert_eq!(
            ShellCommand::parse("off 2"),
            Ok(Some(ShellCommand::Off { board: Some(2) }))
        );
    }

    #[test]
    fn test_parse_blank_line() {
        assert_eq!(ShellCommand::parse("   "), Ok(None));
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            ShellCommand::parse("launch"),
            Err(CommandError::Unknown("launch".to_string()))
        );
    }

    #[test]
    fn test_parse_usage_errors() {
        assert_eq!(
            ShellCommand::parse("rgb 0 1 2"),
            Err(CommandError::Usage("rgb <board> <r> <g> <b>"))
        );
        assert_eq!(
            ShellCommand::parse("led 0"),
            Err(CommandError::Usage("led <board> <index> <0|1>"))
        );
    }

    #[test]
    fn test_parse_value_errors() {
        assert_eq!(
            ShellCommand::parse("rgb 0 300 0 0"),
            Err(CommandError::BadNumber("300".to_string()))
        );
        assert_eq!(
            ShellCommand::parse("led 0 4 1"),
            Err(CommandError::BadLedIndex(4))
        );
        assert_eq!(
            ShellCommand::parse("led 0 2 maybe"),
            Err(CommandError::BadSwitch("maybe".to_string()))
        );
    }
}
