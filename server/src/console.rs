//! Operator commands typed on the server console
//!
//! ```text
//! respawn <player>    skip the respawn timer or bring a spectator back
//! spectate <player>   move a dead player to spectating
//! shutdown            stop the server loop
//! ```

use shared::PlayerId;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Respawn(PlayerId),
    Spectate(PlayerId),
    Shutdown,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{0}' needs a player id")]
    MissingPlayer(&'static str),
    #[error("'{0}' is not a player id")]
    BadPlayer(String),
}

fn player_arg(name: &'static str, arg: Option<&str>) -> Result<PlayerId, CommandError> {
    let arg = arg.ok_or(CommandError::MissingPlayer(name))?;
    arg.parse().map_err(|_| CommandError::BadPlayer(arg.to_string()))
}

impl FromStr for OperatorCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(CommandError::Empty)?;
        match name.to_ascii_lowercase().as_str() {
            "respawn" => Ok(Self::Respawn(player_arg("respawn", words.next())?)),
            "spectate" => Ok(Self::Spectate(player_arg("spectate", words.next())?)),
            "shutdown" | "quit" => Ok(Self::Shutdown),
            _ => Err(CommandError::Unknown(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("respawn 4".parse(), Ok(OperatorCommand::Respawn(4)));
        assert_eq!("  SPECTATE   12 ".parse(), Ok(OperatorCommand::Spectate(12)));
        assert_eq!("quit".parse(), Ok(OperatorCommand::Shutdown));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<OperatorCommand>(), Err(CommandError::Empty));
        assert_eq!(
            "respawn".parse::<OperatorCommand>(),
            Err(CommandError::MissingPlayer("respawn"))
        );
        assert_eq!(
            "spectate bob".parse::<OperatorCommand>(),
            Err(CommandError::BadPlayer("bob".to_string()))
        );
        assert!(matches!(
            "kick 3".parse::<OperatorCommand>(),
            Err(CommandError::Unknown(_))
        ));
    }
}
