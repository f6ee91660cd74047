use serde_derive::{Deserialize, Serialize};

use synod::PeerId;

#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    East,
    North,
    West,
    South,
}

impl std::str::FromStr for Direction {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
        | "east" | "e" => Ok(Direction::East),
        | "north" | "n" => Ok(Direction::North),
        | "west" | "w" => Ok(Direction::West),
        | "south" | "s" => Ok(Direction::South),
        | _ => Err(()),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Game event agreed upon by every player.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Start(PeerId),
    Move(PeerId, Position, Direction),
    Kill(PeerId),
}

/// A line typed by the local player.
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    /// Turn at the given position
    Move {
        position: Position,
        direction: Direction,
    },

    /// Crash into something
    Kill,

    /// Leave the game
    Quit,

    Help,
}

impl Input {
    /// The command this input submits on behalf of `player`, if any.
    pub fn command(&self, player: PeerId) -> Option<Command> {
        match self {
        | Input::Move { position, direction } => Some(Command::Move(player, *position, *direction)),
        | Input::Kill => Some(Command::Kill(player)),
        | Input::Quit | Input::Help => None,
        }
    }
}

pub fn usage() -> &'static str {
    concat!(
        "--------------------------------------------------------------\n",
        "Possible commands:\n",
        "move <X> <Y> <DIR> | m <X> <Y> <DIR>  -- Turn towards <DIR> at (<X>, <Y>)\n",
        "kill               | k                -- Crash\n",
        "quit               | q                -- Leave the game\n",
        "--------------------------------------------------------------",
    )
}

impl std::str::FromStr for Input {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut iter = s.split_whitespace();
        match iter.next() {
        | Some("help") | Some("h") => Ok(Input::Help),
        | Some("kill") | Some("k") => Ok(Input::Kill),
        | Some("quit") | Some("q") => Ok(Input::Quit),
        | Some("move") | Some("m") => {
            let x = iter.next().ok_or(())?.parse().map_err(|_| ())?;
            let y = iter.next().ok_or(())?.parse().map_err(|_| ())?;
            let direction = iter.next().ok_or(())?.parse()?;
            if iter.next().is_some() {
                return Err(())
            }
            Ok(Input::Move { position: Position { x, y }, direction })
        }
        | _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move() {
        let input = "move 50 50 east".parse::<Input>().unwrap();
        assert_eq!(input, Input::Move { position: Position { x: 50.0, y: 50.0 }, direction: Direction::East });
        assert_eq!(
            input.command(2),
            Some(Command::Move(2, Position { x: 50.0, y: 50.0 }, Direction::East)),
        );
    }

    #[test]
    fn test_parse_short_forms() {
        assert_eq!("k".parse::<Input>(), Ok(Input::Kill));
        assert_eq!("q".parse::<Input>(), Ok(Input::Quit));
        assert!(matches!("m 1.5 2 s".parse::<Input>(), Ok(Input::Move { direction: Direction::South, .. })));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Input>().is_err());
        assert!("move 1 2".parse::<Input>().is_err());
        assert!("move 1 2 up".parse::<Input>().is_err());
        assert!("move x 2 east".parse::<Input>().is_err());
        assert!("move 1 2 east now".parse::<Input>().is_err());
    }

    #[test]
    fn test_quit_submits_nothing() {
        assert_eq!(Input::Quit.command(0), None);
        assert_eq!(Input::Kill.command(3), Some(Command::Kill(3)));
    }
}
