use thiserror::Error;

/// Squad request failures reported to the user before any card is rendered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SquadError {
    #[error(
        "Not enough players in the club to form a team. At least {required} players are required."
    )]
    NotEnoughPlayers { required: usize },
    #[error("No players found for the club: {0}")]
    NoPlayersForClub(String),
    #[error("Unknown formation {0:?}")]
    UnknownFormation(String),
}
