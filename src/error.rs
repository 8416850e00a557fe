use thiserror::Error;

/// Domain failures that turn into user-facing denial messages at the
/// chat boundary rather than escaping the webhook.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClubError {
    #[error("There is no tournament open for enrollment right now.")]
    NoOpenTournament,

    #[error("At least 2 enrolled players are needed to generate brackets.")]
    NotEnoughPlayers,

    #[error("No player named {0} in this club.")]
    UnknownPlayer(String),

    #[error("A match needs two different players.")]
    SamePlayer,

    #[error("Enrollment for tournament {0} kept conflicting, try again.")]
    EnrollmentContention(i64),
}
