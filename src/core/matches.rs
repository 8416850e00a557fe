use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Score string given to bracket matches that have not been played yet.
pub const UNPLAYED_SCORE: &str = "vs";

/// A single match result, either reported directly for the ranking or
/// created unplayed by bracket generation.
#[derive(PartialEq, Eq, Debug, FromRow, Clone, Serialize, Deserialize)]
pub struct Match {
    /// Unique match ID
    pub id: i64,

    pub player_one: i64,
    pub player_two: i64,

    /// Winning player, absent while the match is unplayed
    pub winner: Option<i64>,

    /// Human-readable score, e.g. "3-1"
    pub score: String,

    /// Unix timestamp of when the match was recorded
    pub played_at: i64,

    pub finished: bool,

    /// Owning tournament for bracket matches, absent for plain
    /// ranking results
    pub tournament_id: Option<i64>,
}
