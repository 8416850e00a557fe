use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Rating assigned to every freshly created player.
pub const INITIAL_RATING: i64 = 1200;

/// Category used when the classifier does not extract one.
pub const DEFAULT_CATEGORY: &str = "General";

/// A competitor profile within a club.
///
/// Profiles are never deleted; ratings and counters only move when a
/// result is recorded.
#[derive(PartialEq, Eq, Debug, FromRow, Clone, Serialize, Deserialize)]
pub struct Player {
    /// Unique player ID
    pub id: i64,

    /// Player's display name, unique within the club
    pub name: String,

    /// Current Elo rating
    pub rating: i64,

    /// Free-text category label, e.g. "General" or "Juniors"
    pub category: String,

    pub wins: i64,
    pub losses: i64,

    /// The contact that created and controls this profile
    pub contact_id: i64,

    /// Owning club
    pub club_id: i64,
}
