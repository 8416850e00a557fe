use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use super::player::Player;

/// Lifecycle of a tournament. There is no way back from `InProgress`
/// to `Enrollment`; a tournament only reaches `Finished` by being
/// superseded by a newer one for the same club.
#[derive(PartialEq, Eq, Debug, Clone, Copy, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    /// Accepting sign-ups
    Enrollment,
    /// Brackets generated, matches live
    InProgress,
    /// Terminal
    Finished,
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TournamentStatus::Enrollment => "enrollment",
            TournamentStatus::InProgress => "in_progress",
            TournamentStatus::Finished => "finished",
        };
        write!(f, "{}", label)
    }
}

/// Typed tournament metadata, stored serialized in a single column and
/// guarded by a version counter against concurrent read-modify-write.
#[derive(PartialEq, Eq, Debug, Default, Clone, Serialize, Deserialize)]
pub struct TournamentMeta {
    /// Player ids signed up while the tournament was in enrollment
    #[serde(default)]
    pub enrolled: Vec<i64>,
}

/// A bracket event scoped to one club.
#[derive(PartialEq, Eq, Debug, FromRow, Clone, Serialize)]
pub struct Tournament {
    /// Unique tournament ID
    pub id: i64,

    pub name: String,

    /// Category filter inherited by its matches, e.g. "General"
    pub category: String,

    pub status: TournamentStatus,

    /// Serialized [`TournamentMeta`]
    pub meta: String,

    /// Optimistic-concurrency token for `meta` updates
    pub meta_version: i64,

    /// Owning club
    pub club_id: i64,
}

impl Tournament {
    pub fn meta(&self) -> TournamentMeta {
        serde_json::from_str(&self.meta).unwrap_or_default()
    }
}

/// Pairs enrolled players seeded by rating: strongest against weakest,
/// second strongest against second weakest, and so on. Ties break on
/// ascending player id so the bracket is deterministic. With an odd
/// field the middle seed sits out; no bye match is recorded.
pub fn pair_seeded(players: &[Player]) -> Vec<(i64, i64)> {
    let mut seeded: Vec<&Player> = players.iter().collect();
    seeded.sort_by(|a, b| b.rating.cmp(&a.rating).then(a.id.cmp(&b.id)));

    let n = seeded.len();
    (0..n / 2)
        .map(|i| (seeded[i].id, seeded[n - 1 - i].id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: i64, rating: i64) -> Player {
        Player {
            id,
            name: format!("player-{}", id),
            rating,
            category: "General".to_string(),
            wins: 0,
            losses: 0,
            contact_id: 1,
            club_id: 1,
        }
    }

    #[test]
    fn pairs_best_against_worst() {
        let players = vec![
            player(1, 1500),
            player(2, 1400),
            player(3, 1300),
            player(4, 1200),
        ];

        assert_eq!(pair_seeded(&players), vec![(1, 4), (2, 3)]);
    }

    #[test]
    fn odd_field_leaves_middle_seed_out() {
        let players = vec![
            player(1, 1500),
            player(2, 1400),
            player(3, 1300),
            player(4, 1200),
            player(5, 1100),
        ];

        // Seed 3 sits out.
        assert_eq!(pair_seeded(&players), vec![(1, 5), (2, 4)]);
    }

    #[test]
    fn equal_ratings_break_on_id() {
        let players = vec![player(9, 1200), player(2, 1200), player(5, 1200)];

        assert_eq!(pair_seeded(&players), vec![(2, 9)]);
    }

    #[test]
    fn too_few_players_produce_no_pairs() {
        assert!(pair_seeded(&[]).is_empty());
        assert!(pair_seeded(&[player(1, 1200)]).is_empty());
    }

    #[test]
    fn meta_survives_malformed_column() {
        let tournament = Tournament {
            id: 1,
            name: "Cup".to_string(),
            category: "General".to_string(),
            status: TournamentStatus::Enrollment,
            meta: "not json".to_string(),
            meta_version: 0,
            club_id: 1,
        };

        assert_eq!(tournament.meta(), TournamentMeta::default());
    }
}
