/// Standard sensitivity for club play.
pub const DEFAULT_K: f64 = 32.0;

/// The outcome of applying a match result to two ratings.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct RatingChange {
    pub winner: i64,
    pub loser: i64,
    /// Points moved from the loser to the winner, for display.
    pub transferred: i64,
}

/// Computes new Elo ratings after a match.
///
/// An upset win moves more points than a favorite win. The update is
/// zero-sum and unclamped, so extreme inputs can push a rating negative.
pub fn update_ratings(winner: i64, loser: i64, k: f64) -> RatingChange {
    let expected = 1.0 / (1.0 + 10f64.powf((loser - winner) as f64 / 400.0));
    let transferred = (k * (1.0 - expected)).round() as i64;

    RatingChange {
        winner: winner + transferred,
        loser: loser - transferred,
        transferred,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_match_moves_half_k() {
        let change = update_ratings(1200, 1200, DEFAULT_K);
        assert_eq!(change.transferred, 16);
        assert_eq!(change.winner, 1216);
        assert_eq!(change.loser, 1184);
    }

    #[test]
    fn favorite_win_moves_less_than_half_k() {
        let change = update_ratings(1500, 1200, DEFAULT_K);
        assert!(change.transferred < 16);
    }

    #[test]
    fn upset_win_moves_more_than_half_k() {
        let change = update_ratings(1200, 1500, DEFAULT_K);
        assert!(change.transferred > 16);
    }

    #[test]
    fn update_is_zero_sum() {
        for (w, l) in [(1200, 1200), (1800, 900), (950, 2100), (-40, 300)] {
            let change = update_ratings(w, l, DEFAULT_K);
            assert_eq!(change.winner - w, -(change.loser - l));
        }
    }
}
