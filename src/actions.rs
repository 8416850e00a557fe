use serde::Deserialize;

use crate::{
    core::{
        club::Club,
        db::{ClubDb, EnrollOutcome},
        rating::{update_ratings, DEFAULT_K},
        tournament::pair_seeded,
    },
    error::ClubError,
    notify::{Notifier, UPDATE_TOKEN},
};

/// Reply used whenever classification fails; the webhook always answers
/// something.
pub const FALLBACK_REPLY: &str = "I'm handling a lot right now, please try again in a moment.";

/// The closed set of actions the classifier may request. Deserializing
/// into an enum makes the dispatch exhaustive: an unknown or misspelled
/// action string is a parse error, not a silent no-op.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize)]
#[serde(tag = "action", content = "action_data", rename_all = "snake_case")]
pub enum Action {
    Chat {},
    CreatePlayer {
        name: String,
        #[serde(default)]
        category: Option<String>,
    },
    CreateTournament {
        name: String,
        #[serde(default)]
        category: Option<String>,
    },
    EnrollInTournament {
        player_name: String,
    },
    GenerateBrackets {},
    RecordMatch {
        winner: String,
        loser: String,
        #[serde(default)]
        score: Option<String>,
    },
}

/// A structured decision from the intent classifier.
#[derive(Debug, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub reasoning: Option<String>,

    /// The classifier's suggested user-facing reply
    #[serde(default)]
    pub reply: Option<String>,

    #[serde(flatten)]
    pub action: Action,
}

impl Decision {
    /// Substituted whenever the classifier errors out or returns
    /// something unparseable: plain chat, no mutation.
    pub fn fallback() -> Self {
        Decision {
            reasoning: None,
            reply: Some(FALLBACK_REPLY.to_string()),
            action: Action::Chat {},
        }
    }
}

/// Executes a classified action against the club's state and returns the
/// text to send back to the sender. Precondition violations come back as
/// denial replies, never as errors; only storage failures propagate.
pub async fn dispatch(
    db: &ClubDb,
    notifier: &Notifier,
    club: &Club,
    sender: &str,
    decision: Decision,
) -> anyhow::Result<String> {
    let default_reply = decision.reply.unwrap_or_else(|| "Done.".to_string());

    match decision.action {
        Action::Chat {} => Ok(default_reply),

        Action::CreatePlayer { name, category } => {
            if db.find_player(club.id, &name).await?.is_some() {
                return Ok(default_reply);
            }

            let contact = db.find_or_create_contact(sender).await?;
            db.add_player(club.id, &name, category.as_deref(), contact.id)
                .await?;
            notifier.publish(club.id, UPDATE_TOKEN);
            Ok(default_reply)
        }

        Action::CreateTournament { name, category } => {
            db.create_tournament(club.id, &name, category.as_deref())
                .await?;
            notifier.publish(club.id, UPDATE_TOKEN);
            Ok(default_reply)
        }

        Action::EnrollInTournament { player_name } => {
            let Some(player) = db.find_player(club.id, &player_name).await? else {
                return Ok(ClubError::UnknownPlayer(player_name).to_string());
            };
            let Some(tournament) = db.open_tournament(club.id).await? else {
                return Ok(ClubError::NoOpenTournament.to_string());
            };

            match db.enroll_player(tournament.id, player.id).await? {
                EnrollOutcome::Enrolled => {
                    notifier.publish(club.id, UPDATE_TOKEN);
                    Ok(format!("{} is signed up for {}.", player.name, tournament.name))
                }
                EnrollOutcome::AlreadyEnrolled => {
                    Ok(format!("{} was already signed up.", player.name))
                }
            }
        }

        Action::GenerateBrackets {} => {
            let Some(tournament) = db.open_tournament(club.id).await? else {
                return Ok(ClubError::NoOpenTournament.to_string());
            };

            let enrolled = tournament.meta().enrolled;
            if enrolled.len() < 2 {
                return Ok(ClubError::NotEnoughPlayers.to_string());
            }

            let players = db.players_by_ids(club.id, &enrolled).await?;
            let pairs = pair_seeded(&players);
            db.record_bracket(tournament.id, &pairs).await?;

            notifier.publish(club.id, UPDATE_TOKEN);
            Ok(format!(
                "Brackets are out, {} is under way.",
                tournament.name
            ))
        }

        Action::RecordMatch {
            winner,
            loser,
            score,
        } => {
            if winner == loser {
                return Ok(ClubError::SamePlayer.to_string());
            }
            let Some(winner) = db.find_player(club.id, &winner).await? else {
                return Ok(ClubError::UnknownPlayer(winner).to_string());
            };
            let Some(loser) = db.find_player(club.id, &loser).await? else {
                return Ok(ClubError::UnknownPlayer(loser).to_string());
            };

            let score = score.unwrap_or_else(|| "unreported".to_string());
            let change = update_ratings(winner.rating, loser.rating, DEFAULT_K);
            db.record_result(&winner, &loser, &score, &change).await?;

            notifier.publish(club.id, UPDATE_TOKEN);
            Ok(format!(
                "{} takes it {} over {}: +{} / -{} points.",
                winner.name, score, loser.name, change.transferred, change.transferred
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        db::DEMO_CLUB_ID,
        tournament::TournamentStatus,
    };

    async fn test_setup() -> (ClubDb, Notifier, Club) {
        let db = ClubDb::open_in_memory().await.unwrap();
        db.seed_demo_club(Some("555-admin")).await.unwrap();
        let club = db.get_club(DEMO_CLUB_ID).await.unwrap();
        (db, Notifier::new(), club)
    }

    fn create(name: &str) -> Decision {
        Decision {
            reasoning: None,
            reply: Some(format!("Welcome, {}!", name)),
            action: Action::CreatePlayer {
                name: name.to_string(),
                category: None,
            },
        }
    }

    fn act(action: Action) -> Decision {
        Decision {
            reasoning: None,
            reply: None,
            action,
        }
    }

    #[test]
    fn decisions_deserialize_from_classifier_json() {
        let decision: Decision = serde_json::from_str(
            r#"{
                "reasoning": "a bare name means a sign-up",
                "reply": "Welcome, Ana!",
                "action": "create_player",
                "action_data": { "name": "Ana" }
            }"#,
        )
        .unwrap();
        assert_eq!(
            decision.action,
            Action::CreatePlayer {
                name: "Ana".to_string(),
                category: None
            }
        );

        let decision: Decision = serde_json::from_str(
            r#"{ "reply": "On it.", "action": "generate_brackets", "action_data": {} }"#,
        )
        .unwrap();
        assert_eq!(decision.action, Action::GenerateBrackets {});

        // An action outside the closed set must fail to parse.
        assert!(serde_json::from_str::<Decision>(
            r#"{ "action": "drop_all_tables", "action_data": {} }"#
        )
        .is_err());
    }

    #[tokio::test]
    async fn create_player_is_idempotent_per_club() {
        let (db, notifier, club) = test_setup().await;

        let reply = dispatch(&db, &notifier, &club, "555-0001", create("Ana"))
            .await
            .unwrap();
        assert_eq!(reply, "Welcome, Ana!");

        dispatch(&db, &notifier, &club, "555-0001", create("Ana"))
            .await
            .unwrap();

        let players = db.list_players(club.id).await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].rating, 1200);
        assert_eq!(players[0].category, "General");
    }

    #[tokio::test]
    async fn enroll_denials_leave_state_alone() {
        let (db, notifier, club) = test_setup().await;
        dispatch(&db, &notifier, &club, "555-0001", create("Ana"))
            .await
            .unwrap();

        // No tournament open yet.
        let reply = dispatch(
            &db,
            &notifier,
            &club,
            "555-0001",
            act(Action::EnrollInTournament {
                player_name: "Ana".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(reply, ClubError::NoOpenTournament.to_string());

        dispatch(
            &db,
            &notifier,
            &club,
            "555-admin",
            act(Action::CreateTournament {
                name: "Cup".to_string(),
                category: None,
            }),
        )
        .await
        .unwrap();

        // Unknown player.
        let reply = dispatch(
            &db,
            &notifier,
            &club,
            "555-0001",
            act(Action::EnrollInTournament {
                player_name: "Zoe".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(reply, ClubError::UnknownPlayer("Zoe".to_string()).to_string());

        let tournament = db.open_tournament(club.id).await.unwrap().unwrap();
        assert!(tournament.meta().enrolled.is_empty());
    }

    #[tokio::test]
    async fn brackets_require_two_enrolled() {
        let (db, notifier, club) = test_setup().await;
        dispatch(&db, &notifier, &club, "555-0001", create("Ana"))
            .await
            .unwrap();
        dispatch(
            &db,
            &notifier,
            &club,
            "555-admin",
            act(Action::CreateTournament {
                name: "Cup".to_string(),
                category: None,
            }),
        )
        .await
        .unwrap();

        // Zero enrolled.
        let reply = dispatch(&db, &notifier, &club, "555-admin", act(Action::GenerateBrackets {}))
            .await
            .unwrap();
        assert_eq!(reply, ClubError::NotEnoughPlayers.to_string());

        // One enrolled.
        dispatch(
            &db,
            &notifier,
            &club,
            "555-0001",
            act(Action::EnrollInTournament {
                player_name: "Ana".to_string(),
            }),
        )
        .await
        .unwrap();
        let reply = dispatch(&db, &notifier, &club, "555-admin", act(Action::GenerateBrackets {}))
            .await
            .unwrap();
        assert_eq!(reply, ClubError::NotEnoughPlayers.to_string());

        let tournament = db.open_tournament(club.id).await.unwrap().unwrap();
        assert_eq!(tournament.status, TournamentStatus::Enrollment);
        assert!(db
            .matches_for_tournament(tournament.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn record_match_applies_rating_and_counters() {
        let (db, notifier, club) = test_setup().await;
        dispatch(&db, &notifier, &club, "555-0001", create("Ana"))
            .await
            .unwrap();
        dispatch(&db, &notifier, &club, "555-0002", create("Beto"))
            .await
            .unwrap();

        let reply = dispatch(
            &db,
            &notifier,
            &club,
            "555-0001",
            act(Action::RecordMatch {
                winner: "Ana".to_string(),
                loser: "Beto".to_string(),
                score: Some("3-1".to_string()),
            }),
        )
        .await
        .unwrap();
        assert!(reply.contains("+16"));

        let ana = db.find_player(club.id, "Ana").await.unwrap().unwrap();
        let beto = db.find_player(club.id, "Beto").await.unwrap().unwrap();
        assert_eq!((ana.rating, ana.wins), (1216, 1));
        assert_eq!((beto.rating, beto.losses), (1184, 1));
    }

    #[tokio::test]
    async fn full_tournament_flow() {
        let (db, notifier, club) = test_setup().await;
        let mut viewer = notifier.subscribe(club.id);

        dispatch(&db, &notifier, &club, "555-0001", create("Ana"))
            .await
            .unwrap();
        dispatch(&db, &notifier, &club, "555-0002", create("Beto"))
            .await
            .unwrap();
        dispatch(
            &db,
            &notifier,
            &club,
            "555-admin",
            act(Action::CreateTournament {
                name: "Copa".to_string(),
                category: None,
            }),
        )
        .await
        .unwrap();
        for name in ["Ana", "Beto"] {
            dispatch(
                &db,
                &notifier,
                &club,
                "555-0001",
                act(Action::EnrollInTournament {
                    player_name: name.to_string(),
                }),
            )
            .await
            .unwrap();
        }

        let reply = dispatch(&db, &notifier, &club, "555-admin", act(Action::GenerateBrackets {}))
            .await
            .unwrap();
        assert!(reply.contains("Copa"));

        let tournament = db.active_tournament(club.id).await.unwrap().unwrap();
        assert_eq!(tournament.status, TournamentStatus::InProgress);

        let matches = db.matches_for_tournament(tournament.id).await.unwrap();
        let ana = db.find_player(club.id, "Ana").await.unwrap().unwrap();
        let beto = db.find_player(club.id, "Beto").await.unwrap().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].player_one, ana.id);
        assert_eq!(matches[0].player_two, beto.id);

        // Every mutation pushed a live update.
        let mut updates = 0;
        while viewer.rx.try_recv().is_ok() {
            updates += 1;
        }
        assert_eq!(updates, 6);
    }
}
