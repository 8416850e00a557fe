use std::{collections::HashMap, convert::Infallible};

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    actions::dispatch,
    core::{
        club::Club,
        db::{ClubDb, DEMO_CLUB_ID},
        matches::Match,
        player::Player,
        tournament::TournamentStatus,
    },
    integrations::openai::build_club_context,
    Services,
};

/// Token used for the verification handshake when none is configured.
const DEFAULT_VERIFY_TOKEN: &str = "club-verify";

/// The WhatsApp Cloud API webhook envelope, reduced to the fields the
/// service reads. Everything defaults so a partial or unrelated payload
/// parses to an empty envelope instead of failing the webhook.
#[derive(Deserialize, Default, Debug)]
pub struct WebhookEnvelope {
    #[serde(default)]
    entry: Vec<WebhookEntry>,
}

#[derive(Deserialize, Default, Debug)]
struct WebhookEntry {
    #[serde(default)]
    changes: Vec<WebhookChange>,
}

#[derive(Deserialize, Default, Debug)]
struct WebhookChange {
    #[serde(default)]
    value: WebhookValue,
}

#[derive(Deserialize, Default, Debug)]
struct WebhookValue {
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

#[derive(Deserialize, Default, Debug)]
struct InboundMessage {
    #[serde(default)]
    from: String,
    text: Option<InboundText>,
}

#[derive(Deserialize, Default, Debug)]
struct InboundText {
    body: String,
}

impl WebhookEnvelope {
    /// The first text message in the envelope, as (sender, body).
    fn first_text_message(&self) -> Option<(String, String)> {
        self.entry
            .iter()
            .flat_map(|e| &e.changes)
            .flat_map(|c| &c.value.messages)
            .find_map(|m| {
                m.text
                    .as_ref()
                    .map(|text| (m.from.clone(), text.body.clone()))
            })
    }
}

/// Meta's subscription handshake: echo the challenge when the verify
/// token matches.
pub async fn verify_webhook(
    args: HashMap<String, String>,
    services: Services,
) -> Result<impl warp::Reply, Infallible> {
    let expected = services
        .settings
        .verify_token
        .clone()
        .unwrap_or_else(|| DEFAULT_VERIFY_TOKEN.to_string());

    match (args.get("hub.verify_token"), args.get("hub.challenge")) {
        (Some(token), Some(challenge)) if *token == expected => Ok(warp::reply::with_status(
            challenge.clone(),
            warp::http::StatusCode::OK,
        )),
        _ => {
            log::warn!("Webhook verification failed");
            Ok(warp::reply::with_status(
                "Verification failed".to_string(),
                warp::http::StatusCode::FORBIDDEN,
            ))
        }
    }
}

/// Inbound message webhook. Always acknowledges: any failure past this
/// point is logged, never surfaced to the messaging network.
pub async fn receive_webhook(
    body: Value,
    services: Services,
) -> Result<impl warp::Reply, Infallible> {
    let envelope: WebhookEnvelope = serde_json::from_value(body).unwrap_or_default();

    if let Some((sender, text)) = envelope.first_text_message() {
        log::info!("Message from {}: {}", sender, text);
        if let Err(e) = process_message(&services, &sender, &text).await {
            log::error!("Failed to process message from {}: {:#}", sender, e);
        }
    }

    Ok(warp::reply::json(&serde_json::json!({ "status": "ok" })))
}

async fn process_message(services: &Services, sender: &str, text: &str) -> anyhow::Result<()> {
    let club = resolve_club(&services.db, sender).await?;
    let context = build_club_context(&services.db, &club).await?;

    let decision = services
        .classifier
        .classify(text, &context, sender, &club.admin_contact)
        .await;
    if let Some(reasoning) = &decision.reasoning {
        log::debug!("Classifier reasoning: {}", reasoning);
    }

    let reply = dispatch(&services.db, &services.notifier, &club, sender, decision).await?;
    services.gateway.send_text(sender, &reply).await;
    Ok(())
}

/// Maps a sender to their club: club admin first, then the club of a
/// profile they own, then the demo club.
async fn resolve_club(db: &ClubDb, sender: &str) -> anyhow::Result<Club> {
    if let Some(club) = db.find_club_by_admin(sender).await? {
        return Ok(club);
    }
    if let Some(club) = db.find_club_for_contact(sender).await? {
        return Ok(club);
    }
    db.get_club(DEMO_CLUB_ID).await
}

/// What the live view renders; viewers re-fetch this whole payload on
/// every update token.
#[derive(Serialize, Debug)]
struct ClubStateView {
    club: String,
    mode: &'static str,
    title: String,
    players: Vec<Player>,
    matches: Vec<Match>,
}

async fn assemble_club_state(db: &ClubDb, club_id: i64) -> anyhow::Result<ClubStateView> {
    let club = db.get_club(club_id).await?;

    if let Some(tournament) = db.active_tournament(club_id).await? {
        match tournament.status {
            TournamentStatus::Enrollment => {
                return Ok(ClubStateView {
                    club: club.name,
                    mode: "tournament_enrollment",
                    title: format!("Enrollment: {} ({})", tournament.name, tournament.category),
                    players: db.players_by_ids(club_id, &tournament.meta().enrolled).await?,
                    matches: vec![],
                });
            }
            TournamentStatus::InProgress => {
                return Ok(ClubStateView {
                    club: club.name,
                    mode: "tournament_brackets",
                    title: format!("Live: {}", tournament.name),
                    players: vec![],
                    matches: db.matches_for_tournament(tournament.id).await?,
                });
            }
            TournamentStatus::Finished => {}
        }
    }

    Ok(ClubStateView {
        club: club.name.clone(),
        mode: "ranking",
        title: format!("Ranking - {}", club.name),
        players: db.list_players(club_id).await?,
        matches: vec![],
    })
}

pub async fn club_state(club_id: i64, services: Services) -> Result<impl warp::Reply, Infallible> {
    match assemble_club_state(&services.db, club_id).await {
        Ok(state) => Ok(warp::reply::with_status(
            serde_json::to_string(&state).unwrap_or_default(),
            warp::http::StatusCode::OK,
        )),
        Err(e) => {
            log::warn!("{}", e);
            Ok(warp::reply::with_status(
                format!("Unknown club {}", club_id),
                warp::http::StatusCode::BAD_REQUEST,
            ))
        }
    }
}

/// Runs one viewer's websocket: forward every published token for the
/// club until the socket closes, then drop the registration.
pub async fn run_club_websocket(socket: warp::ws::WebSocket, club_id: i64, services: Services) {
    log::debug!("New viewer websocket for club {}", club_id);
    let mut subscription = services.notifier.subscribe(club_id);
    let (mut tx, mut rx) = socket.split();

    loop {
        tokio::select! {
            update = subscription.rx.recv() => {
                match update {
                    Some(message) => {
                        if let Err(e) = tx.send(warp::ws::Message::text(message)).await {
                            log::debug!("Failed to send update to club {} viewer: {}", club_id, e);
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = rx.next() => {
                // Viewers only listen; any inbound frame is ignored and a
                // closed or failed socket ends the session.
                match incoming {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }

    services.notifier.unsubscribe(club_id, subscription.id);
    log::debug!("Viewer left club {} channel", club_id);
}
