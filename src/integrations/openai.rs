use anyhow::anyhow;
use serde::Deserialize;

use crate::{
    actions::Decision,
    core::{club::Club, db::ClubDb, settings::Settings},
};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo-1106";

/// Relevant slice of the chat-completions response payload.
#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Classifies free-text club messages into structured [`Decision`]s via
/// the OpenAI chat-completions API.
pub struct IntentClassifier {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl IntentClassifier {
    pub fn new(settings: &Settings) -> Self {
        if settings.openai_api_key.is_none() {
            log::warn!("No OpenAI API key configured, all messages fall back to chat");
        }

        IntentClassifier {
            client: reqwest::Client::new(),
            api_key: settings.openai_api_key.clone(),
            model: settings
                .openai_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    /// Classifies one inbound message. Infallible by contract: any
    /// transport or parse failure is logged and replaced by the fallback
    /// chat decision, so the webhook can always acknowledge.
    pub async fn classify(&self, text: &str, context: &str, sender: &str, admin: &str) -> Decision {
        match self.request(text, context, sender, admin).await {
            Ok(decision) => decision,
            Err(e) => {
                log::error!("Intent classification failed: {:#}", e);
                Decision::fallback()
            }
        }
    }

    async fn request(
        &self,
        text: &str,
        context: &str,
        sender: &str,
        admin: &str,
    ) -> anyhow::Result<Decision> {
        let Some(api_key) = &self.api_key else {
            return Err(anyhow!("no API key configured"));
        };

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt(context, sender, admin) },
                { "role": "user", "content": text }
            ],
            "response_format": { "type": "json_object" }
        });

        let completion: ChatCompletion = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = &completion
            .choices
            .first()
            .ok_or_else(|| anyhow!("completion returned no choices"))?
            .message
            .content;

        // Models occasionally drop the action_data key for actions that
        // take no parameters; treat that as an empty map.
        let mut decision: serde_json::Value = serde_json::from_str(content)?;
        if let Some(map) = decision.as_object_mut() {
            map.entry("action_data")
                .or_insert_with(|| serde_json::json!({}));
        }

        Ok(serde_json::from_value(decision)?)
    }
}

/// Summarizes the club for the classifier: the live tournament, if any,
/// and the top of the ranking.
pub async fn build_club_context(db: &ClubDb, club: &Club) -> anyhow::Result<String> {
    let tournament_line = match db.active_tournament(club.id).await? {
        Some(t) => format!(
            "Active tournament '{}' ({}), status {}, {} enrolled.",
            t.name,
            t.category,
            t.status,
            t.meta().enrolled.len()
        ),
        None => "No active tournament.".to_string(),
    };

    let ranking = db
        .top_players(club.id, 3)
        .await?
        .iter()
        .map(|p| format!("{} ({})", p.name, p.rating))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "Club {} '{}':\n- {}\n- Top ranking: {}",
        club.id, club.name, tournament_line, ranking
    ))
}

fn system_prompt(context: &str, sender: &str, admin: &str) -> String {
    format!(
        r#"### ROLE
You are the operations director of a racquet club, managing it over chat
in a friendly, efficient tone.

### ADMINISTRATOR
The club administrator's contact address is: {admin}.
The current message comes from: {sender}.

### CURRENT CLUB SITUATION
{context}

### RULES
1. Hierarchy: only the administrator may create tournaments or generate
   brackets. Players may sign up, play and report results.
2. One contact address may manage several player profiles (a parent
   signing up their kids). If it is ambiguous who played, ask.
3. If the message is just a proper name, do not greet back: assume a
   profile creation or a tournament sign-up depending on context.
4. When a result is reported, extract winner, loser and score.

### OUTPUT FORMAT
Reply with a single JSON object:
{{
    "reasoning": "what is going on and what you will do",
    "reply": "the message to send back to the user",
    "action": "ACTION",
    "action_data": {{ ... }}
}}

### ACTIONS
- "chat": just answer, no action. action_data: {{}}
- "create_player": action_data {{ "name": "...", "category": "..."? }}
- "create_tournament": action_data {{ "name": "...", "category": "..."? }} (admin only)
- "enroll_in_tournament": action_data {{ "player_name": "..." }}
- "generate_brackets": action_data {{}} (admin only, closes enrollment)
- "record_match": action_data {{ "winner": "...", "loser": "...", "score": "..." }}
"#
    )
}
