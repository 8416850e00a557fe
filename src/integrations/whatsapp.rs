use crate::core::settings::Settings;

/// Best-effort outbound delivery over the WhatsApp Cloud API.
///
/// Failures are logged and swallowed: by the time a reply goes out the
/// club state is already durable, so a lost message is never fatal.
pub struct MessagingGateway {
    client: reqwest::Client,
    token: Option<String>,
    phone_id: Option<String>,
}

impl MessagingGateway {
    pub fn new(settings: &Settings) -> Self {
        if settings.whatsapp_token.is_none() || settings.whatsapp_phone_id.is_none() {
            log::warn!("Messaging gateway not configured, outbound replies are dropped");
        }

        MessagingGateway {
            client: reqwest::Client::new(),
            token: settings.whatsapp_token.clone(),
            phone_id: settings.whatsapp_phone_id.clone(),
        }
    }

    pub async fn send_text(&self, to: &str, body: &str) {
        let (Some(token), Some(phone_id)) = (&self.token, &self.phone_id) else {
            log::debug!("Dropping reply to {} (gateway unconfigured)", to);
            return;
        };

        let url = format!("https://graph.facebook.com/v21.0/{}/messages", phone_id);
        let payload = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body }
        });

        match self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => log::debug!("Delivered reply to {}: {}", to, response.status()),
            Err(e) => log::warn!("Failed to deliver reply to {}: {}", to, e),
        }
    }
}
