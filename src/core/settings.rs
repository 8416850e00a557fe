use serde::{Deserialize, Serialize};

/// Json struct for deployment-specific settings.
///
/// Every external credential is optional: without them the service still
/// serves the web view and websocket, it just cannot classify or reply.
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub whatsapp_token: Option<String>,
    pub whatsapp_phone_id: Option<String>,

    /// Token echoed back during the webhook verification handshake
    pub verify_token: Option<String>,

    /// Contact address that administers the seeded demo club
    pub demo_admin_contact: Option<String>,

    pub web_port: Option<u16>,
}
