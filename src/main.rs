use std::{fs::read_to_string, path::PathBuf, sync::Arc};

use clap::Parser;

use crate::core::{db::ClubDb, settings::Settings};
use crate::integrations::{openai::IntentClassifier, whatsapp::MessagingGateway};
use crate::notify::Notifier;

mod actions;
mod core;
mod error;
mod integrations;
mod notify;
mod web;

#[derive(Parser, Debug)]
#[command(name = "courtside")]
#[command(version = "0.1")]
#[command(about = "A chat-driven club management service.", long_about = None)]
struct Args {
    /// Location of the sqlite database file, created if missing.
    #[arg(short, long, default_value = "courtside.db")]
    db_file: PathBuf,

    /// Location of the Json settings file holding API credentials.
    /// Without it, classification and outbound messaging are disabled.
    #[arg(short, long)]
    settings: Option<PathBuf>,
}

/// The service handles owned by the composition root and passed to every
/// request handler.
#[derive(Clone)]
pub struct Services {
    pub db: Arc<ClubDb>,
    pub settings: Arc<Settings>,
    pub notifier: Arc<Notifier>,
    pub classifier: Arc<IntentClassifier>,
    pub gateway: Arc<MessagingGateway>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let settings: Settings = match &args.settings {
        Some(path) => serde_json::from_str(&read_to_string(path)?)?,
        None => {
            log::warn!("No settings file provided, external integrations are disabled");
            Settings::default()
        }
    };

    let db = Arc::new(ClubDb::init(&args.db_file).await?);
    db.seed_demo_club(settings.demo_admin_contact.as_deref())
        .await?;

    let services = Services {
        db,
        notifier: Arc::new(Notifier::new()),
        classifier: Arc::new(IntentClassifier::new(&settings)),
        gateway: Arc::new(MessagingGateway::new(&settings)),
        settings: Arc::new(settings),
    };

    log::info!("Club service initialized");
    web::run_http_server(services).await
}
