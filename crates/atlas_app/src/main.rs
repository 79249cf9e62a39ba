use serde_json::Value;
use tracing::{debug, error, info};

use atlas_infrastructure::database_connection::AtlasClient;
use atlas_interface::log_targets::API;
use atlas_interface::store::service::DocumentStore;

mod settings;

use settings::Settings;

#[tokio::main]
async fn main() {
    let settings = Settings::new().expect("Could not parse settings");

    settings
        .logging_config()
        .build()
        .and_then(|logging| logging.install())
        .expect("Could not configure logging");

    debug!(target: API, "settings loaded for the '{}' environment", settings.environment);

    let client = AtlasClient::connect(&settings.database.connection_target())
        .await
        .expect("Could not initialize the database");

    if settings.database.ping_on_startup {
        if let Err(e) = client.ping().await {
            error!(target: API, "{}", e);
            std::process::exit(1);
        }
        info!(target: API, "database '{}' answered the ping", client.database_name());
    }

    let collection = client.get_collection(&settings.database.collection);

    match collection.find_one(Value::Null).await {
        Ok(document) => {
            let line = first_document_line(collection.name(), document);
            info!(target: API, "{}", line);
        }
        Err(e) => error!(target: API, "{}", e),
    }
}

fn first_document_line(collection: &str, document: Option<Value>) -> String {
    match document {
        Some(document) => format!("first document in '{}': {}", collection, document),
        None => format!("collection '{}' has no documents", collection),
    }
}
