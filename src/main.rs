mod auth;
mod config;
mod error;
mod firestore;
mod message;
mod notification;
mod relay;
mod routes;
mod user;

#[cfg(test)]
mod test_support;

use auth::ServiceAccountTokenProvider;
use config::Config;
use firestore::FirestoreClient;
use message::{ChangeWatcher, FirestoreChangeSource};
use notification::FcmSender;
use relay::{MessageRelay, ServerEpoch};
use routes::create_router;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user::FirestoreUserDirectory;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chat_push_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Bad credentials are fatal: nothing runs without them
    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!("Error initializing Firebase credentials: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        project_id = %config.credentials.project_id,
        client_email = %config.credentials.client_email,
        "Firebase credentials loaded"
    );

    let http = reqwest::Client::new();
    let tokens = Arc::new(ServiceAccountTokenProvider::new(
        config.credentials.clone(),
        http.clone(),
    )?);

    let firestore = FirestoreClient::new(
        http.clone(),
        tokens.clone(),
        &config.firestore_base_url,
        &config.credentials.project_id,
    )?;
    let directory = Arc::new(FirestoreUserDirectory::new(
        firestore.clone(),
        config.users_collection.clone(),
    ));
    let sender = Arc::new(FcmSender::new(
        http,
        tokens,
        &config.fcm_base_url,
        &config.credentials.project_id,
    ));

    // Everything older than this instant is backlog
    let epoch = ServerEpoch::now();
    tracing::info!("Server epoch: {} ms", epoch.as_millis());

    let source = FirestoreChangeSource::new(firestore, config.messages_collection.clone());
    let changes = ChangeWatcher::new(
        source,
        config.poll_interval,
        config.max_resubscribe_backoff,
    )
    .subscribe();

    let relay = MessageRelay::new(directory, sender, epoch);
    tokio::spawn(relay.run(changes));

    tracing::info!(
        "Firestore listener set up on {}. Waiting for changes...",
        config.messages_collection
    );

    // Start server
    let app = create_router();
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server is running on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
