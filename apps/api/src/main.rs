use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::notification::{Notifier, TracingNotifier, WebhookNotifier};
use appointment_cell::{AppointmentCellState, ClinicStore, InMemoryStore, SupabaseStore};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

fn build_store(config: &AppConfig) -> Arc<dyn ClinicStore> {
    if config.is_configured() {
        info!("Persisting to Supabase at {}", config.supabase_url);
        Arc::new(SupabaseStore::new(Arc::new(SupabaseClient::new(config))))
    } else {
        warn!("Supabase not configured, appointments are kept in memory and lost on restart");
        Arc::new(InMemoryStore::new())
    }
}

fn build_notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    match &config.notification_webhook_url {
        Some(url) => {
            info!("Delivering notifications to {}", url);
            Arc::new(WebhookNotifier::new(url.clone(), config.storage_timeout()))
        }
        None => Arc::new(TracingNotifier),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic scheduling API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());
    if !config.is_auth_configured() {
        warn!("SUPABASE_JWT_SECRET is empty, every authenticated request will be rejected");
    }
    info!(
        "Scheduling rules: working hours enforced = {}, storage timeout = {} ms",
        config.enforce_working_hours, config.storage_timeout_ms
    );

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create shared state
    let store = build_store(&config);
    let notifier = build_notifier(&config);
    let state = Arc::new(AppointmentCellState::new(config.clone(), store, notifier));

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
