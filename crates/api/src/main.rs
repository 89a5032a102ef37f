use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use careerline_api::background::resume_links::{self, LinkOutbox, RetryPolicy};
use careerline_api::config::ServerConfig;
use careerline_api::router::build_app_router;
use careerline_api::services::{PgJobApplicationService, PgResumeService};
use careerline_api::state::AppState;
use careerline_core::storage::LocalFileStorage;
use careerline_queue::{require_capability, Capability, QueueConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "careerline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = careerline_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    careerline_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    careerline_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Queues ---
    let resume_queue_config = QueueConfig::from_env("RESUME_QUEUE", "resume")
        .expect("Invalid RESUME_QUEUE_* configuration");
    let resume_queue = careerline_queue::connect(&resume_queue_config)
        .await
        .expect("Failed to connect resume queue");
    // Status polling, retry and cancel all read job records.
    require_capability(resume_queue.as_ref(), Capability::Records)
        .expect("Resume queue backend must keep job records");

    let application_queue_config = QueueConfig::from_env("APPLICATION_QUEUE", "application")
        .expect("Invalid APPLICATION_QUEUE_* configuration");
    let application_queue = careerline_queue::connect(&application_queue_config)
        .await
        .expect("Failed to connect application queue");

    tracing::info!(
        resume_backend = resume_queue.backend_name(),
        application_backend = application_queue.backend_name(),
        "Job queues connected",
    );

    // --- Collaborators ---
    let applications = Arc::new(PgJobApplicationService::new(pool.clone()));
    let resumes = Arc::new(PgResumeService::new(pool));
    let storage = Arc::new(LocalFileStorage::new(&config.storage_dir));

    // --- Resume link outbox ---
    let cancel = CancellationToken::new();
    let (link_outbox, link_receiver) = LinkOutbox::channel(config.link_outbox_capacity);
    let outbox_handle = tokio::spawn(resume_links::run(
        link_receiver,
        applications.clone(),
        RetryPolicy::default(),
        cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        resume_queue,
        application_queue,
        applications,
        resumes,
        storage,
        link_outbox,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), outbox_handle).await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
