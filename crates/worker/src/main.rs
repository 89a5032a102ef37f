use std::sync::Arc;

use careerline_worker::callback::CompletionClient;
use careerline_worker::config::WorkerConfig;
use careerline_worker::handler::CommandHandler;
use careerline_worker::runner::Runner;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "careerline_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(
        backend = %config.queue.backend,
        namespace = %config.queue.namespace,
        program = %config.command[0],
        "Loaded worker configuration",
    );

    let queue = careerline_queue::connect(&config.queue)
        .await
        .expect("Failed to connect to the job queue");

    let handler = CommandHandler::new(&config.command, config.job_timeout)
        .expect("WORKER_COMMAND must not be empty");
    let uploader = CompletionClient::new(&config.api_base_url, config.internal_api_key.clone())
        .expect("Failed to build HTTP client");

    let runner = Runner::new(queue, Arc::new(handler), Arc::new(uploader))
        .with_poll_timeout(config.poll_timeout)
        .with_consumer_tag(config.consumer_tag.clone());
    runner
        .check_capabilities()
        .expect("Queue backend cannot feed a worker");

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    if let Err(e) = runner.run(cancel).await {
        tracing::error!(error = %e, "Worker stopped with an error");
        std::process::exit(1);
    }
    tracing::info!("Worker stopped");
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
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), finishing current job"),
        () = terminate => tracing::info!("Received SIGTERM, finishing current job"),
    }
}
