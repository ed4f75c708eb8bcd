use std::sync::Arc;

use regroup::{app_context::AppContext, config::Config, scheduler::JobScheduler};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer: tracing_subscriber::filter::Filtered<
        tracing_subscriber::fmt::Layer<tracing_subscriber::Registry>,
        EnvFilter,
        tracing_subscriber::Registry,
    > = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_with_defaults().unwrap();
    let context = Arc::new(AppContext::new(&config).await.unwrap());

    let scheduler = JobScheduler::new(context);
    let workers = scheduler.clone().run_workers(config.worker_count);

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    info!("Shutting down, letting in-flight jobs finish...");
    scheduler.shutdown();

    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!("worker task failed to join: {}", e);
        }
    }
}
