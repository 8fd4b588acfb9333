use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fabrik_worker::config::WorkerConfig;
use fabrik_worker::worker::Worker;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fabrik_worker=info,fabrik_comfyui=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::parse();

    tracing::info!(
        api_base = %config.api_base,
        comfy_url = %config.comfy_url,
        workflow = %config.workflow_path.display(),
        "Starting fabrik-worker",
    );

    let mut worker = Worker::new(config);
    worker.run().await;
}
