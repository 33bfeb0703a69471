mod app;
mod config;
mod k8s;
mod kube_client;
mod logging;

use anyhow::Result;
use clap::Parser;

use crate::config::Cli;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    logging::init();

    tracing::info!(
        "Starting vfio initializer {}",
        env!("CARGO_PKG_VERSION")
    );

    app::run(cli).await
}
