use envconfig::Envconfig;
use tokio::signal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use workload_server::config::Config;
use workload_server::server::serve;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() {
    // stdout with a level configured by the RUST_LOG envvar
    let log_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let listener = tokio::net::TcpListener::bind(config.address)
        .await
        .expect("could not bind port");

    if let Err(e) = serve(config, listener, shutdown()).await {
        tracing::error!("server exited with error: {:?}", e);
        std::process::exit(1);
    }
}
