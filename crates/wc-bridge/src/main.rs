//! wc-bridge: runs a pairing and signing round trip against the in-memory
//! transport.

use wc_bridge_adapters::BridgeConfig;

mod app;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = BridgeConfig::from_env();
    tracing::info!(?config, "Starting wc-bridge");

    let app = app::App::new(config);
    app.run_scenario().await
}
