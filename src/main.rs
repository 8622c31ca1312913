use std::sync::Arc;

use jsonrpc_dispatch::{build_app, build_dispatcher, config::Config, logging, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let dispatcher = build_dispatcher(config.method_naming, config.dispatch_options())?;
    info!(
        methods = dispatcher.registry().len(),
        naming = ?config.method_naming,
        "method registry built"
    );

    let bind_socket = config.bind_socket()?;
    let app = build_app(AppState::new(Arc::new(dispatcher)));
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
