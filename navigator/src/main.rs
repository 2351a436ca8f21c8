use std::{net::SocketAddr, sync::Arc};

use navigator::{
    AppState, create_router,
    config::NavigationConfig,
    provider::{DirectRouteProvider, HttpRoutingProvider, RoutingProvider},
    session::NavigationSession,
    voice::TracingVoice,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "navigator=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = NavigationConfig::from_env()?;

    let provider: Arc<dyn RoutingProvider> = match std::env::var("ROUTING_URL") {
        Ok(url) => {
            tracing::info!("using routing service at {url}");
            Arc::new(HttpRoutingProvider::new(&url))
        }
        Err(_) => {
            tracing::warn!("ROUTING_URL not set, recalculation falls back to straight-line routes");
            // a straight line would replace a real route on every refresh
            config.recalculation_interval_secs = None;
            Arc::new(DirectRouteProvider::default())
        }
    };

    let session = NavigationSession::new(config, provider, Arc::new(TracingVoice));
    let app = create_router(AppState::new(session));

    let addr: SocketAddr = std::env::var("NAV_BIND")
        .unwrap_or_else(|_| DEFAULT_BIND.to_string())
        .parse()?;
    tracing::info!("starting navigator on http://{addr}");
    tracing::info!("  POST   /api/session      - start navigation");
    tracing::info!("  GET    /api/session      - current state");
    tracing::info!("  DELETE /api/session      - end navigation");
    tracing::info!("  POST   /api/session/fix  - submit a GPS fix");
    tracing::info!("  PUT    /api/traffic      - set traffic factor");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
