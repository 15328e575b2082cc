//! Nexus dashboard: HTTP surface for search, statistics, subscriptions and
//! newsletter delivery, served through Shuttle.

use nexus::metrics::Metrics;
use nexus::{api, telemetry, Runtime};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let rt = Runtime::from_env().await?;
    let metrics = Metrics::init()?;
    tracing::info!(
        topics = rt.pipeline.catalog().topics().count(),
        email = rt.mailer.is_some(),
        "nexus dashboard starting"
    );

    let router = api::create_router(rt.app_state()).merge(metrics.router());
    Ok(router.into())
}
