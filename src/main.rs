//! HealthTrack service: binary entrypoint.
//! Boots the Axum HTTP server with shared state, routes and middleware.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    healthtrack::logging::init_tracing();

    let router = healthtrack::app().await?;
    Ok(router.into())
}
