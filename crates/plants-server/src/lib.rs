pub mod auth;
pub mod billing;
pub mod error;
pub mod messaging;
pub mod routes;
pub mod state;
pub mod worker;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use plants_core::config::Secrets;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route("/api/admin/claim-tokens", post(routes::admin::mint_tokens))
        .route(
            "/api/admin/claim-tokens/{token}/qr.svg",
            get(routes::admin::token_qr),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::admin_middleware,
        ));

    Router::new()
        // Public
        .route("/api/health", get(routes::health::health))
        .route("/api/species", get(routes::species::list_species))
        .route(
            "/api/claim/{token}",
            get(routes::claim::get_claim).post(routes::claim::redeem_claim),
        )
        // Account
        .route(
            "/api/me",
            get(routes::me::get_me).put(routes::me::update_me),
        )
        // Plants
        .route("/api/plants", get(routes::plants::list_plants))
        .route(
            "/api/plants/{id}",
            get(routes::plants::get_plant)
                .patch(routes::plants::update_plant)
                .delete(routes::plants::archive_plant),
        )
        .route("/api/plants/{id}/water", post(routes::plants::water_plant))
        .route(
            "/api/plants/{id}/feedback",
            post(routes::plants::plant_feedback),
        )
        .route(
            "/api/plants/{id}/schedule",
            get(routes::plants::plant_schedule),
        )
        .route("/api/plants/{id}/health", get(routes::plants::plant_health))
        // Messages
        .route("/api/messages", get(routes::messages::list_messages))
        // Billing
        .route(
            "/api/billing/subscription",
            get(routes::billing::get_subscription),
        )
        .route("/api/billing/checkout", post(routes::billing::checkout))
        // Webhooks
        .route("/webhooks/whatsapp", post(routes::webhooks::whatsapp))
        .route("/webhooks/identity", post(routes::webhooks::identity))
        .route("/webhooks/stripe", post(routes::webhooks::stripe))
        .route(
            "/webhooks/lemonsqueezy",
            post(routes::webhooks::lemon_squeezy),
        )
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Open the data directory under `root`, start the background worker and
/// serve the API on `0.0.0.0:{port}`.
pub async fn serve(root: PathBuf, port: u16) -> anyhow::Result<()> {
    let app_state = AppState::open(root, Secrets::from_env())?;
    worker::startup(&app_state).await?;
    let worker = worker::spawn(app_state.clone());
    let app = build_router(app_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("plants server listening on http://localhost:{port}");

    let served = axum::serve(listener, app).await;
    worker.abort();
    served?;
    Ok(())
}
