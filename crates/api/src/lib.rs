//! HTTP API server with observability for the canteen ordering backend.
//!
//! Provides REST endpoints for ordering, status transitions, balances,
//! RFID registration and the live staff feed, with structured logging
//! (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use domain::{LogOtpSender, OrderWorkflow, OtpStore, RfidRegistry};
use metrics_exporter_prometheus::PrometheusHandle;
use notify::BroadcastNotifier;
use store::CanteenStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CanteenStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/my-orders", get(routes::orders::mine::<S>))
        .route("/orders/rfid/{tag_id}", get(routes::orders::by_rfid::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", patch(routes::orders::update_status::<S>))
        .route("/orders/{id}/dispatch", post(routes::orders::dispatch::<S>))
        .route(
            "/orders/{id}/confirm-collection",
            post(routes::orders::confirm_collection::<S>),
        )
        .route("/orders/{id}/pay", post(routes::payment::initiate::<S>))
        .route("/payment/callback", post(routes::payment::callback::<S>))
        .route("/balances/me", get(routes::balances::mine::<S>))
        .route("/balances/{student_id}", put(routes::balances::set::<S>))
        .route(
            "/balances/{student_id}/credit",
            post(routes::balances::credit::<S>),
        )
        .route("/menu-items/{id}/stock", post(routes::menu::adjust_stock::<S>))
        .route("/transactions", get(routes::transactions::list::<S>))
        .route("/transactions/mine", get(routes::transactions::mine::<S>))
        .route("/earnings/daily", get(routes::transactions::daily_earnings::<S>))
        .route("/rfid/request-otp", post(routes::rfid::request_otp::<S>))
        .route("/rfid/register", post(routes::rfid::register::<S>))
        .route("/rfid/admin/register", post(routes::rfid::admin_register::<S>))
        .route("/rfid/{tag_id}", get(routes::rfid::get::<S>))
        .route(
            "/students/me/device-token",
            post(routes::students::register_device_token::<S>),
        )
        .route("/staff/events/{topic}", get(routes::events::subscribe::<S>))
        .route_layer(axum::middleware::from_fn(auth::authorize))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a store, wiring the notifier,
/// the RFID registry and the order workflow.
pub fn create_default_state<S: CanteenStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    let notifier = BroadcastNotifier::new();
    let otp = Arc::new(OtpStore::new(chrono::Duration::seconds(config.otp_ttl_secs)));
    let rfid = Arc::new(RfidRegistry::new(store.clone(), otp, Arc::new(LogOtpSender)));

    let workflow = OrderWorkflow::new(store.clone(), Arc::new(notifier.clone()), rfid.clone())
        .with_low_stock_threshold(config.low_stock_threshold);

    Arc::new(AppState {
        workflow,
        rfid,
        notifier,
        store,
    })
}
