//! Storefront API Library
//!
//! Order checkout, promo codes, payment provider integration and the staff
//! order panel for a food-ordering storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod notifications;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::auth::AdminGuard;
use crate::notifications::NotificationSink;
use crate::services::payments::PaymentProvider;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub payment_provider: Arc<dyn PaymentProvider>,
    pub notifier: Arc<dyn NotificationSink>,
    pub services: handlers::AppServices,
    pub admin: AdminGuard,
}

impl AppState {
    /// Builds the state once at startup; the provider and sink are shared by
    /// every request.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        payment_provider: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let services = handlers::AppServices::new(
            db.clone(),
            &config,
            payment_provider.clone(),
            notifier.clone(),
        );
        let admin = AdminGuard::from(&config);
        Self {
            db,
            config: Arc::new(config),
            payment_provider,
            notifier,
            services,
            admin,
        }
    }
}

/// Routes mounted under `/api/v1`
pub fn api_v1_routes(admin: AdminGuard) -> Router<AppState> {
    let admin_routes = Router::new()
        .route("/admin/orders", get(handlers::admin::list_orders))
        .route("/admin/orders/:id", get(handlers::admin::get_order))
        .route(
            "/admin/orders/:id/status",
            patch(handlers::admin::update_order_status),
        )
        .route_layer(middleware::from_fn_with_state(
            admin,
            auth::admin_auth_middleware,
        ));

    Router::new()
        .merge(handlers::health::health_routes())
        .route("/orders", post(handlers::orders::create_order))
        .route("/payments/create", post(handlers::orders::create_payment))
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .route("/promocode/validate", post(handlers::promo::validate_promo))
        .merge(admin_routes)
}

/// Full application router with request ids and HTTP tracing
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes(state.admin.clone()))
        .layer(crate::tracing::configure_http_tracing())
        .layer(middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
