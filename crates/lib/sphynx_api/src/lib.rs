//! # sphynx_api
//!
//! HTTP API library for Sphynx.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, patch, post};
use sphynx_core::accounts::{AccountService, ResetNotifier};
use sphynx_core::agents::lifecycle::AgentLifecycle;
use sphynx_core::auth::tokens::TokenService;
use sphynx_core::clock::Clock;
use sphynx_core::config::{ConfigError, CoreConfig};
use sphynx_core::store::{AgentStore, UserDirectory};
use sphynx_core::users::UserService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ApiConfig;
use crate::handlers::{agents, auth, health, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenService,
    pub accounts: AccountService,
    pub users: UserService,
    pub agents: AgentLifecycle,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the core services over the given stores.
    pub fn new(
        core: &CoreConfig,
        config: ApiConfig,
        users: Arc<dyn UserDirectory>,
        agents: Arc<dyn AgentStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn ResetNotifier>,
    ) -> Result<Self, ConfigError> {
        let tokens = TokenService::new(
            core.signing_key()?,
            core.token_settings(),
            users.clone(),
            clock.clone(),
        );
        Ok(Self {
            accounts: AccountService::new(users.clone(), tokens.clone(), clock.clone(), notifier),
            users: UserService::new(users.clone(), clock.clone()),
            agents: AgentLifecycle::new(agents, users, clock),
            tokens,
            config,
        })
    }
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origin = config
        .cors_origin
        .as_deref()
        .and_then(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = o, "Ignoring unparseable CORS origin");
                None
            }
        });
    match origin {
        // Credentialed CORS needs explicit origin, methods and headers.
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE]),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/auth/sign-up", post(auth::sign_up_handler))
        .route("/api/v1/auth/sign-in", post(auth::sign_in_handler))
        .route("/api/v1/auth/sign-out", get(auth::sign_out_handler))
        .route("/api/v1/auth/request-reset", post(auth::request_reset_handler))
        .route("/api/v1/auth/reset-password", post(auth::reset_password_handler))
        .route("/api/v1/agent/activate", post(agents::activate_agent_handler));

    // Protected routes (require auth)
    let protected = Router::new()
        .route("/api/v1/user/me", get(auth::me_handler))
        .route("/api/v1/agent/get", get(agents::get_agents_handler))
        .route("/api/v1/agent/create", post(agents::create_agent_handler))
        .route("/api/v1/agent/update", patch(agents::update_agent_handler))
        .route("/api/v1/agent/delete", delete(agents::delete_agent_handler))
        .route(
            "/api/v1/agent/refresh-activation-token",
            get(agents::refresh_activation_token_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // Admin routes (require auth + ADMIN role)
    let admin = Router::new()
        .route("/api/v1/user/get", get(users::get_users_handler))
        .route("/api/v1/user/create", post(users::create_user_handler))
        .route("/api/v1/user/update", patch(users::update_user_handler))
        .route("/api/v1/user/delete", delete(users::delete_user_handler))
        .layer(axum::middleware::from_fn(middleware::auth::require_admin))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
