pub mod error;
pub mod v1;

use axum::{extract::FromRef, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::AuthToken;
use crate::command::CommandDispatcher;
use crate::config::Config;
use crate::controller::MeterContext;

#[derive(Clone)]
pub struct ApiState {
    pub ctx: Arc<MeterContext>,
    pub dispatcher: CommandDispatcher,
    pub token: AuthToken,
}

impl ApiState {
    pub fn new(ctx: Arc<MeterContext>, token: &str) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(ctx.clone()),
            ctx,
            token: AuthToken::new(token),
        }
    }
}

impl FromRef<ApiState> for AuthToken {
    fn from_ref(state: &ApiState) -> Self {
        state.token.clone()
    }
}

pub fn router(state: ApiState, cfg: &Config) -> Router {
    Router::new()
        .nest("/api/v1", v1::router(state))
        .layer(axum::extract::DefaultBodyLimit::max(16 * 1024))
        .layer(TimeoutLayer::new(Duration::from_secs(
            cfg.server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
}
