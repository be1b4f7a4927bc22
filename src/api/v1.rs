use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{error::ApiError, ApiState};
use crate::auth::AuthBearer;
use crate::command::Ack;
use crate::controller::MeterStatus;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(get_status))
        .route("/command", post(post_command))
        .with_state(state)
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn get_status(
    State(st): State<ApiState>,
    _auth: AuthBearer,
) -> Result<Json<MeterStatus>, ApiError> {
    Ok(Json(st.ctx.status().await?))
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Frame payload without delimiters, e.g. `4,2`
    pub command: String,
}

pub async fn post_command(
    State(st): State<ApiState>,
    _auth: AuthBearer,
    Json(req): Json<CommandRequest>,
) -> Result<Json<Ack>, ApiError> {
    let ack = st.dispatcher.dispatch(&req.command).await?;
    Ok(Json(ack))
}
