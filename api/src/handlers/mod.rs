use axum::extract::State;

use crate::{context::ApiContext, error::ApiError};

pub mod codes;
pub mod config;
pub mod redeem;

#[utoipa::path(
    get,
    path = "/health",
    tags = ["system"],
    responses((status = 200, description = "Storage is reachable", body = String))
)]
pub async fn health_check(State(ctx): State<ApiContext>) -> Result<&'static str, ApiError> {
    ctx.engine.ping().await?;
    Ok("Healthy")
}
