use axum::{Json, extract::State};
use chrono::Utc;
use latch_common::{params::RedeemCodeParams, views::ActivationCodeDetails};

use crate::{context::ApiContext, error::ApiError};

#[utoipa::path(
    post,
    path = "/api/v1/redeem",
    tags = ["redeem"],
    request_body = RedeemCodeParams,
    responses(
        (status = 200, description = "Code is bound to the machine", body = ActivationCodeDetails),
        (status = 400, description = "Missing code or machine"),
        (status = 404, description = "Unknown code"),
        (status = 409, description = "Code or machine already taken"),
        (status = 410, description = "Code expired before it was redeemed"),
    )
)]
pub async fn redeem_code(
    State(ctx): State<ApiContext>,
    Json(req): Json<RedeemCodeParams>,
) -> Result<Json<ActivationCodeDetails>, ApiError> {
    let now = Utc::now();
    let code = ctx.engine.redeem(&req.code, &req.machine_id, now).await?;

    Ok(Json(ActivationCodeDetails::at(code, now)))
}
