use axum::{Json, extract::State};
use latch_common::{
    card_type::PRESETS,
    views::{CardTypePreset, PublicConfig},
};

use crate::context::ApiContext;

#[utoipa::path(
    get,
    path = "/api/v1/card-types",
    tags = ["codes"],
    responses((status = 200, description = "Validity presets", body = Vec<CardTypePreset>))
)]
pub async fn list_card_types() -> Json<Vec<CardTypePreset>> {
    Json(PRESETS.iter().map(CardTypePreset::from).collect())
}

#[utoipa::path(
    get,
    path = "/api/public/config",
    tags = ["public"],
    responses((status = 200, description = "Public settings", body = PublicConfig))
)]
pub async fn public_config(State(ctx): State<ApiContext>) -> Json<PublicConfig> {
    Json(PublicConfig {
        system_name: ctx.config.system_name.clone(),
    })
}
