use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use latch_common::{
    params::{GenerateCodesParams, ListCodesParams, PaginationParams},
    views::{
        ActivationCode, ActivationCodeDetails, CleanupReport, CodeStats, GeneratedCodes,
        PaginatedList,
    },
};
use latch_engine::EngineError;

use crate::{context::ApiContext, error::ApiError};

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 500;

#[utoipa::path(
    post,
    path = "/api/v1/codes",
    tags = ["codes"],
    request_body = GenerateCodesParams,
    responses(
        (status = 201, description = "Codes generated", body = GeneratedCodes),
        (status = 400, description = "Invalid amount or validity policy"),
    )
)]
pub async fn generate_codes(
    State(ctx): State<ApiContext>,
    Json(req): Json<GenerateCodesParams>,
) -> Result<(StatusCode, Json<GeneratedCodes>), ApiError> {
    let codes = ctx.engine.generate(req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(GeneratedCodes { codes })))
}

#[utoipa::path(
    get,
    path = "/api/v1/codes",
    tags = ["codes"],
    params(ListCodesParams),
    responses(
        (status = 200, description = "Codes matching the filter, oldest first", body = PaginatedList<ActivationCodeDetails>),
    )
)]
pub async fn list_codes(
    State(ctx): State<ApiContext>,
    Query(query): Query<ListCodesParams>,
) -> Result<Json<PaginatedList<ActivationCodeDetails>>, ApiError> {
    let now = Utc::now();
    let codes = ctx.engine.list(&query.filter(), now).await?;
    let page = paginate(codes, &query.pagination())?;

    Ok(Json(PaginatedList {
        items: page
            .items
            .into_iter()
            .map(|c| ActivationCodeDetails::at(c, now))
            .collect(),
        next_token: page.next_token,
        limit: page.limit,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/codes/{id}",
    tags = ["codes"],
    params(("id" = String, Path, description = "ID of the code to delete")),
    responses(
        (status = 204, description = "Code and its binding deleted"),
        (status = 404, description = "Not found"),
    )
)]
pub async fn delete_code(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    ctx.engine.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/codes/cleanup",
    tags = ["codes"],
    responses((status = 200, description = "Bindings of expired codes released", body = CleanupReport))
)]
pub async fn cleanup_bindings(
    State(ctx): State<ApiContext>,
) -> Result<Json<CleanupReport>, ApiError> {
    Ok(Json(ctx.engine.cleanup_expired_bindings(Utc::now()).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/codes/stats",
    tags = ["codes"],
    responses((status = 200, description = "Code counts by status", body = CodeStats))
)]
pub async fn code_stats(State(ctx): State<ApiContext>) -> Result<Json<CodeStats>, ApiError> {
    Ok(Json(ctx.engine.stats(Utc::now()).await?))
}

/// Cut one page out of `codes`, which must be in ascending id order. The
/// page token is the id of the last code handed out.
fn paginate(
    codes: Vec<ActivationCode>,
    params: &PaginationParams,
) -> Result<PaginatedList<ActivationCode>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(EngineError::invalid(format!("limit must be between 1 and {MAX_PAGE_SIZE}")).into());
    }

    let mut rest: Vec<ActivationCode> = match params.next_token.as_deref() {
        Some(after) => codes.into_iter().filter(|c| c.id.as_str() > after).collect(),
        None => codes,
    };

    let has_more = rest.len() as u64 > limit;
    rest.truncate(limit as usize);
    let next_token = if has_more {
        rest.last().map(|c| c.id.clone())
    } else {
        None
    };

    Ok(PaginatedList {
        items: rest,
        next_token,
        limit: Some(limit),
    })
}
