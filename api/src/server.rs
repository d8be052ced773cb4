use std::time::Duration;

use anyhow::Context;
use axum::{Router, extract::MatchedPath, http::{HeaderName, HeaderValue, Request}};
use chrono::Utc;
use latch_common::views::ApiErrorResponse;
use latch_engine::Engine;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer}, trace::TraceLayer};
use tracing::{error, info, info_span};
use utoipa::{ToSchema, openapi::{Info, License, OpenApi, RefOr, path::Operation}};
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{config::LatchApiConfig, context::ApiContext, handlers};

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn make(cfg: LatchApiConfig, engine: Engine) -> anyhow::Result<(Router, OpenApi)> {
    let allowed_origin = cfg
        .public_url
        .parse::<HeaderValue>()
        .context("public URL is not a valid origin header")?;
    let context = ApiContext::new(cfg, engine);

    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(
            x_request_id.clone(),
            MakeRequestUuid,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    let request_id = req.headers().get(REQUEST_ID_HEADER);
                    let span = info_span!(
                        "http_request",
                        method = req.method().to_string(),
                        request_id = Option::<&str>::None,
                        path = Option::<&str>::None,
                    );

                    if let Some(request_id) = request_id.and_then(|v| v.to_str().ok()) {
                        span.record("request_id", request_id);
                    };

                    if let Some(path) = req.extensions().get::<MatchedPath>() {
                        span.record("path", path.as_str())
                    } else {
                        span.record("path", req.uri().path())
                    };

                    span
                }),
        )
        .layer(
            CorsLayer::new()
                .allow_credentials(true)
                .allow_origin(allowed_origin)
        )
        .layer(PropagateRequestIdLayer::new(x_request_id));

    let openapi = OpenApi::builder()
        .info(
            Info::builder()
                .title("Latch API Reference")
                .version(env!("CARGO_PKG_VERSION"))
                .license(Some(
                    License::builder()
                        .name("Apache 2.0 License")
                        .identifier(Some(env!("CARGO_PKG_LICENSE")))
                        .build()
                ))
        )
        .build();

    let (r, mut a) = OpenApiRouter::with_openapi(openapi)
        .routes(routes!(handlers::codes::generate_codes, handlers::codes::list_codes))
        .routes(routes!(handlers::codes::delete_code))
        .routes(routes!(handlers::codes::cleanup_bindings))
        .routes(routes!(handlers::codes::code_stats))
        .routes(routes!(handlers::redeem::redeem_code))
        .routes(routes!(handlers::config::list_card_types))
        .routes(routes!(handlers::config::public_config))
        .routes(routes!(handlers::health_check))
        .layer(middleware)
        .with_state(context)
        .split_for_parts();

    a.paths.paths.iter_mut().for_each(|(_path, item)| {
        apply_default_errors(&mut item.get);
        apply_default_errors(&mut item.post);
        apply_default_errors(&mut item.patch);
        apply_default_errors(&mut item.put);
        apply_default_errors(&mut item.delete);
        apply_default_errors(&mut item.trace);
        apply_default_errors(&mut item.head);
        apply_default_errors(&mut item.options);
    });

    Ok((r, a))
}

fn apply_default_errors(item: &mut Option<Operation>) {
    if let Some(item) = item {
        item.responses.responses.insert(
            "500".into(),
            RefOr::Ref(
                utoipa::openapi::Ref::builder()
                    .summary("Internal server error")
                    .ref_location_from_schema_name(ApiErrorResponse::name())
                    .build()
            )
        );
    }
}

/// Run the binding cleanup every `every` until the runtime shuts down.
pub fn spawn_cleanup(engine: Engine, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match engine.cleanup_expired_bindings(Utc::now()).await {
                Ok(report) if report.removed_count > 0 => {
                    info!(removed = report.removed_count, "Periodic cleanup released bindings");
                }
                Ok(_) => {}
                Err(err) => error!(%err, "Periodic cleanup failed"),
            }
        }
    })
}
