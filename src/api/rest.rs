// =============================================================================
// REST API endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. `/ping` requires no authentication;
// every other route is gated by `ApiKeyAuth` and additionally checks the
// capability bit relevant to the operation (read-risk, read-owner,
// write-indicator, write-rra).
//
// CORS is permissive — this API is meant to be reachable from internal
// tooling dashboards on arbitrary origins, not browsers handling end-user
// credentials.
// =============================================================================

use std::sync::Arc;

use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::api::auth::ApiKeyAuth;
use crate::app_state::AppState;
use crate::error::AppError;
use crate::store;
use crate::types::{AssetGroupsResponse, AssetType, Label, RawIndicator, RawRra, RisksResponse, RrasResponse};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/ping", get(ping))
        .route("/api/v1/indicator", post(post_indicator))
        .route("/api/v1/assetgroups", get(get_asset_groups))
        .route("/api/v1/assetgroup/id", get(get_asset_group))
        .route("/api/v1/rra/update", post(post_rra_update))
        .route("/api/v1/rras", get(get_rras))
        .route("/api/v1/rra/id", get(get_rra))
        .route("/api/v1/rra/risk", get(get_rra_risk))
        .route("/api/v1/risks", get(get_risks))
        .route("/api/v1/owner/hostname", get(get_owner))
        .route("/api/v1/owners", get(get_owners))
        .layer(cors)
        .with_state(state)
}

async fn ping() -> &'static str {
    "pong\n"
}

// -----------------------------------------------------------------------
// POST /indicator
// -----------------------------------------------------------------------

async fn post_indicator(
    ApiKeyAuth(caps): ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawIndicator>,
) -> Result<impl IntoResponse, AppError> {
    if !caps.write_indicator {
        return Err(AppError::Unauthorized);
    }
    raw.validate()?;

    let ctx = state.op("indicator");
    let asset_type = AssetType::parse(&raw.asset_type)?;
    let asset_id = store::resolve_asset(&ctx, asset_type, &raw.asset_identifier, &raw.zone)?;
    let likelihood = Label::parse(&raw.likelihood_indicator)?;
    store::append_indicator(
        &ctx,
        asset_id,
        raw.timestamp_utc,
        &raw.event_source_name,
        likelihood,
        &raw.details,
    )?;

    Ok(StatusCode::OK)
}

// -----------------------------------------------------------------------
// GET /assetgroups, /assetgroup/:id
// -----------------------------------------------------------------------

async fn get_asset_groups(
    ApiKeyAuth(_caps): ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = state.op("assetgroups");
    let groups = store::list_asset_groups(&ctx)?;
    Ok(Json(AssetGroupsResponse { groups }))
}

#[derive(Debug, Deserialize)]
struct IdQuery {
    id: i64,
}

async fn get_asset_group(
    ApiKeyAuth(_caps): ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Query(q): Query<IdQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = state.op("assetgroup");
    let group = store::get_asset_group(&ctx, q.id)?
        .ok_or_else(|| AppError::NotFound(format!("no such asset group: {}", q.id)))?;
    Ok(Json(group))
}

// -----------------------------------------------------------------------
// POST /rra/update, GET /rras, /rra/:id
// -----------------------------------------------------------------------

async fn post_rra_update(
    ApiKeyAuth(caps): ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawRra>,
) -> Result<impl IntoResponse, AppError> {
    if !caps.write_rra {
        return Err(AppError::Unauthorized);
    }
    let (service, data_class, cells) = raw.validate()?;
    let raw_document = serde_json::to_value(&raw).unwrap_or(serde_json::Value::Null);

    let ctx = state.op("rra.update");
    store::upsert_rra(&ctx, &service, raw.lastmodified, data_class, &cells, &raw_document)?;

    Ok(StatusCode::OK)
}

async fn get_rras(
    ApiKeyAuth(_caps): ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = state.op("rras");
    let rras = store::list_latest_rras(&ctx)?;
    Ok(Json(RrasResponse { rras }))
}

async fn get_rra(
    ApiKeyAuth(_caps): ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Query(q): Query<IdQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = state.op("rra");
    let rra = store::get_rra(&ctx, q.id)?
        .ok_or_else(|| AppError::NotFound(format!("no such RRA: {}", q.id)))?;
    Ok(Json(rra))
}

// -----------------------------------------------------------------------
// GET /rra/risk, /risks
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RiskQuery {
    id: i64,
}

async fn get_rra_risk(
    ApiKeyAuth(caps): ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Query(q): Query<RiskQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !caps.read_risk {
        return Err(AppError::Unauthorized);
    }
    let doc = crate::risk_cache::risk_for_rra(&state, q.id, true)?;
    Ok(Json(doc))
}

async fn get_risks(
    ApiKeyAuth(caps): ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    if !caps.read_risk {
        return Err(AppError::Unauthorized);
    }
    let ctx = state.op("risks");
    let headers = store::list_latest_rras(&ctx)?;
    drop(ctx);

    let mut risks = Vec::with_capacity(headers.len());
    for header in headers {
        risks.push(crate::risk_cache::risk_for_rra(&state, header.id, true)?);
    }
    Ok(Json(RisksResponse { risks }))
}

// -----------------------------------------------------------------------
// GET /owner/:hostname, /owners
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HostnameQuery {
    hostname: String,
}

async fn get_owner(
    ApiKeyAuth(caps): ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Query(q): Query<HostnameQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !caps.read_owner {
        return Err(AppError::Unauthorized);
    }
    let ctx = state.op("owner");
    let owner = store::get_owner_for_hostname(&ctx, &q.hostname)?;
    Ok(Json(owner))
}

async fn get_owners(
    ApiKeyAuth(caps): ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    if !caps.read_owner {
        return Err(AppError::Unauthorized);
    }
    let ctx = state.op("owners");
    let rows = store::list_asset_owners(&ctx)?;

    let mut body = String::from("# name type zone operator team triagekey\n");
    for (name, assettype, zone, operator, team, triagekey) in rows {
        body.push_str(&format!("{name} {assettype} {zone} {operator} {team} {triagekey}\n"));
    }
    Ok(body)
}
