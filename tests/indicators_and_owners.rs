// Covers P1 (asset identity resolves consistently across case/zone),
// P2 (latest-indicator-per-source semantics), and the owner-fallback
// end-to-end scenario from spec.md §8.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use tower::ServiceExt;

use servicemap_risk_api::api::rest::router;

fn indicator_body(identifier: &str, source: &str, likelihood: &str, ts: chrono::DateTime<Utc>) -> String {
    serde_json::json!({
        "asset_type": "hostname",
        "asset_identifier": identifier,
        "zone": "prod",
        "timestamp_utc": ts.to_rfc3339(),
        "event_source_name": source,
        "likelihood_indicator": likelihood,
        "details": {}
    })
    .to_string()
}

#[tokio::test]
async fn posting_indicator_requires_write_capability() {
    // test_state() disables API auth entirely, so build a fresh state with
    // auth enabled to exercise the capability check itself.
    let conn = servicemap_risk_api::store::connect(":memory:").unwrap();
    servicemap_risk_api::store::init_schema(&conn).unwrap();
    let mut cfg = servicemap_risk_api::config::Config::default();
    cfg.general.disable_api_auth = false;
    let state = std::sync::Arc::new(servicemap_risk_api::app_state::AppState::new(cfg, conn));

    let app = router(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/indicator")
                .header("content-type", "application/json")
                .body(Body::from(indicator_body(
                    "web1.example.com",
                    "scanner",
                    "high",
                    Utc::now(),
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = common::insert_api_key(&state, "writer", false, false, true, false);
    let app = router(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/indicator")
                .header("content-type", "application/json")
                .header("serviceapikey", token)
                .body(Body::from(indicator_body(
                    "web1.example.com",
                    "scanner",
                    "high",
                    Utc::now(),
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn case_folded_hostname_and_latest_per_source_indicator() {
    let state = common::test_state();
    let now = Utc::now();

    // Two indicators from the same source, older one should drop out; a
    // third indicator from a different source should be kept independently.
    for (identifier, source, likelihood, ts) in [
        ("WEB1.Example.com", "scanner-a", "low", now - Duration::hours(2)),
        ("web1.example.com", "scanner-a", "high", now - Duration::hours(1)),
        ("web1.EXAMPLE.com", "scanner-b", "medium", now - Duration::minutes(30)),
    ] {
        let app = router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/indicator")
                    .header("content-type", "application/json")
                    .body(Body::from(indicator_body(identifier, source, likelihood, ts)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let ctx = state.op("test");
    let id = servicemap_risk_api::store::resolve_asset(
        &ctx,
        servicemap_risk_api::types::AssetType::Hostname,
        "web1.example.com",
        "prod",
    )
    .unwrap();
    let asset = servicemap_risk_api::store::get_asset(&ctx, id).unwrap().unwrap();

    assert_eq!(asset.name, "web1.example.com");
    assert_eq!(asset.indicators.len(), 2);
    let scanner_a = asset
        .indicators
        .iter()
        .find(|i| i.event_source == "scanner-a")
        .unwrap();
    assert_eq!(scanner_a.likelihood, servicemap_risk_api::types::Label::High);
}

#[tokio::test]
async fn owner_lookup_falls_back_to_unset_for_unowned_asset() {
    let state = common::test_state();
    let ctx = state.op("setup");
    servicemap_risk_api::store::resolve_asset(
        &ctx,
        servicemap_risk_api::types::AssetType::Hostname,
        "noowner.example.com",
        "prod",
    )
    .unwrap();
    drop(ctx);

    let app = router(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/owner/hostname?hostname=noowner.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(
        body,
        serde_json::json!({"operator": "unset", "team": "unset", "triagekey": "unset-unset"})
    );
}

#[tokio::test]
async fn owners_text_report_lists_triagekey_column() {
    let state = common::test_state();
    let ctx = state.op("setup");
    servicemap_risk_api::store::resolve_asset(
        &ctx,
        servicemap_risk_api::types::AssetType::Hostname,
        "web1.example.com",
        "prod",
    )
    .unwrap();
    drop(ctx);

    let app = router(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/owners")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_text(response).await;
    assert!(body.starts_with("# name type zone operator team triagekey\n"));
    assert!(body.contains("web1.example.com hostname prod unset unset unset-unset"));
}
