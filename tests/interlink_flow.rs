// Covers the interlink reconciliation flow end-to-end against the real
// store: an asset resolved via the HTTP indicator endpoint gets grouped
// and owned once a rule file referencing it is applied (spec.md §8
// scenario 4, P3/P4).

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use servicemap_risk_api::api::rest::router;
use servicemap_risk_api::interlink::{parse_rules, run_rules};
use servicemap_risk_api::types::AssetType;

#[tokio::test]
async fn interlink_run_groups_and_owns_matching_hosts() {
    let state = common::test_state();

    let app = router(state.clone());
    let body = serde_json::json!({
        "asset_type": "hostname",
        "asset_identifier": "web1.example.com",
        "zone": "prod",
        "timestamp_utc": chrono::Utc::now().to_rfc3339(),
        "event_source_name": "scanner",
        "likelihood_indicator": "low",
        "details": {}
    })
    .to_string();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/indicator")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rules = parse_rules(
        "add assetgroup webservers\n\
         add owner alice secops\n\
         host matches ^web[0-9]+\\.example\\.com$ link assetgroup webservers\n\
         host matches ^web[0-9]+\\.example\\.com$ ownership alice secops\n",
    )
    .unwrap();

    {
        let ctx = state.op_transaction("interlink").unwrap();
        run_rules(&ctx, &rules).unwrap();
        ctx.commit().unwrap();
    }

    let ctx = state.op("verify");
    let id = servicemap_risk_api::store::resolve_asset(
        &ctx,
        AssetType::Hostname,
        "web1.example.com",
        "prod",
    )
    .unwrap();
    let asset = servicemap_risk_api::store::get_asset(&ctx, id).unwrap().unwrap();
    assert!(asset.group_id.is_some());
    assert_eq!(asset.owner.operator.as_deref(), Some("alice"));
    assert_eq!(asset.owner.triage_key.as_deref(), Some("alice-secops"));

    let group = servicemap_risk_api::store::get_asset_group(&ctx, asset.group_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(group.name, "webservers");
    assert_eq!(group.assets.len(), 1);
    assert_eq!(group.assets[0].name, "web1.example.com");
}

#[tokio::test]
async fn asset_group_links_to_service_rras_by_exact_group_name() {
    let state = common::test_state();
    let ctx = state.op_transaction("setup").unwrap();
    servicemap_risk_api::store::resolve_asset(&ctx, AssetType::Hostname, "web1.example.com", "prod").unwrap();
    let rra_id = servicemap_risk_api::store::upsert_rra(
        &ctx,
        "payments-api",
        chrono::Utc::now(),
        servicemap_risk_api::types::DataClass::Public,
        &[servicemap_risk_api::types::RraCell {
            impact: servicemap_risk_api::types::Label::Low,
            probability: servicemap_risk_api::types::Label::Low,
        }; 9],
        &serde_json::Value::Null,
    )
    .unwrap();
    ctx.commit().unwrap();

    let rules = parse_rules(
        "add assetgroup webservers\n\
         host matches ^web.* link assetgroup webservers\n\
         assetgroup matches webservers link service ^payments-.*$\n",
    )
    .unwrap();
    let ctx = state.op_transaction("interlink").unwrap();
    run_rules(&ctx, &rules).unwrap();
    ctx.commit().unwrap();

    let ctx = state.op("rra");
    let rra = servicemap_risk_api::store::get_rra(&ctx, rra_id).unwrap().unwrap();
    assert_eq!(rra.groups.len(), 1);
    assert_eq!(rra.groups[0].name, "webservers");
}
