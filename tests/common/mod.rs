// Shared test scaffolding: an in-memory database, a full `AppState`, and a
// couple of helpers for driving the router with `tower::ServiceExt::oneshot`
// without a running TCP listener.

use std::sync::Arc;

use http_body_util::BodyExt;
use rusqlite::params;
use servicemap_risk_api::app_state::AppState;
use servicemap_risk_api::config::Config;
use servicemap_risk_api::store;

pub fn test_state() -> Arc<AppState> {
    let conn = store::connect(":memory:").expect("open in-memory db");
    store::init_schema(&conn).expect("init schema");
    let mut config = Config::default();
    config.general.disable_api_auth = true;
    Arc::new(AppState::new(config, conn))
}

/// Inserts an API key row and returns the raw (unhashed) token to send in
/// the `serviceapikey` header.
pub fn insert_api_key(
    state: &AppState,
    name: &str,
    read_risk: bool,
    read_owner: bool,
    write_indicator: bool,
    write_rra: bool,
) -> String {
    let token = format!("token-{name}");
    let hash = servicemap_risk_api::api::auth::hash_key(&token);
    let db = state.db.lock();
    db.execute(
        "INSERT INTO apikey (name, keyhash, readrisk, readowner, writeindicator, writerra)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            name,
            hash,
            read_risk as i64,
            read_owner as i64,
            write_indicator as i64,
            write_rra as i64
        ],
    )
    .expect("insert api key");
    token
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("response body is valid json")
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
