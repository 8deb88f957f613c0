// =============================================================================
// Module: Risk cache
// =============================================================================
//
// Bridges the risk calculator to the store. Reads use a fixed 4-hour TTL
// regardless of how often the background sweep runs — `general.risk_cache_every`
// only controls how aggressively the sweep keeps the cache warm, it is not
// the staleness bound readers see.

use chrono::Utc;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::risk;
use crate::store;
use crate::types::RiskDocument;

const READ_TTL: chrono::Duration = chrono::Duration::hours(4);

/// Returns the risk document for an RRA, from cache when `use_cache` is
/// true and a fresh-enough entry exists, else recomputing it. Snapshots are
/// written exclusively by the risk-cache worker (`sweep_stale`, which calls
/// this with `use_cache=false`) — a read-path cache miss recomputes and
/// returns a document without persisting it, matching `riskForRRA` in the
/// original service.
pub fn risk_for_rra(state: &AppState, rraid: i64, use_cache: bool) -> Result<RiskDocument, AppError> {
    let ctx = state.op("risk");

    if use_cache {
        if let Some(cached) = store::latest_risk(&ctx, rraid, READ_TTL)? {
            if let Ok(doc) = serde_json::from_value::<RiskDocument>(cached) {
                return Ok(doc);
            }
        }
    }

    let rra = store::get_rra(&ctx, rraid)?
        .ok_or_else(|| AppError::NotFound(format!("no such RRA: {rraid}")))?;
    let doc = risk::compute_risk(&rra)?;

    if !use_cache {
        let serialized = serde_json::to_value(&doc)
            .map_err(|e| AppError::Calculation(format!("failed to serialize risk document: {e}")))?;
        store::cache_risk(&ctx, rraid, &serialized)?;
    }

    Ok(doc)
}

/// Scans for RRAs whose cached risk is missing or older than the
/// configured sweep cadence and recomputes each one, matching
/// `riskCacheGetRRAs`'s `LEFT OUTER JOIN ... GROUP BY` staleness query.
pub fn sweep_stale(state: &AppState) -> Result<usize, AppError> {
    let cadence = chrono::Duration::from_std(state.config.risk_cache_every())
        .unwrap_or_else(|_| chrono::Duration::minutes(15));
    let cutoff = Utc::now() - cadence;

    let stale_ids = {
        let ctx = state.op("riskcache.scan");
        store::stale_or_missing_rras(&ctx, cutoff)?
    };

    let count = stale_ids.len();
    for rraid in stale_ids {
        if let Err(e) = risk_for_rra(state, rraid, false) {
            tracing::error!(rraid, error = %e, "risk cache refresh failed");
        }
    }
    Ok(count)
}
