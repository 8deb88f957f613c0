// =============================================================================
// Module: SQLite store
// =============================================================================
//
//! Connection setup, schema initialization, and the data-access functions
//! used by the HTTP handlers, the interlink engine, and the risk
//! calculator. Every function takes an [`OpContext`] rather than a bare
//! connection, so callers get correlation-id logging and transaction
//! semantics for free.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::AppError;
use crate::op_context::OpContext;
use crate::types::{
    Asset, AssetGroup, AssetType, DataClass, Indicator, Label, Owner, Rra, RraCell, RraHeader,
};

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assetgroup (
    assetgroupid INTEGER PRIMARY KEY,
    name         TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS assetowners (
    ownerid        INTEGER PRIMARY KEY,
    operator       TEXT NOT NULL,
    team           TEXT NOT NULL,
    UNIQUE(operator, team)
);

CREATE TABLE IF NOT EXISTS asset (
    assetid        INTEGER PRIMARY KEY,
    assettype      TEXT NOT NULL,
    name           TEXT NOT NULL,
    zone           TEXT NOT NULL DEFAULT '',
    assetgroupid   INTEGER REFERENCES assetgroup(assetgroupid),
    ownerid        INTEGER REFERENCES assetowners(ownerid),
    triageoverride TEXT,
    lastindicator  TEXT,
    UNIQUE(assettype, name, zone)
);

CREATE TABLE IF NOT EXISTS indicator (
    indicatorid INTEGER PRIMARY KEY,
    assetid     INTEGER NOT NULL REFERENCES asset(assetid),
    timestamp   TEXT NOT NULL,
    eventsource TEXT NOT NULL,
    likelihood  TEXT NOT NULL,
    details     TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_indicator_asset ON indicator(assetid);

CREATE TABLE IF NOT EXISTS rra (
    rraid             INTEGER PRIMARY KEY,
    service           TEXT NOT NULL,
    lastupdated       TEXT NOT NULL,
    datadefault       TEXT NOT NULL DEFAULT 'unknown',
    avail_rep_impact  TEXT NOT NULL DEFAULT 'unknown',
    avail_rep_prob    TEXT NOT NULL DEFAULT 'unknown',
    avail_prod_impact TEXT NOT NULL DEFAULT 'unknown',
    avail_prod_prob   TEXT NOT NULL DEFAULT 'unknown',
    avail_fin_impact  TEXT NOT NULL DEFAULT 'unknown',
    avail_fin_prob    TEXT NOT NULL DEFAULT 'unknown',
    integ_rep_impact  TEXT NOT NULL DEFAULT 'unknown',
    integ_rep_prob    TEXT NOT NULL DEFAULT 'unknown',
    integ_prod_impact TEXT NOT NULL DEFAULT 'unknown',
    integ_prod_prob   TEXT NOT NULL DEFAULT 'unknown',
    integ_fin_impact  TEXT NOT NULL DEFAULT 'unknown',
    integ_fin_prob    TEXT NOT NULL DEFAULT 'unknown',
    confi_rep_impact  TEXT NOT NULL DEFAULT 'unknown',
    confi_rep_prob    TEXT NOT NULL DEFAULT 'unknown',
    confi_prod_impact TEXT NOT NULL DEFAULT 'unknown',
    confi_prod_prob   TEXT NOT NULL DEFAULT 'unknown',
    confi_fin_impact  TEXT NOT NULL DEFAULT 'unknown',
    confi_fin_prob    TEXT NOT NULL DEFAULT 'unknown',
    rawdocument       TEXT NOT NULL DEFAULT '{}',
    UNIQUE(service, lastupdated)
);

CREATE TABLE IF NOT EXISTS rra_assetgroup (
    rraid        INTEGER NOT NULL REFERENCES rra(rraid),
    assetgroupid INTEGER NOT NULL REFERENCES assetgroup(assetgroupid),
    UNIQUE(rraid, assetgroupid)
);

CREATE TABLE IF NOT EXISTS risk (
    id        INTEGER PRIMARY KEY,
    rraid     INTEGER NOT NULL REFERENCES rra(rraid),
    timestamp TEXT NOT NULL,
    risk      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_risk_rraid_timestamp ON risk(rraid, timestamp);

CREATE TABLE IF NOT EXISTS apikey (
    id             INTEGER PRIMARY KEY,
    name           TEXT NOT NULL UNIQUE,
    keyhash        TEXT NOT NULL UNIQUE,
    readrisk       INTEGER NOT NULL DEFAULT 0,
    readowner      INTEGER NOT NULL DEFAULT 0,
    writeindicator INTEGER NOT NULL DEFAULT 0,
    writerra       INTEGER NOT NULL DEFAULT 0
);
";

/// Opens a connection with the store's standard pragmas: WAL journaling,
/// a busy timeout so concurrent writers back off instead of erroring, and
/// foreign key enforcement. Also registers the `REGEXP` scalar function
/// the interlink rule engine needs for `name ~* pattern` matching.
pub fn connect(path: &str) -> Result<Connection, AppError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    register_regexp(&conn)?;
    Ok(conn)
}

pub(crate) fn register_regexp(conn: &Connection) -> Result<(), AppError> {
    conn.create_scalar_function(
        "regexp",
        2,
        rusqlite::functions::FunctionFlags::SQLITE_DETERMINISTIC
            | rusqlite::functions::FunctionFlags::SQLITE_UTF8,
        |ctx| {
            let pattern = ctx.get::<String>(0)?;
            let text = ctx.get::<String>(1)?;
            let re = regex::RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
            Ok(re.is_match(&text))
        },
    )?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(SCHEMA)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

// -----------------------------------------------------------------------
// Assets
// -----------------------------------------------------------------------

/// Finds or creates the asset identified by `(asset_type, name, zone)`.
/// Hostname names are case-folded before the lookup/insert so that
/// `WWW.Example.com` and `www.example.com` resolve to the same asset.
/// Returns the asset id.
pub fn resolve_asset(
    ctx: &OpContext<'_>,
    asset_type: AssetType,
    name: &str,
    zone: &str,
) -> Result<i64, AppError> {
    if name.trim().is_empty() || zone.trim().is_empty() {
        return Err(AppError::Invalid(
            "asset type, name, and zone are all required".into(),
        ));
    }
    let name = match asset_type {
        AssetType::Hostname => name.to_ascii_lowercase(),
        AssetType::Website => name.to_string(),
    };

    ctx.execute(
        "INSERT INTO asset (assettype, name, zone)
         SELECT ?1, ?2, ?3 WHERE NOT EXISTS (
             SELECT 1 FROM asset WHERE assettype=?1 AND name=?2 AND zone=?3
         )",
        params![asset_type.as_str(), name, zone],
    )?;
    let id: i64 = ctx.query_row(
        "SELECT assetid FROM asset WHERE assettype=?1 AND name=?2 AND zone=?3",
        params![asset_type.as_str(), name, zone],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Appends an indicator to an asset and advances its `lastindicator`
/// timestamp if the new indicator is more recent.
pub fn append_indicator(
    ctx: &OpContext<'_>,
    asset_id: i64,
    timestamp: DateTime<Utc>,
    event_source: &str,
    likelihood: Label,
    details: &serde_json::Value,
) -> Result<i64, AppError> {
    ctx.execute(
        "INSERT INTO indicator (assetid, timestamp, eventsource, likelihood, details)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            asset_id,
            timestamp.to_rfc3339(),
            event_source,
            likelihood.as_str(),
            details.to_string(),
        ],
    )?;
    let id = ctx.last_insert_rowid();
    ctx.execute(
        "UPDATE asset SET lastindicator=?1
         WHERE assetid=?2 AND (lastindicator IS NULL OR lastindicator < ?1)",
        params![timestamp.to_rfc3339(), asset_id],
    )?;
    Ok(id)
}

fn row_to_owner(
    operator: Option<String>,
    team: Option<String>,
    triageoverride: Option<String>,
) -> Owner {
    match (operator, team) {
        (Some(operator), Some(team)) => {
            let triage_key = triageoverride.unwrap_or_else(|| format!("{operator}-{team}"));
            Owner {
                operator: Some(operator),
                team: Some(team),
                triage_key: Some(triage_key),
            }
        }
        _ => Owner::unset(),
    }
}

/// Looks up a single asset by id, including its owner (with triage key
/// fallback per spec.md §4.B) and its current indicator set.
pub fn get_asset(ctx: &OpContext<'_>, id: i64) -> Result<Option<Asset>, AppError> {
    let row = ctx
        .query_row(
            "SELECT asset.assettype, asset.name, asset.zone, asset.assetgroupid,
                    asset.triageoverride, asset.lastindicator,
                    assetowners.operator, assetowners.team
             FROM asset
             LEFT OUTER JOIN assetowners ON asset.ownerid = assetowners.ownerid
             WHERE asset.assetid=?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((assettype, name, zone, group_id, triageoverride, last_indicator, operator, team)) =
        row
    else {
        return Ok(None);
    };

    let indicators = latest_indicators(ctx, id)?;

    Ok(Some(Asset {
        id,
        asset_type: AssetType::parse(&assettype)?,
        name,
        zone,
        group_id,
        owner: row_to_owner(operator, team, triageoverride),
        last_indicator: last_indicator
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| AppError::Database(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))?,
        indicators,
    }))
}

fn row_to_indicator(row: &rusqlite::Row, asset_id: i64) -> rusqlite::Result<Indicator> {
    let ts: String = row.get(1)?;
    let likelihood: String = row.get(3)?;
    let details: String = row.get(4)?;
    Ok(Indicator {
        id: row.get(0)?,
        asset_id,
        timestamp: DateTime::parse_from_rfc3339(&ts)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e)))?,
        event_source: row.get::<_, String>(2)?,
        likelihood: Label::parse(&likelihood)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?,
        details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
    })
}

/// Returns, for each distinct event source ever recorded for `asset_id`,
/// the single indicator row with the maximum timestamp — the "current
/// indicator set" per spec.md §3/§4.B. Order of the returned list is
/// unspecified.
pub fn latest_indicators(ctx: &OpContext<'_>, asset_id: i64) -> Result<Vec<Indicator>, AppError> {
    let mut stmt = ctx.prepare(
        "SELECT i.indicatorid, i.timestamp, i.eventsource, i.likelihood, i.details
         FROM indicator i
         INNER JOIN (
             SELECT eventsource, MAX(timestamp) AS maxts
             FROM indicator WHERE assetid=?1 GROUP BY eventsource
         ) m ON i.eventsource = m.eventsource AND i.timestamp = m.maxts
         WHERE i.assetid=?1
         GROUP BY i.eventsource",
    )?;
    let rows = stmt.query_map(params![asset_id], |row| row_to_indicator(row, asset_id))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Returns every asset for which an indicator from `source` has ever been
/// recorded, with each asset's `indicators` filtered to rows from that
/// source only. The read side consumed by downstream correlation tooling
/// per spec.md §4.B.
pub fn indicators_by_event_source(
    ctx: &OpContext<'_>,
    source: &str,
) -> Result<Vec<Asset>, AppError> {
    let mut stmt = ctx.prepare(
        "SELECT DISTINCT assetid FROM indicator WHERE eventsource=?1",
    )?;
    let ids = stmt.query_map(params![source], |row| row.get::<_, i64>(0))?;
    let asset_ids: Vec<i64> = ids.collect::<Result<_, _>>()?;
    drop(stmt);

    let mut out = Vec::new();
    for asset_id in asset_ids {
        let Some(mut asset) = get_asset(ctx, asset_id)? else {
            continue;
        };
        let mut stmt = ctx.prepare(
            "SELECT indicatorid, timestamp, eventsource, likelihood, details
             FROM indicator WHERE assetid=?1 AND eventsource=?2 ORDER BY timestamp DESC",
        )?;
        let rows = stmt.query_map(params![asset_id, source], |row| {
            row_to_indicator(row, asset_id)
        })?;
        asset.indicators = rows.collect::<Result<_, _>>()?;
        out.push(asset);
    }
    Ok(out)
}

/// Returns `(name, assettype, zone, operator, team, triagekey)` rows for
/// every asset, in name order, for the `/owners` text report.
pub fn list_asset_owners(
    ctx: &OpContext<'_>,
) -> Result<Vec<(String, String, String, String, String, String)>, AppError> {
    let mut stmt = ctx.prepare(
        "SELECT asset.name, asset.assettype, asset.zone,
                assetowners.operator, assetowners.team, asset.triageoverride
         FROM asset
         LEFT OUTER JOIN assetowners ON asset.ownerid = assetowners.ownerid
         ORDER BY asset.name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (name, assettype, zone, operator, team, triageoverride) = row?;
        let owner = row_to_owner(operator, team, triageoverride);
        out.push((
            name,
            assettype,
            zone,
            owner.operator.unwrap_or_else(|| "unset".into()),
            owner.team.unwrap_or_else(|| "unset".into()),
            owner.triage_key.unwrap_or_else(|| "unset-unset".into()),
        ));
    }
    Ok(out)
}

/// Looks up ownership for the first hostname asset matching `hostname`
/// (case-folded, matching the lookup key stored by `resolve_asset`).
pub fn get_owner_for_hostname(ctx: &OpContext<'_>, hostname: &str) -> Result<Owner, AppError> {
    let hostname = hostname.to_ascii_lowercase();
    let row = ctx
        .query_row(
            "SELECT assetowners.operator, assetowners.team, asset.triageoverride
             FROM asset
             LEFT OUTER JOIN assetowners ON asset.ownerid = assetowners.ownerid
             WHERE asset.assettype='hostname' AND asset.name=?1
             ORDER BY asset.assetid LIMIT 1",
            params![hostname],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((operator, team, triageoverride)) => Ok(row_to_owner(operator, team, triageoverride)),
        None => Err(AppError::NotFound(format!("no such asset: {hostname}"))),
    }
}

pub fn get_asset_group(ctx: &OpContext<'_>, id: i64) -> Result<Option<AssetGroup>, AppError> {
    let name: Option<String> = ctx
        .query_row(
            "SELECT name FROM assetgroup WHERE assetgroupid=?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(name) = name else { return Ok(None) };

    let assets = list_assets_in_group(ctx, id)?;
    Ok(Some(AssetGroup { id, name, assets }))
}

fn list_assets_in_group(ctx: &OpContext<'_>, group_id: i64) -> Result<Vec<Asset>, AppError> {
    let mut stmt =
        ctx.prepare("SELECT assetid FROM asset WHERE assetgroupid=?1 ORDER BY name")?;
    let ids = stmt.query_map(params![group_id], |row| row.get::<_, i64>(0))?;

    let mut out = Vec::new();
    for id in ids {
        if let Some(asset) = get_asset(ctx, id?)? {
            out.push(asset);
        }
    }
    Ok(out)
}

pub fn list_asset_groups(ctx: &OpContext<'_>) -> Result<Vec<AssetGroup>, AppError> {
    let mut stmt = ctx.prepare("SELECT assetgroupid FROM assetgroup ORDER BY name")?;
    let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    let mut out = Vec::new();
    for id in ids {
        if let Some(group) = get_asset_group(ctx, id?)? {
            out.push(group);
        }
    }
    Ok(out)
}

// -----------------------------------------------------------------------
// RRAs
// -----------------------------------------------------------------------

const RRA_COLUMNS: &str = "rraid, service, lastupdated, datadefault,
    avail_rep_impact, avail_rep_prob, avail_prod_impact, avail_prod_prob,
    avail_fin_impact, avail_fin_prob, integ_rep_impact, integ_rep_prob,
    integ_prod_impact, integ_prod_prob, integ_fin_impact, integ_fin_prob,
    confi_rep_impact, confi_rep_prob, confi_prod_impact, confi_prod_prob,
    confi_fin_impact, confi_fin_prob, rawdocument";

fn cell(impact: &str, prob: &str) -> Result<RraCell, AppError> {
    Ok(RraCell {
        impact: Label::parse(impact)?,
        probability: Label::parse(prob)?,
    })
}

fn row_to_rra(row: &rusqlite::Row) -> rusqlite::Result<Rra> {
    let lastupdated: String = row.get(2)?;
    let datadefault: String = row.get(3)?;
    let rawdocument: String = row.get(22)?;

    let get = |i: usize| row.get::<_, String>(i);

    Ok(Rra {
        id: row.get(0)?,
        service_name: row.get(1)?,
        last_updated: DateTime::parse_from_rfc3339(&lastupdated)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        default_data_class: DataClass::normalize(&datadefault),
        availability_reputation: cell(&get(4)?, &get(5)?).unwrap_or(RraCell {
            impact: Label::Unknown,
            probability: Label::Unknown,
        }),
        availability_productivity: cell(&get(6)?, &get(7)?).unwrap_or(RraCell {
            impact: Label::Unknown,
            probability: Label::Unknown,
        }),
        availability_financial: cell(&get(8)?, &get(9)?).unwrap_or(RraCell {
            impact: Label::Unknown,
            probability: Label::Unknown,
        }),
        integrity_reputation: cell(&get(10)?, &get(11)?).unwrap_or(RraCell {
            impact: Label::Unknown,
            probability: Label::Unknown,
        }),
        integrity_productivity: cell(&get(12)?, &get(13)?).unwrap_or(RraCell {
            impact: Label::Unknown,
            probability: Label::Unknown,
        }),
        integrity_financial: cell(&get(14)?, &get(15)?).unwrap_or(RraCell {
            impact: Label::Unknown,
            probability: Label::Unknown,
        }),
        confidentiality_reputation: cell(&get(16)?, &get(17)?).unwrap_or(RraCell {
            impact: Label::Unknown,
            probability: Label::Unknown,
        }),
        confidentiality_productivity: cell(&get(18)?, &get(19)?).unwrap_or(RraCell {
            impact: Label::Unknown,
            probability: Label::Unknown,
        }),
        confidentiality_financial: cell(&get(20)?, &get(21)?).unwrap_or(RraCell {
            impact: Label::Unknown,
            probability: Label::Unknown,
        }),
        raw_document: serde_json::from_str(&rawdocument).unwrap_or(serde_json::Value::Null),
        groups: Vec::new(),
    })
}

/// Idempotently inserts an RRA document: a `(service, lastupdated)` pair
/// that already exists is a no-op, matching the upsert semantics of
/// `serviceUpdateRRA` in the original service.
pub fn upsert_rra(
    ctx: &OpContext<'_>,
    service: &str,
    last_updated: DateTime<Utc>,
    data_class: DataClass,
    cells: &[RraCell; 9],
    raw_document: &serde_json::Value,
) -> Result<i64, AppError> {
    ctx.execute(
        "INSERT INTO rra (service, lastupdated, datadefault,
            avail_rep_impact, avail_rep_prob, avail_prod_impact, avail_prod_prob,
            avail_fin_impact, avail_fin_prob, integ_rep_impact, integ_rep_prob,
            integ_prod_impact, integ_prod_prob, integ_fin_impact, integ_fin_prob,
            confi_rep_impact, confi_rep_prob, confi_prod_impact, confi_prod_prob,
            confi_fin_impact, confi_fin_prob, rawdocument)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22
         WHERE NOT EXISTS (SELECT 1 FROM rra WHERE service=?1 AND lastupdated=?2)",
        params![
            service,
            last_updated.to_rfc3339(),
            data_class.as_str(),
            cells[0].impact.as_str(),
            cells[0].probability.as_str(),
            cells[1].impact.as_str(),
            cells[1].probability.as_str(),
            cells[2].impact.as_str(),
            cells[2].probability.as_str(),
            cells[3].impact.as_str(),
            cells[3].probability.as_str(),
            cells[4].impact.as_str(),
            cells[4].probability.as_str(),
            cells[5].impact.as_str(),
            cells[5].probability.as_str(),
            cells[6].impact.as_str(),
            cells[6].probability.as_str(),
            cells[7].impact.as_str(),
            cells[7].probability.as_str(),
            cells[8].impact.as_str(),
            cells[8].probability.as_str(),
            raw_document.to_string(),
        ],
    )?;
    let id: i64 = ctx.query_row(
        "SELECT rraid FROM rra WHERE service=?1 AND lastupdated=?2",
        params![service, last_updated.to_rfc3339()],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get_rra(ctx: &OpContext<'_>, id: i64) -> Result<Option<Rra>, AppError> {
    let sql = format!("SELECT {RRA_COLUMNS} FROM rra WHERE rraid=?1");
    let mut rra = ctx
        .query_row(&sql, params![id], row_to_rra)
        .optional()?;
    if let Some(rra) = rra.as_mut() {
        rra.groups = resolve_support_groups(ctx, id)?;
    }
    Ok(rra)
}

fn resolve_support_groups(ctx: &OpContext<'_>, rraid: i64) -> Result<Vec<AssetGroup>, AppError> {
    let mut stmt =
        ctx.prepare("SELECT assetgroupid FROM rra_assetgroup WHERE rraid=?1")?;
    let ids = stmt.query_map(params![rraid], |row| row.get::<_, i64>(0))?;
    let mut out = Vec::new();
    for id in ids {
        if let Some(group) = get_asset_group(ctx, id?)? {
            if !group.name.is_empty() {
                out.push(group);
            }
        }
    }
    Ok(out)
}

/// Returns the most recently updated RRA per distinct service name,
/// matching the "latest per service" query used throughout the original
/// service's RRA and risk endpoints.
pub fn list_latest_rras(ctx: &OpContext<'_>) -> Result<Vec<RraHeader>, AppError> {
    let mut stmt = ctx.prepare(
        "SELECT rraid, service, lastupdated, datadefault FROM rra x
         WHERE lastupdated = (SELECT MAX(lastupdated) FROM rra y WHERE x.service = y.service)
         ORDER BY service",
    )?;
    let rows = stmt.query_map([], |row| {
        let lastupdated: String = row.get(2)?;
        let datadefault: String = row.get(3)?;
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            lastupdated,
            datadefault,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, service_name, lastupdated, datadefault) = row?;
        out.push(RraHeader {
            id,
            service_name,
            last_updated: DateTime::parse_from_rfc3339(&lastupdated)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            default_data_class: DataClass::normalize(&datadefault),
        });
    }
    Ok(out)
}

// -----------------------------------------------------------------------
// Risk cache
// -----------------------------------------------------------------------

/// Looks up the most recent cached risk document for an RRA, ignoring
/// entries older than `ttl`.
pub fn latest_risk(
    ctx: &OpContext<'_>,
    rraid: i64,
    ttl: chrono::Duration,
) -> Result<Option<serde_json::Value>, AppError> {
    let row: Option<(String, String)> = ctx
        .query_row(
            "SELECT timestamp, risk FROM risk WHERE rraid=?1 ORDER BY timestamp DESC LIMIT 1",
            params![rraid],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((timestamp, risk)) = row else {
        return Ok(None);
    };

    let ts = DateTime::parse_from_rfc3339(&timestamp)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| AppError::Database(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))?;
    if ts < Utc::now() - ttl {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&risk).map_err(|e| {
        AppError::Calculation(format!("corrupt cached risk document: {e}"))
    })?))
}

pub fn cache_risk(ctx: &OpContext<'_>, rraid: i64, risk: &serde_json::Value) -> Result<(), AppError> {
    ctx.execute(
        "INSERT INTO risk (rraid, timestamp, risk) VALUES (?1, ?2, ?3)",
        params![rraid, Utc::now().to_rfc3339(), risk.to_string()],
    )?;
    Ok(())
}

/// Finds RRA ids whose most recent cache entry is missing or older than
/// `cutoff`, via a `LEFT OUTER JOIN` + `GROUP BY` so that RRAs with no
/// cache rows at all are included alongside stale ones.
pub fn stale_or_missing_rras(
    ctx: &OpContext<'_>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<i64>, AppError> {
    let mut stmt = ctx.prepare(
        "SELECT rra.rraid, MAX(risk.timestamp) as ts
         FROM rra
         LEFT OUTER JOIN risk ON rra.rraid = risk.rraid
         GROUP BY rra.rraid",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (rraid, ts) = row?;
        let stale = match ts {
            None => true,
            Some(ts) => DateTime::parse_from_rfc3339(&ts)
                .map(|d| d.with_timezone(&Utc) <= cutoff)
                .unwrap_or(true),
        };
        if stale {
            out.push(rraid);
        }
    }
    Ok(out)
}

// -----------------------------------------------------------------------
// API keys
// -----------------------------------------------------------------------

pub struct ApiKeyRow {
    pub name: String,
    pub read_risk: bool,
    pub read_owner: bool,
    pub write_indicator: bool,
    pub write_rra: bool,
}

/// Looks up an API key by the hex-encoded SHA-256 hash of its presented
/// token.
pub fn lookup_api_key(ctx: &OpContext<'_>, key_hash: &str) -> Result<Option<ApiKeyRow>, AppError> {
    ctx.query_row(
        "SELECT name, readrisk, readowner, writeindicator, writerra
         FROM apikey WHERE keyhash=?1",
        params![key_hash],
        |row| {
            Ok(ApiKeyRow {
                name: row.get(0)?,
                read_risk: row.get::<_, i64>(1)? != 0,
                read_owner: row.get::<_, i64>(2)? != 0,
                write_indicator: row.get::<_, i64>(3)? != 0,
                write_rra: row.get::<_, i64>(4)? != 0,
            })
        },
    )
    .optional()
    .map_err(AppError::from)
}
