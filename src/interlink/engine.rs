// ============================================================================
// SECTION: Reconciliation engine
// ============================================================================
//
// `run_rules` applies a parsed rule set inside a single transaction, in a
// fixed order. Each phase first clears the relationships it owns, then
// repopulates them from the current rule set — so assets and RRAs that
// fall out of every rule lose their old group/owner/service links rather
// than keeping stale ones.

use rusqlite::params;

use crate::error::AppError;
use crate::op_context::OpContext;

use super::parser::InterlinkRule;

pub fn run_rules(ctx: &OpContext<'_>, rules: &[InterlinkRule]) -> Result<(), AppError> {
    asset_group_add(ctx, rules)?;
    owner_add(ctx, rules)?;
    host_group_link(ctx, rules)?;
    host_owner_link(ctx, rules)?;
    website_group_link(ctx, rules)?;
    asset_group_service_link(ctx, rules)?;
    Ok(())
}

fn asset_group_add(ctx: &OpContext<'_>, rules: &[InterlinkRule]) -> Result<(), AppError> {
    let names: Vec<&str> = rules
        .iter()
        .filter_map(|r| match r {
            InterlinkRule::AssetGroupAdd { name } => Some(name.as_str()),
            _ => None,
        })
        .collect();

    for name in &names {
        ctx.execute(
            "INSERT INTO assetgroup (name)
             SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM assetgroup WHERE name=?1)",
            params![name],
        )?;
    }

    let mut stmt = ctx.prepare("SELECT assetgroupid, name FROM assetgroup")?;
    let existing = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut stale = Vec::new();
    for row in existing {
        let (id, name) = row?;
        if !names.contains(&name.as_str()) {
            stale.push(id);
        }
    }
    drop(stmt);

    for id in stale {
        ctx.execute(
            "UPDATE asset SET assetgroupid=NULL WHERE assetgroupid=?1",
            params![id],
        )?;
        ctx.execute("DELETE FROM rra_assetgroup WHERE assetgroupid=?1", params![id])?;
        ctx.execute("DELETE FROM assetgroup WHERE assetgroupid=?1", params![id])?;
    }

    Ok(())
}

fn owner_add(ctx: &OpContext<'_>, rules: &[InterlinkRule]) -> Result<(), AppError> {
    let owners: Vec<(&str, &str)> = rules
        .iter()
        .filter_map(|r| match r {
            InterlinkRule::OwnerAdd { operator, team } => Some((operator.as_str(), team.as_str())),
            _ => None,
        })
        .collect();

    for (operator, team) in &owners {
        ctx.execute(
            "INSERT INTO assetowners (operator, team)
             SELECT ?1, ?2 WHERE NOT EXISTS
                (SELECT 1 FROM assetowners WHERE operator=?1 AND team=?2)",
            params![operator, team],
        )?;
    }

    let mut stmt = ctx.prepare("SELECT ownerid, operator, team FROM assetowners")?;
    let existing = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut stale = Vec::new();
    for row in existing {
        let (id, operator, team) = row?;
        if !owners.contains(&(operator.as_str(), team.as_str())) {
            stale.push(id);
        }
    }
    drop(stmt);

    for id in stale {
        ctx.execute(
            "UPDATE asset SET ownerid=NULL WHERE ownerid=?1",
            params![id],
        )?;
        ctx.execute("DELETE FROM assetowners WHERE ownerid=?1", params![id])?;
    }

    Ok(())
}

fn host_group_link(ctx: &OpContext<'_>, rules: &[InterlinkRule]) -> Result<(), AppError> {
    ctx.execute(
        "UPDATE asset SET assetgroupid=NULL WHERE assettype='hostname'",
        [],
    )?;
    for rule in rules {
        if let InterlinkRule::HostGroupLink { pattern, group } = rule {
            ctx.execute(
                "UPDATE asset SET assetgroupid=(SELECT assetgroupid FROM assetgroup WHERE name=?1)
                 WHERE assettype='hostname' AND name REGEXP ?2",
                params![group, pattern],
            )?;
        }
    }
    Ok(())
}

fn host_owner_link(ctx: &OpContext<'_>, rules: &[InterlinkRule]) -> Result<(), AppError> {
    ctx.execute(
        "UPDATE asset SET ownerid=NULL, triageoverride=NULL WHERE assettype='hostname'",
        [],
    )?;
    for rule in rules {
        if let InterlinkRule::HostOwnerLink {
            pattern,
            operator,
            team,
            triage,
        } = rule
        {
            ctx.execute(
                "UPDATE asset SET ownerid=(SELECT ownerid FROM assetowners WHERE operator=?1 AND team=?2)
                 WHERE assettype='hostname' AND name REGEXP ?3",
                params![operator, team, pattern],
            )?;
            ctx.execute(
                "UPDATE asset SET triageoverride=?1
                 WHERE assettype='hostname' AND name REGEXP ?2",
                params![triage, pattern],
            )?;
        }
    }
    Ok(())
}

fn website_group_link(ctx: &OpContext<'_>, rules: &[InterlinkRule]) -> Result<(), AppError> {
    ctx.execute(
        "UPDATE asset SET assetgroupid=NULL WHERE assettype='website'",
        [],
    )?;
    for rule in rules {
        if let InterlinkRule::WebsiteGroupLink { pattern, group } = rule {
            ctx.execute(
                "UPDATE asset SET assetgroupid=(SELECT assetgroupid FROM assetgroup WHERE name=?1)
                 WHERE assettype='website' AND name REGEXP ?2",
                params![group, pattern],
            )?;
        }
    }
    Ok(())
}

fn asset_group_service_link(ctx: &OpContext<'_>, rules: &[InterlinkRule]) -> Result<(), AppError> {
    ctx.execute("DELETE FROM rra_assetgroup", [])?;
    for rule in rules {
        if let InterlinkRule::AssetGroupServiceLink {
            group_pattern,
            service_pattern,
        } = rule
        {
            let mut stmt = ctx.prepare("SELECT rraid FROM rra WHERE service REGEXP ?1")?;
            let rraids = stmt.query_map(params![service_pattern], |row| row.get::<_, i64>(0))?;
            let rraids: Vec<i64> = rraids.collect::<Result<_, _>>()?;
            drop(stmt);

            for rraid in rraids {
                ctx.execute(
                    "INSERT INTO rra_assetgroup (rraid, assetgroupid)
                     SELECT ?1, assetgroupid FROM assetgroup WHERE name=?2
                     AND NOT EXISTS (
                         SELECT 1 FROM rra_assetgroup
                         WHERE rraid=?1 AND assetgroupid=(SELECT assetgroupid FROM assetgroup WHERE name=?2)
                     )",
                    params![rraid, group_pattern],
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use rusqlite::Connection;

    use crate::interlink::parser::parse_rules;
    use crate::op_context::{CorrelationIdGenerator, OpContext};
    use crate::store;
    use crate::types::AssetType;

    use super::*;

    fn test_ctx<'a>(db: &'a Mutex<Connection>, gen: &CorrelationIdGenerator) -> OpContext<'a> {
        OpContext::new(db, gen, "test")
    }

    fn setup() -> (Mutex<Connection>, CorrelationIdGenerator) {
        let conn = Connection::open_in_memory().unwrap();
        store::init_schema(&conn).unwrap();
        store::register_regexp(&conn).unwrap();
        (Mutex::new(conn), CorrelationIdGenerator::new())
    }

    fn host_ids(ctx: &OpContext<'_>) -> Vec<i64> {
        let mut stmt = ctx.prepare("SELECT assetid FROM asset ORDER BY assetid").unwrap();
        stmt.query_map([], |row| row.get::<_, i64>(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    /// P3: running the same rule file twice leaves the relation tables
    /// byte-identical — no duplicate groups, owners, or links.
    #[test]
    fn rerunning_unchanged_rule_file_is_idempotent() {
        let (db, gen) = setup();
        let ctx = test_ctx(&db, &gen);
        let id = store::resolve_asset(&ctx, AssetType::Hostname, "web1.example.com", "prod").unwrap();

        let rules = parse_rules(
            "add assetgroup webservers\n\
             add owner alice teamweb\n\
             host matches ^web.* link assetgroup webservers\n\
             host matches ^web.* ownership alice teamweb\n",
        )
        .unwrap();

        run_rules(&ctx, &rules).unwrap();
        let assets_after_first = host_ids(&ctx);
        let group_count_first: i64 = ctx
            .query_row("SELECT COUNT(*) FROM assetgroup", [], |r| r.get(0))
            .unwrap();
        let owner_count_first: i64 = ctx
            .query_row("SELECT COUNT(*) FROM assetowners", [], |r| r.get(0))
            .unwrap();

        run_rules(&ctx, &rules).unwrap();
        let assets_after_second = host_ids(&ctx);
        let group_count_second: i64 = ctx
            .query_row("SELECT COUNT(*) FROM assetgroup", [], |r| r.get(0))
            .unwrap();
        let owner_count_second: i64 = ctx
            .query_row("SELECT COUNT(*) FROM assetowners", [], |r| r.get(0))
            .unwrap();

        assert_eq!(assets_after_first, assets_after_second);
        assert_eq!(group_count_first, 1);
        assert_eq!(group_count_first, group_count_second);
        assert_eq!(owner_count_first, 1);
        assert_eq!(owner_count_first, owner_count_second);

        let asset = store::get_asset(&ctx, id).unwrap().unwrap();
        assert_eq!(asset.group_id, Some(1));
        assert_eq!(asset.owner.operator.as_deref(), Some("alice"));
    }

    /// P4: removing an `add assetgroup` rule and its link on the next run
    /// nulls out the group on previously matched assets and drops the row.
    #[test]
    fn removing_a_group_rule_unlinks_and_deletes_it() {
        let (db, gen) = setup();
        let ctx = test_ctx(&db, &gen);
        let id = store::resolve_asset(&ctx, AssetType::Hostname, "web1.example.com", "prod").unwrap();

        let with_group = parse_rules(
            "add assetgroup webservers\n\
             host matches ^web.* link assetgroup webservers\n",
        )
        .unwrap();
        run_rules(&ctx, &with_group).unwrap();
        assert_eq!(store::get_asset(&ctx, id).unwrap().unwrap().group_id, Some(1));

        let without_group = parse_rules("add owner alice teamweb\n").unwrap();
        run_rules(&ctx, &without_group).unwrap();

        assert_eq!(store::get_asset(&ctx, id).unwrap().unwrap().group_id, None);
        let group_count: i64 = ctx
            .query_row("SELECT COUNT(*) FROM assetgroup", [], |r| r.get(0))
            .unwrap();
        assert_eq!(group_count, 0);
    }

    #[test]
    fn triage_override_is_cleared_when_its_rule_disappears() {
        let (db, gen) = setup();
        let ctx = test_ctx(&db, &gen);
        let id = store::resolve_asset(&ctx, AssetType::Hostname, "web1.example.com", "prod").unwrap();

        let with_override = parse_rules(
            "add owner alice teamweb\n\
             host matches ^web.* ownership alice teamweb specialteam\n",
        )
        .unwrap();
        run_rules(&ctx, &with_override).unwrap();
        let asset = store::get_asset(&ctx, id).unwrap().unwrap();
        assert_eq!(asset.owner.triage_key.as_deref(), Some("specialteam"));

        let without_override = parse_rules(
            "add owner alice teamweb\n\
             host matches ^web.* ownership alice teamweb\n",
        )
        .unwrap();
        run_rules(&ctx, &without_override).unwrap();
        let asset = store::get_asset(&ctx, id).unwrap().unwrap();
        assert_eq!(asset.owner.triage_key.as_deref(), Some("alice-teamweb"));
    }
}
