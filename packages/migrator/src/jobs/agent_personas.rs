//! Moves extended travel-agent attributes into the identity persona table
//! and the agent referral settings into the umrah database.
//!
//! Writes go to two databases, so the job holds one transaction per target
//! and commits both only after the whole loop finishes. The persona table
//! is widened up front with the agent columns the target schema lacks.
//!
//! Duplicate handling follows the target's unique keys: a phone number or
//! referral code already owned by another persona is cleared on this row
//! and recorded in the summary.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::warn;
use uuid::Uuid;

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};
use crate::text;

const WIDEN_PERSONA: &[&str] = &[
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS travel_id UUID"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS "desc" TEXT"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS web_visit INTEGER"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS activated_at TIMESTAMP WITH TIME ZONE"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS parent_id UUID"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS bdm_user_id UUID"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS alias VARCHAR(50)"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS nik VARCHAR(20)"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS instagram VARCHAR(255)"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS account_bank VARCHAR(255)"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS account_number VARCHAR(255)"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS account_name VARCHAR(255)"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS city_id UUID"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS approved_by UUID"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS approved_at TIMESTAMP WITH TIME ZONE"#,
];

#[derive(Debug, FromRow)]
struct LegacyAgent {
    travel_id: Option<String>,
    phone: Option<String>,
    desc: Option<String>,
    code: Option<String>,
    fee: Option<f64>,
    web_visit: Option<i64>,
    activated_at: Option<DateTime<Utc>>,
    discount: Option<f64>,
    parent_id: Option<String>,
    fee_type: Option<String>,
    discount_type: Option<String>,
    rda_id: Option<String>,
    alias: Option<String>,
    nik: Option<String>,
    instagram: Option<String>,
    account_bank: Option<String>,
    account_number: Option<String>,
    account_name: Option<String>,
    address: Option<String>,
    city_id: Option<String>,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

/// Fee and discount types default to `nominal`, lowercased and truncated
/// to the target column width.
fn normalize_rate_type(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => text::truncate(&v.to_lowercase(), 12),
        _ => "nominal".to_string(),
    }
}

fn parse_uuid(value: Option<&String>) -> Option<Uuid> {
    value.and_then(|v| v.parse().ok())
}

pub struct AgentPersonas;

#[async_trait]
impl TransferJob for AgentPersonas {
    fn name(&self) -> &'static str {
        "agent-personas"
    }

    fn description(&self) -> &'static str {
        "Move travel-agent profile attributes and referral settings into the target schemas"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Processing agent personas..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user" WHERE role = 'agent'"#)
            .fetch_one(&ctx.db.identity)
            .await
            .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let mut identity_tx = ctx
            .db
            .identity
            .begin()
            .await
            .context("failed to start identity transaction")?;
        let mut umrah_tx = ctx
            .db
            .umrah
            .begin()
            .await
            .context("failed to start umrah transaction")?;

        for statement in WIDEN_PERSONA {
            sqlx::query(statement)
                .execute(&mut *identity_tx)
                .await
                .context("failed to widen user_persona")?;
        }

        let user_ids: Vec<String> =
            sqlx::query_scalar(r#"SELECT id FROM "user" WHERE role = 'agent'"#)
                .fetch_all(&ctx.db.identity)
                .await
                .context("failed to query agent users")?;

        for user_id in user_ids {
            let agent: Option<LegacyAgent> = match sqlx::query_as(
                r#"
                SELECT
                    travel_id, phone, "desc", code, fee, web_visit,
                    activated_at, discount, parent_id, fee_type,
                    discount_type, rda_id, alias, nik, instagram,
                    account_bank, account_number, account_name,
                    address, city_id, approved_by, approved_at,
                    created_at, updated_at
                FROM td_travel_agent WHERE user_id = $1
                "#,
            )
            .bind(&user_id)
            .fetch_optional(&ctx.db.legacy)
            .await
            {
                Ok(agent) => agent,
                Err(err) => {
                    warn!(%user_id, %err, "legacy agent lookup failed");
                    report.failed();
                    continue;
                }
            };

            let Some(agent) = agent else {
                report.skipped();
                continue;
            };

            // Phone numbers are unique per persona; a clash clears ours.
            let mut phone = agent.phone.clone().filter(|p| !p.is_empty());
            if let Some(number) = phone.clone() {
                let clashes: i64 = match sqlx::query_scalar(
                    r#"SELECT COUNT(*) FROM "user_persona" WHERE phone_number = $1 AND id != $2"#,
                )
                .bind(&number)
                .bind(&user_id)
                .fetch_one(&mut *identity_tx)
                .await
                {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(%user_id, %err, "duplicate phone check failed");
                        report.failed();
                        continue;
                    }
                };
                if clashes > 0 {
                    report.note("Duplicate Phone Numbers", format!("{user_id} | {number}"));
                    phone = None;
                }
            }
            let phone = phone.map(|p| text::truncate(&p, 16));

            let mut code = agent.code.clone().filter(|c| !c.is_empty());
            if let Some(referral) = code.clone() {
                let clashes: i64 = match sqlx::query_scalar(
                    r#"SELECT COUNT(*) FROM "user_persona" WHERE code = $1 AND id != $2"#,
                )
                .bind(&referral)
                .bind(&user_id)
                .fetch_one(&mut *identity_tx)
                .await
                {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(%user_id, %err, "duplicate code check failed");
                        report.failed();
                        continue;
                    }
                };
                if clashes > 0 {
                    warn!(%user_id, code = %referral, "duplicate referral code, clearing");
                    report.note("Duplicate Referral Codes", format!("{user_id} | {referral}"));
                    code = None;
                }
            }

            // Referral settings live in the umrah database, keyed by code.
            if let Some(referral) = &code {
                let referral_code = text::truncate(referral, 8);

                let exists: i64 = match sqlx::query_scalar(
                    r#"SELECT COUNT(*) FROM "agent_setting" WHERE referral_code = $1"#,
                )
                .bind(&referral_code)
                .fetch_one(&mut *umrah_tx)
                .await
                {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(%user_id, %err, "referral setting check failed");
                        report.failed();
                        continue;
                    }
                };

                if exists == 0 {
                    let fee_amount = agent.fee.map(|f| f.round() as i32).unwrap_or(0);
                    let discount_amount = agent.discount.map(|d| d.round() as i32).unwrap_or(0);
                    let created_at = agent.created_at.unwrap_or_else(Utc::now);
                    let modified_at = agent.updated_at.unwrap_or_else(Utc::now);

                    let inserted = sqlx::query(
                        r#"
                        INSERT INTO "agent_setting" (
                            referral_code, fee_type, fee_amount,
                            discount_type, discount_amount, created_at,
                            modified_at, created_by, modified_by
                        ) VALUES (
                            $1, $2, $3, $4, $5, $6, $7, $8, NULL
                        )
                        "#,
                    )
                    .bind(&referral_code)
                    .bind(normalize_rate_type(agent.fee_type.as_deref()))
                    .bind(fee_amount)
                    .bind(normalize_rate_type(agent.discount_type.as_deref()))
                    .bind(discount_amount)
                    .bind(created_at)
                    .bind(modified_at)
                    .bind(&ctx.defaults.actor)
                    .execute(&mut *umrah_tx)
                    .await;

                    match inserted {
                        Ok(_) => report.bump("Referral settings created"),
                        Err(err) => {
                            warn!(%user_id, %err, "failed to insert referral setting");
                            report.failed();
                            continue;
                        }
                    }
                }
            }

            let exists: i64 =
                match sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user_persona" WHERE id = $1"#)
                    .bind(&user_id)
                    .fetch_one(&mut *identity_tx)
                    .await
                {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(%user_id, %err, "persona existence check failed");
                        report.failed();
                        continue;
                    }
                };

            let travel_id = parse_uuid(agent.travel_id.as_ref());
            let parent_id = parse_uuid(agent.parent_id.as_ref());
            let bdm_user_id = parse_uuid(agent.rda_id.as_ref());
            let city_id = parse_uuid(agent.city_id.as_ref());
            let approved_by = parse_uuid(agent.approved_by.as_ref());
            let alias = agent.alias.clone().filter(|a| !a.is_empty());

            let result = if exists > 0 {
                sqlx::query(
                    r#"
                    UPDATE "user_persona" SET
                        phone_number = $2,
                        travel_id = COALESCE($3, travel_id),
                        "desc" = $4,
                        web_visit = $5,
                        activated_at = $6,
                        parent_id = $7,
                        bdm_user_id = $8,
                        alias = $9,
                        nik = $10,
                        instagram = $11,
                        account_bank = $12,
                        account_number = $13,
                        account_name = $14,
                        address = $15,
                        city_id = $16,
                        approved_by = COALESCE($17, approved_by),
                        approved_at = $18,
                        code = NULLIF($19, ''),
                        fee_type = $20,
                        fee = $21,
                        discount_type = $22,
                        discount = $23
                    WHERE id = $1
                    "#,
                )
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO "user_persona" (
                        id, phone_number, travel_id, "desc",
                        web_visit, activated_at, parent_id,
                        bdm_user_id, alias, nik, instagram,
                        account_bank, account_number, account_name,
                        address, city_id, approved_by, approved_at,
                        code, fee_type, fee, discount_type, discount
                    ) VALUES (
                        $1, $2, $3, $4, $5, $6, $7, $8, $9,
                        $10, $11, $12, $13, $14, $15, $16, $17, $18,
                        NULLIF($19, ''), $20, $21, $22, $23
                    )
                    "#,
                )
            }
            .bind(&user_id)
            .bind(&phone)
            .bind(travel_id)
            .bind(&agent.desc)
            .bind(agent.web_visit.map(|v| v as i32))
            .bind(agent.activated_at)
            .bind(parent_id)
            .bind(bdm_user_id)
            .bind(&alias)
            .bind(&agent.nik)
            .bind(&agent.instagram)
            .bind(&agent.account_bank)
            .bind(&agent.account_number)
            .bind(&agent.account_name)
            .bind(&agent.address)
            .bind(city_id)
            .bind(approved_by)
            .bind(agent.approved_at)
            .bind(code.clone().unwrap_or_default())
            .bind(&agent.fee_type)
            .bind(agent.fee)
            .bind(&agent.discount_type)
            .bind(agent.discount)
            .execute(&mut *identity_tx)
            .await;

            match result {
                Ok(_) if exists > 0 => report.updated(),
                Ok(_) => report.transferred(),
                Err(err) => {
                    warn!(%user_id, %err, "failed to write agent persona");
                    report.failed();
                }
            }
        }

        if ctx.dry_run {
            identity_tx
                .rollback()
                .await
                .context("failed to roll back identity transaction")?;
            umrah_tx
                .rollback()
                .await
                .context("failed to roll back umrah transaction")?;
        } else {
            identity_tx
                .commit()
                .await
                .context("failed to commit identity transaction")?;
            umrah_tx
                .commit()
                .await
                .context("failed to commit umrah transaction")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_types_default_to_nominal() {
        assert_eq!(normalize_rate_type(None), "nominal");
        assert_eq!(normalize_rate_type(Some("")), "nominal");
    }

    #[test]
    fn rate_types_are_lowercased_and_truncated() {
        assert_eq!(normalize_rate_type(Some("PERCENTAGE")), "percentage");
        assert_eq!(
            normalize_rate_type(Some("a-very-long-rate-type")),
            "a-very-long-"
        );
    }

    #[test]
    fn uuids_parse_or_fall_away() {
        let valid = "643aaa6d-7caa-4c3c-99b5-d062447c3d3a".to_string();
        assert!(parse_uuid(Some(&valid)).is_some());
        assert!(parse_uuid(Some(&"not-a-uuid".to_string())).is_none());
        assert!(parse_uuid(None).is_none());
    }
}
