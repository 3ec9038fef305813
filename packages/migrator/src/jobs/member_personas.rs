//! Backfills `user_persona` profile rows from the legacy member table.
//!
//! Phone numbers are unique in the target, so the job preloads every
//! number already in use and clears clashing ones instead of failing the
//! insert. The legacy profile columns the target schema lacks are added
//! up front with `ADD COLUMN IF NOT EXISTS`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::HashMap;
use tracing::warn;

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};
use crate::text;

const WIDEN_PERSONA: &[&str] = &[
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS address TEXT"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS job VARCHAR(255)"#,
    r#"ALTER TABLE "user_persona" ADD COLUMN IF NOT EXISTS dob TIMESTAMP WITH TIME ZONE"#,
];

#[derive(Debug, FromRow)]
struct LegacyProfile {
    phone: Option<String>,
    address: Option<String>,
    gender: Option<String>,
    job: Option<String>,
    pob: Option<String>,
    dob: Option<DateTime<Utc>>,
}

pub struct MemberPersonas;

#[async_trait]
impl TransferJob for MemberPersonas {
    fn name(&self) -> &'static str {
        "member-personas"
    }

    fn description(&self) -> &'static str {
        "Fill user_persona rows from the legacy member profiles"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Processing personas..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user""#)
            .fetch_one(&ctx.db.identity)
            .await
            .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        for statement in WIDEN_PERSONA {
            sqlx::query(statement)
                .execute(&ctx.db.identity)
                .await
                .context("failed to widen user_persona")?;
        }

        // Phone numbers already taken, keyed to their owner.
        let mut used_phones: HashMap<String, String> = sqlx::query_as::<_, (String, String)>(
            r#"SELECT id, phone_number FROM "user_persona" WHERE phone_number IS NOT NULL"#,
        )
        .fetch_all(&ctx.db.identity)
        .await
        .context("failed to query existing phone numbers")?
        .into_iter()
        .filter(|(_, phone)| !phone.is_empty())
        .map(|(id, phone)| (phone, id))
        .collect();

        let user_ids: Vec<String> = sqlx::query_scalar(r#"SELECT id FROM "user""#)
            .fetch_all(&ctx.db.identity)
            .await
            .context("failed to query identity users")?;

        let mut tx = ctx
            .db
            .identity
            .begin()
            .await
            .context("failed to start identity transaction")?;

        for user_id in user_ids {
            let profile: Option<LegacyProfile> = match sqlx::query_as(
                "SELECT phone, address, gender, job, pob, dob FROM td_user WHERE id = $1",
            )
            .bind(&user_id)
            .fetch_optional(&ctx.db.legacy)
            .await
            {
                Ok(profile) => profile,
                Err(err) => {
                    warn!(%user_id, %err, "legacy profile lookup failed");
                    report.failed();
                    continue;
                }
            };

            let Some(profile) = profile else {
                report.skipped();
                continue;
            };

            let exists: i64 =
                match sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user_persona" WHERE id = $1"#)
                    .bind(&user_id)
                    .fetch_one(&mut *tx)
                    .await
                {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(%user_id, %err, "persona existence check failed");
                        report.failed();
                        continue;
                    }
                };

            let mut phone = profile.phone.filter(|p| !p.is_empty());
            if let Some(number) = phone.clone() {
                match used_phones.get(&number).cloned() {
                    Some(owner) if owner != user_id => {
                        report.note(
                            "Duplicate Phone Numbers",
                            format!("{user_id} | {number}"),
                        );
                        phone = None;
                    }
                    Some(_) => {}
                    None => {
                        used_phones.insert(number, user_id.clone());
                    }
                }
            }

            let phone = phone.map(|p| text::truncate(&p, 16));
            let gender = profile.gender.map(|g| text::truncate(&g, 16));
            let born = profile.pob.map(|p| text::truncate(&p, 10));

            let result = if exists > 0 {
                sqlx::query(
                    r#"
                    UPDATE "user_persona" SET
                        phone_number = $2,
                        address = $3,
                        gender = $4,
                        job = $5,
                        born = $6,
                        dob = $7
                    WHERE id = $1
                    "#,
                )
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO "user_persona" (
                        id, phone_number, address, gender,
                        job, born, dob
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
            }
            .bind(&user_id)
            .bind(&phone)
            .bind(&profile.address)
            .bind(&gender)
            .bind(&profile.job)
            .bind(&born)
            .bind(profile.dob)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) if exists > 0 => report.updated(),
                Ok(_) => report.transferred(),
                Err(err) => {
                    warn!(%user_id, %err, "failed to write persona");
                    report.failed();
                }
            }
        }

        if ctx.dry_run {
            tx.rollback()
                .await
                .context("failed to roll back identity transaction")?;
        } else {
            tx.commit()
                .await
                .context("failed to commit identity transaction")?;
        }
        Ok(())
    }
}
