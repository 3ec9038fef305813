//! Backfills phone numbers for BDM users from the legacy `tr_rda` table.
//!
//! The persona row is upserted, so the job is safe to run after
//! `member-personas` has already created rows for these users.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};
use crate::text;

pub struct BdmPersonas;

#[async_trait]
impl TransferJob for BdmPersonas {
    fn name(&self) -> &'static str {
        "bdm-personas"
    }

    fn description(&self) -> &'static str {
        "Backfill persona phone numbers for BDM users from the legacy schema"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Processing BDM personas..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user" WHERE role = 'bdm'"#)
            .fetch_one(&ctx.db.identity)
            .await
            .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let user_ids: Vec<String> = sqlx::query_scalar(r#"SELECT id FROM "user" WHERE role = 'bdm'"#)
            .fetch_all(&ctx.db.identity)
            .await
            .context("failed to query BDM users")?;

        let mut tx = ctx
            .db
            .identity
            .begin()
            .await
            .context("failed to start identity transaction")?;

        for user_id in user_ids {
            // BDM user ids carry over from tr_rda, whose key is numeric.
            let phone: Option<Option<String>> = match sqlx::query_scalar(
                "SELECT phone FROM tr_rda WHERE CAST(id AS VARCHAR(255)) = $1",
            )
            .bind(&user_id)
            .fetch_optional(&ctx.db.legacy)
            .await
            {
                Ok(row) => row,
                Err(err) => {
                    warn!(%user_id, %err, "legacy phone lookup failed");
                    report.failed();
                    continue;
                }
            };

            let Some(phone) = phone else {
                report.skipped();
                continue;
            };

            let mut phone = phone.filter(|p| !p.is_empty());
            if let Some(number) = phone.clone() {
                let clashes: i64 = match sqlx::query_scalar(
                    r#"SELECT COUNT(*) FROM "user_persona" WHERE phone_number = $1 AND id != $2"#,
                )
                .bind(&number)
                .bind(&user_id)
                .fetch_one(&mut *tx)
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

            let result = sqlx::query(
                r#"
                INSERT INTO "user_persona" (id, phone_number)
                VALUES ($1, $2)
                ON CONFLICT (id) DO UPDATE
                SET phone_number = $2
                "#,
            )
            .bind(&user_id)
            .bind(&phone)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => report.transferred(),
                Err(err) => {
                    warn!(%user_id, %err, "failed to upsert BDM persona");
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
