//! Copies legacy business-development managers into the identity user
//! table under the `bdm` role, creating the role row first if the target
//! has never seen it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::warn;

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};

const ROLE_SLUG: &str = "bdm";

#[derive(Debug, FromRow)]
struct LegacyBdm {
    id: String,
    name: String,
    email: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub struct BdmUsers;

#[async_trait]
impl TransferJob for BdmUsers {
    fn name(&self) -> &'static str {
        "bdm-users"
    }

    fn description(&self) -> &'static str {
        "Copy legacy business-development managers into the identity user table"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Transferring BDM users..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tr_rda")
            .fetch_one(&ctx.db.legacy)
            .await
            .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let role_exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM "role" WHERE slug = $1)"#)
                .bind(ROLE_SLUG)
                .fetch_one(&ctx.db.identity)
                .await
                .context("failed to check bdm role")?;

        if !role_exists {
            sqlx::query(r#"INSERT INTO "role" (name, slug) VALUES ($1, $2)"#)
                .bind("Business Development Manager")
                .bind(ROLE_SLUG)
                .execute(&ctx.db.identity)
                .await
                .context("failed to create bdm role")?;
            println!("Created missing '{ROLE_SLUG}' role in target");
        }

        let rows: Vec<LegacyBdm> = sqlx::query_as(
            "SELECT CAST(id AS VARCHAR(255)) AS id, name, email, created_at, updated_at FROM tr_rda",
        )
        .fetch_all(&ctx.db.legacy)
        .await
        .context("failed to query legacy BDM rows")?;

        let mut tx = ctx
            .db
            .identity
            .begin()
            .await
            .context("failed to start identity transaction")?;

        for bdm in rows {
            let duplicates: i64 =
                match sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user" WHERE email = $1"#)
                    .bind(&bdm.email)
                    .fetch_one(&mut *tx)
                    .await
                {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(bdm_id = %bdm.id, %err, "duplicate email check failed");
                        report.failed();
                        continue;
                    }
                };

            if duplicates > 0 {
                report.note("Duplicate Emails", format!("{} ({})", bdm.email, bdm.name));
                report.skipped();
                continue;
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO "user" (
                    id, name, username, email, role,
                    is_active, email_verified,
                    avatar, avatar_provider, provider,
                    deleted, created_at, modified_at,
                    created_by, modified_by
                ) VALUES (
                    $1, $2, $3, $4, $5,
                    true, false,
                    NULL, NULL, NULL,
                    false, $6, $7,
                    NULL, NULL
                )
                "#,
            )
            .bind(&bdm.id)
            .bind(&bdm.name)
            .bind(&bdm.email)
            .bind(&bdm.email)
            .bind(ROLE_SLUG)
            .bind(bdm.created_at)
            .bind(bdm.updated_at)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => report.transferred(),
                Err(err) => {
                    warn!(bdm_id = %bdm.id, %err, "failed to insert BDM user");
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
