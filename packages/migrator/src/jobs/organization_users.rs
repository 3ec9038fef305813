//! Links organizations to their member users from the legacy membership
//! table. Rows referencing an organization or user the target has never
//! seen are skipped and listed, as are duplicate memberships.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::FromRow;
use tracing::warn;

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};

#[derive(Debug, FromRow)]
struct LegacyMembership {
    travel_id: String,
    user_id: String,
    role: Option<String>,
}

pub struct OrganizationUsers;

#[async_trait]
impl TransferJob for OrganizationUsers {
    fn name(&self) -> &'static str {
        "organization-users"
    }

    fn description(&self) -> &'static str {
        "Link identity users to their organizations from the legacy membership table"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Transferring organization users..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM td_travel_user")
            .fetch_one(&ctx.db.legacy)
            .await
            .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let rows: Vec<LegacyMembership> =
            sqlx::query_as("SELECT travel_id, user_id, role FROM td_travel_user")
                .fetch_all(&ctx.db.legacy)
                .await
                .context("failed to query legacy memberships")?;

        let mut tx = ctx
            .db
            .identity
            .begin()
            .await
            .context("failed to start identity transaction")?;

        for membership in rows {
            let org_exists: i64 =
                match sqlx::query_scalar("SELECT COUNT(*) FROM organization WHERE id = $1")
                    .bind(&membership.travel_id)
                    .fetch_one(&mut *tx)
                    .await
                {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(travel_id = %membership.travel_id, %err, "organization check failed");
                        report.failed();
                        continue;
                    }
                };

            if org_exists == 0 {
                report.note("Missing Organizations", membership.travel_id.clone());
                report.skipped();
                continue;
            }

            let user_exists: i64 =
                match sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user" WHERE id = $1"#)
                    .bind(&membership.user_id)
                    .fetch_one(&mut *tx)
                    .await
                {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(user_id = %membership.user_id, %err, "user check failed");
                        report.failed();
                        continue;
                    }
                };

            if user_exists == 0 {
                report.note("Missing Users", membership.user_id.clone());
                report.skipped();
                continue;
            }

            let duplicates: i64 = match sqlx::query_scalar(
                "SELECT COUNT(*) FROM organization_user WHERE organization_id = $1 AND user_id = $2",
            )
            .bind(&membership.travel_id)
            .bind(&membership.user_id)
            .fetch_one(&mut *tx)
            .await
            {
                Ok(count) => count,
                Err(err) => {
                    warn!(user_id = %membership.user_id, %err, "duplicate membership check failed");
                    report.failed();
                    continue;
                }
            };

            if duplicates > 0 {
                report.note(
                    "Duplicate Memberships",
                    format!("{} / {}", membership.travel_id, membership.user_id),
                );
                report.skipped();
                continue;
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO organization_user (
                    organization_id, user_id, role,
                    created_at, modified_at, created_by, modified_by
                ) VALUES (
                    $1, $2, $3, NOW(), NOW(), $4, NULL
                )
                "#,
            )
            .bind(&membership.travel_id)
            .bind(&membership.user_id)
            .bind(membership.role.as_deref().unwrap_or("member"))
            .bind(&ctx.defaults.actor)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => report.transferred(),
                Err(err) => {
                    warn!(
                        travel_id = %membership.travel_id,
                        user_id = %membership.user_id,
                        %err,
                        "failed to insert organization user"
                    );
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
