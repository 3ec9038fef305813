//! Copies legacy member accounts into the identity `"user"` table.
//!
//! Members with a travel-agent row in the legacy schema come across with
//! the `agent` role; everyone else keeps their legacy role. Emails are the
//! duplicate key — an address already present in the target skips the row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::warn;

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};

#[derive(Debug, FromRow)]
struct LegacyUser {
    id: String,
    name: String,
    email: String,
    role: String,
    image: Option<String>,
    soft_delete: Option<bool>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub struct Users;

#[async_trait]
impl TransferJob for Users {
    fn name(&self) -> &'static str {
        "users"
    }

    fn description(&self) -> &'static str {
        "Copy legacy member accounts into the identity user table, promoting travel agents"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Transferring users..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM td_user WHERE role = 'user' AND soft_delete = 'false'",
        )
        .fetch_one(&ctx.db.legacy)
        .await
        .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let agent_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM td_travel_agent")
            .fetch_one(&ctx.db.legacy)
            .await?;
        println!("Total travel agents in source: {agent_total}");

        let rows: Vec<LegacyUser> = sqlx::query_as(
            r#"
            SELECT id, name, email, role, image, soft_delete, created_at, updated_at
            FROM td_user
            WHERE role = 'user' AND soft_delete = 'false'
            "#,
        )
        .fetch_all(&ctx.db.legacy)
        .await
        .context("failed to query legacy users")?;

        let mut tx = ctx
            .db
            .identity
            .begin()
            .await
            .context("failed to start identity transaction")?;

        for user in rows {
            let is_agent: bool = match sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM td_travel_agent WHERE user_id = $1)",
            )
            .bind(&user.id)
            .fetch_one(&ctx.db.legacy)
            .await
            {
                Ok(exists) => exists,
                Err(err) => {
                    warn!(user_id = %user.id, %err, "travel agent lookup failed");
                    report.failed();
                    continue;
                }
            };

            let duplicates: i64 =
                match sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user" WHERE email = $1"#)
                    .bind(&user.email)
                    .fetch_one(&mut *tx)
                    .await
                {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(user_id = %user.id, %err, "duplicate email check failed");
                        report.failed();
                        continue;
                    }
                };

            if duplicates > 0 {
                report.note("Duplicate Emails", format!("{} ({})", user.email, user.name));
                if is_agent {
                    report.note(
                        "Skipped Travel Agents (already exists)",
                        format!("{} ({})", user.email, user.name),
                    );
                }
                report.skipped();
                continue;
            }

            let role = if is_agent { "agent" } else { user.role.as_str() };

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
                    NULL, $6, NULL,
                    $7, $8, $9,
                    $10, NULL
                )
                "#,
            )
            .bind(&user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.email)
            .bind(role)
            .bind(&user.image)
            .bind(user.soft_delete.unwrap_or(false))
            .bind(user.created_at)
            .bind(user.updated_at)
            .bind(&ctx.defaults.actor)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {
                    if is_agent {
                        report.bump("Converted to agent");
                    }
                    report.transferred();
                }
                Err(err) => {
                    warn!(user_id = %user.id, %err, "failed to insert user");
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
