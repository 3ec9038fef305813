//! Copies legacy travel agencies into the identity `organization` table.
//!
//! The legacy id is the duplicate key, so reruns skip everything already
//! moved. Agencies without a usable slug get one generated from the name,
//! and every generated slug is listed in the summary for review.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::warn;

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};
use crate::text;

#[derive(Debug, FromRow)]
struct LegacyTravel {
    id: String,
    name: String,
    slug: Option<String>,
    desc: Option<String>,
    is_active: bool,
    soft_delete: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub struct Organizations;

#[async_trait]
impl TransferJob for Organizations {
    fn name(&self) -> &'static str {
        "organizations"
    }

    fn description(&self) -> &'static str {
        "Copy legacy travel agencies into the identity organization table"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Transferring organizations..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM td_travel")
            .fetch_one(&ctx.db.legacy)
            .await
            .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let rows: Vec<LegacyTravel> = sqlx::query_as(
            r#"
            SELECT id, name, slug, "desc", is_active, soft_delete, created_at, updated_at
            FROM td_travel
            "#,
        )
        .fetch_all(&ctx.db.legacy)
        .await
        .context("failed to query legacy travel agencies")?;

        let mut tx = ctx
            .db
            .identity
            .begin()
            .await
            .context("failed to start identity transaction")?;

        for travel in rows {
            let duplicates: i64 =
                match sqlx::query_scalar("SELECT COUNT(*) FROM organization WHERE id = $1")
                    .bind(&travel.id)
                    .fetch_one(&mut *tx)
                    .await
                {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(travel_id = %travel.id, %err, "duplicate check failed");
                        report.failed();
                        continue;
                    }
                };

            if duplicates > 0 {
                report.note("Duplicate Items", format!("{} ({})", travel.name, travel.id));
                report.skipped();
                continue;
            }

            let slug = match travel.slug.as_deref().filter(|s| !s.is_empty()) {
                Some(existing) => existing.to_string(),
                None => {
                    let generated = text::slugify(&travel.name);
                    report.note(
                        "Generated Slugs",
                        format!("{} -> {}", travel.name, generated),
                    );
                    generated
                }
            };

            let inserted = sqlx::query(
                r#"
                INSERT INTO organization (
                    id, name, slug, description, thumbnail,
                    is_active, deleted, created_at, modified_at,
                    created_by, modified_by
                ) VALUES (
                    $1, $2, $3, $4, NULL,
                    $5, $6, $7, $8,
                    $9, NULL
                )
                "#,
            )
            .bind(&travel.id)
            .bind(&travel.name)
            .bind(&slug)
            .bind(&travel.desc)
            .bind(travel.is_active)
            .bind(travel.soft_delete)
            .bind(travel.created_at)
            .bind(travel.updated_at)
            .bind(&ctx.defaults.actor)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => report.transferred(),
                Err(err) => {
                    warn!(travel_id = %travel.id, %err, "failed to insert organization");
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
