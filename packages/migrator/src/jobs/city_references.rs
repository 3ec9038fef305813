//! Remaps persona city references that still point at legacy city ids.
//!
//! The legacy and target schemas both key cities by id but the ids do not
//! line up, so the join runs through the city name: legacy id -> legacy
//! name -> target id. Personas whose city cannot be resolved either way
//! are left untouched and listed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};

pub struct CityReferences;

#[async_trait]
impl TransferJob for CityReferences {
    fn name(&self) -> &'static str {
        "city-references"
    }

    fn description(&self) -> &'static str {
        "Remap persona city ids from the legacy city table to the target one"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Remapping city references..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user_persona" WHERE city_id IS NOT NULL"#)
            .fetch_one(&ctx.db.identity)
            .await
            .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let personas: Vec<(String, String)> = sqlx::query_as(
            r#"SELECT id, CAST(city_id AS VARCHAR(255)) FROM "user_persona" WHERE city_id IS NOT NULL"#,
        )
        .fetch_all(&ctx.db.identity)
        .await
        .context("failed to query personas with a city")?;

        let mut tx = ctx
            .db
            .identity
            .begin()
            .await
            .context("failed to start identity transaction")?;

        for (persona_id, legacy_city_id) in personas {
            let city_name: Option<String> =
                match sqlx::query_scalar("SELECT name FROM td_city WHERE id = $1")
                    .bind(&legacy_city_id)
                    .fetch_optional(&ctx.db.legacy)
                    .await
                {
                    Ok(name) => name,
                    Err(err) => {
                        warn!(%persona_id, %err, "legacy city lookup failed");
                        report.failed();
                        continue;
                    }
                };

            let Some(city_name) = city_name else {
                // Already remapped, or the legacy city is gone.
                report.skipped();
                continue;
            };

            let target_city_id: Option<String> =
                match sqlx::query_scalar("SELECT id FROM location_city WHERE name = $1 LIMIT 1")
                    .bind(&city_name)
                    .fetch_optional(&mut *tx)
                    .await
                {
                    Ok(id) => id,
                    Err(err) => {
                        warn!(%persona_id, %err, "target city lookup failed");
                        report.failed();
                        continue;
                    }
                };

            let Some(target_city_id) = target_city_id else {
                report.note(
                    "Cities Without Target Match",
                    format!("{persona_id} | {city_name}"),
                );
                report.skipped();
                continue;
            };

            let updated =
                sqlx::query(r#"UPDATE "user_persona" SET city_id = $2 WHERE id = $1"#)
                    .bind(&persona_id)
                    .bind(&target_city_id)
                    .execute(&mut *tx)
                    .await;

            match updated {
                Ok(_) => report.updated(),
                Err(err) => {
                    warn!(%persona_id, %err, "failed to update persona city");
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
