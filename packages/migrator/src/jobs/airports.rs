//! Seeds the general `airport` table from the bundled Indonesian airport
//! list, resolving city ids by name against the identity location tables.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};
use crate::seed;

const COUNTRY_NAME: &str = "INDONESIA";
const COUNTRY_ID: &str = "360";

pub struct Airports;

#[async_trait]
impl TransferJob for Airports {
    fn name(&self) -> &'static str {
        "airports"
    }

    fn description(&self) -> &'static str {
        "Seed the general airport table from the bundled reference list"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Transferring airports..."
    }

    async fn total(&self, _ctx: &JobContext) -> Result<i64> {
        Ok(seed::load_airports(seed::data_dir().join("airports-id.json"))?.len() as i64)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let airports = seed::load_airports(seed::data_dir().join("airports-id.json"))?;

        let mut tx = ctx
            .db
            .general
            .begin()
            .await
            .context("failed to start general transaction")?;

        for airport in airports {
            let existing: Option<i32> =
                match sqlx::query_scalar("SELECT id FROM airport WHERE code = $1 LIMIT 1")
                    .bind(&airport.code)
                    .fetch_optional(&mut *tx)
                    .await
                {
                    Ok(id) => id,
                    Err(err) => {
                        warn!(code = %airport.code, %err, "airport existence check failed");
                        report.failed();
                        continue;
                    }
                };

            if existing.is_some() {
                report.skipped();
                continue;
            }

            let city_id: Option<String> = match sqlx::query_scalar(
                "SELECT id FROM location_city WHERE name = $1 LIMIT 1",
            )
            .bind(&airport.city)
            .fetch_optional(&ctx.db.identity)
            .await
            {
                Ok(id) => id,
                Err(err) => {
                    warn!(code = %airport.code, %err, "city lookup failed");
                    report.failed();
                    continue;
                }
            };

            if city_id.is_none() {
                report.note(
                    "Airports Without City",
                    format!("{} ({}, {})", airport.name, airport.code, airport.city),
                );
            }

            let inserted = sqlx::query_scalar::<_, i32>(
                r#"
                INSERT INTO airport (
                    name, code, country_name, country_id,
                    city_name, city_id, created_by, modified_by
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, NULL
                ) RETURNING id
                "#,
            )
            .bind(&airport.name)
            .bind(&airport.code)
            .bind(COUNTRY_NAME)
            .bind(COUNTRY_ID)
            .bind(&airport.city)
            .bind(&city_id)
            .bind(&ctx.defaults.actor)
            .fetch_one(&mut *tx)
            .await;

            match inserted {
                Ok(_) => report.transferred(),
                Err(err) => {
                    warn!(code = %airport.code, %err, "failed to insert airport");
                    report.failed();
                }
            }
        }

        if ctx.dry_run {
            tx.rollback()
                .await
                .context("failed to roll back general transaction")?;
        } else {
            tx.commit()
                .await
                .context("failed to commit general transaction")?;
        }
        Ok(())
    }
}
