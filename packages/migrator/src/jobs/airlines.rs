//! Seeds the general `airline` table from the bundled reference lists and
//! points the package flight envelopes at the new airline ids.
//!
//! Two phases: insert airlines (code is the duplicate key), then update
//! the departure/arrival envelopes by airline name.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};
use crate::seed::{self, SeedAirlineWithCountry};

fn load_all_airlines() -> Result<Vec<SeedAirlineWithCountry>> {
    let data_dir = seed::data_dir();
    let indonesian = seed::load_airlines(data_dir.join("airlines-id.json"))?;
    let saudi = seed::load_airlines(data_dir.join("airlines-sa.json"))?;

    let mut all = seed::with_country(indonesian, "INDONESIA", "360");
    all.extend(seed::with_country(saudi, "ARAB SAUDI", "682"));
    Ok(all)
}

pub struct Airlines;

#[async_trait]
impl TransferJob for Airlines {
    fn name(&self) -> &'static str {
        "airlines"
    }

    fn description(&self) -> &'static str {
        "Seed the general airline table and update package flight references"
    }

    fn phase(&self) -> &'static str {
        "[1/2] Inserting airlines..."
    }

    async fn total(&self, _ctx: &JobContext) -> Result<i64> {
        Ok(load_all_airlines()?.len() as i64)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let airlines = load_all_airlines()?;

        let mut general_tx = ctx
            .db
            .general
            .begin()
            .await
            .context("failed to start general transaction")?;

        for airline in &airlines {
            let duplicates: i64 =
                match sqlx::query_scalar("SELECT COUNT(*) FROM airline WHERE code = $1")
                    .bind(&airline.code)
                    .fetch_one(&mut *general_tx)
                    .await
                {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(code = %airline.code, %err, "duplicate airline check failed");
                        report.failed();
                        continue;
                    }
                };

            if duplicates > 0 {
                report.skipped();
                continue;
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO airline (
                    name, code, country_name, country_id,
                    logo, created_by, modified_by
                ) VALUES (
                    $1, $2, $3, $4, NULL, $5, NULL
                )
                "#,
            )
            .bind(&airline.name)
            .bind(&airline.code)
            .bind(&airline.country_name)
            .bind(&airline.country_id)
            .bind(&ctx.defaults.actor)
            .execute(&mut *general_tx)
            .await;

            match inserted {
                Ok(_) => report.transferred(),
                Err(err) => {
                    warn!(code = %airline.code, %err, "failed to insert airline");
                    report.failed();
                }
            }
        }

        println!("\n[2/2] Updating package references...");

        let mut umrah_tx = ctx
            .db
            .umrah
            .begin()
            .await
            .context("failed to start umrah transaction")?;

        for airline in &airlines {
            let new_id: Option<i32> =
                match sqlx::query_scalar("SELECT id FROM airline WHERE code = $1")
                    .bind(&airline.code)
                    .fetch_optional(&mut *general_tx)
                    .await
                {
                    Ok(id) => id,
                    Err(err) => {
                        warn!(code = %airline.code, %err, "airline id lookup failed");
                        report.bump("Update errors");
                        continue;
                    }
                };

            let Some(new_id) = new_id else {
                report.bump("Update errors");
                continue;
            };

            for (field, path) in [("departure", "{airlineId}"), ("arrival", "{airlineId}")] {
                let query = format!(
                    r#"
                    UPDATE package
                    SET {field} = jsonb_set({field}, '{path}', $1::text::jsonb)
                    WHERE {field}->'airline'->>'name' = $2
                    "#
                );
                match sqlx::query(&query)
                    .bind(new_id.to_string())
                    .bind(&airline.name)
                    .execute(&mut *umrah_tx)
                    .await
                {
                    Ok(updated) => report.add("References updated", updated.rows_affected()),
                    Err(err) => {
                        warn!(airline = %airline.name, field, %err, "failed to update package references");
                        report.bump("Update errors");
                    }
                }
            }
        }

        if ctx.dry_run {
            umrah_tx
                .rollback()
                .await
                .context("failed to roll back umrah transaction")?;
            general_tx
                .rollback()
                .await
                .context("failed to roll back general transaction")?;
        } else {
            umrah_tx
                .commit()
                .await
                .context("failed to commit umrah transaction")?;
            general_tx
                .commit()
                .await
                .context("failed to commit general transaction")?;
        }
        Ok(())
    }
}
