//! Promotes the hotel JSON blobs embedded in umrah package rows into real
//! rows in the general `hotel` table, then writes the new hotel ids back
//! into the package envelopes.
//!
//! Hotel name is the duplicate key; city ids are resolved by name against
//! the identity location tables, falling back to whatever id the envelope
//! already carries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{Postgres, Transaction};
use tracing::warn;

use crate::envelopes::HotelEnvelope;
use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};

pub struct Hotels;

#[async_trait]
impl TransferJob for Hotels {
    fn name(&self) -> &'static str {
        "hotels"
    }

    fn description(&self) -> &'static str {
        "Promote package hotel envelopes into the general hotel table"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Transferring package hotels..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM (
                SELECT DISTINCT medina_hotel, mecca_hotel
                FROM package
                WHERE medina_hotel IS NOT NULL
                OR mecca_hotel IS NOT NULL
            ) h
            "#,
        )
        .fetch_one(&ctx.db.umrah)
        .await
        .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let rows: Vec<(Option<JsonValue>, Option<JsonValue>)> = sqlx::query_as(
            r#"
            SELECT DISTINCT medina_hotel, mecca_hotel
            FROM package
            WHERE medina_hotel IS NOT NULL
            OR mecca_hotel IS NOT NULL
            "#,
        )
        .fetch_all(&ctx.db.umrah)
        .await
        .context("failed to query package hotel envelopes")?;

        let mut general_tx = ctx
            .db
            .general
            .begin()
            .await
            .context("failed to start general transaction")?;
        let mut umrah_tx = ctx
            .db
            .umrah
            .begin()
            .await
            .context("failed to start umrah transaction")?;

        for (medina, mecca) in rows {
            let mut inserted = 0u32;
            let mut errors = 0u32;

            for (field, blob) in [("medina_hotel", medina), ("mecca_hotel", mecca)] {
                let Some(blob) = blob.filter(|b| !b.is_null()) else {
                    continue;
                };

                match self
                    .promote_hotel(ctx, field, blob, &mut general_tx, &mut umrah_tx, report)
                    .await
                {
                    Ok(true) => inserted += 1,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(field, %err, "failed to promote hotel envelope");
                        errors += 1;
                    }
                }
            }

            if errors > 0 {
                report.failed();
            } else if inserted > 0 {
                report.transferred();
            } else {
                report.skipped();
            }
        }

        if ctx.dry_run {
            general_tx
                .rollback()
                .await
                .context("failed to roll back general transaction")?;
            umrah_tx
                .rollback()
                .await
                .context("failed to roll back umrah transaction")?;
        } else {
            general_tx
                .commit()
                .await
                .context("failed to commit general transaction")?;
            umrah_tx
                .commit()
                .await
                .context("failed to commit umrah transaction")?;
        }
        Ok(())
    }
}

impl Hotels {
    /// Returns true when a new hotel row was inserted, false when the
    /// hotel already existed.
    async fn promote_hotel(
        &self,
        ctx: &JobContext,
        field: &'static str,
        blob: JsonValue,
        general_tx: &mut Transaction<'_, Postgres>,
        umrah_tx: &mut Transaction<'_, Postgres>,
        report: &mut TransferReport,
    ) -> Result<bool> {
        let hotel: HotelEnvelope =
            serde_json::from_value(blob).context("malformed hotel envelope")?;

        if hotel.city_name.is_empty() {
            anyhow::bail!("hotel '{}' has an empty city name", hotel.name);
        }

        let existing: Option<i32> =
            sqlx::query_scalar("SELECT id FROM hotel WHERE name = $1 LIMIT 1")
                .bind(&hotel.name)
                .fetch_optional(&mut **general_tx)
                .await
                .context("hotel existence check failed")?;

        if existing.is_some() {
            return Ok(false);
        }

        let city_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM location_city WHERE name = $1 LIMIT 1")
                .bind(&hotel.city_name)
                .fetch_optional(&ctx.db.identity)
                .await
                .context("city lookup failed")?;
        let city_id = city_id.unwrap_or_else(|| hotel.city_id.clone());

        let hotel_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO hotel (
                name, address, city_name, city_id, rating,
                logo, created_at, modified_at, created_by, modified_by
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, NULL
            ) RETURNING id
            "#,
        )
        .bind(&hotel.name)
        .bind(&hotel.address)
        .bind(&hotel.city_name)
        .bind(&city_id)
        .bind(hotel.rating)
        .bind(&hotel.logo)
        .bind(hotel.created_at)
        .bind(hotel.modified_at)
        .bind(&ctx.defaults.actor)
        .fetch_one(&mut **general_tx)
        .await
        .context("failed to insert hotel")?;

        // Write the new id back into every package envelope that names
        // this hotel.
        let query = format!(
            r#"
            UPDATE package
            SET {field} = jsonb_set({field}, '{{id}}', $1::text::jsonb)
            WHERE {field}->>'name' = $2
            "#
        );
        let updated = sqlx::query(&query)
            .bind(hotel_id.to_string())
            .bind(&hotel.name)
            .execute(&mut **umrah_tx)
            .await
            .context("failed to update package hotel ids")?;

        report.add("Package envelopes updated", updated.rows_affected());
        Ok(true)
    }
}
