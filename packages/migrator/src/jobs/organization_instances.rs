//! Populates the identity `organization_instance` table from legacy travel
//! agencies that have a BDM assignment.
//!
//! Email is the duplicate key in the target; legacy rows without one get a
//! generated placeholder address so the insert can proceed. An agency whose
//! id has no `organization` row is attached to the configured fallback
//! organization instead of being dropped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use tracing::{info, warn};

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};
use crate::text;

/// Licensing numbers folded into one JSON column on the target.
#[derive(Debug, Serialize)]
struct LegalInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pihk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ppiu: Option<String>,
}

#[derive(Debug, FromRow)]
struct LegacyTravelInstance {
    id: String,
    name: String,
    address: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    image: Option<String>,
    phone: Option<String>,
    rda_id: Option<String>,
    xendit_channel: Option<String>,
    xendit_account_number: Option<String>,
    xendit_account_name: Option<String>,
    pic_name: Option<String>,
    pic_phone: Option<String>,
    email: Option<String>,
    soft_delete: bool,
    tagline: Option<String>,
    action_profile: bool,
    action_package: bool,
    own_guide: bool,
    fee_type: Option<String>,
    fee_amount: f64,
    ppiu: Option<String>,
    pihk: Option<String>,
    is_consultation: bool,
    desc: Option<String>,
}

pub struct OrganizationInstances;

#[async_trait]
impl TransferJob for OrganizationInstances {
    fn name(&self) -> &'static str {
        "organization-instances"
    }

    fn description(&self) -> &'static str {
        "Populate organization_instance rows from legacy travel agencies with a BDM"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Transferring organization instances..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM td_travel WHERE rda_id IS NOT NULL")
            .fetch_one(&ctx.db.legacy)
            .await
            .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let rows: Vec<LegacyTravelInstance> = sqlx::query_as(
            r#"
            SELECT
                id, name, address, is_active, created_at, updated_at,
                image, phone, rda_id, xendit_channel, xendit_account_number,
                xendit_account_name, pic_name, pic_phone, email, soft_delete,
                tagline, action_profile, action_package, own_guide,
                fee_type, fee_amount, ppiu, pihk, is_consultation,
                "desc"
            FROM td_travel
            WHERE rda_id IS NOT NULL
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
            let email = match travel.email.as_deref().filter(|e| !e.is_empty()) {
                Some(existing) => {
                    let duplicates: i64 = match sqlx::query_scalar(
                        "SELECT COUNT(*) FROM organization_instance WHERE email = $1",
                    )
                    .bind(existing)
                    .fetch_one(&mut *tx)
                    .await
                    {
                        Ok(count) => count,
                        Err(err) => {
                            warn!(travel_id = %travel.id, %err, "duplicate email check failed");
                            report.failed();
                            continue;
                        }
                    };

                    if duplicates > 0 {
                        report.note(
                            "Duplicate Items",
                            format!("{} ({})", travel.name, existing),
                        );
                        report.skipped();
                        continue;
                    }
                    existing.to_string()
                }
                None => {
                    let placeholder = text::placeholder_email(&travel.id);
                    info!(
                        travel = %travel.name,
                        email = %placeholder,
                        "generated placeholder email"
                    );
                    placeholder
                }
            };

            // Agencies missing from the organization table attach to the
            // configured fallback organization.
            let organization_id = match sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM organization WHERE id = $1",
            )
            .bind(&travel.id)
            .fetch_one(&mut *tx)
            .await
            {
                Ok(count) if count > 0 => travel.id.clone(),
                Ok(_) => {
                    warn!(
                        travel_id = %travel.id,
                        "no organization row, attaching to fallback organization"
                    );
                    report.bump("Attached to fallback organization");
                    ctx.defaults.fallback_organization_id.to_string()
                }
                Err(err) => {
                    warn!(travel_id = %travel.id, %err, "organization check failed");
                    report.failed();
                    continue;
                }
            };

            let slug = text::slugify(&travel.name);
            report.note("Generated Slugs", format!("{} -> {}", travel.name, slug));

            let legal_info = serde_json::to_value(&LegalInfo {
                pihk: travel.pihk.clone().filter(|v| !v.is_empty()),
                ppiu: travel.ppiu.clone().filter(|v| !v.is_empty()),
            })
            .context("failed to encode legal information")?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO organization_instance (
                    organization_id, type, name, slug, address,
                    country_id, province_id, city_id, is_active,
                    legal_information, created_at, modified_at,
                    created_by, thumbnail, phone_number,
                    bdm_id, bank_channel, bank_account_number,
                    bank_account_name, pic_name, pic_phone,
                    email, deleted, tagline,
                    action_profile, action_package, own_guide,
                    fee_type, fee_amount, is_consultation, description
                ) VALUES (
                    $1, $2, $3, $4, $5,
                    $6, $7, $8, $9,
                    $10, $11, $12,
                    $13, $14, $15,
                    $16, $17, $18,
                    $19, $20, $21,
                    $22, $23, $24,
                    $25, $26, $27,
                    $28, $29, $30,
                    $31
                )
                "#,
            )
            .bind(&organization_id)
            .bind("travel")
            .bind(&travel.name)
            .bind(&slug)
            .bind(&travel.address)
            .bind(&ctx.defaults.country_id)
            .bind(&ctx.defaults.province_id)
            .bind(&ctx.defaults.city_id)
            .bind(travel.is_active)
            .bind(&legal_info)
            .bind(travel.created_at)
            .bind(travel.updated_at)
            .bind(&ctx.defaults.actor)
            .bind(&travel.image)
            .bind(&travel.phone)
            .bind(&travel.rda_id)
            .bind(&travel.xendit_channel)
            .bind(&travel.xendit_account_number)
            .bind(&travel.xendit_account_name)
            .bind(&travel.pic_name)
            .bind(&travel.pic_phone)
            .bind(&email)
            .bind(travel.soft_delete)
            .bind(&travel.tagline)
            .bind(travel.action_profile)
            .bind(travel.action_package)
            .bind(travel.own_guide)
            .bind(&travel.fee_type)
            .bind(travel.fee_amount)
            .bind(travel.is_consultation)
            .bind(&travel.desc)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => report.transferred(),
                Err(err) => {
                    warn!(travel_id = %travel.id, %err, "failed to insert organization instance");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_info_omits_missing_numbers() {
        let json = serde_json::to_string(&LegalInfo {
            pihk: None,
            ppiu: Some("PPIU-123".into()),
        })
        .unwrap();

        assert_eq!(json, r#"{"ppiu":"PPIU-123"}"#);
    }
}
