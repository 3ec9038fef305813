//! Backfills placeholder credentials for identity users that have none.
//!
//! Migrated accounts arrive without a password. Until the user resets it,
//! the row needs a salt and hash that can never match a login attempt, so
//! both are filled with random bytes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::RngCore;
use tracing::warn;

use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};

pub struct Credentials;

#[async_trait]
impl TransferJob for Credentials {
    fn name(&self) -> &'static str {
        "credentials"
    }

    fn description(&self) -> &'static str {
        "Generate placeholder credentials for identity users without any"
    }

    fn phase(&self) -> &'static str {
        "[1/1] Generating credentials..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(u.id)
            FROM "user" u
            LEFT JOIN user_credentials uc ON u.id = uc.id
            WHERE uc.id IS NULL AND u.deleted = false
            "#,
        )
        .fetch_one(&ctx.db.identity)
        .await
        .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        if report.total() == 0 {
            println!("No users need credentials. Exiting...");
            return Ok(());
        }

        let user_ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT u.id
            FROM "user" u
            LEFT JOIN user_credentials uc ON u.id = uc.id
            WHERE uc.id IS NULL AND u.deleted = false
            "#,
        )
        .fetch_all(&ctx.db.identity)
        .await
        .context("failed to query users without credentials")?;

        let mut tx = ctx
            .db
            .identity
            .begin()
            .await
            .context("failed to start identity transaction")?;

        for user_id in user_ids {
            // ThreadRng is not Send, so keep it out of the await points.
            let (salt, hashed_password) = {
                let mut rng = rand::thread_rng();
                let mut salt = [0u8; 16];
                rng.fill_bytes(&mut salt);
                let mut hashed_password = [0u8; 32];
                rng.fill_bytes(&mut hashed_password);
                (hex::encode(salt), hex::encode(hashed_password))
            };

            let inserted = sqlx::query(
                "INSERT INTO user_credentials (id, salt, hashed_password) VALUES ($1, $2, $3)",
            )
            .bind(&user_id)
            .bind(&salt)
            .bind(&hashed_password)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => report.transferred(),
                Err(err) => {
                    warn!(%user_id, %err, "failed to insert credentials");
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
