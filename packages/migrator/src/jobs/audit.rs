//! Read-only consistency checks run after the transfer jobs. These write
//! nothing; they compare the legacy and target databases and print what
//! does not line up.

use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::HashSet;
use std::time::Instant;

use crate::runner::JobContext;

/// Compare legacy travel agents against identity users with the `agent`
/// role and list the differences in both directions.
pub async fn check_agents(ctx: &JobContext) -> Result<()> {
    let started = Instant::now();

    let source_ids: HashSet<String> =
        sqlx::query_scalar("SELECT user_id FROM td_travel_agent")
            .fetch_all(&ctx.db.legacy)
            .await
            .context("failed to query legacy travel agents")?
            .into_iter()
            .collect();

    let target_ids: HashSet<String> =
        sqlx::query_scalar(r#"SELECT id FROM "user" WHERE role = 'agent'"#)
            .fetch_all(&ctx.db.identity)
            .await
            .context("failed to query target agent users")?
            .into_iter()
            .collect();

    let matches = source_ids.intersection(&target_ids).count();
    let extra: Vec<&String> = target_ids.difference(&source_ids).collect();
    let missing: Vec<&String> = source_ids.difference(&target_ids).collect();

    println!("\n{}", "Agent Check Results:".bold());
    println!("------------------------");
    println!("Total travel agents in source: {}", source_ids.len());
    println!("Total agent users in target: {}", target_ids.len());
    println!("Matching ids: {matches}");

    if !extra.is_empty() {
        println!("\nAgents present in target but not in source:");
        println!("-------------------------------------------");
        for (i, id) in extra.iter().enumerate() {
            let row: Option<(String, String)> =
                sqlx::query_as(r#"SELECT name, email FROM "user" WHERE id = $1"#)
                    .bind(id)
                    .fetch_optional(&ctx.db.identity)
                    .await?;
            match row {
                Some((name, email)) => {
                    println!("{}. ID: {id} (Name: {name}, Email: {email})", i + 1)
                }
                None => println!("{}. ID: {id}", i + 1),
            }
        }
        println!("\nTotal extra agents: {}", extra.len());
    }

    if !missing.is_empty() {
        println!("\nAgents present in source but not in target:");
        println!("-------------------------------------------");
        for (i, id) in missing.iter().enumerate() {
            let row: Option<(String, String)> =
                sqlx::query_as("SELECT name, email FROM td_user WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&ctx.db.legacy)
                    .await?;
            match row {
                Some((name, email)) => {
                    println!("{}. ID: {id} (Name: {name}, Email: {email})", i + 1)
                }
                None => println!("{}. ID: {id}", i + 1),
            }
        }
        println!("\nTotal missing agents: {}", missing.len());
    }

    println!("\nCompleted in {}ms", started.elapsed().as_millis());
    Ok(())
}

/// List distinct legacy BDM references with no matching identity user.
pub async fn check_bdm_links(ctx: &JobContext) -> Result<()> {
    let rda_ids: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT rda_id FROM td_travel WHERE rda_id IS NOT NULL",
    )
    .fetch_all(&ctx.db.legacy)
    .await
    .context("failed to query legacy BDM references")?;

    println!("\n{}", "BDM references missing from the user table:".bold());
    println!("-----------------------------------------------");

    let total = rda_ids.len();
    let mut missing = 0usize;

    for rda_id in rda_ids {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user" WHERE id = $1"#)
            .bind(&rda_id)
            .fetch_one(&ctx.db.identity)
            .await?;

        if count == 0 {
            missing += 1;
            println!("{missing}. {rda_id}");
        }
    }

    println!("\nSummary:");
    println!("Total BDM references checked: {total}");
    println!("References without a user: {missing}");
    if total > 0 {
        println!(
            "Missing percentage: {:.2}%",
            missing as f64 / total as f64 * 100.0
        );
    }
    Ok(())
}
