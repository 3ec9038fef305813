//! Integration tests for the transfer runner against real Postgres.
//!
//! A single shared container hosts all test databases; each test creates
//! its own set of source/target databases so tests stay independent.
//!
//! These tests need a Docker daemon and are ignored by default:
//! `cargo test -p migrator -- --ignored`

use anyhow::Result;
use migrator::config::{DatabaseSettings, TransferDefaults};
use migrator::db::{self, Databases};
use migrator::jobs::airlines::Airlines;
use migrator::jobs::organizations::Organizations;
use migrator::jobs::users::Users;
use migrator::runner::{run_job, JobContext};
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct SharedPostgres {
    host: String,
    port: u16,
    // Keep the container alive for the entire test run
    _container: ContainerAsync<Postgres>,
}

static SHARED: OnceCell<SharedPostgres> = OnceCell::const_new();

async fn shared_postgres() -> &'static SharedPostgres {
    SHARED
        .get_or_init(|| async {
            let container = Postgres::default()
                .with_tag("16")
                .start()
                .await
                .expect("failed to start Postgres container");
            let host = container
                .get_host()
                .await
                .expect("container host")
                .to_string();
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("container port");
            SharedPostgres {
                host,
                port,
                _container: container,
            }
        })
        .await
}

fn settings(host: &str, port: u16, name: &str) -> DatabaseSettings {
    DatabaseSettings {
        host: host.to_string(),
        port,
        name: name.to_string(),
        user: "postgres".to_string(),
        password: "postgres".to_string(),
    }
}

fn defaults() -> TransferDefaults {
    TransferDefaults {
        actor: "migration".to_string(),
        fallback_organization_id: "d0ac7aad-54ac-41f1-ba1a-a9070c3f464c".parse().unwrap(),
        missing_org_instance_id: 9999,
        country_id: "360".to_string(),
        province_id: "31".to_string(),
        city_id: "3173".to_string(),
    }
}

/// Create the four role databases under a unique prefix and connect.
async fn fresh_databases(prefix: &str) -> Result<Databases> {
    let pg = shared_postgres().await;

    let admin = PgPool::connect(&format!(
        "postgresql://postgres:postgres@{}:{}/postgres",
        pg.host, pg.port
    ))
    .await?;

    for role in ["legacy", "identity", "umrah", "general"] {
        sqlx::query(&format!(r#"CREATE DATABASE "{prefix}_{role}""#))
            .execute(&admin)
            .await?;
    }

    Ok(Databases {
        legacy: db::connect(&settings(&pg.host, pg.port, &format!("{prefix}_legacy"))).await?,
        identity: db::connect(&settings(&pg.host, pg.port, &format!("{prefix}_identity"))).await?,
        umrah: db::connect(&settings(&pg.host, pg.port, &format!("{prefix}_umrah"))).await?,
        general: db::connect(&settings(&pg.host, pg.port, &format!("{prefix}_general"))).await?,
    })
}

async fn create_user_tables(db: &Databases) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE td_user (
            id VARCHAR(64) PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            image TEXT,
            soft_delete BOOLEAN DEFAULT false,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(&db.legacy)
    .await?;

    sqlx::query("CREATE TABLE td_travel_agent (user_id VARCHAR(64) NOT NULL)")
        .execute(&db.legacy)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE "user" (
            id VARCHAR(64) PRIMARY KEY,
            name TEXT NOT NULL,
            username TEXT,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            is_active BOOLEAN,
            email_verified BOOLEAN,
            avatar TEXT,
            avatar_provider TEXT,
            provider TEXT,
            deleted BOOLEAN,
            created_at TIMESTAMPTZ,
            modified_at TIMESTAMPTZ,
            created_by TEXT,
            modified_by TEXT
        )
        "#,
    )
    .execute(&db.identity)
    .await?;

    Ok(())
}

async fn seed_legacy_user(db: &Databases, id: &str, name: &str, email: &str) -> Result<()> {
    sqlx::query("INSERT INTO td_user (id, name, email, role) VALUES ($1, $2, $3, 'user')")
        .bind(id)
        .bind(name)
        .bind(email)
        .execute(&db.legacy)
        .await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn users_job_transfers_and_is_idempotent() -> Result<()> {
    let db = fresh_databases("users_idem").await?;
    create_user_tables(&db).await?;

    seed_legacy_user(&db, "u1", "Alice", "alice@example.com").await?;
    seed_legacy_user(&db, "u2", "Badr", "badr@example.com").await?;
    seed_legacy_user(&db, "u3", "Citra", "citra@example.com").await?;

    // u2 is a travel agent and comes across with the agent role.
    sqlx::query("INSERT INTO td_travel_agent (user_id) VALUES ('u2')")
        .execute(&db.legacy)
        .await?;

    // u3's email is already taken in the target.
    sqlx::query(
        r#"INSERT INTO "user" (id, name, email, role) VALUES ('pre', 'Existing', 'citra@example.com', 'user')"#,
    )
    .execute(&db.identity)
    .await?;

    let ctx = JobContext {
        db,
        defaults: defaults(),
        enrichment: None,
        dry_run: false,
    };

    let report = run_job(&Users, &ctx).await?;
    assert_eq!(report.transferred_count(), 2);
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(report.failed_count(), 0);
    assert!(report.is_consistent());

    let role: String = sqlx::query_scalar(r#"SELECT role FROM "user" WHERE id = 'u2'"#)
        .fetch_one(&ctx.db.identity)
        .await?;
    assert_eq!(role, "agent");

    // A second run finds every email already present and moves nothing.
    let rerun = run_job(&Users, &ctx).await?;
    assert_eq!(rerun.transferred_count(), 0);
    assert_eq!(rerun.skipped_count(), 3);

    let total: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user""#)
        .fetch_one(&ctx.db.identity)
        .await?;
    assert_eq!(total, 3);

    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn dry_run_leaves_the_target_unchanged() -> Result<()> {
    let db = fresh_databases("users_dry").await?;
    create_user_tables(&db).await?;

    seed_legacy_user(&db, "u1", "Alice", "alice@example.com").await?;

    let ctx = JobContext {
        db,
        defaults: defaults(),
        enrichment: None,
        dry_run: true,
    };

    let report = run_job(&Users, &ctx).await?;
    assert_eq!(report.transferred_count(), 1);

    let total: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user""#)
        .fetch_one(&ctx.db.identity)
        .await?;
    assert_eq!(total, 0);

    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn organizations_job_generates_missing_slugs() -> Result<()> {
    let db = fresh_databases("orgs_slug").await?;

    sqlx::query(
        r#"
        CREATE TABLE td_travel (
            id VARCHAR(64) PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT,
            "desc" TEXT,
            is_active BOOLEAN NOT NULL DEFAULT true,
            soft_delete BOOLEAN NOT NULL DEFAULT false,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(&db.legacy)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE organization (
            id VARCHAR(64) PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            description TEXT,
            thumbnail TEXT,
            is_active BOOLEAN,
            deleted BOOLEAN,
            created_at TIMESTAMPTZ,
            modified_at TIMESTAMPTZ,
            created_by TEXT,
            modified_by TEXT
        )
        "#,
    )
    .execute(&db.identity)
    .await?;

    sqlx::query("INSERT INTO td_travel (id, name) VALUES ('t1', 'Al-Amin Travel & Tours')")
        .execute(&db.legacy)
        .await?;

    let ctx = JobContext {
        db,
        defaults: defaults(),
        enrichment: None,
        dry_run: false,
    };

    let report = run_job(&Organizations, &ctx).await?;
    assert_eq!(report.transferred_count(), 1);

    let slug: String = sqlx::query_scalar("SELECT slug FROM organization WHERE id = 't1'")
        .fetch_one(&ctx.db.identity)
        .await?;
    assert_eq!(slug, "al-amin-travel-tours");

    // The legacy id is the duplicate key, so a rerun only skips.
    let rerun = run_job(&Organizations, &ctx).await?;
    assert_eq!(rerun.transferred_count(), 0);
    assert_eq!(rerun.skipped_count(), 1);

    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn airlines_job_inserts_seeds_minus_existing_codes() -> Result<()> {
    let db = fresh_databases("airlines_seed").await?;

    sqlx::query(
        r#"
        CREATE TABLE airline (
            id SERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            country_name TEXT,
            country_id TEXT,
            logo TEXT,
            created_by TEXT,
            modified_by TEXT
        )
        "#,
    )
    .execute(&db.general)
    .await?;

    sqlx::query("CREATE TABLE package (id SERIAL PRIMARY KEY, departure JSONB, arrival JSONB)")
        .execute(&db.umrah)
        .await?;

    // One seed code is already present in the target.
    sqlx::query("INSERT INTO airline (name, code) VALUES ('Garuda Indonesia', 'GA')")
        .execute(&db.general)
        .await?;

    let ctx = JobContext {
        db,
        defaults: defaults(),
        enrichment: None,
        dry_run: false,
    };

    let report = run_job(&Airlines, &ctx).await?;
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(report.transferred_count() as i64, report.total() - 1);
    assert!(report.is_consistent());

    // Inserted rows equal seed entries minus codes that already existed.
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM airline")
        .fetch_one(&ctx.db.general)
        .await?;
    assert_eq!(rows, report.total());

    Ok(())
}
