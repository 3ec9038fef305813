//! Copies departed legacy packages into the umrah `package` table, together
//! with one variant row and the day-by-day itinerary.
//!
//! The target denormalizes heavily: hotels, flights, and the organization
//! instance all land as JSON columns on the package row. Flights always run
//! between the two fixed route hubs bundled in `data/route-hubs.json`; only
//! the airline comes from the legacy row.
//!
//! Runs in three phases: transfer, then two in-place standardization
//! passes over the hotel city names.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use tracing::warn;

use crate::envelopes::{AirlineEnvelope, FlightEnvelope, HotelEnvelope};
use crate::report::TransferReport;
use crate::runner::{JobContext, TransferJob};
use crate::seed::{self, RouteHubs};

#[derive(Debug, FromRow)]
struct LegacyPackage {
    id: String,
    travel_id: String,
    departure_airline_id: Option<String>,
    arrival_airline_id: Option<String>,
    name: String,
    slug: Option<String>,
    image: Option<String>,
    package_type: String,
    share_desc: Option<String>,
    term_condition: Option<String>,
    facility: Option<String>,
    currency: String,
    dp_type: String,
    dp_amount: f64,
    fee_type: String,
    fee_amount: f64,
    soft_delete: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    departure_date: DateTime<Utc>,
    arrival_date: DateTime<Utc>,
    price_double: f64,
    price_triple: f64,
    price_quad: f64,
}

#[derive(Debug, FromRow)]
struct LegacyPackageHotel {
    name: String,
    address: Option<String>,
    rate: Option<i32>,
    logo: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    city_id: String,
    city_name: String,
}

#[derive(Debug, FromRow)]
struct LegacyAirline {
    code: String,
    logo: Option<String>,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct LegacyActivity {
    activity_time: DateTime<Utc>,
    activity: String,
    city_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Activity {
    time: String,
    activity: String,
    location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct AgendaItem {
    title: String,
    activities: Vec<Activity>,
}

/// The two holy cities a package hotel can belong to. Legacy rows spell
/// Mecca two different ways.
fn classify_city(city_name: &str) -> Option<HolyCity> {
    match city_name {
        "Madinah" => Some(HolyCity::Medina),
        "Mekah" | "Mekkah" => Some(HolyCity::Mecca),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HolyCity {
    Medina,
    Mecca,
}

/// Legacy encodes hajj packages as type "2"; everything else is umrah.
fn package_kind(legacy_type: &str) -> &'static str {
    if legacy_type == "2" {
        "hajj"
    } else {
        "umrah"
    }
}

/// Sort activities by time and group them into one agenda item per
/// calendar day, titled "Day 1", "Day 2", ...
fn group_agenda(mut activities: Vec<(DateTime<Utc>, String, String)>) -> Vec<AgendaItem> {
    activities.sort_by_key(|(time, _, _)| *time);

    let mut agenda: Vec<AgendaItem> = Vec::new();
    let mut current_day: Option<NaiveDate> = None;

    for (time, activity, location) in activities {
        let day = time.date_naive();
        if current_day != Some(day) {
            agenda.push(AgendaItem {
                title: format!("Day {}", agenda.len() + 1),
                activities: Vec::new(),
            });
            current_day = Some(day);
        }
        agenda
            .last_mut()
            .expect("agenda has a current day")
            .activities
            .push(Activity {
                time: time.format("%H:%M").to_string(),
                activity,
                location,
            });
    }

    agenda
}

fn airline_envelope(airline: Option<LegacyAirline>, actor: &str) -> AirlineEnvelope {
    match airline {
        Some(airline) => AirlineEnvelope {
            id: 1,
            code: airline.code,
            logo: airline.logo.unwrap_or_default(),
            name: airline.name,
            country_id: "Unknown".to_string(),
            created_at: airline.created_at,
            created_by: actor.to_string(),
            modified_at: airline.updated_at,
            modified_by: None,
            country_name: "Unknown".to_string(),
        },
        None => AirlineEnvelope {
            id: 1,
            code: String::new(),
            logo: String::new(),
            name: String::new(),
            country_id: "Unknown".to_string(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            created_by: actor.to_string(),
            modified_at: DateTime::<Utc>::UNIX_EPOCH,
            modified_by: None,
            country_name: "Unknown".to_string(),
        },
    }
}

/// Outbound leg: home hub to the hub abroad.
fn departure_flight(hubs: &RouteHubs, airline: AirlineEnvelope) -> FlightEnvelope {
    FlightEnvelope {
        to: hubs.abroad.clone().into(),
        from: hubs.home.clone().into(),
        airline,
        airline_id: 1,
    }
}

/// Return leg: hub abroad back home.
fn arrival_flight(hubs: &RouteHubs, airline: AirlineEnvelope) -> FlightEnvelope {
    FlightEnvelope {
        to: hubs.home.clone().into(),
        from: hubs.abroad.clone().into(),
        airline,
        airline_id: 1,
    }
}

pub struct Packages;

#[async_trait]
impl TransferJob for Packages {
    fn name(&self) -> &'static str {
        "packages"
    }

    fn description(&self) -> &'static str {
        "Copy departed legacy packages with variants and itineraries into the umrah database"
    }

    fn phase(&self) -> &'static str {
        "[1/3] Transferring packages..."
    }

    async fn total(&self, ctx: &JobContext) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM td_package
            WHERE soft_delete = false
            AND departure_date < CURRENT_TIMESTAMP
            "#,
        )
        .fetch_one(&ctx.db.legacy)
        .await
        .map_err(Into::into)
    }

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()> {
        let hubs = seed::load_route_hubs(seed::data_dir().join("route-hubs.json"))?;

        let rows: Vec<LegacyPackage> = sqlx::query_as(
            r#"
            SELECT
                id, travel_id, departure_airline_id, arrival_airline_id,
                name, slug, image, package_type, share_desc, term_condition,
                facility, currency, dp_type, dp_amount, fee_type,
                fee_amount, soft_delete, created_at, updated_at,
                departure_date, arrival_date, price_double, price_triple,
                price_quad
            FROM td_package
            WHERE soft_delete = false
            AND departure_date < CURRENT_TIMESTAMP
            "#,
        )
        .fetch_all(&ctx.db.legacy)
        .await
        .context("failed to query legacy packages")?;

        let mut tx = ctx
            .db
            .umrah
            .begin()
            .await
            .context("failed to start umrah transaction")?;

        for package in rows {
            match self.transfer_one(ctx, &hubs, &package, &mut tx, report).await {
                Ok(()) => report.transferred(),
                Err(err) => {
                    warn!(package_id = %package.id, %err, "failed to transfer package");
                    report.failed();
                }
            }
        }

        if ctx.dry_run {
            tx.rollback()
                .await
                .context("failed to roll back umrah transaction")?;
            return Ok(());
        }
        tx.commit()
            .await
            .context("failed to commit umrah transaction")?;

        // Hotel city names arrive in several legacy spellings; fold them
        // into the two canonical values the target application expects.
        println!("\n[2/3] Standardizing city names...");

        let mecca = sqlx::query(
            r#"
            UPDATE package
            SET mecca_hotel = jsonb_set(mecca_hotel, '{cityName}', '"MAKKAH"')
            WHERE mecca_hotel->>'cityName' = 'Mekkah'
            OR mecca_hotel->>'cityName' = 'Mekah'
            "#,
        )
        .execute(&ctx.db.umrah)
        .await
        .context("failed to standardize Mecca city names")?;

        let medina = sqlx::query(
            r#"
            UPDATE package
            SET medina_hotel = jsonb_set(medina_hotel, '{cityName}', '"MADINAH"')
            WHERE medina_hotel->>'cityName' = 'Madinah'
            "#,
        )
        .execute(&ctx.db.umrah)
        .await
        .context("failed to standardize Medina city names")?;

        println!("\n[3/3] City name standardization completed!");
        report.add("Standardized Mecca hotel records", mecca.rows_affected());
        report.add("Standardized Medina hotel records", medina.rows_affected());

        Ok(())
    }
}

impl Packages {
    async fn transfer_one(
        &self,
        ctx: &JobContext,
        hubs: &RouteHubs,
        package: &LegacyPackage,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        report: &mut TransferReport,
    ) -> Result<()> {
        // Organization instance lives in the identity database; a miss is
        // tolerated with a sentinel id so the package still comes across.
        let instance: Option<(i32, String)> =
            sqlx::query_as("SELECT id, name FROM organization_instance WHERE organization_id = $1")
                .bind(&package.travel_id)
                .fetch_optional(&ctx.db.identity)
                .await
                .context("organization instance lookup failed")?;

        let (instance_id, instance_name) = match instance {
            Some(found) => found,
            None => {
                let travel_name: Option<String> =
                    sqlx::query_scalar("SELECT name FROM td_travel WHERE id = $1")
                        .bind(&package.travel_id)
                        .fetch_optional(&ctx.db.legacy)
                        .await
                        .unwrap_or(None);
                let travel_name = travel_name.unwrap_or_else(|| "Unknown Travel Name".to_string());
                report.note(
                    "Travels Without Organization Instance",
                    format!("{} ({})", package.travel_id, travel_name),
                );
                (
                    ctx.defaults.missing_org_instance_id,
                    "Organization instance not found".to_string(),
                )
            }
        };

        let instance_document = if instance_id == ctx.defaults.missing_org_instance_id {
            json!({ "status": "pending" })
        } else {
            match &ctx.enrichment {
                Some(client) => match client
                    .organization_instance(&package.travel_id, instance_id)
                    .await
                {
                    Ok(document) => document,
                    Err(err) => {
                        warn!(package_id = %package.id, %err, "organization instance fetch failed");
                        json!({ "status": "error fetching data" })
                    }
                },
                None => json!({ "status": "pending" }),
            }
        };

        // First hotel per holy city wins; packages routinely list several.
        let hotel_rows: Vec<LegacyPackageHotel> = sqlx::query_as(
            r#"
            SELECT
                h.name, h.address, h.rate, h.logo, h.created_at, h.updated_at,
                c.id AS city_id, c.name AS city_name
            FROM td_package_hotel ph
            JOIN td_hotel h ON h.id = ph.hotel_id
            JOIN td_city c ON c.id = h.city_id
            WHERE ph.package_id = $1
            "#,
        )
        .bind(&package.id)
        .fetch_all(&ctx.db.legacy)
        .await
        .context("hotel lookup failed")?;

        let mut medina_hotel: Option<HotelEnvelope> = None;
        let mut mecca_hotel: Option<HotelEnvelope> = None;
        for hotel in hotel_rows {
            let envelope = HotelEnvelope {
                id: 1,
                logo: hotel.logo.clone().unwrap_or_default(),
                name: hotel.name.clone(),
                city_id: hotel.city_id.clone(),
                rating: hotel.rate.unwrap_or(0),
                address: hotel.address.clone().unwrap_or_default(),
                city_name: hotel.city_name.clone(),
                created_at: hotel.created_at,
                created_by: ctx.defaults.actor.clone(),
                modified_at: hotel.updated_at,
                modified_by: None,
            };
            match classify_city(&hotel.city_name) {
                Some(HolyCity::Medina) => medina_hotel.get_or_insert(envelope),
                Some(HolyCity::Mecca) => mecca_hotel.get_or_insert(envelope),
                None => continue,
            };
        }

        let departure_airline = self
            .airline(ctx, package.departure_airline_id.as_deref())
            .await?;
        let arrival_airline = self
            .airline(ctx, package.arrival_airline_id.as_deref())
            .await?;

        let departure = departure_flight(hubs, airline_envelope(departure_airline, &ctx.defaults.actor));
        let arrival = arrival_flight(hubs, airline_envelope(arrival_airline, &ctx.defaults.actor));

        let package_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO package (
                organization_id, organization_instance_id, package_type,
                thumbnail, title, description, terms_condition, facility,
                currency, medina_hotel, mecca_hotel, departure, arrival,
                dp_type, dp_amount, fee_type, fee_amount, deleted,
                created_at, modified_at, created_by, modified_by,
                organization_instance_name, organization_instance, slug
            ) VALUES (
                $1, $2, $3,
                $4, $5, $6, $7, $8,
                $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18,
                $19, $20, $21, NULL,
                $22, $23, $24
            )
            RETURNING id
            "#,
        )
        .bind(&package.travel_id)
        .bind(instance_id)
        .bind(package_kind(&package.package_type))
        .bind(package.image.clone().unwrap_or_default())
        .bind(&package.name)
        .bind(package.share_desc.clone().unwrap_or_default())
        .bind(package.term_condition.clone().unwrap_or_default())
        .bind(package.facility.clone().unwrap_or_default())
        .bind(&package.currency)
        .bind(serde_json::to_value(&medina_hotel)?)
        .bind(serde_json::to_value(&mecca_hotel)?)
        .bind(serde_json::to_value(&departure)?)
        .bind(serde_json::to_value(&arrival)?)
        .bind(&package.dp_type)
        .bind(package.dp_amount as i32)
        .bind(&package.fee_type)
        .bind(package.fee_amount as i32)
        .bind(package.soft_delete)
        .bind(package.created_at)
        .bind(package.updated_at)
        .bind(&ctx.defaults.actor)
        .bind(&instance_name)
        .bind(&instance_document)
        .bind(package.slug.clone().unwrap_or_default())
        .fetch_one(&mut **tx)
        .await
        .context("failed to insert package")?;

        sqlx::query(
            r#"
            INSERT INTO package_variant (
                package_id, thumbnail, name, departure_date, arrival_date,
                original_price_double, original_price_triple, original_price_quad,
                price_double, price_triple, price_quad,
                released_at, published, created_at, modified_at, created_by
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8,
                $9, $10, $11,
                $12, true, $13, $14, $15
            )
            "#,
        )
        .bind(package_id)
        .bind(package.image.clone().unwrap_or_default())
        .bind(&package.name)
        .bind(package.departure_date.date_naive())
        .bind(package.arrival_date.date_naive())
        .bind(package.price_double as i64)
        .bind(package.price_triple as i64)
        .bind(package.price_quad as i64)
        .bind(package.price_double as i64)
        .bind(package.price_triple as i64)
        .bind(package.price_quad as i64)
        .bind(package.updated_at)
        .bind(package.created_at)
        .bind(package.updated_at)
        .bind(&ctx.defaults.actor)
        .execute(&mut **tx)
        .await
        .context("failed to insert package variant")?;
        report.bump("Variants created");

        let activities: Vec<LegacyActivity> = sqlx::query_as(
            r#"
            SELECT i.activity_time, i.activity, c.name AS city_name
            FROM td_package_itinerary i
            LEFT JOIN td_city c ON c.id = i.city_id
            WHERE i.package_id = $1
            "#,
        )
        .bind(&package.id)
        .fetch_all(&ctx.db.legacy)
        .await
        .context("itinerary lookup failed")?;

        let agenda = group_agenda(
            activities
                .into_iter()
                .map(|a| {
                    (
                        a.activity_time,
                        a.activity,
                        a.city_name.unwrap_or_default(),
                    )
                })
                .collect(),
        );

        sqlx::query(
            r#"
            INSERT INTO package_itinerary (
                package_id, agenda, created_at, modified_at, created_by
            ) VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(package_id)
        .bind(serde_json::to_value(&agenda)?)
        .bind(package.created_at)
        .bind(package.updated_at)
        .bind(&ctx.defaults.actor)
        .execute(&mut **tx)
        .await
        .context("failed to insert package itinerary")?;

        Ok(())
    }

    async fn airline(&self, ctx: &JobContext, id: Option<&str>) -> Result<Option<LegacyAirline>> {
        let Some(id) = id else {
            return Ok(None);
        };
        sqlx::query_as("SELECT code, logo, name, created_at, updated_at FROM td_airline WHERE id = $1")
            .bind(id)
            .fetch_optional(&ctx.db.legacy)
            .await
            .context("airline lookup failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn package_kind_maps_the_hajj_code() {
        assert_eq!(package_kind("2"), "hajj");
        assert_eq!(package_kind("1"), "umrah");
        assert_eq!(package_kind(""), "umrah");
    }

    #[test]
    fn classify_city_accepts_both_mecca_spellings() {
        assert_eq!(classify_city("Madinah"), Some(HolyCity::Medina));
        assert_eq!(classify_city("Mekah"), Some(HolyCity::Mecca));
        assert_eq!(classify_city("Mekkah"), Some(HolyCity::Mecca));
        assert_eq!(classify_city("Jeddah"), None);
    }

    #[test]
    fn group_agenda_splits_by_calendar_day() {
        let agenda = group_agenda(vec![
            (at(2, 9, 0), "City tour".into(), "MAKKAH".into()),
            (at(1, 21, 30), "Arrival".into(), "JEDDAH".into()),
            (at(1, 8, 0), "Departure".into(), "JAKARTA".into()),
            (at(2, 14, 15), "Ziyarah".into(), "MAKKAH".into()),
        ]);

        assert_eq!(agenda.len(), 2);
        assert_eq!(agenda[0].title, "Day 1");
        assert_eq!(agenda[1].title, "Day 2");

        // Sorted within the day, times rendered HH:MM.
        assert_eq!(agenda[0].activities[0].time, "08:00");
        assert_eq!(agenda[0].activities[1].time, "21:30");
        assert_eq!(agenda[1].activities[0].activity, "City tour");
        assert_eq!(agenda[1].activities[1].time, "14:15");
    }

    #[test]
    fn group_agenda_handles_empty_itineraries() {
        assert!(group_agenda(Vec::new()).is_empty());
    }

    #[test]
    fn flight_envelopes_run_between_the_fixed_hubs() {
        let hubs = crate::seed::load_route_hubs(crate::seed::data_dir().join("route-hubs.json"))
            .unwrap();
        let airline = airline_envelope(None, "migration");

        let departure = departure_flight(&hubs, airline.clone());
        assert_eq!(departure.to.airport.code, "JED");
        assert_eq!(departure.from.airport.code, "SOE");

        let arrival = arrival_flight(&hubs, airline);
        assert_eq!(arrival.to.airport.code, "SOE");
        assert_eq!(arrival.from.airport.code, "JED");
    }
}
