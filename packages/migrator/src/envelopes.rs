//! JSON envelopes embedded in target package rows.
//!
//! The target umrah schema stores hotels and flights as denormalized JSON
//! columns. Field names are camelCase to match what the new application
//! reads back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelEnvelope {
    pub id: i32,
    pub logo: String,
    pub name: String,
    pub city_id: String,
    pub rating: i32,
    pub address: String,
    pub city_name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: DateTime<Utc>,
    pub modified_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirportEnvelope {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub city_id: String,
    pub city_name: String,
    pub country_id: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: DateTime<Utc>,
    pub modified_by: Option<String>,
    pub country_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirlineEnvelope {
    pub id: i32,
    pub code: String,
    pub logo: String,
    pub name: String,
    pub country_id: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: DateTime<Utc>,
    pub modified_by: Option<String>,
    pub country_name: String,
}

/// One endpoint of a flight: the airport document plus its id repeated at
/// the wrapper level, the shape the target application expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirportLeg {
    pub airport: AirportEnvelope,
    pub airport_id: i32,
}

impl From<AirportEnvelope> for AirportLeg {
    fn from(airport: AirportEnvelope) -> Self {
        let airport_id = airport.id;
        Self {
            airport,
            airport_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightEnvelope {
    pub to: AirportLeg,
    pub from: AirportLeg,
    pub airline: AirlineEnvelope,
    pub airline_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hotel_envelope_serializes_camel_case() {
        let hotel = HotelEnvelope {
            id: 1,
            logo: "logo.png".into(),
            name: "Dar Al Hijra".into(),
            city_id: "0213".into(),
            rating: 4,
            address: "Central Zone".into(),
            city_name: "MADINAH".into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            created_by: "migration".into(),
            modified_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            modified_by: None,
        };

        let value = serde_json::to_value(&hotel).unwrap();
        assert_eq!(value["cityName"], "MADINAH");
        assert_eq!(value["createdBy"], "migration");
        assert!(value["modifiedBy"].is_null());
    }

    #[test]
    fn airport_leg_repeats_the_airport_id() {
        let airport = AirportEnvelope {
            id: 6,
            code: "JED".into(),
            name: "King Abdulaziz International".into(),
            city_id: "0213".into(),
            city_name: "JEDDAH".into(),
            country_id: "682".into(),
            created_at: Utc::now(),
            created_by: "migration".into(),
            modified_at: Utc::now(),
            modified_by: None,
            country_name: "JEDDAH".into(),
        };

        let leg = AirportLeg::from(airport);
        assert_eq!(leg.airport_id, 6);

        let value = serde_json::to_value(&leg).unwrap();
        assert_eq!(value["airportId"], 6);
        assert_eq!(value["airport"]["code"], "JED");
    }
}
