//! Static reference lists bundled with the repository, used as one-time
//! insert sources for the airline and airport jobs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::envelopes::AirportEnvelope;

/// Directory holding the bundled seed files.
pub fn data_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/data"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedAirline {
    pub name: String,
    pub code: String,
}

/// A seed airline stamped with the country it belongs to.
#[derive(Debug, Clone)]
pub struct SeedAirlineWithCountry {
    pub name: String,
    pub code: String,
    pub country_name: String,
    pub country_id: String,
}

pub fn load_airlines(path: impl AsRef<Path>) -> Result<Vec<SeedAirline>> {
    parse(path, "airline")
}

pub fn with_country(
    airlines: Vec<SeedAirline>,
    country_name: &str,
    country_id: &str,
) -> Vec<SeedAirlineWithCountry> {
    airlines
        .into_iter()
        .map(|airline| SeedAirlineWithCountry {
            name: airline.name,
            code: airline.code,
            country_name: country_name.to_string(),
            country_id: country_id.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedAirport {
    pub name: String,
    pub code: String,
    pub city: String,
    pub location: String,
    #[serde(rename = "type")]
    pub kind: String,
}

pub fn load_airports(path: impl AsRef<Path>) -> Result<Vec<SeedAirport>> {
    parse(path, "airport")
}

/// The fixed pair of airports every migrated flight runs between.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteHubs {
    pub abroad: AirportEnvelope,
    pub home: AirportEnvelope,
}

pub fn load_route_hubs(path: impl AsRef<Path>) -> Result<RouteHubs> {
    parse(path, "route hub")
}

fn parse<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>, what: &str) -> Result<T> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} seed file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {what} seed file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_airline_seeds_parse() {
        let indonesian = load_airlines(data_dir().join("airlines-id.json")).unwrap();
        let saudi = load_airlines(data_dir().join("airlines-sa.json")).unwrap();

        assert!(!indonesian.is_empty());
        assert!(!saudi.is_empty());
        assert!(indonesian.iter().any(|a| a.code == "GA"));
        assert!(saudi.iter().any(|a| a.code == "SV"));
    }

    #[test]
    fn bundled_airport_seed_parses() {
        let airports = load_airports(data_dir().join("airports-id.json")).unwrap();
        assert!(airports.iter().any(|a| a.code == "CGK"));
    }

    #[test]
    fn with_country_stamps_every_entry() {
        let stamped = with_country(
            vec![SeedAirline {
                name: "Garuda Indonesia".into(),
                code: "GA".into(),
            }],
            "INDONESIA",
            "360",
        );

        assert_eq!(stamped.len(), 1);
        assert_eq!(stamped[0].country_name, "INDONESIA");
        assert_eq!(stamped[0].country_id, "360");
    }

    #[test]
    fn route_hubs_seed_parses_with_both_endpoints() {
        let hubs = load_route_hubs(data_dir().join("route-hubs.json")).unwrap();
        assert_eq!(hubs.abroad.country_id, "682");
        assert_eq!(hubs.home.country_id, "360");
    }
}
