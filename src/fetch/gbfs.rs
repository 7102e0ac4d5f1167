//! GBFS `station_status.json` client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use super::{BasicClient, FeedClient, HttpClient, fetch_bytes};
use crate::record::StationSnapshot;

#[derive(Deserialize)]
struct StationStatusResponse {
    data: StationStatusData,
}

#[derive(Deserialize)]
struct StationStatusData {
    stations: Vec<StationStatusJson>,
}

#[derive(Deserialize)]
struct StationStatusJson {
    station_id: String,
    num_bikes_available: u16,
    #[serde(default)]
    num_ebikes_available: u16,
    #[serde(default)]
    num_bikes_disabled: u16,
    num_docks_available: u16,
    #[serde(default)]
    num_docks_disabled: u16,
    last_reported: i64,
    #[serde(deserialize_with = "flag")]
    is_installed: bool,
    #[serde(deserialize_with = "flag")]
    is_renting: bool,
    #[serde(deserialize_with = "flag")]
    is_returning: bool,
}

/// GBFS 1.x publishes flags as 0/1, later versions as JSON booleans.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

impl TryFrom<StationStatusJson> for StationSnapshot {
    type Error = anyhow::Error;

    fn try_from(s: StationStatusJson) -> Result<Self> {
        let last_reported = DateTime::<Utc>::from_timestamp(s.last_reported, 0)
            .with_context(|| format!("station {} last_reported out of range", s.station_id))?;
        Ok(StationSnapshot {
            station_id: s.station_id,
            last_reported,
            num_bikes_available: s.num_bikes_available,
            num_ebikes_available: s.num_ebikes_available,
            num_bikes_disabled: s.num_bikes_disabled,
            num_docks_available: s.num_docks_available,
            num_docks_disabled: s.num_docks_disabled,
            is_installed: s.is_installed,
            is_renting: s.is_renting,
            is_returning: s.is_returning,
        })
    }
}

/// Decodes a `station_status.json` body.
pub fn parse_station_status(bytes: &[u8]) -> Result<Vec<StationSnapshot>> {
    let response: StationStatusResponse =
        serde_json::from_slice(bytes).context("invalid station_status response")?;
    response
        .data
        .stations
        .into_iter()
        .map(StationSnapshot::try_from)
        .collect()
}

pub struct GbfsClient<C = BasicClient> {
    http: C,
    url: String,
}

impl GbfsClient<BasicClient> {
    /// `base_url` is the GBFS language root, e.g. `https://gbfs.baywheels.com/gbfs/en`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(BasicClient::with_timeout(timeout)?, base_url))
    }
}

impl<C: HttpClient> GbfsClient<C> {
    pub fn with_client(http: C, base_url: &str) -> Self {
        Self {
            http,
            url: format!("{}/station_status.json", base_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<C: HttpClient> FeedClient for GbfsClient<C> {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Vec<StationSnapshot>> {
        let bytes = fetch_bytes(&self.http, &self.url).await?;
        parse_station_status(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_station_status_int_flags() {
        let body = br#"{
            "last_updated": 1533150000,
            "ttl": 10,
            "data": {"stations": [{
                "station_id": "81",
                "num_bikes_available": 3,
                "num_ebikes_available": 0,
                "num_bikes_disabled": 1,
                "num_docks_available": 31,
                "num_docks_disabled": 0,
                "last_reported": 1533150000,
                "is_installed": 1,
                "is_renting": 1,
                "is_returning": 0
            }]}
        }"#;
        let stations = parse_station_status(body).unwrap();
        assert_eq!(stations.len(), 1);
        let s = &stations[0];
        assert_eq!(s.station_id, "81");
        assert_eq!(s.last_reported, Utc.timestamp_opt(1533150000, 0).unwrap());
        assert_eq!(s.num_docks_available, 31);
        assert!(s.is_installed && s.is_renting && !s.is_returning);
    }

    #[test]
    fn test_parse_station_status_bool_flags_and_defaults() {
        let body = br#"{"data": {"stations": [{
            "station_id": "82",
            "num_bikes_available": 0,
            "num_docks_available": 20,
            "last_reported": 1533150100,
            "is_installed": true,
            "is_renting": false,
            "is_returning": true
        }]}}"#;
        let stations = parse_station_status(body).unwrap();
        assert_eq!(stations[0].num_ebikes_available, 0);
        assert!(!stations[0].is_renting);
    }

    #[test]
    fn test_parse_station_status_rejects_garbage() {
        assert!(parse_station_status(b"<html>").is_err());
        assert!(parse_station_status(br#"{"data": {"stations": [{"station_id": "1"}]}}"#).is_err());
    }

    #[test]
    fn test_url_joins_base() {
        let client = GbfsClient::with_client(BasicClient::new(), "https://example.com/gbfs/en/");
        assert_eq!(client.url(), "https://example.com/gbfs/en/station_status.json");
    }
}
