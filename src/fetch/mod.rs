//! HTTP plumbing and the live station-status feed.

mod basic;
mod client;
mod gbfs;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use gbfs::{GbfsClient, parse_station_status};

use anyhow::Result;
use async_trait::async_trait;

use crate::record::StationSnapshot;

/// Source of current per-station availability.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch(&self) -> Result<Vec<StationSnapshot>>;
}

pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}
