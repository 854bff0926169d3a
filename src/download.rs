//! Firmware metadata from the ipsw.me API.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt, stream};
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const API_BASE: &str = "https://api.ipsw.me/v4";

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceData {
    pub name: String,
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Firmware {
    pub version: String,
    pub buildid: String,
    pub sha1sum: String,
    pub filesize: u64,
    pub url: String,
    pub uploaddate: DateTime<Utc>,
    pub releasedate: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpswData {
    pub name: String,
    pub identifier: String,
    pub firmwares: Vec<Firmware>,
}

/// Fetch firmware lists for every known device, `concurrency` requests at a
/// time. Results arrive in completion order; any failure fails the batch.
pub async fn download_all(client: &Client, base: &str, concurrency: usize) -> Result<Vec<IpswData>> {
    let devices: Vec<DeviceData> = client
        .get(format!("{}/devices", base))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
        .context("Couldn't decode device list")?;
    info!("Fetching firmware lists for {} devices", devices.len());

    stream::iter(devices)
        .map(move |device| async move {
            debug!("GET device {}", device.identifier);
            let data: IpswData = client
                .get(format!("{}/device/{}", base, device.identifier))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
                .with_context(|| format!("Couldn't decode firmwares for {}", device.identifier))?;
            Ok::<_, anyhow::Error>(data)
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await
}
