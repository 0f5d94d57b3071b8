//! HLS master playlist inspection
//!
//! Reads the variant ladder the streaming client will see and turns it into
//! [`QualityLevel`]s with the same indices the client assigns (variant
//! order, I-frame streams excluded). Useful for previewing the quality menu
//! without a browser.

use crate::{types::QualityLevel, Error, Result};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse a master playlist into levels in client order
pub fn parse_master(content: &[u8]) -> Result<Vec<QualityLevel>> {
    let master = m3u8_rs::parse_master_playlist_res(content)
        .map_err(|e| Error::ManifestParse(format!("Failed to parse HLS master: {:?}", e)))?;

    let levels: Vec<QualityLevel> = master
        .variants
        .iter()
        .filter(|variant| !variant.is_i_frame)
        .enumerate()
        .map(|(index, variant)| {
            let (width, height) = variant
                .resolution
                .map(|r| {
                    (
                        u32::try_from(r.width).unwrap_or(0),
                        u32::try_from(r.height).unwrap_or(0),
                    )
                })
                .unwrap_or((0, 0));
            QualityLevel::new(index, width, height, variant.bandwidth)
        })
        .collect();

    if levels.is_empty() {
        return Err(Error::ManifestParse("master playlist has no variants".into()));
    }
    debug!(levels = levels.len(), "Parsed master playlist");
    Ok(levels)
}

/// Download and parse a master playlist
#[instrument]
pub async fn fetch_ladder(url: &Url) -> Result<Vec<QualityLevel>> {
    let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
    let body = client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    parse_master(&body)
}

/// Load a ladder from an http(s) URL or a local file path
pub async fn load_ladder(source: &str) -> Result<Vec<QualityLevel>> {
    match Url::parse(source) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => fetch_ladder(&url).await,
        _ => {
            let content = tokio::fs::read(Path::new(source)).await?;
            parse_master(&content)
        }
    }
}
