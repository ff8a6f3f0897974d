use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use url::Url;

use crate::models::GenerationResult;

const FILE_PREFIX: &str = "prototipal";

pub struct Downloader {
    client: Client,
    dir: PathBuf,
}

impl Downloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves every image and the video of a successful result. Returns the
    /// paths that were written; individual failures are logged and skipped.
    pub async fn download_result(&self, result: &GenerationResult) -> anyhow::Result<Vec<PathBuf>> {
        let Some(assets) = result.assets() else {
            bail!("Only successful generations can be downloaded");
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let mut jobs: Vec<(String, String)> = assets
            .images
            .iter()
            .enumerate()
            .map(|(i, url)| (url.clone(), asset_filename("image", i + 1, result.timestamp, url)))
            .collect();
        if let Some(video) = &assets.video {
            jobs.push((video.clone(), asset_filename("video", 1, result.timestamp, video)));
        }

        let saved: Vec<PathBuf> = stream::iter(jobs)
            .map(|(url, name)| async move {
                match self.download(&url, &name).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        tracing::warn!("Download failed for {}: {:#}", url, e);
                        None
                    }
                }
            })
            .buffered(4)
            .filter_map(|path| async move { path })
            .collect()
            .await;

        Ok(saved)
    }

    async fn download(&self, url: &str, filename: &str) -> anyhow::Result<PathBuf> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            bail!("HTTP {}", response.status());
        }

        let bytes = response.bytes().await?;
        let path = self.dir.join(filename);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(path = %path.display(), size = bytes.len(), "Downloaded asset");
        Ok(path)
    }
}

/// Last path segment of `url`, percent-decoded, or `download` when there is none.
pub fn filename_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(&s).map(|d| d.into_owned()).unwrap_or(s))
        .unwrap_or_else(|| "download".to_string())
}

/// `prototipal-<kind>-<YYYY-MM-DD>-<index>`
pub fn generate_filename(kind: &str, index: usize, timestamp: DateTime<Utc>) -> String {
    format!("{FILE_PREFIX}-{kind}-{}-{index}", timestamp.format("%Y-%m-%d"))
}

fn asset_filename(kind: &str, index: usize, timestamp: DateTime<Utc>, url: &str) -> String {
    let base = generate_filename(kind, index, timestamp);
    let original = filename_from_url(url);
    match Path::new(&original).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{base}.{ext}"),
        _ => base,
    }
}
