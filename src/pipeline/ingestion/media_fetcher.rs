use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::app::ports::{HttpClientPort, RateLimiterPort};
use crate::config::Config;
use crate::domain::{FetchedMedia, PreScrapingRecord};
use crate::error::{Result, ScraperError};
use crate::metrics as metric_names;
use crate::pipeline::processing::parser;
use crate::pipeline::processing::transcript::LinkDeriver;

/// A record whose detail page or caption file could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub id: u64,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// In the same order as the input records
    pub media: Vec<FetchedMedia>,
    pub failures: Vec<FetchFailure>,
    /// Records left out by the fetch limit
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub concurrency: usize,
    pub timeout: Duration,
    pub limit: Option<usize>,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.fetch.concurrency.max(1) as usize,
            timeout: Duration::from_secs(config.fetch.timeout_secs),
            limit: config.fetch.limit,
        }
    }
}

/// Fetches the media link and caption text for every pre-scraping record.
///
/// Work runs on a bounded pool of `concurrency` in-flight records, every request
/// passes through the shared rate limiter, and a failing record never aborts the
/// others.
pub struct MediaFetcher {
    http: Arc<dyn HttpClientPort>,
    limiter: Arc<dyn RateLimiterPort>,
    deriver: LinkDeriver,
    settings: FetchSettings,
}

impl MediaFetcher {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        limiter: Arc<dyn RateLimiterPort>,
        deriver: LinkDeriver,
        settings: FetchSettings,
    ) -> Self {
        Self {
            http,
            limiter,
            deriver,
            settings,
        }
    }

    #[instrument(skip(self, records), fields(records = records.len(), concurrency = self.settings.concurrency))]
    pub async fn fetch_all(&self, records: &[PreScrapingRecord]) -> FetchOutcome {
        let take = self.settings.limit.unwrap_or(records.len()).min(records.len());
        let selected = &records[..take];

        let mut results: Vec<(usize, std::result::Result<FetchedMedia, FetchFailure>)> =
            stream::iter(selected.iter().enumerate())
                .map(|(index, record)| async move { (index, self.fetch_one(record).await) })
                .buffer_unordered(self.settings.concurrency)
                .collect()
                .await;
        results.sort_by_key(|(index, _)| *index);

        let mut outcome = FetchOutcome {
            skipped: records.len() - take,
            ..FetchOutcome::default()
        };
        for (_, result) in results {
            match result {
                Ok(media) => outcome.media.push(media),
                Err(failure) => outcome.failures.push(failure),
            }
        }

        metrics::counter!(metric_names::FETCH_FAILURES).increment(outcome.failures.len() as u64);
        info!(
            "Fetched media for {} record(s); {} failed, {} skipped by limit",
            outcome.media.len(),
            outcome.failures.len(),
            outcome.skipped
        );
        outcome
    }

    async fn fetch_one(&self, record: &PreScrapingRecord) -> std::result::Result<FetchedMedia, FetchFailure> {
        let failure = |url: &str, err: ScraperError| {
            warn!(id = record.id, "Fetch failed: {}", err);
            FetchFailure {
                id: record.id,
                url: url.to_string(),
                reason: err.to_string(),
            }
        };

        let page = self
            .get_text(&record.canonical_link)
            .await
            .map_err(|e| failure(&record.canonical_link, e))?;
        let media_link =
            parser::extract_media_link(&page).map_err(|e| failure(&record.canonical_link, e))?;
        let caption_link = self
            .deriver
            .caption_link(&media_link)
            .map_err(|e| failure(&media_link, e))?;
        let caption_text = self
            .get_text(&caption_link)
            .await
            .map_err(|e| failure(&caption_link, e))?;

        debug!(id = record.id, %media_link, "Fetched media");
        Ok(FetchedMedia {
            id: record.id,
            media_link,
            caption_text,
        })
    }

    /// Rate-limited GET with a per-request timeout; non-2xx statuses are failures
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.limiter.acquire().await;
        let resp = tokio::time::timeout(self.settings.timeout, self.http.get(url))
            .await
            .map_err(|_| ScraperError::Fetch {
                url: url.to_string(),
                message: format!("timed out after {:?}", self.settings.timeout),
            })?
            .map_err(|message| ScraperError::Fetch {
                url: url.to_string(),
                message,
            })?;
        if !resp.is_success() {
            return Err(ScraperError::Fetch {
                url: url.to_string(),
                message: format!("HTTP status {}", resp.status),
            });
        }
        Ok(resp.text())
    }
}
