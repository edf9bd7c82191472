use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::app::ports::{HttpClientPort, RateLimiterPort};
use crate::config::Config;
use crate::domain::{ChunkRecord, PreScrapingRecord, RawRecord, TranscriptRecord};
use crate::error::{Result, ScraperError};
use crate::metrics as metric_names;
use crate::pipeline::ingestion::media_fetcher::{FetchFailure, FetchSettings, MediaFetcher};
use crate::pipeline::processing::normalize::{NormalizationStats, RecordNormalizer};
use crate::pipeline::processing::parser;
use crate::pipeline::processing::preacher::PreacherInference;
use crate::pipeline::processing::quality_gate::{StageReport, ValidationGate};
use crate::pipeline::processing::schema::{Schema, SchemaSettings};
use crate::pipeline::processing::transcript::{LinkDeriver, Rejection, TranscriptAssembler};
use crate::pipeline::storage::{persist_to_json, read_json_table};

/// Where the archive page comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    File(PathBuf),
    Url(String),
}

impl ArchiveSource {
    /// `http://` and `https://` inputs are URLs, anything else is a path
    pub fn parse(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            ArchiveSource::Url(input.to_string())
        } else {
            ArchiveSource::File(PathBuf::from(input))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ArchiveSource::File(path) => path.display().to_string(),
            ArchiveSource::Url(url) => url.clone(),
        }
    }
}

/// Table kinds the `validate` command can check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    PreScraping,
    Transcript,
    Chunk,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InferenceSummary {
    pub evaluated: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchSummary {
    pub fetched: usize,
    pub skipped: usize,
    pub failures: Vec<FetchFailure>,
}

/// Everything a run decided, written next to the output tables
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub archive: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub raw_records: usize,
    pub normalization: NormalizationStats,
    pub inference: InferenceSummary,
    pub fetch: Option<FetchSummary>,
    pub rejections: Vec<Rejection>,
    pub without_media: usize,
    pub stages: Vec<StageReport>,
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    fn new(archive: String) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            archive,
            started_at: Utc::now(),
            finished_at: None,
            raw_records: 0,
            normalization: NormalizationStats::default(),
            inference: InferenceSummary::default(),
            fetch: None,
            rejections: Vec::new(),
            without_media: 0,
            stages: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn total_violations(&self) -> usize {
        self.stages.iter().map(|s| s.violations.len()).sum()
    }
}

/// Tables produced by a run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub pre_scraping: Vec<PreScrapingRecord>,
    pub transcripts: Vec<TranscriptRecord>,
    pub report: RunReport,
}

impl PipelineRun {
    /// Ids whose records reached the assembler. Fetch failures and limit-skipped
    /// records are left out so the next run retries them.
    pub fn processed_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.transcripts.iter().map(|t| t.id()).collect();
        ids.extend(self.report.rejections.iter().map(|r| r.id));
        ids
    }
}

/// Drives the archive → pre-scraping → transcript pipeline.
pub struct TranscriptUseCase {
    http: Arc<dyn HttpClientPort>,
    limiter: Arc<dyn RateLimiterPort>,
    normalizer: RecordNormalizer,
    inference: PreacherInference,
    assembler: TranscriptAssembler,
    fetcher: MediaFetcher,
    schemas: SchemaSettings,
    gate: ValidationGate,
}

impl TranscriptUseCase {
    pub fn new(config: &Config, http: Arc<dyn HttpClientPort>, limiter: Arc<dyn RateLimiterPort>) -> Result<Self> {
        Ok(Self {
            normalizer: RecordNormalizer::from_config(config)?,
            inference: PreacherInference::from_config(config),
            assembler: TranscriptAssembler::from_config(config)?,
            fetcher: MediaFetcher::new(
                http.clone(),
                limiter.clone(),
                LinkDeriver::from_config(config),
                FetchSettings::from_config(config),
            ),
            schemas: SchemaSettings::from_config(config)?,
            gate: ValidationGate::fail_fast(config.validation.fail_fast),
            http,
            limiter,
        })
    }

    pub async fn load_archive(&self, source: &ArchiveSource) -> Result<String> {
        match source {
            ArchiveSource::File(path) => Ok(tokio::fs::read_to_string(path).await?),
            ArchiveSource::Url(url) => {
                self.limiter.acquire().await;
                let resp = self.http.get(url).await.map_err(|message| ScraperError::Fetch {
                    url: url.clone(),
                    message,
                })?;
                if !resp.is_success() {
                    return Err(ScraperError::Fetch {
                        url: url.clone(),
                        message: format!("HTTP status {}", resp.status),
                    });
                }
                Ok(resp.text())
            }
        }
    }

    /// Archive page → validated pre-scraping table. Does no per-record fetching.
    #[instrument(skip(self, html, known_ids, report))]
    pub fn normalize_stage(
        &self,
        html: &str,
        known_ids: &mut HashSet<u64>,
        report: &mut RunReport,
    ) -> Result<Vec<PreScrapingRecord>> {
        let raw: Vec<RawRecord> = parser::extract_records(html);
        metrics::counter!(metric_names::RECORDS_EXTRACTED).increment(raw.len() as u64);
        report.raw_records = raw.len();

        let normalized = self.normalizer.normalize(&raw, known_ids);
        let unmapped = normalized.unmapped_violations();
        report.normalization = normalized.stats.clone();

        let inferred = self.inference.apply(normalized.records);
        report.inference = InferenceSummary {
            evaluated: inferred.evaluated,
            resolved: inferred.resolved,
        };

        let stage = self
            .gate
            .check_with(&Schema::pre_scraping(&self.schemas), &inferred.records, unmapped)?;
        report.stages.push(stage);
        Ok(inferred.records)
    }

    /// Pre-scraping table → validated transcript table
    #[instrument(skip(self, records, report), fields(records = records.len()))]
    pub async fn transcript_stage(
        &self,
        records: &[PreScrapingRecord],
        report: &mut RunReport,
    ) -> Result<Vec<TranscriptRecord>> {
        let fetched = self.fetcher.fetch_all(records).await;
        let assembled = self.assembler.assemble(records, &fetched.media);

        report.fetch = Some(FetchSummary {
            fetched: fetched.media.len(),
            skipped: fetched.skipped,
            failures: fetched.failures,
        });
        report.rejections = assembled.rejections;
        report.without_media = assembled.without_media;

        let stage = self
            .gate
            .check(&Schema::transcript(&self.schemas), &assembled.records)?;
        report.stages.push(stage);
        Ok(assembled.records)
    }

    /// Only the normalization half of the pipeline
    pub async fn run_normalize(&self, source: &ArchiveSource, known_ids: &mut HashSet<u64>) -> Result<PipelineRun> {
        let mut report = RunReport::new(source.describe());
        let html = self.load_archive(source).await?;
        let pre_scraping = self.normalize_stage(&html, known_ids, &mut report)?;
        report.finished_at = Some(Utc::now());
        Ok(PipelineRun {
            pre_scraping,
            transcripts: Vec::new(),
            report,
        })
    }

    /// The full pipeline. A validation error only surfaces here when fail-fast is on.
    #[instrument(skip(self, known_ids), fields(archive = %source.describe()))]
    pub async fn run(&self, source: &ArchiveSource, known_ids: &mut HashSet<u64>) -> Result<PipelineRun> {
        let started = Instant::now();
        let mut report = RunReport::new(source.describe());
        info!(run_id = %report.run_id, "Starting transcript pipeline");

        let html = self.load_archive(source).await?;
        let pre_scraping = self.normalize_stage(&html, known_ids, &mut report)?;
        let transcripts = self.transcript_stage(&pre_scraping, &mut report).await?;

        report.finished_at = Some(Utc::now());
        metrics::histogram!(metric_names::PIPELINE_DURATION).record(started.elapsed().as_secs_f64());
        info!(
            run_id = %report.run_id,
            "Pipeline finished: {} pre-scraping, {} transcript record(s), {} violation(s)",
            pre_scraping.len(),
            transcripts.len(),
            report.total_violations()
        );

        Ok(PipelineRun {
            pre_scraping,
            transcripts,
            report,
        })
    }

    /// Write the tables and then the report, which lists the table files
    pub fn persist(&self, run: &mut PipelineRun, output_dir: &Path) -> Result<()> {
        run.report
            .outputs
            .push(persist_to_json(&run.pre_scraping, "pre_scraping", output_dir)?);
        if run.report.fetch.is_some() {
            run.report
                .outputs
                .push(persist_to_json(&run.transcripts, "transcripts", output_dir)?);
        }
        let report_path = persist_to_json(&run.report, "run_report", output_dir)?;
        info!("Saved run report to {}", report_path.display());
        Ok(())
    }

    /// Validate a table previously written to disk
    pub fn validate_table(&self, kind: TableKind, path: &Path) -> Result<StageReport> {
        match kind {
            TableKind::PreScraping => {
                let rows: Vec<PreScrapingRecord> = read_json_table(path)?;
                self.gate.check(&Schema::pre_scraping(&self.schemas), &rows)
            }
            TableKind::Transcript => {
                let rows: Vec<TranscriptRecord> = read_json_table(path)?;
                self.gate.check(&Schema::transcript(&self.schemas), &rows)
            }
            TableKind::Chunk => {
                let rows: Vec<ChunkRecord> = read_json_table(path)?;
                self.gate.check(&Schema::chunk(&self.schemas), &rows)
            }
        }
    }
}
