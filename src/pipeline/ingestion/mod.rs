// Pipeline ingestion: archive input, per-record media fetching, rate limiting and the known-id store

pub mod known_ids;
pub mod media_fetcher;
pub mod rate_limiter;
