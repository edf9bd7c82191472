use crate::app::ports::RateLimiterPort;
use crate::pipeline::ingestion::rate_limiter::RateLimiter;
use async_trait::async_trait;

pub struct RateLimiterAdapter(pub RateLimiter);

#[async_trait]
impl RateLimiterPort for RateLimiterAdapter {
    async fn acquire(&self) {
        self.0.acquire().await;
    }
}
