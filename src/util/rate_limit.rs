use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use super::api_util::APIError;

/// Fixed-window request counter keyed by client address.
///
/// Entries expire with the window and the cache is capacity-bounded, so
/// the map cannot grow for the lifetime of the process.
pub struct RateLimiter {
    windows: Cache<String, Arc<AtomicU32>>,
    limit: u32,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: Cache::builder()
                .max_capacity(65536)
                .time_to_live(window)
                .build(),
            limit,
        }
    }

    pub async fn check(&self, key: &str) -> Result<(), APIError> {
        let counter = self
            .windows
            .get_with(key.to_owned(), async { Arc::new(AtomicU32::new(0)) })
            .await;
        if counter.fetch_add(1, Ordering::Relaxed) >= self.limit {
            Err(APIError::RateLimited)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn limits_within_a_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1").await.is_ok());
        }
        assert_eq!(
            limiter.check("10.0.0.1").await,
            Err(APIError::RateLimited)
        );
    }

    #[actix_rt::test]
    async fn windows_are_per_client() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("10.0.0.1").await.is_ok());
        assert!(limiter.check("10.0.0.2").await.is_ok());
        assert!(limiter.check("10.0.0.1").await.is_err());
    }

    #[actix_rt::test]
    async fn expired_window_resets_the_count() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("10.0.0.1").await.is_ok());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.check("10.0.0.1").await.is_ok());
    }
}
